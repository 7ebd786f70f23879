//! End-to-end tests of the controller over HTTP against a mock agent server.

use std::sync::Arc;
use std::time::Duration;

use alice_console_core::{
    AgentClient, ClientError, ConsoleConfig, DiagnosticKind, ExchangeOutcome, ExchangeState, InterruptOutcome,
    StatusSource, StreamController,
};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const NDJSON: &str = "application/x-ndjson";

fn client_for(server: &MockServer) -> Arc<AgentClient> {
    let config = ConsoleConfig {
        base_url: server.uri(),
        ..ConsoleConfig::default()
    };
    Arc::new(AgentClient::new(&config).unwrap())
}

fn ndjson(lines: &[serde_json::Value]) -> Vec<u8> {
    let mut body = Vec::new();
    for line in lines {
        body.extend_from_slice(line.to_string().as_bytes());
        body.push(b'\n');
    }
    body
}

#[tokio::test]
async fn chat_stream_builds_the_assistant_turn() {
    let server = MockServer::start().await;
    let body = ndjson(&[
        json!({"type": "start_step", "step": 1}),
        json!({"type": "thinking", "delta": "先看看"}),
        json!({"type": "thinking", "delta": "目录"}),
        json!({"type": "content", "delta": "ls"}),
        json!({"type": "system", "content": "正在执行代码..."}),
        json!({"type": "execution_result", "content": "a.txt"}),
        json!({"type": "start_step", "step": 2}),
        json!({"type": "execution_result", "content": "执行失败: exit 1"}),
        json!({"type": "final_answer", "content": "目录里只有 a.txt"}),
    ]);

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_json(json!({"message": "列出目录"})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, NDJSON))
        .expect(1)
        .mount(&server)
        .await;

    let controller = StreamController::new(client_for(&server));
    let outcome = controller.send("列出目录").await.unwrap();
    assert_eq!(outcome, ExchangeOutcome::Completed { answered: true });

    let history = controller.history();
    assert_eq!(history.len(), 2);
    let turn = history.last_assistant().unwrap();
    assert!(turn.is_complete);
    assert_eq!(turn.final_answer, "目录里只有 a.txt");
    assert_eq!(turn.steps.len(), 2);
    assert_eq!(turn.steps[0].thinking, "先看看目录");
    assert_eq!(turn.steps[0].system_logs, vec!["正在执行代码..."]);
    assert_eq!(turn.steps[1].failure_count(), 1);
    assert!(controller.diagnostics().is_empty());
}

#[tokio::test]
async fn server_error_fails_the_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({"detail": "busy"})))
        .mount(&server)
        .await;

    let controller = StreamController::new(client_for(&server));
    let outcome = controller.send("hi").await.unwrap();

    match outcome {
        ExchangeOutcome::Failed { message } => assert!(message.contains("busy"), "{message}"),
        other => panic!("Expected Failed, got {other:?}"),
    }
    assert_eq!(controller.state(), ExchangeState::Idle);
    assert_eq!(controller.history().open_count(), 0);
    assert!(controller
        .diagnostics()
        .snapshot()
        .iter()
        .any(|d| matches!(d.kind, DiagnosticKind::Transport { .. })));
}

#[tokio::test]
async fn interrupt_aborts_pending_request_and_notifies_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(ndjson(&[json!({"type": "final_answer", "content": "late"})]), NDJSON)
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/interrupt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let controller = Arc::new(StreamController::new(client_for(&server)));
    let mut state = controller.subscribe_state();
    let running = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.send("long job").await })
    };
    state
        .wait_for(|s| *s == ExchangeState::Sending)
        .await
        .unwrap();

    assert_eq!(
        controller.interrupt().await,
        InterruptOutcome::Cancelled {
            notice_delivered: true
        }
    );

    let outcome = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(outcome, ExchangeOutcome::Cancelled);

    let history = controller.history();
    let turn = history.last_assistant().unwrap();
    assert!(turn.is_complete);
    assert!(turn.final_answer.is_empty());
}

#[tokio::test]
async fn unreachable_interrupt_endpoint_is_recorded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/interrupt"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let controller = Arc::new(StreamController::new(client_for(&server)));
    let mut state = controller.subscribe_state();
    let running = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.send("q").await })
    };
    state
        .wait_for(|s| *s == ExchangeState::Sending)
        .await
        .unwrap();

    assert_eq!(
        controller.interrupt().await,
        InterruptOutcome::Cancelled {
            notice_delivered: false
        }
    );
    assert_eq!(running.await.unwrap().unwrap(), ExchangeOutcome::Cancelled);
    assert!(controller
        .diagnostics()
        .snapshot()
        .iter()
        .any(|d| matches!(d.kind, DiagnosticKind::InterruptNotice { .. })));
}

#[tokio::test]
async fn history_is_seeded_from_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/history"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"role": "user", "content": "你好"},
            {
                "role": "bot",
                "steps": [{
                    "id": 1,
                    "thinking": "greet",
                    "content": "",
                    "systemLogs": [],
                    "executionResults": []
                }],
                "finalAnswer": "你好！",
                "isComplete": true
            },
            {"role": "user", "content": "再见"},
            {"role": "bot", "steps": [], "finalAnswer": ""}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/history/clear"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let controller = StreamController::new(client_for(&server));
    assert_eq!(controller.load_history().await.unwrap(), 4);

    let history = controller.history();
    assert_eq!(history.open_count(), 0);
    let first = history.get(1).unwrap().as_assistant().unwrap();
    assert_eq!(first.final_answer, "你好！");
    assert_eq!(first.steps[0].thinking, "greet");

    controller.clear_history().await.unwrap();
    assert!(controller.history().is_empty());
}

#[tokio::test]
async fn status_source_fetches_sidebar() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tasks"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"content": "- [x] 读取数据"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/skills"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "skills": {"web-search": {"description": "Search the web"}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/outputs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": [{
                "name": "site",
                "type": "directory",
                "mtime": 1_700_000_000.5,
                "url": "/outputs/site",
                "hasIndex": true,
                "indexUrl": "/outputs/site/index.html",
                "children": [{
                    "name": "index.html",
                    "type": "file",
                    "size": 2048,
                    "mtime": 1_700_000_000.0,
                    "url": "/outputs/site/index.html"
                }]
            }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/memory"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"ltm": "likes tea", "stm": ""})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let status = client.fetch_status().await.unwrap();
    assert_eq!(status.tasks, "- [x] 读取数据");
    assert_eq!(status.skills["web-search"].description, "Search the web");

    let site = &status.outputs[0];
    assert!(site.is_dir());
    assert_eq!(site.browse_url(), "/outputs/site/index.html");
    assert_eq!(site.children[0].size_kib(), Some(2.0));
    assert_eq!(
        client.resolve(site.browse_url()),
        format!("{}/outputs/site/index.html", server.uri())
    );

    let memory = client.memory().await.unwrap();
    assert_eq!(memory.ltm, "likes tea");
}

#[tokio::test]
async fn status_failure_surfaces_as_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tasks"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "disk"})))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.fetch_status().await.unwrap_err();
    assert!(matches!(err, ClientError::Api { .. }), "{err}");
}
