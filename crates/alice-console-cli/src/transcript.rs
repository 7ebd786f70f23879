//! Plain-text transcript of history snapshots.
//!
//! Each snapshot is compared with what has already been printed and only the
//! appended text is emitted, so streaming deltas show up as they arrive.

use std::fmt::Write;

use alice_console_core::{is_failure, AssistantTurn, History, Turn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Thinking,
    Content,
}

/// How much of one step has been printed.
#[derive(Debug, Default)]
struct StepCursor {
    thinking: usize,
    content: usize,
    logs: usize,
    results: usize,
}

/// Incremental renderer for a conversation history.
#[derive(Debug, Default)]
pub struct Transcript {
    /// Turns printed in full.
    done: usize,
    /// Progress through the open assistant turn at index `done`.
    steps: Vec<StepCursor>,
    /// Field whose text is currently being continued on the open line.
    open_field: Option<(usize, Field)>,
    /// Snapshot the printed turns were taken from.
    last: History,
}

impl Transcript {
    /// Render everything in `history` not printed yet.
    pub fn render(&mut self, history: &History) -> String {
        let mut out = String::new();

        // Printed turns never change, so losing one means the history was
        // replaced (cleared or reseeded), however many updates were coalesced.
        if self.done > 0 && !history.shares_turn(&self.last, self.done - 1) {
            *self = Self::default();
            out.push_str("-- history cleared --\n");
        }

        while let Some(turn) = history.get(self.done) {
            match turn {
                Turn::User { content } => {
                    let _ = write!(out, "\n> {content}\n");
                }
                Turn::Assistant(assistant) => {
                    self.render_steps(assistant, &mut out);
                    if !assistant.is_complete {
                        break;
                    }
                    self.close_field(&mut out);
                    if assistant.final_answer.is_empty() {
                        out.push_str("-- no answer --\n");
                    } else {
                        let _ = write!(out, "\n{}\n", assistant.final_answer);
                    }
                    self.steps.clear();
                }
            }
            self.done += 1;
        }

        self.last = history.clone();
        out
    }

    fn render_steps(&mut self, turn: &AssistantTurn, out: &mut String) {
        for (index, step) in turn.steps.iter().enumerate() {
            if index == self.steps.len() {
                self.close_field(out);
                self.steps.push(StepCursor::default());
                let _ = writeln!(out, "[step {}]", step.id);
            }

            let printed = self.steps[index].thinking;
            if let Some(rest) = step.thinking.get(printed..).filter(|s| !s.is_empty()) {
                self.continue_field(index, Field::Thinking, out);
                out.push_str(rest);
                self.steps[index].thinking = step.thinking.len();
            }

            let printed = self.steps[index].content;
            if let Some(rest) = step.content.get(printed..).filter(|s| !s.is_empty()) {
                self.continue_field(index, Field::Content, out);
                out.push_str(rest);
                self.steps[index].content = step.content.len();
            }

            let printed = self.steps[index].logs;
            for log in step.system_logs.iter().skip(printed) {
                self.close_field(out);
                let _ = writeln!(out, "  * {log}");
            }
            self.steps[index].logs = step.system_logs.len();

            let printed = self.steps[index].results;
            for result in step.execution_results.iter().skip(printed) {
                self.close_field(out);
                let mark = if is_failure(result) { '!' } else { '=' };
                let _ = writeln!(out, "  {mark} {}", first_line(result));
            }
            self.steps[index].results = step.execution_results.len();
        }
    }

    fn continue_field(&mut self, step: usize, field: Field, out: &mut String) {
        if self.open_field == Some((step, field)) {
            return;
        }
        self.close_field(out);
        out.push_str(match field {
            Field::Thinking => "  thinking: ",
            Field::Content => "  intent: ",
        });
        self.open_field = Some((step, field));
    }

    fn close_field(&mut self, out: &mut String) {
        if self.open_field.take().is_some() {
            out.push('\n');
        }
    }
}

/// First line of a possibly long tool output, marked when truncated.
fn first_line(text: &str) -> String {
    let mut lines = text.trim().lines();
    let first = lines.next().unwrap_or_default();
    if lines.next().is_some() {
        format!("{first} ...")
    } else {
        first.to_string()
    }
}

#[cfg(test)]
mod tests {
    use alice_console_core::{Diagnostics, SessionReducer, ServerEvent};

    use super::*;

    fn thinking(delta: &str) -> ServerEvent {
        ServerEvent::Thinking {
            delta: delta.to_string(),
        }
    }

    #[test]
    fn streaming_prints_only_appended_text() {
        let mut reducer = SessionReducer::new(Diagnostics::default());
        let mut transcript = Transcript::default();

        reducer.begin_exchange("hello").unwrap();
        assert_eq!(transcript.render(&reducer.snapshot()), "\n> hello\n");

        reducer.apply(ServerEvent::StartStep { step: 1 });
        reducer.apply(thinking("ab"));
        assert_eq!(
            transcript.render(&reducer.snapshot()),
            "[step 1]\n  thinking: ab"
        );

        reducer.apply(thinking("c"));
        assert_eq!(transcript.render(&reducer.snapshot()), "c");

        reducer.apply(ServerEvent::ExecutionResult {
            content: "执行失败: boom\ntraceback".to_string(),
        });
        assert_eq!(
            transcript.render(&reducer.snapshot()),
            "\n  ! 执行失败: boom ...\n"
        );

        reducer.apply(ServerEvent::FinalAnswer {
            content: "done".to_string(),
        });
        assert_eq!(transcript.render(&reducer.snapshot()), "\ndone\n");
        assert_eq!(transcript.render(&reducer.snapshot()), "");
    }

    #[test]
    fn closed_turn_without_answer_is_marked() {
        let mut reducer = SessionReducer::new(Diagnostics::default());
        let mut transcript = Transcript::default();

        reducer.begin_exchange("q").unwrap();
        reducer.apply(ServerEvent::StartStep { step: 1 });
        reducer.apply(ServerEvent::Content {
            delta: "run".to_string(),
        });
        transcript.render(&reducer.snapshot());

        reducer.close_open_turn();
        assert_eq!(transcript.render(&reducer.snapshot()), "\n-- no answer --\n");
    }

    #[test]
    fn seeded_history_renders_in_full_and_clear_resets() {
        let mut reducer = SessionReducer::new(Diagnostics::default());
        let mut transcript = Transcript::default();

        let answer = AssistantTurn {
            final_answer: "hi there".to_string(),
            ..AssistantTurn::default()
        };
        reducer
            .seed(vec![Turn::user("hi"), Turn::Assistant(answer)])
            .unwrap();
        assert_eq!(
            transcript.render(&reducer.snapshot()),
            "\n> hi\n\nhi there\n"
        );

        reducer.seed(Vec::new()).unwrap();
        assert_eq!(
            transcript.render(&reducer.snapshot()),
            "-- history cleared --\n"
        );
    }

    #[test]
    fn clear_followed_by_new_exchange_before_render() {
        let mut reducer = SessionReducer::new(Diagnostics::default());
        let mut transcript = Transcript::default();

        reducer.begin_exchange("first").unwrap();
        reducer.apply(ServerEvent::FinalAnswer {
            content: "one".to_string(),
        });
        transcript.render(&reducer.snapshot());

        reducer.seed(Vec::new()).unwrap();
        reducer.begin_exchange("second").unwrap();
        assert_eq!(
            transcript.render(&reducer.snapshot()),
            "-- history cleared --\n\n> second\n"
        );
    }

    #[test]
    fn first_line_marks_truncation() {
        assert_eq!(first_line("ok"), "ok");
        assert_eq!(first_line("a\nb"), "a ...");
        assert_eq!(first_line(""), "");
    }
}
