//! Input line parsing and sidebar views.

use std::fmt::Write;

use alice_console_core::{Diagnostic, DiagnosticKind, MemoryResponse, StatusSnapshot};

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Text to send to the agent.
    Message(String),
    /// Reprint the whole conversation.
    History,
    /// Delete the conversation on the server.
    Clear,
    /// Show tasks, skills and outputs.
    Status,
    /// Show the agent's memory.
    Memory,
    /// Show recorded anomalies.
    Diagnostics,
    /// Show the command list.
    Help,
    /// Leave the console.
    Quit,
    /// Unrecognised slash command.
    Unknown(String),
    /// Blank line.
    Empty,
}

impl Command {
    /// Parse one input line.
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }
        let Some(name) = trimmed.strip_prefix('/') else {
            return Self::Message(line.trim_end_matches(['\r', '\n']).to_string());
        };

        match name.split_whitespace().next().unwrap_or_default() {
            "history" | "h" => Self::History,
            "clear" => Self::Clear,
            "status" | "s" => Self::Status,
            "memory" | "m" => Self::Memory,
            "diagnostics" | "diag" => Self::Diagnostics,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Help text for the slash commands.
pub const HELP: &str = "\
Type a message and press Enter to send it. Ctrl-C interrupts a running reply.
  /history       reprint the conversation
  /clear         delete the conversation history
  /status        tasks, skills and output files
  /memory        long and short term memory
  /diagnostics   recorded stream anomalies
  /quit          leave";

/// Render the sidebar snapshot. `resolve` turns server paths into full URLs.
pub fn render_status(status: &StatusSnapshot, resolve: impl Fn(&str) -> String) -> String {
    let mut out = String::new();

    out.push_str("== Tasks ==\n");
    if status.tasks.trim().is_empty() {
        out.push_str("(none)\n");
    } else {
        let _ = writeln!(out, "{}", status.tasks.trim_end());
    }

    out.push_str("== Skills ==\n");
    if status.skills.is_empty() {
        out.push_str("(none)\n");
    }
    for (name, skill) in &status.skills {
        if skill.description.is_empty() {
            let _ = writeln!(out, "  {name}");
        } else {
            let _ = writeln!(out, "  {name}: {}", skill.description);
        }
    }

    out.push_str("== Outputs ==\n");
    if status.outputs.is_empty() {
        out.push_str("(none)\n");
    }
    for root in &status.outputs {
        for (depth, entry) in root.flatten() {
            let indent = "  ".repeat(depth + 1);
            if entry.is_dir() {
                let _ = write!(out, "{indent}{}/", entry.name);
                if entry.has_index {
                    let _ = write!(out, "  {}", resolve(entry.browse_url()));
                }
                out.push('\n');
            } else {
                let _ = write!(out, "{indent}{}", entry.name);
                if let Some(kib) = entry.size_kib() {
                    let _ = write!(out, " ({kib} KiB)");
                }
                if let Some(at) = entry.modified_at() {
                    let _ = write!(out, " {}", at.format("%Y-%m-%d %H:%M"));
                }
                let _ = writeln!(out, "  {}", resolve(&entry.url));
            }
        }
    }

    out
}

/// Render the agent's memory.
pub fn render_memory(memory: &MemoryResponse) -> String {
    let section = |text: &str| {
        if text.trim().is_empty() {
            "(empty)".to_string()
        } else {
            text.trim_end().to_string()
        }
    };
    format!(
        "== Long-term memory ==\n{}\n== Short-term memory ==\n{}\n",
        section(&memory.ltm),
        section(&memory.stm)
    )
}

/// Render the diagnostics log, oldest first.
pub fn render_diagnostics(records: &[Diagnostic]) -> String {
    if records.is_empty() {
        return "(no diagnostics)\n".to_string();
    }

    let mut out = String::new();
    for record in records {
        let time = record.at.format("%H:%M:%S");
        let detail = match &record.kind {
            DiagnosticKind::MalformedFrame { line, error } => {
                format!("malformed frame: {error} in {line:?}")
            }
            DiagnosticKind::OrphanEvent { event } => format!("orphan event: {event}"),
            DiagnosticKind::DuplicateStep { step } => format!("duplicate step: {step}"),
            DiagnosticKind::Transport { message } => format!("transport: {message}"),
            DiagnosticKind::InterruptNotice { message } => {
                format!("interrupt notice: {message}")
            }
            DiagnosticKind::StatusRefresh { message } => format!("status refresh: {message}"),
        };
        let _ = writeln!(out, "{time} {detail}");
    }
    out
}
