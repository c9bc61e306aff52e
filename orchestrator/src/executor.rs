use anyhow::{anyhow, Context, Result};
use std::process::{Command, Stdio};
use std::sync::Mutex;

/// Runs one external command to completion.
///
/// An `Err` means the command could not be run at all (missing binary, I/O
/// failure). A command that ran and exited non-zero is an `Ok` with a
/// non-zero `status`; deciding whether that is fatal is the caller's job.
pub trait CommandExecutor: Send + Sync {
    fn execute(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn execute(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("Failed to execute command: {} {:?}", program, args))?;

        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Output(CommandOutput),
    Transport(String),
}

#[derive(Debug)]
struct Rule {
    needle: String,
    replies: Vec<Reply>,
    served: usize,
}

#[derive(Debug, Default)]
struct Script {
    rules: Vec<Rule>,
    calls: Vec<String>,
}

/// Deterministic executor for tests where shelling out to a cluster is
/// undesirable.
///
/// Each rule matches when its needle is a substring of the command line
/// (program and arguments joined by single spaces, unquoted); the first
/// matching rule wins. A rule with several replies serves
/// them in order and then keeps repeating the last one. Commands that match
/// no rule succeed with empty output. Every call is recorded.
#[derive(Debug, Default)]
pub struct ScriptedCommandExecutor {
    script: Mutex<Script>,
}

impl ScriptedCommandExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, needle: impl Into<String>, status: i32, stdout: &str, stderr: &str) -> Self {
        self.push_rule(
            needle,
            vec![Reply::Output(CommandOutput {
                status,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            })],
        )
    }

    pub fn on_success(self, needle: impl Into<String>, stdout: &str) -> Self {
        self.on(needle, 0, stdout, "")
    }

    pub fn on_failure(self, needle: impl Into<String>, stderr: &str) -> Self {
        self.on(needle, 1, "", stderr)
    }

    pub fn on_transport_error(self, needle: impl Into<String>, message: &str) -> Self {
        self.push_rule(needle, vec![Reply::Transport(message.to_string())])
    }

    /// Serve `(status, stdout, stderr)` triples in order for matching calls.
    pub fn on_sequence(self, needle: impl Into<String>, outputs: &[(i32, &str, &str)]) -> Self {
        let replies = outputs
            .iter()
            .map(|(status, stdout, stderr)| {
                Reply::Output(CommandOutput {
                    status: *status,
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                })
            })
            .collect();
        self.push_rule(needle, replies)
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn count_matching(&self, needle: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.contains(needle))
            .count()
    }

    fn push_rule(self, needle: impl Into<String>, replies: Vec<Reply>) -> Self {
        self.lock().rules.push(Rule {
            needle: needle.into(),
            replies,
            served: 0,
        });
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CommandExecutor for ScriptedCommandExecutor {
    fn execute(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let line = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        let mut script = self.lock();
        script.calls.push(line.clone());

        let reply = script
            .rules
            .iter_mut()
            .find(|rule| line.contains(&rule.needle))
            .and_then(|rule| {
                let index = rule.served.min(rule.replies.len().saturating_sub(1));
                rule.served += 1;
                rule.replies.get(index).cloned()
            });

        match reply {
            Some(Reply::Output(output)) => Ok(output),
            Some(Reply::Transport(message)) => Err(anyhow!(message)),
            None => Ok(CommandOutput::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_executor_serves_sequences_then_repeats_last() {
        let executor = ScriptedCommandExecutor::new()
            .on_sequence("get namespace", &[(1, "", "NotFound"), (0, "ok", "")]);

        let first = executor.execute("kubectl", &["get", "namespace", "x"]).unwrap();
        let second = executor.execute("kubectl", &["get", "namespace", "x"]).unwrap();
        let third = executor.execute("kubectl", &["get", "namespace", "x"]).unwrap();

        assert_eq!(first.status, 1);
        assert_eq!(second.stdout, "ok");
        assert_eq!(third.stdout, "ok");
        assert_eq!(executor.count_matching("get namespace"), 3);
    }

    #[test]
    fn scripted_executor_defaults_to_success_and_reports_transport_errors() {
        let executor = ScriptedCommandExecutor::new().on_transport_error("exec", "connection reset");

        assert!(executor.execute("kubectl", &["apply"]).unwrap().success());
        let err = executor.execute("kubectl", &["exec", "pod"]).unwrap_err();
        assert!(err.to_string().contains("connection reset"));
    }

    #[cfg(unix)]
    #[test]
    fn system_executor_captures_exit_status_and_streams() {
        let output = SystemCommandExecutor
            .execute("sh", &["-c", "echo out; echo err >&2; exit 3"])
            .unwrap();
        assert_eq!(output.status, 3);
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[test]
    fn system_executor_reports_missing_binary_as_error() {
        let result = SystemCommandExecutor.execute("definitely-not-a-real-binary-xyz", &[]);
        assert!(result.is_err());
    }
}
