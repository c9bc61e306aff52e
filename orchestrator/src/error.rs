use thiserror::Error;

use crate::models::TestStatus;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("namespace {namespace} unavailable: {message}")]
    NamespaceUnavailable { namespace: String, message: String },

    #[error("sandbox in namespace {namespace} not ready within {timeout_secs}s: {message}")]
    SandboxNotReady {
        namespace: String,
        timeout_secs: u64,
        message: String,
    },

    #[error("command failed: {command}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stdout: String,
        stderr: String,
    },

    #[error("checkout of {commit} failed: {message}")]
    CheckoutFailed { commit: String, message: String },

    #[error("dependency installation failed with exit code {status}")]
    DependencyInstallFailed {
        status: i32,
        stdout: String,
        stderr: String,
    },

    #[error("test execution error: {message}")]
    TestExecutionError { message: String },

    #[error("cleanup failed: {message}")]
    CleanupFailed { message: String },

    #[error("failed to run {command}: {message}")]
    Transport { command: String, message: String },
}

/// Why a test request was refused before any work started.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("{field} is required")]
    Missing { field: &'static str },

    #[error("commitHash '{commit}' is not a valid revision reference")]
    InvalidCommit { commit: String },
}

impl RunError {
    /// Terminal status of a run that stopped on this error.
    ///
    /// A command that ran and reported failure makes the run `failed`; not
    /// being able to get a working sandbox or talk to it makes it `error`.
    pub fn status(&self) -> TestStatus {
        match self {
            RunError::CommandFailed { .. }
            | RunError::CheckoutFailed { .. }
            | RunError::DependencyInstallFailed { .. } => TestStatus::Failed,
            RunError::NamespaceUnavailable { .. }
            | RunError::SandboxNotReady { .. }
            | RunError::TestExecutionError { .. }
            | RunError::CleanupFailed { .. }
            | RunError::Transport { .. } => TestStatus::Error,
        }
    }

    /// Output captured by the failing command, when there was one.
    pub fn captured_output(&self) -> Option<(&str, &str)> {
        match self {
            RunError::CommandFailed { stdout, stderr, .. }
            | RunError::DependencyInstallFailed { stdout, stderr, .. } => {
                Some((stdout.as_str(), stderr.as_str()))
            }
            _ => None,
        }
    }
}
