//! Error taxonomy for a deployment trigger run.
//!
//! Every step of the pipeline fails with one [`DeployError`] variant and the
//! run aborts on the first one. [`RetryPolicy`] tells the retry loop which
//! failures are transient.

use std::fmt;
use std::path::PathBuf;

use git2::{ErrorClass, ErrorCode};
use thiserror::Error;

/// Whether an error condition is safe to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    Retryable,
    NonRetryable,
}

/// Progress text captured from a transport stream while output was quiet.
///
/// Rendered as an indented block after the error message, or as nothing at
/// all when no text was captured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub text: String,
    pub truncated_bytes: usize,
}

impl Diagnostics {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.truncated_bytes == 0
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        write!(f, "\nremote output:")?;
        for line in self.text.lines().filter(|l| !l.trim().is_empty()) {
            write!(f, "\n  {}", line.trim_end())?;
        }
        if self.truncated_bytes > 0 {
            write!(f, "\n  [{} more bytes not captured]", self.truncated_bytes)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("failed to create workspace directory")]
    Workspace(#[source] std::io::Error),

    #[error("failed to look up application {app_id} in account {account_id}: {message}")]
    Metadata {
        account_id: u64,
        app_id: u64,
        message: String,
    },

    #[error("authentication rejected by {target}")]
    Auth { target: String },

    #[error("transport failure talking to {url}: {cause}{diagnostics}")]
    Transport {
        url: String,
        cause: git2::Error,
        diagnostics: Diagnostics,
    },

    #[error("remote branch {refname} not found")]
    RefNotFound { refname: String },

    #[error("descriptor {} not found in repository tree", path.display())]
    DescriptorNotFound { path: PathBuf },

    #[error("failed to parse descriptor {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("failed to write descriptor {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("git {op} failed: {cause}")]
    GitOperation {
        op: &'static str,
        cause: git2::Error,
    },

    #[error("failed to push git changes: {cause}{diagnostics}")]
    Push {
        cause: git2::Error,
        diagnostics: Diagnostics,
    },

    #[error("deadline exceeded during {step}")]
    DeadlineExceeded { step: &'static str },

    #[error("cancelled during {step}")]
    Cancelled { step: &'static str },
}

impl DeployError {
    pub(crate) fn git(op: &'static str) -> impl FnOnce(git2::Error) -> DeployError {
        move |cause| DeployError::GitOperation { op, cause }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            DeployError::Transport { .. } => RetryPolicy::Retryable,
            DeployError::Push { cause, .. } if is_transient(cause) => RetryPolicy::Retryable,
            _ => RetryPolicy::NonRetryable,
        }
    }
}

/// Network-level libgit2 failures. Auth failures and errors raised from our
/// own callbacks (ref rejections, deadline aborts) never qualify.
fn is_transient(err: &git2::Error) -> bool {
    if matches!(err.code(), ErrorCode::Auth | ErrorCode::User) {
        return false;
    }
    matches!(
        err.class(),
        ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssl | ErrorClass::Os
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_render_nothing_when_empty() {
        let err = DeployError::Push {
            cause: git2::Error::from_str("boom"),
            diagnostics: Diagnostics::default(),
        };
        assert_eq!(err.to_string(), "failed to push git changes: boom");
    }

    #[test]
    fn diagnostics_are_appended_to_push_error() {
        let err = DeployError::Push {
            cause: git2::Error::from_str("boom"),
            diagnostics: Diagnostics {
                text: "remote: hook declined\r\nremote: try again\n".into(),
                truncated_bytes: 12,
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("remote: hook declined"));
        assert!(msg.contains("remote: try again"));
        assert!(msg.contains("[12 more bytes not captured]"));
    }

    #[test]
    fn only_transport_failures_are_retryable() {
        let transport = DeployError::Transport {
            url: "https://example.invalid/x.git".into(),
            cause: git2::Error::from_str("connection reset"),
            diagnostics: Diagnostics::default(),
        };
        assert_eq!(transport.retry_policy(), RetryPolicy::Retryable);

        let auth = DeployError::Auth {
            target: "git remote".into(),
        };
        assert_eq!(auth.retry_policy(), RetryPolicy::NonRetryable);

        let missing = DeployError::RefNotFound {
            refname: "refs/heads/nope".into(),
        };
        assert_eq!(missing.retry_policy(), RetryPolicy::NonRetryable);

        let parse = DeployError::Parse {
            path: "nodejs/.section-external-source.json".into(),
            reason: "expected value".into(),
        };
        assert_eq!(parse.retry_policy(), RetryPolicy::NonRetryable);
    }

    #[test]
    fn push_rejection_is_not_retryable() {
        let err = DeployError::Push {
            cause: git2::Error::from_str("refs/heads/staging: non-fast-forward"),
            diagnostics: Diagnostics::default(),
        };
        assert_eq!(err.retry_policy(), RetryPolicy::NonRetryable);

        let net = DeployError::Push {
            cause: git2::Error::new(ErrorCode::GenericError, ErrorClass::Net, "timed out"),
            diagnostics: Diagnostics::default(),
        };
        assert_eq!(net.retry_policy(), RetryPolicy::Retryable);
    }
}
