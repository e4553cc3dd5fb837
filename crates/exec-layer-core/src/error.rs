use crate::ErrorCategory;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while driving a child process
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("assertion failed: {0}")]
    Assert(String),

    #[error("{context}: {source}")]
    Kernel {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Execution(String),

    /// Child exited on its own; the category comes from its exit code
    #[error("{message}")]
    Terminated {
        category: ErrorCategory,
        code: i32,
        message: String,
    },

    #[error("unable to read data from '{name}' after {}ms", timeout.as_millis())]
    ReadTimeout { name: String, timeout: Duration },

    #[error("unable to write to '{name}' after {}ms", timeout.as_millis())]
    WriteTimeout { name: String, timeout: Duration },

    #[error("unable to read from '{name}': {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to write to '{name}': {source}")]
    Write {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected eof while reading line from '{name}'")]
    UnexpectedEof { name: String },
}

pub type Result<T, E = ExecError> = std::result::Result<T, E>;

impl ExecError {
    pub fn kernel(context: impl Into<String>, source: impl Into<std::io::Error>) -> Self {
        ExecError::Kernel {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Build the error for a child that exited with `code`.
    ///
    /// Captured stderr is trimmed and appended after a `": "` separator only when
    /// something is left.
    pub fn terminated(name: &str, code: i32, stderr: &str) -> Self {
        let stderr = stderr.trim();
        let message = if stderr.is_empty() {
            format!("{name} terminated unexpectedly [{code}]")
        } else {
            format!("{name} terminated unexpectedly [{code}]: {stderr}")
        };

        ExecError::Terminated {
            category: ErrorCategory::from_code(code),
            code,
            message,
        }
    }

    pub fn signaled(name: &str, signal: i32) -> Self {
        ExecError::Execution(format!("{name} terminated unexpectedly on signal {signal}"))
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ExecError::InvalidArgument(_) => ErrorCategory::ParamInvalid,
            ExecError::Assert(_) => ErrorCategory::Assert,
            ExecError::Kernel { .. } => ErrorCategory::Kernel,
            ExecError::Execution(_) => ErrorCategory::Execute,
            ExecError::Terminated { category, .. } => *category,
            ExecError::ReadTimeout { .. }
            | ExecError::Read { .. }
            | ExecError::UnexpectedEof { .. } => ErrorCategory::FileRead,
            ExecError::WriteTimeout { .. } | ExecError::Write { .. } => ErrorCategory::FileWrite,
        }
    }

    /// Exit code a process failing with this error should report
    pub fn code(&self) -> i32 {
        self.category().code()
    }

    /// Check if this error explains the death of the child process
    pub fn is_process_failure(&self) -> bool {
        matches!(self, ExecError::Execution(_) | ExecError::Terminated { .. })
    }

    /// Check if this error is a timeout on one of the pipes
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ExecError::ReadTimeout { .. } | ExecError::WriteTimeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminated_with_stderr() {
        let error = ExecError::terminated("archive-get", 102, "  unable to find wal\n");
        assert_eq!(
            error.to_string(),
            "archive-get terminated unexpectedly [102]: unable to find wal"
        );
        assert_eq!(error.category(), ErrorCategory::Execute);
        assert_eq!(error.code(), 102);
        assert!(error.is_process_failure());
    }

    #[test]
    fn test_terminated_without_stderr() {
        let error = ExecError::terminated("compress", 41, " \n\t");
        assert_eq!(error.to_string(), "compress terminated unexpectedly [41]");
        assert!(!error.to_string().contains(": "));
        assert_eq!(error.category(), ErrorCategory::FileOpen);
    }

    #[test]
    fn test_terminated_unmapped_code() {
        let error = ExecError::terminated("worker", 1, "");
        assert_eq!(error.category(), ErrorCategory::Unknown);
        match error {
            ExecError::Terminated { code, .. } => assert_eq!(code, 1),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_signaled() {
        let error = ExecError::signaled("worker", 9);
        assert_eq!(error.to_string(), "worker terminated unexpectedly on signal 9");
        assert_eq!(error.category(), ErrorCategory::Execute);
        assert!(error.is_process_failure());
    }

    #[test]
    fn test_error_categorization() {
        let timeout = ExecError::ReadTimeout {
            name: "worker read".to_string(),
            timeout: Duration::from_millis(250),
        };
        assert_eq!(
            timeout.to_string(),
            "unable to read data from 'worker read' after 250ms"
        );
        assert!(timeout.is_timeout());
        assert!(!timeout.is_process_failure());
        assert_eq!(timeout.category(), ErrorCategory::FileRead);

        let write = ExecError::Write {
            name: "worker write".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::BrokenPipe),
        };
        assert_eq!(write.category(), ErrorCategory::FileWrite);
        assert!(!write.is_timeout());

        assert_eq!(
            ExecError::InvalidArgument("x".to_string()).category(),
            ErrorCategory::ParamInvalid
        );
        assert_eq!(
            ExecError::kernel("unable to create read pipe", std::io::ErrorKind::Other).code(),
            100
        );
    }

    #[test]
    fn test_kernel_display_includes_source() {
        let error = ExecError::kernel(
            "unable to fork",
            std::io::Error::from_raw_os_error(11),
        );
        let display = error.to_string();
        assert!(display.starts_with("unable to fork: "));
    }
}
