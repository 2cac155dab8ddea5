//! Error taxonomy for the fetch → parse → dedup → emit pipeline
//!
//! Per-task errors ([`TaskError`]) are contained at the task boundary and only
//! ever show up as a `failed` count. [`PipelineError`] is reserved for failures
//! that prevent a run from starting or settling at all.

use std::fmt;

/// Transport-level failure: no HTTP status was received.
///
/// Always retryable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No response (or no body progress) within the configured timeout
    Timeout,
    /// Connection could not be established
    Connect(String),
    /// Request or body transfer failed mid-flight
    Other(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "request timed out"),
            Self::Connect(msg) => write!(f, "connect: {msg}"),
            Self::Other(msg) => write!(f, "transport: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

impl TransportError {
    /// Classify a reqwest error that carries no HTTP status.
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else {
            Self::Other(e.to_string())
        }
    }
}

/// Terminal reason a fetch gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Non-2xx, non-5xx status. Never retried.
    ClientRejected(u16),
    /// Every allowed attempt hit a retryable failure
    RetryExhausted,
    /// A sleep or in-flight request was interrupted by `stop()`
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientRejected(status) => write!(f, "rejected with HTTP {status}"),
            Self::RetryExhausted => write!(f, "retries exhausted"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Malformed response body. Fatal for the owning task only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Downstream delivery failure. Logged, never fails the task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkError {
    message: String,
}

impl SinkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sink error: {}", self.message)
    }
}

impl std::error::Error for SinkError {}

impl From<std::io::Error> for SinkError {
    fn from(e: std::io::Error) -> Self {
        Self::new(e.to_string())
    }
}

/// Why a single task ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    Fetch { kind: FailureKind, attempts_used: u32 },
    Parse(ParseError),
    /// Chain aborted abnormally (panicked worker)
    Aborted,
}

impl TaskError {
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Fetch {
                kind: FailureKind::Cancelled,
                ..
            }
        )
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch {
                kind,
                attempts_used,
            } => write!(f, "fetch {kind} (after {attempts_used} attempts)"),
            Self::Parse(e) => write!(f, "{e}"),
            Self::Aborted => write!(f, "task aborted"),
        }
    }
}

impl std::error::Error for TaskError {}

/// Bloom filter construction / persistence error.
#[derive(Debug)]
pub enum DedupError {
    InvalidParameters(String),
    /// `merge` between filters with different `(m, k)`
    ParameterMismatch {
        expected: (usize, u32),
        actual: (usize, u32),
    },
    /// Raw bit buffer of the wrong length
    BufferSize { expected: usize, actual: usize },
    Io(std::io::Error),
}

impl fmt::Display for DedupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParameters(msg) => write!(f, "invalid bloom filter parameters: {msg}"),
            Self::ParameterMismatch { expected, actual } => write!(
                f,
                "cannot merge bloom filters: (m={}, k={}) vs (m={}, k={})",
                expected.0, expected.1, actual.0, actual.1
            ),
            Self::BufferSize { expected, actual } => {
                write!(f, "bit buffer is {actual} bytes, expected {expected}")
            }
            Self::Io(e) => write!(f, "IO: {e}"),
        }
    }
}

impl std::error::Error for DedupError {}

impl From<std::io::Error> for DedupError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Failure that prevents a run from starting or settling.
#[derive(Debug)]
pub enum PipelineError {
    Config(String),
    /// Async runtime could not be built
    Runtime(std::io::Error),
    /// Worker thread pool could not be built
    Pool(rayon::ThreadPoolBuildError),
    Dedup(DedupError),
    /// The run thread panicked
    Panicked,
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "invalid configuration: {msg}"),
            Self::Runtime(e) => write!(f, "runtime: {e}"),
            Self::Pool(e) => write!(f, "thread pool: {e}"),
            Self::Dedup(e) => write!(f, "{e}"),
            Self::Panicked => write!(f, "run thread panicked"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<rayon::ThreadPoolBuildError> for PipelineError {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        Self::Pool(e)
    }
}

impl From<DedupError> for PipelineError {
    fn from(e: DedupError) -> Self {
        Self::Dedup(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_kind_display() {
        assert_eq!(
            FailureKind::ClientRejected(404).to_string(),
            "rejected with HTTP 404"
        );
        assert_eq!(FailureKind::RetryExhausted.to_string(), "retries exhausted");
    }

    #[test]
    fn task_error_cancelled() {
        let err = TaskError::Fetch {
            kind: FailureKind::Cancelled,
            attempts_used: 1,
        };
        assert!(err.is_cancelled());
        assert!(!TaskError::Parse(ParseError::new("bad")).is_cancelled());
    }

    #[test]
    fn task_error_display_fetch() {
        let err = TaskError::Fetch {
            kind: FailureKind::RetryExhausted,
            attempts_used: 3,
        };
        assert_eq!(
            err.to_string(),
            "fetch retries exhausted (after 3 attempts)"
        );
    }

    #[test]
    fn parse_error_display() {
        let err = ParseError::new("unexpected EOF");
        assert_eq!(err.to_string(), "parse error: unexpected EOF");
        assert_eq!(err.message(), "unexpected EOF");
    }

    #[test]
    fn sink_error_from_io() {
        let err: SinkError = std::io::Error::other("disk gone").into();
        assert!(err.to_string().contains("disk gone"));
    }

    #[test]
    fn dedup_error_mismatch_display() {
        let err = DedupError::ParameterMismatch {
            expected: (1024, 3),
            actual: (2048, 3),
        };
        let msg = err.to_string();
        assert!(msg.contains("m=1024"));
        assert!(msg.contains("m=2048"));
    }

    #[test]
    fn transport_error_display() {
        assert_eq!(TransportError::Timeout.to_string(), "request timed out");
        assert!(TransportError::Connect("refused".into())
            .to_string()
            .contains("refused"));
    }
}
