use std::fmt;

/// Errors setting up a collation
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("worker count must be at least 1")]
    NoWorkers,

    #[error("failed to spawn worker {id}: {source}")]
    Spawn {
        id: usize,
        #[source]
        source: std::io::Error,
    },
}

/// How an entry point invocation failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// The entry point returned an error
    Error,

    /// The entry point panicked and the panic was caught
    Panic,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => f.write_str("error"),
            Self::Panic => f.write_str("panic"),
        }
    }
}

/// A failed invocation, captured as data on the worker side
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ProcessingFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ProcessingFailure {
    pub fn error(err: &anyhow::Error) -> Self {
        Self {
            kind: FailureKind::Error,
            message: format!("{err:#}"),
        }
    }

    pub fn panic(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Panic,
            message: message.into(),
        }
    }
}

/// Result of running the entry point on one item
pub type Outcome<T> = Result<T, ProcessingFailure>;
