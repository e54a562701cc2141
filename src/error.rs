//! Failure taxonomy of a shard run.
//!
//! Every variant wraps the underlying error transparently: `Display` and
//! `source()` are the original failure's, the variant only says in which stage
//! it happened.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShardError {
    /// Catalog lookup, driver construction or the driver's reader failed.
    #[error(transparent)]
    SourceRead(anyhow::Error),
    /// A pre-sharding hook failed.
    #[error(transparent)]
    Transform(anyhow::Error),
    /// Opening the shard store or writing one partition failed.
    #[error(transparent)]
    Write(anyhow::Error),
    #[error(transparent)]
    CatalogWrite(anyhow::Error),
    /// The run configuration is invalid.
    #[error(transparent)]
    Config(anyhow::Error),
    /// Any other failure of the execution engine.
    #[error(transparent)]
    Engine(anyhow::Error),
}

impl ShardError {
    /// Short stage name, as used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SourceRead(_) => "source_read",
            Self::Transform(_) => "transform",
            Self::Write(_) => "write",
            Self::CatalogWrite(_) => "catalog_write",
            Self::Config(_) => "config",
            Self::Engine(_) => "engine",
        }
    }

    #[must_use]
    pub fn into_inner(self) -> anyhow::Error {
        match self {
            Self::SourceRead(e)
            | Self::Transform(e)
            | Self::Write(e)
            | Self::CatalogWrite(e)
            | Self::Config(e)
            | Self::Engine(e) => e,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Stage {
    Transform,
    Write,
}

/// Marks an error raised inside an engine worker with its stage, so it can be
/// classified after the engine returns.
#[derive(Debug)]
pub(crate) struct StageError {
    pub(crate) stage: Stage,
    pub(crate) inner: anyhow::Error,
}

impl StageError {
    pub(crate) fn tag(stage: Stage, inner: anyhow::Error) -> anyhow::Error {
        anyhow::Error::new(Self { stage, inner })
    }

    /// Undo [`StageError::tag`]; untagged errors become [`ShardError::Engine`].
    pub(crate) fn classify(err: anyhow::Error) -> ShardError {
        match err.downcast::<Self>() {
            Ok(Self {
                stage: Stage::Transform,
                inner,
            }) => ShardError::Transform(inner),
            Ok(Self {
                stage: Stage::Write,
                inner,
            }) => ShardError::Write(inner),
            Err(other) => ShardError::Engine(other),
        }
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl std::error::Error for StageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn classify_recovers_stage_and_message() {
        let err = StageError::classify(StageError::tag(Stage::Write, anyhow!("disk full")));
        assert!(matches!(err, ShardError::Write(_)));
        assert_eq!(err.to_string(), "disk full");
        assert_eq!(err.kind(), "write");

        let err = StageError::classify(anyhow!("worker pool"));
        assert!(matches!(err, ShardError::Engine(_)));
    }
}
