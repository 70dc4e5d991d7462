use std::sync::Arc;

use thiserror::Error;

/// Errors surfaced by the tree model and the refresh coordinator.
///
/// The type is `Clone` because one in-flight refresh hands the same outcome to
/// every caller waiting on it.
#[derive(Debug, Clone, Error)]
pub enum TreeError {
    #[error("invalid tree location {location:?}")]
    LocationNotFound { location: Vec<usize> },
    #[error("tree element not found")]
    ElementNotFound,
    #[error("children provider failed: {0:#}")]
    Provider(Arc<anyhow::Error>),
}

impl TreeError {
    pub fn location(location: &[usize]) -> Self {
        Self::LocationNotFound {
            location: location.to_vec(),
        }
    }

    pub fn provider(err: anyhow::Error) -> Self {
        Self::Provider(Arc::new(err))
    }
}

pub type Result<T, E = TreeError> = std::result::Result<T, E>;
