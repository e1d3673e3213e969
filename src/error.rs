//! Engine error taxonomy

use crate::bundle::{ErrorSet, PathError};
use crate::graph::GraphError;
use thiserror::Error;

/// Errors raised by the persistence, event, ACL and query layers
#[derive(Error, Debug)]
pub enum EngineError {
    /// Schema violations collected across a whole bundle tree
    #[error("Validation failed: {0}")]
    Validation(ErrorSet),

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    /// ID collision on create
    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Delete would orphan descendants the caller did not consent to remove
    #[error("Hierarchy error: {0}")]
    Hierarchy(String),

    /// A graph entity could not be converted to a bundle
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid bundle text: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error("Bundle path error: {0}")]
    Path(#[from] PathError),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),
}

impl EngineError {
    pub fn not_found(id: impl Into<String>) -> Self {
        EngineError::ItemNotFound(id.into())
    }

    /// Validation error with a single message on one key
    pub fn invalid(key: &str, message: impl Into<String>) -> Self {
        let mut errors = ErrorSet::new();
        errors.add_error(key, message);
        EngineError::Validation(errors)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::ItemNotFound(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(EngineError::not_found("us-c1").to_string(), "Item not found: us-c1");
        let err = EngineError::invalid("identifier", "is required");
        match &err {
            EngineError::Validation(set) => assert_eq!(set.error_count(), 1),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_graph_error_conversion() {
        fn fails() -> EngineResult<()> {
            Err(GraphError::NodeNotFound(crate::graph::NodeId::new(4)))?;
            Ok(())
        }
        assert!(matches!(fails(), Err(EngineError::Graph(_))));
    }
}
