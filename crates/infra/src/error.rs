use thiserror::Error;

use merchledger_core::DomainError;

/// Persistence failure. Always fatal to the operation that hit it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store lock poisoned: {0}")]
    Poisoned(&'static str),

    #[error("record already exists: {0}")]
    Duplicate(String),

    #[error("record not found: {0}")]
    Missing(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Failure reported by an external collaborator (catalog, rights balances).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{collaborator} failed: {message}")]
pub struct CollaboratorError {
    pub collaborator: &'static str,
    pub message: String,
}

impl CollaboratorError {
    pub fn new(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self {
            collaborator,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

impl ServiceError {
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            ServiceError::Domain(err) => Some(err),
            ServiceError::Store(_) | ServiceError::Collaborator(_) => None,
        }
    }

    /// Retrying later may succeed (stock may be replenished or released).
    pub fn is_retryable(&self) -> bool {
        self.as_domain().is_some_and(DomainError::is_retryable)
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use merchledger_core::ProductId;

    #[test]
    fn domain_errors_pass_through_transparently() {
        let err: ServiceError = DomainError::insufficient_inventory(ProductId::new(), 5, 2).into();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("requested 5"));
    }

    #[test]
    fn store_errors_are_not_retryable() {
        let err: ServiceError = StoreError::Poisoned("reservations").into();
        assert!(!err.is_retryable());
        assert!(err.as_domain().is_none());
    }
}
