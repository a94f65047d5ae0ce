//! Typed error hierarchy for the inventory backend.
//!
//! `StoreError` is the single error type returned by the store layer and the
//! transition engine. The API layer maps each variant to an HTTP status and a
//! stable machine-readable code (see `api::ApiError`). Variants describing an
//! invariant violation carry enough data for the message to name the
//! offending entity and the shortfall.

use thiserror::Error;

use crate::models::ProjectStatus;

/// Errors from the store layer and the status transition engine.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Item {id} not found")]
    ItemNotFound { id: i64 },

    #[error("Project {id} not found")]
    ProjectNotFound { id: i64 },

    #[error("Inventory {id} not found")]
    InventoryNotFound { id: i64 },

    #[error("User '{0}' not found")]
    UserNotFound(String),

    #[error("Username '{0}' is already taken")]
    UsernameTaken(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Insufficient stock for '{name}': requested {requested}, available {available}")]
    InsufficientStock {
        item_id: i64,
        name: String,
        requested: i64,
        available: i64,
    },

    #[error("Cannot transition project from {current} to {attempted}")]
    InvalidTransition {
        current: ProjectStatus,
        attempted: ProjectStatus,
    },

    #[error("Project is {status}; items can only be added while the project is PLANNING")]
    ProjectNotPlanning { status: ProjectStatus },

    #[error("Project is {status}; only PLANNING projects can be deleted")]
    ProjectNotDeletable { status: ProjectStatus },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_stock_names_item_and_shortfall() {
        let err = StoreError::InsufficientStock {
            item_id: 7,
            name: "10k resistor".to_string(),
            requested: 5,
            available: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("10k resistor"));
        assert!(msg.contains("requested 5"));
        assert!(msg.contains("available 2"));
    }

    #[test]
    fn invalid_transition_names_both_states() {
        let err = StoreError::InvalidTransition {
            current: ProjectStatus::Completed,
            attempted: ProjectStatus::Active,
        };
        let msg = err.to_string();
        assert!(msg.contains("COMPLETED"));
        assert!(msg.contains("ACTIVE"));
    }

    #[test]
    fn not_found_variants_carry_id() {
        let err = StoreError::ItemNotFound { id: 42 };
        assert!(err.to_string().contains("42"));
        assert!(matches!(err, StoreError::ItemNotFound { id: 42 }));
    }

    #[test]
    fn all_variants_implement_std_error() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&StoreError::LockPoisoned);
        assert_std_error(&StoreError::Validation("x".into()));
    }
}
