//! Status transition engine for projects.
//!
//! A project moves PLANNING -> ACTIVE -> COMPLETED. Exactly one stock effect
//! is associated with each legal transition:
//!
//! | From     | To        | Effect on item stock                          |
//! |----------|-----------|-----------------------------------------------|
//! | PLANNING | ACTIVE    | Deduct each line's quantity (all-or-nothing)  |
//! | ACTIVE   | COMPLETED | Return quantities if `return_items`, else none|
//!
//! COMPLETED is terminal. Every other pair, including self-transitions, is a
//! state conflict. The store layer executes the returned [`StockEffect`]
//! inside a single SQLite transaction; this module only decides what the
//! effect is, so the rules stay unit-testable without a database.

use crate::errors::StoreError;
use crate::models::ProjectStatus;

/// What a legal transition does to the stock of the project's items.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StockEffect {
    /// Deduct each project-item's quantity from its item's stock.
    Deduct,
    /// Add each project-item's quantity back to its item's stock.
    Return,
    /// No stock change (completing without returning items).
    None,
}

/// Validate a requested transition and name its stock effect.
///
/// `return_items` only matters for ACTIVE -> COMPLETED; it is ignored
/// elsewhere since the transition is rejected anyway.
pub fn transition_effect(
    current: ProjectStatus,
    attempted: ProjectStatus,
    return_items: bool,
) -> Result<StockEffect, StoreError> {
    match (current, attempted) {
        (ProjectStatus::Planning, ProjectStatus::Active) => Ok(StockEffect::Deduct),
        (ProjectStatus::Active, ProjectStatus::Completed) => {
            if return_items {
                Ok(StockEffect::Return)
            } else {
                Ok(StockEffect::None)
            }
        }
        _ => Err(StoreError::InvalidTransition { current, attempted }),
    }
}

/// Whether project-items may be added in the given state.
///
/// Only PLANNING: activation is the single point where stock is committed,
/// and a line added after it would never be deducted.
pub fn can_add_items(status: ProjectStatus) -> bool {
    status == ProjectStatus::Planning
}

#[cfg(test)]
mod tests {
    use super::*;
    use ProjectStatus::*;

    #[test]
    fn activation_deducts() {
        assert_eq!(
            transition_effect(Planning, Active, false).unwrap(),
            StockEffect::Deduct
        );
        // return_items is irrelevant for activation
        assert_eq!(
            transition_effect(Planning, Active, true).unwrap(),
            StockEffect::Deduct
        );
    }

    #[test]
    fn completion_consumes_or_returns() {
        assert_eq!(
            transition_effect(Active, Completed, false).unwrap(),
            StockEffect::None
        );
        assert_eq!(
            transition_effect(Active, Completed, true).unwrap(),
            StockEffect::Return
        );
    }

    #[test]
    fn completed_is_terminal() {
        for target in [Planning, Active, Completed] {
            let err = transition_effect(Completed, target, false).unwrap_err();
            match err {
                StoreError::InvalidTransition { current, attempted } => {
                    assert_eq!(current, Completed);
                    assert_eq!(attempted, target);
                }
                other => panic!("Expected InvalidTransition, got {:?}", other),
            }
        }
    }

    #[test]
    fn every_unlisted_pair_is_rejected() {
        let legal = [(Planning, Active), (Active, Completed)];
        for from in [Planning, Active, Completed] {
            for to in [Planning, Active, Completed] {
                let result = transition_effect(from, to, false);
                if legal.contains(&(from, to)) {
                    assert!(result.is_ok(), "{} -> {} should be legal", from, to);
                } else {
                    assert!(result.is_err(), "{} -> {} should be rejected", from, to);
                }
            }
        }
    }

    #[test]
    fn skipping_planning_to_completed_is_rejected() {
        assert!(transition_effect(Planning, Completed, false).is_err());
        assert!(transition_effect(Planning, Completed, true).is_err());
    }

    #[test]
    fn items_only_addable_while_planning() {
        assert!(can_add_items(Planning));
        assert!(!can_add_items(Active));
        assert!(!can_add_items(Completed));
    }
}
