// converge-core/src/runtime/apply.rs
// ============================================================================
// Module: Applier
// Description: Runs a reconciliation plan action by action.
// Purpose: Apply every action, keep going past failures, and report them.
// Dependencies: thiserror, crate::runtime::action
// ============================================================================

//! ## Overview
//! The [`Applier`] executes actions in plan order against one
//! [`ActionContext`]. A failing action is recorded in the event log and the
//! applier moves on; the actual state only reflects the actions that
//! succeeded. The run fails as a whole when any action failed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::runtime::action::Action;
use crate::runtime::action::ActionContext;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Apply run errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// One or more actions failed.
    #[error("{failed} of {total} actions failed")]
    Failed {
        /// Failed action count.
        failed: usize,
        /// Total action count.
        total: usize,
    },
}

// ============================================================================
// SECTION: Applier
// ============================================================================

/// Applies a list of actions in order.
pub struct Applier<'a> {
    /// Shared action context.
    ctx: ActionContext<'a>,
    /// Plan to run.
    actions: Vec<Action>,
}

impl<'a> Applier<'a> {
    /// Creates an applier for `actions`.
    #[must_use]
    pub const fn new(ctx: ActionContext<'a>, actions: Vec<Action>) -> Self {
        Self {
            ctx,
            actions,
        }
    }

    /// Runs every action and returns the number that succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::Failed`] when at least one action failed.
    pub fn apply(mut self) -> Result<usize, ApplyError> {
        let total = self.actions.len();
        let mut failed = 0_usize;
        for action in &self.actions {
            match action.apply(&mut self.ctx) {
                Ok(()) => {}
                Err(err) => {
                    failed += 1;
                    self.ctx
                        .event_log
                        .error(format!("Error while applying action '{action}': {err}"));
                }
            }
        }
        self.ctx
            .event_log
            .info("Apply finished")
            .field("actions", total)
            .field("failed", failed);
        if failed > 0 {
            return Err(ApplyError::Failed {
                failed,
                total,
            });
        }
        Ok(total)
    }
}
