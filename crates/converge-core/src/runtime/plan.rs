// converge-core/src/runtime/plan.rs
// ============================================================================
// Module: Plan Rendering
// Description: Human-readable rendering of an action list.
// Purpose: Show what an apply would do before running it.
// Dependencies: crate::runtime::action
// ============================================================================

//! ## Overview
//! [`plan_text`] groups component actions by kind under fixed headings.
//! Service-level keys are bookkeeping for the deploy plugins and are left
//! out, as are endpoint refreshes and the trailing post-process action.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::is_service_key;
use crate::runtime::action::Action;

// ============================================================================
// SECTION: Rendering
// ============================================================================

/// Section headings in render order.
const HEADINGS: [&str; 5] = [
    "Create Instances",
    "Destroy Instances",
    "Update Instances",
    "Add Consumers",
    "Remove Consumers",
];

/// Renders `actions` as a grouped plan. An empty plan renders `No changes`.
#[must_use]
pub fn plan_text(actions: &[Action]) -> String {
    let mut sections: [Vec<String>; 5] = Default::default();
    for action in actions {
        let Some(key) = action.key() else {
            continue;
        };
        if is_service_key(key) {
            continue;
        }
        let slot = match action {
            Action::ComponentCreate {
                ..
            } => 0,
            Action::ComponentDelete {
                ..
            } => 1,
            Action::ComponentUpdate {
                ..
            } => 2,
            Action::ComponentAttachDependency {
                ..
            } => 3,
            Action::ComponentDetachDependency {
                ..
            } => 4,
            Action::ComponentEndpoints {
                ..
            }
            | Action::ClustersPostProcess => continue,
        };
        sections[slot].push(action.describe());
    }

    let mut out = Vec::new();
    for (heading, lines) in HEADINGS.iter().zip(sections.iter()) {
        if lines.is_empty() {
            continue;
        }
        out.push(format!("{heading} ({})\n", lines.len()));
        out.extend(lines.iter().map(|line| format!("  {line}\n")));
    }
    if out.is_empty() {
        return "No changes\n".to_string();
    }
    out.concat()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions are permitted."
    )]

    use super::*;

    #[test]
    fn groups_component_actions_and_skips_service_keys() {
        let actions = vec![
            Action::ComponentCreate {
                key: "c1#kafka#test#kafka#broker".to_string(),
            },
            Action::ComponentCreate {
                key: "c1#kafka#test#kafka#root".to_string(),
            },
            Action::ComponentAttachDependency {
                key: "c1#kafka#test#kafka#broker".to_string(),
                dependency: "alice_kafka".to_string(),
            },
            Action::ComponentEndpoints {
                key: "c1#kafka#test#kafka#broker".to_string(),
            },
            Action::ClustersPostProcess,
        ];
        let text = plan_text(&actions);
        assert_eq!(
            text,
            "Create Instances (1)\n  [+] c1#kafka#test#kafka#broker\nAdd Consumers (1)\n  [>] \
             c1#kafka#test#kafka#broker = alice_kafka\n"
        );
    }

    #[test]
    fn empty_plan_reports_no_changes() {
        assert_eq!(plan_text(&[Action::ClustersPostProcess]), "No changes\n");
    }
}
