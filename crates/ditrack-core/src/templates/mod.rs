//! Comment template selection.
//!
//! Selection is a pure function of `(previous_state, current_state)` over an
//! immutable [`CommentTemplates`] value built once at startup:
//!
//! 1. every transition rule whose `previous_states` contains the previous
//!    state and whose `current_states` contains the current state, in
//!    declared order (a transition may match several rules)
//! 2. every state rule naming the current state, in declared order
//! 3. the default template, always last
//!
//! Callers wanting one template take the first element.

pub mod render;

pub use render::{TemplateFields, render};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::SyncError;

/// Template chosen when leaving one set of states for another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRule {
    pub previous_states: BTreeSet<String>,
    pub current_states: BTreeSet<String>,
    pub template: String,
}

/// Template chosen for entering a state from anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRule {
    pub state: String,
    pub template: String,
}

/// Immutable comment-template configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentTemplates {
    #[serde(default)]
    transitions: Vec<TransitionRule>,
    #[serde(default)]
    states: Vec<StateRule>,
    #[serde(rename = "default", default = "default_template")]
    default_template: String,
}

impl CommentTemplates {
    #[must_use]
    pub const fn new(
        transitions: Vec<TransitionRule>,
        states: Vec<StateRule>,
        default_template: String,
    ) -> Self {
        Self {
            transitions,
            states,
            default_template,
        }
    }

    #[must_use]
    pub fn transitions(&self) -> &[TransitionRule] {
        &self.transitions
    }

    #[must_use]
    pub fn states(&self) -> &[StateRule] {
        &self.states
    }

    #[must_use]
    pub fn default_template(&self) -> &str {
        &self.default_template
    }

    /// Ordered candidate templates for a transition; never empty.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidArgument`] when either state is empty.
    pub fn select(&self, previous_state: &str, current_state: &str) -> Result<Vec<String>, SyncError> {
        if previous_state.is_empty() {
            return Err(SyncError::InvalidArgument(
                "previous state must be a non-empty string".to_string(),
            ));
        }
        if current_state.is_empty() {
            return Err(SyncError::InvalidArgument(
                "current state must be a non-empty string".to_string(),
            ));
        }

        let transitions = self
            .transitions
            .iter()
            .filter(|rule| {
                rule.previous_states.contains(previous_state)
                    && rule.current_states.contains(current_state)
            })
            .map(|rule| rule.template.clone());

        let states = self
            .states
            .iter()
            .filter(|rule| rule.state == current_state)
            .map(|rule| rule.template.clone());

        Ok(transitions
            .chain(states)
            .chain(std::iter::once(self.default_template.clone()))
            .collect())
    }

    /// Highest-priority template for a transition.
    ///
    /// # Errors
    ///
    /// Same as [`CommentTemplates::select`].
    pub fn first(&self, previous_state: &str, current_state: &str) -> Result<String, SyncError> {
        let mut candidates = self.select(previous_state, current_state)?;
        // select always appends the default, so there is at least one.
        Ok(candidates.swap_remove(0))
    }
}

/// Free-function form of [`CommentTemplates::select`].
///
/// # Errors
///
/// Returns [`SyncError::InvalidArgument`] when either state is empty.
pub fn select(
    previous_state: &str,
    current_state: &str,
    config: &CommentTemplates,
) -> Result<Vec<String>, SyncError> {
    config.select(previous_state, current_state)
}

fn default_template() -> String {
    "Deficient Item moved from {{previousState}} to {{currentState}}\
     {{#firstName}} by {{firstName}} {{lastName}}{{/firstName}}\
     {{#email}} ({{email}}){{/email}}"
        .to_string()
}

fn states(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|name| (*name).to_string()).collect()
}

impl Default for CommentTemplates {
    fn default() -> Self {
        Self {
            transitions: vec![
                TransitionRule {
                    previous_states: states(&["requires-action", "go-back"]),
                    current_states: states(&["pending"]),
                    template: "Deficient Item moved from {{previousState}} to {{currentState}}\
                               {{#firstName}} by {{firstName}} {{lastName}}{{/firstName}}\
                               {{#email}} ({{email}}){{/email}}\n\
                               {{#currentDueDateDay}}Due date: {{currentDueDateDay}}\n{{/currentDueDateDay}}\
                               {{#currentResponsibilityGroup}}Responsibility group: {{currentResponsibilityGroup}}\n{{/currentResponsibilityGroup}}\
                               {{#currentPlanToFix}}Plan to fix: {{currentPlanToFix}}{{/currentPlanToFix}}"
                        .to_string(),
                },
                TransitionRule {
                    previous_states: states(&["requires-action", "go-back"]),
                    current_states: states(&["completed"]),
                    template: "Deficient Item completed{{#firstName}} by {{firstName}} {{lastName}}{{/firstName}}\
                               {{#email}} ({{email}}){{/email}}\n\
                               {{#currentCompleteNowReason}}Complete now reason: {{currentCompleteNowReason}}{{/currentCompleteNowReason}}"
                        .to_string(),
                },
                TransitionRule {
                    previous_states: states(&["pending"]),
                    current_states: states(&["incomplete"]),
                    template: "Deficient Item marked incomplete{{#firstName}} by {{firstName}} {{lastName}}{{/firstName}}\n\
                               {{#currentReasonIncomplete}}Reason incomplete: {{currentReasonIncomplete}}{{/currentReasonIncomplete}}"
                        .to_string(),
                },
            ],
            states: vec![
                StateRule {
                    state: "deferred".to_string(),
                    template: "Deficient Item deferred{{#firstName}} by {{firstName}} {{lastName}}{{/firstName}}\n\
                               {{#currentDeferredDateDay}}Deferred until: {{currentDeferredDateDay}}{{/currentDeferredDateDay}}"
                        .to_string(),
                },
                StateRule {
                    state: "go-back".to_string(),
                    template: "Deficient Item sent back to {{currentState}}{{#firstName}} by {{firstName}} {{lastName}}{{/firstName}}"
                        .to_string(),
                },
                StateRule {
                    state: "closed".to_string(),
                    template: "Deficient Item closed{{#firstName}} by {{firstName}} {{lastName}}{{/firstName}}"
                        .to_string(),
                },
            ],
            default_template: default_template(),
        }
    }
}
