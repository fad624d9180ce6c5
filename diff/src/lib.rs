use std::collections::BTreeSet;

use displaydoc::Display;
use thiserror::Error;

use converge_api::{DesiredConfig, FieldName, FieldValue, OperationRequest};

/// Compute the set of fields whose desired value differs from the last
/// applied configuration.
///
/// Comparison is structural: nested values compare deeply, set-valued fields
/// compare unordered. A field removed from `desired` counts as changed.
/// `plan(d, d)` is always empty, so re-applying an unchanged configuration
/// issues no modify call at all.
pub fn plan(desired: &DesiredConfig, last_applied: &DesiredConfig) -> BTreeSet<FieldName> {
    let mut changed = BTreeSet::new();

    for (name, value) in desired.iter() {
        if last_applied.get(name.as_str()) != Some(value) {
            changed.insert(name.clone());
        }
    }
    for (name, _) in last_applied.iter() {
        if !desired.contains(name.as_str()) {
            changed.insert(name.clone());
        }
    }

    changed
}

/// Full create payload from the desired configuration.
pub fn create_request(desired: &DesiredConfig) -> OperationRequest {
    desired
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Modify payload carrying only the changed fields still present in
/// `desired`. Everything omitted keeps its current remote value, which means
/// a field removed from `desired` cannot be expressed here: the payload for a
/// removal-only change set is empty and callers must not send it.
pub fn update_request(
    changed: &BTreeSet<FieldName>,
    desired: &DesiredConfig,
) -> OperationRequest {
    desired
        .iter()
        .filter(|&(name, _)| changed.contains(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Field-group constraint tied to a resource mode.
///
/// When `mode_field` holds `mode`, every field in `requires` must be present
/// and every field in `forbids` must be absent. Violations are detected
/// locally, before any remote call is issued.
#[derive(Debug, Clone)]
pub struct ModeRule {
    pub mode_field: FieldName,
    pub mode: FieldValue,
    pub requires: Vec<FieldName>,
    pub forbids: Vec<FieldName>,
}

impl ModeRule {
    pub fn new(mode_field: impl Into<FieldName>, mode: impl Into<FieldValue>) -> Self {
        Self {
            mode_field: mode_field.into(),
            mode: mode.into(),
            requires: Vec::new(),
            forbids: Vec::new(),
        }
    }

    pub fn requires(mut self, field: impl Into<FieldName>) -> Self {
        self.requires.push(field.into());
        self
    }

    pub fn forbids(mut self, field: impl Into<FieldName>) -> Self {
        self.forbids.push(field.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum Violation {
    /// field `{field}` is required when `{mode_field}` is `{mode}`
    MissingRequired {
        field: FieldName,
        mode_field: FieldName,
        mode: String,
    },
    /// field `{field}` is not allowed when `{mode_field}` is `{mode}`
    Forbidden {
        field: FieldName,
        mode_field: FieldName,
        mode: String,
    },
}

/// All mode-rule violations found in one configuration, enumerable so a
/// caller can report every contradiction at once.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid configuration: {}", list(.violations))]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

fn list(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Check `desired` against the mode rules, collecting every violation.
pub fn validate(desired: &DesiredConfig, rules: &[ModeRule]) -> Result<(), ValidationError> {
    let mut violations = Vec::new();

    for rule in rules {
        let Some(mode) = desired.get(rule.mode_field.as_str()) else {
            continue;
        };
        if *mode != rule.mode {
            continue;
        }

        for field in &rule.requires {
            if !desired.contains(field.as_str()) {
                violations.push(Violation::MissingRequired {
                    field: field.clone(),
                    mode_field: rule.mode_field.clone(),
                    mode: rule.mode.to_string(),
                });
            }
        }
        for field in &rule.forbids {
            if desired.contains(field.as_str()) {
                violations.push(Violation::Forbidden {
                    field: field.clone(),
                    mode_field: rule.mode_field.clone(),
                    mode: rule.mode.to_string(),
                });
            }
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { violations })
    }
}
