use std::collections::BTreeSet;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("identifier pattern is a valid regex")
});

/// Declarative choice of which engine rules a scan evaluates.
///
/// A selector picks rules either by explicit id (`rules`) or by standards tag
/// (`tags`), never both. `exclude` suppresses rules in either mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSelector {
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub rules: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub exclude: BTreeSet<String>,
}

/// The active selection facet of a valid selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode<'a> {
    Rules(&'a BTreeSet<String>),
    Tags(&'a BTreeSet<String>),
}

impl RuleSelector {
    /// Select rules by explicit identifier.
    pub fn rules<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rules: ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Select every rule carrying at least one of the given tags.
    pub fn tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Layer exclusions on top of the current selection.
    pub fn excluding<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Returns the selection facet, or `None` when the selector is invalid.
    pub fn mode(&self) -> Option<SelectionMode<'_>> {
        match (self.rules.is_empty(), self.tags.is_empty()) {
            (false, true) => Some(SelectionMode::Rules(&self.rules)),
            (true, false) => Some(SelectionMode::Tags(&self.tags)),
            _ => None,
        }
    }

    /// Whether the selector statically admits a rule id.
    ///
    /// In tag mode membership is owned by the engine, so only exclusions apply.
    pub fn admits(&self, rule_id: &str) -> bool {
        if self.exclude.contains(rule_id) {
            return false;
        }
        match self.mode() {
            Some(SelectionMode::Rules(ids)) => ids.contains(rule_id),
            Some(SelectionMode::Tags(_)) => true,
            None => false,
        }
    }

    /// Validate structural invariants that can be checked without an engine.
    pub fn validate(&self) -> Result<(), SelectorError> {
        for (facet, values) in [
            ("rules", &self.rules),
            ("tags", &self.tags),
            ("exclude", &self.exclude),
        ] {
            if let Some(value) = values.iter().find(|v| !IDENTIFIER.is_match(v)) {
                return Err(SelectorError::MalformedIdentifier {
                    facet: facet.to_string(),
                    value: value.clone(),
                });
            }
        }

        match self.mode() {
            None if self.rules.is_empty() => Err(SelectorError::EmptySelection),
            None => Err(SelectorError::ConflictingModes {
                rules: self.rules.iter().cloned().collect(),
                tags: self.tags.iter().cloned().collect(),
            }),
            Some(SelectionMode::Rules(ids)) => {
                let outside: Vec<_> = self.exclude.difference(ids).cloned().collect();
                if !outside.is_empty() {
                    return Err(SelectorError::ExclusionOutsideSelection { rule_ids: outside });
                }
                if ids.is_subset(&self.exclude) {
                    return Err(SelectorError::EmptySelection);
                }
                Ok(())
            }
            Some(SelectionMode::Tags(_)) => Ok(()),
        }
    }
}

impl fmt::Display for RuleSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |set: &BTreeSet<String>| set.iter().cloned().collect::<Vec<_>>().join(",");
        match self.mode() {
            Some(SelectionMode::Rules(ids)) => write!(f, "rules[{}]", join(ids))?,
            Some(SelectionMode::Tags(tags)) => write!(f, "tags[{}]", join(tags))?,
            None => write!(f, "rules[{}] tags[{}]", join(&self.rules), join(&self.tags))?,
        }
        if !self.exclude.is_empty() {
            write!(f, " -[{}]", join(&self.exclude))?;
        }
        Ok(())
    }
}

/// Catalog authoring defects in a rule selector.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectorError {
    #[error("selector picks both rule ids {rules:?} and tags {tags:?}; use exactly one mode")]
    ConflictingModes { rules: Vec<String>, tags: Vec<String> },
    #[error("selector resolves to no rules")]
    EmptySelection,
    #[error("`{value}` is not a valid identifier in `{facet}`")]
    MalformedIdentifier { facet: String, value: String },
    #[error("excluded rule(s) {rule_ids:?} are not part of the selection")]
    ExclusionOutsideSelection { rule_ids: Vec<String> },
    #[error("engine does not know rule(s) {rule_ids:?}")]
    UnknownRules { rule_ids: Vec<String> },
}
