use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::CheckError;
use crate::selector::RuleSelector;
use crate::session::{Session, SessionError};

pub mod axe;
pub mod default_scanner;

/// Severity the engine attaches to a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Minor,
    Moderate,
    Serious,
    Critical,
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Impact::Minor => "minor",
            Impact::Moderate => "moderate",
            Impact::Serious => "serious",
            Impact::Critical => "critical",
        })
    }
}

/// One selector in a node's target path. Nodes inside shadow roots carry a selector chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetSelector {
    Css(String),
    Shadow(Vec<String>),
}

impl fmt::Display for TargetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetSelector::Css(css) => f.write_str(css),
            TargetSelector::Shadow(chain) => f.write_str(&chain.join(" >>> ")),
        }
    }
}

/// DOM node implicated in a violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRef {
    #[serde(default)]
    pub target: Vec<TargetSelector>,
    #[serde(default)]
    pub html: String,
    #[serde(default, alias = "failureSummary", skip_serializing_if = "Option::is_none")]
    pub failure_summary: Option<String>,
}

impl NodeRef {
    pub fn new(selector: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            target: vec![TargetSelector::Css(selector.into())],
            html: html.into(),
            failure_summary: None,
        }
    }

    /// Target path rendered as a single selector string.
    pub fn selector(&self) -> String {
        self.target
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A failing rule instance as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub impact: Option<Impact>,
    #[serde(default)]
    pub help: String,
    #[serde(default, alias = "helpUrl")]
    pub help_url: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub nodes: Vec<NodeRef>,
}

impl Violation {
    pub fn new(id: impl Into<String>, description: impl Into<String>, impact: Option<Impact>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            impact,
            help: String::new(),
            help_url: String::new(),
            tags: Vec::new(),
            nodes: Vec::new(),
        }
    }

    pub fn with_node(mut self, node: NodeRef) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

/// Output of one analysis call, in engine order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub violations: Vec<Violation>,
}

impl ScanResult {
    pub fn new(violations: Vec<Violation>) -> Self {
        Self { violations }
    }

    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn rule_ids(&self) -> impl Iterator<Item = &str> {
        self.violations.iter().map(|v| v.id.as_str())
    }
}

/// Raw engine answer before the scanner applies its contract checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineReport {
    #[serde(default)]
    pub violations: Vec<Violation>,
    /// Number of rules the engine actually ran.
    #[serde(default)]
    pub rules_evaluated: usize,
    /// Selected rule ids the engine does not define.
    #[serde(default)]
    pub unknown_rules: Vec<String>,
    /// Excluded rule ids that are not part of the engine's selection.
    #[serde(default)]
    pub unknown_exclusions: Vec<String>,
}

/// Failures of the analysis capability itself, as opposed to findings.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("failed to load engine script from {path}: {reason}")]
    Script { path: String, reason: String },
    #[error("engine error: {0}")]
    Engine(String),
    #[error("unexpected engine output: {0}")]
    Malformed(String),
}

/// External rule engine that inspects the live document of a session.
#[async_trait]
pub trait AnalysisEngine: Send + Sync {
    async fn analyze(
        &self,
        session: &mut dyn Session,
        selector: &RuleSelector,
    ) -> Result<EngineReport, EngineError>;
}

/// Runs a rule selection against a session and returns normalized results.
#[async_trait]
pub trait AccessibilityScanner: Send + Sync {
    async fn scan(
        &self,
        session: &mut dyn Session,
        selector: &RuleSelector,
    ) -> Result<ScanResult, CheckError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_engine_violation_shape() {
        let raw = json!({
            "id": "duplicate-id-active",
            "impact": "serious",
            "tags": ["cat.parsing", "wcag2a", "wcag411"],
            "description": "Ensures every id attribute value of active elements is unique",
            "help": "IDs of active elements must be unique",
            "helpUrl": "https://dequeuniversity.com/rules/axe/4.8/duplicate-id-active",
            "nodes": [
                {
                    "target": ["#menu"],
                    "html": "<a id=\"menu\" href=\"/\">Home</a>",
                    "failureSummary": "Fix any of the following: ..."
                },
                {
                    "target": [["my-widget", "#menu"]],
                    "html": "<button id=\"menu\">Open</button>"
                }
            ]
        });
        let violation: Violation = serde_json::from_value(raw).unwrap();
        assert_eq!(violation.impact, Some(Impact::Serious));
        assert!(violation.help_url.ends_with("duplicate-id-active"));
        assert_eq!(violation.nodes.len(), 2);
        assert_eq!(violation.nodes[0].selector(), "#menu");
        assert_eq!(violation.nodes[1].selector(), "my-widget >>> #menu");
        assert!(violation.nodes[1].failure_summary.is_none());
    }

    #[test]
    fn tolerates_null_impact() {
        let violation: Violation = serde_json::from_value(json!({
            "id": "region",
            "description": "content in landmarks",
            "impact": null
        }))
        .unwrap();
        assert_eq!(violation.impact, None);
        assert!(violation.nodes.is_empty());
    }

    #[test]
    fn impact_orders_by_severity() {
        assert!(Impact::Critical > Impact::Serious);
        assert!(Impact::Minor < Impact::Moderate);
    }
}
