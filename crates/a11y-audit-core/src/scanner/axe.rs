use std::{fs, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, instrument};

use super::{AnalysisEngine, EngineError, EngineReport, Violation};
use crate::selector::{RuleSelector, SelectionMode};
use crate::session::Session;

/// Checks the selection against the engine's rule registry, then runs `axe.run` and hands
/// the outcome to the callback. Runs after the axe-core source in the same script body.
const RUN_AXE: &str = r#"
var options = arguments[0];
var selection = arguments[1];
var done = arguments[arguments.length - 1];
var fail = function (err) {
  done({ ok: false, error: String((err && err.message) || err) });
};
try {
  var ids = function (rules) { return rules.map(function (r) { return r.ruleId; }); };
  var known = ids(window.axe.getRules());
  var unknownRules = selection.rules.filter(function (id) { return known.indexOf(id) === -1; });
  var selected = selection.tags.length ? ids(window.axe.getRules(selection.tags)) : selection.rules;
  var unknownExclusions = selection.exclude.filter(function (id) { return selected.indexOf(id) === -1; });
  if (unknownRules.length || unknownExclusions.length) {
    done({ ok: true, violations: [], rulesEvaluated: 0, unknownRules: unknownRules, unknownExclusions: unknownExclusions });
    return;
  }
  window.axe.run(document, options).then(function (results) {
    var evaluated = results.passes.length + results.violations.length
      + results.incomplete.length + results.inapplicable.length;
    done({ ok: true, violations: results.violations, rulesEvaluated: evaluated, unknownRules: [], unknownExclusions: [] });
  }, fail);
} catch (err) {
  fail(err);
}
"#;

/// Inline the engine source ahead of the run script; pages without `'unsafe-eval'` in their
/// Content-Security-Policy still accept WebDriver script bodies.
fn compose_script(source: &str) -> String {
    format!("if (typeof window.axe === 'undefined') {{\n{source}\n}}\n{RUN_AXE}")
}

/// Analysis engine backed by the axe-core script, loaded once from disk.
pub struct AxeEngine {
    script_path: PathBuf,
    script: OnceCell<Arc<str>>,
}

impl AxeEngine {
    /// Engine that reads `axe.min.js` (or any axe-core build) from `script_path` on first use.
    pub fn new(script_path: impl Into<PathBuf>) -> Self {
        Self {
            script_path: script_path.into(),
            script: OnceCell::new(),
        }
    }

    /// Engine with the script source already in memory.
    pub fn from_source(source: impl Into<String>) -> Self {
        let source: String = source.into();
        Self {
            script_path: PathBuf::from("<inline>"),
            script: OnceCell::with_value(Arc::from(compose_script(&source))),
        }
    }

    /// The full script sent to the browser: engine source followed by the run logic.
    fn script(&self) -> Result<Arc<str>, EngineError> {
        self.script
            .get_or_try_init(|| {
                fs::read_to_string(&self.script_path)
                    .map(|source| Arc::from(compose_script(&source)))
                    .map_err(|err| EngineError::Script {
                        path: self.script_path.display().to_string(),
                        reason: err.to_string(),
                    })
            })
            .cloned()
    }
}

#[async_trait]
impl AnalysisEngine for AxeEngine {
    #[instrument(name = "axe_run", skip_all, fields(session = session.id()))]
    async fn analyze(
        &self,
        session: &mut dyn Session,
        selector: &RuleSelector,
    ) -> Result<EngineReport, EngineError> {
        let script = self.script()?;
        let args = vec![
            run_options(selector),
            json!({
                "rules": selector.rules,
                "tags": selector.tags,
                "exclude": selector.exclude,
            }),
        ];
        let raw = session.execute_async(&script, args).await?;
        let report = parse_outcome(raw)?;
        debug!(
            rules_evaluated = report.rules_evaluated,
            violations = report.violations.len(),
            "axe run finished"
        );
        Ok(report)
    }
}

/// Translate a selector into `axe.run` options.
pub fn run_options(selector: &RuleSelector) -> Value {
    let mut options = json!({ "resultTypes": ["violations"] });
    match selector.mode() {
        Some(SelectionMode::Rules(ids)) => {
            options["runOnly"] = json!({ "type": "rule", "values": ids });
        }
        Some(SelectionMode::Tags(tags)) => {
            options["runOnly"] = json!({ "type": "tag", "values": tags });
        }
        None => {}
    }
    if !selector.exclude.is_empty() {
        let rules: Map<String, Value> = selector
            .exclude
            .iter()
            .map(|id| (id.clone(), json!({ "enabled": false })))
            .collect();
        options["rules"] = Value::Object(rules);
    }
    options
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOutcome {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    violations: Vec<Violation>,
    #[serde(default)]
    rules_evaluated: usize,
    #[serde(default)]
    unknown_rules: Vec<String>,
    #[serde(default)]
    unknown_exclusions: Vec<String>,
}

fn parse_outcome(raw: Value) -> Result<EngineReport, EngineError> {
    if raw.is_null() {
        return Err(EngineError::Malformed(
            "script completed without a result".into(),
        ));
    }
    let outcome: RawOutcome =
        serde_json::from_value(raw).map_err(|err| EngineError::Malformed(err.to_string()))?;
    if !outcome.ok {
        return Err(EngineError::Engine(
            outcome.error.unwrap_or_else(|| "unknown failure".into()),
        ));
    }
    Ok(EngineReport {
        violations: outcome.violations,
        rules_evaluated: outcome.rules_evaluated,
        unknown_rules: outcome.unknown_rules,
        unknown_exclusions: outcome.unknown_exclusions,
    })
}
