use std::{sync::Arc, time::Duration};

use tracing::{debug, instrument};

use super::{AccessibilityScanner, AnalysisEngine, EngineError, ScanResult, Violation};
use crate::error::{CheckError, Operation};
use crate::selector::{RuleSelector, SelectionMode, SelectorError};
use crate::session::Session;

/// Scanner that delegates to an analysis engine and enforces the selection contract on its output.
pub struct DefaultScanner<E: AnalysisEngine> {
    engine: Arc<E>,
    analysis_timeout: Duration,
}

impl<E: AnalysisEngine> DefaultScanner<E> {
    pub fn new(engine: Arc<E>, analysis_timeout: Duration) -> Self {
        Self {
            engine,
            analysis_timeout,
        }
    }

    fn timeout_error(&self) -> CheckError {
        CheckError::Timeout {
            operation: Operation::Analysis,
            budget: self.analysis_timeout,
        }
    }
}

#[async_trait::async_trait]
impl<E> AccessibilityScanner for DefaultScanner<E>
where
    E: AnalysisEngine + 'static,
{
    #[instrument(name = "scan_page", skip_all, fields(selector = %selector))]
    async fn scan(
        &self,
        session: &mut dyn Session,
        selector: &RuleSelector,
    ) -> Result<ScanResult, CheckError> {
        selector.validate()?;

        let analysis =
            tokio::time::timeout(self.analysis_timeout, self.engine.analyze(session, selector)).await;
        let report = match analysis {
            Err(_) => return Err(self.timeout_error()),
            Ok(Err(EngineError::Session(err))) if err.is_timeout() => {
                return Err(self.timeout_error())
            }
            Ok(Err(err)) => return Err(CheckError::Analysis(err.to_string())),
            Ok(Ok(report)) => report,
        };

        if !report.unknown_rules.is_empty() {
            return Err(SelectorError::UnknownRules {
                rule_ids: report.unknown_rules,
            }
            .into());
        }
        if !report.unknown_exclusions.is_empty() {
            return Err(SelectorError::ExclusionOutsideSelection {
                rule_ids: report.unknown_exclusions,
            }
            .into());
        }
        if report.rules_evaluated == 0 {
            return Err(SelectorError::EmptySelection.into());
        }
        if let Some(stray) = report
            .violations
            .iter()
            .find(|violation| !within_selection(selector, violation))
        {
            return Err(CheckError::Analysis(format!(
                "engine reported rule `{}` outside selection {}",
                stray.id, selector
            )));
        }

        debug!(
            rules_evaluated = report.rules_evaluated,
            violations = report.violations.len(),
            "scan completed"
        );
        Ok(ScanResult::new(report.violations))
    }
}

fn within_selection(selector: &RuleSelector, violation: &Violation) -> bool {
    if !selector.admits(&violation.id) {
        return false;
    }
    match selector.mode() {
        Some(SelectionMode::Tags(tags)) if !violation.tags.is_empty() => {
            violation.tags.iter().any(|tag| tags.contains(tag))
        }
        _ => true,
    }
}
