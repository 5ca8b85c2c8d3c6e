//! Executes catalog checks, one fresh browser session per check.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument};

use crate::catalog::{Catalog, Category, Check, CheckKind, Interaction};
use crate::error::{CheckError, ErrorKind, Operation};
use crate::scanner::{AccessibilityScanner, Violation};
use crate::session::{Session, SessionProvider, WaitState};
use crate::target::ScanTarget;
use crate::verdict::assert_pass;

pub const DEFAULT_ELEMENT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_PARALLELISM: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Passed,
    Failed,
}

/// Why a check failed, in a form reports can serialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckFailure {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
}

impl From<CheckError> for CheckFailure {
    fn from(err: CheckError) -> Self {
        let kind = err.kind();
        let message = err.to_string();
        Self {
            kind,
            message,
            violations: err.into_violations(),
        }
    }
}

/// Result of running a single check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub category: Category,
    pub name: String,
    pub status: CheckStatus,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<CheckFailure>,
}

impl CheckOutcome {
    fn new(check: &Check, result: Result<(), CheckError>, elapsed: Duration) -> Self {
        let (status, failure) = match result {
            Ok(()) => (CheckStatus::Passed, None),
            Err(err) => (CheckStatus::Failed, Some(CheckFailure::from(err))),
        };
        Self {
            category: check.category,
            name: check.name.clone(),
            status,
            duration_ms: elapsed.as_millis() as u64,
            failure,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == CheckStatus::Passed
    }
}

/// Result of running a whole catalog, outcomes in catalog order.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub target: ScanTarget,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub outcomes: Vec<CheckOutcome>,
}

impl RunReport {
    pub fn success(&self) -> bool {
        self.failed == 0
    }

    pub fn by_category(&self) -> BTreeMap<Category, Vec<&CheckOutcome>> {
        let mut groups: BTreeMap<Category, Vec<&CheckOutcome>> = BTreeMap::new();
        for outcome in &self.outcomes {
            groups.entry(outcome.category).or_default().push(outcome);
        }
        groups
    }
}

/// Runs checks against a target, each in an isolated session.
#[derive(Clone)]
pub struct CheckRunner {
    provider: SessionProvider,
    scanner: Arc<dyn AccessibilityScanner>,
    element_timeout: Duration,
    parallelism: usize,
}

impl CheckRunner {
    pub fn new(provider: SessionProvider, scanner: Arc<dyn AccessibilityScanner>) -> Self {
        Self {
            provider,
            scanner,
            element_timeout: DEFAULT_ELEMENT_TIMEOUT,
            parallelism: DEFAULT_PARALLELISM,
        }
    }

    pub fn with_element_timeout(mut self, timeout: Duration) -> Self {
        self.element_timeout = timeout;
        self
    }

    /// Maximum number of sessions alive at once. Zero is treated as one.
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Run every check of the catalog concurrently (bounded) and collect outcomes in catalog order.
    pub async fn run(&self, catalog: &Catalog) -> RunReport {
        let start = Instant::now();
        let checks = catalog.checks();
        info!(url = %catalog.target(), checks = checks.len(), "running accessibility checks");

        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let mut tasks = JoinSet::new();
        for (index, check) in checks.iter().cloned().enumerate() {
            let runner = self.clone();
            let target = catalog.target().clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (index, runner.run_check(&target, &check).await)
            });
        }

        let mut slots: Vec<Option<CheckOutcome>> = vec![None; checks.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(err) => error!(error = %err, "check task aborted"),
            }
        }

        let outcomes: Vec<CheckOutcome> = slots
            .into_iter()
            .zip(checks)
            .map(|(slot, check)| {
                slot.unwrap_or_else(|| {
                    CheckOutcome::new(
                        check,
                        Err(CheckError::Session("check task aborted".into())),
                        Duration::ZERO,
                    )
                })
            })
            .collect();

        let passed = outcomes.iter().filter(|o| o.passed()).count();
        let failed = outcomes.len() - passed;
        let duration_ms = start.elapsed().as_millis() as u64;
        info!(passed, failed, duration_ms, "accessibility checks finished");

        RunReport {
            target: catalog.target().clone(),
            total: outcomes.len(),
            passed,
            failed,
            duration_ms,
            outcomes,
        }
    }

    /// Run one check in its own session. The session is released on every path.
    #[instrument(name = "check", skip_all, fields(check = %check.name))]
    pub async fn run_check(&self, target: &ScanTarget, check: &Check) -> CheckOutcome {
        let start = Instant::now();
        let result = self.execute(target, check).await;
        let outcome = CheckOutcome::new(check, result, start.elapsed());
        match &outcome.failure {
            None => info!("✓ {} ({} ms)", outcome.name, outcome.duration_ms),
            Some(failure) => error!("✗ {} - {}", outcome.name, failure.message),
        }
        outcome
    }

    async fn execute(&self, target: &ScanTarget, check: &Check) -> Result<(), CheckError> {
        if let CheckKind::Scan(selector) = &check.kind {
            selector.validate()?;
        }

        let mut session = self.provider.open(target).await?;
        let result = match &check.kind {
            CheckKind::Scan(selector) => match self.scanner.scan(session.as_mut(), selector).await {
                Ok(scan) => assert_pass(scan),
                Err(err) => Err(err),
            },
            CheckKind::Interaction(interaction) => self.interact(session.as_mut(), interaction).await,
        };
        self.provider.release(session).await;
        result
    }

    async fn interact(
        &self,
        session: &mut dyn Session,
        interaction: &Interaction,
    ) -> Result<(), CheckError> {
        debug!(key = %interaction.key, element = %interaction.element, "pressing key");
        session
            .key_down(interaction.key)
            .await
            .map_err(|err| CheckError::Session(err.to_string()))?;

        // The driver polls on its own clock; a stalled request must not outlive the budget.
        let waited = tokio::time::timeout(
            self.element_timeout,
            session.wait_for_element(&interaction.element, WaitState::Attached, self.element_timeout),
        )
        .await;
        let element = match waited {
            Ok(Ok(element)) => element,
            Ok(Err(err)) if !err.is_timeout() => return Err(CheckError::Session(err.to_string())),
            // An element that never shows up satisfies "not visible".
            _ if !interaction.expect_visible => return Ok(()),
            _ => {
                return Err(CheckError::Timeout {
                    operation: Operation::ElementWait,
                    budget: self.element_timeout,
                })
            }
        };

        let visible = session
            .is_visible(&element)
            .await
            .map_err(|err| CheckError::Session(err.to_string()))?;
        if visible != interaction.expect_visible {
            return Err(CheckError::Expectation(format!(
                "expected {} to be {} after pressing {}",
                interaction.element,
                if interaction.expect_visible { "visible" } else { "hidden" },
                interaction.key
            )));
        }
        Ok(())
    }
}
