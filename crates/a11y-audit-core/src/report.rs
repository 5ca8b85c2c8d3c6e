use std::fmt::{self, Write};
use std::str::FromStr;

use crate::catalog::{Category, Check, CheckKind};
use crate::runner::{CheckOutcome, RunReport};
use crate::scanner::Violation;

/// Format styles supported in default reporter implementations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "human" | "text" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format `{other}` (expected human or json)")),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Human => "human",
            OutputFormat::Json => "json",
        })
    }
}

/// Produce a report string from a `RunReport` using the desired format.
pub fn render_report(report: &RunReport, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Human => render_human(report),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
    }
}

fn render_human(report: &RunReport) -> anyhow::Result<String> {
    let mut out = String::new();
    writeln!(out, "Accessibility audit of {}", report.target)?;

    for (category, outcomes) in report.by_category() {
        writeln!(out)?;
        writeln!(out, "{}", category.title())?;
        for outcome in outcomes {
            render_outcome(&mut out, outcome)?;
        }
    }

    writeln!(out)?;
    writeln!(
        out,
        "{} passed, {} failed, {} total ({} ms)",
        report.passed, report.failed, report.total, report.duration_ms
    )?;
    Ok(out)
}

fn render_outcome(out: &mut String, outcome: &CheckOutcome) -> fmt::Result {
    let Some(failure) = &outcome.failure else {
        return writeln!(out, "  ✓ {} ({} ms)", outcome.name, outcome.duration_ms);
    };
    writeln!(out, "  ✗ {} [{}]", outcome.name, failure.kind)?;
    if failure.violations.is_empty() {
        return writeln!(out, "    {}", single_line(&failure.message));
    }
    for violation in &failure.violations {
        render_violation(out, violation)?;
    }
    Ok(())
}

fn render_violation(out: &mut String, violation: &Violation) -> fmt::Result {
    let impact = violation
        .impact
        .map(|impact| impact.to_string())
        .unwrap_or_else(|| "unknown".into());
    let summary = if violation.help.is_empty() {
        &violation.description
    } else {
        &violation.help
    };
    writeln!(out, "    - {} ({impact}): {}", violation.id, single_line(summary))?;
    if !violation.help_url.is_empty() {
        writeln!(out, "      {}", violation.help_url)?;
    }
    for node in &violation.nodes {
        writeln!(out, "      at {}", node.selector())?;
    }
    Ok(())
}

/// Render the checks a catalog would run, without running them.
pub fn render_checks(checks: &[Check], format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(checks)?),
        OutputFormat::Human => {
            let mut out = String::new();
            let mut current: Option<Category> = None;
            for check in checks {
                if current != Some(check.category) {
                    if current.is_some() {
                        writeln!(out)?;
                    }
                    writeln!(out, "{}", check.category.title())?;
                    current = Some(check.category);
                }
                writeln!(out, "  - {}: {}", check.name, describe(check))?;
            }
            Ok(out)
        }
    }
}

fn describe(check: &Check) -> String {
    match &check.kind {
        CheckKind::Scan(selector) => selector.to_string(),
        CheckKind::Interaction(interaction) => format!(
            "press {} then expect {} {}",
            interaction.key,
            interaction.element,
            if interaction.expect_visible { "visible" } else { "hidden" }
        ),
    }
}

fn single_line(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '\n' | '\r' => ' ',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::runner::{CheckFailure, CheckStatus};
    use crate::scanner::{Impact, NodeRef};
    use crate::target::ScanTarget;

    fn sample_report() -> RunReport {
        let mut violation = Violation::new(
            "html-has-lang",
            "Ensures every HTML document has a lang attribute",
            Some(Impact::Serious),
        )
        .with_node(NodeRef::new("html", "<html>"));
        violation.help = "<html> element must have a lang attribute".into();
        violation.help_url = "https://dequeuniversity.com/rules/axe/4.8/html-has-lang".into();

        RunReport {
            target: ScanTarget::parse("https://example.org/").unwrap(),
            total: 3,
            passed: 1,
            failed: 2,
            duration_ms: 1200,
            outcomes: vec![
                CheckOutcome {
                    category: Category::Aria,
                    name: "html element has a lang attribute".into(),
                    status: CheckStatus::Failed,
                    duration_ms: 400,
                    failure: Some(CheckFailure {
                        kind: ErrorKind::ConformanceViolation,
                        message: "1 accessibility violation(s): html-has-lang".into(),
                        violations: vec![violation],
                    }),
                },
                CheckOutcome {
                    category: Category::Focus,
                    name: "skip link".into(),
                    status: CheckStatus::Passed,
                    duration_ms: 300,
                    failure: None,
                },
                CheckOutcome {
                    category: Category::Motion,
                    name: "no marquee".into(),
                    status: CheckStatus::Failed,
                    duration_ms: 500,
                    failure: Some(CheckFailure {
                        kind: ErrorKind::Timeout,
                        message: "analysis timed out after 1m".into(),
                        violations: Vec::new(),
                    }),
                },
            ],
        }
    }

    #[test]
    fn human_report_groups_by_category() {
        let output = render_report(&sample_report(), OutputFormat::Human).unwrap();
        let focus = output.find("Focus elements").unwrap();
        let aria = output.find("Valid and correct attributes").unwrap();
        let motion = output.find("Moving text").unwrap();
        assert!(focus < aria && aria < motion);
        assert!(output.contains("  ✓ skip link (300 ms)"));
        assert!(output.contains("    - html-has-lang (serious): <html> element must have a lang attribute"));
        assert!(output.contains("      at html"));
        assert!(output.contains("[timeout]"));
        assert!(output.contains("1 passed, 2 failed, 3 total"));
    }

    #[test]
    fn json_report_is_machine_readable() {
        let output = render_report(&sample_report(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["target"], "https://example.org/");
        assert_eq!(value["failed"], 2);
        assert_eq!(value["outcomes"][0]["failure"]["kind"], "conformance_violation");
        assert_eq!(value["outcomes"][0]["failure"]["violations"][0]["id"], "html-has-lang");
        assert!(value["outcomes"][1].get("failure").is_none());
    }

    #[test]
    fn lists_builtin_checks_by_category() {
        let output = render_checks(&crate::catalog::builtin_checks(), OutputFormat::Human).unwrap();
        assert!(output.starts_with("Focus elements\n"));
        assert!(output.contains("  - document has a title: rules[document-title]"));
        assert!(output.contains("press Tab then expect text=skip to main content visible"));
    }

    #[test]
    fn parses_output_formats() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("human".parse::<OutputFormat>(), Ok(OutputFormat::Human));
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}
