use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::selector::{RuleSelector, SelectorError};
use crate::session::{ElementQuery, Key};
use crate::target::ScanTarget;

pub mod file_source;

/// Reporting group of a check. Declaration order is report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Focus,
    Aria,
    Motion,
    DomStructure,
    Standards,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Focus,
        Category::Aria,
        Category::Motion,
        Category::DomStructure,
        Category::Standards,
    ];

    /// Heading used in human-readable reports.
    pub fn title(self) -> &'static str {
        match self {
            Category::Focus => "Focus elements",
            Category::Aria => "Valid and correct attributes",
            Category::Motion => "Moving text",
            Category::DomStructure => "Proper DOM order",
            Category::Standards => "Standards sweep (failures may need manual review)",
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            Category::Focus => "focus",
            Category::Aria => "aria",
            Category::Motion => "motion",
            Category::DomStructure => "dom_structure",
            Category::Standards => "standards",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Category::ALL
            .into_iter()
            .find(|category| category.slug() == normalized)
            .ok_or_else(|| {
                let known: Vec<_> = Category::ALL.iter().map(|c| c.slug()).collect();
                format!("unknown category `{s}` (expected one of {})", known.join(", "))
            })
    }
}

/// Key press followed by a visibility assertion on one element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Interaction {
    pub key: Key,
    pub element: ElementQuery,
    #[serde(default = "default_expect_visible")]
    pub expect_visible: bool,
}

fn default_expect_visible() -> bool {
    true
}

/// What a check does once its page is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Scan(RuleSelector),
    Interaction(Interaction),
}

/// One independent catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCheck")]
pub struct Check {
    pub category: Category,
    pub name: String,
    #[serde(flatten)]
    pub kind: CheckKind,
}

/// Wire shape of a check; `flatten` cannot reject unknown keys.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCheck {
    category: Category,
    name: String,
    #[serde(default)]
    scan: Option<RuleSelector>,
    #[serde(default)]
    interaction: Option<Interaction>,
}

impl TryFrom<RawCheck> for Check {
    type Error = CatalogError;

    fn try_from(raw: RawCheck) -> Result<Self, Self::Error> {
        match (raw.scan, raw.interaction) {
            (Some(selector), None) => Ok(Check::scan(raw.category, raw.name, selector)),
            (None, Some(interaction)) => Ok(Check::interaction(raw.category, raw.name, interaction)),
            _ => Err(CatalogError::AmbiguousKind { check: raw.name }),
        }
    }
}

impl Check {
    pub fn scan(category: Category, name: impl Into<String>, selector: RuleSelector) -> Self {
        Self {
            category,
            name: name.into(),
            kind: CheckKind::Scan(selector),
        }
    }

    pub fn interaction(category: Category, name: impl Into<String>, interaction: Interaction) -> Self {
        Self {
            category,
            name: name.into(),
            kind: CheckKind::Interaction(interaction),
        }
    }

    pub fn selector(&self) -> Option<&RuleSelector> {
        match &self.kind {
            CheckKind::Scan(selector) => Some(selector),
            CheckKind::Interaction(_) => None,
        }
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.name.trim().is_empty() {
            return Err(CatalogError::EmptyName {
                category: self.category,
            });
        }
        match &self.kind {
            CheckKind::Scan(selector) => {
                selector
                    .validate()
                    .map_err(|source| CatalogError::InvalidSelector {
                        check: self.name.clone(),
                        source,
                    })
            }
            CheckKind::Interaction(interaction) => {
                let query = match &interaction.element {
                    ElementQuery::Css(q) | ElementQuery::XPath(q) | ElementQuery::Text(q) => q,
                };
                if query.trim().is_empty() {
                    return Err(CatalogError::EmptyElementQuery {
                        check: self.name.clone(),
                    });
                }
                Ok(())
            }
        }
    }
}

/// Defects in how a catalog was authored.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("a check in category `{category}` has a blank name")]
    EmptyName { category: Category },
    #[error("check name `{0}` is used more than once")]
    DuplicateName(String),
    #[error("check `{check}` has an invalid rule selector: {source}")]
    InvalidSelector {
        check: String,
        #[source]
        source: SelectorError,
    },
    #[error("check `{check}` has an empty element query")]
    EmptyElementQuery { check: String },
    #[error("check `{check}` must define exactly one of `scan` or `interaction`")]
    AmbiguousKind { check: String },
}

/// Validate every check and reject repeated names, independent of any target.
pub fn validate_checks(checks: &[Check]) -> Result<(), CatalogError> {
    let mut seen = HashSet::new();
    for check in checks {
        check.validate()?;
        if !seen.insert(check.name.as_str()) {
            return Err(CatalogError::DuplicateName(check.name.clone()));
        }
    }
    Ok(())
}

/// Concatenate the checks of every source, in source order, and validate the result.
pub async fn collect_checks(sources: &[Box<dyn CheckSource>]) -> AnyResult<Vec<Check>> {
    let mut checks = Vec::new();
    for source in sources {
        checks.extend(source.load_checks().await?);
    }
    validate_checks(&checks)?;
    Ok(checks)
}

/// Source of check definitions (built-in list, files, ...).
#[async_trait]
pub trait CheckSource: Send + Sync {
    async fn load_checks(&self) -> AnyResult<Vec<Check>>;
}

/// The checks every audit runs unless filtered out.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinChecks;

#[async_trait]
impl CheckSource for BuiltinChecks {
    async fn load_checks(&self) -> AnyResult<Vec<Check>> {
        Ok(builtin_checks())
    }
}

pub fn builtin_checks() -> Vec<Check> {
    let rule = |category, name: &str, id: &str| Check::scan(category, name, RuleSelector::rules([id]));
    let tag = |name: &str, tag: &str| Check::scan(Category::Standards, name, RuleSelector::tags([tag]));

    vec![
        Check::interaction(
            Category::Focus,
            "skip to main content link appears on first Tab",
            Interaction {
                key: Key::Tab,
                element: ElementQuery::Text("skip to main content".into()),
                expect_visible: true,
            },
        ),
        rule(Category::Aria, "body is not aria-hidden", "aria-hidden-body"),
        rule(Category::Aria, "ARIA roles have required attributes", "aria-required-attr"),
        rule(Category::Aria, "ARIA attributes are valid aria- names", "aria-valid-attr"),
        rule(Category::Aria, "document has a title", "document-title"),
        rule(Category::Aria, "active element ids are unique", "duplicate-id-active"),
        rule(Category::Aria, "ARIA-referenced ids are unique", "duplicate-id"),
        rule(Category::Aria, "html element has a lang attribute", "html-has-lang"),
        rule(Category::Aria, "html lang attribute is valid", "html-lang-valid"),
        rule(Category::Motion, "no blink elements", "blink"),
        rule(Category::Motion, "no marquee elements", "marquee"),
        rule(Category::DomStructure, "lists contain only allowed children", "list"),
        rule(Category::DomStructure, "list items are inside lists", "listitem"),
        rule(Category::DomStructure, "definition lists are well formed", "definition-list"),
        rule(Category::DomStructure, "dt and dd are inside dl", "dlitem"),
        tag("WCAG 2.0 level A", "wcag2a"),
        tag("WCAG 2.0 level AA", "wcag2aa"),
        tag("WCAG 2.1 level A", "wcag21a"),
        tag("WCAG 2.1 level AA", "wcag21aa"),
        // skip-link is covered by the Tab interaction above.
        Check::scan(
            Category::Standards,
            "best practices",
            RuleSelector::tags(["best-practice"]).excluding(["skip-link"]),
        ),
    ]
}

/// Selects a subset of checks by category and name.
#[derive(Debug, Clone, Default)]
pub struct CheckFilter {
    /// Empty means every category.
    pub categories: Vec<Category>,
    pub name: Option<Regex>,
}

impl CheckFilter {
    pub fn matches(&self, check: &Check) -> bool {
        let category_ok = self.categories.is_empty() || self.categories.contains(&check.category);
        let name_ok = self
            .name
            .as_ref()
            .map_or(true, |pattern| pattern.is_match(&check.name));
        category_ok && name_ok
    }
}

/// Ordered, validated checks bound to one scan target.
#[derive(Debug, Clone)]
pub struct Catalog {
    target: ScanTarget,
    checks: Vec<Check>,
}

impl Catalog {
    pub fn new(target: ScanTarget, checks: Vec<Check>) -> Result<Self, CatalogError> {
        validate_checks(&checks)?;
        Ok(Self { target, checks })
    }

    /// The built-in catalog against `target`.
    pub fn standard(target: ScanTarget) -> Result<Self, CatalogError> {
        Self::new(target, builtin_checks())
    }

    pub async fn from_sources(
        target: ScanTarget,
        sources: &[Box<dyn CheckSource>],
    ) -> AnyResult<Self> {
        let checks = collect_checks(sources).await?;
        Ok(Self { target, checks })
    }

    pub fn target(&self) -> &ScanTarget {
        &self.target
    }

    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Keep only the checks the filter matches, preserving order.
    pub fn filtered(&self, filter: &CheckFilter) -> Self {
        Self {
            target: self.target.clone(),
            checks: self
                .checks
                .iter()
                .filter(|check| filter.matches(check))
                .cloned()
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> ScanTarget {
        ScanTarget::parse("https://example.org/").unwrap()
    }

    #[test]
    fn builtin_catalog_is_valid_and_covers_every_category() {
        let catalog = Catalog::standard(target()).unwrap();
        assert_eq!(catalog.len(), 20);
        for category in Category::ALL {
            assert!(
                catalog.checks().iter().any(|c| c.category == category),
                "no built-in check in {category}"
            );
        }
    }

    #[test]
    fn best_practice_sweep_excludes_skip_link() {
        let checks = builtin_checks();
        let sweep = checks
            .iter()
            .find(|c| c.name == "best practices")
            .and_then(Check::selector)
            .unwrap();
        assert!(sweep.tags.contains("best-practice"));
        assert!(sweep.exclude.contains("skip-link"));
    }

    #[test]
    fn rejects_duplicate_names() {
        let check = Check::scan(Category::Motion, "no blink", RuleSelector::rules(["blink"]));
        let err = Catalog::new(target(), vec![check.clone(), check]).unwrap_err();
        assert_eq!(err, CatalogError::DuplicateName("no blink".into()));
    }

    #[test]
    fn rejects_invalid_selectors_at_construction() {
        let check = Check::scan(Category::Standards, "broken", RuleSelector::default());
        assert!(matches!(
            Catalog::new(target(), vec![check]),
            Err(CatalogError::InvalidSelector { source: SelectorError::EmptySelection, .. })
        ));
    }

    #[test]
    fn filters_by_category_and_name() {
        let catalog = Catalog::standard(target()).unwrap();
        let filter = CheckFilter {
            categories: vec![Category::Standards],
            name: Some(Regex::new("WCAG 2\\.1").unwrap()),
        };
        let names: Vec<_> = catalog
            .filtered(&filter)
            .checks()
            .iter()
            .map(|c| c.name.clone())
            .collect();
        assert_eq!(names, ["WCAG 2.1 level A", "WCAG 2.1 level AA"]);
        assert_eq!(catalog.filtered(&CheckFilter::default()).len(), catalog.len());
    }

    #[test]
    fn parses_category_names() {
        assert_eq!("dom-structure".parse::<Category>(), Ok(Category::DomStructure));
        assert_eq!("ARIA".parse::<Category>(), Ok(Category::Aria));
        assert!("layout".parse::<Category>().is_err());
    }

    #[test]
    fn check_entries_need_exactly_one_kind() {
        let both = serde_json::json!({
            "category": "dom_structure",
            "name": "mixed",
            "scan": { "rules": ["list"] },
            "interaction": { "key": "tab", "element": { "css": "nav" } }
        });
        let err = serde_json::from_value::<Check>(both).unwrap_err();
        assert!(err.to_string().contains("exactly one of `scan` or `interaction`"));

        let neither = serde_json::json!({ "category": "aria", "name": "empty" });
        assert!(serde_json::from_value::<Check>(neither).is_err());
    }

    #[test]
    fn check_entries_reject_unknown_keys() {
        let typo = serde_json::json!({
            "category": "focus",
            "name": "escape closes menu",
            "interaction": { "key": "escape", "element": { "css": "#menu" } },
            "expct_visible": false
        });
        let err = serde_json::from_value::<Check>(typo).unwrap_err();
        assert!(err.to_string().contains("expct_visible"));
    }

    #[test]
    fn validates_checks_without_a_target() {
        assert_eq!(validate_checks(&builtin_checks()), Ok(()));
        let mut checks = builtin_checks();
        checks.push(builtin_checks()[9].clone());
        assert_eq!(
            validate_checks(&checks),
            Err(CatalogError::DuplicateName("no blink elements".into()))
        );
    }

    #[tokio::test]
    async fn assembles_catalog_from_sources() {
        let sources: Vec<Box<dyn CheckSource>> = vec![Box::new(BuiltinChecks)];
        let catalog = Catalog::from_sources(target(), &sources).await.unwrap();
        assert_eq!(catalog.target().as_str(), "https://example.org/");
        assert_eq!(catalog.checks()[0].category, Category::Focus);
    }
}
