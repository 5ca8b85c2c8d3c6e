use std::{fs, path::PathBuf};

use anyhow::{bail, Context, Result};
use once_cell::sync::OnceCell;
use serde::Deserialize;

use super::{Check, CheckSource};

/// Loads extra checks from a YAML, JSON or JSON5 file with a top-level `checks` list.
pub struct FileCheckSource {
    path: PathBuf,
    cache: OnceCell<Vec<Check>>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    #[serde(default)]
    checks: Vec<Check>,
}

impl FileCheckSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: OnceCell::new(),
        }
    }

    fn read(&self) -> Result<Vec<Check>> {
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read catalog file at {}", self.path.display()))?;
        let extension = self
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let file: CatalogFile = match extension.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&raw).with_context(|| {
                format!("invalid YAML in catalog file {}", self.path.display())
            })?,
            "json" | "json5" => json5::from_str(&raw).with_context(|| {
                format!("invalid JSON in catalog file {}", self.path.display())
            })?,
            other => bail!(
                "unsupported catalog file extension `{other}` for {} (expected yaml, yml, json or json5)",
                self.path.display()
            ),
        };
        for check in &file.checks {
            check.validate().with_context(|| {
                format!("invalid check in catalog file {}", self.path.display())
            })?;
        }
        Ok(file.checks)
    }
}

#[async_trait::async_trait]
impl CheckSource for FileCheckSource {
    async fn load_checks(&self) -> Result<Vec<Check>> {
        let checks = self.cache.get_or_try_init(|| self.read())?;
        Ok(checks.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Category, CheckKind, Interaction};
    use crate::selector::RuleSelector;
    use crate::session::{ElementQuery, Key};
    use std::path::Path;

    fn write(path: &Path, contents: &str) {
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn loads_yaml_checks() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("extra.yaml");
        write(
            &path,
            r##"
checks:
  - category: aria
    name: images have alt text
    scan:
      rules: [image-alt]
  - category: standards
    name: best practices without regions
    scan:
      tags: [best-practice]
      exclude: [region]
  - category: focus
    name: escape closes menu
    interaction:
      key: escape
      element:
        css: "#menu"
      expect_visible: false
"##,
        );

        let source = FileCheckSource::new(&path);
        let checks = futures::executor::block_on(source.load_checks()).unwrap();
        assert_eq!(checks.len(), 3);
        assert_eq!(
            checks[0].kind,
            CheckKind::Scan(RuleSelector::rules(["image-alt"]))
        );
        assert_eq!(
            checks[1].selector(),
            Some(&RuleSelector::tags(["best-practice"]).excluding(["region"]))
        );
        assert_eq!(
            checks[2].kind,
            CheckKind::Interaction(Interaction {
                key: Key::Escape,
                element: ElementQuery::Css("#menu".into()),
                expect_visible: false,
            })
        );
        assert_eq!(checks[2].category, Category::Focus);
    }

    #[test]
    fn loads_json5_checks() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("extra.json5");
        write(
            &path,
            r#"{
  // comments are allowed in json5
  checks: [
    { category: "motion", name: "no autoplaying media", scan: { rules: ["no-autoplay-audio"] } },
  ],
}"#,
        );
        let checks = futures::executor::block_on(FileCheckSource::new(&path).load_checks()).unwrap();
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].category, Category::Motion);
    }

    #[test]
    fn rejects_conflicting_selector_modes() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("broken.yml");
        write(
            &path,
            "checks:\n  - category: aria\n    name: mixed\n    scan:\n      rules: [list]\n      tags: [wcag2a]\n",
        );
        let err = futures::executor::block_on(FileCheckSource::new(&path).load_checks())
            .unwrap_err();
        assert!(format!("{err:#}").contains("use exactly one mode"));
    }

    #[test]
    fn rejects_entries_mixing_scan_and_interaction() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("mixed.yaml");
        write(
            &path,
            r##"
checks:
  - category: dom_structure
    name: lists and menu
    scan:
      rules: [list]
    interaction:
      key: escape
      element:
        css: "#menu"
"##,
        );
        let err = futures::executor::block_on(FileCheckSource::new(&path).load_checks())
            .unwrap_err();
        assert!(format!("{err:#}").contains("exactly one of `scan` or `interaction`"));
    }

    #[test]
    fn rejects_misspelled_check_keys() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("typo.yaml");
        write(
            &path,
            "checks:\n  - category: motion\n    name: no blink\n    scan:\n      rules: [blink]\n    expct_visible: false\n",
        );
        let err = futures::executor::block_on(FileCheckSource::new(&path).load_checks())
            .unwrap_err();
        assert!(format!("{err:#}").contains("expct_visible"));
    }

    #[test]
    fn rejects_unknown_extensions() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("checks.toml");
        write(&path, "checks = []");
        let err = futures::executor::block_on(FileCheckSource::new(&path).load_checks())
            .unwrap_err();
        assert!(err.to_string().contains("unsupported catalog file extension"));
    }
}
