use assert_cmd::Command;
use predicates::str::contains;
use std::fs::write;

fn cli() -> Command {
    let mut cmd = Command::cargo_bin("a11y-audit-cli").unwrap();
    cmd.env_remove("A11Y_AUDIT_CATALOG");
    cmd.env("RUST_LOG", "warn");
    cmd
}

#[test]
fn lists_builtin_checks_grouped_by_category() {
    cli()
        .arg("list-checks")
        .assert()
        .success()
        .stdout(contains("20 check(s) in catalog"))
        .stdout(contains("Focus elements"))
        .stdout(contains("Proper DOM order"))
        .stdout(contains("html element has a lang attribute: rules[html-has-lang]"))
        .stdout(contains("best practices: tags[best-practice] -[skip-link]"));
}

#[test]
fn lists_checks_as_json() {
    let output = cli().args(["list-checks", "--json"]).output().unwrap();
    assert!(output.status.success());
    let checks: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let checks = checks.as_array().unwrap();
    assert_eq!(checks.len(), 20);
    assert_eq!(checks[0]["category"], "focus");
    assert_eq!(checks[0]["interaction"]["key"], "tab");
    assert_eq!(checks[1]["scan"]["rules"][0], "aria-hidden-body");
}

#[test]
fn appends_checks_from_catalog_file() {
    let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    write(
        file.path(),
        "checks:\n  - category: aria\n    name: images have alt text\n    scan:\n      rules: [image-alt]\n",
    )
    .unwrap();

    cli()
        .args(["list-checks", "--catalog", file.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("21 check(s) in catalog"))
        .stdout(contains("images have alt text: rules[image-alt]"));
}

#[test]
fn rejects_duplicate_check_names() {
    let file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write(
        file.path(),
        r#"{"checks": [{"category": "motion", "name": "no blink elements", "scan": {"rules": ["blink"]}}]}"#,
    )
    .unwrap();

    cli()
        .args(["list-checks", "--catalog", file.path().to_str().unwrap()])
        .assert()
        .failure()
        .stderr(contains("no blink elements"));
}

#[test]
fn uses_catalog_from_environment_and_config() {
    let file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
    write(
        file.path(),
        "checks:\n  - category: motion\n    name: no autoplaying media\n    scan:\n      rules: [no-autoplay-audio]\n",
    )
    .unwrap();
    let catalog = file.path().to_str().unwrap();

    cli()
        .arg("list-checks")
        .env("A11Y_AUDIT_CATALOG", catalog)
        .assert()
        .success()
        .stdout(contains("21 check(s) in catalog"))
        .stdout(contains("no autoplaying media: rules[no-autoplay-audio]"));

    let config = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    write(config.path(), format!("catalog: {catalog:?}\n")).unwrap();
    cli()
        .args(["--config", config.path().to_str().unwrap(), "list-checks", "--json"])
        .assert()
        .success()
        .stdout(contains("no autoplaying media"));
}

#[test]
fn unrelated_prefixed_variables_do_not_break_listing() {
    cli()
        .arg("list-checks")
        .env("A11Y_AUDIT_LOG_LEVEL", "debug")
        .assert()
        .success()
        .stdout(contains("20 check(s) in catalog"));
}
