use std::path::{Path, PathBuf};

use a11y_audit_core::{
    collect_checks, render_checks, render_report, BrowserKind, BuiltinChecks, Catalog, Category,
    CheckFilter, CheckSource, FileCheckSource, OutputFormat,
};
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use regex::Regex;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod settings;

#[derive(Parser, Debug)]
#[command(
    name = "a11y-audit",
    author,
    version,
    about = "Accessibility conformance checks for a live web page"
)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the check catalog against the target (default)
    Run(RunArgs),
    /// List catalog checks without starting a browser
    ListChecks {
        /// Emit checks as JSON instead of human-readable text
        #[arg(long)]
        json: bool,
        /// Extra check file (YAML, JSON or JSON5); defaults to `catalog` from config or environment
        #[arg(long, value_name = "FILE")]
        catalog: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Page to audit
    #[arg(long, value_name = "URL")]
    target: Option<String>,
    /// WebDriver endpoint (chromedriver, geckodriver, msedgedriver or a grid)
    #[arg(long, value_name = "URL")]
    webdriver_url: Option<String>,
    /// chrome, firefox or edge
    #[arg(long)]
    browser: Option<BrowserKind>,
    /// Extra check file (YAML, JSON or JSON5) appended to the built-in catalog
    #[arg(long, value_name = "FILE")]
    catalog: Option<PathBuf>,
    /// Only run checks in this category (repeatable)
    #[arg(long = "category", value_name = "CATEGORY")]
    categories: Vec<Category>,
    /// Only run checks whose name matches this regex
    #[arg(long, value_name = "PATTERN")]
    grep: Option<String>,
    /// Maximum number of browser sessions at once
    #[arg(long)]
    parallelism: Option<usize>,
    /// Report format: human or json
    #[arg(long, default_value_t = OutputFormat::Human)]
    format: OutputFormat,
}

impl RunArgs {
    fn overrides(&self) -> settings::Overrides {
        settings::Overrides {
            target: self.target.clone(),
            webdriver_url: self.webdriver_url.clone(),
            browser: self.browser,
            catalog: self.catalog.clone(),
            parallelism: self.parallelism,
        }
    }

    fn filter(&self) -> Result<CheckFilter> {
        let name = self
            .grep
            .as_deref()
            .map(Regex::new)
            .transpose()
            .context("invalid --grep pattern")?;
        Ok(CheckFilter {
            categories: self.categories.clone(),
            name,
        })
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let command = cli.command.unwrap_or_else(|| Commands::Run(RunArgs::default()));
    match command {
        Commands::Run(args) => {
            if !run(cli.config.as_deref(), args).await? {
                std::process::exit(1);
            }
        }
        Commands::ListChecks { json, catalog } => {
            let catalog = settings::catalog(cli.config.as_deref(), catalog.as_deref())?;
            list_checks(catalog.as_deref(), json).await?
        }
    }
    Ok(())
}

/// Returns whether every check passed.
async fn run(config: Option<&Path>, args: RunArgs) -> Result<bool> {
    let (settings, target) = settings::load(config, &args.overrides())?;
    let catalog = Catalog::from_sources(target, &sources(settings.catalog.as_deref()))
        .await?
        .filtered(&args.filter()?);
    if catalog.is_empty() {
        bail!("no checks match the given --category/--grep filters");
    }

    let runner = settings.build_runner()?;
    info!(browser = %settings.browser, webdriver = %settings.webdriver_url, "starting audit");
    let report = runner.run(&catalog).await;
    println!("{}", render_report(&report, args.format)?);

    if report.success() {
        eprintln!("{}", format!("all {} check(s) passed", report.total).green());
    } else {
        eprintln!(
            "{}",
            format!("{} of {} check(s) failed", report.failed, report.total).red()
        );
    }
    Ok(report.success())
}

async fn list_checks(catalog: Option<&Path>, json: bool) -> Result<()> {
    let checks = collect_checks(&sources(catalog)).await?;

    let format = if json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    if !json {
        println!("{} check(s) in catalog\n", checks.len());
    }
    print!("{}", render_checks(&checks, format)?);
    if json {
        println!();
    }
    Ok(())
}

fn sources(catalog: Option<&Path>) -> Vec<Box<dyn CheckSource>> {
    let mut sources: Vec<Box<dyn CheckSource>> = vec![Box::new(BuiltinChecks)];
    if let Some(path) = catalog {
        sources.push(Box::new(FileCheckSource::new(path)));
    }
    sources
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,reqwest=warn,hyper=warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
