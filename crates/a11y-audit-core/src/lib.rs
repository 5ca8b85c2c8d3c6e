pub mod catalog;
pub mod error;
pub mod report;
pub mod runner;
pub mod scanner;
pub mod selector;
pub mod session;
pub mod settings;
pub mod target;
pub mod verdict;

pub use catalog::{
    builtin_checks, collect_checks, file_source::FileCheckSource, validate_checks, BuiltinChecks,
    Catalog, CatalogError, Category, Check, CheckFilter, CheckKind, CheckSource, Interaction,
};
pub use error::{CheckError, ErrorKind, Operation};
pub use report::{render_checks, render_report, OutputFormat};
pub use runner::{CheckFailure, CheckOutcome, CheckRunner, CheckStatus, RunReport};
pub use scanner::{
    axe::AxeEngine, default_scanner::DefaultScanner, AccessibilityScanner, AnalysisEngine,
    EngineError, EngineReport, Impact, NodeRef, ScanResult, TargetSelector, Violation,
};
pub use selector::{RuleSelector, SelectionMode, SelectorError};
pub use session::{
    webdriver::{BrowserKind, WebDriverConfig, WebDriverFactory},
    ElementHandle, ElementQuery, Key, Session, SessionError, SessionFactory, SessionProvider,
    WaitState,
};
pub use settings::{AuditSettings, SettingsError};
pub use target::{ScanTarget, TargetError};
pub use verdict::assert_pass;
