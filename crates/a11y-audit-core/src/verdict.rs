//! The single pass/fail decision point.

use crate::error::CheckError;
use crate::scanner::ScanResult;

/// Pass iff the scan found no violations; otherwise fail with the full, ordered list.
///
/// Impact severity plays no part: a single `minor` violation fails the check.
pub fn assert_pass(result: ScanResult) -> Result<(), CheckError> {
    if result.is_clean() {
        return Ok(());
    }
    Err(CheckError::Conformance {
        violations: result.violations,
    })
}
