//! Shared test utilities for the mailforge test suite.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = setup_fixtures();
//! let summary = build::build(tmp.path(), "local", None).unwrap();
//!
//! let html = read_output(&tmp, "build_local/welcome.html");
//! assert!(html.contains("Welcome to Acme Mail"));
//! ```

use std::path::Path;
use tempfile::TempDir;

// =========================================================================
// Fixture setup
// =========================================================================

/// A private copy of `fixtures/project/` to build into.
pub fn setup_fixtures() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/project");
    crate::scan::copy_dir(&fixtures, tmp.path()).unwrap();
    tmp
}

// =========================================================================
// Output lookups
// =========================================================================

/// Read a file under the project root. Panics with the files present on miss.
pub fn read_output(tmp: &TempDir, rel: &str) -> String {
    let path = tmp.path().join(rel);
    std::fs::read_to_string(&path).unwrap_or_else(|e| {
        let present: Vec<String> = walkdir::WalkDir::new(tmp.path())
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().strip_prefix(tmp.path()).unwrap().display().to_string())
            .collect();
        panic!("cannot read {rel}: {e}. Present: {present:?}")
    })
}
