//! Source tree copying and template discovery.
//!
//! The build never renders templates in place. Every template root is copied
//! into the destination directory first, and discovery then walks the copy:
//!
//! ```text
//! src/templates/               build_local/
//! ├── welcome.html     copy    ├── welcome.html    <- template
//! ├── promo/           ────▶   ├── promo/
//! │   └── sale.html            │   └── sale.html   <- template
//! └── notes.md                 └── notes.md        (copied, not rendered)
//! ```
//!
//! Files are always returned in lexical path order so builds are reproducible.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Template root does not exist: {}", .0.display())]
    MissingRoot(PathBuf),
}

/// Replace `destination` with a merged copy of every directory in `roots`.
///
/// A destination nested inside a root is not copied into itself.
pub fn copy_sources(roots: &[PathBuf], destination: &Path) -> Result<(), ScanError> {
    if destination.exists() {
        fs::remove_dir_all(destination)?;
    }
    fs::create_dir_all(destination)?;

    for root in roots {
        if !root.is_dir() {
            return Err(ScanError::MissingRoot(root.clone()));
        }
        copy_dir(root, destination)?;
    }
    Ok(())
}

/// Copy the contents of `src` into `dst`, overwriting files that exist.
pub fn copy_dir(src: &Path, dst: &Path) -> Result<(), ScanError> {
    let skip = fs::canonicalize(dst).ok();
    let walker = WalkDir::new(src)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| match &skip {
            Some(skip) => fs::canonicalize(entry.path()).map_or(true, |p| &p != skip),
            None => true,
        });

    for entry in walker {
        let entry = entry?;
        let Ok(rel) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Files under `dir` whose extension is one of `extensions`
/// (lowercase, no leading dot), compared case-insensitively.
pub fn discover_templates(dir: &Path, extensions: &[String]) -> Vec<PathBuf> {
    list_files(dir)
        .into_iter()
        .filter(|path| {
            path.extension()
                .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
                .is_some_and(|ext| extensions.contains(&ext))
        })
        .collect()
}

/// Every file under `dir`, sorted.
pub fn list_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .collect();
    files.sort();
    files
}
