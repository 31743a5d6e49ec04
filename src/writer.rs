//! Writes rendered templates to their final location.
//!
//! A rendered template is first written over its copied source in the
//! destination tree, then moved:
//!
//! - to `<root>/<permalink>` when the effective config has a permalink,
//!   replacing any file already there;
//! - otherwise to `<stem>.<build.destination.extension>` beside the source.
//!
//! Both steps happen before the next template starts, and either failing is a
//! [`WriteError`].

use crate::resolve::EffectiveConfig;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("failed to write {}", path.display())]
pub struct WriteError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Where the output for `source_path` ends up.
pub fn final_path(source_path: &Path, effective: &EffectiveConfig, root: &Path) -> PathBuf {
    match effective.permalink() {
        Some(permalink) => root.join(permalink),
        None => source_path.with_extension(&effective.config.build.destination.extension),
    }
}

/// Write `html` and relocate it. Returns the final path.
pub fn write(
    html: &str,
    source_path: &Path,
    effective: &EffectiveConfig,
    root: &Path,
) -> Result<PathBuf, WriteError> {
    let at = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| WriteError { path, source }
    };

    fs::write(source_path, html).map_err(at(source_path))?;

    let target = final_path(source_path, effective, root);
    if target == source_path {
        return Ok(target);
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(at(parent))?;
    }
    move_file(source_path, &target).map_err(at(&target))?;
    tracing::debug!("{} -> {}", source_path.display(), target.display());
    Ok(target)
}

/// Rename, falling back to copy + remove across filesystems.
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if to.is_file() {
        fs::remove_file(to)?;
    }
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)?;
    fs::remove_file(from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfig;
    use tempfile::TempDir;

    fn effective(config: BuildConfig) -> EffectiveConfig {
        EffectiveConfig::unmerged(&config, "local").unwrap()
    }

    #[test]
    fn renames_to_destination_extension() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("build_local/welcome.mjml");
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        fs::write(&source, "raw").unwrap();

        let mut config = BuildConfig::default();
        config.build.destination.extension = "php".to_string();
        let out = write("<p>done</p>", &source, &effective(config), tmp.path()).unwrap();

        assert_eq!(out, tmp.path().join("build_local/welcome.php"));
        assert_eq!(fs::read_to_string(&out).unwrap(), "<p>done</p>");
        assert!(!source.exists());
    }

    #[test]
    fn same_extension_stays_in_place() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("a.html");
        fs::write(&source, "raw").unwrap();
        let out = write("new", &source, &effective(BuildConfig::default()), tmp.path()).unwrap();
        assert_eq!(out, source);
        assert_eq!(fs::read_to_string(&out).unwrap(), "new");
    }

    #[test]
    fn permalink_moves_and_overwrites() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("build_local/a.html");
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        fs::write(&source, "raw").unwrap();
        let target = tmp.path().join("out/deep/x.html");
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(&target, "stale").unwrap();

        let mut config = BuildConfig::default();
        config.permalink = Some("out/deep/x.html".to_string());
        let out = write("fresh", &source, &effective(config), tmp.path()).unwrap();

        assert_eq!(out, target);
        assert_eq!(fs::read_to_string(&target).unwrap(), "fresh");
        assert!(!source.exists());
    }

    #[test]
    fn permalink_creates_parent_dirs() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("a.html");
        fs::write(&source, "raw").unwrap();
        let mut config = BuildConfig::default();
        config.permalink = Some("new/dir/a.html".to_string());
        let out = write("x", &source, &effective(config), tmp.path()).unwrap();
        assert!(out.is_file());
    }

    #[test]
    fn unwritable_source_is_a_write_error() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("missing-dir/a.html");
        let err = write("x", &source, &effective(BuildConfig::default()), tmp.path()).unwrap_err();
        assert_eq!(err.path, source);
    }
}
