//! Stylesheet compilation.
//!
//! CSS is compiled once per build, before any template is read, and exposed
//! to every template as the `css` expression local.

use crate::config::BuildConfig;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StyleError {
    #[error("cannot read stylesheet {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Compile(String),
}

/// Produces the CSS text for a build.
pub trait StyleProvider {
    fn compile(&self, config: &BuildConfig, env: &str, root: &Path) -> Result<String, StyleError>;
}

/// Concatenates the files listed in `build.styles.css`, in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct CssFiles;

impl StyleProvider for CssFiles {
    fn compile(&self, config: &BuildConfig, env: &str, root: &Path) -> Result<String, StyleError> {
        let mut css = String::new();
        for file in &config.build.styles.css {
            let path = root.join(file);
            let content = fs::read_to_string(&path).map_err(|source| StyleError::Read {
                path: path.clone(),
                source,
            })?;
            if !css.is_empty() && !css.ends_with('\n') {
                css.push('\n');
            }
            css.push_str(&content);
        }
        tracing::debug!(
            "compiled {} stylesheet(s) for {env} ({} bytes)",
            config.build.styles.css.len(),
            css.len()
        );
        Ok(css)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LOCAL_ENV;
    use tempfile::TempDir;

    #[test]
    fn no_stylesheets_is_empty_css() {
        let tmp = TempDir::new().unwrap();
        let css = CssFiles
            .compile(&BuildConfig::default(), LOCAL_ENV, tmp.path())
            .unwrap();
        assert_eq!(css, "");
    }

    #[test]
    fn stylesheets_concatenate_in_order() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("css")).unwrap();
        fs::write(tmp.path().join("css/base.css"), "body{margin:0}").unwrap();
        fs::write(tmp.path().join("css/extra.css"), ".btn{color:red}\n").unwrap();

        let mut config = BuildConfig::default();
        config.build.styles.css = vec!["css/base.css".into(), "css/extra.css".into()];
        let css = CssFiles.compile(&config, LOCAL_ENV, tmp.path()).unwrap();
        assert_eq!(css, "body{margin:0}\n.btn{color:red}\n");
    }

    #[test]
    fn missing_stylesheet_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let mut config = BuildConfig::default();
        config.build.styles.css = vec!["gone.css".into()];
        let err = CssFiles.compile(&config, LOCAL_ENV, tmp.path()).unwrap_err();
        assert!(err.to_string().contains("gone.css"));
    }
}
