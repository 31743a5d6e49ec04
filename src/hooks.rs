//! Lifecycle hooks for embedding programs.
//!
//! | Hook | When |
//! |------|------|
//! | `before_create` | once, after templates are discovered |
//! | `before_render` | per template, before the first pipeline stage |
//! | `after_render` | per template, after the last pipeline stage |
//! | `after_build` | once, after assets are copied, with every output file |
//!
//! All methods have no-op defaults, so an implementation overrides only the
//! hooks it needs.

use crate::config::BuildConfig;
use crate::resolve::EffectiveConfig;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("{0}")]
pub struct HookError(pub String);

pub trait BuildHooks {
    fn before_create(&self, _config: &BuildConfig) -> Result<(), HookError> {
        Ok(())
    }

    fn before_render(&self, html: String, _page: &EffectiveConfig) -> Result<String, HookError> {
        Ok(html)
    }

    fn after_render(&self, html: String, _page: &EffectiveConfig) -> Result<String, HookError> {
        Ok(html)
    }

    fn after_build(&self, _files: &[PathBuf]) -> Result<(), HookError> {
        Ok(())
    }
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl BuildHooks for NoHooks {}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every hook call; optionally rewrites rendered HTML.
    #[derive(Default)]
    pub struct RecordingHooks {
        pub calls: Mutex<Vec<String>>,
        pub after_build_files: Mutex<Vec<PathBuf>>,
        pub append_after_render: Option<String>,
    }

    impl RecordingHooks {
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl BuildHooks for RecordingHooks {
        fn before_create(&self, _config: &BuildConfig) -> Result<(), HookError> {
            self.calls.lock().unwrap().push("before_create".to_string());
            Ok(())
        }

        fn before_render(&self, html: String, _page: &EffectiveConfig) -> Result<String, HookError> {
            self.calls.lock().unwrap().push("before_render".to_string());
            Ok(html)
        }

        fn after_render(&self, html: String, _page: &EffectiveConfig) -> Result<String, HookError> {
            self.calls.lock().unwrap().push("after_render".to_string());
            Ok(match &self.append_after_render {
                Some(suffix) => format!("{html}{suffix}"),
                None => html,
            })
        }

        fn after_build(&self, files: &[PathBuf]) -> Result<(), HookError> {
            self.calls.lock().unwrap().push("after_build".to_string());
            *self.after_build_files.lock().unwrap() = files.to_vec();
            Ok(())
        }
    }

    #[test]
    fn no_hooks_pass_html_through() {
        let config = BuildConfig::default();
        let page = EffectiveConfig::unmerged(&config, "local").unwrap();
        let html = NoHooks.after_render("<p>x</p>".to_string(), &page).unwrap();
        assert_eq!(html, "<p>x</p>");
        assert!(NoHooks.before_create(&config).is_ok());
    }

    #[test]
    fn recording_hooks_record_order() {
        let config = BuildConfig::default();
        let page = EffectiveConfig::unmerged(&config, "local").unwrap();
        let hooks = RecordingHooks {
            append_after_render: Some("<!-- done -->".to_string()),
            ..Default::default()
        };
        hooks.before_create(&config).unwrap();
        let html = hooks.before_render("a".to_string(), &page).unwrap();
        let html = hooks.after_render(html, &page).unwrap();
        assert_eq!(html, "a<!-- done -->");
        assert_eq!(
            hooks.calls(),
            vec!["before_create", "before_render", "after_render"]
        );
    }
}
