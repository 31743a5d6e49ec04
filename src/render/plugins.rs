//! Named HTML transforms applied after components are inlined.
//!
//! `build.posthtml.plugins` lists plugin names in the order they run. Each
//! plugin receives the whole document and the free-form
//! `build.posthtml.options` table.

use super::markup::Scanner;
use super::{MarkupError, RenderContext, StageError};
use quick_xml::events::Event;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PluginError {
    #[error(transparent)]
    Markup(#[from] MarkupError),
    #[error("{0}")]
    Failed(String),
}

/// A document-level HTML transform.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;
    fn transform(&self, html: &str, options: &toml::Table) -> Result<String, PluginError>;
}

/// Plugins addressable by name from the config.
pub struct PluginRegistry {
    plugins: HashMap<String, Box<dyn Plugin>>,
}

impl PluginRegistry {
    /// A registry with no plugins at all.
    pub fn new() -> Self {
        Self {
            plugins: HashMap::new(),
        }
    }

    /// A registry holding the built-in plugins.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(RemoveComments));
        registry
    }

    /// Add a plugin, replacing any plugin of the same name.
    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.insert(plugin.name().to_string(), plugin);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Plugin> {
        self.plugins.get(name).map(|p| p.as_ref())
    }

    /// Names of all registered plugins, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.plugins.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

pub(super) fn apply(html: String, ctx: &RenderContext<'_>) -> Result<String, StageError> {
    let posthtml = &ctx.effective.config.build.posthtml;
    posthtml.plugins.iter().try_fold(html, |html, name| {
        let plugin = ctx
            .plugins
            .get(name)
            .ok_or_else(|| StageError::UnknownPlugin(name.clone()))?;
        plugin
            .transform(&html, &posthtml.options)
            .map_err(|source| StageError::Plugin {
                name: name.clone(),
                source,
            })
    })
}

/// Removes HTML comments, keeping Outlook conditional comments.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveComments;

impl RemoveComments {
    fn is_conditional(comment: &[u8]) -> bool {
        comment.starts_with(b"[if") || comment.starts_with(b"<![endif]")
    }
}

impl Plugin for RemoveComments {
    fn name(&self) -> &str {
        "remove-comments"
    }

    fn transform(&self, html: &str, _options: &toml::Table) -> Result<String, PluginError> {
        let mut scanner = Scanner::new(html);
        let mut out = String::with_capacity(html.len());
        let mut copied = 0usize;

        loop {
            let (start, event) = scanner.next_event()?;
            match event {
                Event::Comment(comment) if !Self::is_conditional(&comment) => {
                    out.push_str(&html[copied..start]);
                    copied = scanner.position();
                }
                Event::Eof => break,
                _ => {}
            }
        }

        out.push_str(&html[copied..]);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfig;
    use crate::render::fetch::tests::MockFetcher;
    use crate::render::tests::render_with;
    use tempfile::TempDir;

    struct Shout;

    impl Plugin for Shout {
        fn name(&self) -> &str {
            "shout"
        }

        fn transform(&self, html: &str, options: &toml::Table) -> Result<String, PluginError> {
            let suffix = options.get("suffix").and_then(|v| v.as_str()).unwrap_or("");
            Ok(format!("{}{suffix}", html.to_uppercase()))
        }
    }

    #[test]
    fn remove_comments_keeps_conditionals() {
        let html = "<p>a<!-- note --></p><!--[if mso]><table><![endif]--><!--[if !mso]><!--><div><!--<![endif]-->";
        let out = RemoveComments.transform(html, &toml::Table::new()).unwrap();
        assert_eq!(
            out,
            "<p>a</p><!--[if mso]><table><![endif]--><!--[if !mso]><!--><div><!--<![endif]-->"
        );
    }

    #[test]
    fn registry_lookup() {
        let mut registry = PluginRegistry::with_builtins();
        assert!(registry.get("remove-comments").is_some());
        assert!(registry.get("shout").is_none());
        registry.register(Box::new(Shout));
        assert_eq!(registry.names(), vec!["remove-comments", "shout"]);
        assert!(PluginRegistry::new().names().is_empty());
    }

    #[test]
    fn configured_plugins_run_in_order() {
        let tmp = TempDir::new().unwrap();
        let mut config = BuildConfig::default();
        config.build.posthtml.plugins = vec!["remove-comments".to_string()];
        let html = render_with(
            tmp.path(),
            &config,
            "<p><!-- gone -->kept</p>",
            &MockFetcher::default(),
        )
        .unwrap();
        assert_eq!(html, "<p>kept</p>");
    }

    #[test]
    fn unknown_plugin_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let mut config = BuildConfig::default();
        config.build.posthtml.plugins = vec!["nope".to_string()];
        let err = render_with(tmp.path(), &config, "<p></p>", &MockFetcher::default()).unwrap_err();
        assert!(matches!(err.source, StageError::UnknownPlugin(ref n) if n == "nope"));
    }

    #[test]
    fn plugin_receives_options() {
        let mut options = toml::Table::new();
        options.insert("suffix".to_string(), toml::Value::String("!".to_string()));
        assert_eq!(Shout.transform("hi", &options).unwrap(), "HI!");
    }
}
