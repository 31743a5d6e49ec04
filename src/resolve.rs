//! Per-template configuration.
//!
//! The project [`BuildConfig`] is shared by every template and never
//! mutated. For each template, [`ConfigResolver::resolve`] merges the
//! template's front matter over a clone of the project config and produces an
//! [`EffectiveConfig`] owned by that template alone.

use crate::config::{BuildConfig, ConfigError, merge_toml_with};
use crate::front_matter;

/// A project config merged with one template's front matter.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveConfig {
    /// Typed settings the pipeline reads (destination, permalink, fail mode...).
    pub config: BuildConfig,
    /// The full merged tree, exposed to expressions as `page`. Includes
    /// `is_merged` and `env`.
    pub page: toml::Value,
    pub env: String,
    pub is_merged: bool,
}

impl EffectiveConfig {
    /// Wrap a config with no front matter applied.
    pub fn unmerged(config: &BuildConfig, env: &str) -> Result<Self, ConfigError> {
        let page = toml::Value::try_from(config)?;
        Ok(Self {
            config: config.clone(),
            page,
            env: env.to_string(),
            is_merged: false,
        })
    }

    pub fn permalink(&self) -> Option<&str> {
        self.config
            .permalink
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

/// Template configuration resolved from its source.
#[derive(Debug)]
pub struct Resolved<'a> {
    pub effective: EffectiveConfig,
    /// Template body with the front matter removed.
    pub body: &'a str,
}

/// Derives [`EffectiveConfig`]s from one shared project config.
#[derive(Debug)]
pub struct ConfigResolver<'a> {
    global: &'a BuildConfig,
    base: toml::Value,
    env: String,
}

impl<'a> ConfigResolver<'a> {
    pub fn new(global: &'a BuildConfig, env: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            global,
            base: toml::Value::try_from(global)?,
            env: env.to_string(),
        })
    }

    /// Merge the template's front matter over the project config.
    ///
    /// Never fails: malformed front matter is an empty table, and a merge that
    /// breaks the schema keeps the project's typed settings (the front matter
    /// is still visible to templates through `page`).
    pub fn resolve<'s>(&self, source: &'s str) -> Resolved<'s> {
        let fm = front_matter::parse(source);
        let has_attributes = !fm.attributes.is_empty();
        let merged = merge_toml_with(
            self.base.clone(),
            toml::Value::Table(fm.attributes),
            self.global.build.front_matter.arrays,
        );

        let config = if has_attributes {
            self.typed(&merged)
        } else {
            self.global.clone()
        };

        let mut page = merged;
        if let toml::Value::Table(table) = &mut page {
            table.insert("is_merged".to_string(), toml::Value::Boolean(true));
            table.insert("env".to_string(), toml::Value::String(self.env.clone()));
        }

        Resolved {
            effective: EffectiveConfig {
                config,
                page,
                env: self.env.clone(),
                is_merged: true,
            },
            body: fm.body,
        }
    }

    fn typed(&self, merged: &toml::Value) -> BuildConfig {
        let typed: Result<BuildConfig, toml::de::Error> = merged.clone().try_into();
        let parsed = typed
            .map_err(|e| e.to_string())
            .and_then(|config| {
                config.validate().map_err(|e| e.to_string())?;
                Ok(config)
            });
        match parsed {
            Ok(config) => config,
            Err(reason) => {
                tracing::warn!(
                    "front matter does not fit the config schema ({reason}); \
                     keeping project settings"
                );
                self.global.clone()
            }
        }
    }
}
