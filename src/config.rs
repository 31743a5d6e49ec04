//! Build configuration module.
//!
//! Handles loading, validating, and merging `config.toml` files. Configuration
//! is layered: stock defaults are overridden by the project's `config.toml`,
//! which is in turn overridden by an environment file such as
//! `config.production.toml` when building for that environment.
//!
//! ## Config File Location
//!
//! ```text
//! project/
//! ├── config.toml                 # Base config (overrides stock defaults)
//! ├── config.production.toml      # Used by `mailforge build production`
//! └── src/
//!     ├── templates/              # build.posthtml.templates.root
//!     ├── layouts/
//!     ├── components/
//!     └── assets/images/          # build.assets.source
//! ```
//!
//! Every template may also carry YAML front matter; that layer is merged per
//! file by [`crate::resolve`] and never touches the shared [`BuildConfig`].
//!
//! ## Configuration Options
//!
//! ```toml
//! [build]
//! fail = true                     # true | false | "verbose"
//!
//! [build.posthtml.templates]
//! root = "src/templates"          # string or list
//! extensions = "html"             # string or list
//!
//! [build.destination]
//! path = "build_local"
//! extension = "html"
//! ```
//!
//! Run `mailforge gen-config` for the full, commented list.
//!
//! ## Unknown Keys
//!
//! Sections under `build` reject unknown keys to catch typos early. Top-level
//! keys outside the schema are kept in [`BuildConfig::extra`] so templates can
//! read them as `page.<key>`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Environment name used when none is given on the command line.
pub const LOCAL_ENV: &str = "local";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Project configuration loaded from `config.toml`.
///
/// All fields have defaults. User config files and template front matter need
/// only specify the values they want to override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Everything the build pipeline itself consumes.
    pub build: BuildSection,
    /// Global template locals, visible to expressions by name.
    pub locals: toml::Table,
    /// Whether to derive a plaintext version of each template.
    pub plaintext: PlaintextSetting,
    /// Explicit output path for a template. Only meaningful in front matter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permalink: Option<String>,
    /// Keys outside the schema (`title`, `preheader`, ...), exposed as page data.
    #[serde(flatten)]
    pub extra: toml::Table,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            build: BuildSection::default(),
            locals: toml::Table::new(),
            plaintext: PlaintextSetting::Toggle(false),
            permalink: None,
            extra: toml::Table::new(),
        }
    }
}

impl BuildConfig {
    /// Validate config values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let destination = &self.build.destination;
        if destination.path.trim().is_empty() {
            return Err(ConfigError::Validation(
                "build.destination.path must not be empty".into(),
            ));
        }
        if destination.extension.is_empty() || destination.extension.starts_with('.') {
            return Err(ConfigError::Validation(
                "build.destination.extension must be non-empty and have no leading dot".into(),
            ));
        }
        let templates = &self.build.posthtml.templates;
        if templates.root.is_empty() {
            return Err(ConfigError::Validation(
                "build.posthtml.templates.root must name at least one directory".into(),
            ));
        }
        if templates.extensions.is_empty() {
            return Err(ConfigError::Validation(
                "build.posthtml.templates.extensions must not be empty".into(),
            ));
        }
        if self.build.posthtml.fetch.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "build.posthtml.fetch.timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// The `[build]` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildSection {
    /// Per-template failure policy.
    pub fail: FailMode,
    pub posthtml: PostHtmlConfig,
    pub layouts: LayoutsConfig,
    pub components: ComponentsConfig,
    pub destination: DestinationConfig,
    pub assets: AssetsConfig,
    pub styles: StylesConfig,
    pub front_matter: FrontMatterConfig,
}

/// What happens when a single template fails to render.
///
/// Written in TOML as `true` (abort the build), `false` (warn and continue)
/// or `"verbose"` (warn with the full error chain and continue).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailMode {
    #[default]
    Hard,
    Soft,
    Verbose,
}

impl FailMode {
    pub fn is_soft(self) -> bool {
        !matches!(self, FailMode::Hard)
    }
}

impl Serialize for FailMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FailMode::Hard => serializer.serialize_bool(true),
            FailMode::Soft => serializer.serialize_bool(false),
            FailMode::Verbose => serializer.serialize_str("verbose"),
        }
    }
}

impl<'de> Deserialize<'de> for FailMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Word(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Flag(true) => Ok(FailMode::Hard),
            Raw::Flag(false) => Ok(FailMode::Soft),
            Raw::Word(word) if word == "verbose" => Ok(FailMode::Verbose),
            Raw::Word(other) => Err(serde::de::Error::custom(format!(
                "expected true, false or \"verbose\", found \"{other}\""
            ))),
        }
    }
}

/// A value written either as a single string or as a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s.clone()],
            OneOrMany::Many(v) => v.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            OneOrMany::One(s) => s.trim().is_empty(),
            OneOrMany::Many(v) => v.iter().all(|s| s.trim().is_empty()),
        }
    }
}

/// The `[build.posthtml]` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PostHtmlConfig {
    pub templates: TemplatesConfig,
    /// Plugin names, applied in order after component inlining.
    pub plugins: Vec<String>,
    /// Free-form options handed to every plugin.
    pub options: toml::Table,
    pub fetch: FetchConfig,
    pub expressions: ExpressionsConfig,
}

/// Where templates live and which files count as templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TemplatesConfig {
    pub root: OneOrMany,
    pub extensions: OneOrMany,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            root: OneOrMany::One("src/templates".to_string()),
            extensions: OneOrMany::One("html".to_string()),
        }
    }
}

impl TemplatesConfig {
    /// Extensions without leading dots, lowercased for comparison.
    pub fn extension_list(&self) -> Vec<String> {
        self.extensions
            .to_vec()
            .into_iter()
            .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect()
    }
}

/// Remote content fetching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    /// Element names that trigger a fetch.
    pub tags: Vec<String>,
    /// Attribute holding the URL.
    pub attribute: String,
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            tags: vec!["fetch".to_string(), "remote".to_string()],
            attribute: "url".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExpressionsConfig {
    /// Pipeline-level locals. `[locals]` entries win over these.
    pub locals: toml::Table,
}

/// Layout inheritance (`<extends>` / `<block>`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutsConfig {
    /// Directory layout `src` attributes are resolved against.
    pub root: String,
    pub tag: String,
    /// Fail when a child block has no matching layout block.
    pub strict: bool,
}

impl Default for LayoutsConfig {
    fn default() -> Self {
        Self {
            root: ".".to_string(),
            tag: "extends".to_string(),
            strict: false,
        }
    }
}

/// Component inlining (`<component src="...">`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ComponentsConfig {
    /// Base for `src` values starting with `/`, and the default base for relative ones.
    pub root: String,
    /// A file whose directory relative `src` values resolve against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub tag: String,
    pub attribute: String,
    /// Element inside a component replaced by the caller's content.
    pub yield_tag: String,
}

impl Default for ComponentsConfig {
    fn default() -> Self {
        Self {
            root: ".".to_string(),
            from: None,
            tag: "component".to_string(),
            attribute: "src".to_string(),
            yield_tag: "content".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DestinationConfig {
    pub path: String,
    /// Extension given to rendered templates that have no permalink.
    pub extension: String,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            path: "build_local".to_string(),
            extension: "html".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssetsConfig {
    pub source: String,
    /// Subdirectory of the destination the assets are copied into.
    pub destination: String,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            source: "src/assets/images".to_string(),
            destination: "images".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StylesConfig {
    /// Stylesheets concatenated in order into the `css` local.
    pub css: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FrontMatterConfig {
    pub arrays: ArrayMerge,
}

/// How arrays from an override layer combine with arrays in the base.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrayMerge {
    #[default]
    Replace,
    Concat,
}

/// `plaintext = true` or `plaintext = { destination = "...", extension = "txt" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlaintextSetting {
    Toggle(bool),
    Options(PlaintextOptions),
}

impl Default for PlaintextSetting {
    fn default() -> Self {
        PlaintextSetting::Toggle(false)
    }
}

impl PlaintextSetting {
    /// Options to derive with, or `None` when plaintext output is off.
    pub fn options(&self) -> Option<PlaintextOptions> {
        match self {
            PlaintextSetting::Toggle(true) => Some(PlaintextOptions::default()),
            PlaintextSetting::Toggle(false) => None,
            PlaintextSetting::Options(options) => Some(options.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlaintextOptions {
    /// Directory for the text file. Next to the HTML output when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    pub extension: String,
}

impl Default for PlaintextOptions {
    fn default() -> Self {
        Self {
            destination: None,
            extension: "txt".to_string(),
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(BuildConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely, arrays included.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    merge_toml_with(base, overlay, ArrayMerge::Replace)
}

/// [`merge_toml`] with an explicit strategy for arrays present in both layers.
pub fn merge_toml_with(base: toml::Value, overlay: toml::Value, arrays: ArrayMerge) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml_with(base_val, overlay_val, arrays),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (toml::Value::Array(mut base_items), toml::Value::Array(overlay_items))
            if arrays == ArrayMerge::Concat =>
        {
            base_items.extend(overlay_items);
            toml::Value::Array(base_items)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(dir: &Path, file_name: &str) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join(file_name);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge optional overlays onto a base value in order, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlays: impl IntoIterator<Item = toml::Value>,
) -> Result<BuildConfig, ConfigError> {
    let merged = overlays.into_iter().fold(base, merge_toml);
    let config: BuildConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// File name of the environment overlay, e.g. `config.production.toml`.
pub fn env_config_file_name(env: &str) -> String {
    format!("config.{env}.toml")
}

/// Load the project config for `env` from `root`.
///
/// Stock defaults ← `config.toml` ← `config.<env>.toml`. The environment
/// file is skipped for the local environment.
pub fn load_config(root: &Path, env: &str) -> Result<BuildConfig, ConfigError> {
    let mut overlays = Vec::new();
    if let Some(base) = load_raw_config(root, "config.toml")? {
        overlays.push(base);
    }
    if env != LOCAL_ENV {
        if let Some(env_layer) = load_raw_config(root, &env_config_file_name(env))? {
            overlays.push(env_layer);
        }
    }
    resolve_config(stock_defaults_value(), overlays)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# mailforge configuration
# =======================
# All settings are optional. Values shown below are the defaults.
# Relative paths are resolved against the directory holding this file.
#
# `mailforge build production` additionally merges config.production.toml
# on top of this file. Any template can override any key in its front matter.

# Derive a plaintext version of every template. Either a flag or a table:
#   plaintext = { destination = "build_local/text", extension = "txt" }
plaintext = false

# ---------------------------------------------------------------------------
# Failure policy
# ---------------------------------------------------------------------------
[build]
# true      -> a template that fails to render aborts the build
# false     -> print a warning and continue with the next template
# "verbose" -> like false, but also print the full error
fail = true

# ---------------------------------------------------------------------------
# Templates
# ---------------------------------------------------------------------------
[build.posthtml.templates]
# Source directory (or list of directories) copied into the destination.
root = "src/templates"
# File extension (or list) that marks a file as a template.
extensions = "html"

[build.posthtml]
# Plugins applied in order after components are inlined.
# Built in: "remove-comments".
plugins = []

# Free-form options handed to every plugin.
[build.posthtml.options]

# Remote content: <fetch url="https://...">{{ response.title }}</fetch>
[build.posthtml.fetch]
tags = ["fetch", "remote"]
attribute = "url"
timeout_secs = 30

# Locals available to every {{ expression }}. [locals] wins on conflicts.
[build.posthtml.expressions.locals]

# ---------------------------------------------------------------------------
# Layouts: <extends src="src/layouts/main.html"><block name="body">...</block></extends>
# ---------------------------------------------------------------------------
[build.layouts]
root = "."
tag = "extends"
# Fail when a template fills a block its layout does not declare.
strict = false

# ---------------------------------------------------------------------------
# Components: <component src="src/components/button.html">Click</component>
# ---------------------------------------------------------------------------
[build.components]
root = "."
# from = "src/components/index.html"
tag = "component"
attribute = "src"
yield_tag = "content"

# ---------------------------------------------------------------------------
# Output
# ---------------------------------------------------------------------------
[build.destination]
path = "build_local"
extension = "html"

[build.assets]
source = "src/assets/images"
destination = "images"

# ---------------------------------------------------------------------------
# Styles: concatenated in order and exposed to templates as {{ css }}
# ---------------------------------------------------------------------------
[build.styles]
css = []

# ---------------------------------------------------------------------------
# Front matter merging
# ---------------------------------------------------------------------------
[build.front_matter]
# "replace" -> front matter arrays replace config arrays
# "concat"  -> front matter arrays are appended to config arrays
arrays = "replace"

# Global template locals: {{ company }}
[locals]
"##
}
