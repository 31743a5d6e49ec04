//! The per-template render pipeline.
//!
//! ```text
//! source ─▶ before_render hook
//!        ─▶ 1. layouts      <extends src> + <block name>
//!        ─▶ 2. fetch        <fetch url>
//!        ─▶ 3. components   <component src locals>   (runs fetch on each component)
//!        ─▶ 4. plugins      build.posthtml.plugins, in order
//!        ─▶ 5. expressions  {{ page.title }}, {{ css }}, locals
//!        ─▶ 6. strip front matter
//!        ─▶ after_render hook ─▶ html
//! ```
//!
//! Every stage takes the whole document as a string and returns a new one.
//! A failing stage stops the pipeline; the error carries the template path so
//! the orchestrator can apply the configured failure policy.

mod components;
pub mod expressions;
pub mod fetch;
mod layouts;
pub mod markup;
pub mod plugins;

pub use fetch::{FetchError, Fetcher, HttpFetcher};
pub use markup::MarkupError;
pub use plugins::{Plugin, PluginError, PluginRegistry};

use crate::front_matter;
use crate::hooks::{BuildHooks, HookError};
use crate::resolve::EffectiveConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Nesting limit for layouts and components, independent of cycle detection.
pub const MAX_INCLUDE_DEPTH: usize = 64;

/// A template that failed to render.
#[derive(Error, Debug)]
#[error("Failed to compile {}: {source}", path.display())]
pub struct RenderError {
    pub path: PathBuf,
    #[source]
    pub source: StageError,
}

#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Markup(#[from] MarkupError),
    #[error("<{tag}> is missing its \"{attribute}\" attribute")]
    MissingAttribute { tag: String, attribute: String },
    #[error("cannot read layout {}", path.display())]
    LayoutRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("block \"{block}\" does not exist in layout {layout}")]
    UnknownBlock { block: String, layout: String },
    #[error("cannot read component {}", path.display())]
    ComponentRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid locals on component {src}")]
    ComponentLocals {
        src: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("inclusion cycle: {}", format_chain(.chain))]
    Cycle { chain: Vec<PathBuf> },
    #[error("inclusion depth exceeds {MAX_INCLUDE_DEPTH} at {}", path.display())]
    TooDeep { path: PathBuf },
    #[error("failed to fetch {url}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },
    #[error("unknown plugin \"{0}\"")]
    UnknownPlugin(String),
    #[error("plugin {name} failed")]
    Plugin {
        name: String,
        #[source]
        source: PluginError,
    },
    #[error("expression error: {0}")]
    Expression(#[from] tera::Error),
    #[error("hook failed: {0}")]
    Hook(#[from] HookError),
}

fn format_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Everything a template render can see.
pub struct RenderContext<'a> {
    /// Project root; relative paths in the config resolve against it.
    pub root: &'a Path,
    /// The template being rendered.
    pub path: &'a Path,
    /// Compiled CSS, exposed to expressions as `css`.
    pub css: &'a str,
    pub effective: &'a EffectiveConfig,
    pub fetcher: &'a dyn Fetcher,
    pub plugins: &'a PluginRegistry,
    pub hooks: &'a dyn BuildHooks,
}

/// Run the full pipeline over one template source.
pub fn render(source: &str, ctx: &RenderContext<'_>) -> Result<String, RenderError> {
    run_stages(source, ctx).map_err(|source| RenderError {
        path: ctx.path.to_path_buf(),
        source,
    })
}

fn run_stages(source: &str, ctx: &RenderContext<'_>) -> Result<String, StageError> {
    let locals = expressions::locals(ctx)?;

    let html = ctx.hooks.before_render(source.to_string(), ctx.effective)?;
    let html = layouts::apply(&html, ctx)?;
    let html = fetch::apply(&html, ctx, &locals)?;
    let html = components::apply(&html, ctx, &locals)?;
    let html = plugins::apply(html, ctx)?;
    let html = expressions::apply(&html, &locals)?;
    let html = front_matter::strip(&html).to_string();
    let html = ctx.hooks.after_render(html, ctx.effective)?;

    tracing::debug!("rendered {}", ctx.path.display());
    Ok(html)
}

/// A stable key for cycle detection; falls back to the joined path when the
/// file cannot be canonicalized (the read that follows reports the error).
fn include_key(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Fail when `key` is already on the inclusion chain or the chain is too deep.
fn check_chain(chain: &[PathBuf], key: &Path) -> Result<(), StageError> {
    if chain.iter().any(|p| p == key) {
        let mut cycle = chain.to_vec();
        cycle.push(key.to_path_buf());
        return Err(StageError::Cycle { chain: cycle });
    }
    if chain.len() >= MAX_INCLUDE_DEPTH {
        return Err(StageError::TooDeep {
            path: key.to_path_buf(),
        });
    }
    Ok(())
}
