//! Build orchestration.
//!
//! Runs the whole pipeline for one environment:
//!
//! ```text
//! load config ─▶ compile CSS ─▶ copy template roots into the destination
//!             ─▶ discover templates ─▶ before_create
//!             ─▶ for each template (sorted):
//!                  read ─▶ resolve front matter ─▶ render
//!                  ─▶ plaintext? ─▶ strip plaintext markers ─▶ write + relocate
//!             ─▶ copy assets ─▶ after_build
//! ```
//!
//! Templates are processed one at a time. A template is fully written and
//! relocated before the next one is read, so a write failure is always
//! reported against the template that caused it.
//!
//! ## Failure policy
//!
//! A template that fails to render is handled according to `build.fail` in
//! its own effective config: `true` aborts the build with the render error,
//! `false` reports it and moves on, `"verbose"` does the same with the full
//! error chain. Everything else (config, styles, discovery, writes,
//! plaintext, hooks) is always fatal.
//!
//! ## Progress
//!
//! Progress is reported as [`BuildEvent`]s over an optional channel; the CLI
//! formats them with [`crate::output::format_build_event`].

use crate::config::{self, BuildConfig, ConfigError};
use crate::hooks::{BuildHooks, HookError, NoHooks};
use crate::plaintext::{self, PlaintextDeriver, PlaintextError, TextExtractor};
use crate::render::{self, FetchError, Fetcher, HttpFetcher, PluginRegistry, RenderContext, RenderError};
use crate::resolve::ConfigResolver;
use crate::scan::{self, ScanError};
use crate::styles::{CssFiles, StyleError, StyleProvider};
use crate::writer::{self, WriteError};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc::Sender;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Style compile error: {0}")]
    StyleCompile(#[from] StyleError),
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),
    #[error(
        "No templates found in {} with extension(s): {}",
        dir.display(),
        extensions.join(", ")
    )]
    NoTemplatesFound {
        dir: PathBuf,
        extensions: Vec<String>,
    },
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error("Plaintext error: {0}")]
    Plaintext(#[from] PlaintextError),
    #[error("HTTP client error: {0}")]
    Fetch(#[from] FetchError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Hook failed: {0}")]
    Hook(#[from] HookError),
}

/// Progress reported while building.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildEvent {
    Started {
        env: String,
        destination: PathBuf,
    },
    TemplatesFound {
        count: usize,
    },
    TemplateBuilt {
        index: usize,
        /// Relative to the destination directory.
        source: PathBuf,
        output: PathBuf,
        plaintext: Option<PathBuf>,
    },
    TemplateFailed {
        index: usize,
        source: PathBuf,
        error: String,
        /// The full error chain, when the failure policy is `"verbose"`.
        detail: Option<String>,
        /// Whether the build stops here.
        fatal: bool,
    },
    AssetsCopied {
        destination: PathBuf,
    },
}

/// What a finished build produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildSummary {
    /// Templates discovered, whether or not they rendered.
    pub templates: usize,
    /// Final paths of the rendered templates, in build order.
    pub outputs: Vec<PathBuf>,
    /// Templates skipped under a soft failure policy.
    pub failures: Vec<PathBuf>,
}

/// The replaceable parts of a build.
pub struct Collaborators<'a> {
    pub styles: &'a dyn StyleProvider,
    pub plaintext: &'a dyn PlaintextDeriver,
    pub fetcher: &'a dyn Fetcher,
    pub plugins: &'a PluginRegistry,
    pub hooks: &'a dyn BuildHooks,
}

/// Build the project at `root` for `env` with the default collaborators.
pub fn build(
    root: &Path,
    env: &str,
    events: Option<Sender<BuildEvent>>,
) -> Result<BuildSummary, BuildError> {
    let config = config::load_config(root, env)?;
    let fetcher = HttpFetcher::new(Duration::from_secs(
        config.build.posthtml.fetch.timeout_secs,
    ))?;
    let plugins = PluginRegistry::with_builtins();
    let collaborators = Collaborators {
        styles: &CssFiles,
        plaintext: &TextExtractor,
        fetcher: &fetcher,
        plugins: &plugins,
        hooks: &NoHooks,
    };
    build_with(root, &config, env, &collaborators, events)
}

/// Build with an already loaded config and explicit collaborators.
pub fn build_with(
    root: &Path,
    config: &BuildConfig,
    env: &str,
    collaborators: &Collaborators<'_>,
    events: Option<Sender<BuildEvent>>,
) -> Result<BuildSummary, BuildError> {
    let emit = |event: BuildEvent| {
        if let Some(tx) = &events {
            tx.send(event).ok();
        }
    };

    let destination = root.join(&config.build.destination.path);
    let roots = template_roots(root, config);
    guard_destination(root, config, &destination, &roots)?;
    emit(BuildEvent::Started {
        env: env.to_string(),
        destination: relative(&destination, root),
    });

    let css = collaborators.styles.compile(config, env, root)?;
    tracing::debug!("compiled {} bytes of CSS", css.len());

    scan::copy_sources(&roots, &destination)?;

    let extensions = config.build.posthtml.templates.extension_list();
    let templates = scan::discover_templates(&destination, &extensions);
    if templates.is_empty() {
        return Err(BuildError::NoTemplatesFound {
            dir: destination,
            extensions,
        });
    }
    emit(BuildEvent::TemplatesFound {
        count: templates.len(),
    });

    collaborators.hooks.before_create(config)?;

    let resolver = ConfigResolver::new(config, env)?;
    let mut summary = BuildSummary {
        templates: templates.len(),
        ..Default::default()
    };

    for (index, path) in templates.iter().enumerate() {
        let index = index + 1;
        let source = fs::read_to_string(path)?;
        let resolved = resolver.resolve(&source);
        let effective = &resolved.effective;

        let ctx = RenderContext {
            root,
            path,
            css: &css,
            effective,
            fetcher: collaborators.fetcher,
            plugins: collaborators.plugins,
            hooks: collaborators.hooks,
        };

        let html = match render::render(&source, &ctx) {
            Ok(html) => html,
            Err(err) => {
                let mode = effective.config.build.fail;
                emit(BuildEvent::TemplateFailed {
                    index,
                    source: relative(path, &destination),
                    error: err.to_string(),
                    detail: (mode == config::FailMode::Verbose).then(|| error_chain(&err)),
                    fatal: !mode.is_soft(),
                });
                if !mode.is_soft() {
                    return Err(err.into());
                }
                tracing::warn!("skipping {}: {err}", path.display());
                summary.failures.push(path.clone());
                continue;
            }
        };

        let plaintext = match effective.config.plaintext.options() {
            Some(_) => Some(
                collaborators
                    .plaintext
                    .derive(&html, path, effective, root)?,
            ),
            None => None,
        };
        let html = plaintext::remove_plaintext_tags(&html).map_err(PlaintextError::from)?;
        let output = writer::write(&html, path, effective, root)?;

        emit(BuildEvent::TemplateBuilt {
            index,
            source: relative(path, &destination),
            output: relative(&output, root),
            plaintext: plaintext.as_deref().map(|p| relative(p, root)),
        });
        summary.outputs.push(output);
    }

    let assets = root.join(&config.build.assets.source);
    if assets.is_dir() {
        let target = destination.join(&config.build.assets.destination);
        fs::create_dir_all(&target)?;
        scan::copy_dir(&assets, &target)?;
        emit(BuildEvent::AssetsCopied {
            destination: relative(&target, root),
        });
    }

    let files = scan::list_files(&destination);
    collaborators.hooks.after_build(&files)?;

    Ok(summary)
}

/// What `mailforge check` reports.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckReport {
    pub config: BuildConfig,
    /// Templates found in the source roots, relative to the project root.
    pub templates: Vec<PathBuf>,
}

/// Validate the project without writing anything.
pub fn check(root: &Path, env: &str) -> Result<CheckReport, BuildError> {
    let config = config::load_config(root, env)?;
    let destination = root.join(&config.build.destination.path);
    let roots = template_roots(root, &config);
    guard_destination(root, &config, &destination, &roots)?;

    let extensions = config.build.posthtml.templates.extension_list();
    let mut templates = Vec::new();
    for dir in &roots {
        if !dir.is_dir() {
            return Err(ScanError::MissingRoot(dir.clone()).into());
        }
        templates.extend(
            scan::discover_templates(dir, &extensions)
                .iter()
                .map(|p| relative(p, root)),
        );
    }
    if templates.is_empty() {
        return Err(BuildError::NoTemplatesFound {
            dir: roots.first().cloned().unwrap_or_else(|| root.to_path_buf()),
            extensions,
        });
    }
    Ok(CheckReport { config, templates })
}

fn template_roots(root: &Path, config: &BuildConfig) -> Vec<PathBuf> {
    config
        .build
        .posthtml
        .templates
        .root
        .to_vec()
        .iter()
        .map(|dir| root.join(dir))
        .collect()
}

/// The destination is deleted on every build. Refuse one that would take the
/// project, a template root, the assets or a stylesheet with it, or that sits
/// inside a template root.
fn guard_destination(
    root: &Path,
    config: &BuildConfig,
    destination: &Path,
    roots: &[PathBuf],
) -> Result<(), BuildError> {
    let destination = normalize(destination);
    let refuse = |what: &str, path: &Path| -> Result<(), BuildError> {
        Err(ConfigError::Validation(format!(
            "build.destination.path {} would delete {} {}",
            destination.display(),
            what,
            path.display()
        ))
        .into())
    };

    let project = normalize(root);
    if project.starts_with(&destination) {
        return refuse("the project", &project);
    }
    for template_root in roots.iter().map(|r| normalize(r)) {
        if template_root.starts_with(&destination) || destination.starts_with(&template_root) {
            return refuse("template root", &template_root);
        }
    }
    let assets = normalize(&root.join(&config.build.assets.source));
    if assets.starts_with(&destination) {
        return refuse("assets", &assets);
    }
    for css in &config.build.styles.css {
        let css = normalize(&root.join(css));
        if css.starts_with(&destination) {
            return refuse("stylesheet", &css);
        }
    }
    Ok(())
}

/// Absolute form of `path` with `.` and `..` resolved and the longest existing
/// prefix canonicalized, so symlinked and `..` spellings compare equal.
fn normalize(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut lexical = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                lexical.pop();
            }
            other => lexical.push(other),
        }
    }
    for existing in lexical.ancestors() {
        if let Ok(real) = fs::canonicalize(existing) {
            let rest = lexical.strip_prefix(existing).unwrap_or(Path::new(""));
            return real.join(rest);
        }
    }
    lexical
}

fn relative(path: &Path, root: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}

/// `err` followed by each of its sources, one per line. A cause whose text is
/// already part of the message above it is not repeated.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut above = out.clone();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !above.contains(&text) {
            out.push_str(&format!("\n  caused by: {text}"));
        }
        above = text;
        source = cause.source();
    }
    out
}
