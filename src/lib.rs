//! # Mailforge
//!
//! A build pipeline for HTML email templates. A project is a directory of
//! templates plus a `config.toml`; a build turns it into a tree of finished
//! HTML files (and optional plaintext versions) ready to send.
//!
//! # Architecture
//!
//! ```text
//! config.toml ─┐
//! config.<env>.toml ─┴─▶ BuildConfig ──────────────┐
//!                                                  ▼
//! src/templates/ ─copy─▶ build_local/ ─discover─▶ template ─▶ front matter merge
//!                                                  │           (EffectiveConfig)
//!                                                  ▼
//!        layouts ─▶ fetch ─▶ components ─▶ plugins ─▶ expressions ─▶ strip
//!                                                  │
//!                                                  ▼
//!                              plaintext? ─▶ write ─▶ permalink / extension
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | `config.toml` schema, stock defaults, layered loading and merging |
//! | [`front_matter`] | YAML front matter parsing and stripping |
//! | [`resolve`] | Per-template config: front matter merged over the project config |
//! | [`render`] | The per-template transform pipeline and its stages |
//! | [`styles`] | CSS compilation, exposed to templates as `css` |
//! | [`plaintext`] | Plaintext derivation and `<plaintext>` marker cleanup |
//! | [`writer`] | Writing rendered HTML and moving it to its final path |
//! | [`scan`] | Copying template roots and discovering templates |
//! | [`hooks`] | Lifecycle hooks for programs embedding the build |
//! | [`build`] | The orchestrator tying everything together |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Immutable Project Config
//!
//! The project [`config::BuildConfig`] is loaded once and only ever read.
//! Front matter is merged into a clone per template, so one template's
//! settings cannot leak into the next.
//!
//! ## Sequential Builds
//!
//! Templates are rendered one at a time in sorted order, and each is written
//! and relocated before the next starts. Output is reproducible and every
//! write error surfaces against its own template.
//!
//! ## Markup Is Scanned, Not Rebuilt
//!
//! Email HTML is full of constructs an HTML tree would normalize away:
//! conditional comments, unclosed table cells, entities. The pipeline stages
//! tokenize with `quick-xml` only to find the elements they rewrite and copy
//! every other byte through untouched.
//!
//! ## Collaborators Are Traits
//!
//! CSS compilation ([`styles::StyleProvider`]), plaintext derivation
//! ([`plaintext::PlaintextDeriver`]), remote content ([`render::Fetcher`]),
//! plugins ([`render::Plugin`]) and lifecycle hooks ([`hooks::BuildHooks`])
//! are passed to [`build::build_with`]. [`build::build`] wires in the defaults.

pub mod build;
pub mod config;
pub mod front_matter;
pub mod hooks;
pub mod output;
pub mod plaintext;
pub mod render;
pub mod resolve;
pub mod scan;
pub mod styles;
pub mod writer;

#[cfg(test)]
pub(crate) mod test_helpers;
