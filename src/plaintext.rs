//! Plaintext versions of rendered templates.
//!
//! Two markers control what ends up where:
//!
//! ```html
//! <plaintext>Only in the text version</plaintext>
//! <not-plaintext>Only in the HTML version</not-plaintext>
//! ```
//!
//! [`TextExtractor`] reads the rendered HTML (markers still in place) and
//! writes the text file; [`remove_plaintext_tags`] then cleans the markers out
//! of the HTML before it is written.

use crate::render::markup::{MarkupError, Scanner, attribute, decode, is_tag, rewrite_elements};
use crate::resolve::EffectiveConfig;
use crate::writer;
use quick_xml::events::Event;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const PLAINTEXT_TAG: &str = "plaintext";
const NOT_PLAINTEXT_TAG: &str = "not-plaintext";

/// Elements whose content never appears in the text version.
const SKIPPED: &[&str] = &["head", "style", "script", "title", NOT_PLAINTEXT_TAG];

/// Elements that start a new line.
const BLOCKS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "div", "dl", "dt", "dd", "footer", "h1",
    "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "ol", "p", "pre", "section", "table",
    "tr", "ul",
];

#[derive(Error, Debug)]
pub enum PlaintextError {
    #[error(transparent)]
    Markup(#[from] MarkupError),
    #[error("failed to write plaintext {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Writes a plaintext sibling for a rendered template.
pub trait PlaintextDeriver {
    /// Derive text from `html` and write it. `source_path` is the template's
    /// copy in the destination tree. Returns the path written.
    fn derive(
        &self,
        html: &str,
        source_path: &Path,
        effective: &EffectiveConfig,
        root: &Path,
    ) -> Result<PathBuf, PlaintextError>;
}

/// Strips markup down to readable text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextExtractor;

impl PlaintextDeriver for TextExtractor {
    fn derive(
        &self,
        html: &str,
        source_path: &Path,
        effective: &EffectiveConfig,
        root: &Path,
    ) -> Result<PathBuf, PlaintextError> {
        let options = effective.config.plaintext.options().unwrap_or_default();
        let html_path = writer::final_path(source_path, effective, root);
        let path = match &options.destination {
            Some(dir) => {
                let stem = html_path.file_stem().unwrap_or_default().to_string_lossy();
                root.join(dir).join(format!("{stem}.{}", options.extension))
            }
            None => html_path.with_extension(&options.extension),
        };

        let text = extract_text(html)?;
        let write_error = |source: std::io::Error| PlaintextError::Write {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_error)?;
        }
        fs::write(&path, text).map_err(write_error)?;
        tracing::debug!("plaintext written to {}", path.display());
        Ok(path)
    }
}

/// Readable text for an HTML document.
pub fn extract_text(html: &str) -> Result<String, MarkupError> {
    let mut scanner = Scanner::new(html);
    let mut raw = String::new();
    let mut links: Vec<Option<String>> = Vec::new();

    loop {
        match scanner.next_event()?.1 {
            Event::Start(start) => {
                let name = start.name();
                if SKIPPED.iter().any(|tag| is_tag(name.as_ref(), tag)) {
                    scanner.read_to_end(name.as_ref())?;
                    continue;
                }
                if is_tag(name.as_ref(), "a") {
                    links.push(attribute(&start, "href"));
                }
                if is_block(name.as_ref()) {
                    raw.push('\n');
                }
            }
            Event::Empty(start) if is_block(start.name().as_ref()) => raw.push('\n'),
            Event::End(end) => {
                let name = end.name();
                if is_tag(name.as_ref(), "a") {
                    if let Some(Some(href)) = links.pop() {
                        if !href.is_empty() && !href.starts_with('#') {
                            raw.push_str(&format!(" [{href}]"));
                        }
                    }
                }
                if is_block(name.as_ref()) {
                    raw.push('\n');
                }
            }
            Event::Text(text) => push_text(&mut raw, &decode(&String::from_utf8_lossy(&text))),
            Event::GeneralRef(reference) => {
                let entity = format!("&{};", String::from_utf8_lossy(&reference));
                push_text(&mut raw, &decode(&entity));
            }
            Event::CData(data) => push_text(&mut raw, &String::from_utf8_lossy(&data)),
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(collapse_whitespace(&raw))
}

/// Source newlines inside text are not line breaks.
fn push_text(raw: &mut String, text: &str) {
    raw.extend(text.chars().map(|c| if c.is_whitespace() { ' ' } else { c }));
}

fn is_block(name: &[u8]) -> bool {
    BLOCKS.iter().any(|tag| is_tag(name, tag))
}

/// Collapse runs of spaces, trim every line and keep at most one blank line
/// between paragraphs.
fn collapse_whitespace(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut blank_run = 0;
    for line in raw.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
        }
        out.push_str(&line);
        blank_run = 0;
    }
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

/// Drop `<plaintext>` sections and unwrap `<not-plaintext>` sections.
pub fn remove_plaintext_tags(html: &str) -> Result<String, MarkupError> {
    rewrite_elements(
        html,
        |name| is_tag(name, PLAINTEXT_TAG) || is_tag(name, NOT_PLAINTEXT_TAG),
        |element| {
            if is_tag(element.start.name().as_ref(), PLAINTEXT_TAG) {
                Ok(String::new())
            } else {
                remove_plaintext_tags(element.inner)
            }
        },
    )
}
