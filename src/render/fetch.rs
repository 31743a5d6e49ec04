//! Remote content.
//!
//! ```html
//! <fetch url="https://api.example.com/offer.json">{{ response.title }}</fetch>
//! ```
//!
//! The element is replaced by the fetched body. When the element has content,
//! that content is rendered as an expression template instead, with the body
//! available as `response` (parsed as JSON when it is JSON, a string
//! otherwise).

use super::markup::{attribute, is_tag, rewrite_elements, tag_name};
use super::{RenderContext, StageError};
use reqwest::blocking::Client;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tera::{Context, Tera};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of remote content.
pub trait Fetcher {
    /// Fetch `url`. URLs without an `http(s)` scheme are read as files
    /// relative to `root`.
    fn fetch(&self, url: &str, root: &Path) -> Result<String, FetchError>;
}

/// Blocking HTTP client used for real builds.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, root: &Path) -> Result<String, FetchError> {
        if !is_remote(url) {
            return Ok(fs::read_to_string(root.join(url.trim_start_matches('/')))?);
        }
        tracing::debug!("fetching {url}");
        let response = self.client.get(url).send()?.error_for_status()?;
        Ok(response.text()?)
    }
}

fn is_remote(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

pub(super) fn apply(
    html: &str,
    ctx: &RenderContext<'_>,
    locals: &Context,
) -> Result<String, StageError> {
    let settings = &ctx.effective.config.build.posthtml.fetch;
    rewrite_elements(
        html,
        |name| settings.tags.iter().any(|tag| is_tag(name, tag)),
        |element| {
            let url = attribute(&element.start, &settings.attribute).ok_or_else(|| {
                StageError::MissingAttribute {
                    tag: tag_name(&element.start),
                    attribute: settings.attribute.clone(),
                }
            })?;
            let body = ctx
                .fetcher
                .fetch(&url, ctx.root)
                .map_err(|source| StageError::Fetch {
                    url: url.clone(),
                    source,
                })?;

            if element.inner.trim().is_empty() {
                return Ok(body);
            }

            let response = serde_json::from_str::<serde_json::Value>(&body)
                .unwrap_or(serde_json::Value::String(body));
            let mut context = locals.clone();
            context.insert("response", &response);
            Ok(Tera::one_off(element.inner, &context, false)?)
        },
    )
}
