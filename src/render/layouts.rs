//! Layout inheritance.
//!
//! ```html
//! <extends src="src/layouts/main.html">
//!   <block name="body">Hello</block>
//!   <block name="footer" type="append">Bye</block>
//! </extends>
//! ```
//!
//! The `<extends>` element is replaced by the layout, with each `<block>` of
//! the layout filled from the child's block of the same name. A layout may
//! itself extend another layout. Unfilled blocks keep their default content.

use super::markup::{Element, attribute, collect_elements, is_tag, rewrite_elements, tag_name};
use super::{RenderContext, StageError, check_chain, include_key};
use crate::front_matter;
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

const BLOCK_TAG: &str = "block";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockMode {
    Replace,
    Prepend,
    Append,
}

#[derive(Debug)]
struct ChildBlock {
    name: String,
    mode: BlockMode,
    content: String,
}

pub(super) fn apply(html: &str, ctx: &RenderContext<'_>) -> Result<String, StageError> {
    let tag = &ctx.effective.config.build.layouts.tag;
    let mut chain = Vec::new();
    rewrite_elements(html, |name| is_tag(name, tag), |element| {
        let filled = extend(element, ctx, &mut chain)?;
        unwrap_blocks(&filled)
    })
}

/// The layout named by `element`, with the child's blocks merged in.
/// `<block>` wrappers are kept so an outer layout can still address them.
fn extend(
    element: Element<'_>,
    ctx: &RenderContext<'_>,
    chain: &mut Vec<PathBuf>,
) -> Result<String, StageError> {
    let settings = &ctx.effective.config.build.layouts;
    let src = attribute(&element.start, "src").ok_or_else(|| StageError::MissingAttribute {
        tag: tag_name(&element.start),
        attribute: "src".to_string(),
    })?;

    let path = ctx
        .root
        .join(&settings.root)
        .join(src.trim_start_matches('/'));
    let key = include_key(&path);
    check_chain(chain, &key)?;

    let source = fs::read_to_string(&path).map_err(|source| StageError::LayoutRead {
        path: path.clone(),
        source,
    })?;

    chain.push(key);
    let layout = rewrite_elements(
        front_matter::strip(&source),
        |name| is_tag(name, &settings.tag),
        |parent| extend(parent, ctx, &mut *chain),
    )?;
    chain.pop();

    let children = child_blocks(element.inner)?;
    let mut used = HashSet::new();
    let filled = fill_blocks(&layout, &children, &mut used)?;

    if settings.strict {
        if let Some(unknown) = children.iter().find(|c| !used.contains(&c.name)) {
            return Err(StageError::UnknownBlock {
                block: unknown.name.clone(),
                layout: src,
            });
        }
    }

    Ok(filled)
}

fn child_blocks(inner: &str) -> Result<Vec<ChildBlock>, StageError> {
    collect_elements(inner, |name| is_tag(name, BLOCK_TAG))?
        .into_iter()
        .map(|(start, content)| {
            let name = attribute(&start, "name").ok_or_else(|| StageError::MissingAttribute {
                tag: BLOCK_TAG.to_string(),
                attribute: "name".to_string(),
            })?;
            let mode = match attribute(&start, "type").as_deref() {
                Some("prepend") => BlockMode::Prepend,
                Some("append") => BlockMode::Append,
                _ => BlockMode::Replace,
            };
            Ok(ChildBlock {
                name,
                mode,
                content,
            })
        })
        .collect()
}

fn fill_blocks(
    layout: &str,
    children: &[ChildBlock],
    used: &mut HashSet<String>,
) -> Result<String, StageError> {
    rewrite_elements(layout, |name| is_tag(name, BLOCK_TAG), |block| {
        let name = attribute(&block.start, "name").unwrap_or_default();
        let default = fill_blocks(block.inner, children, &mut *used)?;
        let content = match children.iter().find(|c| c.name == name) {
            Some(child) => {
                used.insert(name.clone());
                match child.mode {
                    BlockMode::Replace => child.content.clone(),
                    BlockMode::Prepend => format!("{}{default}", child.content),
                    BlockMode::Append => format!("{default}{}", child.content),
                }
            }
            None => default,
        };
        Ok(format!("<{BLOCK_TAG} name=\"{name}\">{content}</{BLOCK_TAG}>"))
    })
}

/// Drop the `<block>` wrappers, keeping their content.
fn unwrap_blocks(html: &str) -> Result<String, StageError> {
    rewrite_elements(html, |name| is_tag(name, BLOCK_TAG), |block| {
        unwrap_blocks(block.inner)
    })
}
