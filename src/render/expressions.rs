//! `{{ expression }}` evaluation.
//!
//! Expressions are Tera templates rendered over the whole document, without
//! autoescaping. Names available to them, later entries winning:
//!
//! | Name | Source |
//! |------|--------|
//! | any | `[build.posthtml.expressions.locals]` |
//! | any | `[locals]` |
//! | `page` | the effective config, front matter included, plus `env` and `is_merged` |
//! | `css` | the compiled stylesheet |
//!
//! Referencing an undefined name is an error.

use super::RenderContext;
use tera::{Context, Tera};

/// The expression context for one template.
pub fn locals(ctx: &RenderContext<'_>) -> Result<Context, tera::Error> {
    let config = &ctx.effective.config;
    let mut context = Context::new();
    for (key, value) in config
        .build
        .posthtml
        .expressions
        .locals
        .iter()
        .chain(config.locals.iter())
    {
        context.try_insert(key.as_str(), value)?;
    }
    context.try_insert("page", &ctx.effective.page)?;
    context.insert("css", ctx.css);
    Ok(context)
}

pub fn apply(html: &str, locals: &Context) -> Result<String, tera::Error> {
    Tera::one_off(html, locals, false)
}
