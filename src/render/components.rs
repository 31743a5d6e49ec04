//! Component inlining.
//!
//! ```html
//! <component src="src/components/button.html" locals='{"href": "https://example.com"}'>
//!   Click me
//! </component>
//! ```
//!
//! The element is replaced by the component file. Inside the component,
//! `{{ name }}` expressions naming one of its `locals` are substituted, and the
//! `<content>` element receives the markup the caller placed inside the
//! `<component>` element. Components may use other components.

use super::markup::{Element, attribute, is_tag, rewrite_elements, tag_name};
use super::{RenderContext, StageError, check_chain, fetch, include_key};
use crate::front_matter;
use regex::{Captures, Regex};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tera::Context;

/// `{{ key }}` or `{{ key.path.to.value }}`.
static LOCAL_EXPR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)((?:\.[A-Za-z0-9_]+)*)\s*\}\}")
        .expect("local expression regex")
});

pub(super) fn apply(
    html: &str,
    ctx: &RenderContext<'_>,
    locals: &Context,
) -> Result<String, StageError> {
    let base = template_base(ctx);
    inline(html, ctx, locals, &base, &mut Vec::new())
}

fn inline(
    html: &str,
    ctx: &RenderContext<'_>,
    locals: &Context,
    base: &Path,
    chain: &mut Vec<PathBuf>,
) -> Result<String, StageError> {
    let tag = &ctx.effective.config.build.components.tag;
    rewrite_elements(
        html,
        |name| is_tag(name, tag),
        |element| expand(element, ctx, locals, base, &mut *chain),
    )
}

fn expand(
    element: Element<'_>,
    ctx: &RenderContext<'_>,
    locals: &Context,
    base: &Path,
    chain: &mut Vec<PathBuf>,
) -> Result<String, StageError> {
    let settings = &ctx.effective.config.build.components;
    let src = attribute(&element.start, &settings.attribute).ok_or_else(|| {
        StageError::MissingAttribute {
            tag: tag_name(&element.start),
            attribute: settings.attribute.clone(),
        }
    })?;

    let component_locals = match attribute(&element.start, "locals") {
        Some(raw) if !raw.trim().is_empty() => serde_json::from_str::<serde_json::Value>(&raw)
            .map_err(|source| StageError::ComponentLocals {
                src: src.clone(),
                source,
            })?,
        _ => serde_json::Value::Object(serde_json::Map::new()),
    };

    // The caller's content belongs to the caller, so its components resolve
    // on the caller's chain.
    let slot = inline(element.inner, ctx, locals, base, chain)?;

    let path = resolve_src(ctx, base, &src);
    let key = include_key(&path);
    check_chain(chain, &key)?;
    let source = fs::read_to_string(&path).map_err(|source| StageError::ComponentRead {
        path: path.clone(),
        source,
    })?;

    let body = fetch::apply(front_matter::strip(&source), ctx, locals)?;
    let body = substitute_locals(&body, &component_locals);

    let dir = path.parent().unwrap_or(base).to_path_buf();
    chain.push(key);
    let body = inline(&body, ctx, locals, &dir, chain)?;
    chain.pop();

    fill_yield(&body, &settings.yield_tag, &slot)
}

/// Base directory for relative `src` values in the template itself: the
/// directory of `from`, or the components root when `from` is unset.
fn template_base(ctx: &RenderContext<'_>) -> PathBuf {
    let settings = &ctx.effective.config.build.components;
    settings
        .from
        .as_deref()
        .and_then(|from| Path::new(from).parent())
        .map(|dir| ctx.root.join(dir))
        .unwrap_or_else(|| ctx.root.join(&settings.root))
}

/// `/x.html` is relative to the components root, anything else to `base`.
fn resolve_src(ctx: &RenderContext<'_>, base: &Path, src: &str) -> PathBuf {
    match src.strip_prefix('/') {
        Some(absolute) => ctx
            .root
            .join(&ctx.effective.config.build.components.root)
            .join(absolute),
        None => base.join(src),
    }
}

fn substitute_locals(body: &str, locals: &serde_json::Value) -> String {
    LOCAL_EXPR
        .replace_all(body, |caps: &Captures<'_>| {
            let Some(mut value) = locals.get(&caps[1]) else {
                return caps[0].to_string();
            };
            for segment in caps[2].split('.').filter(|s| !s.is_empty()) {
                let next = match value {
                    serde_json::Value::Array(items) => {
                        segment.parse::<usize>().ok().and_then(|i| items.get(i))
                    }
                    other => other.get(segment),
                };
                match next {
                    Some(v) => value = v,
                    None => return String::new(),
                }
            }
            match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            }
        })
        .into_owned()
}

fn fill_yield(body: &str, yield_tag: &str, slot: &str) -> Result<String, StageError> {
    rewrite_elements(body, |name| is_tag(name, yield_tag), |_| Ok(slot.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfig;
    use crate::render::MAX_INCLUDE_DEPTH;
    use crate::render::fetch::tests::MockFetcher;
    use crate::render::tests::render_with;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn render(root: &Path, config: &BuildConfig, source: &str) -> Result<String, StageError> {
        render_with(root, config, source, &MockFetcher::default()).map_err(|e| e.source)
    }

    #[test]
    fn less_than_in_text_does_not_hide_components() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "c.html", "<b>C</b>");
        let config = BuildConfig::default();

        let html = render(
            tmp.path(),
            &config,
            "{% if 1 < 2 %}<component src=\"c.html\"></component>{% endif %}",
        )
        .unwrap();
        assert_eq!(html, "<b>C</b>");

        let html = render(
            tmp.path(),
            &config,
            "<p>Save: price < 10 <component src=\"c.html\"></component></p>",
        )
        .unwrap();
        assert_eq!(html, "<p>Save: price < 10 <b>C</b></p>");
    }

    #[test]
    fn component_is_inlined_with_slot() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "button.html", "<a class=\"btn\"><content></content></a>");
        let html = render(
            tmp.path(),
            &BuildConfig::default(),
            "<p><component src=\"button.html\">Go</component></p>",
        )
        .unwrap();
        assert_eq!(html, "<p><a class=\"btn\">Go</a></p>");
    }

    #[test]
    fn locals_are_substituted_including_paths() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "card.html",
            "<h2>{{ title }}</h2><img src=\"{{ image.src }}\"><i>{{ tags.1 }}</i>",
        );
        let html = render(
            tmp.path(),
            &BuildConfig::default(),
            r#"<component src="card.html" locals='{"title": "Sale", "image": {"src": "a.png"}, "tags": ["x", "y"]}'></component>"#,
        )
        .unwrap();
        assert_eq!(html, "<h2>Sale</h2><img src=\"a.png\"><i>y</i>");
    }

    #[test]
    fn unknown_names_are_left_for_expressions() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "c.html", "{{ page.env }}-{{ label }}");
        let html = render(
            tmp.path(),
            &BuildConfig::default(),
            r#"<component src="c.html" locals='{"label": "L"}'></component>"#,
        )
        .unwrap();
        assert_eq!(html, "local-L");
    }

    #[test]
    fn nested_components() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "outer.html", "[<component src=\"inner.html\"><content></content></component>]");
        write(tmp.path(), "inner.html", "(<content></content>)");
        let html = render(
            tmp.path(),
            &BuildConfig::default(),
            "<component src=\"outer.html\">x</component>",
        )
        .unwrap();
        assert_eq!(html, "[(x)]");
    }

    #[test]
    fn slot_locals_are_not_component_locals() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "c.html", "<content></content>");
        let mut config = BuildConfig::default();
        config
            .locals
            .insert("name".to_string(), toml::Value::String("global".to_string()));
        let html = render(
            tmp.path(),
            &config,
            r#"<component src="c.html" locals='{"name": "local"}'>{{ name }}</component>"#,
        )
        .unwrap();
        assert_eq!(html, "global");
    }

    #[test]
    fn from_sets_relative_base_and_slash_uses_root() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "src/components/a.html", "A");
        write(tmp.path(), "lib/b.html", "B");
        let mut config = BuildConfig::default();
        config.build.components.from = Some("src/components/index.html".to_string());
        let html = render(
            tmp.path(),
            &config,
            "<component src=\"a.html\"></component><component src=\"/lib/b.html\"></component>",
        )
        .unwrap();
        assert_eq!(html, "AB");
    }

    #[test]
    fn nested_src_is_relative_to_including_component() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "parts/card.html",
            "<div><component src=\"icon.html\"></component></div>",
        );
        write(tmp.path(), "parts/icon.html", "*");
        let html = render(
            tmp.path(),
            &BuildConfig::default(),
            "<component src=\"parts/card.html\"></component>",
        )
        .unwrap();
        assert_eq!(html, "<div>*</div>");
    }

    #[test]
    fn component_runs_fetch() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "c.html", "<fetch url=\"u\"></fetch>");
        let fetcher = MockFetcher::with_response("u", "fetched");
        let html = render_with(
            tmp.path(),
            &BuildConfig::default(),
            "<component src=\"c.html\"></component>",
            &fetcher,
        )
        .unwrap();
        assert_eq!(html, "fetched");
    }

    #[test]
    fn self_including_component_is_a_cycle() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.html", "<component src=\"b.html\"></component>");
        write(tmp.path(), "b.html", "<component src=\"a.html\"></component>");
        let err = render(
            tmp.path(),
            &BuildConfig::default(),
            "<component src=\"a.html\"></component>",
        )
        .unwrap_err();
        match err {
            StageError::Cycle { chain } => assert_eq!(chain.len(), 3),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    /// `c0.html` includes `c1.html` and so on; the last one is plain text.
    fn write_component_chain(root: &Path, files: usize) {
        for i in 0..files {
            let body = if i + 1 < files {
                format!("<component src=\"c{}.html\"></component>", i + 1)
            } else {
                "end".to_string()
            };
            write(root, &format!("c{i}.html"), &body);
        }
    }

    #[test]
    fn nesting_up_to_the_limit_renders() {
        let tmp = TempDir::new().unwrap();
        write_component_chain(tmp.path(), MAX_INCLUDE_DEPTH);
        let html = render(
            tmp.path(),
            &BuildConfig::default(),
            "<component src=\"c0.html\"></component>",
        )
        .unwrap();
        assert_eq!(html, "end");
    }

    #[test]
    fn nesting_past_the_limit_is_too_deep() {
        let tmp = TempDir::new().unwrap();
        write_component_chain(tmp.path(), MAX_INCLUDE_DEPTH + 1);
        let err = render(
            tmp.path(),
            &BuildConfig::default(),
            "<component src=\"c0.html\"></component>",
        )
        .unwrap_err();
        match err {
            StageError::TooDeep { path } => {
                assert_eq!(path.file_name().unwrap(), "c64.html")
            }
            other => panic!("expected TooDeep, got {other:?}"),
        }
    }

    #[test]
    fn invalid_locals_json_is_an_error() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "c.html", "x");
        let err = render(
            tmp.path(),
            &BuildConfig::default(),
            "<component src=\"c.html\" locals='{oops'></component>",
        )
        .unwrap_err();
        assert!(matches!(err, StageError::ComponentLocals { .. }));
    }

    #[test]
    fn missing_component_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let err = render(
            tmp.path(),
            &BuildConfig::default(),
            "<component src=\"gone.html\"></component>",
        )
        .unwrap_err();
        assert!(matches!(err, StageError::ComponentRead { .. }));
    }

    #[test]
    fn substitute_handles_scalars() {
        let locals = json!({"n": 3, "ok": true, "none": null});
        assert_eq!(
            substitute_locals("{{n}} {{ ok }} [{{ none }}] {{ n.missing }}", &locals),
            "3 true [] "
        );
    }
}
