//! YAML front matter at the top of a template.
//!
//! ```text
//! ---
//! title: Welcome aboard
//! permalink: build_local/welcome.html
//! build:
//!   destination:
//!     extension: php
//! ---
//! <extends src="src/layouts/main.html">...
//! ```
//!
//! The block is converted into a TOML table so it can be merged over the
//! project config with [`crate::config::merge_toml`]. Anything that is not a
//! YAML mapping degrades to an empty table.

/// Front matter attributes and the template body that follows them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrontMatter<'a> {
    pub attributes: toml::Table,
    pub body: &'a str,
}

/// Split `source` into front matter attributes and body.
///
/// Sources without a front matter fence are returned whole as the body.
pub fn parse(source: &str) -> FrontMatter<'_> {
    let Some((yaml, body)) = split(source) else {
        return FrontMatter {
            attributes: toml::Table::new(),
            body: source,
        };
    };

    let attributes = match serde_yaml::from_str::<serde_yaml::Value>(yaml) {
        Ok(serde_yaml::Value::Mapping(mapping)) => mapping_to_table(mapping),
        Ok(serde_yaml::Value::Null) => toml::Table::new(),
        Ok(_) => {
            tracing::warn!("front matter is not a mapping; ignoring it");
            toml::Table::new()
        }
        Err(e) => {
            tracing::warn!("front matter is not valid YAML ({e}); ignoring it");
            toml::Table::new()
        }
    };

    FrontMatter { attributes, body }
}

/// Remove a leading front matter block, if any.
pub fn strip(source: &str) -> &str {
    split(source).map(|(_, body)| body).unwrap_or(source)
}

/// Locate the `---` fenced block. Returns `(yaml, body)`.
fn split(source: &str) -> Option<(&str, &str)> {
    let text = source.strip_prefix('\u{feff}').unwrap_or(source);
    let rest = text.strip_prefix("---")?;
    let rest = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let fence = line.trim_end_matches(['\r', '\n']);
        if fence == "---" || fence == "..." {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

fn mapping_to_table(mapping: serde_yaml::Mapping) -> toml::Table {
    mapping
        .into_iter()
        .filter_map(|(key, value)| {
            let key = yaml_key(key)?;
            let value = yaml_to_toml(value)?;
            Some((key, value))
        })
        .collect()
}

fn yaml_key(key: serde_yaml::Value) -> Option<String> {
    match key {
        serde_yaml::Value::String(s) => Some(s),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// TOML has no null; null values (and nulls inside lists) are dropped.
fn yaml_to_toml(value: serde_yaml::Value) -> Option<toml::Value> {
    match value {
        serde_yaml::Value::Null => None,
        serde_yaml::Value::Bool(b) => Some(toml::Value::Boolean(b)),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(toml::Value::Integer(i))
            } else {
                n.as_f64().map(toml::Value::Float)
            }
        }
        serde_yaml::Value::String(s) => Some(toml::Value::String(s)),
        serde_yaml::Value::Sequence(items) => Some(toml::Value::Array(
            items.into_iter().filter_map(yaml_to_toml).collect(),
        )),
        serde_yaml::Value::Mapping(mapping) => Some(toml::Value::Table(mapping_to_table(mapping))),
        serde_yaml::Value::Tagged(tagged) => yaml_to_toml(tagged.value),
    }
}
