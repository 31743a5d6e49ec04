//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Build
//!
//! ```text
//! ==> Building local → build_local
//! Templates (3)
//! 001 welcome.html → build_local/welcome.html
//!     Plaintext: build_local/welcome.txt
//! 002 promo/sale.html → out/sale.html
//! 003 broken.html failed
//!     Failed to compile build_local/broken.html: expression error: ...
//! Assets → build_local/images
//!
//! Built 2 of 3 templates (1 failed)
//! ```
//!
//! ## Check
//!
//! ```text
//! Templates
//! 001 src/templates/welcome.html
//! 002 src/templates/promo/sale.html
//!
//! Destination: build_local (html)
//! ```
//!
//! # Architecture
//!
//! Every `format_*` function is pure and returns lines, so tests can assert on
//! the exact text. The CLI prints the lines.

use crate::build::{BuildEvent, BuildSummary, CheckReport};

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

pub fn format_build_event(event: &BuildEvent) -> Vec<String> {
    match event {
        BuildEvent::Started { env, destination } => {
            vec![format!("==> Building {} → {}", env, destination.display())]
        }
        BuildEvent::TemplatesFound { count } => vec![format!("Templates ({})", count)],
        BuildEvent::TemplateBuilt {
            index,
            source,
            output,
            plaintext,
        } => {
            let mut lines = vec![format!(
                "{} {} → {}",
                format_index(*index),
                source.display(),
                output.display()
            )];
            if let Some(text) = plaintext {
                lines.push(format!("{}Plaintext: {}", indent(1), text.display()));
            }
            lines
        }
        BuildEvent::TemplateFailed {
            index,
            source,
            error,
            detail,
            ..
        } => {
            let mut lines = vec![format!(
                "{} {} failed",
                format_index(*index),
                source.display()
            )];
            let message = detail.as_deref().unwrap_or(error);
            lines.extend(message.lines().map(|l| format!("{}{}", indent(1), l)));
            lines
        }
        BuildEvent::AssetsCopied { destination } => {
            vec![format!("Assets → {}", destination.display())]
        }
    }
}

pub fn format_summary(summary: &BuildSummary) -> Vec<String> {
    let built = summary.outputs.len();
    let line = if summary.failures.is_empty() {
        format!("Built {} of {} templates", built, summary.templates)
    } else {
        format!(
            "Built {} of {} templates ({} failed)",
            built,
            summary.templates,
            summary.failures.len()
        )
    };
    vec![String::new(), line]
}

pub fn format_check_report(report: &CheckReport) -> Vec<String> {
    let mut lines = vec!["Templates".to_string()];
    for (i, template) in report.templates.iter().enumerate() {
        lines.push(format!("{} {}", format_index(i + 1), template.display()));
    }
    lines.push(String::new());
    lines.push(format!(
        "Destination: {} ({})",
        report.config.build.destination.path, report.config.build.destination.extension
    ));
    lines
}
