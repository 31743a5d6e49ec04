//! Markup scanning shared by the pipeline stages.
//!
//! Templates are HTML, not XML, so nothing here builds a tree or re-serializes
//! the document. The quick-xml reader only tokenizes: every byte outside the
//! elements a stage cares about is copied through verbatim, which keeps
//! entities, conditional comments and unclosed void elements intact.

use quick_xml::Reader;
use quick_xml::escape::{resolve_html5_entity, unescape_with};
use quick_xml::events::{BytesStart, BytesText, Event};
use std::borrow::Cow;
use std::ops::Range;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarkupError {
    #[error("markup parse error at byte {position}")]
    Parse {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },
    #[error("<{tag}> opened at byte {position} is never closed")]
    Unclosed { tag: String, position: u64 },
}

/// An element matched by [`rewrite_elements`].
#[derive(Debug)]
pub struct Element<'i> {
    pub start: BytesStart<'i>,
    /// Markup between the start and end tags. Empty for `<tag/>`.
    pub inner: &'i str,
}

/// Lenient HTML tokenizer over a quick-xml reader.
///
/// A `<` that does not open a tag (`price < 10`, `{% if a < b %}`) is
/// reported as a one-byte text event and scanning resumes right after it, so
/// it cannot swallow the tag that follows.
pub struct Scanner<'i> {
    input: &'i str,
    /// Offset of the reader's slice within `input`.
    base: usize,
    reader: Reader<&'i [u8]>,
}

impl<'i> Scanner<'i> {
    pub fn new(input: &'i str) -> Self {
        Self {
            input,
            base: 0,
            reader: create_reader(input),
        }
    }

    /// Byte offset of the next event.
    pub fn position(&self) -> usize {
        self.base + self.reader.buffer_position() as usize
    }

    /// The next event and the byte offset it starts at.
    pub fn next_event(&mut self) -> Result<(usize, Event<'i>), MarkupError> {
        let at = self.position();
        if is_stray_angle(&self.input.as_bytes()[at..]) {
            return Ok((at, self.skip_angle(at)));
        }
        let event = self
            .reader
            .read_event()
            .map_err(|source| MarkupError::Parse {
                position: self.base as u64 + self.reader.error_position() as u64,
                source,
            })?;
        let name_ok = match &event {
            Event::Start(e) | Event::Empty(e) => is_element_name(e.name().as_ref()),
            Event::End(e) => is_element_name(e.name().as_ref()),
            _ => true,
        };
        if !name_ok {
            return Ok((at, self.skip_angle(at)));
        }
        Ok((at, event))
    }

    /// Consume everything up to and including the end tag closing `name`,
    /// whose start tag was the last event read. Returns the span between the
    /// tags. Nested elements of the same name are balanced.
    pub fn read_to_end(&mut self, name: &[u8]) -> Result<Range<usize>, MarkupError> {
        let inner_start = self.position();
        let mut depth = 0usize;
        loop {
            let (at, event) = self.next_event()?;
            match event {
                Event::Start(e) if e.name().as_ref().eq_ignore_ascii_case(name) => depth += 1,
                Event::End(e) if e.name().as_ref().eq_ignore_ascii_case(name) => {
                    if depth == 0 {
                        return Ok(inner_start..at);
                    }
                    depth -= 1;
                }
                Event::Eof => {
                    return Err(MarkupError::Unclosed {
                        tag: String::from_utf8_lossy(name).into_owned(),
                        position: inner_start as u64,
                    });
                }
                _ => {}
            }
        }
    }

    fn skip_angle(&mut self, at: usize) -> Event<'i> {
        let input: &'i str = self.input;
        self.base = at + 1;
        self.reader = create_reader(&input[self.base..]);
        Event::Text(BytesText::from_escaped(&input[at..self.base]))
    }
}

fn create_reader(content: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(content);
    let config = reader.config_mut();
    config.trim_text(false);
    config.enable_all_checks(false);
    config.allow_dangling_amp = true;
    reader
}

/// `<` followed by something that cannot start a tag, comment or declaration.
fn is_stray_angle(rest: &[u8]) -> bool {
    match rest {
        [b'<', next, ..] => !(next.is_ascii_alphabetic() || matches!(*next, b'/' | b'!' | b'?')),
        [b'<'] => true,
        _ => false,
    }
}

fn is_element_name(name: &[u8]) -> bool {
    name.first().is_some_and(u8::is_ascii_alphabetic)
}

/// Case-insensitive element name comparison.
pub fn is_tag(name: &[u8], tag: &str) -> bool {
    name.eq_ignore_ascii_case(tag.as_bytes())
}

pub fn tag_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
}

/// Value of an attribute, entity-decoded when possible.
pub fn attribute(start: &BytesStart<'_>, name: &str) -> Option<String> {
    start
        .html_attributes()
        .flatten()
        .find(|attr| attr.key.as_ref().eq_ignore_ascii_case(name.as_bytes()))
        .map(|attr| decode(&String::from_utf8_lossy(&attr.value)))
}

/// Decode HTML character references. Malformed references are kept as written.
pub fn decode(raw: &str) -> String {
    match unescape_with(raw, resolve_html5_entity) {
        Ok(Cow::Owned(decoded)) => decoded,
        _ => raw.to_string(),
    }
}

/// Replace every element whose name satisfies `matches` with the output of
/// `replace`. Everything else is copied through unchanged.
///
/// Matching elements are consumed whole; elements of the same name nested
/// inside a match are part of its `inner` markup and are not visited.
pub fn rewrite_elements<E>(
    input: &str,
    matches: impl Fn(&[u8]) -> bool,
    mut replace: impl FnMut(Element<'_>) -> Result<String, E>,
) -> Result<String, E>
where
    E: From<MarkupError>,
{
    let mut scanner = Scanner::new(input);
    let mut out = String::with_capacity(input.len());
    let mut copied = 0usize;

    loop {
        let (at, event) = scanner.next_event()?;
        match event {
            Event::Start(start) if matches(start.name().as_ref()) => {
                let span = scanner.read_to_end(start.name().as_ref())?;
                let element = Element {
                    inner: &input[span],
                    start,
                };
                out.push_str(&input[copied..at]);
                out.push_str(&replace(element)?);
                copied = scanner.position();
            }
            Event::Empty(start) if matches(start.name().as_ref()) => {
                let element = Element { inner: "", start };
                out.push_str(&input[copied..at]);
                out.push_str(&replace(element)?);
                copied = scanner.position();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    out.push_str(&input[copied..]);
    Ok(out)
}

/// All elements satisfying `matches`, in document order.
pub fn collect_elements(
    input: &str,
    matches: impl Fn(&[u8]) -> bool,
) -> Result<Vec<(BytesStart<'static>, String)>, MarkupError> {
    let mut found = Vec::new();
    rewrite_elements::<MarkupError>(input, matches, |element| {
        found.push((element.start.into_owned(), element.inner.to_string()));
        Ok(String::new())
    })?;
    Ok(found)
}
