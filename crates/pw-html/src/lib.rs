//! Byte-cursor HTML tag scanning with attribute capture.
//!
//! The scanner is lossless: every event carries its source span so callers
//! can rewrite individual start tags and copy everything else verbatim. It
//! is not an HTML5 tree builder; it targets the constrained documents this
//! pipeline scrapes and produces.

/// Single parsed attribute. `value` is `None` for boolean attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagAttribute {
    pub name: String,
    pub value: Option<String>,
}

impl TagAttribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }
}

/// Parsed start tag, spanning `start..end` in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTagEvent {
    pub name: String,
    pub attributes: Vec<TagAttribute>,
    pub self_closing: bool,
    pub start: usize,
    pub end: usize,
}

/// Scanner output. `Verbatim` covers text, comments, doctypes, processing
/// instructions, and raw `<script>`/`<style>` content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HtmlEvent {
    StartTag(StartTagEvent),
    EndTag {
        name: String,
        start: usize,
        end: usize,
    },
    Verbatim {
        start: usize,
        end: usize,
    },
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

pub fn is_void_element(name: &str) -> bool {
    VOID_ELEMENTS.iter().any(|void| name.eq_ignore_ascii_case(void))
}

/// Case-insensitive attribute lookup; boolean attributes read as `""`.
pub fn attribute<'a>(attributes: &'a [TagAttribute], name: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|attribute| attribute.name.eq_ignore_ascii_case(name))
        .map(|attribute| attribute.value.as_deref().unwrap_or(""))
}

/// Scans a document into an ordered event list covering every source byte.
pub fn scan_events(html: &str) -> Vec<HtmlEvent> {
    let bytes = html.as_bytes();
    let mut events = Vec::new();
    let mut idx = 0_usize;

    while idx < bytes.len() {
        if bytes[idx] != b'<' {
            let next = find_byte(bytes, idx, b'<').unwrap_or(bytes.len());
            events.push(HtmlEvent::Verbatim {
                start: idx,
                end: next,
            });
            idx = next;
            continue;
        }

        if starts_with(bytes, idx, b"<!--") {
            let end = skip_comment(bytes, idx);
            events.push(HtmlEvent::Verbatim { start: idx, end });
            idx = end;
            continue;
        }

        if starts_with(bytes, idx, b"<!") || starts_with(bytes, idx, b"<?") {
            let end = skip_to_gt(bytes, idx.saturating_add(2));
            events.push(HtmlEvent::Verbatim { start: idx, end });
            idx = end;
            continue;
        }

        if starts_with(bytes, idx, b"</") {
            match parse_end_tag(bytes, idx) {
                Some((name, end)) => {
                    events.push(HtmlEvent::EndTag {
                        name,
                        start: idx,
                        end,
                    });
                    idx = end;
                }
                None => {
                    events.push(HtmlEvent::Verbatim {
                        start: idx,
                        end: idx.saturating_add(1),
                    });
                    idx = idx.saturating_add(1);
                }
            }
            continue;
        }

        let Some(tag) = parse_start_tag(html, idx) else {
            events.push(HtmlEvent::Verbatim {
                start: idx,
                end: idx.saturating_add(1),
            });
            idx = idx.saturating_add(1);
            continue;
        };

        idx = tag.end;
        let raw_container = !tag.self_closing && (tag.name == "script" || tag.name == "style");
        let raw_name = tag.name.clone();
        events.push(HtmlEvent::StartTag(tag));

        if raw_container {
            let (raw_end, close) = raw_text_end(bytes, idx, &raw_name);
            if raw_end > idx {
                events.push(HtmlEvent::Verbatim {
                    start: idx,
                    end: raw_end,
                });
            }
            if let Some((close_name, close_end)) = close {
                events.push(HtmlEvent::EndTag {
                    name: close_name,
                    start: raw_end,
                    end: close_end,
                });
                idx = close_end;
            } else {
                idx = raw_end;
            }
        }
    }

    events
}

/// Serializes a start tag from parsed parts. Double quotes inside attribute
/// values are escaped; everything else is emitted as captured.
pub fn render_start_tag(name: &str, attributes: &[TagAttribute], self_closing: bool) -> String {
    let mut out = String::with_capacity(name.len().saturating_add(16));
    out.push('<');
    out.push_str(name);

    for attribute in attributes {
        out.push(' ');
        out.push_str(&attribute.name);
        if let Some(value) = &attribute.value {
            out.push_str("=\"");
            out.push_str(&escape_attribute_value(value));
            out.push('"');
        }
    }

    if self_closing {
        out.push_str(" /");
    }
    out.push('>');
    out
}

pub fn escape_attribute_value(value: &str) -> String {
    value.replace('"', "&quot;")
}

/// Minimal entity decoding for attribute values that feed URL handling.
pub fn decode_attribute_value(value: &str) -> String {
    value
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
}

fn parse_start_tag(html: &str, start: usize) -> Option<StartTagEvent> {
    let bytes = html.as_bytes();
    if bytes.get(start).copied() != Some(b'<') {
        return None;
    }

    let mut idx = start.saturating_add(1);
    let name_start = idx;
    while idx < bytes.len() && is_tag_name_char(bytes[idx]) {
        idx = idx.saturating_add(1);
    }

    if idx == name_start {
        return None;
    }

    let name = String::from_utf8_lossy(&bytes[name_start..idx]).to_ascii_lowercase();
    let mut attributes = Vec::new();
    let mut self_closing = false;

    loop {
        idx = skip_spaces(bytes, idx);
        match bytes.get(idx).copied() {
            None => return None,
            Some(b'>') => {
                return Some(StartTagEvent {
                    name,
                    attributes,
                    self_closing,
                    start,
                    end: idx.saturating_add(1),
                });
            }
            Some(b'/') => {
                if bytes.get(idx.saturating_add(1)).copied() == Some(b'>') {
                    self_closing = true;
                    return Some(StartTagEvent {
                        name,
                        attributes,
                        self_closing,
                        start,
                        end: idx.saturating_add(2),
                    });
                }
                idx = idx.saturating_add(1);
            }
            Some(_) => {
                let (attribute, next) = parse_attribute(html, idx)?;
                attributes.push(attribute);
                idx = next;
            }
        }
    }
}

fn parse_attribute(html: &str, start: usize) -> Option<(TagAttribute, usize)> {
    let bytes = html.as_bytes();
    let mut idx = start;

    let name_start = idx;
    while idx < bytes.len() && is_attribute_name_char(bytes[idx]) {
        idx = idx.saturating_add(1);
    }

    if idx == name_start {
        return None;
    }

    let name = String::from_utf8_lossy(&bytes[name_start..idx]).to_ascii_lowercase();
    let after_name = skip_spaces(bytes, idx);

    if bytes.get(after_name).copied() != Some(b'=') {
        return Some((TagAttribute { name, value: None }, idx));
    }

    idx = skip_spaces(bytes, after_name.saturating_add(1));
    match bytes.get(idx).copied() {
        Some(quote @ (b'"' | b'\'')) => {
            let value_start = idx.saturating_add(1);
            let value_end = find_byte(bytes, value_start, quote)?;
            let value = html[value_start..value_end].to_owned();
            Some((
                TagAttribute {
                    name,
                    value: Some(value),
                },
                value_end.saturating_add(1),
            ))
        }
        Some(_) => {
            let value_start = idx;
            while idx < bytes.len() && !bytes[idx].is_ascii_whitespace() && bytes[idx] != b'>' {
                idx = idx.saturating_add(1);
            }
            let value = html[value_start..idx].to_owned();
            Some((
                TagAttribute {
                    name,
                    value: Some(value),
                },
                idx,
            ))
        }
        None => None,
    }
}

fn parse_end_tag(bytes: &[u8], start: usize) -> Option<(String, usize)> {
    let mut idx = start.saturating_add(2);
    idx = skip_spaces(bytes, idx);

    let name_start = idx;
    while idx < bytes.len() && is_tag_name_char(bytes[idx]) {
        idx = idx.saturating_add(1);
    }

    if idx == name_start {
        return None;
    }

    let name = String::from_utf8_lossy(&bytes[name_start..idx]).to_ascii_lowercase();
    let end = skip_to_gt(bytes, idx);
    Some((name, end))
}

/// Finds where raw `<script>`/`<style>` text ends. Returns the raw-text end
/// offset plus the parsed closing tag, if one exists before EOF.
fn raw_text_end(bytes: &[u8], start: usize, tag_name: &str) -> (usize, Option<(String, usize)>) {
    let tag_bytes = tag_name.as_bytes();
    let mut idx = start;

    while idx < bytes.len() {
        if bytes[idx] == b'<'
            && bytes.get(idx.saturating_add(1)).copied() == Some(b'/')
            && starts_with_ignore_ascii_case(bytes, idx.saturating_add(2), tag_bytes)
            && tag_name_boundary(bytes, idx.saturating_add(2).saturating_add(tag_bytes.len()))
        {
            if let Some((name, end)) = parse_end_tag(bytes, idx) {
                return (idx, Some((name, end)));
            }
        }

        idx = idx.saturating_add(1);
    }

    (bytes.len(), None)
}

fn skip_comment(bytes: &[u8], start: usize) -> usize {
    find_subslice(bytes, start.saturating_add(4), b"-->")
        .map(|end| end.saturating_add(3))
        .unwrap_or(bytes.len())
}

fn skip_to_gt(bytes: &[u8], mut idx: usize) -> usize {
    while idx < bytes.len() {
        if bytes[idx] == b'>' {
            return idx.saturating_add(1);
        }
        idx = idx.saturating_add(1);
    }

    bytes.len()
}

fn tag_name_boundary(bytes: &[u8], idx: usize) -> bool {
    match bytes.get(idx).copied() {
        None => true,
        Some(byte) => byte.is_ascii_whitespace() || byte == b'>' || byte == b'/',
    }
}

fn skip_spaces(bytes: &[u8], mut idx: usize) -> usize {
    while idx < bytes.len() && bytes[idx].is_ascii_whitespace() {
        idx = idx.saturating_add(1);
    }
    idx
}

fn is_tag_name_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b':')
}

fn is_attribute_name_char(byte: u8) -> bool {
    !byte.is_ascii_whitespace() && !matches!(byte, b'=' | b'>' | b'/' | b'"' | b'\'')
}

fn starts_with(bytes: &[u8], idx: usize, pattern: &[u8]) -> bool {
    let end = idx.saturating_add(pattern.len());
    end <= bytes.len() && bytes[idx..end] == *pattern
}

fn starts_with_ignore_ascii_case(bytes: &[u8], idx: usize, pattern: &[u8]) -> bool {
    let end = idx.saturating_add(pattern.len());
    if end > bytes.len() {
        return false;
    }

    bytes[idx..end]
        .iter()
        .zip(pattern.iter())
        .all(|(left, right)| left.eq_ignore_ascii_case(right))
}

fn find_subslice(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from >= bytes.len() {
        return None;
    }

    bytes[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| from + offset)
}

fn find_byte(bytes: &[u8], from: usize, byte: u8) -> Option<usize> {
    bytes[from..]
        .iter()
        .position(|candidate| *candidate == byte)
        .map(|offset| from + offset)
}

#[cfg(test)]
mod tests {
    use super::HtmlEvent;
    use super::attribute;
    use super::is_void_element;
    use super::render_start_tag;
    use super::scan_events;

    fn start_tags(html: &str) -> Vec<super::StartTagEvent> {
        scan_events(html)
            .into_iter()
            .filter_map(|event| match event {
                HtmlEvent::StartTag(tag) => Some(tag),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn events_cover_every_source_byte() {
        let html = "<div class=\"a\">hi<br/></div><!-- c -->tail";
        let events = scan_events(html);

        let mut cursor = 0_usize;
        for event in &events {
            let (start, end) = match event {
                HtmlEvent::StartTag(tag) => (tag.start, tag.end),
                HtmlEvent::EndTag { start, end, .. } => (*start, *end),
                HtmlEvent::Verbatim { start, end } => (*start, *end),
            };
            assert_eq!(start, cursor);
            cursor = end;
        }
        assert_eq!(cursor, html.len());
    }

    #[test]
    fn captures_quoted_unquoted_and_boolean_attributes() {
        let tags = start_tags("<img src='a.png' width=80 loading>");
        assert_eq!(tags.len(), 1);
        assert_eq!(attribute(&tags[0].attributes, "src"), Some("a.png"));
        assert_eq!(attribute(&tags[0].attributes, "width"), Some("80"));
        assert_eq!(attribute(&tags[0].attributes, "loading"), Some(""));
        assert_eq!(attribute(&tags[0].attributes, "missing"), None);
    }

    #[test]
    fn script_content_is_raw_text() {
        let html = "<script>if (1 < 2) { x(\"</div>\"); }</script><p>after</p>";
        let tags = start_tags(html);
        let names: Vec<&str> = tags.iter().map(|tag| tag.name.as_str()).collect();
        assert_eq!(names, vec!["script", "p"]);
    }

    #[test]
    fn style_close_tag_is_found_case_insensitively() {
        let html = "<style>p{color:red}</STYLE><div></div>";
        let events = scan_events(html);
        let end_names: Vec<String> = events
            .iter()
            .filter_map(|event| match event {
                HtmlEvent::EndTag { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(end_names, vec!["style".to_owned(), "div".to_owned()]);
    }

    #[test]
    fn renders_start_tags_with_escaped_values() {
        let tags = start_tags("<a href=\"/x\" data-note='say \"hi\"'>");
        assert_eq!(tags.len(), 1);
        let rendered = render_start_tag(&tags[0].name, &tags[0].attributes, false);
        assert_eq!(rendered, "<a href=\"/x\" data-note=\"say &quot;hi&quot;\">");
    }

    #[test]
    fn void_elements_are_recognized() {
        assert!(is_void_element("img"));
        assert!(is_void_element("BR"));
        assert!(!is_void_element("div"));
    }
}
