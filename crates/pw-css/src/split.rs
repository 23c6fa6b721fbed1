//! Top-level CSS block splitting.
//!
//! Single-pass brace-depth scan over raw CSS text. Comments are skipped
//! wherever they appear and never affect depth; string literals are opaque.
//! The one failure mode is a stray top-level `}`: the scan stops and the
//! blocks collected so far are returned.

/// Kind of a top-level block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CssBlockKind {
    FontFace,
    Keyframes,
    Media,
    Supports,
    Root,
    Rule,
}

/// One top-level block, spanning the original text from the start of its
/// prelude through its closing brace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssBlock {
    pub kind: CssBlockKind,
    pub text: String,
}

enum BraceScan {
    Open(usize),
    StrayClose,
    End,
}

/// Splits CSS into an ordered list of kind-tagged top-level blocks.
/// Unknown at-rules are dropped silently.
pub fn split_blocks(css: &str) -> Vec<CssBlock> {
    let mut blocks = Vec::new();
    let mut cursor = 0_usize;

    while cursor < css.len() {
        let start = skip_block_separators(css, cursor);
        if start >= css.len() {
            break;
        }

        let open = match scan_for_open_brace(css, start) {
            BraceScan::Open(idx) => idx,
            BraceScan::StrayClose | BraceScan::End => break,
        };

        let Some(close) = find_matching_brace(css, open) else {
            break;
        };
        cursor = close.saturating_add(1);

        if let Some(kind) = classify_prelude(&css[start..open]) {
            blocks.push(CssBlock {
                kind,
                text: css[start..=close].to_owned(),
            });
        }
    }

    blocks
}

fn classify_prelude(prelude: &str) -> Option<CssBlockKind> {
    let normalized = normalize_ws(prelude);
    if normalized.is_empty() {
        return None;
    }

    if let Some(at_rule) = normalized.strip_prefix('@') {
        let keyword = at_rule
            .split(|ch: char| ch.is_whitespace() || ch == '(')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        return match keyword.as_str() {
            "font-face" => Some(CssBlockKind::FontFace),
            "keyframes" => Some(CssBlockKind::Keyframes),
            "media" => Some(CssBlockKind::Media),
            "supports" => Some(CssBlockKind::Supports),
            _ => None,
        };
    }

    if normalized == ":root" {
        return Some(CssBlockKind::Root);
    }

    Some(CssBlockKind::Rule)
}

fn skip_block_separators(css: &str, mut idx: usize) -> usize {
    let bytes = css.as_bytes();

    while idx < bytes.len() {
        let byte = bytes[idx];
        if byte.is_ascii_whitespace() || byte == b';' {
            idx = idx.saturating_add(1);
            continue;
        }

        if byte == b'/' && bytes.get(idx.saturating_add(1)).copied() == Some(b'*') {
            idx = match find_subslice(bytes, idx.saturating_add(2), b"*/") {
                Some(end) => end.saturating_add(2),
                None => bytes.len(),
            };
            continue;
        }

        break;
    }

    idx
}

fn scan_for_open_brace(css: &str, from: usize) -> BraceScan {
    let bytes = css.as_bytes();
    let mut idx = from;
    let mut in_single = false;
    let mut in_double = false;
    let mut escape = false;
    let mut paren_depth = 0_u32;
    let mut bracket_depth = 0_u32;

    while idx < bytes.len() {
        let byte = bytes[idx];
        let next = bytes.get(idx.saturating_add(1)).copied();

        if in_single {
            if !escape && byte == b'\\' {
                escape = true;
            } else if !escape && byte == b'\'' {
                in_single = false;
            } else {
                escape = false;
            }
            idx = idx.saturating_add(1);
            continue;
        }

        if in_double {
            if !escape && byte == b'\\' {
                escape = true;
            } else if !escape && byte == b'"' {
                in_double = false;
            } else {
                escape = false;
            }
            idx = idx.saturating_add(1);
            continue;
        }

        if byte == b'/' && next == Some(b'*') {
            idx = match find_subslice(bytes, idx.saturating_add(2), b"*/") {
                Some(end) => end.saturating_add(2),
                None => bytes.len(),
            };
            continue;
        }

        match byte {
            b'\'' => in_single = true,
            b'"' => in_double = true,
            b'(' => paren_depth = paren_depth.saturating_add(1),
            b')' => paren_depth = paren_depth.saturating_sub(1),
            b'[' => bracket_depth = bracket_depth.saturating_add(1),
            b']' => bracket_depth = bracket_depth.saturating_sub(1),
            b'{' if paren_depth == 0 && bracket_depth == 0 => return BraceScan::Open(idx),
            b'}' if paren_depth == 0 && bracket_depth == 0 => return BraceScan::StrayClose,
            _ => {}
        }

        idx = idx.saturating_add(1);
    }

    BraceScan::End
}

/// Finds the first top-level `{` of a block's own text, if any.
pub(crate) fn top_level_open_brace(input: &str) -> Option<usize> {
    match scan_for_open_brace(input, 0) {
        BraceScan::Open(idx) => Some(idx),
        BraceScan::StrayClose | BraceScan::End => None,
    }
}

/// Finds the `}` matching the `{` at `open_brace`, skipping comments and
/// string literals.
pub(crate) fn find_matching_brace(input: &str, open_brace: usize) -> Option<usize> {
    let bytes = input.as_bytes();
    if bytes.get(open_brace).copied() != Some(b'{') {
        return None;
    }

    let mut idx = open_brace.saturating_add(1);
    let mut in_single = false;
    let mut in_double = false;
    let mut in_comment = false;
    let mut escape = false;
    let mut depth = 1_u32;

    while idx < bytes.len() {
        let byte = bytes[idx];
        let next = bytes.get(idx.saturating_add(1)).copied();

        if in_comment {
            if byte == b'*' && next == Some(b'/') {
                in_comment = false;
                idx = idx.saturating_add(2);
                continue;
            }
            idx = idx.saturating_add(1);
            continue;
        }

        if in_single {
            if !escape && byte == b'\\' {
                escape = true;
            } else if !escape && byte == b'\'' {
                in_single = false;
            } else {
                escape = false;
            }
            idx = idx.saturating_add(1);
            continue;
        }

        if in_double {
            if !escape && byte == b'\\' {
                escape = true;
            } else if !escape && byte == b'"' {
                in_double = false;
            } else {
                escape = false;
            }
            idx = idx.saturating_add(1);
            continue;
        }

        if byte == b'/' && next == Some(b'*') {
            in_comment = true;
            idx = idx.saturating_add(2);
            continue;
        }

        match byte {
            b'\'' => in_single = true,
            b'"' => in_double = true,
            b'{' => depth = depth.saturating_add(1),
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }

        idx = idx.saturating_add(1);
    }

    None
}

/// Splits on a delimiter at paren/bracket depth zero, outside strings.
pub(crate) fn split_top_level(input: &str, delimiter: char) -> Vec<&str> {
    let bytes = input.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0_usize;
    let mut idx = 0_usize;
    let mut in_single = false;
    let mut in_double = false;
    let mut escape = false;
    let mut paren_depth = 0_u32;
    let mut bracket_depth = 0_u32;

    while idx < bytes.len() {
        let byte = bytes[idx];

        if in_single {
            if !escape && byte == b'\\' {
                escape = true;
            } else if !escape && byte == b'\'' {
                in_single = false;
            } else {
                escape = false;
            }
            idx = idx.saturating_add(1);
            continue;
        }

        if in_double {
            if !escape && byte == b'\\' {
                escape = true;
            } else if !escape && byte == b'"' {
                in_double = false;
            } else {
                escape = false;
            }
            idx = idx.saturating_add(1);
            continue;
        }

        match byte {
            b'\'' => in_single = true,
            b'"' => in_double = true,
            b'(' => paren_depth = paren_depth.saturating_add(1),
            b')' => paren_depth = paren_depth.saturating_sub(1),
            b'[' => bracket_depth = bracket_depth.saturating_add(1),
            b']' => bracket_depth = bracket_depth.saturating_sub(1),
            _ => {
                if byte == delimiter as u8 && paren_depth == 0 && bracket_depth == 0 {
                    parts.push(&input[start..idx]);
                    start = idx.saturating_add(1);
                }
            }
        }

        idx = idx.saturating_add(1);
    }

    if start <= input.len() {
        parts.push(&input[start..]);
    }

    parts
}

/// Finds the first `:` at paren/bracket depth zero, outside strings.
pub(crate) fn find_top_level_colon(input: &str) -> Option<usize> {
    let bytes = input.as_bytes();
    let mut idx = 0_usize;
    let mut in_single = false;
    let mut in_double = false;
    let mut escape = false;
    let mut paren_depth = 0_u32;
    let mut bracket_depth = 0_u32;

    while idx < bytes.len() {
        let byte = bytes[idx];

        if in_single {
            if !escape && byte == b'\\' {
                escape = true;
            } else if !escape && byte == b'\'' {
                in_single = false;
            } else {
                escape = false;
            }
            idx = idx.saturating_add(1);
            continue;
        }

        if in_double {
            if !escape && byte == b'\\' {
                escape = true;
            } else if !escape && byte == b'"' {
                in_double = false;
            } else {
                escape = false;
            }
            idx = idx.saturating_add(1);
            continue;
        }

        match byte {
            b'\'' => in_single = true,
            b'"' => in_double = true,
            b'(' => paren_depth = paren_depth.saturating_add(1),
            b')' => paren_depth = paren_depth.saturating_sub(1),
            b'[' => bracket_depth = bracket_depth.saturating_add(1),
            b']' => bracket_depth = bracket_depth.saturating_sub(1),
            b':' if paren_depth == 0 && bracket_depth == 0 => return Some(idx),
            _ => {}
        }

        idx = idx.saturating_add(1);
    }

    None
}

/// Parses a declaration body into ordered `(name, value)` pairs; names are
/// lowercased, malformed declarations are skipped.
pub(crate) fn parse_declaration_pairs(inner: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();

    for part in split_top_level(inner, ';') {
        let trimmed = part.trim();
        if trimmed.is_empty() {
            continue;
        }

        let Some(colon_idx) = find_top_level_colon(trimmed) else {
            continue;
        };

        let name = trimmed[..colon_idx].trim().to_ascii_lowercase();
        let value = trimmed[colon_idx.saturating_add(1)..].trim().to_owned();
        if !name.is_empty() && !value.is_empty() {
            pairs.push((name, value));
        }
    }

    pairs
}

pub(crate) fn normalize_ws(input: &str) -> String {
    input
        .split_whitespace()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
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

#[cfg(test)]
mod tests {
    use super::CssBlockKind;
    use super::split_blocks;
    use super::split_top_level;

    #[test]
    fn single_font_face_block_keeps_its_exact_span() {
        let css = "@font-face { font-family: \"Inter\"; src: url(inter.woff2); }";
        let blocks = split_blocks(css);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, CssBlockKind::FontFace);
        assert_eq!(blocks[0].text, css);
    }

    #[test]
    fn classifies_all_known_kinds() {
        let css = "@font-face{src:url(a)}\n\
                   @keyframes spin{to{transform:rotate(1turn)}}\n\
                   @media (min-width:800px){p{margin:0}}\n\
                   @supports (display:grid){div{display:grid}}\n\
                   :root{--x:1}\n\
                   .card{padding:8px}";
        let kinds: Vec<CssBlockKind> = split_blocks(css).iter().map(|block| block.kind).collect();
        assert_eq!(
            kinds,
            vec![
                CssBlockKind::FontFace,
                CssBlockKind::Keyframes,
                CssBlockKind::Media,
                CssBlockKind::Supports,
                CssBlockKind::Root,
                CssBlockKind::Rule,
            ]
        );
    }

    #[test]
    fn unknown_at_rules_are_dropped() {
        let css = "@import url(x.css);@page{margin:1cm}p{color:red}";
        let blocks = split_blocks(css);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, CssBlockKind::Rule);
    }

    #[test]
    fn comments_do_not_affect_brace_depth() {
        let css = ".a { /* } not a close */ color: red; } .b { margin: 0; }";
        let blocks = split_blocks(css);
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].text.contains("not a close"));
    }

    #[test]
    fn stray_closing_brace_stops_the_scan() {
        let css = ".a { color: red; } } .b { margin: 0; }";
        let blocks = split_blocks(css);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, CssBlockKind::Rule);
    }

    #[test]
    fn braces_inside_strings_are_opaque() {
        let css = ".icon { background: url(\"brace}.png\"); } .x { color: blue; }";
        let blocks = split_blocks(css);
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn top_level_split_respects_nesting() {
        let parts = split_top_level(".a:not(.b, .c), .d[data-x=\"1,2\"], .e", ',');
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].trim(), ".a:not(.b, .c)");
        assert_eq!(parts[1].trim(), ".d[data-x=\"1,2\"]");
        assert_eq!(parts[2].trim(), ".e");
    }
}
