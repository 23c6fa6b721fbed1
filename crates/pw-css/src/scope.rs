//! Rewrites CSS so every rule applies only under a namespace selector.

use crate::split::CssBlock;
use crate::split::CssBlockKind;
use crate::split::find_matching_brace;
use crate::split::find_top_level_colon;
use crate::split::normalize_ws;
use crate::split::split_blocks;
use crate::split::split_top_level;
use crate::split::top_level_open_brace;
use std::collections::BTreeMap;

/// Marker prepended to keyframes names so scoped animations can never
/// collide with host-page animations.
pub const ANIMATION_SCOPE_PREFIX: &str = "pw-";

/// Scopes `css` under `namespace_selector`.
///
/// Font-face blocks are emitted verbatim (they cannot be namespaced);
/// keyframes are renamed with [`ANIMATION_SCOPE_PREFIX`]; `:root` becomes
/// the namespace selector; media/supports keep their condition and recurse;
/// plain rules get each selector-list part prefixed as a descendant.
pub fn scope_css(css: &str, namespace_selector: &str) -> String {
    let blocks = split_blocks(css);

    // The full rename map is built before any rule is rewritten: a rule may
    // reference an animation defined later in source order.
    let renames = keyframes_renames(&blocks);

    let mut out = Vec::with_capacity(blocks.len());
    for block in &blocks {
        if let Some(scoped) = scope_block(block, namespace_selector, &renames) {
            out.push(scoped);
        }
    }

    out.join("\n\n")
}

fn scope_block(
    block: &CssBlock,
    namespace_selector: &str,
    renames: &BTreeMap<String, String>,
) -> Option<String> {
    match block.kind {
        CssBlockKind::FontFace => Some(block.text.clone()),
        CssBlockKind::Keyframes => Some(rename_keyframes_block(&block.text)),
        CssBlockKind::Root => rewrite_root_block(&block.text, namespace_selector),
        CssBlockKind::Media | CssBlockKind::Supports => {
            scope_conditional_block(&block.text, namespace_selector, renames)
        }
        CssBlockKind::Rule => Some(scope_rule_block(&block.text, namespace_selector, renames)),
    }
}

fn keyframes_renames(blocks: &[CssBlock]) -> BTreeMap<String, String> {
    let mut renames = BTreeMap::new();

    for block in blocks {
        if block.kind != CssBlockKind::Keyframes {
            continue;
        }

        if let Some(name) = keyframes_name(&block.text) {
            renames.insert(name.clone(), scoped_animation_name(&name));
        }
    }

    renames
}

fn scoped_animation_name(name: &str) -> String {
    if name.starts_with(ANIMATION_SCOPE_PREFIX) {
        name.to_owned()
    } else {
        format!("{ANIMATION_SCOPE_PREFIX}{name}")
    }
}

fn keyframes_name(text: &str) -> Option<String> {
    let open = top_level_open_brace(text)?;
    let prelude = normalize_ws(&text[..open]);
    prelude.split_whitespace().nth(1).map(str::to_owned)
}

fn rename_keyframes_block(text: &str) -> String {
    let Some(open) = top_level_open_brace(text) else {
        return text.to_owned();
    };

    let prelude = normalize_ws(&text[..open]);
    let mut tokens = prelude.split_whitespace();
    let (Some(at_keyword), Some(name)) = (tokens.next(), tokens.next()) else {
        return text.to_owned();
    };

    format!(
        "{at_keyword} {} {}",
        scoped_animation_name(name),
        &text[open..]
    )
}

fn rewrite_root_block(text: &str, namespace_selector: &str) -> Option<String> {
    let open = top_level_open_brace(text)?;
    Some(format!("{namespace_selector} {}", &text[open..]))
}

fn scope_conditional_block(
    text: &str,
    namespace_selector: &str,
    renames: &BTreeMap<String, String>,
) -> Option<String> {
    let open = top_level_open_brace(text)?;
    let close = find_matching_brace(text, open)?;
    let condition = text[..open].trim_end();
    let inner = &text[open.saturating_add(1)..close];

    let mut scoped = Vec::new();
    for inner_block in &split_blocks(inner) {
        let piece = match inner_block.kind {
            CssBlockKind::Media | CssBlockKind::Supports => {
                scope_conditional_block(&inner_block.text, namespace_selector, renames)
            }
            // Nested font-face/keyframes pass through untouched.
            CssBlockKind::FontFace | CssBlockKind::Keyframes => Some(inner_block.text.clone()),
            CssBlockKind::Root => rewrite_root_block(&inner_block.text, namespace_selector),
            CssBlockKind::Rule => Some(scope_rule_block(
                &inner_block.text,
                namespace_selector,
                renames,
            )),
        };

        if let Some(piece) = piece {
            scoped.push(piece);
        }
    }

    Some(format!("{condition} {{\n{}\n}}", scoped.join("\n")))
}

fn scope_rule_block(
    text: &str,
    namespace_selector: &str,
    renames: &BTreeMap<String, String>,
) -> String {
    let Some(open) = top_level_open_brace(text) else {
        return text.to_owned();
    };

    let selector_list = &text[..open];
    let scoped_selector = split_top_level(selector_list, ',')
        .iter()
        .map(|part| format!("{namespace_selector} {}", part.trim()))
        .collect::<Vec<_>>()
        .join(", ");

    let body = &text[open..];
    if renames.is_empty() || !body.to_ascii_lowercase().contains("animation") {
        return format!("{scoped_selector} {body}");
    }

    let Some(close) = find_matching_brace(text, open) else {
        return format!("{scoped_selector} {body}");
    };

    let inner = &text[open.saturating_add(1)..close];
    let rewritten = rewrite_animation_declarations(inner, renames);
    format!("{scoped_selector} {{ {rewritten} }}")
}

fn rewrite_animation_declarations(inner: &str, renames: &BTreeMap<String, String>) -> String {
    let mut declarations = Vec::new();

    for part in split_top_level(inner, ';') {
        let trimmed = part.trim();
        if trimmed.is_empty() {
            continue;
        }

        let rewritten = match find_top_level_colon(trimmed) {
            Some(colon_idx) => {
                let name = trimmed[..colon_idx].trim();
                let value = &trimmed[colon_idx.saturating_add(1)..];
                if name.eq_ignore_ascii_case("animation")
                    || name.eq_ignore_ascii_case("animation-name")
                {
                    // Textual token match within the value: an adjacent value
                    // containing an identical token would also be rewritten.
                    format!("{name}: {}", rewrite_animation_value(value, renames).trim())
                } else {
                    trimmed.to_owned()
                }
            }
            None => trimmed.to_owned(),
        };

        declarations.push(rewritten);
    }

    format!("{};", declarations.join("; "))
}

fn rewrite_animation_value(value: &str, renames: &BTreeMap<String, String>) -> String {
    let mut rewritten = value.to_owned();
    for (old, new) in renames {
        if old == new {
            continue;
        }
        rewritten = replace_identifier(&rewritten, old, new);
    }
    rewritten
}

fn replace_identifier(value: &str, old: &str, new: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = String::with_capacity(value.len());
    let mut idx = 0_usize;

    while idx < value.len() {
        if value[idx..].starts_with(old) {
            let before = if idx == 0 {
                None
            } else {
                bytes.get(idx.saturating_sub(1)).copied()
            };
            let after = bytes.get(idx.saturating_add(old.len())).copied();
            let boundary_before = before.is_none_or(|byte| !is_identifier_byte(byte));
            let boundary_after = after.is_none_or(|byte| !is_identifier_byte(byte));

            if boundary_before && boundary_after {
                out.push_str(new);
                idx = idx.saturating_add(old.len());
                continue;
            }
        }

        let Some(ch) = value[idx..].chars().next() else {
            break;
        };
        out.push(ch);
        idx = idx.saturating_add(ch.len_utf8());
    }

    out
}

fn is_identifier_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_')
}
