//! Cascade resolution: materializes each element's winning declarations as
//! inline `style=""` attributes.
//!
//! Original `<style>` tags are left intact; the pass is additive. No
//! network fetch ever happens here — all external CSS must already be in
//! `all_css_text`.

use crate::split::CssBlockKind;
use crate::split::find_matching_brace;
use crate::split::find_top_level_colon;
use crate::split::split_blocks;
use crate::split::split_top_level;
use crate::split::top_level_open_brace;
use pw_html::HtmlEvent;
use pw_html::StartTagEvent;
use pw_html::TagAttribute;
use pw_html::attribute;
use pw_html::is_void_element;
use pw_html::render_start_tag;
use pw_html::scan_events;
use std::collections::BTreeMap;
use std::time::Duration;
use std::time::Instant;

/// Documents larger than this are not inlined at all.
pub const MAX_RESOLVE_INPUT_CHARS: usize = 1_000_000;

/// Inlined output larger than this is discarded entirely.
pub const MAX_RESOLVE_OUTPUT_CHARS: usize = 2_000_000;

const RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Produces cascade-inlined HTML, or an empty string when any input,
/// output, or wall-clock ceiling is exceeded.
pub fn resolve_cascade(html: &str, all_css_text: &str) -> String {
    if html.len() > MAX_RESOLVE_INPUT_CHARS {
        log::warn!("cascade input exceeds {MAX_RESOLVE_INPUT_CHARS} chars; skipping inlining");
        return String::new();
    }

    let started = Instant::now();
    let injected = inject_style_block(html, all_css_text);
    let rules = compile_rules(&collect_style_text(&injected));

    let events = scan_events(&injected);
    let mut out = String::with_capacity(injected.len().saturating_add(injected.len() / 4));
    let mut stack: Vec<ElementInfo> = Vec::new();

    for event in &events {
        if started.elapsed() > RESOLVE_TIMEOUT {
            log::warn!("cascade resolution timed out; discarding inlined output");
            return String::new();
        }

        match event {
            HtmlEvent::Verbatim { start, end } => out.push_str(&injected[*start..*end]),
            HtmlEvent::EndTag { name, start, end } => {
                pop_to_matching(&mut stack, name);
                out.push_str(&injected[*start..*end]);
            }
            HtmlEvent::StartTag(tag) => {
                stack.push(element_info(tag));
                out.push_str(&rewrite_start_tag(&injected, tag, &rules, &stack));
                if tag.self_closing || is_void_element(&tag.name) {
                    stack.pop();
                }
            }
        }

        if out.len() > MAX_RESOLVE_OUTPUT_CHARS {
            log::warn!("cascade output exceeds {MAX_RESOLVE_OUTPUT_CHARS} chars; discarding");
            return String::new();
        }
    }

    out
}

/// Injects `all_css_text` as one `<style>` block before `</head>`, else
/// prepends it to the document.
fn inject_style_block(html: &str, all_css_text: &str) -> String {
    let style_block = format!("<style>\n{all_css_text}\n</style>");
    let lowered = html.to_ascii_lowercase();

    match lowered.find("</head>") {
        Some(idx) => format!("{}{style_block}{}", &html[..idx], &html[idx..]),
        None => format!("{style_block}{html}"),
    }
}

fn collect_style_text(html: &str) -> String {
    let events = scan_events(html);
    let mut css = String::new();

    let mut idx = 0_usize;
    while idx < events.len() {
        if let HtmlEvent::StartTag(tag) = &events[idx] {
            if tag.name == "style" && !tag.self_closing {
                if let Some(HtmlEvent::Verbatim { start, end }) = events.get(idx.saturating_add(1))
                {
                    css.push_str(&html[*start..*end]);
                    css.push('\n');
                }
            }
        }
        idx = idx.saturating_add(1);
    }

    css
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Declaration {
    name: String,
    value: String,
    important: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CompiledSelector {
    chain: Vec<Compound>,
    specificity: u32,
    order: usize,
    declarations: Vec<Declaration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ElementInfo {
    tag: String,
    id: Option<String>,
    classes: Vec<String>,
}

fn compile_rules(css: &str) -> Vec<CompiledSelector> {
    let mut compiled = Vec::new();

    for (order, block) in split_blocks(css).iter().enumerate() {
        if block.kind != CssBlockKind::Rule {
            continue;
        }

        let Some(open) = top_level_open_brace(&block.text) else {
            continue;
        };
        let Some(close) = find_matching_brace(&block.text, open) else {
            continue;
        };

        let declarations = parse_declarations(&block.text[open.saturating_add(1)..close]);
        if declarations.is_empty() {
            continue;
        }

        for part in split_top_level(&block.text[..open], ',') {
            if let Some((chain, specificity)) = parse_selector(part) {
                compiled.push(CompiledSelector {
                    chain,
                    specificity,
                    order,
                    declarations: declarations.clone(),
                });
            }
        }
    }

    compiled
}

fn parse_declarations(inner: &str) -> Vec<Declaration> {
    let mut declarations = Vec::new();

    for part in split_top_level(inner, ';') {
        let trimmed = part.trim();
        if trimmed.is_empty() {
            continue;
        }

        let Some(colon_idx) = find_top_level_colon(trimmed) else {
            continue;
        };

        let name = trimmed[..colon_idx].trim().to_ascii_lowercase();
        let mut value = trimmed[colon_idx.saturating_add(1)..].trim().to_owned();
        if name.is_empty() || value.is_empty() {
            continue;
        }

        let mut important = false;
        let lowered = value.to_ascii_lowercase();
        if let Some(stripped_len) = lowered.strip_suffix("!important").map(str::len) {
            important = true;
            value.truncate(stripped_len);
            value = value.trim_end().trim_end_matches('!').trim_end().to_owned();
        }

        if value.is_empty() {
            continue;
        }

        declarations.push(Declaration {
            name,
            value,
            important,
        });
    }

    declarations
}

/// Parses a selector into a descendant-combinator compound chain.
///
/// Pseudo-classes/elements, attribute selectors, and child/sibling
/// combinators are not approximated: such selectors are skipped so
/// state-dependent styling never leaks into base inline styles.
fn parse_selector(part: &str) -> Option<(Vec<Compound>, u32)> {
    let trimmed = part.trim();
    if trimmed.is_empty() || trimmed.contains(['>', '+', '~', '[', ']', ':', '(', ')']) {
        return None;
    }

    let mut chain = Vec::new();
    let mut specificity = 0_u32;

    for token in trimmed.split_whitespace() {
        let compound = parse_compound(token)?;
        specificity = specificity.saturating_add(compound_specificity(&compound));
        chain.push(compound);
    }

    if chain.is_empty() {
        None
    } else {
        Some((chain, specificity))
    }
}

fn parse_compound(token: &str) -> Option<Compound> {
    let mut compound = Compound::default();
    let mut rest = token;

    if !rest.starts_with('.') && !rest.starts_with('#') {
        let end = rest.find(['.', '#']).unwrap_or(rest.len());
        let tag = &rest[..end];
        if tag != "*" {
            if !is_identifier(tag) {
                return None;
            }
            compound.tag = Some(tag.to_ascii_lowercase());
        }
        rest = &rest[end..];
    }

    while !rest.is_empty() {
        let marker = rest.chars().next()?;
        let after = &rest[1..];
        let end = after.find(['.', '#']).unwrap_or(after.len());
        let name = &after[..end];
        if name.is_empty() || !is_identifier(name) {
            return None;
        }

        match marker {
            '.' => compound.classes.push(name.to_owned()),
            '#' => compound.id = Some(name.to_owned()),
            _ => return None,
        }
        rest = &after[end..];
    }

    Some(compound)
}

fn compound_specificity(compound: &Compound) -> u32 {
    let ids = u32::from(compound.id.is_some()).saturating_mul(100);
    let classes = (compound.classes.len() as u32).saturating_mul(10);
    let tags = u32::from(compound.tag.is_some());
    ids.saturating_add(classes).saturating_add(tags)
}

fn is_identifier(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_'))
}

fn element_info(tag: &StartTagEvent) -> ElementInfo {
    let id = attribute(&tag.attributes, "id")
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty());
    let classes = attribute(&tag.attributes, "class")
        .map(|value| value.split_whitespace().map(str::to_owned).collect())
        .unwrap_or_default();

    ElementInfo {
        tag: tag.name.clone(),
        id,
        classes,
    }
}

fn compound_matches(compound: &Compound, element: &ElementInfo) -> bool {
    if let Some(tag) = &compound.tag {
        if *tag != element.tag {
            return false;
        }
    }

    if let Some(id) = &compound.id {
        if element.id.as_deref() != Some(id.as_str()) {
            return false;
        }
    }

    compound
        .classes
        .iter()
        .all(|class| element.classes.iter().any(|have| have == class))
}

/// Right-to-left descendant match of a compound chain against the open
/// element stack (the current element is the stack top).
fn chain_matches(chain: &[Compound], stack: &[ElementInfo]) -> bool {
    let Some((last_compound, ancestor_chain)) = chain.split_last() else {
        return false;
    };
    let Some((element, ancestor_stack)) = stack.split_last() else {
        return false;
    };

    if !compound_matches(last_compound, element) {
        return false;
    }

    let mut stack_idx = ancestor_stack.len();
    for compound in ancestor_chain.iter().rev() {
        let mut found = false;
        while stack_idx > 0 {
            stack_idx = stack_idx.saturating_sub(1);
            if compound_matches(compound, &ancestor_stack[stack_idx]) {
                found = true;
                break;
            }
        }

        if !found {
            return false;
        }
    }

    true
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Winner {
    value: String,
    important: bool,
    rank: (bool, u32, usize, usize),
}

fn winning_declarations(
    rules: &[CompiledSelector],
    stack: &[ElementInfo],
) -> BTreeMap<String, Winner> {
    let mut winners: BTreeMap<String, Winner> = BTreeMap::new();

    for rule in rules {
        if !chain_matches(&rule.chain, stack) {
            continue;
        }

        for (decl_idx, declaration) in rule.declarations.iter().enumerate() {
            let rank = (declaration.important, rule.specificity, rule.order, decl_idx);
            let replace = winners
                .get(&declaration.name)
                .is_none_or(|current| rank >= current.rank);

            if replace {
                winners.insert(
                    declaration.name.clone(),
                    Winner {
                        value: declaration.value.clone(),
                        important: declaration.important,
                        rank,
                    },
                );
            }
        }
    }

    winners
}

fn rewrite_start_tag(
    source: &str,
    tag: &StartTagEvent,
    rules: &[CompiledSelector],
    stack: &[ElementInfo],
) -> String {
    let winners = winning_declarations(rules, stack);
    if winners.is_empty() {
        return source[tag.start..tag.end].to_owned();
    }

    let existing = attribute(&tag.attributes, "style").map(str::to_owned);
    let Some(merged) = merged_style(existing.as_deref(), &winners) else {
        return source[tag.start..tag.end].to_owned();
    };

    let mut attributes: Vec<TagAttribute> = tag.attributes.clone();
    match attributes
        .iter_mut()
        .find(|attribute| attribute.name.eq_ignore_ascii_case("style"))
    {
        Some(style_attribute) => style_attribute.value = Some(merged),
        None => attributes.push(TagAttribute::new("style", merged)),
    }

    render_start_tag(&tag.name, &attributes, tag.self_closing)
}

/// Merges matched declarations into a pre-existing inline style. Inline
/// declarations win over non-important matches; important matches win over
/// inline.
fn merged_style(existing: Option<&str>, winners: &BTreeMap<String, Winner>) -> Option<String> {
    let mut order: Vec<String> = Vec::new();
    let mut values: BTreeMap<String, String> = BTreeMap::new();

    if let Some(existing) = existing {
        for part in split_top_level(existing, ';') {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                continue;
            }
            let Some(colon_idx) = find_top_level_colon(trimmed) else {
                continue;
            };
            let name = trimmed[..colon_idx].trim().to_ascii_lowercase();
            let value = trimmed[colon_idx.saturating_add(1)..].trim().to_owned();
            if name.is_empty() || value.is_empty() {
                continue;
            }
            if !values.contains_key(&name) {
                order.push(name.clone());
            }
            values.insert(name, value);
        }
    }

    for (name, winner) in winners {
        let inline_present = values.contains_key(name);
        if inline_present && !winner.important {
            continue;
        }
        if !inline_present {
            order.push(name.clone());
        }
        values.insert(name.clone(), winner.value.clone());
    }

    if order.is_empty() {
        return None;
    }

    let rendered = order
        .iter()
        .filter_map(|name| values.get(name).map(|value| format!("{name}: {value}")))
        .collect::<Vec<_>>()
        .join("; ");
    Some(rendered)
}

fn pop_to_matching(stack: &mut Vec<ElementInfo>, name: &str) {
    let position = stack
        .iter()
        .rposition(|element| element.tag.eq_ignore_ascii_case(name));
    if let Some(idx) = position {
        stack.truncate(idx);
    }
}
