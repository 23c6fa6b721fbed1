//! Fills skeleton placeholders with section HTML, injects images, and tags
//! semantic slots.
//!
//! The tag rewriting below is regex-based. That is valid only because the
//! HTML it touches is this pipeline's own markdown output, a constrained
//! subset; swap in a tree rewrite if arbitrary third-party HTML ever lands
//! here.

pub mod render;

use once_cell::sync::Lazy;
use pulldown_cmark::Event;
use pulldown_cmark::Options;
use pulldown_cmark::Parser;
use pw_html::decode_attribute_value;
use pw_html::escape_attribute_value;
use pw_images::ImageRegistry;
use pw_images::PageImage;
use pw_images::Section;
use regex::Captures;
use regex::Regex;

pub use render::render_background_images;

/// Running slot counters, threaded explicitly through each section so the
/// assembler stays pure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotCounters {
    seen_h1: bool,
    seen_h2: bool,
    headings: u32,
    bodies: u32,
    ctas: u32,
}

static IMG_TAG_REGEX: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"<img\b[^>]*>"));

static SRC_ATTR_REGEX: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r#"src\s*=\s*"([^"]*)""#));

static SLOT_TAG_REGEX: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"<(h[1-4]|p|a|button)\b([^>]*)>"));

/// Converts markdown with raw HTML passthrough disabled: block and inline
/// HTML events are remapped to text so markup cannot escape into the page.
pub fn markdown_to_html(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, Options::empty());
    let events = parser.map(|event| match event {
        Event::Html(html) => Event::Text(html),
        Event::InlineHtml(html) => Event::Text(html),
        other => other,
    });

    let mut out = String::new();
    pulldown_cmark::html::push_html(&mut out, events);
    out
}

/// Fills `{{section-id}}` placeholders in caller order.
///
/// With a registry: image enhancement, background injection, and
/// document-wide slot tagging run per section, and each placeholder is
/// substituted once. Without one (degraded fallback): markdown conversion
/// plus replace-all substitution only.
pub fn assemble(
    skeleton_html: &str,
    sections: &[Section],
    registry: Option<&ImageRegistry>,
) -> String {
    let Some(registry) = registry else {
        return assemble_degraded(skeleton_html, sections);
    };

    let mut out = skeleton_html.to_owned();
    let mut counters = SlotCounters::default();

    for section in sections {
        let placeholder = placeholder_token(&section.id);
        if !out.contains(&placeholder) {
            log::debug!("placeholder for section `{}` absent; skipping", section.id);
            continue;
        }

        let owned = registry.section_images(&section.id);
        let mut fragment = markdown_to_html(&section.markdown);
        fragment = enhance_images(&fragment, &owned);
        fragment = prepend_background_images(&fragment, &owned);

        let (tagged, next) = tag_slots(&fragment, counters);
        counters = next;

        out = out.replacen(&placeholder, &tagged, 1);
    }

    out
}

fn assemble_degraded(skeleton_html: &str, sections: &[Section]) -> String {
    let mut out = skeleton_html.to_owned();

    for section in sections {
        let fragment = markdown_to_html(&section.markdown);
        out = out.replace(&placeholder_token(&section.id), &fragment);
    }

    out
}

fn placeholder_token(section_id: &str) -> String {
    format!("{{{{{section_id}}}}}")
}

/// Adds missing `width`/`height`/`srcset` to `<img>` tags whose src matches
/// a section-owned image. Non-matching tags are untouched.
fn enhance_images(fragment: &str, owned: &[&PageImage]) -> String {
    if owned.is_empty() {
        return fragment.to_owned();
    }

    let (Ok(img_regex), Ok(src_regex)) = (IMG_TAG_REGEX.as_ref(), SRC_ATTR_REGEX.as_ref()) else {
        return fragment.to_owned();
    };

    img_regex
        .replace_all(fragment, |captures: &Captures<'_>| {
            let tag = &captures[0];
            let Some(src) = src_regex
                .captures(tag)
                .and_then(|src_captures| src_captures.get(1))
            else {
                return tag.to_owned();
            };

            let src = decode_attribute_value(src.as_str());
            let Some(image) = owned.iter().find(|image| image.url == src) else {
                return tag.to_owned();
            };

            let mut additions = String::new();
            if let Some(width) = image.width {
                if !tag.contains("width=") {
                    additions.push_str(&format!(" width=\"{width}\""));
                }
            }
            if let Some(height) = image.height {
                if !tag.contains("height=") {
                    additions.push_str(&format!(" height=\"{height}\""));
                }
            }
            if let Some(srcset) = &image.srcset {
                if !tag.contains("srcset=") {
                    additions.push_str(&format!(
                        " srcset=\"{}\"",
                        escape_attribute_value(srcset)
                    ));
                }
            }

            if additions.is_empty() {
                return tag.to_owned();
            }

            match tag.strip_suffix("/>") {
                Some(head) => format!("{}{additions} />", head.trim_end()),
                None => match tag.strip_suffix('>') {
                    Some(head) => format!("{head}{additions}>"),
                    None => tag.to_owned(),
                },
            }
        })
        .into_owned()
}

/// Prepends a marker `<img data-bg-image="true">` for every owned
/// background image, in registry order. Markers are the storage form; the
/// render adapter turns them into live CSS at display time.
fn prepend_background_images(fragment: &str, owned: &[&PageImage]) -> String {
    let mut prefix = String::new();

    for image in owned.iter().filter(|image| image.is_background) {
        prefix.push_str("<img data-bg-image=\"true\" src=\"");
        prefix.push_str(&escape_attribute_value(&image.url));
        prefix.push_str("\" alt=\"Background image\" style=\"width: 100%; height: auto\"");
        if let Some(width) = image.width {
            prefix.push_str(&format!(" width=\"{width}\""));
        }
        if let Some(height) = image.height {
            prefix.push_str(&format!(" height=\"{height}\""));
        }
        prefix.push_str(">\n");
    }

    if prefix.is_empty() {
        fragment.to_owned()
    } else {
        format!("{prefix}{fragment}")
    }
}

/// Tags semantic slots document-wide.
///
/// The first `<h1>` anywhere is `headline` and the first `<h2>` anywhere is
/// `subheadline` — a product convention, not a technical necessity. Every
/// subsequent h1–h4 shares one `heading-{n}` counter; `<p>` is `body-{n}`;
/// `<a>`/`<button>` is `cta-{n}`. Elements already carrying a slot are left
/// untouched, so re-running is a no-op.
pub fn tag_slots(fragment: &str, counters: SlotCounters) -> (String, SlotCounters) {
    let Ok(regex) = SLOT_TAG_REGEX.as_ref() else {
        return (fragment.to_owned(), counters);
    };

    let mut counters = counters;
    let tagged = regex
        .replace_all(fragment, |captures: &Captures<'_>| {
            let tag_name = &captures[1];
            let attrs = &captures[2];
            if attrs.contains("data-slot") {
                return captures[0].to_owned();
            }

            let slot = match tag_name {
                "h1" if !counters.seen_h1 => {
                    counters.seen_h1 = true;
                    "headline".to_owned()
                }
                "h2" if !counters.seen_h2 => {
                    counters.seen_h2 = true;
                    "subheadline".to_owned()
                }
                "h1" | "h2" | "h3" | "h4" => {
                    counters.headings = counters.headings.saturating_add(1);
                    format!("heading-{}", counters.headings)
                }
                "p" => {
                    counters.bodies = counters.bodies.saturating_add(1);
                    format!("body-{}", counters.bodies)
                }
                "a" | "button" => {
                    counters.ctas = counters.ctas.saturating_add(1);
                    format!("cta-{}", counters.ctas)
                }
                _ => return captures[0].to_owned(),
            };

            format!("<{tag_name}{attrs} data-slot=\"{slot}\">")
        })
        .into_owned();

    (tagged, counters)
}
