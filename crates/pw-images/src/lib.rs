//! Image discovery and section-ownership registry.
//!
//! Images are found in scraped HTML and in per-section markdown, validated
//! before they are trusted, and merged into a single registry keyed by
//! normalized URL. Discovery merges; it never duplicates and never deletes.

use pulldown_cmark::Event;
use pulldown_cmark::Options;
use pulldown_cmark::Parser;
use pulldown_cmark::Tag;
use pulldown_cmark::TagEnd;
use pw_html::HtmlEvent;
use pw_html::attribute;
use pw_html::decode_attribute_value;
use pw_html::scan_events;
use pw_safety::SafetyPolicy;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use url::Url;

/// One named markdown fragment produced by upstream segmentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub id: String,
    pub markdown: String,
}

impl Section {
    pub fn new(id: impl Into<String>, markdown: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            markdown: markdown.into(),
        }
    }
}

/// A discovered page image. Identity is the validated URL.
#[derive(Debug, Clone, PartialEq)]
pub struct PageImage {
    pub url: String,
    pub alt: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub srcset: Option<String>,
    pub is_background: bool,
    /// Advisory heuristic only, never a filter.
    pub is_icon: bool,
    pub sections: Vec<String>,
}

/// Tuning knobs carried as configuration rather than magic numbers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegistryConfig {
    pub orphan_similarity_threshold: f64,
    pub icon_max_dimension: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            orphan_similarity_threshold: 0.5,
            icon_max_dimension: 80,
        }
    }
}

const LAZY_SRC_ATTRIBUTES: &[&str] = &["src", "data-src", "data-lazy-src", "data-original"];

const BLOCK_CONTAINERS: &[&str] = &[
    "div", "section", "header", "footer", "main", "aside", "article", "figure", "body",
];

const ICON_ALT_KEYWORDS: &[&str] = &["icon", "logo", "favicon", "badge", "arrow", "chevron"];

/// URL-keyed image map plus per-section ordered ownership. Built once per
/// run and immutable afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageRegistry {
    images: BTreeMap<String, PageImage>,
    section_urls: BTreeMap<String, Vec<String>>,
    discovery_order: Vec<String>,
}

impl ImageRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn image(&self, url: &str) -> Option<&PageImage> {
        self.images.get(url)
    }

    /// Images in first-discovery order.
    pub fn images(&self) -> impl Iterator<Item = &PageImage> {
        self.discovery_order
            .iter()
            .filter_map(|url| self.images.get(url))
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// The only read path used downstream: a section's owned images, in
    /// first-appearance order, and nothing else.
    pub fn section_images(&self, section_id: &str) -> Vec<&PageImage> {
        self.section_urls
            .get(section_id)
            .map(|urls| urls.iter().filter_map(|url| self.images.get(url)).collect())
            .unwrap_or_default()
    }

    fn record_ownership(&mut self, section_id: &str, url: &str) {
        if let Some(image) = self.images.get_mut(url) {
            if !image.sections.iter().any(|owned| owned == section_id) {
                image.sections.push(section_id.to_owned());
            }
        }

        let urls = self.section_urls.entry(section_id.to_owned()).or_default();
        if !urls.iter().any(|owned| owned == url) {
            urls.push(url.to_owned());
        }
    }
}

/// Builds the registry: HTML discovery, markdown discovery with merge
/// semantics, then orphan ownership inference.
pub fn build_registry(
    original_html: &str,
    sections: &[Section],
    page_url: Option<&str>,
    safety: &SafetyPolicy,
    config: &RegistryConfig,
) -> ImageRegistry {
    let base = page_url.and_then(|raw| Url::parse(raw).ok());
    let mut registry = ImageRegistry::default();

    discover_html_images(&mut registry, original_html, base.as_ref(), safety, config);
    discover_markdown_images(&mut registry, sections, base.as_ref(), safety, config);
    assign_orphans(&mut registry, sections, safety, config);

    registry
}

#[derive(Debug, Clone, Default)]
struct ImageCandidate {
    alt: String,
    width: Option<u32>,
    height: Option<u32>,
    srcset: Option<String>,
    is_background: bool,
}

fn discover_html_images(
    registry: &mut ImageRegistry,
    html: &str,
    base: Option<&Url>,
    safety: &SafetyPolicy,
    config: &RegistryConfig,
) {
    let mut picture_depth = 0_u32;

    for event in scan_events(html) {
        match event {
            HtmlEvent::StartTag(tag) if tag.name == "picture" => {
                picture_depth = picture_depth.saturating_add(1);
            }
            HtmlEvent::EndTag { ref name, .. } if name == "picture" => {
                picture_depth = picture_depth.saturating_sub(1);
            }
            HtmlEvent::StartTag(tag) if tag.name == "img" => {
                let Some(src) = LAZY_SRC_ATTRIBUTES
                    .iter()
                    .filter_map(|name| attribute(&tag.attributes, name))
                    .find(|value| !value.trim().is_empty())
                else {
                    continue;
                };

                let candidate = ImageCandidate {
                    alt: attribute(&tag.attributes, "alt")
                        .map(decode_attribute_value)
                        .unwrap_or_default(),
                    width: attribute(&tag.attributes, "width").and_then(parse_dimension),
                    height: attribute(&tag.attributes, "height").and_then(parse_dimension),
                    srcset: attribute(&tag.attributes, "srcset")
                        .map(decode_attribute_value)
                        .filter(|value| !value.trim().is_empty()),
                    is_background: false,
                };
                register_image(registry, src, base, safety, config, candidate);
            }
            HtmlEvent::StartTag(tag) if tag.name == "source" && picture_depth > 0 => {
                let Some(srcset) = attribute(&tag.attributes, "srcset") else {
                    continue;
                };
                let Some(first) = first_srcset_url(&decode_attribute_value(srcset)) else {
                    continue;
                };
                register_image(registry, &first, base, safety, config, ImageCandidate::default());
            }
            HtmlEvent::StartTag(tag)
                if BLOCK_CONTAINERS.iter().any(|block| *block == tag.name) =>
            {
                let Some(style) = attribute(&tag.attributes, "style") else {
                    continue;
                };
                let decoded = decode_attribute_value(style);
                if !decoded.to_ascii_lowercase().contains("background") {
                    continue;
                }
                let Some(css_url) = extract_css_url(&decoded) else {
                    continue;
                };

                let candidate = ImageCandidate {
                    is_background: true,
                    ..ImageCandidate::default()
                };
                register_image(registry, &css_url, base, safety, config, candidate);
            }
            _ => {}
        }
    }
}

fn discover_markdown_images(
    registry: &mut ImageRegistry,
    sections: &[Section],
    base: Option<&Url>,
    safety: &SafetyPolicy,
    config: &RegistryConfig,
) {
    for section in sections {
        for (url, alt) in markdown_images(&section.markdown) {
            let candidate = ImageCandidate {
                alt,
                ..ImageCandidate::default()
            };

            let Some(normalized) = register_image(registry, &url, base, safety, config, candidate)
            else {
                continue;
            };
            registry.record_ownership(&section.id, &normalized);
        }
    }
}

/// Validates and merges a discovered image; returns the normalized URL on
/// success. Invalid or unsafe references are dropped here and never
/// propagate further.
fn register_image(
    registry: &mut ImageRegistry,
    raw_url: &str,
    base: Option<&Url>,
    safety: &SafetyPolicy,
    config: &RegistryConfig,
    candidate: ImageCandidate,
) -> Option<String> {
    let resolved = resolve_reference(raw_url, base)?;
    let verdict = safety.validate_url(&resolved);
    if !verdict.is_safe {
        log::debug!(
            "dropping image url `{raw_url}`: {}",
            verdict.reason.unwrap_or("unsafe")
        );
        return None;
    }

    let normalized = verdict.normalized?;
    match registry.images.get_mut(&normalized) {
        Some(existing) => {
            if existing.alt.is_empty() && !candidate.alt.is_empty() {
                existing.alt = candidate.alt;
            }
            if existing.width.is_none() {
                existing.width = candidate.width;
            }
            if existing.height.is_none() {
                existing.height = candidate.height;
            }
            if existing.srcset.is_none() {
                existing.srcset = candidate.srcset;
            }
            existing.is_background |= candidate.is_background;
            existing.is_icon = looks_like_icon(existing, config);
        }
        None => {
            let mut image = PageImage {
                url: normalized.clone(),
                alt: candidate.alt,
                width: candidate.width,
                height: candidate.height,
                srcset: candidate.srcset,
                is_background: candidate.is_background,
                is_icon: false,
                sections: Vec::new(),
            };
            image.is_icon = looks_like_icon(&image, config);
            registry.images.insert(normalized.clone(), image);
            registry.discovery_order.push(normalized.clone());
        }
    }

    Some(normalized)
}

/// Assigns HTML-discovered images that no section referenced, using
/// word-level Jaccard similarity between alt text and section headings.
/// Ambiguity leaves the image unassigned: precision over recall.
fn assign_orphans(
    registry: &mut ImageRegistry,
    sections: &[Section],
    safety: &SafetyPolicy,
    config: &RegistryConfig,
) {
    let headings: Vec<(String, BTreeSet<String>)> = sections
        .iter()
        .map(|section| (section.id.clone(), heading_words(&section.markdown)))
        .collect();
    if headings.is_empty() {
        return;
    }

    let orphan_urls: Vec<String> = registry
        .discovery_order
        .iter()
        .filter(|url| {
            registry
                .images
                .get(*url)
                .is_some_and(|image| image.sections.is_empty())
        })
        .cloned()
        .collect();

    for url in orphan_urls {
        let alt_words = match registry.images.get(&url) {
            Some(image) => word_set(&image.alt),
            None => continue,
        };
        if alt_words.is_empty() {
            continue;
        }

        let mut best_score = 0.0_f64;
        let mut best_section: Option<&str> = None;
        let mut ambiguous = false;

        for (section_id, words) in &headings {
            let score = jaccard(&alt_words, words);
            if score > best_score {
                best_score = score;
                best_section = Some(section_id.as_str());
                ambiguous = false;
            } else if score == best_score && best_section.is_some() {
                ambiguous = true;
            }
        }

        if best_score < config.orphan_similarity_threshold || ambiguous {
            log::debug!("leaving orphan image `{url}` unassigned");
            continue;
        }

        // Defense-in-depth: the URL is re-validated before it gains an owner.
        if !safety.validate_url(&url).is_safe {
            continue;
        }

        if let Some(section_id) = best_section {
            let section_id = section_id.to_owned();
            registry.record_ownership(&section_id, &url);
        }
    }
}

fn markdown_images(markdown: &str) -> Vec<(String, String)> {
    let parser = Parser::new_ext(markdown, Options::empty());
    let mut images = Vec::new();
    let mut current: Option<(String, String)> = None;

    for event in parser {
        match event {
            Event::Start(Tag::Image { dest_url, .. }) => {
                current = Some((dest_url.to_string(), String::new()));
            }
            Event::Text(text) => {
                if let Some((_, alt)) = current.as_mut() {
                    alt.push_str(&text);
                }
            }
            Event::End(TagEnd::Image) => {
                if let Some(done) = current.take() {
                    images.push(done);
                }
            }
            _ => {}
        }
    }

    images
}

fn resolve_reference(raw: &str, base: Option<&Url>) -> Option<String> {
    let trimmed = decode_attribute_value(raw.trim());
    if trimmed.is_empty() {
        return None;
    }

    if trimmed
        .get(.."data:".len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("data:"))
    {
        return Some(trimmed);
    }

    if Url::parse(&trimmed).is_ok() {
        return Some(trimmed);
    }

    match base {
        Some(base) => base.join(&trimmed).ok().map(String::from),
        // Without a page URL, relative references cannot be resolved.
        None => Some(trimmed),
    }
}

fn first_srcset_url(srcset: &str) -> Option<String> {
    srcset
        .split(',')
        .next()
        .and_then(|entry| entry.split_whitespace().next())
        .map(str::to_owned)
        .filter(|url| !url.is_empty())
}

fn extract_css_url(style: &str) -> Option<String> {
    let lowered = style.to_ascii_lowercase();
    let start = lowered.find("url(")?;
    let after = &style[start.saturating_add(4)..];
    let end = after.find(')')?;
    let inner = after[..end]
        .trim()
        .trim_matches(|ch| ch == '"' || ch == '\'')
        .trim();

    if inner.is_empty() {
        None
    } else {
        Some(inner.to_owned())
    }
}

fn looks_like_icon(image: &PageImage, config: &RegistryConfig) -> bool {
    let longer_dimension = image.width.max(image.height);
    if let Some(longest) = longer_dimension {
        if longest <= config.icon_max_dimension {
            return true;
        }
    }

    let alt = image.alt.to_ascii_lowercase();
    ICON_ALT_KEYWORDS.iter().any(|keyword| alt.contains(keyword))
}

fn parse_dimension(value: &str) -> Option<u32> {
    value.trim().trim_end_matches("px").trim().parse::<u32>().ok()
}

/// Words of ATX-style heading lines (`# ...` through `###### ...`).
fn heading_words(markdown: &str) -> BTreeSet<String> {
    let mut words = BTreeSet::new();

    for line in markdown.lines() {
        let trimmed = line.trim_start();
        let hashes = trimmed.chars().take_while(|ch| *ch == '#').count();
        if hashes == 0 || hashes > 6 {
            continue;
        }

        let rest = &trimmed[hashes..];
        if !rest.is_empty() && !rest.starts_with(' ') {
            continue;
        }

        words.extend(word_set(rest));
    }

    words
}

fn word_set(text: &str) -> BTreeSet<String> {
    text.split_whitespace()
        .map(|word| {
            word.trim_matches(|ch: char| !ch.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|word| !word.is_empty())
        .collect()
}

fn jaccard(left: &BTreeSet<String>, right: &BTreeSet<String>) -> f64 {
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let intersection = left.intersection(right).count();
    let union = left.union(right).count();
    if union == 0 {
        return 0.0;
    }

    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::RegistryConfig;
    use super::Section;
    use super::build_registry;
    use pw_safety::SafetyPolicy;

    fn build(html: &str, sections: &[Section], page_url: Option<&str>) -> super::ImageRegistry {
        build_registry(
            html,
            sections,
            page_url,
            &SafetyPolicy::default(),
            &RegistryConfig::default(),
        )
    }

    #[test]
    fn discovers_img_tags_with_lazy_load_fallback() {
        let html = r#"<img data-src="https://example.com/a.jpg" alt="Hero shot" width="640" height="480">"#;
        let registry = build(html, &[], None);
        let image = registry.image("https://example.com/a.jpg");
        assert!(image.is_some());
        if let Some(image) = image {
            assert_eq!(image.alt, "Hero shot");
            assert_eq!(image.width, Some(640));
            assert_eq!(image.height, Some(480));
            assert!(!image.is_background);
            assert!(!image.is_icon);
        }
    }

    #[test]
    fn picture_source_contributes_its_first_srcset_url() {
        let html = r#"<picture><source srcset="https://example.com/b-2x.jpg 2x, https://example.com/b-3x.jpg 3x"><img src="https://example.com/b.jpg"></picture>"#;
        let registry = build(html, &[], None);
        assert!(registry.image("https://example.com/b-2x.jpg").is_some());
        assert!(registry.image("https://example.com/b-3x.jpg").is_none());
        assert!(registry.image("https://example.com/b.jpg").is_some());
    }

    #[test]
    fn inline_background_urls_on_block_containers_are_background_images() {
        let html = r#"<div style="background-image: url('https://example.com/bg.jpg'); color: red"></div>"#;
        let registry = build(html, &[], None);
        let image = registry.image("https://example.com/bg.jpg");
        assert!(image.is_some());
        if let Some(image) = image {
            assert!(image.is_background);
        }
    }

    #[test]
    fn icon_heuristic_uses_dimensions_and_alt_keywords() {
        let html = r#"<img src="https://example.com/small.png" width="64" height="48">
                      <img src="https://example.com/brand.png" alt="Company logo" width="400" height="300">
                      <img src="https://example.com/large.jpg" alt="Beach" width="1200" height="800">"#;
        let registry = build(html, &[], None);
        assert!(registry.image("https://example.com/small.png").is_some_and(|i| i.is_icon));
        assert!(registry.image("https://example.com/brand.png").is_some_and(|i| i.is_icon));
        assert!(registry.image("https://example.com/large.jpg").is_some_and(|i| !i.is_icon));
    }

    #[test]
    fn relative_urls_resolve_against_the_page_url() {
        let html = r#"<img src="/img/c.jpg">"#;
        let registry = build(html, &[], Some("https://example.com/post/1"));
        assert!(registry.image("https://example.com/img/c.jpg").is_some());

        let without_base = build(html, &[], None);
        assert!(without_base.is_empty());
    }

    #[test]
    fn unsafe_urls_are_dropped_silently() {
        let html = r#"<img src="https://127.0.0.1/x.png"><img src="http://example.com/y.png">"#;
        let registry = build(html, &[], None);
        assert!(registry.is_empty());
    }

    #[test]
    fn markdown_discovery_merges_into_html_entries() {
        let html = r#"<img src="https://example.com/hero.jpg" width="640">"#;
        let sections = vec![Section::new(
            "sec_0",
            "# Welcome\n![A tall ship](https://example.com/hero.jpg)",
        )];
        let registry = build(html, &sections, None);

        assert_eq!(registry.len(), 1);
        let image = registry.image("https://example.com/hero.jpg");
        assert!(image.is_some());
        if let Some(image) = image {
            assert_eq!(image.alt, "A tall ship");
            assert_eq!(image.width, Some(640));
            assert_eq!(image.sections, vec!["sec_0".to_owned()]);
        }

        let owned = registry.section_images("sec_0");
        assert_eq!(owned.len(), 1);
    }

    #[test]
    fn section_lists_preserve_first_appearance_order_without_duplicates() {
        let sections = vec![Section::new(
            "sec_0",
            "![one](https://example.com/1.png)\n![two](https://example.com/2.png)\n![again](https://example.com/1.png)",
        )];
        let registry = build("", &sections, None);
        let urls: Vec<&str> = registry
            .section_images("sec_0")
            .iter()
            .map(|image| image.url.as_str())
            .collect();
        assert_eq!(urls, vec!["https://example.com/1.png", "https://example.com/2.png"]);
    }

    #[test]
    fn orphan_with_matching_alt_is_assigned_to_the_best_section() {
        let html = r#"<img src="https://example.com/orphan.jpg" alt="Hello World">"#;
        let sections = vec![
            Section::new("sec_0", "# Hello\n![a](https://x.com/hero.jpg)"),
            Section::new("sec_1", ""),
        ];
        let registry = build(html, &sections, None);
        let owned = registry.section_images("sec_0");
        assert!(owned.iter().any(|image| image.url == "https://example.com/orphan.jpg"));
    }

    #[test]
    fn orphan_with_unrelated_alt_stays_unassigned() {
        let html = r#"<img src="https://example.com/orphan.jpg" alt="Unrelated Text">"#;
        let sections = vec![
            Section::new("sec_0", "# Hello\n![a](https://x.com/hero.jpg)"),
            Section::new("sec_1", ""),
        ];
        let registry = build(html, &sections, None);
        assert!(registry.section_images("sec_0").iter().all(|image| image.url != "https://example.com/orphan.jpg"));
        assert!(registry.section_images("sec_1").is_empty());
        assert!(registry.image("https://example.com/orphan.jpg").is_some());
    }

    #[test]
    fn tied_orphan_scores_are_ambiguous_and_left_unassigned() {
        let html = r#"<img src="https://example.com/orphan.jpg" alt="Pricing">"#;
        let sections = vec![
            Section::new("sec_0", "# Pricing"),
            Section::new("sec_1", "# Pricing"),
        ];
        let registry = build(html, &sections, None);
        assert!(registry.section_images("sec_0").is_empty());
        assert!(registry.section_images("sec_1").is_empty());
    }

    #[test]
    fn every_section_url_exists_in_the_image_map() {
        let sections = vec![
            Section::new("sec_0", "![a](https://example.com/a.png)"),
            Section::new("sec_1", "![b](https://example.com/b.png)"),
        ];
        let registry = build("", &sections, None);
        for section_id in ["sec_0", "sec_1"] {
            for image in registry.section_images(section_id) {
                assert!(registry.image(&image.url).is_some());
            }
        }
    }
}
