//! CSS decomposition, cascade inlining, scoping, and design-token
//! extraction for mockup reconstruction.

pub mod cascade;
pub mod scope;
pub mod split;
pub mod tokens;

pub use cascade::MAX_RESOLVE_INPUT_CHARS;
pub use cascade::MAX_RESOLVE_OUTPUT_CHARS;
pub use cascade::resolve_cascade;
pub use scope::ANIMATION_SCOPE_PREFIX;
pub use scope::scope_css;
pub use split::CssBlock;
pub use split::CssBlockKind;
pub use split::split_blocks;
pub use tokens::DEFAULT_MAX_TOKEN_ENTRIES;
pub use tokens::DesignTokens;
pub use tokens::TokenLimits;
pub use tokens::extract_tokens;

use split::find_matching_brace;
use split::parse_declaration_pairs;
use split::top_level_open_brace;
use std::collections::BTreeMap;

/// Default cap on the responsive CSS bundle.
pub const DEFAULT_MAX_RESPONSIVE_CHARS: usize = 50_000;

/// Size ceilings applied while assembling [`ExtractedCss`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CssBudget {
    pub max_inlined_html_chars: usize,
    pub max_responsive_chars: usize,
}

impl Default for CssBudget {
    fn default() -> Self {
        Self {
            max_inlined_html_chars: MAX_RESOLVE_OUTPUT_CHARS,
            max_responsive_chars: DEFAULT_MAX_RESPONSIVE_CHARS,
        }
    }
}

/// Everything the CSS side of reconstruction produces for one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedCss {
    pub custom_properties: String,
    pub media_queries: String,
    pub font_faces: String,
    pub layout_rules: String,
    pub buttons: BTreeMap<String, String>,
    pub cards: BTreeMap<String, String>,
    pub headings: BTreeMap<String, String>,
    pub containers: BTreeMap<String, String>,
    pub tokens: DesignTokens,
    pub inlined_html: String,
}

/// Compact responsive bundle kept alongside the mockup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponsiveCss {
    pub custom_properties: String,
    pub media_queries: String,
    pub font_faces: String,
}

impl ResponsiveCss {
    /// Assembles the bundle, truncating in priority order when over the
    /// cap: font-faces first, then media queries, then custom properties.
    pub fn from_parts(
        custom_properties: String,
        media_queries: String,
        font_faces: String,
        max_chars: usize,
    ) -> Self {
        let mut bundle = Self {
            custom_properties,
            media_queries,
            font_faces,
        };

        if bundle.total_len() > max_chars {
            log::debug!("responsive css over budget; dropping font-faces");
            bundle.font_faces.clear();
        }
        if bundle.total_len() > max_chars {
            log::debug!("responsive css over budget; dropping media queries");
            bundle.media_queries.clear();
        }
        if bundle.total_len() > max_chars {
            log::debug!("responsive css over budget; truncating custom properties");
            truncate_on_char_boundary(&mut bundle.custom_properties, max_chars);
        }

        bundle
    }

    pub fn total_len(&self) -> usize {
        self.custom_properties
            .len()
            .saturating_add(self.media_queries.len())
            .saturating_add(self.font_faces.len())
    }
}

const BUTTON_KEYWORDS: &[&str] = &["button", "btn"];
const CARD_KEYWORDS: &[&str] = &["card"];
const HEADING_KEYWORDS: &[&str] = &["heading", "title"];
const HEADING_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];
const CONTAINER_KEYWORDS: &[&str] = &["container", "wrapper", "section"];

const LAYOUT_PROPERTIES: &[&str] = &[
    "display",
    "position",
    "float",
    "gap",
    "width",
    "max-width",
    "min-width",
    "columns",
];

/// Decomposes `all_css_text`, resolves the cascade over `html`, and
/// extracts design tokens from the inlined result.
pub fn extract_css(
    html: &str,
    all_css_text: &str,
    limits: &TokenLimits,
    budget: &CssBudget,
) -> ExtractedCss {
    let mut extracted = ExtractedCss::default();
    let mut custom_properties = Vec::new();
    let mut media_queries = Vec::new();
    let mut font_faces = Vec::new();
    let mut layout_rules = Vec::new();

    for block in &split_blocks(all_css_text) {
        match block.kind {
            CssBlockKind::Root => custom_properties.push(block.text.clone()),
            CssBlockKind::Media => media_queries.push(block.text.clone()),
            CssBlockKind::FontFace => font_faces.push(block.text.clone()),
            CssBlockKind::Keyframes | CssBlockKind::Supports => {}
            CssBlockKind::Rule => {
                classify_rule_block(&block.text, &mut extracted, &mut layout_rules);
            }
        }
    }

    extracted.custom_properties = custom_properties.join("\n\n");
    extracted.media_queries = media_queries.join("\n\n");
    extracted.font_faces = font_faces.join("\n\n");
    extracted.layout_rules = layout_rules.join("\n\n");

    extracted.inlined_html = resolve_cascade(html, all_css_text);
    if extracted.inlined_html.len() > budget.max_inlined_html_chars {
        log::warn!(
            "inlined html exceeds {} chars; dropping it entirely",
            budget.max_inlined_html_chars
        );
        extracted.inlined_html.clear();
    }

    extracted.tokens = extract_tokens(&extracted.inlined_html, limits);
    extracted
}

/// Builds the responsive bundle from an extraction under the given budget.
pub fn responsive_css(extracted: &ExtractedCss, budget: &CssBudget) -> ResponsiveCss {
    ResponsiveCss::from_parts(
        extracted.custom_properties.clone(),
        extracted.media_queries.clone(),
        extracted.font_faces.clone(),
        budget.max_responsive_chars,
    )
}

fn classify_rule_block(text: &str, extracted: &mut ExtractedCss, layout_rules: &mut Vec<String>) {
    let Some(open) = top_level_open_brace(text) else {
        return;
    };
    let Some(close) = find_matching_brace(text, open) else {
        return;
    };

    let selector = text[..open].to_ascii_lowercase();
    let pairs = parse_declaration_pairs(&text[open.saturating_add(1)..close]);
    if pairs.is_empty() {
        return;
    }

    if pairs.iter().any(|(name, _)| is_layout_property(name)) {
        layout_rules.push(text.to_owned());
    }

    if contains_keyword(&selector, BUTTON_KEYWORDS) {
        merge_pairs(&mut extracted.buttons, &pairs);
    }
    if contains_keyword(&selector, CARD_KEYWORDS) {
        merge_pairs(&mut extracted.cards, &pairs);
    }
    if contains_keyword(&selector, HEADING_KEYWORDS) || has_tag_token(&selector, HEADING_TAGS) {
        merge_pairs(&mut extracted.headings, &pairs);
    }
    if contains_keyword(&selector, CONTAINER_KEYWORDS) {
        merge_pairs(&mut extracted.containers, &pairs);
    }
}

fn merge_pairs(map: &mut BTreeMap<String, String>, pairs: &[(String, String)]) {
    for (name, value) in pairs {
        map.insert(name.clone(), value.clone());
    }
}

fn is_layout_property(name: &str) -> bool {
    LAYOUT_PROPERTIES.contains(&name) || name.starts_with("grid-") || name.starts_with("flex-")
}

fn contains_keyword(selector: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| selector.contains(keyword))
}

fn has_tag_token(selector: &str, tags: &[&str]) -> bool {
    selector
        .split(|ch: char| !ch.is_ascii_alphanumeric())
        .any(|token| tags.contains(&token))
}

fn truncate_on_char_boundary(text: &mut String, mut new_len: usize) {
    if new_len >= text.len() {
        return;
    }
    while new_len > 0 && !text.is_char_boundary(new_len) {
        new_len = new_len.saturating_sub(1);
    }
    text.truncate(new_len);
}

#[cfg(test)]
mod tests {
    use super::CssBudget;
    use super::ResponsiveCss;
    use super::TokenLimits;
    use super::extract_css;
    use super::responsive_css;

    const SAMPLE_CSS: &str = "\
        :root { --brand: #112233; }\n\
        @media (max-width: 600px) { .hero { padding: 8px; } }\n\
        @font-face { font-family: Inter; src: url(inter.woff2); }\n\
        .btn-primary { background: #112233; border-radius: 4px; }\n\
        .btn-primary { color: #ffffff; }\n\
        .card { display: flex; padding: 16px; }\n\
        h1 { font-size: 32px; }\n\
        .container { max-width: 960px; }";

    #[test]
    fn blocks_are_routed_by_kind() {
        let extracted = extract_css(
            "<body><p>x</p></body>",
            SAMPLE_CSS,
            &TokenLimits::default(),
            &CssBudget::default(),
        );

        assert!(extracted.custom_properties.contains("--brand"));
        assert!(extracted.media_queries.contains("max-width: 600px"));
        assert!(extracted.font_faces.contains("@font-face"));
        assert!(extracted.layout_rules.contains(".card"));
        assert!(extracted.layout_rules.contains(".container"));
    }

    #[test]
    fn component_maps_are_last_write_wins() {
        let extracted = extract_css(
            "",
            SAMPLE_CSS,
            &TokenLimits::default(),
            &CssBudget::default(),
        );

        assert_eq!(extracted.buttons.get("color").map(String::as_str), Some("#ffffff"));
        assert_eq!(
            extracted.buttons.get("background").map(String::as_str),
            Some("#112233")
        );
        assert_eq!(extracted.cards.get("display").map(String::as_str), Some("flex"));
        assert_eq!(
            extracted.headings.get("font-size").map(String::as_str),
            Some("32px")
        );
        assert_eq!(
            extracted.containers.get("max-width").map(String::as_str),
            Some("960px")
        );
    }

    #[test]
    fn tokens_come_from_the_inlined_html() {
        let extracted = extract_css(
            "<body><h1>t</h1></body>",
            "h1 { font-size: 32px; color: #abc; }",
            &TokenLimits::default(),
            &CssBudget::default(),
        );

        assert!(extracted.inlined_html.contains("style="));
        assert_eq!(extracted.tokens.font_sizes.get("32px").copied(), Some(1));
        assert_eq!(extracted.tokens.colors.get("#aabbcc").copied(), Some(1));
    }

    #[test]
    fn oversized_inlined_html_is_dropped_entirely() {
        let budget = CssBudget {
            max_inlined_html_chars: 10,
            ..CssBudget::default()
        };
        let extracted = extract_css(
            "<body><p>hello world</p></body>",
            "p { color: red; }",
            &TokenLimits::default(),
            &budget,
        );
        assert!(extracted.inlined_html.is_empty());
    }

    #[test]
    fn responsive_bundle_truncates_in_priority_order() {
        let bundle = ResponsiveCss::from_parts(
            "c".repeat(30),
            "m".repeat(30),
            "f".repeat(30),
            70,
        );
        assert!(bundle.font_faces.is_empty());
        assert_eq!(bundle.media_queries.len(), 30);
        assert_eq!(bundle.custom_properties.len(), 30);

        let tighter = ResponsiveCss::from_parts("c".repeat(30), "m".repeat(30), "f".repeat(30), 40);
        assert!(tighter.font_faces.is_empty());
        assert!(tighter.media_queries.is_empty());
        assert_eq!(tighter.custom_properties.len(), 30);

        let tightest =
            ResponsiveCss::from_parts("c".repeat(30), "m".repeat(30), "f".repeat(30), 10);
        assert_eq!(tightest.custom_properties.len(), 10);
    }

    #[test]
    fn responsive_bundle_is_built_from_an_extraction() {
        let extracted = extract_css(
            "",
            SAMPLE_CSS,
            &TokenLimits::default(),
            &CssBudget::default(),
        );
        let bundle = responsive_css(&extracted, &CssBudget::default());
        assert!(bundle.custom_properties.contains("--brand"));
        assert!(bundle.media_queries.contains("@media"));
        assert!(bundle.font_faces.contains("@font-face"));
    }
}
