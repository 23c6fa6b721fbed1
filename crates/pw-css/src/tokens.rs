//! Frequency-ranked design tokens extracted from cascade-inlined HTML.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::collections::HashMap;

/// Default cap on entries kept per token map.
pub const DEFAULT_MAX_TOKEN_ENTRIES: usize = 50;

/// Caps applied when truncating token maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLimits {
    pub max_entries_per_map: usize,
}

impl Default for TokenLimits {
    fn default() -> Self {
        Self {
            max_entries_per_map: DEFAULT_MAX_TOKEN_ENTRIES,
        }
    }
}

/// Five independent value→frequency maps summarizing a page's visual
/// language. Colors are normalized to lowercase 6-digit hex.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesignTokens {
    pub colors: BTreeMap<String, u32>,
    pub font_families: BTreeMap<String, u32>,
    pub font_sizes: BTreeMap<String, u32>,
    pub border_radii: BTreeMap<String, u32>,
    pub spacing: BTreeMap<String, u32>,
}

static STYLE_ATTR_REGEX: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r#"style\s*=\s*("([^"]*)"|'([^']*)')"#));

static HEX_COLOR_REGEX: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"#([0-9a-fA-F]{6}|[0-9a-fA-F]{3})\b"));

static RGB_COLOR_REGEX: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| {
    Regex::new(r"rgba?\(\s*(\d{1,3})\s*,\s*(\d{1,3})\s*,\s*(\d{1,3})\s*(?:,\s*[0-9.]+\s*)?\)")
});

static FONT_FAMILY_REGEX: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"(?i)font-family\s*:\s*([^;]+)"));

static FONT_SIZE_REGEX: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"(?i)font-size\s*:\s*([^;]+)"));

static BORDER_RADIUS_REGEX: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"(?i)border-radius\s*:\s*([^;]+)"));

static SPACING_REGEX: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|[;\s])(?:padding|margin)(?:-(?:top|right|bottom|left))?\s*:\s*([^;]+)")
});

/// Scans every inline `style=""` in `inlined_html` with independent pattern
/// passes and returns the top-N values per map.
pub fn extract_tokens(inlined_html: &str, limits: &TokenLimits) -> DesignTokens {
    let mut colors: HashMap<String, u32> = HashMap::new();
    let mut font_families: HashMap<String, u32> = HashMap::new();
    let mut font_sizes: HashMap<String, u32> = HashMap::new();
    let mut border_radii: HashMap<String, u32> = HashMap::new();
    let mut spacing: HashMap<String, u32> = HashMap::new();

    let Ok(style_attr) = STYLE_ATTR_REGEX.as_ref() else {
        return DesignTokens::default();
    };

    for captures in style_attr.captures_iter(inlined_html) {
        let Some(style) = captures.get(2).or_else(|| captures.get(3)) else {
            continue;
        };
        let style = style.as_str();

        collect_hex_colors(style, &mut colors);
        collect_rgb_colors(style, &mut colors);
        collect_first_capture(style, &FONT_FAMILY_REGEX, &mut font_families, first_font_family);
        collect_first_capture(style, &FONT_SIZE_REGEX, &mut font_sizes, plain_value);
        collect_first_capture(style, &BORDER_RADIUS_REGEX, &mut border_radii, plain_value);
        collect_spacing(style, &mut spacing);
    }

    DesignTokens {
        colors: truncate_to_top_n(colors, limits.max_entries_per_map),
        font_families: truncate_to_top_n(font_families, limits.max_entries_per_map),
        font_sizes: truncate_to_top_n(font_sizes, limits.max_entries_per_map),
        border_radii: truncate_to_top_n(border_radii, limits.max_entries_per_map),
        spacing: truncate_to_top_n(spacing, limits.max_entries_per_map),
    }
}

fn collect_hex_colors(style: &str, colors: &mut HashMap<String, u32>) {
    let Ok(regex) = HEX_COLOR_REGEX.as_ref() else {
        return;
    };

    for captures in regex.captures_iter(style) {
        let Some(digits) = captures.get(1) else {
            continue;
        };
        increment(colors, normalize_hex(digits.as_str()));
    }
}

fn collect_rgb_colors(style: &str, colors: &mut HashMap<String, u32>) {
    let Ok(regex) = RGB_COLOR_REGEX.as_ref() else {
        return;
    };

    for captures in regex.captures_iter(style) {
        let channels: Vec<u8> = (1..=3)
            .filter_map(|group| captures.get(group))
            .filter_map(|channel| channel.as_str().parse::<u32>().ok())
            .map(|channel| channel.min(255) as u8)
            .collect();

        if let [red, green, blue] = channels.as_slice() {
            increment(colors, format!("#{red:02x}{green:02x}{blue:02x}"));
        }
    }
}

fn collect_first_capture(
    style: &str,
    regex: &Lazy<Result<Regex, regex::Error>>,
    map: &mut HashMap<String, u32>,
    normalize: fn(&str) -> Option<String>,
) {
    let Ok(regex) = regex.as_ref() else {
        return;
    };

    for captures in regex.captures_iter(style) {
        let Some(value) = captures.get(1) else {
            continue;
        };
        if let Some(normalized) = normalize(value.as_str()) {
            increment(map, normalized);
        }
    }
}

fn collect_spacing(style: &str, spacing: &mut HashMap<String, u32>) {
    let Ok(regex) = SPACING_REGEX.as_ref() else {
        return;
    };

    for captures in regex.captures_iter(style) {
        let Some(value) = captures.get(1) else {
            continue;
        };

        // Each whitespace-separated operand of the shorthand counts once.
        for operand in value.as_str().split_whitespace() {
            let trimmed = operand.trim();
            if !trimmed.is_empty() {
                increment(spacing, trimmed.to_owned());
            }
        }
    }
}

fn first_font_family(value: &str) -> Option<String> {
    let first = value.split(',').next()?;
    let stripped = first.trim().trim_matches(|ch| ch == '"' || ch == '\'').trim();
    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_owned())
    }
}

fn plain_value(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}

fn normalize_hex(digits: &str) -> String {
    let lowered = digits.to_ascii_lowercase();

    if lowered.len() == 3 {
        let mut expanded = String::with_capacity(7);
        expanded.push('#');
        for ch in lowered.chars() {
            expanded.push(ch);
            expanded.push(ch);
        }
        expanded
    } else {
        format!("#{lowered}")
    }
}

fn increment(map: &mut HashMap<String, u32>, key: String) {
    *map.entry(key).or_insert(0) += 1;
}

fn truncate_to_top_n(map: HashMap<String, u32>, max_entries: usize) -> BTreeMap<String, u32> {
    let mut entries: Vec<(String, u32)> = map.into_iter().collect();
    entries.sort_by(|left, right| right.1.cmp(&left.1).then_with(|| left.0.cmp(&right.0)));
    entries.truncate(max_entries);
    entries.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::TokenLimits;
    use super::extract_tokens;

    #[test]
    fn short_and_long_hex_forms_merge_after_normalization() {
        let html = r#"<p style="color: #ABC;">a</p><p style="border-color: #aabbcc;">b</p>"#;
        let tokens = extract_tokens(html, &TokenLimits::default());
        assert_eq!(tokens.colors.get("#aabbcc").copied(), Some(2));
        assert_eq!(tokens.colors.len(), 1);
    }

    #[test]
    fn rgb_channels_are_clamped_and_alpha_ignored() {
        let html = r#"<p style="color: rgb(300, 0, 10); background: rgba(255, 0, 10, 0.5);">x</p>"#;
        let tokens = extract_tokens(html, &TokenLimits::default());
        assert_eq!(tokens.colors.get("#ff000a").copied(), Some(2));
    }

    #[test]
    fn first_font_family_of_the_list_is_counted_unquoted() {
        let html = r#"<p style="font-family: 'Helvetica Neue', Arial, sans-serif;">x</p>"#;
        let tokens = extract_tokens(html, &TokenLimits::default());
        assert_eq!(tokens.font_families.get("Helvetica Neue").copied(), Some(1));
        assert!(!tokens.font_families.contains_key("Arial"));
    }

    #[test]
    fn spacing_counts_every_shorthand_operand() {
        let html = r#"<div style="padding: 8px 16px; margin-top: 4px;">x</div>"#;
        let tokens = extract_tokens(html, &TokenLimits::default());
        assert_eq!(tokens.spacing.get("8px").copied(), Some(1));
        assert_eq!(tokens.spacing.get("16px").copied(), Some(1));
        assert_eq!(tokens.spacing.get("4px").copied(), Some(1));
    }

    #[test]
    fn font_sizes_and_radii_are_collected() {
        let html =
            r#"<p style="font-size: 14px; border-radius: 6px;">a</p><p style="font-size: 14px;">b</p>"#;
        let tokens = extract_tokens(html, &TokenLimits::default());
        assert_eq!(tokens.font_sizes.get("14px").copied(), Some(2));
        assert_eq!(tokens.border_radii.get("6px").copied(), Some(1));
    }

    #[test]
    fn maps_are_truncated_to_the_configured_cap() {
        let mut html = String::new();
        for idx in 0..10 {
            html.push_str(&format!(r#"<p style="font-size: {idx}px;">x</p>"#));
        }
        let limits = TokenLimits {
            max_entries_per_map: 3,
        };
        let tokens = extract_tokens(&html, &limits);
        assert_eq!(tokens.font_sizes.len(), 3);
    }

    #[test]
    fn single_quoted_style_attributes_are_scanned() {
        let html = "<p style='color: #fff'>x</p>";
        let tokens = extract_tokens(html, &TokenLimits::default());
        assert_eq!(tokens.colors.get("#ffffff").copied(), Some(1));
    }
}
