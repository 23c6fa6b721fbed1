//! Display-time adapter that turns stored background-image markers into
//! live CSS. Markers are the storage form; this transform never runs
//! before persistence.

use pw_html::HtmlEvent;
use pw_html::attribute;
use pw_html::scan_events;
use pw_safety::SafetyPolicy;

/// Fallback min-height when a marker carries no height.
pub const DEFAULT_BACKGROUND_MIN_HEIGHT_PX: u32 = 300;

/// Replaces each `data-bg-image="true"` marker with a `<div>` carrying
/// inline background styles. Already-rendered markers are left untouched
/// (idempotent), and every URL is re-validated before being emitted —
/// stored content may have been tampered with between assembly and display.
pub fn render_background_images(html: &str, safety: &SafetyPolicy) -> String {
    let events = scan_events(html);
    let mut out = String::with_capacity(html.len());

    for event in &events {
        let HtmlEvent::StartTag(tag) = event else {
            copy_event(html, event, &mut out);
            continue;
        };

        if attribute(&tag.attributes, "data-bg-image") != Some("true")
            || attribute(&tag.attributes, "data-bg-image-rendered") == Some("true")
        {
            copy_event(html, event, &mut out);
            continue;
        }

        let src = attribute(&tag.attributes, "src").unwrap_or_default();
        let verdict = safety.validate_url(src);
        let Some(url) = verdict.normalized.filter(|_| verdict.is_safe) else {
            log::debug!("leaving background marker with unsafe url untouched");
            copy_event(html, event, &mut out);
            continue;
        };

        let min_height = attribute(&tag.attributes, "height")
            .and_then(|value| value.trim().trim_end_matches("px").parse::<u32>().ok())
            .unwrap_or(DEFAULT_BACKGROUND_MIN_HEIGHT_PX);

        out.push_str(&format!(
            "<div data-bg-image=\"true\" data-bg-image-rendered=\"true\" \
             style=\"background-image: url('{}'); background-size: cover; \
             background-position: center; width: 100%; min-height: {min_height}px\"></div>",
            sanitize_css_url(&url)
        ));
    }

    out
}

fn copy_event(html: &str, event: &HtmlEvent, out: &mut String) {
    let (start, end) = match event {
        HtmlEvent::StartTag(tag) => (tag.start, tag.end),
        HtmlEvent::EndTag { start, end, .. } => (*start, *end),
        HtmlEvent::Verbatim { start, end } => (*start, *end),
    };
    out.push_str(&html[start..end]);
}

fn sanitize_css_url(url: &str) -> String {
    url.replace('\'', "%27")
        .replace('(', "%28")
        .replace(')', "%29")
        .replace('"', "%22")
}

#[cfg(test)]
mod tests {
    use super::render_background_images;
    use pw_safety::SafetyPolicy;

    const MARKER: &str = "<p>before</p>\
        <img data-bg-image=\"true\" src=\"https://example.com/bg.jpg\" \
        alt=\"Background image\" height=\"420\">\
        <p>after</p>";

    #[test]
    fn markers_become_background_divs() {
        let rendered = render_background_images(MARKER, &SafetyPolicy::default());
        assert!(rendered.contains("background-image: url('https://example.com/bg.jpg')"));
        assert!(rendered.contains("background-size: cover"));
        assert!(rendered.contains("background-position: center"));
        assert!(rendered.contains("min-height: 420px"));
        assert!(rendered.contains("data-bg-image-rendered=\"true\""));
        assert!(!rendered.contains("<img data-bg-image"));
    }

    #[test]
    fn rendering_twice_equals_rendering_once() {
        let once = render_background_images(MARKER, &SafetyPolicy::default());
        let twice = render_background_images(&once, &SafetyPolicy::default());
        assert_eq!(once, twice);
    }

    #[test]
    fn unknown_height_falls_back_to_the_default() {
        let marker = "<img data-bg-image=\"true\" src=\"https://example.com/bg.jpg\">";
        let rendered = render_background_images(marker, &SafetyPolicy::default());
        assert!(rendered.contains(&format!(
            "min-height: {}px",
            super::DEFAULT_BACKGROUND_MIN_HEIGHT_PX
        )));
    }

    #[test]
    fn invalid_urls_leave_the_marker_untouched() {
        let marker = "<img data-bg-image=\"true\" src=\"https://127.0.0.1/bg.jpg\">";
        let rendered = render_background_images(marker, &SafetyPolicy::default());
        assert_eq!(rendered, marker);
    }

    #[test]
    fn ordinary_images_pass_through_unchanged() {
        let html = "<img src=\"https://example.com/photo.jpg\" alt=\"x\">";
        let rendered = render_background_images(html, &SafetyPolicy::default());
        assert_eq!(rendered, html);
    }
}
