//! Mockup reconstruction pipeline coordinator.
//!
//! Wires the pure components in flow order: CSS decomposition and cascade
//! inlining, image registry construction, skeleton assembly, and the
//! display-time background render. Owns the policy/config knobs so callers
//! configure once.

pub use pw_assemble::SlotCounters;
pub use pw_assemble::markdown_to_html;
pub use pw_css::CssBudget;
pub use pw_css::DesignTokens;
pub use pw_css::ExtractedCss;
pub use pw_css::ResponsiveCss;
pub use pw_css::TokenLimits;
pub use pw_images::ImageRegistry;
pub use pw_images::PageImage;
pub use pw_images::RegistryConfig;
pub use pw_images::Section;
pub use pw_net::FetchPolicy;
pub use pw_safety::SafetyPolicy;
pub use pw_safety::UrlVerdict;

/// Everything scraped for one page. `page_url` is optional: its absence
/// only disables relative-URL resolution and first-party fetch checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageCapture {
    pub html: String,
    pub css_text: String,
    pub page_url: Option<String>,
}

impl PageCapture {
    pub fn new(html: impl Into<String>, css_text: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            css_text: css_text.into(),
            page_url: None,
        }
    }

    pub fn with_page_url(mut self, page_url: impl Into<String>) -> Self {
        self.page_url = Some(page_url.into());
        self
    }
}

/// Outputs kept for persistence and downstream inspection. `html` is the
/// marker (storage) form; only [`Reconstructor::render_for_display`]
/// produces the display form.
#[derive(Debug, Clone, PartialEq)]
pub struct MockupArtifacts {
    pub html: String,
    pub css: ExtractedCss,
    pub registry: ImageRegistry,
}

/// Top-level reconstruction coordinator.
#[derive(Debug, Clone, Default)]
pub struct Reconstructor {
    pub safety: SafetyPolicy,
    pub token_limits: TokenLimits,
    pub css_budget: CssBudget,
    pub registry_config: RegistryConfig,
    pub fetch_policy: FetchPolicy,
}

impl Reconstructor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches first-party external stylesheet text for a capture. The only
    /// I/O in the pipeline; callers concatenate the result into
    /// `PageCapture::css_text` before reconstruction.
    pub fn fetch_external_css(&self, capture: &PageCapture) -> String {
        let Some(page_url) = capture.page_url.as_deref() else {
            return String::new();
        };

        pw_net::fetch_external_stylesheets(&capture.html, page_url, &self.fetch_policy)
    }

    /// Decomposes the capture's CSS and resolves the cascade over its HTML.
    pub fn extract_css(&self, capture: &PageCapture) -> ExtractedCss {
        pw_css::extract_css(
            &capture.html,
            &capture.css_text,
            &self.token_limits,
            &self.css_budget,
        )
    }

    /// Builds the compact responsive bundle from an extraction.
    pub fn responsive_css(&self, extracted: &ExtractedCss) -> ResponsiveCss {
        pw_css::responsive_css(extracted, &self.css_budget)
    }

    /// Scopes CSS so it applies only under `namespace_selector`.
    pub fn scope_css(&self, css: &str, namespace_selector: &str) -> String {
        pw_css::scope_css(css, namespace_selector)
    }

    /// Builds the image registry for a capture and its sections.
    pub fn build_registry(&self, capture: &PageCapture, sections: &[Section]) -> ImageRegistry {
        pw_images::build_registry(
            &capture.html,
            sections,
            capture.page_url.as_deref(),
            &self.safety,
            &self.registry_config,
        )
    }

    /// Fills skeleton placeholders with section content, images, and slots.
    pub fn assemble(
        &self,
        skeleton_html: &str,
        sections: &[Section],
        registry: Option<&ImageRegistry>,
    ) -> String {
        pw_assemble::assemble(skeleton_html, sections, registry)
    }

    /// One-shot reconstruction in flow order.
    pub fn reconstruct(
        &self,
        capture: &PageCapture,
        sections: &[Section],
        skeleton_html: &str,
    ) -> MockupArtifacts {
        let css = self.extract_css(capture);
        let registry = self.build_registry(capture, sections);
        let html = self.assemble(skeleton_html, sections, Some(&registry));

        MockupArtifacts {
            html,
            css,
            registry,
        }
    }

    /// Display-time transform of stored marker HTML. Never persist the
    /// result.
    pub fn render_for_display(&self, stored_html: &str) -> String {
        pw_assemble::render_background_images(stored_html, &self.safety)
    }
}

#[cfg(test)]
mod tests {
    use super::PageCapture;
    use super::Reconstructor;
    use super::Section;

    const PAGE_HTML: &str = r#"<html><head></head><body>
        <h1 class="hero-title">Old Headline</h1>
        <div style="background-image: url('https://shop.example.com/bg.jpg')"></div>
        <img src="https://shop.example.com/hero.jpg" alt="Hero" width="640" height="480">
        </body></html>"#;

    const PAGE_CSS: &str = ".hero-title { color: #112233; font-size: 32px; }";

    fn sections() -> Vec<Section> {
        vec![
            Section::new(
                "sec_0",
                "# New Headline\n\n![Hero](https://shop.example.com/hero.jpg)\n\n![bg](https://shop.example.com/bg.jpg)",
            ),
            Section::new("sec_1", "Closing words\n\n[Shop now](https://shop.example.com/buy)"),
        ]
    }

    #[test]
    fn reconstruct_produces_storage_form_html_with_slots_and_markers() {
        let capture = PageCapture::new(PAGE_HTML, PAGE_CSS)
            .with_page_url("https://shop.example.com/landing");
        let reconstructor = Reconstructor::new();
        let artifacts = reconstructor.reconstruct(
            &capture,
            &sections(),
            "<main>{{sec_0}}</main><footer>{{sec_1}}</footer>",
        );

        assert!(artifacts.html.contains("data-slot=\"headline\""));
        assert!(artifacts.html.contains("data-slot=\"cta-1\""));
        assert!(artifacts.html.contains("data-bg-image=\"true\""));
        assert!(!artifacts.html.contains("data-bg-image-rendered"));
        assert!(!artifacts.html.contains("{{sec_0}}"));
        assert!(!artifacts.html.contains("{{sec_1}}"));

        assert!(artifacts.css.inlined_html.contains("style="));
        assert_eq!(
            artifacts.css.tokens.colors.get("#112233").copied(),
            Some(1)
        );

        let hero = artifacts.registry.image("https://shop.example.com/hero.jpg");
        assert!(hero.is_some_and(|image| image.sections == vec!["sec_0".to_owned()]));
    }

    #[test]
    fn render_for_display_is_idempotent_and_never_stored() {
        let capture = PageCapture::new(PAGE_HTML, PAGE_CSS)
            .with_page_url("https://shop.example.com/landing");
        let reconstructor = Reconstructor::new();
        let artifacts =
            reconstructor.reconstruct(&capture, &sections(), "<main>{{sec_0}}</main>");

        let displayed = reconstructor.render_for_display(&artifacts.html);
        assert!(displayed.contains("background-image: url('https://shop.example.com/bg.jpg')"));
        assert_eq!(displayed, reconstructor.render_for_display(&displayed));
    }

    #[test]
    fn empty_capture_degrades_to_a_filled_skeleton() {
        let capture = PageCapture::new("", "");
        let reconstructor = Reconstructor::new();
        let artifacts = reconstructor.reconstruct(
            &capture,
            &[Section::new("sec_0", "# Title")],
            "<div>{{sec_0}}</div>",
        );

        assert!(artifacts.html.contains("<h1 data-slot=\"headline\">Title</h1>"));
        assert!(artifacts.registry.is_empty());
    }

    #[test]
    fn fetch_is_skipped_without_a_page_url() {
        let reconstructor = Reconstructor::new();
        let capture = PageCapture::new("<link rel=\"stylesheet\" href=\"/a.css\">", "");
        assert_eq!(reconstructor.fetch_external_css(&capture), "");
    }
}
