//! SSRF-guarded fetching of first-party external stylesheets.
//!
//! This is the only component in the workspace that performs I/O. Cascade
//! resolution itself never fetches; the text collected here is handed to it
//! as already-supplied input.

pub mod dns;
pub mod fetch;
pub mod tls;
pub mod transport;

pub use dns::DnsResolver;
pub use dns::SystemDnsResolver;
pub use fetch::FetchPolicy;
pub use fetch::StylesheetFetcher;
pub use fetch::extract_stylesheet_links;
pub use tls::RustlsConnector;
pub use tls::TlsConnector;
pub use transport::TcpTransport;
pub use transport::Transport;

/// Fetches the page's first-party external stylesheets and returns their
/// concatenated text. Failures degrade to an empty or partial result.
pub fn fetch_external_stylesheets(html: &str, page_url: &str, policy: &FetchPolicy) -> String {
    StylesheetFetcher::new(policy.clone()).fetch_page_stylesheets(html, page_url)
}
