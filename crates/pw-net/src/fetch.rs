//! SSRF-guarded fetching of first-party external stylesheets.
//!
//! Every target is validated before each connect: https only, no literal
//! private hosts, first-party relative to the page host, never on the
//! CDN/font exclusion list, and DNS answers must be entirely public. Any
//! single stylesheet's failure is swallowed; it never aborts the page.

use crate::dns::DnsResolver;
use crate::dns::SystemDnsResolver;
use crate::dns::resolve_public;
use crate::tls::RustlsConnector;
use crate::tls::TlsConnector;
use crate::transport::TcpTransport;
use crate::transport::Transport;
use crate::transport::connect_first_available;
use brotli::Decompressor;
use flate2::read::DeflateDecoder;
use flate2::read::GzDecoder;
use flate2::read::ZlibDecoder;
use pw_core::WeaveError;
use pw_core::WeaveResult;
use pw_html::HtmlEvent;
use pw_html::attribute;
use pw_html::decode_attribute_value;
use pw_html::scan_events;
use pw_safety::is_private_host;
use std::io::Cursor;
use std::io::Read;
use std::io::Write;
use std::time::Duration;
use url::Url;

const MAX_RESPONSE_HEAD_BYTES: usize = 64 * 1024;
const MAX_CHUNK_LINE_BYTES: usize = 8 * 1024;

const FETCH_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

/// Hosts that match the first-party rule for some pages but must never be
/// treated as first-party (shared CDN and font infrastructure).
const EXCLUDED_SHARED_HOSTS: &[&str] = &[
    "fonts.googleapis.com",
    "fonts.gstatic.com",
    "use.typekit.net",
    "cdn.jsdelivr.net",
    "cdnjs.cloudflare.com",
    "unpkg.com",
    "stackpath.bootstrapcdn.com",
    "maxcdn.bootstrapcdn.com",
];

/// Caps and timeouts for the stylesheet fetch pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPolicy {
    pub max_stylesheets: usize,
    pub max_redirects: usize,
    pub max_stylesheet_bytes: usize,
    pub max_total_bytes: usize,
    pub request_timeout: Duration,
    pub excluded_hosts: Vec<String>,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            max_stylesheets: 3,
            max_redirects: 3,
            max_stylesheet_bytes: 512 * 1024,
            max_total_bytes: 1536 * 1024,
            request_timeout: Duration::from_secs(3),
            excluded_hosts: EXCLUDED_SHARED_HOSTS
                .iter()
                .map(|host| (*host).to_owned())
                .collect(),
        }
    }
}

/// Sequential stylesheet fetcher with pluggable resolver/transport/TLS.
pub struct StylesheetFetcher<R = SystemDnsResolver, T = TcpTransport, C = RustlsConnector>
where
    R: DnsResolver,
    T: Transport,
    C: TlsConnector,
{
    dns: R,
    transport: T,
    tls: C,
    policy: FetchPolicy,
}

impl StylesheetFetcher {
    pub fn new(policy: FetchPolicy) -> Self {
        Self::with_parts(SystemDnsResolver, TcpTransport, RustlsConnector, policy)
    }
}

impl<R, T, C> StylesheetFetcher<R, T, C>
where
    R: DnsResolver,
    T: Transport,
    C: TlsConnector,
{
    pub fn with_parts(dns: R, transport: T, tls: C, policy: FetchPolicy) -> Self {
        Self {
            dns,
            transport,
            tls,
            policy,
        }
    }

    /// Fetches at most `max_stylesheets` first-party stylesheets referenced
    /// by `html` and returns their concatenated text. Per-sheet failures
    /// are logged and dropped.
    pub fn fetch_page_stylesheets(&self, html: &str, page_url: &str) -> String {
        let Ok(page) = Url::parse(page_url) else {
            log::warn!("page url `{page_url}` is not parseable; skipping stylesheet fetch");
            return String::new();
        };

        let mut collected = String::new();
        let mut fetched = 0_usize;
        let mut total_bytes = 0_usize;

        for href in extract_stylesheet_links(html) {
            if fetched >= self.policy.max_stylesheets || total_bytes >= self.policy.max_total_bytes
            {
                break;
            }

            let Ok(target) = page.join(&href) else {
                log::debug!("stylesheet href `{href}` does not resolve; skipping");
                continue;
            };

            if let Err(error) = validate_fetch_target(&target, &page, &self.policy) {
                log::debug!("skipping stylesheet `{target}`: {error}");
                continue;
            }

            fetched = fetched.saturating_add(1);
            match self.fetch_stylesheet(&target, &page) {
                Ok(body) => {
                    let remaining = self.policy.max_total_bytes.saturating_sub(total_bytes);
                    let taken = clip_to_char_boundary(&body, remaining);
                    total_bytes = total_bytes.saturating_add(taken.len());
                    collected.push_str(taken);
                    collected.push('\n');
                }
                Err(error) => {
                    log::warn!("stylesheet fetch failed for `{target}`: {error}");
                }
            }
        }

        collected
    }

    fn fetch_stylesheet(&self, url: &Url, page: &Url) -> WeaveResult<String> {
        let mut current = url.clone();

        for _hop in 0..=self.policy.max_redirects {
            // Re-validated at every hop: a redirect may cross origins.
            validate_fetch_target(&current, page, &self.policy)?;

            let host = current.host_str().ok_or_else(|| {
                WeaveError::new("net.fetch.host_missing", "fetch target has no host")
            })?;
            let port = current.port_or_known_default().unwrap_or(443);

            let addresses = resolve_public(&self.dns, host, port)?;
            let tcp = connect_first_available(
                &self.transport,
                &addresses,
                self.policy.request_timeout,
            )?;
            let mut stream = self.tls.connect_tls(tcp, host)?;

            write_get_request(&mut *stream, &current)?;
            let response = read_response(&mut *stream, self.policy.max_stylesheet_bytes)?;

            if (300..400).contains(&response.status) {
                let location = response.header("location").ok_or_else(|| {
                    WeaveError::new(
                        "net.fetch.redirect_location_missing",
                        format!("redirect status {} without a Location header", response.status),
                    )
                })?;

                current = current.join(location).map_err(|error| {
                    WeaveError::new(
                        "net.fetch.redirect_location_invalid",
                        format!("unusable redirect target `{location}`: {error}"),
                    )
                })?;
                continue;
            }

            if response.status != 200 {
                return Err(WeaveError::new(
                    "net.fetch.unexpected_status",
                    format!("stylesheet responded with status {}", response.status),
                ));
            }

            if response.truncated {
                log::debug!("stylesheet `{current}` truncated at the byte cap");
            }

            let body = decode_content_encoding(
                &response.headers,
                &response.body,
                self.policy.max_stylesheet_bytes,
            )?;
            return Ok(String::from_utf8_lossy(&body).into_owned());
        }

        Err(WeaveError::new(
            "net.fetch.redirect_loop",
            format!("exceeded {} redirects", self.policy.max_redirects),
        ))
    }
}

/// Extracts `<link rel=stylesheet>` hrefs in document order.
pub fn extract_stylesheet_links(html: &str) -> Vec<String> {
    let mut hrefs = Vec::new();

    for event in scan_events(html) {
        let HtmlEvent::StartTag(tag) = event else {
            continue;
        };
        if tag.name != "link" {
            continue;
        }

        let is_stylesheet = attribute(&tag.attributes, "rel").is_some_and(|rel| {
            rel.split_whitespace()
                .any(|token| token.eq_ignore_ascii_case("stylesheet"))
        });
        if !is_stylesheet {
            continue;
        }

        if let Some(href) = attribute(&tag.attributes, "href") {
            let decoded = decode_attribute_value(href.trim());
            if !decoded.is_empty() {
                hrefs.push(decoded);
            }
        }
    }

    hrefs
}

/// First-party check: exact host match or subdomain in either direction.
pub(crate) fn is_first_party(page_host: &str, target_host: &str) -> bool {
    let page = normalize_host(page_host);
    let target = normalize_host(target_host);
    if page.is_empty() || target.is_empty() {
        return false;
    }

    page == target
        || target.ends_with(&format!(".{page}"))
        || page.ends_with(&format!(".{target}"))
}

pub(crate) fn validate_fetch_target(
    target: &Url,
    page: &Url,
    policy: &FetchPolicy,
) -> WeaveResult<()> {
    if target.scheme() != "https" {
        return Err(WeaveError::new(
            "net.fetch.scheme_not_https",
            format!("refusing `{}` scheme for stylesheet fetch", target.scheme()),
        ));
    }

    if !target.username().is_empty() || target.password().is_some() {
        return Err(WeaveError::new(
            "net.fetch.credentials_disallowed",
            "stylesheet URL carries userinfo credentials",
        ));
    }

    let target_host = target.host_str().ok_or_else(|| {
        WeaveError::new("net.fetch.host_missing", "stylesheet URL has no host")
    })?;

    if is_private_host(target_host) {
        return Err(WeaveError::new(
            "net.fetch.private_host",
            format!("refusing private or loopback host `{target_host}`"),
        ));
    }

    let page_host = page.host_str().ok_or_else(|| {
        WeaveError::new("net.fetch.page_host_missing", "page URL has no host")
    })?;

    if !is_first_party(page_host, target_host) {
        return Err(WeaveError::new(
            "net.fetch.third_party",
            format!("`{target_host}` is not first-party relative to `{page_host}`"),
        ));
    }

    let normalized = normalize_host(target_host);
    let excluded = policy.excluded_hosts.iter().any(|host| {
        normalized == *host || normalized.ends_with(&format!(".{host}"))
    });
    if excluded {
        return Err(WeaveError::new(
            "net.fetch.shared_host_excluded",
            format!("`{target_host}` is on the shared CDN/font exclusion list"),
        ));
    }

    Ok(())
}

fn write_get_request(stream: &mut dyn Write, url: &Url) -> WeaveResult<()> {
    let host = url.host_str().unwrap_or_default();
    let path = if url.path().is_empty() { "/" } else { url.path() };
    let target = match url.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_owned(),
    };

    let request = format!(
        "GET {target} HTTP/1.1\r\n\
         Host: {host}\r\n\
         User-Agent: {FETCH_USER_AGENT}\r\n\
         Accept: text/css,*/*;q=0.1\r\n\
         Accept-Encoding: gzip, deflate, br\r\n\
         Connection: close\r\n\
         \r\n"
    );

    stream.write_all(request.as_bytes()).map_err(|error| {
        WeaveError::new(
            "net.fetch.write_failed",
            format!("failed to write stylesheet request: {error}"),
        )
    })?;
    stream.flush().map_err(|error| {
        WeaveError::new(
            "net.fetch.flush_failed",
            format!("failed to flush stylesheet request: {error}"),
        )
    })
}

pub(crate) struct FetchResponse {
    pub(crate) status: u16,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Vec<u8>,
    pub(crate) truncated: bool,
}

impl FetchResponse {
    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Reads one response. `Content-Length` larger than `max_body_bytes` is an
/// early reject; the streaming read truncates at the cap instead of
/// failing.
pub(crate) fn read_response(
    stream: &mut dyn Read,
    max_body_bytes: usize,
) -> WeaveResult<FetchResponse> {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 4096];
    let mut header_end: Option<usize> = None;

    while header_end.is_none() {
        let read = stream.read(&mut chunk).map_err(|error| {
            WeaveError::new(
                "net.fetch.read_head_failed",
                format!("failed while reading response head: {error}"),
            )
        })?;

        if read == 0 {
            return Err(WeaveError::new(
                "net.fetch.unexpected_eof",
                "connection closed before response head completed",
            ));
        }

        buffer.extend_from_slice(&chunk[..read]);
        if buffer.len() > MAX_RESPONSE_HEAD_BYTES {
            return Err(WeaveError::new(
                "net.fetch.head_too_large",
                format!("response head exceeds {MAX_RESPONSE_HEAD_BYTES} bytes"),
            ));
        }

        header_end = find_header_end(&buffer);
    }

    let Some(header_end) = header_end else {
        return Err(WeaveError::new(
            "net.fetch.header_terminator_missing",
            "response head terminator not found",
        ));
    };

    let head_text = String::from_utf8_lossy(&buffer[..header_end]).into_owned();
    let prefetched = buffer[header_end..].to_vec();

    let mut lines = head_text.split("\r\n");
    let status = parse_status_line(lines.next().unwrap_or_default())?;

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        headers.push((name.trim().to_ascii_lowercase(), value.trim().to_owned()));
    }

    let response_stub = FetchResponse {
        status,
        headers,
        body: Vec::new(),
        truncated: false,
    };

    if let Some(length) = response_stub.header("content-length") {
        if let Ok(length) = length.trim().parse::<usize>() {
            if length > max_body_bytes {
                return Err(WeaveError::new(
                    "net.fetch.body_too_large",
                    format!("declared Content-Length {length} exceeds cap {max_body_bytes}"),
                ));
            }
        }
    }

    let chunked = response_stub
        .header("transfer-encoding")
        .is_some_and(|value| {
            value
                .split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("chunked"))
        });

    let (body, truncated) = if chunked {
        read_chunked_body(stream, prefetched, max_body_bytes)?
    } else {
        read_capped_to_end(stream, prefetched, max_body_bytes)?
    };

    Ok(FetchResponse {
        body,
        truncated,
        ..response_stub
    })
}

fn read_capped_to_end(
    stream: &mut dyn Read,
    prefetched: Vec<u8>,
    cap: usize,
) -> WeaveResult<(Vec<u8>, bool)> {
    let mut body = prefetched;
    if body.len() >= cap {
        body.truncate(cap);
        return Ok((body, true));
    }

    let mut chunk = [0_u8; 8192];
    loop {
        let read = stream.read(&mut chunk).map_err(|error| {
            WeaveError::new(
                "net.fetch.read_body_failed",
                format!("failed while reading response body: {error}"),
            )
        })?;

        if read == 0 {
            return Ok((body, false));
        }

        body.extend_from_slice(&chunk[..read]);
        if body.len() >= cap {
            body.truncate(cap);
            return Ok((body, true));
        }
    }
}

struct PrefixedStreamReader<'a> {
    prefetched: Vec<u8>,
    offset: usize,
    stream: &'a mut dyn Read,
}

impl<'a> PrefixedStreamReader<'a> {
    fn new(stream: &'a mut dyn Read, prefetched: Vec<u8>) -> Self {
        Self {
            prefetched,
            offset: 0,
            stream,
        }
    }

    fn read_exact_into(&mut self, out: &mut [u8]) -> WeaveResult<()> {
        let available = self.prefetched.len().saturating_sub(self.offset);
        let prefix_take = available.min(out.len());

        if prefix_take > 0 {
            out[..prefix_take]
                .copy_from_slice(&self.prefetched[self.offset..self.offset + prefix_take]);
            self.offset += prefix_take;
        }

        if prefix_take < out.len() {
            self.stream
                .read_exact(&mut out[prefix_take..])
                .map_err(|error| {
                    WeaveError::new(
                        "net.fetch.read_body_failed",
                        format!("failed while reading chunked body bytes: {error}"),
                    )
                })?;
        }

        Ok(())
    }
}

fn read_chunked_body(
    stream: &mut dyn Read,
    prefetched: Vec<u8>,
    cap: usize,
) -> WeaveResult<(Vec<u8>, bool)> {
    let mut reader = PrefixedStreamReader::new(stream, prefetched);
    let mut decoded = Vec::new();

    loop {
        let size_line = read_crlf_line(&mut reader)?;
        if size_line.is_empty() {
            continue;
        }

        let size_token = size_line.split(';').next().unwrap_or_default().trim();
        let chunk_size = usize::from_str_radix(size_token, 16).map_err(|error| {
            WeaveError::new(
                "net.fetch.chunk_size_invalid",
                format!("invalid chunk size `{size_token}`: {error}"),
            )
        })?;

        if chunk_size == 0 {
            return Ok((decoded, false));
        }

        if decoded.len().saturating_add(chunk_size) > cap {
            let remaining = cap.saturating_sub(decoded.len());
            let start = decoded.len();
            decoded.resize(start + remaining, 0);
            reader.read_exact_into(&mut decoded[start..])?;
            return Ok((decoded, true));
        }

        let start = decoded.len();
        decoded.resize(start + chunk_size, 0);
        reader.read_exact_into(&mut decoded[start..])?;

        let mut terminator = [0_u8; 2];
        reader.read_exact_into(&mut terminator)?;
        if terminator != *b"\r\n" {
            return Err(WeaveError::new(
                "net.fetch.chunk_terminator_invalid",
                "chunk data is missing trailing CRLF",
            ));
        }
    }
}

fn read_crlf_line(reader: &mut PrefixedStreamReader<'_>) -> WeaveResult<String> {
    let mut line = Vec::new();

    loop {
        let mut byte = [0_u8; 1];
        reader.read_exact_into(&mut byte)?;
        line.push(byte[0]);

        if line.len() > MAX_CHUNK_LINE_BYTES {
            return Err(WeaveError::new(
                "net.fetch.chunk_line_too_large",
                format!("chunk metadata line exceeds {MAX_CHUNK_LINE_BYTES} bytes"),
            ));
        }

        if line.len() >= 2 && line[line.len() - 2..] == *b"\r\n" {
            line.truncate(line.len() - 2);
            return Ok(String::from_utf8_lossy(&line).into_owned());
        }
    }
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|idx| idx + 4)
}

fn parse_status_line(line: &str) -> WeaveResult<u16> {
    let mut parts = line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(WeaveError::new(
            "net.fetch.version_unsupported",
            format!("unsupported response version in `{line}`"),
        ));
    }

    let code_text = parts.next().unwrap_or_default();
    code_text.parse::<u16>().map_err(|error| {
        WeaveError::new(
            "net.fetch.status_line_invalid",
            format!("invalid status code `{code_text}`: {error}"),
        )
    })
}

/// Applies `Content-Encoding` in reverse order, capping the decoded size so
/// a compressed body cannot expand past the stylesheet cap.
pub(crate) fn decode_content_encoding(
    headers: &[(String, String)],
    body: &[u8],
    max_decoded_bytes: usize,
) -> WeaveResult<Vec<u8>> {
    let encodings: Vec<String> = headers
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case("content-encoding"))
        .flat_map(|(_, value)| value.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect();

    if encodings.is_empty() {
        return Ok(body.to_vec());
    }

    let mut decoded = body.to_vec();
    for encoding in encodings.iter().rev() {
        decoded = match encoding.as_str() {
            "identity" => decoded,
            "gzip" | "x-gzip" => {
                decode_with_cap(GzDecoder::new(Cursor::new(decoded)), max_decoded_bytes)?
            }
            "deflate" => decode_deflate(&decoded, max_decoded_bytes)?,
            "br" => decode_with_cap(
                Decompressor::new(Cursor::new(decoded), 4096),
                max_decoded_bytes,
            )?,
            _ => {
                return Err(WeaveError::new(
                    "net.fetch.content_encoding_unsupported",
                    format!("unsupported content encoding `{encoding}`"),
                ));
            }
        };
    }

    Ok(decoded)
}

fn decode_with_cap<D: Read>(decoder: D, cap: usize) -> WeaveResult<Vec<u8>> {
    let mut decoded = Vec::new();
    decoder
        .take(cap as u64)
        .read_to_end(&mut decoded)
        .map_err(|error| {
            WeaveError::new(
                "net.fetch.decode_failed",
                format!("content decode failed: {error}"),
            )
        })?;
    Ok(decoded)
}

fn decode_deflate(body: &[u8], cap: usize) -> WeaveResult<Vec<u8>> {
    if let Ok(decoded) = decode_with_cap(ZlibDecoder::new(Cursor::new(body.to_vec())), cap) {
        return Ok(decoded);
    }

    decode_with_cap(DeflateDecoder::new(Cursor::new(body.to_vec())), cap)
}

fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}

fn clip_to_char_boundary(text: &str, mut max_len: usize) -> &str {
    if max_len >= text.len() {
        return text;
    }
    while max_len > 0 && !text.is_char_boundary(max_len) {
        max_len = max_len.saturating_sub(1);
    }
    &text[..max_len]
}

#[cfg(test)]
mod tests {
    use super::FetchPolicy;
    use super::decode_content_encoding;
    use super::extract_stylesheet_links;
    use super::is_first_party;
    use super::read_response;
    use super::validate_fetch_target;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Cursor;
    use std::io::Write;
    use url::Url;

    fn parse(raw: &str) -> Url {
        let parsed = Url::parse(raw);
        assert!(parsed.is_ok());
        match parsed {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }

    #[test]
    fn stylesheet_links_are_extracted_in_document_order() {
        let html = r#"<link rel="stylesheet" href="/a.css">
            <link rel="preload" href="/skip.css">
            <link rel="STYLESHEET" href="/b.css">
            <link rel="stylesheet">"#;
        let links = extract_stylesheet_links(html);
        assert_eq!(links, vec!["/a.css".to_owned(), "/b.css".to_owned()]);
    }

    #[test]
    fn first_party_matches_subdomains_in_either_direction() {
        assert!(is_first_party("example.com", "example.com"));
        assert!(is_first_party("example.com", "static.example.com"));
        assert!(is_first_party("www.example.com", "example.com"));
        assert!(!is_first_party("example.com", "example.org"));
        assert!(!is_first_party("example.com", "badexample.com"));
    }

    #[test]
    fn fetch_target_validation_rejects_the_usual_suspects() {
        let page = parse("https://example.com/post");
        let policy = FetchPolicy::default();

        let http = parse("http://example.com/a.css");
        assert!(validate_fetch_target(&http, &page, &policy).is_err());

        let third_party = parse("https://other.org/a.css");
        assert!(validate_fetch_target(&third_party, &page, &policy).is_err());

        let private = parse("https://192.168.1.10/a.css");
        assert!(validate_fetch_target(&private, &page, &policy).is_err());

        let ok = parse("https://static.example.com/a.css");
        assert!(validate_fetch_target(&ok, &page, &policy).is_ok());
    }

    #[test]
    fn shared_cdn_hosts_are_excluded_even_when_first_party() {
        let page = parse("https://fonts.googleapis.com/page");
        let target = parse("https://fonts.googleapis.com/css2?family=Inter");
        let policy = FetchPolicy::default();
        let verdict = validate_fetch_target(&target, &page, &policy);
        assert!(verdict.is_err());
        if let Err(error) = verdict {
            assert_eq!(error.code, "net.fetch.shared_host_excluded");
        }
    }

    #[test]
    fn content_length_body_is_read_exactly() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 11\r\n\r\nbody{gap:0}";
        let mut stream = Cursor::new(raw.to_vec());
        let response = read_response(&mut stream, 1024);
        assert!(response.is_ok());
        if let Ok(response) = response {
            assert_eq!(response.status, 200);
            assert_eq!(response.body, b"body{gap:0}");
            assert!(!response.truncated);
        }
    }

    #[test]
    fn oversized_content_length_is_rejected_early() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 999999\r\n\r\n";
        let mut stream = Cursor::new(raw.to_vec());
        let response = read_response(&mut stream, 1024);
        assert!(response.is_err());
        if let Err(error) = response {
            assert_eq!(error.code, "net.fetch.body_too_large");
        }
    }

    #[test]
    fn streaming_read_truncates_at_the_cap_instead_of_failing() {
        let mut raw = b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n".to_vec();
        raw.extend_from_slice(&[b'a'; 100]);
        let mut stream = Cursor::new(raw);
        let response = read_response(&mut stream, 40);
        assert!(response.is_ok());
        if let Ok(response) = response {
            assert_eq!(response.body.len(), 40);
            assert!(response.truncated);
        }
    }

    #[test]
    fn chunked_bodies_are_decoded() {
        let raw =
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\n.a{}\r\n5\r\n.bb{}\r\n0\r\n\r\n";
        let mut stream = Cursor::new(raw.to_vec());
        let response = read_response(&mut stream, 1024);
        assert!(response.is_ok());
        if let Ok(response) = response {
            assert_eq!(response.body, b".a{}.bb{}");
        }
    }

    #[test]
    fn redirect_status_lines_parse() {
        let raw = b"HTTP/1.1 301 Moved Permanently\r\nLocation: /new.css\r\n\r\n";
        let mut stream = Cursor::new(raw.to_vec());
        let response = read_response(&mut stream, 1024);
        assert!(response.is_ok());
        if let Ok(response) = response {
            assert_eq!(response.status, 301);
            assert_eq!(response.header("location"), Some("/new.css"));
        }
    }

    #[test]
    fn gzip_bodies_are_decoded_with_a_cap() {
        let mut encoded = Vec::new();
        {
            let mut encoder = GzEncoder::new(&mut encoded, Compression::default());
            let wrote = encoder.write_all(b".hero { margin: 0; }");
            assert!(wrote.is_ok());
            let finished = encoder.finish();
            assert!(finished.is_ok());
        }

        let headers = vec![("content-encoding".to_owned(), "gzip".to_owned())];
        let decoded = decode_content_encoding(&headers, &encoded, 1024);
        assert_eq!(decoded, Ok(b".hero { margin: 0; }".to_vec()));

        let capped = decode_content_encoding(&headers, &encoded, 5);
        assert_eq!(capped, Ok(b".hero".to_vec()));
    }
}
