//! Host rewriting for bodies served to crawlers.
//!
//! References to the upstream origin are swapped for the proxy origin so that
//! a crawler never sees the upstream host. Everything works on raw bytes; a
//! body that is not valid UTF-8 is rewritten without lossy conversion.

use crate::util::url_authority;
use memchr::memmem;
use std::borrow::Cow;
use url::Url;

/// Content types whose bodies carry links worth rewriting.
pub fn is_rewritable_content_type(content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    ct.contains("text/html") || ct.contains("application/xhtml") || ct.contains("xml")
}

/// Rewrites `body` when `content_type` is HTML, XHTML or any XML flavour.
pub fn rewrite_body<'a>(
    body: &'a [u8],
    content_type: &str,
    proxy: &Url,
    upstream: &Url,
) -> (Cow<'a, [u8]>, bool) {
    if !is_rewritable_content_type(content_type) {
        return (Cow::Borrowed(body), false);
    }
    rewrite_hosts(body, proxy, upstream)
}

/// Rewrites upstream references regardless of content type.
///
/// Returns the body and whether any pass changed it.
pub fn rewrite_hosts<'a>(body: &'a [u8], proxy: &Url, upstream: &Url) -> (Cow<'a, [u8]>, bool) {
    let up_host = url_authority(upstream);
    if up_host.is_empty() {
        return (Cow::Borrowed(body), false);
    }
    let proxy_host = url_authority(proxy);
    let proxy_abs = format!("{}://{}", proxy.scheme(), proxy_host);

    let passes: [(String, String); 4] = [
        (format!("{}://{}", upstream.scheme(), up_host), proxy_abs.clone()),
        (format!("//{up_host}"), format!("//{proxy_host}")),
        (format!("http://{up_host}"), proxy_abs.clone()),
        (format!("https://{up_host}"), proxy_abs),
    ];

    let mut current = Cow::Borrowed(body);
    let mut rewrote = false;
    for (needle, replacement) in &passes {
        if let Some(next) = replace_all(&current, needle.as_bytes(), replacement.as_bytes()) {
            current = Cow::Owned(next);
            rewrote = true;
        }
    }
    if let Some(next) = replace_host_literal(&current, up_host.as_bytes(), proxy_host.as_bytes()) {
        current = Cow::Owned(next);
        rewrote = true;
    }
    (current, rewrote)
}

fn replace_all(haystack: &[u8], needle: &[u8], replacement: &[u8]) -> Option<Vec<u8>> {
    if needle.is_empty() || needle == replacement {
        return None;
    }
    let mut matches = memmem::find_iter(haystack, needle).peekable();
    matches.peek()?;

    let mut out = Vec::with_capacity(haystack.len());
    let mut last = 0;
    for pos in matches {
        out.extend_from_slice(&haystack[last..pos]);
        out.extend_from_slice(replacement);
        last = pos + needle.len();
    }
    out.extend_from_slice(&haystack[last..]);
    Some(out)
}

/// Replaces bare `host` occurrences that are not part of a longer hostname.
fn replace_host_literal(haystack: &[u8], host: &[u8], replacement: &[u8]) -> Option<Vec<u8>> {
    if host.is_empty() || host == replacement {
        return None;
    }
    let finder = memmem::Finder::new(host);
    let mut out = Vec::with_capacity(haystack.len());
    let mut changed = false;
    let mut i = 0;

    while i < haystack.len() {
        let Some(rel) = finder.find(&haystack[i..]) else {
            break;
        };
        let idx = i + rel;
        let end = idx + host.len();
        let bounded = (idx == 0 || !is_host_char(haystack[idx - 1]))
            && (end >= haystack.len() || !is_host_char(haystack[end]));
        if bounded {
            out.extend_from_slice(&haystack[i..idx]);
            out.extend_from_slice(replacement);
            i = end;
            changed = true;
        } else {
            // step one byte so overlapping candidates are still checked
            out.extend_from_slice(&haystack[i..=idx]);
            i = idx + 1;
        }
    }
    if !changed {
        return None;
    }
    out.extend_from_slice(&haystack[i..]);
    Some(out)
}

fn is_host_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b':')
}
