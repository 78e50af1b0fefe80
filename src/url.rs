// siphon is a politeness-aware web crawler and disk-resident search index.
// Copyright (C) 2024 siphon contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! URL canonicalization and domain/superdomain extraction (component U).
//!
//! Grounded on stract's `webpage::url::Url` (`examples/StractOrg-stract/core/src/webpage/url.rs`)
//! for the general shape of a canonicalizing newtype, but built on the
//! `url` crate for parsing rather than stract's hand-rolled string surgery,
//! since we need scheme/host/port-aware canonicalization the distilled spec
//! spells out precisely (spec.md §3, §4.1).

use crate::error::{Error, Result};

const TRACKING_PREFIXES: &[&str] = &["utm_"];
const TRACKING_EXACT: &[&str] = &["fbclid", "gclid"];

const INDEX_FILENAMES: &[&str] = &["index.html", "index.htm", "index.jsp", "main.html"];

const BINARY_SUFFIXES: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg", ".ico", ".bmp", ".tiff", ".avif", ".pdf",
    ".zip", ".tar", ".gz", ".tgz", ".bz2", ".xz", ".rar", ".7z", ".mp3", ".wav", ".flac", ".mp4",
    ".avi", ".mov", ".mkv", ".webm", ".css", ".js", ".woff", ".woff2", ".ttf", ".eot",
];

/// Registrable-domain promotions: `<label>.uk` is promoted to three labels.
const UK_SECOND_LEVEL: &[&str] = &["co", "ac"];

fn is_tracking_key(key: &str) -> bool {
    TRACKING_PREFIXES.iter().any(|p| key.starts_with(p)) || TRACKING_EXACT.contains(&key)
}

/// Returns the canonical form of `url`, per spec.md §3:
/// lowercased scheme/host, default ports stripped, fragment removed,
/// tracking query keys removed, remaining keys sorted, common index
/// filenames collapsed to their directory, root-only path normalized to
/// empty.
pub fn canonicalize(raw: &str) -> Result<String> {
    let mut parsed =
        url::Url::parse(raw).map_err(|e| Error::ParseError(format!("bad url '{raw}': {e}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::ParseError(format!(
            "unsupported scheme in '{raw}'"
        )));
    }

    parsed.set_fragment(None);

    let scheme = parsed.scheme().to_ascii_lowercase();
    parsed
        .set_scheme(&scheme)
        .map_err(|_| Error::ParseError(format!("could not normalize scheme in '{raw}'")))?;

    if let Some(host) = parsed.host_str() {
        let lowered = host.to_ascii_lowercase();
        parsed
            .set_host(Some(&lowered))
            .map_err(|e| Error::ParseError(format!("bad host in '{raw}': {e}")))?;
    }

    let is_default_port = matches!(
        (parsed.scheme(), parsed.port()),
        ("http", Some(80)) | ("https", Some(443))
    );
    if is_default_port {
        parsed
            .set_port(None)
            .map_err(|_| Error::ParseError(format!("could not strip port in '{raw}'")))?;
    }

    let mut kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !is_tracking_key(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    kept.sort();

    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        let mut pairs = parsed.query_pairs_mut();
        pairs.clear();
        pairs.extend_pairs(kept.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        drop(pairs);
    }

    let collapsed_path = collapse_index_filename(parsed.path());
    parsed.set_path(&collapsed_path);

    let mut out = parsed.to_string();
    // `Url::to_string` always keeps a trailing "/" for root-only paths;
    // spec.md §3 asks for root-only paths normalized to empty.
    if let Some(stripped) = root_only_strip(&out, &parsed) {
        out = stripped;
    }

    Ok(out)
}

fn collapse_index_filename(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    let Some((dir, last)) = trimmed.rsplit_once('/') else {
        return path.to_string();
    };
    if INDEX_FILENAMES.contains(&last) {
        let mut dir = dir.to_string();
        dir.push('/');
        dir
    } else {
        path.to_string()
    }
}

fn root_only_strip(rendered: &str, parsed: &url::Url) -> Option<String> {
    if parsed.path() != "/" || parsed.query().is_some() {
        return None;
    }
    rendered.strip_suffix('/').map(|s| s.to_string())
}

/// Registrable domain (eTLD+1), with the `co.uk`/`ac.uk` three-label
/// promotion from spec.md §3. Empty host yields an empty string.
pub fn registrable_domain(url: &str) -> String {
    let host = host_of(url);
    let parts: Vec<&str> = host.split('.').filter(|p| !p.is_empty()).collect();
    if parts.len() < 2 {
        return host;
    }
    if parts[parts.len() - 1] == "uk" && UK_SECOND_LEVEL.contains(&parts[parts.len() - 2]) {
        if parts.len() >= 3 {
            return parts[parts.len() - 3..].join(".");
        }
        return parts.join(".");
    }
    parts[parts.len() - 2..].join(".")
}

/// Superdomain (final host label), per spec.md §3. Empty host yields an
/// empty string.
pub fn superdomain(url: &str) -> String {
    let host = host_of(url);
    host.split('.')
        .filter(|p| !p.is_empty())
        .next_back()
        .unwrap_or_default()
        .to_string()
}

fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        .unwrap_or_default()
}

/// True iff the lowercased path ends with a suffix from the fixed
/// binary-file suffix set (spec.md §4.1).
pub fn looks_binary(url: &str) -> bool {
    let path = url::Url::parse(url)
        .map(|u| u.path().to_ascii_lowercase())
        .unwrap_or_default();
    BINARY_SUFFIXES.iter().any(|ext| path.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_example_from_spec() {
        let got =
            canonicalize("HTTP://EXAMPLE.com:80/path/?utm_source=x&b=2&a=1").unwrap();
        assert_eq!(got, "http://example.com/path/?a=1&b=2");
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let once = canonicalize("HTTP://EXAMPLE.com:80/path/?utm_source=x&b=2&a=1").unwrap();
        let twice = canonicalize(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn strips_fragment() {
        let got = canonicalize("https://example.com/path#section").unwrap();
        assert_eq!(got, "https://example.com/path");
    }

    #[test]
    fn collapses_index_html() {
        let got = canonicalize("https://example.com/dir/index.html").unwrap();
        assert_eq!(got, "https://example.com/dir/");
    }

    #[test]
    fn root_path_is_empty() {
        let got = canonicalize("https://example.com/").unwrap();
        assert_eq!(got, "https://example.com");
    }

    #[test]
    fn domain_extraction_table() {
        let cases = [
            ("http://cs.nyu.edu/path", "nyu.edu", "edu"),
            ("https://www.guardian.co.uk/news", "guardian.co.uk", "uk"),
            ("http://bbc.co.uk", "bbc.co.uk", "uk"),
            ("http://ox.ac.uk", "ox.ac.uk", "uk"),
        ];
        for (url, domain, super_) in cases {
            assert_eq!(registrable_domain(url), domain, "domain for {url}");
            assert_eq!(superdomain(url), super_, "superdomain for {url}");
        }
    }

    #[test]
    fn binary_suffix_filter() {
        assert!(looks_binary("https://example.com/a.pdf"));
        assert!(!looks_binary("https://example.com/b.html"));
    }

    #[test]
    fn rejects_non_http_scheme() {
        assert!(canonicalize("mailto:test@example.com").is_err());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn url_strategy() -> impl Strategy<Value = String> {
        (
            prop::sample::select(vec!["http", "https"]),
            "[a-z]{3,8}",
            "[a-z]{2,4}",
            prop::collection::vec("[a-z]{1,6}", 0..3),
            prop::collection::vec(("[a-z]{1,5}", "[a-z0-9]{1,5}"), 0..3),
        )
            .prop_map(|(scheme, label, tld, segments, query)| {
                let mut url = format!("{scheme}://{label}.{tld}");
                for seg in &segments {
                    url.push('/');
                    url.push_str(seg);
                }
                if !query.is_empty() {
                    url.push('?');
                    url.push_str(
                        &query
                            .iter()
                            .map(|(k, v)| format!("{k}={v}"))
                            .collect::<Vec<_>>()
                            .join("&"),
                    );
                }
                url
            })
    }

    proptest! {
        #[test]
        fn canonicalize_is_idempotent_for_arbitrary_urls(raw in url_strategy()) {
            let once = canonicalize(&raw).unwrap();
            let twice = canonicalize(&once).unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}
