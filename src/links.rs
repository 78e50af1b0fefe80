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

//! HTML outbound link extraction (component L).
//!
//! Grounded on stract's HTML link handling
//! (`examples/StractOrg-stract/core/src/webpage/html/links.rs` and
//! `mod.rs`), which parses with `kuchiki` and resolves relative `href`s
//! against the page URL with `Url::join`. We add `<base href>` honoring,
//! which the teacher's simpler `links_tag` does not need since stract
//! never treats `<base>` specially.

use kuchiki::traits::TendrilSink;

const SKIPPED_SCHEMES: &[&str] = &["mailto:", "javascript:", "tel:", "ftp:", "file:", "data:", "blob:"];

/// Parses one HTML document and returns its absolute, canonicalized
/// outbound links, honoring the first `<base href>` only (spec.md §4.4).
pub fn extract_links(html: &str, fetched_url: &str) -> Vec<String> {
    let root = kuchiki::parse_html().one(html);

    let base = effective_base(&root, fetched_url);

    let mut links = Vec::new();
    let Ok(anchors) = root.select("a") else {
        return links;
    };

    for node in anchors {
        let attrs = node.attributes.borrow();
        let Some(href) = attrs.get("href") else {
            continue;
        };
        let href = href.trim();

        if href.is_empty() || href.starts_with('#') {
            continue;
        }
        let lowered = href.to_ascii_lowercase();
        if SKIPPED_SCHEMES.iter().any(|s| lowered.starts_with(s)) {
            continue;
        }

        let Ok(resolved) = resolve(&base, href) else {
            continue;
        };

        if let Ok(canonical) = crate::url::canonicalize(resolved.as_str()) {
            links.push(canonical);
        }
    }

    links
}

fn effective_base(root: &kuchiki::NodeRef, fetched_url: &str) -> url::Url {
    let initial = url::Url::parse(fetched_url).unwrap_or_else(|_| {
        // Fallback keeps the extractor infallible; malformed fetched URLs
        // never reach here in practice since the crawler only fetches
        // already-canonicalized URLs.
        url::Url::parse("http://invalid.invalid/").unwrap()
    });

    let Ok(mut bases) = root.select("base") else {
        return initial;
    };

    let Some(first) = bases.next() else {
        return initial;
    };

    let attrs = first.attributes.borrow();
    match attrs.get("href") {
        Some(href) => resolve(&initial, href).unwrap_or(initial),
        None => initial,
    }
}

fn resolve(base: &url::Url, href: &str) -> Result<url::Url, url::ParseError> {
    match url::Url::parse(href) {
        Ok(absolute) => Ok(absolute),
        Err(_) => base.join(href),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_absolute_links() {
        let html = r#"<html><body><a href="/b.html">b</a><a href="https://other.com/c">c</a></body></html>"#;
        let links = extract_links(html, "https://example.com/a");
        assert_eq!(
            links,
            vec![
                "https://example.com/b.html".to_string(),
                "https://other.com/c".to_string()
            ]
        );
    }

    #[test]
    fn skips_non_crawlable_schemes_and_fragments() {
        let html = r#"<html><body>
            <a href="#top">top</a>
            <a href="mailto:a@b.com">mail</a>
            <a href="javascript:void(0)">js</a>
            <a href="tel:12345">tel</a>
        </body></html>"#;
        let links = extract_links(html, "https://example.com/");
        assert!(links.is_empty());
    }

    #[test]
    fn honors_first_base_href_only() {
        let html = r#"<html><head>
            <base href="https://cdn.example.com/assets/">
            <base href="https://ignored.example.com/">
        </head><body><a href="img.png">i</a></body></html>"#;
        let links = extract_links(html, "https://example.com/page");
        assert_eq!(links, vec!["https://cdn.example.com/assets/img.png".to_string()]);
    }
}
