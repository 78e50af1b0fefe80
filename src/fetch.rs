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

//! Single-request HTTP fetcher (component F).
//!
//! Grounded on stract's crawler worker (`examples/StractOrg-stract/core/src/crawler/worker.rs`)
//! for the overall "one GET, gate on content-type, return a structured
//! result" shape, adapted to `reqwest::blocking` since the crawler's
//! concurrency model here is OS threads rather than tokio tasks
//! (see DESIGN.md).

use std::time::Duration;

use mime::Mime;

use crate::error::fetch_error_tag;

/// The union of "HTTP status" and "error tag", per spec.md §4.2 and §9.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    Http(u16),
    Error(String),
}

impl FetchStatus {
    pub fn is_error_ge(&self, threshold: u16) -> bool {
        matches!(self, FetchStatus::Http(code) if *code >= threshold)
    }

    pub fn as_csv_field(&self) -> String {
        match self {
            FetchStatus::Http(code) => code.to_string(),
            FetchStatus::Error(kind) => kind.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchResult {
    pub final_url: String,
    pub status: FetchStatus,
    pub body: Option<String>,
}

impl FetchResult {
    pub fn size_bytes(&self) -> usize {
        self.body.as_ref().map(|b| b.len()).unwrap_or(0)
    }
}

pub struct Fetcher {
    client: reqwest::blocking::Client,
}

impl Fetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> crate::error::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent.to_string())
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }

    /// Fetches `url`, following redirects transparently. Reads the body
    /// only when the response `Content-Type` parses to `text/html`;
    /// otherwise `body` is `None`. Never returns `Err` — network failures
    /// are folded into `FetchStatus::Error`, per spec.md §4.2/§7.
    pub fn fetch(&self, url: &str) -> FetchResult {
        match self.client.get(url).send() {
            Ok(resp) => {
                let final_url = resp.url().to_string();
                let status = resp.status().as_u16();
                let content_type = resp
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<Mime>().ok());
                let is_html = content_type
                    .map(|m| m.type_() == mime::TEXT && m.subtype() == mime::HTML)
                    .unwrap_or(false);

                let body = if is_html {
                    resp.text().ok()
                } else {
                    None
                };

                FetchResult {
                    final_url,
                    status: FetchStatus::Http(status),
                    body,
                }
            }
            Err(err) => FetchResult {
                final_url: url.to_string(),
                status: FetchStatus::Error(fetch_error_tag(&err)),
                body: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_csv_rendering() {
        assert_eq!(FetchStatus::Http(200).as_csv_field(), "200");
        assert_eq!(
            FetchStatus::Error("error:timeout".into()).as_csv_field(),
            "error:timeout"
        );
    }

    #[test]
    fn is_error_ge_threshold() {
        assert!(FetchStatus::Http(404).is_error_ge(400));
        assert!(!FetchStatus::Http(200).is_error_ge(400));
        assert!(!FetchStatus::Error("error:timeout".into()).is_error_ge(400));
    }
}
