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

//! Crate-wide error taxonomy.
//!
//! Mirrors the shape of the teacher's top-level `Error` enum: one flat
//! `thiserror` enum with `#[from]` leaves for the library errors we
//! compose, plus a handful of domain-specific variants named directly
//! after the taxonomy in the design doc.

use std::io;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("network timeout")]
    NetworkTimeout,

    #[error("dns resolution failed")]
    NetworkDns,

    #[error("tls/ssl error")]
    NetworkSsl,

    #[error("network error: {0}")]
    NetworkOther(String),

    #[error("http error: {0}")]
    HttpError(u16),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("robots policy unavailable, treating as allow-all")]
    RobotsUnavailable,

    #[error("index corruption: {0}")]
    IndexCorruption(String),

    #[error("invalid configuration: {0}")]
    ConfigError(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("url parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("http client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Classifies a [`reqwest::Error`] into the fetcher's status-tag taxonomy
/// (`error:timeout`, `error:dns`, `error:ssl`, `error:urlerror`, `error:<kind>`)
/// per spec.md §4.2.
pub fn fetch_error_tag(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        return "error:timeout".to_string();
    }
    if err.is_connect() {
        let msg = err.to_string().to_lowercase();
        if msg.contains("dns") || msg.contains("resolve") || msg.contains("lookup") {
            return "error:dns".to_string();
        }
    }
    let msg = err.to_string().to_lowercase();
    if msg.contains("ssl") || msg.contains("tls") || msg.contains("certificate") {
        return "error:ssl".to_string();
    }
    if err.is_request() || err.is_builder() {
        return "error:urlerror".to_string();
    }
    "error:other".to_string()
}
