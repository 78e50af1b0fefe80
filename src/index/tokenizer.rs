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

//! Tokenizer (component P half), grounded on
//! `examples/original_source/HW2/engine/parser.py`'s `tokenize`: repair
//! mojibake, unescape HTML entities, lowercase, then split on the
//! `[a-z0-9]+([.-][a-z0-9]+)*` pattern so things like `u.s.` or `3.14`
//! survive as one token (spec.md §3 "Token").

use once_cell::sync::Lazy;
use regex::Regex;

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-z0-9]+(?:[.-][a-z0-9]+)*").expect("static token regex"));

/// Repairs the common "mojibake" pattern where UTF-8 bytes were decoded as
/// Latin-1/Windows-1252 and re-encoded as UTF-8 (e.g. `Ã©` for `é`): if
/// reinterpreting each character's code point as a single byte and
/// re-decoding as UTF-8 succeeds, the repaired text is used; otherwise the
/// input is returned unchanged.
fn repair_mojibake(text: &str) -> String {
    if text.is_ascii() {
        return text.to_string();
    }
    let mut bytes = Vec::with_capacity(text.len());
    for ch in text.chars() {
        let cp = ch as u32;
        if cp > 0xFF {
            return text.to_string();
        }
        bytes.push(cp as u8);
    }
    match String::from_utf8(bytes) {
        Ok(repaired) if repaired.chars().count() < text.chars().count() => repaired,
        _ => text.to_string(),
    }
}

/// Cleans and tokenizes `text`: mojibake-repair, HTML-entity unescape,
/// case-fold, then the tokenization regex. Returns an empty list if no
/// token survives (spec.md §4.6).
pub fn tokenize(text: &str) -> Vec<String> {
    let unescaped = htmlescape::decode_html(text).unwrap_or_else(|_| text.to_string());
    let repaired = repair_mojibake(&unescaped);
    let lowered = repaired.to_lowercase();
    TOKEN_RE
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}
