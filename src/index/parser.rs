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

//! TSV corpus parsing (component P), grounded on
//! `examples/original_source/HW2/engine/parser.py`'s `parse_line`/`iter_docs`.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::Result;

use super::tokenizer::tokenize;

/// Splits one TSV line on the first tab into `(docid, tokens)`. Returns
/// `None` if the line is malformed (no tab, non-integer docid) or
/// tokenizes to nothing (spec.md §4.6, §6 "Corpus file").
pub fn parse_line(line: &str) -> Option<(u32, Vec<String>)> {
    let line = line.trim_end_matches('\n');
    let (docid_str, text) = line.split_once('\t')?;
    let docid: u32 = docid_str.parse().ok()?;
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return None;
    }
    Some((docid, tokens))
}

/// Streams `(docid, tokens)` pairs from a TSV file without retaining the
/// corpus in memory (spec.md §4.6 `iter_docs`).
pub fn iter_docs(
    path: &Path,
    limit: Option<usize>,
) -> Result<impl Iterator<Item = (u32, Vec<String>)>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let iter = reader
        .lines()
        .map_while(std::result::Result::ok)
        .take(limit.unwrap_or(usize::MAX))
        .filter_map(|line| parse_line(&line));
    Ok(iter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_line() {
        let parsed = parse_line("42\thello world").unwrap();
        assert_eq!(parsed.0, 42);
        assert_eq!(parsed.1, vec!["hello", "world"]);
    }

    #[test]
    fn rejects_missing_tab() {
        assert!(parse_line("no tab here").is_none());
    }

    #[test]
    fn rejects_non_integer_docid() {
        assert!(parse_line("abc\thello").is_none());
    }

    #[test]
    fn drops_empty_token_lists() {
        assert!(parse_line("1\t!!! ...").is_none());
    }
}
