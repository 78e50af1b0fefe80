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

//! Searcher (component S), grounded on
//! `examples/original_source/HW2/engine/searcher.py`, wiring the lexicon,
//! postings reader, and doc-length table together behind the two query
//! operations spec.md §4.12 and §6 describe.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::config::Bm25Config;
use crate::error::Result;
use crate::index::tokenizer::tokenize;

use super::codec::{read_lexicon, Lexicon};
use super::daat::{self, Mode};
use super::doclengths::{read_doc_lengths, DocLengths};

/// Loads the lexicon at construction, keeps the postings file path to open
/// independent readers per query, and optionally loads doc lengths — BM25
/// is unavailable without them (spec.md §4.12, §4.11).
pub struct Searcher {
    lexicon: Lexicon,
    postings_path: PathBuf,
    doc_lengths: Option<DocLengths>,
}

impl Searcher {
    pub fn open(postings_path: &Path, lexicon_path: &Path, doc_lengths_path: Option<&Path>) -> Result<Self> {
        let lexicon = read_lexicon(lexicon_path)?;
        let doc_lengths = match doc_lengths_path {
            Some(p) if p.exists() => Some(read_doc_lengths(p)?),
            _ => None,
        };
        Ok(Self {
            lexicon,
            postings_path: postings_path.to_path_buf(),
            doc_lengths,
        })
    }

    fn mode_of(mode: &str) -> Mode {
        if mode.eq_ignore_ascii_case("and") {
            Mode::And
        } else {
            Mode::Or
        }
    }

    /// Terms from `query` that are present in the lexicon, with their
    /// entries, unknown terms silently dropped (spec.md §7 "Searcher:
    /// unknown terms are silently dropped").
    fn known_terms(&self, query: &str) -> Vec<(String, super::codec::LexiconEntry)> {
        tokenize(query)
            .into_iter()
            .filter_map(|term| self.lexicon.get(&term).map(|e| (term, e.clone())))
            .collect()
    }

    /// `search_boolean(query, mode)` (spec.md §4.12).
    pub fn search_boolean(&self, query: &str, mode: &str) -> Result<BTreeSet<u32>> {
        let terms = self.known_terms(query);
        if terms.is_empty() {
            return Ok(BTreeSet::new());
        }
        let (_, _, mut cursors) = daat::open_cursors(&self.postings_path, terms)?;
        let docids = match Self::mode_of(mode) {
            Mode::And => daat::boolean_and(&mut cursors)?,
            Mode::Or => daat::boolean_or(&mut cursors)?,
        };
        Ok(docids.into_iter().collect())
    }

    /// `search_bm25(query, topk, mode)` (spec.md §4.12). Returns empty if
    /// doc lengths were never loaded.
    pub fn search_bm25(
        &self,
        query: &str,
        topk: usize,
        mode: &str,
        config: &Bm25Config,
    ) -> Result<Vec<(u32, f64)>> {
        let Some(doc_lengths) = &self.doc_lengths else {
            return Ok(Vec::new());
        };
        let terms = self.known_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let (_, dfs, mut cursors) = daat::open_cursors(&self.postings_path, terms)?;
        daat::bm25_topk(
            &mut cursors,
            &dfs,
            doc_lengths,
            topk,
            config.k1,
            config.b,
            Self::mode_of(mode),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Codec;
    use crate::index::codec::PostingsWriter;
    use crate::index::doclengths::write_doc_lengths;
    use std::collections::BTreeMap;

    fn setup() -> (tempfile::TempDir, PathBuf, PathBuf, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let postings_path = dir.path().join("postings.bin");
        let lexicon_path = dir.path().join("lexicon.bin");
        let lengths_path = dir.path().join("lengths.bin");

        let mut writer = PostingsWriter::create(&postings_path, 4, Codec::VarByte).unwrap();
        let mut lexicon: Lexicon = Lexicon::new();
        let cat: BTreeMap<u32, u32> = [(1, 2), (2, 1)].into_iter().collect();
        let dog: BTreeMap<u32, u32> = [(2, 3), (3, 1)].into_iter().collect();
        lexicon.insert("cat".to_string(), writer.add_term(&cat).unwrap());
        lexicon.insert("dog".to_string(), writer.add_term(&dog).unwrap());
        writer.finish().unwrap();
        super::super::codec::write_lexicon(&lexicon_path, &lexicon).unwrap();

        let mut lengths = DocLengths::new();
        lengths.insert(1, 5);
        lengths.insert(2, 8);
        lengths.insert(3, 4);
        write_doc_lengths(&lengths_path, &lengths).unwrap();

        (dir, postings_path, lexicon_path, lengths_path)
    }

    #[test]
    fn boolean_and_intersects_known_terms() {
        let (_dir, postings, lexicon, lengths) = setup();
        let searcher = Searcher::open(&postings, &lexicon, Some(&lengths)).unwrap();
        let result = searcher.search_boolean("cat dog", "AND").unwrap();
        assert_eq!(result, BTreeSet::from([2]));
    }

    #[test]
    fn boolean_or_unions_known_terms() {
        let (_dir, postings, lexicon, lengths) = setup();
        let searcher = Searcher::open(&postings, &lexicon, Some(&lengths)).unwrap();
        let result = searcher.search_boolean("cat dog", "OR").unwrap();
        assert_eq!(result, BTreeSet::from([1, 2, 3]));
    }

    #[test]
    fn unknown_terms_yield_empty_results() {
        let (_dir, postings, lexicon, lengths) = setup();
        let searcher = Searcher::open(&postings, &lexicon, Some(&lengths)).unwrap();
        let result = searcher.search_boolean("zzz", "OR").unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn bm25_unavailable_without_doc_lengths() {
        let (_dir, postings, lexicon, _lengths) = setup();
        let searcher = Searcher::open(&postings, &lexicon, None).unwrap();
        let result = searcher
            .search_bm25("cat", 10, "OR", &Bm25Config::default())
            .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn bm25_ranks_matching_docs() {
        let (_dir, postings, lexicon, lengths) = setup();
        let searcher = Searcher::open(&postings, &lexicon, Some(&lengths)).unwrap();
        let result = searcher
            .search_bm25("cat dog", 10, "OR", &Bm25Config::default())
            .unwrap();
        assert!(!result.is_empty());
        assert!(result.windows(2).all(|w| w[0].1 >= w[1].1));
    }
}
