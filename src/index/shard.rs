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

//! In-memory shard indexer (component I), grounded on
//! `examples/original_source/HW2/engine/indexer.py`'s per-batch term→docid→tf
//! accumulation.

use std::collections::BTreeMap;

/// `term -> (docid -> tf)`. A `BTreeMap` keeps terms and docids sorted,
/// which the run writer (RW) needs (spec.md §4.7 "Writer contract").
pub type ShardPostings = BTreeMap<String, BTreeMap<u32, u32>>;

/// Builds one shard's postings, summing `tf` for repeated tokens, and
/// records each document's length alongside it (spec.md §3 "Document").
pub fn build_shard<I>(docs: I) -> (ShardPostings, BTreeMap<u32, u32>)
where
    I: IntoIterator<Item = (u32, Vec<String>)>,
{
    let mut postings: ShardPostings = BTreeMap::new();
    let mut lengths = BTreeMap::new();

    for (docid, tokens) in docs {
        lengths.insert(docid, tokens.len() as u32);
        for token in tokens {
            *postings.entry(token).or_default().entry(docid).or_insert(0) += 1;
        }
    }

    (postings, lengths)
}
