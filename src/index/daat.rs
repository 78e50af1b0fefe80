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

//! DAAT executor (component D): Boolean AND/OR and BM25 top-K over
//! per-term cursors, grounded on
//! `examples/original_source/HW2/engine/daat_ranker.py`.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::Path;

use crate::error::Result;

use super::codec::LexiconEntry;
use super::cursor::PostingsCursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    And,
    Or,
}

/// Opens one independent cursor per `(term, entry)`, sorted by ascending
/// `df` — shortest postings first, a monotone optimization that does not
/// change results (spec.md §4.11). Each cursor owns its own reader
/// (spec.md §5: "independent readers per query").
pub fn open_cursors(
    postings_path: &Path,
    mut terms: Vec<(String, LexiconEntry)>,
) -> Result<(Vec<String>, Vec<u32>, Vec<PostingsCursor>)> {
    terms.sort_by_key(|(_, entry)| entry.df);
    let mut names = Vec::with_capacity(terms.len());
    let mut dfs = Vec::with_capacity(terms.len());
    let mut cursors = Vec::with_capacity(terms.len());
    for (term, entry) in terms {
        dfs.push(entry.df);
        cursors.push(PostingsCursor::open(postings_path, entry)?);
        names.push(term);
    }
    Ok((names, dfs, cursors))
}

/// Boolean AND (spec.md §4.11): advances laggard cursors to `max(heads)`
/// until all agree, emitting the common docid.
pub fn boolean_and(cursors: &mut [PostingsCursor]) -> Result<Vec<u32>> {
    if cursors.is_empty() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    loop {
        let mut heads = Vec::with_capacity(cursors.len());
        for c in cursors.iter() {
            match c.docid() {
                Some(d) => heads.push(d),
                None => return Ok(out),
            }
        }
        let target = *heads.iter().max().unwrap();
        if heads.iter().all(|&h| h == target) {
            out.push(target);
            for c in cursors.iter_mut() {
                c.advance()?;
            }
        } else {
            for c in cursors.iter_mut() {
                if c.docid() != Some(target) {
                    c.next_ge(target)?;
                }
            }
        }
    }
}

/// Boolean OR (spec.md §4.11): multiway heap merge over cursor heads.
pub fn boolean_or(cursors: &mut [PostingsCursor]) -> Result<Vec<u32>> {
    let mut heap = BinaryHeap::new();
    for (i, c) in cursors.iter().enumerate() {
        if let Some(d) = c.docid() {
            heap.push(Reverse((d, i)));
        }
    }
    let mut out = Vec::new();
    while let Some(Reverse((d, _))) = heap.peek().copied() {
        let mut tied = Vec::new();
        while let Some(Reverse((hd, i))) = heap.peek().copied() {
            if hd != d {
                break;
            }
            heap.pop();
            tied.push(i);
        }
        out.push(d);
        for i in tied {
            if let Some(next) = cursors[i].advance()? {
                heap.push(Reverse((next, i)));
            }
        }
    }
    Ok(out)
}

/// BM25 idf: `log((N - df + 0.5)/(df + 0.5) + 1)` (spec.md §4.11).
fn bm25_idf(n: f64, df: f64) -> f64 {
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
}

/// Per-posting BM25 contribution (spec.md §4.11).
fn bm25_term(tf: f64, df: f64, dl: f64, n: f64, avgdl: f64, k1: f64, b: f64) -> f64 {
    let idf = bm25_idf(n, df);
    let denom = tf + k1 * (1.0 - b + b * (dl / avgdl));
    idf * (tf * (k1 + 1.0)) / denom
}

/// BM25 top-K over DAAT traversal (spec.md §4.11). `dfs[i]` must align
/// with `cursors[i]`. `doc_lengths` gives each docid's length; docids
/// missing or with zero length contribute nothing. Ties in score break by
/// ascending docid.
pub fn bm25_topk(
    cursors: &mut [PostingsCursor],
    dfs: &[u32],
    doc_lengths: &std::collections::BTreeMap<u32, u32>,
    topk: usize,
    k1: f64,
    b: f64,
    mode: Mode,
) -> Result<Vec<(u32, f64)>> {
    if cursors.is_empty() {
        return Ok(Vec::new());
    }
    let n = doc_lengths.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    let n_f = n as f64;
    let avgdl = doc_lengths.values().map(|&l| l as f64).sum::<f64>() / n_f;

    let mut heap = BinaryHeap::new();
    for (i, c) in cursors.iter().enumerate() {
        if let Some(d) = c.docid() {
            heap.push(Reverse((d, i)));
        }
    }

    let mut scores: std::collections::HashMap<u32, f64> = std::collections::HashMap::new();

    while let Some(Reverse((d, _))) = heap.peek().copied() {
        let mut tied = Vec::new();
        while let Some(Reverse((hd, i))) = heap.peek().copied() {
            if hd != d {
                break;
            }
            heap.pop();
            tied.push(i);
        }

        if mode == Mode::And && tied.len() < cursors.len() {
            for &i in &tied {
                if let Some(next) = cursors[i].advance()? {
                    heap.push(Reverse((next, i)));
                }
            }
            continue;
        }

        if let Some(&dl) = doc_lengths.get(&d) {
            if dl > 0 {
                let entry = scores.entry(d).or_insert(0.0);
                for &i in &tied {
                    if let Some(tf) = cursors[i].freq() {
                        *entry += bm25_term(tf as f64, dfs[i] as f64, dl as f64, n_f, avgdl, k1, b);
                    }
                }
            }
        }

        for &i in &tied {
            if let Some(next) = cursors[i].advance()? {
                heap.push(Reverse((next, i)));
            }
        }
    }

    let mut results: Vec<(u32, f64)> = scores.into_iter().collect();
    results.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    results.truncate(topk);
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Codec;
    use crate::index::codec::PostingsWriter;
    use std::collections::BTreeMap;

    fn build_term(path: &std::path::Path, docs: &[(u32, u32)], block_size: usize) -> LexiconEntry {
        let mut writer = PostingsWriter::create(path, block_size, Codec::VarByte).unwrap();
        let postings: BTreeMap<u32, u32> = docs.iter().copied().collect();
        let entry = writer.add_term(&postings).unwrap();
        writer.finish().unwrap();
        entry
    }

    #[test]
    fn boolean_and_matches_naive_intersection() {
        let dir = tempfile::tempdir().unwrap();
        let path_a = dir.path().join("a.bin");
        let path_b = dir.path().join("b.bin");
        let entry_a = build_term(&path_a, &[(1, 1), (2, 1), (3, 1), (5, 1)], 2);
        let entry_b = build_term(&path_b, &[(2, 1), (3, 1), (4, 1)], 2);

        let mut cursors = vec![
            PostingsCursor::open(&path_a, entry_a).unwrap(),
            PostingsCursor::open(&path_b, entry_b).unwrap(),
        ];
        let result = boolean_and(&mut cursors).unwrap();
        assert_eq!(result, vec![2, 3]);
    }

    #[test]
    fn boolean_or_matches_naive_union() {
        let dir = tempfile::tempdir().unwrap();
        let path_a = dir.path().join("a.bin");
        let path_b = dir.path().join("b.bin");
        let entry_a = build_term(&path_a, &[(1, 1), (3, 1)], 2);
        let entry_b = build_term(&path_b, &[(2, 1), (3, 1), (4, 1)], 2);

        let mut cursors = vec![
            PostingsCursor::open(&path_a, entry_a).unwrap(),
            PostingsCursor::open(&path_b, entry_b).unwrap(),
        ];
        let result = boolean_or(&mut cursors).unwrap();
        assert_eq!(result, vec![1, 2, 3, 4]);
    }

    #[test]
    fn bm25_topk_orders_by_score_descending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.bin");
        let entry = build_term(&path, &[(1, 1), (2, 5), (3, 2)], 8);
        let mut cursors = vec![PostingsCursor::open(&path, entry).unwrap()];
        let mut lengths = BTreeMap::new();
        lengths.insert(1, 10);
        lengths.insert(2, 10);
        lengths.insert(3, 10);

        let results = bm25_topk(&mut cursors, &[3], &lengths, 10, 1.2, 0.75, Mode::Or).unwrap();
        assert_eq!(results[0].0, 2);
        assert!(results[0].1 >= results[1].1);
    }
}
