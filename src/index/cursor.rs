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

//! Block-aware postings cursor (component PC), grounded on
//! `examples/original_source/HW2/engine/postings_cursor.py`'s `PostingsCursor`.

use std::path::Path;

use crate::error::Result;

use super::codec::{LexiconEntry, PostingsReader};

/// Steps through a single term's postings one block at a time, loading
/// blocks lazily from disk rather than materializing the full postings
/// list (spec.md §4.10 "Cursor"). Owns its reader so a query can hold one
/// independent cursor per term without fighting the borrow checker over a
/// shared reader (spec.md §5: "independent readers per query").
pub struct PostingsCursor {
    reader: PostingsReader,
    entry: LexiconEntry,
    block_index: i64,
    block_last: i64,
    docids: Vec<u32>,
    freqs: Vec<u32>,
    pos: usize,
    exhausted: bool,
}

impl PostingsCursor {
    /// Opens a fresh reader on `postings_path` and positions the cursor at
    /// the first block via `seek_block_ge(-1)` (spec.md §4.10 "Initial
    /// state").
    pub fn open(postings_path: &Path, entry: LexiconEntry) -> Result<Self> {
        Self::new(PostingsReader::open(postings_path)?, entry)
    }

    pub fn new(reader: PostingsReader, entry: LexiconEntry) -> Result<Self> {
        let mut cursor = Self {
            reader,
            entry,
            block_index: -1,
            block_last: -1,
            docids: Vec::new(),
            freqs: Vec::new(),
            pos: 0,
            exhausted: false,
        };
        if cursor.entry.df == 0 {
            cursor.exhausted = true;
            return Ok(cursor);
        }
        match cursor.reader.seek_block_ge(&cursor.entry, -1)? {
            None => cursor.exhausted = true,
            Some((idx, last_docid, docids, freqs)) => {
                cursor.block_index = idx as i64;
                cursor.block_last = last_docid as i64;
                cursor.docids = docids;
                cursor.freqs = freqs;
                cursor.pos = 0;
                if cursor.docids.is_empty() {
                    cursor.exhausted = true;
                }
            }
        }
        Ok(cursor)
    }

    fn load_block(&mut self, index: i64) -> Result<bool> {
        if index < 0 || index as usize >= self.entry.blocks.len() {
            return Ok(false);
        }
        let (last_docid, docids, freqs) = self.reader.load_block(&self.entry, index as usize)?;
        self.block_index = index;
        self.block_last = last_docid as i64;
        self.docids = docids;
        self.freqs = freqs;
        self.pos = 0;
        Ok(true)
    }

    /// Current docid, or `None` if exhausted (spec.md §4.10 `docid()`).
    pub fn docid(&self) -> Option<u32> {
        if self.exhausted || self.pos >= self.docids.len() {
            None
        } else {
            Some(self.docids[self.pos])
        }
    }

    /// Term frequency at the current position (spec.md §4.10 `freq()`).
    pub fn freq(&self) -> Option<u32> {
        if self.exhausted || self.pos >= self.freqs.len() {
            None
        } else {
            Some(self.freqs[self.pos])
        }
    }

    /// Moves to the next posting, loading the next block if needed
    /// (spec.md §4.10 `advance()`).
    pub fn advance(&mut self) -> Result<Option<u32>> {
        if self.exhausted {
            return Ok(None);
        }
        self.pos += 1;
        if self.pos < self.docids.len() {
            return Ok(Some(self.docids[self.pos]));
        }
        if !self.load_block(self.block_index + 1)? {
            self.exhausted = true;
            return Ok(None);
        }
        Ok(self.docids.first().copied())
    }

    /// Advances to the first posting with `docid >= target`, skipping
    /// whole blocks via the lexicon directory when possible (spec.md
    /// §4.10 `next_ge(target)`).
    pub fn next_ge(&mut self, target: u32) -> Result<Option<u32>> {
        if self.exhausted {
            return Ok(None);
        }

        if (target as i64) <= self.block_last {
            let j = self.docids[self.pos..].partition_point(|&d| d < target) + self.pos;
            if j < self.docids.len() {
                self.pos = j;
                return Ok(Some(self.docids[self.pos]));
            }
            if !self.load_block(self.block_index + 1)? {
                self.exhausted = true;
                return Ok(None);
            }
            if (target as i64) <= self.block_last {
                let j = self.docids.partition_point(|&d| d < target);
                if j < self.docids.len() {
                    self.pos = j;
                    return Ok(Some(self.docids[self.pos]));
                }
            }
        }

        match self.reader.seek_block_ge(&self.entry, target as i64)? {
            None => {
                self.exhausted = true;
                Ok(None)
            }
            Some((idx, last_docid, docids, freqs)) => {
                self.block_index = idx as i64;
                self.block_last = last_docid as i64;
                self.docids = docids;
                self.freqs = freqs;
                self.pos = self.docids.partition_point(|&d| d < target);
                if self.pos >= self.docids.len() {
                    if !self.load_block(self.block_index + 1)? {
                        self.exhausted = true;
                        return Ok(None);
                    }
                    self.pos = 0;
                }
                Ok(self.docids.get(self.pos).copied())
            }
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Codec;
    use crate::index::codec::PostingsWriter;
    use std::collections::BTreeMap;

    fn sample(n: usize) -> BTreeMap<u32, u32> {
        (0..n).map(|i| (i as u32 * 2, 1u32)).collect()
    }

    fn setup(block_size: usize) -> (tempfile::TempDir, LexiconEntry) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.bin");
        let mut writer = PostingsWriter::create(&path, block_size, Codec::VarByte).unwrap();
        let entry = writer.add_term(&sample(20)).unwrap();
        writer.finish().unwrap();
        (dir, entry)
    }

    #[test]
    fn walks_all_postings_in_order() {
        let (dir, entry) = setup(4);
        let mut cursor = PostingsCursor::open(&dir.path().join("p.bin"), entry).unwrap();

        let mut seen = Vec::new();
        while let Some(d) = cursor.docid() {
            seen.push(d);
            cursor.advance().unwrap();
        }
        let expected: Vec<u32> = (0..20).map(|i| i * 2).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn next_ge_skips_forward_across_blocks() {
        let (dir, entry) = setup(3);
        let mut cursor = PostingsCursor::open(&dir.path().join("p.bin"), entry).unwrap();

        let hit = cursor.next_ge(15).unwrap();
        assert_eq!(hit, Some(16));
        assert_eq!(cursor.docid(), Some(16));

        let hit = cursor.next_ge(1000).unwrap();
        assert_eq!(hit, None);
        assert!(cursor.is_exhausted());
    }
}
