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

//! Blocked postings codec + lexicon (component BC), grounded on
//! `examples/original_source/HW2/engine/listio.py`'s `ListWriter`/`ListReader`
//! block framing, generalized to the raw/VarByte codec choice in spec.md
//! §3/§4.9.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::config::Codec;
use crate::error::{Error, Result};

/// Per-block directory entry (spec.md §3 "Lexicon entry").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockMeta {
    pub offset: u64,
    pub count: u32,
    pub doc_bytes: u32,
    pub freq_bytes: u32,
    pub last_docid: u32,
}

/// Per-term lexicon entry with block directory (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexiconEntry {
    pub start_offset: u64,
    pub df: u32,
    pub nblocks: u32,
    pub codec: Codec,
    pub blocks: Vec<BlockMeta>,
}

pub type Lexicon = BTreeMap<String, LexiconEntry>;

fn varbyte_encode(mut value: u32, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte | 0x80);
            return;
        }
        out.push(byte);
    }
}

fn varbyte_decode(bytes: &[u8], pos: &mut usize) -> Result<u32> {
    let mut value: u32 = 0;
    let mut shift = 0u32;
    loop {
        let byte = *bytes
            .get(*pos)
            .ok_or_else(|| Error::IndexCorruption("truncated varbyte integer".into()))?;
        *pos += 1;
        value |= ((byte & 0x7F) as u32) << shift;
        if byte & 0x80 != 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

fn encode_block(docids: &[u32], freqs: &[u32], baseline: u32, codec: Codec) -> (Vec<u8>, Vec<u8>) {
    match codec {
        Codec::Raw => {
            let mut doc_bytes = Vec::with_capacity(4 * docids.len());
            for &d in docids {
                doc_bytes.extend_from_slice(&d.to_le_bytes());
            }
            let mut freq_bytes = Vec::with_capacity(4 * freqs.len());
            for &f in freqs {
                freq_bytes.extend_from_slice(&f.to_le_bytes());
            }
            (doc_bytes, freq_bytes)
        }
        Codec::VarByte => {
            let mut doc_bytes = Vec::new();
            let mut prev = baseline;
            for &d in docids {
                varbyte_encode(d - prev, &mut doc_bytes);
                prev = d;
            }
            let mut freq_bytes = Vec::new();
            for &f in freqs {
                varbyte_encode(f, &mut freq_bytes);
            }
            (doc_bytes, freq_bytes)
        }
    }
}

fn decode_block(
    doc_bytes: &[u8],
    freq_bytes: &[u8],
    count: u32,
    baseline: u32,
    codec: Codec,
) -> Result<(Vec<u32>, Vec<u32>)> {
    match codec {
        Codec::Raw => {
            if doc_bytes.len() != 4 * count as usize || freq_bytes.len() != 4 * count as usize {
                return Err(Error::IndexCorruption(
                    "raw block byte length mismatch".into(),
                ));
            }
            let mut docids = Vec::with_capacity(count as usize);
            let mut cursor = doc_bytes;
            for _ in 0..count {
                docids.push(cursor.read_u32::<LittleEndian>()?);
            }
            let mut freqs = Vec::with_capacity(count as usize);
            let mut cursor = freq_bytes;
            for _ in 0..count {
                freqs.push(cursor.read_u32::<LittleEndian>()?);
            }
            Ok((docids, freqs))
        }
        Codec::VarByte => {
            let mut docids = Vec::with_capacity(count as usize);
            let mut pos = 0usize;
            let mut prev = baseline;
            for _ in 0..count {
                let gap = varbyte_decode(doc_bytes, &mut pos)?;
                prev += gap;
                docids.push(prev);
            }
            if pos != doc_bytes.len() {
                return Err(Error::IndexCorruption(
                    "varbyte docid bytes did not consume exactly doc_bytes".into(),
                ));
            }
            let mut freqs = Vec::with_capacity(count as usize);
            let mut pos = 0usize;
            for _ in 0..count {
                freqs.push(varbyte_decode(freq_bytes, &mut pos)?);
            }
            if pos != freq_bytes.len() {
                return Err(Error::IndexCorruption(
                    "varbyte freq bytes did not consume exactly freq_bytes".into(),
                ));
            }
            Ok((docids, freqs))
        }
    }
}

/// Appends one term's blocked postings to the postings file, returning its
/// lexicon entry (spec.md §4.9 "Writer contract").
pub struct PostingsWriter {
    file: BufWriter<File>,
    offset: u64,
    block_size: usize,
    codec: Codec,
}

impl PostingsWriter {
    pub fn create(path: &Path, block_size: usize, codec: Codec) -> Result<Self> {
        Ok(Self {
            file: BufWriter::new(File::create(path)?),
            offset: 0,
            block_size,
            codec,
        })
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.file.write_all(bytes)?;
        self.offset += bytes.len() as u64;
        Ok(())
    }

    pub fn add_term(&mut self, postings: &BTreeMap<u32, u32>) -> Result<LexiconEntry> {
        let docids: Vec<u32> = postings.keys().copied().collect();
        let freqs: Vec<u32> = postings.values().copied().collect();

        let start_offset = self.offset;
        let mut blocks = Vec::new();
        let mut baseline = 0u32;

        let mut i = 0;
        while i < docids.len() {
            let end = (i + self.block_size).min(docids.len());
            let chunk_docids = &docids[i..end];
            let chunk_freqs = &freqs[i..end];
            let last_docid = *chunk_docids.last().unwrap();
            let (doc_bytes, freq_bytes) = encode_block(chunk_docids, chunk_freqs, baseline, self.codec);

            let block_offset = self.offset;
            self.write_all(&(chunk_docids.len() as u32).to_le_bytes())?;
            self.write_all(&last_docid.to_le_bytes())?;
            self.write_all(&(doc_bytes.len() as u32).to_le_bytes())?;
            self.write_all(&(freq_bytes.len() as u32).to_le_bytes())?;
            self.write_all(&doc_bytes)?;
            self.write_all(&freq_bytes)?;

            blocks.push(BlockMeta {
                offset: block_offset,
                count: chunk_docids.len() as u32,
                doc_bytes: doc_bytes.len() as u32,
                freq_bytes: freq_bytes.len() as u32,
                last_docid,
            });

            baseline = last_docid;
            i = end;
        }

        Ok(LexiconEntry {
            start_offset,
            df: docids.len() as u32,
            nblocks: blocks.len() as u32,
            codec: self.codec,
            blocks,
        })
    }

    pub fn finish(mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}

const BLOCK_HEADER_LEN: u64 = 16; // n, last_docid, doc_bytes, freq_bytes, each u32

/// Opens the postings file read-only for a single query; the searcher
/// hands each query its own reader rather than serializing access to one
/// shared handle (spec.md §5 "Shared-resource policy", implementer's
/// choice — see DESIGN.md).
pub struct PostingsReader {
    file: File,
}

impl PostingsReader {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            file: File::open(path)?,
        })
    }

    fn read_block_at(
        &mut self,
        meta: &BlockMeta,
        baseline: u32,
        codec: Codec,
    ) -> Result<(Vec<u32>, Vec<u32>)> {
        self.file.seek(SeekFrom::Start(meta.offset))?;
        let n = self.file.read_u32::<LittleEndian>()?;
        let last_docid = self.file.read_u32::<LittleEndian>()?;
        let doc_bytes_len = self.file.read_u32::<LittleEndian>()?;
        let freq_bytes_len = self.file.read_u32::<LittleEndian>()?;

        if n != meta.count || last_docid != meta.last_docid {
            return Err(Error::IndexCorruption(
                "block header does not match lexicon directory".into(),
            ));
        }
        if doc_bytes_len != meta.doc_bytes || freq_bytes_len != meta.freq_bytes {
            return Err(Error::IndexCorruption(
                "block doc_bytes/freq_bytes mismatch".into(),
            ));
        }

        let mut doc_bytes = vec![0u8; doc_bytes_len as usize];
        self.file
            .read_exact(&mut doc_bytes)
            .map_err(|_| Error::IndexCorruption("truncated postings file: docids".into()))?;
        let mut freq_bytes = vec![0u8; freq_bytes_len as usize];
        self.file
            .read_exact(&mut freq_bytes)
            .map_err(|_| Error::IndexCorruption("truncated postings file: freqs".into()))?;

        decode_block(&doc_bytes, &freq_bytes, n, baseline, codec)
    }

    fn baseline_for(entry: &LexiconEntry, index: usize) -> u32 {
        if index == 0 {
            0
        } else {
            entry.blocks[index - 1].last_docid
        }
    }

    /// Returns the full decoded postings for `entry` (spec.md §4.9).
    pub fn read_postings(&mut self, entry: &LexiconEntry) -> Result<(Vec<u32>, Vec<u32>)> {
        let mut docids = Vec::with_capacity(entry.df as usize);
        let mut freqs = Vec::with_capacity(entry.df as usize);
        for (i, meta) in entry.blocks.iter().enumerate() {
            let baseline = Self::baseline_for(entry, i);
            let (d, f) = self.read_block_at(meta, baseline, entry.codec)?;
            docids.extend(d);
            freqs.extend(f);
        }
        Ok((docids, freqs))
    }

    /// Loads block `index` directly (spec.md §4.10 cursor block loading).
    pub fn load_block(&mut self, entry: &LexiconEntry, index: usize) -> Result<(u32, Vec<u32>, Vec<u32>)> {
        let meta = entry
            .blocks
            .get(index)
            .ok_or_else(|| Error::IndexCorruption("block index out of range".into()))?;
        let baseline = Self::baseline_for(entry, index);
        let (d, f) = self.read_block_at(meta, baseline, entry.codec)?;
        Ok((meta.last_docid, d, f))
    }

    /// Streams every block of `entry` in order as `(last_docid, docids,
    /// freqs)` (spec.md §4.9 Reader contract `iter_blocks`). `read_postings`
    /// stays a direct loop rather than folding this iterator, to avoid an
    /// extra `Vec` concatenation per call; this exists for callers that
    /// want to stop early or process one block at a time.
    pub fn iter_blocks<'a>(
        &'a mut self,
        entry: &'a LexiconEntry,
    ) -> impl Iterator<Item = Result<(u32, Vec<u32>, Vec<u32>)>> + 'a {
        let mut index = 0usize;
        std::iter::from_fn(move || {
            if index >= entry.blocks.len() {
                return None;
            }
            let result = self.load_block(entry, index);
            index += 1;
            Some(result)
        })
    }

    /// Locates the first block with `last_docid >= target` via binary
    /// search on the block directory (spec.md §4.9 `seek_block_ge`).
    pub fn seek_block_ge(
        &mut self,
        entry: &LexiconEntry,
        target: i64,
    ) -> Result<Option<(usize, u32, Vec<u32>, Vec<u32>)>> {
        let blocks = &entry.blocks;
        if blocks.is_empty() {
            return Ok(None);
        }
        let idx = blocks.partition_point(|b| (b.last_docid as i64) < target);
        if idx >= blocks.len() {
            return Ok(None);
        }
        let (last_docid, d, f) = self.load_block(entry, idx)?;
        Ok(Some((idx, last_docid, d, f)))
    }
}

/// Serializes the lexicon map to `path` (bincode, spec.md §6 "Lexicon file":
/// "format is an implementation detail, but must round-trip exactly").
pub fn write_lexicon(path: &Path, lexicon: &Lexicon) -> Result<()> {
    let file = File::create(path)?;
    bincode::serialize_into(BufWriter::new(file), lexicon)?;
    Ok(())
}

pub fn read_lexicon(path: &Path) -> Result<Lexicon> {
    let file = File::open(path)?;
    let lexicon = bincode::deserialize_from(std::io::BufReader::new(file))?;
    Ok(lexicon)
}

#[allow(dead_code)]
const _: u64 = BLOCK_HEADER_LEN;
