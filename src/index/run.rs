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

//! Sorted run writer/reader (components RW/RR), grounded on
//! `examples/original_source/HW2/engine/runio.py` and `listio.py` for the
//! block-of-bytes framing, generalized to the text/binary duality spec.md
//! §3/§4.7/§9 describes ("Run format duality").

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

use super::shard::ShardPostings;

pub const BINARY_MAGIC: &[u8; 4] = b"RUN1";

/// Writes `postings` as line-oriented text: `term\tdocid\ttf` per line, in
/// strict `(term asc, docid asc)` order (spec.md §4.7).
pub fn write_text_run(path: &Path, postings: &ShardPostings) -> Result<()> {
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);
    for (term, docs) in postings {
        for (&docid, &tf) in docs {
            writeln!(w, "{term}\t{docid}\t{tf}")?;
        }
    }
    w.flush()?;
    Ok(())
}

/// Writes `postings` in the binary framed form: magic, then per-term
/// groups `[u32 term_len][term][u32 n][u32×n docids][u32×n freqs]`
/// (spec.md §3 "Run record").
pub fn write_binary_run(path: &Path, postings: &ShardPostings) -> Result<()> {
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);
    w.write_all(BINARY_MAGIC)?;
    for (term, docs) in postings {
        let term_bytes = term.as_bytes();
        w.write_u32::<LittleEndian>(term_bytes.len() as u32)?;
        w.write_all(term_bytes)?;
        w.write_u32::<LittleEndian>(docs.len() as u32)?;
        for &docid in docs.keys() {
            w.write_u32::<LittleEndian>(docid)?;
        }
        for &tf in docs.values() {
            w.write_u32::<LittleEndian>(tf)?;
        }
    }
    w.flush()?;
    Ok(())
}

enum Source {
    Text(BufReader<File>),
    Binary(BufReader<File>),
}

/// Lazily yields `(term, docid, tf)` triples from a run file, regardless of
/// which on-disk form it was written in — auto-detected by the 4-byte
/// magic (spec.md §9 "Run format duality").
pub struct RunReader {
    source: Source,
    pending: std::collections::VecDeque<(String, u32, u32)>,
}

impl RunReader {
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut magic = [0u8; 4];
        let n = file.read(&mut magic)?;

        let source = if n == 4 && &magic == BINARY_MAGIC {
            Source::Binary(BufReader::new(file))
        } else {
            // Not binary: rewind and treat as text.
            use std::io::{Seek, SeekFrom};
            file.seek(SeekFrom::Start(0))?;
            Source::Text(BufReader::new(file))
        };

        Ok(Self {
            source,
            pending: std::collections::VecDeque::new(),
        })
    }

    fn fill_from_binary(reader: &mut BufReader<File>) -> Result<Option<(String, Vec<u32>, Vec<u32>)>> {
        let term_len = match reader.read_u32::<LittleEndian>() {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        };
        let mut term_buf = vec![0u8; term_len as usize];
        reader
            .read_exact(&mut term_buf)
            .map_err(|_| Error::IndexCorruption("truncated run: term bytes".into()))?;
        let term = String::from_utf8(term_buf)
            .map_err(|_| Error::IndexCorruption("run term is not valid utf-8".into()))?;
        let n = reader
            .read_u32::<LittleEndian>()
            .map_err(|_| Error::IndexCorruption("truncated run: group count".into()))?;
        let mut docids = Vec::with_capacity(n as usize);
        for _ in 0..n {
            docids.push(
                reader
                    .read_u32::<LittleEndian>()
                    .map_err(|_| Error::IndexCorruption("truncated run: docids".into()))?,
            );
        }
        let mut freqs = Vec::with_capacity(n as usize);
        for _ in 0..n {
            freqs.push(
                reader
                    .read_u32::<LittleEndian>()
                    .map_err(|_| Error::IndexCorruption("truncated run: freqs".into()))?,
            );
        }
        Ok(Some((term, docids, freqs)))
    }
}

impl Iterator for RunReader {
    type Item = Result<(String, u32, u32)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(triple) = self.pending.pop_front() {
                return Some(Ok(triple));
            }

            match &mut self.source {
                Source::Text(reader) => {
                    let mut line = String::new();
                    match reader.read_line(&mut line) {
                        Ok(0) => return None,
                        Ok(_) => {
                            let line = line.trim_end_matches('\n');
                            if line.is_empty() {
                                continue;
                            }
                            let mut parts = line.split('\t');
                            let (Some(term), Some(docid_s), Some(tf_s)) =
                                (parts.next(), parts.next(), parts.next())
                            else {
                                return Some(Err(Error::IndexCorruption(
                                    "malformed text run line".into(),
                                )));
                            };
                            let docid: u32 = match docid_s.parse() {
                                Ok(v) => v,
                                Err(_) => {
                                    return Some(Err(Error::IndexCorruption(
                                        "bad docid in text run".into(),
                                    )))
                                }
                            };
                            let tf: u32 = match tf_s.parse() {
                                Ok(v) => v,
                                Err(_) => {
                                    return Some(Err(Error::IndexCorruption(
                                        "bad tf in text run".into(),
                                    )))
                                }
                            };
                            return Some(Ok((term.to_string(), docid, tf)));
                        }
                        Err(e) => return Some(Err(Error::Io(e))),
                    }
                }
                Source::Binary(reader) => match Self::fill_from_binary(reader) {
                    Ok(Some((term, docids, freqs))) => {
                        for (docid, tf) in docids.into_iter().zip(freqs) {
                            self.pending.push_back((term.clone(), docid, tf));
                        }
                        continue;
                    }
                    Ok(None) => return None,
                    Err(e) => return Some(Err(e)),
                },
            }
        }
    }
}
