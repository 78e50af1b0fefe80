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

//! Document-length table (spec.md §3 "Doc-lengths file", §6), grounded on
//! `examples/original_source/HW2/engine/indexer.py`'s per-batch length
//! accumulation and the sanity-check rebuild described in spec.md §9
//! ("can be reconstructed from runs by summing tf across all terms for
//! each docid").

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::error::Result;

use super::run::RunReader;

pub type DocLengths = BTreeMap<u32, u32>;

pub fn write_doc_lengths(path: &Path, lengths: &DocLengths) -> Result<()> {
    let file = File::create(path)?;
    bincode::serialize_into(BufWriter::new(file), lengths)?;
    Ok(())
}

pub fn read_doc_lengths(path: &Path) -> Result<DocLengths> {
    let file = File::open(path)?;
    let lengths = bincode::deserialize_from(std::io::BufReader::new(file))?;
    Ok(lengths)
}

/// Recomputes doc lengths directly from a set of sorted runs by summing
/// `tf` across every term for each docid (SPEC_FULL.md §3.1
/// `rebuild-doc-lengths`). Useful to cross-check the table produced
/// during `build-runs` against the merged index.
pub fn rebuild_from_runs(run_paths: &[PathBuf]) -> Result<DocLengths> {
    let mut lengths: DocLengths = BTreeMap::new();
    for path in run_paths {
        let reader = RunReader::open(path)?;
        for triple in reader {
            let (_, docid, tf) = triple?;
            *lengths.entry(docid).or_insert(0) += tf;
        }
    }
    Ok(lengths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::run::write_binary_run;
    use crate::index::shard::ShardPostings;

    #[test]
    fn round_trips_through_bincode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lengths.bin");
        let mut lengths = DocLengths::new();
        lengths.insert(1, 5);
        lengths.insert(2, 3);
        write_doc_lengths(&path, &lengths).unwrap();
        let loaded = read_doc_lengths(&path).unwrap();
        assert_eq!(loaded, lengths);
    }

    #[test]
    fn rebuild_matches_sum_of_term_frequencies() {
        let dir = tempfile::tempdir().unwrap();
        let mut postings: ShardPostings = BTreeMap::new();
        postings.entry("a".to_string()).or_default().insert(1, 2);
        postings.entry("b".to_string()).or_default().insert(1, 3);
        postings.entry("a".to_string()).or_default().insert(2, 1);
        let path = dir.path().join("r.run");
        write_binary_run(&path, &postings).unwrap();

        let rebuilt = rebuild_from_runs(&[path]).unwrap();
        assert_eq!(rebuilt[&1], 5);
        assert_eq!(rebuilt[&2], 1);
    }
}
