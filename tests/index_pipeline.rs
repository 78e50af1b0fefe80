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

//! End-to-end index-build scenarios from spec.md §8: sharded indexing then
//! merge, BM25 ranking agreement with a reference full-scan implementation,
//! and raw/varbyte codec equivalence.

use std::collections::BTreeMap;

use siphon::config::{Codec, MergeConfig};
use siphon::index::codec::{read_lexicon, PostingsReader, PostingsWriter};
use siphon::index::daat::{self, Mode};
use siphon::index::merge::{merge_runs_to_index, parallel_merge_to_index};
use siphon::index::run::write_binary_run;
use siphon::index::shard::build_shard;
use siphon::index::tokenizer::tokenize;

fn synthetic_corpus(shard: usize, docs_per_shard: usize) -> Vec<(u32, Vec<String>)> {
    let vocab = ["manhattan", "project", "atomic", "bomb", "the", "history", "of", "science"];
    (0..docs_per_shard)
        .map(|i| {
            let docid = (shard * docs_per_shard + i) as u32;
            let mut text = String::new();
            for j in 0..((docid as usize % 7) + 2) {
                text.push_str(vocab[(docid as usize + j) % vocab.len()]);
                text.push(' ');
            }
            (docid, tokenize(&text))
        })
        .collect()
}

fn reference_bm25(
    query_terms: &[&str],
    shard_index: &BTreeMap<String, BTreeMap<u32, u32>>,
    doc_lengths: &BTreeMap<u32, u32>,
    k1: f64,
    b: f64,
) -> Vec<(u32, f64)> {
    let n = doc_lengths.len() as f64;
    let avgdl = doc_lengths.values().map(|&l| l as f64).sum::<f64>() / n;
    let mut scores: BTreeMap<u32, f64> = BTreeMap::new();

    for &term in query_terms {
        let Some(postings) = shard_index.get(term) else {
            continue;
        };
        let df = postings.len() as f64;
        let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
        for (&docid, &tf) in postings {
            let dl = *doc_lengths.get(&docid).unwrap_or(&0) as f64;
            if dl == 0.0 {
                continue;
            }
            let denom = tf as f64 + k1 * (1.0 - b + b * (dl / avgdl));
            *scores.entry(docid).or_insert(0.0) += idf * (tf as f64 * (k1 + 1.0)) / denom;
        }
    }

    let mut results: Vec<(u32, f64)> = scores.into_iter().collect();
    results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then(a.0.cmp(&b.0)));
    results
}

#[test]
fn sharded_index_then_merge_matches_direct_in_memory_index() {
    let dir = tempfile::tempdir().unwrap();
    let docs_per_shard = 60;
    let num_shards = 3;

    let mut run_paths = Vec::new();
    let mut combined_index: BTreeMap<String, BTreeMap<u32, u32>> = BTreeMap::new();
    let mut doc_lengths: BTreeMap<u32, u32> = BTreeMap::new();

    for shard in 0..num_shards {
        let docs = synthetic_corpus(shard, docs_per_shard);
        for (docid, tokens) in &docs {
            doc_lengths.insert(*docid, tokens.len() as u32);
        }
        let (postings, _) = build_shard(docs);
        for (term, docs_map) in &postings {
            let entry = combined_index.entry(term.clone()).or_default();
            for (&docid, &tf) in docs_map {
                *entry.entry(docid).or_insert(0) += tf;
            }
        }
        let path = dir.path().join(format!("shard_{shard}.run"));
        write_binary_run(&path, &postings).unwrap();
        run_paths.push(path);
    }

    let postings_path = dir.path().join("postings.bin");
    let lexicon_path = dir.path().join("lexicon.bin");
    merge_runs_to_index(&run_paths, &postings_path, &lexicon_path, 32, Codec::VarByte).unwrap();

    let lexicon = read_lexicon(&lexicon_path).unwrap();
    let mut reader = PostingsReader::open(&postings_path).unwrap();

    let mut terms: Vec<&String> = combined_index.keys().collect();
    terms.truncate(200.min(terms.len()));

    for term in terms {
        let expected = &combined_index[term];
        let entry = lexicon.get(term).expect("term present in merged lexicon");
        let (docids, freqs) = reader.read_postings(entry).unwrap();
        let got: BTreeMap<u32, u32> = docids.into_iter().zip(freqs).collect();
        assert_eq!(&got, expected, "mismatch for term '{term}'");
    }
}

#[test]
fn bm25_topk_agrees_with_reference_full_scan() {
    let dir = tempfile::tempdir().unwrap();
    let docs = synthetic_corpus(0, 200);
    let mut doc_lengths: BTreeMap<u32, u32> = BTreeMap::new();
    for (docid, tokens) in &docs {
        doc_lengths.insert(*docid, tokens.len() as u32);
    }
    let (postings, _) = build_shard(docs);

    let path = dir.path().join("shard.run");
    write_binary_run(&path, &postings).unwrap();
    let postings_path = dir.path().join("postings.bin");
    let lexicon_path = dir.path().join("lexicon.bin");
    merge_runs_to_index(&[path], &postings_path, &lexicon_path, 16, Codec::Raw).unwrap();

    let lexicon = read_lexicon(&lexicon_path).unwrap();
    let query_terms = ["manhattan", "project"];
    let mut terms_with_entries: Vec<(String, _)> = Vec::new();
    for &t in &query_terms {
        if let Some(entry) = lexicon.get(t) {
            terms_with_entries.push((t.to_string(), entry.clone()));
        }
    }

    let (_names, dfs, mut cursors) = daat::open_cursors(&postings_path, terms_with_entries).unwrap();
    let got = daat::bm25_topk(&mut cursors, &dfs, &doc_lengths, 10, 1.2, 0.75, Mode::Or).unwrap();

    let expected = reference_bm25(&query_terms, &postings, &doc_lengths, 1.2, 0.75);
    let expected_top10: Vec<(u32, f64)> = expected.into_iter().take(10).collect();

    assert_eq!(got.len(), expected_top10.len());
    for (a, b) in got.iter().zip(expected_top10.iter()) {
        assert_eq!(a.0, b.0);
        assert!((a.1 - b.1).abs() < 1e-9, "score mismatch for doc {}: {} vs {}", a.0, a.1, b.1);
    }
}

#[test]
fn raw_and_varbyte_codecs_read_back_identical_postings() {
    let dir = tempfile::tempdir().unwrap();
    let postings: BTreeMap<u32, u32> = (0..500).map(|i| (i * 3, (i % 11) + 1)).collect();

    let raw_path = dir.path().join("raw.bin");
    let mut raw_writer = PostingsWriter::create(&raw_path, 64, Codec::Raw).unwrap();
    let raw_entry = raw_writer.add_term(&postings).unwrap();
    raw_writer.finish().unwrap();

    let vb_path = dir.path().join("vb.bin");
    let mut vb_writer = PostingsWriter::create(&vb_path, 64, Codec::VarByte).unwrap();
    let vb_entry = vb_writer.add_term(&postings).unwrap();
    vb_writer.finish().unwrap();

    let mut raw_reader = PostingsReader::open(&raw_path).unwrap();
    let (raw_docids, raw_freqs) = raw_reader.read_postings(&raw_entry).unwrap();

    let mut vb_reader = PostingsReader::open(&vb_path).unwrap();
    let (vb_docids, vb_freqs) = vb_reader.read_postings(&vb_entry).unwrap();

    assert_eq!(raw_docids, vb_docids);
    assert_eq!(raw_freqs, vb_freqs);
    assert_eq!(raw_docids.len(), postings.len());
}

#[test]
fn parallel_merge_produces_the_same_index_as_direct_merge() {
    let dir = tempfile::tempdir().unwrap();
    let docs = synthetic_corpus(0, 90);
    let (postings, _) = build_shard(docs);

    // Split the single shard's postings into several runs by term prefix,
    // so both merge paths are fed genuinely different run boundaries.
    let mut runs: Vec<BTreeMap<String, BTreeMap<u32, u32>>> = vec![BTreeMap::new(); 4];
    for (i, (term, docs_map)) in postings.iter().enumerate() {
        runs[i % 4].insert(term.clone(), docs_map.clone());
    }
    let mut run_paths = Vec::new();
    for (i, run) in runs.iter().enumerate() {
        let path = dir.path().join(format!("r{i}.run"));
        write_binary_run(&path, run).unwrap();
        run_paths.push(path);
    }

    let direct_postings = dir.path().join("direct_postings.bin");
    let direct_lexicon = dir.path().join("direct_lexicon.bin");
    merge_runs_to_index(&run_paths, &direct_postings, &direct_lexicon, 8, Codec::Raw).unwrap();

    let tmp_dir = dir.path().join("tmp");
    let parallel_postings = dir.path().join("parallel_postings.bin");
    let parallel_lexicon = dir.path().join("parallel_lexicon.bin");
    let config = MergeConfig { fanin: 2, workers: 2, rounds: None };
    parallel_merge_to_index(
        &run_paths,
        &tmp_dir,
        &parallel_postings,
        &parallel_lexicon,
        8,
        Codec::Raw,
        &config,
    )
    .unwrap();

    let direct_lex = read_lexicon(&direct_lexicon).unwrap();
    let parallel_lex = read_lexicon(&parallel_lexicon).unwrap();
    assert_eq!(direct_lex.keys().collect::<Vec<_>>(), parallel_lex.keys().collect::<Vec<_>>());

    let mut direct_reader = PostingsReader::open(&direct_postings).unwrap();
    let mut parallel_reader = PostingsReader::open(&parallel_postings).unwrap();
    for term in direct_lex.keys() {
        let direct_result = direct_reader.read_postings(&direct_lex[term]).unwrap();
        let parallel_result = parallel_reader.read_postings(&parallel_lex[term]).unwrap();
        assert_eq!(direct_result, parallel_result, "mismatch for term '{term}'");
    }
}
