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

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use siphon::config::{Bm25Config, Codec, CrawlerConfig, IndexBuildConfig, MergeConfig};
use siphon::crawler::CrawlCoordinator;
use siphon::index::doclengths::{rebuild_from_runs, write_doc_lengths};
use siphon::index::merge::{merge_runs_to_index, parallel_merge_to_index};
use siphon::index::parser::iter_docs;
use siphon::index::run::write_binary_run;
use siphon::index::shard::build_shard;
use siphon::index::Searcher;

#[derive(Parser)]
#[clap(author, version, about = "Politeness-aware crawler and inverted-index search engine", long_about = None)]
#[clap(propagate_version = true)]
struct Args {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl seeds into an audit CSV (spec.md §6 "Crawler CLI").
    Crawl {
        #[clap(long)]
        seeds_file: Option<PathBuf>,
        #[clap(long)]
        query: Option<String>,
        #[clap(long, default_value = "crawl.csv")]
        out: PathBuf,
        #[clap(long)]
        max_pages: Option<usize>,
        #[clap(long)]
        max_depth: Option<u32>,
        #[clap(long)]
        timeout: Option<f64>,
        #[clap(long)]
        user_agent: Option<String>,
        #[clap(long)]
        num_seeds: Option<usize>,
    },

    /// Build one binary run per batch plus the doc-lengths table.
    BuildRuns {
        #[clap(long)]
        input: PathBuf,
        #[clap(long)]
        outdir: PathBuf,
        #[clap(long)]
        batch_size: Option<usize>,
    },

    /// Layered, fan-in-bounded parallel merge of sorted runs into the
    /// final index.
    ParallelMerge {
        runs: Vec<PathBuf>,
        #[clap(long)]
        fanin: Option<usize>,
        #[clap(long)]
        workers: Option<usize>,
        #[clap(long)]
        tmpdir: Option<PathBuf>,
        #[clap(long)]
        rounds: Option<usize>,
        #[clap(long, default_value = "index/postings.bin")]
        postings: PathBuf,
        #[clap(long, default_value = "index/lexicon.bin")]
        lexicon: PathBuf,
        #[clap(long, default_value = "128")]
        block: usize,
        #[clap(long, default_value = "raw")]
        codec: String,
    },

    /// Merges sorted runs directly into the final postings/lexicon.
    Finalize {
        runs: Vec<PathBuf>,
        #[clap(long, default_value = "index/postings.bin")]
        postings: PathBuf,
        #[clap(long, default_value = "index/lexicon.bin")]
        lexicon: PathBuf,
        #[clap(long, default_value = "128")]
        block: usize,
        #[clap(long, default_value = "raw")]
        codec: String,
    },

    /// Ad hoc single-query search over a built index.
    Search {
        query: String,
        #[clap(long, default_value = "index/postings.bin")]
        postings: PathBuf,
        #[clap(long, default_value = "index/lexicon.bin")]
        lexicon: PathBuf,
        #[clap(long)]
        doc_lengths: Option<PathBuf>,
        #[clap(long, default_value = "OR")]
        mode: String,
        #[clap(long)]
        bm25: bool,
        #[clap(long, default_value = "10")]
        topk: usize,
    },

    /// Issues a list of queries against a built index N times and reports
    /// latency percentiles (SPEC_FULL.md §3.1, grounded on
    /// `examples/original_source/HW2/bench_search.py`).
    Bench {
        #[clap(long, default_value = "index/postings.bin")]
        postings: PathBuf,
        #[clap(long, default_value = "index/lexicon.bin")]
        lexicon: PathBuf,
        #[clap(long)]
        doc_lengths: Option<PathBuf>,
        queries: Vec<String>,
        #[clap(long, default_value = "20")]
        repeat: usize,
    },

    /// Recomputes the doc-length table from sorted runs as a sanity check
    /// (SPEC_FULL.md §3.1).
    RebuildDocLengths {
        runs: Vec<PathBuf>,
        #[clap(long)]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Crawl {
            seeds_file,
            query,
            out,
            max_pages,
            max_depth,
            timeout,
            user_agent,
            num_seeds,
        } => run_crawl(seeds_file, query, out, max_pages, max_depth, timeout, user_agent, num_seeds)?,
        Commands::BuildRuns {
            input,
            outdir,
            batch_size,
        } => run_build_runs(&input, &outdir, batch_size)?,
        Commands::ParallelMerge {
            runs,
            fanin,
            workers,
            tmpdir,
            rounds,
            postings,
            lexicon,
            block,
            codec,
        } => run_parallel_merge(runs, fanin, workers, tmpdir, rounds, &postings, &lexicon, block, &codec)?,
        Commands::Finalize {
            runs,
            postings,
            lexicon,
            block,
            codec,
        } => run_finalize(runs, &postings, &lexicon, block, &codec)?,
        Commands::Search {
            query,
            postings,
            lexicon,
            doc_lengths,
            mode,
            bm25,
            topk,
        } => run_search(&query, &postings, &lexicon, doc_lengths.as_deref(), &mode, bm25, topk)?,
        Commands::Bench {
            postings,
            lexicon,
            doc_lengths,
            queries,
            repeat,
        } => run_bench(&postings, &lexicon, doc_lengths.as_deref(), &queries, repeat)?,
        Commands::RebuildDocLengths { runs, out } => run_rebuild_doc_lengths(&runs, &out)?,
    }

    Ok(())
}

fn run_crawl(
    seeds_file: Option<PathBuf>,
    query: Option<String>,
    out: PathBuf,
    max_pages: Option<usize>,
    max_depth: Option<u32>,
    timeout: Option<f64>,
    user_agent: Option<String>,
    num_seeds: Option<usize>,
) -> Result<()> {
    if seeds_file.is_some() == query.is_some() {
        bail!("exactly one of --seeds-file or --query must be given");
    }
    if let Some(q) = query {
        let _ = q;
        bail!(
            "seed discovery by query uses an external helper and is out of scope for this crawler \
             (spec.md §1 non-goals); pass --seeds-file instead"
        );
    }
    let seeds_file = seeds_file.unwrap();
    let mut seeds: Vec<String> = std::fs::read_to_string(&seeds_file)
        .with_context(|| format!("reading seeds file {}", seeds_file.display()))?
        .lines()
        .map(|l| l.to_string())
        .collect();
    if let Some(n) = num_seeds {
        seeds.truncate(n);
    }

    let mut config = CrawlerConfig::default();
    if let Some(v) = max_pages {
        config.max_pages = v;
    }
    if let Some(v) = max_depth {
        config.max_depth = v;
    }
    if let Some(v) = timeout {
        config.timeout = std::time::Duration::from_secs_f64(v);
    }
    if let Some(v) = user_agent {
        config.user_agent = v;
    }

    let coordinator = CrawlCoordinator::new(config, &out)?;
    let summary = coordinator.run(&seeds)?;
    tracing::info!(
        pages = summary.pages_crawled,
        elapsed_s = summary.elapsed_seconds,
        bytes = summary.total_bytes,
        domains = summary.unique_domains,
        superdomains = summary.unique_superdomains,
        "crawl complete"
    );
    Ok(())
}

fn run_build_runs(input: &Path, outdir: &Path, batch_size: Option<usize>) -> Result<()> {
    let mut config = IndexBuildConfig::default();
    if let Some(v) = batch_size {
        config.batch_size = v;
    }
    std::fs::create_dir_all(outdir)?;

    let mut batch = Vec::with_capacity(config.batch_size);
    let mut all_lengths: BTreeMap<u32, u32> = BTreeMap::new();
    let mut batch_idx = 0usize;

    for (docid, tokens) in iter_docs(input, None)? {
        batch.push((docid, tokens));
        if batch.len() >= config.batch_size {
            flush_batch(outdir, batch_idx, &mut batch, &mut all_lengths)?;
            batch_idx += 1;
        }
    }
    if !batch.is_empty() {
        flush_batch(outdir, batch_idx, &mut batch, &mut all_lengths)?;
    }

    write_doc_lengths(&outdir.join("doc_lengths.bin"), &all_lengths)?;
    tracing::info!(batches = batch_idx + 1, docs = all_lengths.len(), "build-runs complete");
    Ok(())
}

fn flush_batch(
    outdir: &Path,
    batch_idx: usize,
    batch: &mut Vec<(u32, Vec<String>)>,
    all_lengths: &mut BTreeMap<u32, u32>,
) -> Result<()> {
    let (postings, lengths) = build_shard(std::mem::take(batch));
    all_lengths.extend(lengths);
    let run_path = outdir.join(format!("run_{batch_idx:05}.bin"));
    write_binary_run(&run_path, &postings)?;
    Ok(())
}

fn parse_codec(s: &str) -> Result<Codec> {
    s.parse::<Codec>()
        .map_err(|e| anyhow::anyhow!(e.to_string()))
}

#[allow(clippy::too_many_arguments)]
fn run_parallel_merge(
    runs: Vec<PathBuf>,
    fanin: Option<usize>,
    workers: Option<usize>,
    tmpdir: Option<PathBuf>,
    rounds: Option<usize>,
    postings: &Path,
    lexicon: &Path,
    block: usize,
    codec: &str,
) -> Result<()> {
    let mut config = MergeConfig::default();
    if let Some(v) = fanin {
        config.fanin = v;
    }
    if let Some(v) = workers {
        config.workers = v;
    }
    if rounds.is_some() {
        config.rounds = rounds;
    }
    let tmp_dir = tmpdir.unwrap_or_else(|| PathBuf::from("tmp_merge"));
    let codec = parse_codec(codec)?;

    if let Some(parent) = postings.parent() {
        std::fs::create_dir_all(parent)?;
    }
    parallel_merge_to_index(&runs, &tmp_dir, postings, lexicon, block, codec, &config)?;
    tracing::info!(runs = runs.len(), "parallel-merge complete");
    Ok(())
}

fn run_finalize(runs: Vec<PathBuf>, postings: &Path, lexicon: &Path, block: usize, codec: &str) -> Result<()> {
    let codec = parse_codec(codec)?;
    if let Some(parent) = postings.parent() {
        std::fs::create_dir_all(parent)?;
    }
    merge_runs_to_index(&runs, postings, lexicon, block, codec)?;
    tracing::info!(runs = runs.len(), "finalize complete");
    Ok(())
}

fn run_search(
    query: &str,
    postings: &Path,
    lexicon: &Path,
    doc_lengths: Option<&Path>,
    mode: &str,
    bm25: bool,
    topk: usize,
) -> Result<()> {
    let searcher = Searcher::open(postings, lexicon, doc_lengths)?;
    if bm25 {
        let start = Instant::now();
        let results = searcher.search_bm25(query, topk, mode, &Bm25Config::default())?;
        let search_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        let json = serde_json::json!({
            "results": results.iter().map(|(d, s)| serde_json::json!({"docid": d, "score": s})).collect::<Vec<_>>(),
            "searchTime_ms": search_time_ms,
            "totalResults": results.len(),
            "query": query,
            "mode": mode,
        });
        println!("{json}");
    } else {
        let start = Instant::now();
        let results = searcher.search_boolean(query, mode)?;
        let search_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        let json = serde_json::json!({
            "results": results.iter().map(|d| serde_json::json!({"docid": d})).collect::<Vec<_>>(),
            "searchTime_ms": search_time_ms,
            "totalResults": results.len(),
            "query": query,
            "mode": mode,
        });
        println!("{json}");
    }
    Ok(())
}

fn run_bench(
    postings: &Path,
    lexicon: &Path,
    doc_lengths: Option<&Path>,
    queries: &[String],
    repeat: usize,
) -> Result<()> {
    if queries.is_empty() {
        bail!("bench requires at least one query");
    }
    let searcher = Searcher::open(postings, lexicon, doc_lengths)?;
    let mut latencies_ms = Vec::with_capacity(queries.len() * repeat);

    for _ in 0..repeat {
        for q in queries {
            let start = Instant::now();
            let _ = searcher.search_bm25(q, 10, "OR", &Bm25Config::default())?;
            latencies_ms.push(start.elapsed().as_secs_f64() * 1000.0);
        }
    }

    latencies_ms.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let min = latencies_ms.first().copied().unwrap_or(0.0);
    let median = latencies_ms[latencies_ms.len() / 2];
    let p99_idx = ((latencies_ms.len() as f64) * 0.99) as usize;
    let p99 = latencies_ms[p99_idx.min(latencies_ms.len() - 1)];

    tracing::info!(samples = latencies_ms.len(), min_ms = min, median_ms = median, p99_ms = p99, "bench complete");
    println!("min_ms={min:.3} median_ms={median:.3} p99_ms={p99:.3} samples={}", latencies_ms.len());
    Ok(())
}

fn run_rebuild_doc_lengths(runs: &[PathBuf], out: &Path) -> Result<()> {
    let lengths = rebuild_from_runs(runs)?;
    write_doc_lengths(out, &lengths)?;
    tracing::info!(docs = lengths.len(), "rebuild-doc-lengths complete");
    Ok(())
}
