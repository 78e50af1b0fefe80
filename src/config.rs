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

//! Typed configuration structs with the defaults named in the design doc,
//! in the style of stract's `stract-config` crate: small `Default`-derived
//! structs the CLI layer fills in from flags.

#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    pub num_workers: usize,
    pub max_pages: usize,
    pub max_depth: u32,
    pub timeout: std::time::Duration,
    pub user_agent: String,
    pub max_keep: usize,
    pub oversample: usize,
    pub frontier_cap: usize,
    pub frontier_keep: usize,
    /// Case-insensitive substring that disqualifies a child URL from
    /// enqueue (spec.md §4.5 step 6, §9 "keep it configurable").
    pub blocked_substring: String,
}

impl CrawlerConfig {
    pub const SUPERDOMAIN_WEIGHT: f64 = 0.1;
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            num_workers: 32,
            max_pages: 1000,
            max_depth: 3,
            timeout: std::time::Duration::from_secs(10),
            user_agent: "siphon/0.1".to_string(),
            max_keep: 100,
            oversample: 200,
            frontier_cap: 10_000,
            frontier_keep: 2_000,
            blocked_substring: "cgi".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IndexBuildConfig {
    pub batch_size: usize,
    pub workers: usize,
}

impl Default for IndexBuildConfig {
    fn default() -> Self {
        Self {
            batch_size: 10_000,
            workers: half_cores(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MergeConfig {
    pub fanin: usize,
    pub workers: usize,
    pub rounds: Option<usize>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            fanin: 12,
            workers: half_cores(),
            rounds: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Codec {
    Raw,
    VarByte,
}

impl std::str::FromStr for Codec {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw" => Ok(Codec::Raw),
            "varbyte" => Ok(Codec::VarByte),
            other => Err(crate::error::Error::ConfigError(format!(
                "unknown codec '{other}', expected raw|varbyte"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FinalizeConfig {
    pub block_size: usize,
    pub codec: Codec,
}

impl Default for FinalizeConfig {
    fn default() -> Self {
        Self {
            block_size: 128,
            codec: Codec::Raw,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Bm25Config {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Config {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

fn half_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| (n.get() / 2).max(1))
        .unwrap_or(1)
}
