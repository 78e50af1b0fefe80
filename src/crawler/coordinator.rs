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

//! Worker pool + scheduling loop (component C).
//!
//! Grounded on stract's split between a coordinator that hands out jobs
//! and worker threads that execute them
//! (`examples/StractOrg-stract/core/src/crawler/coordinator.rs`,
//! `worker.rs`), translated from stract's distributed tokio-task model to
//! a single-process `std::thread` pool sharing two mutexes, per spec.md
//! §4.5/§5.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::config::CrawlerConfig;
use crate::error::Result;
use crate::fetch::{FetchStatus, Fetcher};
use crate::robots::RobotsCache;
use crate::url as urlutil;

use super::audit::{AuditRow, AuditWriter};
use super::frontier::Frontier;
use super::state::{page_score, priority, super_score, CrawlState};

/// Consecutive empty-frontier retries before a worker gives up, bounding
/// termination as described in spec.md §4.5 "Termination".
const EMPTY_RETRY_LIMIT: u32 = 20;
const EMPTY_RETRY_SLEEP: Duration = Duration::from_millis(10);

#[derive(Debug)]
pub struct CrawlSummary {
    pub pages_crawled: usize,
    pub elapsed_seconds: f64,
    pub total_bytes: u64,
    pub unique_domains: usize,
    pub unique_superdomains: usize,
    pub error_counts: HashMap<u16, u64>,
}

pub struct CrawlCoordinator {
    config: CrawlerConfig,
    frontier: Arc<Mutex<Frontier>>,
    state: Arc<Mutex<CrawlState>>,
    audit: Arc<Mutex<AuditWriter>>,
    fetcher: Arc<Fetcher>,
    robots: Arc<RobotsCache>,
}

impl CrawlCoordinator {
    pub fn new(config: CrawlerConfig, out_csv: &Path) -> Result<Self> {
        let fetcher = Fetcher::new(config.timeout, &config.user_agent)?;
        let robots = RobotsCache::new(config.timeout, &config.user_agent)?;
        let audit = AuditWriter::create(out_csv)?;
        Ok(Self {
            config,
            frontier: Arc::new(Mutex::new(Frontier::new())),
            state: Arc::new(Mutex::new(CrawlState::new())),
            audit: Arc::new(Mutex::new(audit)),
            fetcher: Arc::new(fetcher),
            robots: Arc::new(robots),
        })
    }

    /// Seeds the frontier, then runs the worker pool to completion.
    pub fn run(self, seeds: &[String]) -> Result<CrawlSummary> {
        self.seed(seeds);

        let start = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..self.config.num_workers {
            let frontier = Arc::clone(&self.frontier);
            let state = Arc::clone(&self.state);
            let audit = Arc::clone(&self.audit);
            let fetcher = Arc::clone(&self.fetcher);
            let robots = Arc::clone(&self.robots);
            let config = self.config.clone();
            handles.push(std::thread::spawn(move || {
                worker_loop(config, frontier, state, audit, fetcher, robots);
            }));
        }
        for h in handles {
            let _ = h.join();
        }

        self.audit.lock().unwrap().flush()?;

        let state = self.state.lock().unwrap();
        Ok(CrawlSummary {
            pages_crawled: state.fetched_count,
            elapsed_seconds: start.elapsed().as_secs_f64(),
            total_bytes: state.total_bytes,
            unique_domains: state.pages_per_domain.len(),
            unique_superdomains: state.pages_per_superdomain.len(),
            error_counts: state.error_counts.clone(),
        })
    }

    fn seed(&self, seeds: &[String]) {
        let mut frontier = self.frontier.lock().unwrap();
        for seed in seeds {
            let seed = seed.trim();
            if seed.is_empty() {
                continue;
            }
            let Ok(canonical) = urlutil::canonicalize(seed) else {
                warn!("dropping malformed seed: {seed}");
                continue;
            };
            if !self.robots.can_fetch(&self.config.user_agent, &canonical) {
                info!("seed skip (robots disallow): {canonical}");
                continue;
            }
            if frontier.contains(&canonical) {
                continue;
            }
            let p = priority(0, 0, CrawlerConfig::SUPERDOMAIN_WEIGHT);
            frontier.push(canonical, p, 0);
        }
    }
}

/// One worker's main loop, implementing spec.md §4.5 steps 1-7 in order.
fn worker_loop(
    config: CrawlerConfig,
    frontier: Arc<Mutex<Frontier>>,
    state: Arc<Mutex<CrawlState>>,
    audit: Arc<Mutex<AuditWriter>>,
    fetcher: Arc<Fetcher>,
    robots: Arc<RobotsCache>,
) {
    let mut empty_retries = 0u32;

    loop {
        // Step 1: pop under the frontier lock.
        let popped = {
            let mut f = frontier.lock().unwrap();
            let fetched_count = state.lock().unwrap().fetched_count;
            if fetched_count >= config.max_pages {
                return;
            }
            f.pop()
        };

        let entry = match popped {
            Some(e) => {
                empty_retries = 0;
                e
            }
            None => {
                empty_retries += 1;
                if empty_retries >= EMPTY_RETRY_LIMIT {
                    return;
                }
                std::thread::sleep(EMPTY_RETRY_SLEEP);
                continue;
            }
        };

        // Step 2: politeness check.
        if !robots.can_fetch(&config.user_agent, &entry.url) {
            debug!("robots disallow: {}", entry.url);
            continue;
        }

        // Step 3: fetch outside all locks.
        let result = fetcher.fetch(&entry.url);

        // Step 4: record under the state lock, in order.
        let recorded = {
            let mut s = state.lock().unwrap();
            if s.visited.contains(&result.final_url) {
                debug!("duplicate final_url: {}", result.final_url);
                None
            } else {
                let domain = urlutil::registrable_domain(&result.final_url);
                let superdomain = urlutil::superdomain(&result.final_url);
                let domain_before = s.domain_count(&domain);
                let super_before = s.super_count(&superdomain);

                let page = page_score(domain_before);
                let r#super = super_score(super_before, CrawlerConfig::SUPERDOMAIN_WEIGHT);
                let total_priority = page + r#super;

                let row = AuditRow {
                    url: result.final_url.clone(),
                    status: result.status.clone(),
                    depth: entry.depth,
                    bytes: result.size_bytes(),
                    domain: domain.clone(),
                    superdomain: superdomain.clone(),
                    domain_count_before: domain_before,
                    super_count_before: super_before,
                    page_score: page,
                    super_score: r#super,
                    total_priority,
                    priority_at_pop: entry.priority,
                };
                if let Err(err) = audit.lock().unwrap().write_row(&row) {
                    warn!("failed to write audit row: {err}");
                }

                s.fetched_count += 1;
                s.visited.insert(result.final_url.clone());
                *s.pages_per_domain.entry(domain).or_insert(0) += 1;
                *s.pages_per_superdomain.entry(superdomain).or_insert(0) += 1;
                s.total_bytes += result.size_bytes() as u64;
                if let FetchStatus::Http(code) = result.status {
                    if code >= 400 {
                        *s.error_counts.entry(code).or_insert(0) += 1;
                    }
                }

                Some(())
            }
        };

        if recorded.is_none() {
            continue;
        }

        // Step 5: decide whether to extract children.
        let status_is_error = result.status.is_error_ge(400);
        if result.body.is_none() || entry.depth >= config.max_depth || status_is_error {
            continue;
        }
        let body = result.body.as_deref().unwrap_or_default();

        // Step 6: parse links, sample, filter, compute child priorities.
        let mut links = crate::links::extract_links(body, &result.final_url);
        if links.len() > config.max_keep {
            let mut rng = rand::thread_rng();
            links.shuffle(&mut rng);
            links.truncate(config.oversample.min(links.len()));
        }

        let blocked = config.blocked_substring.to_ascii_lowercase();
        let candidates: Vec<(String, f64)> = {
            let s = state.lock().unwrap();
            links
                .into_iter()
                .filter(|link| !urlutil::looks_binary(link))
                .filter(|link| !link.to_ascii_lowercase().contains(&blocked))
                .map(|link| {
                    let domain = urlutil::registrable_domain(&link);
                    let superdomain = urlutil::superdomain(&link);
                    let p = priority(
                        s.domain_count(&domain),
                        s.super_count(&superdomain),
                        CrawlerConfig::SUPERDOMAIN_WEIGHT,
                    );
                    (link, p)
                })
                .collect()
        };

        // Step 7: push accepted children under the frontier lock, then cap.
        {
            let mut f = frontier.lock().unwrap();
            let s = state.lock().unwrap();
            let mut accepted = 0usize;
            for (link, p) in candidates {
                if accepted >= config.max_keep {
                    break;
                }
                if s.visited.contains(&link) || f.contains(&link) {
                    continue;
                }
                f.push(link, p, entry.depth + 1);
                accepted += 1;
            }
            drop(s);
            f.trim_if_over_cap(config.frontier_cap, config.frontier_keep);
        }
    }
}
