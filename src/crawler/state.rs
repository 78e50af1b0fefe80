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

//! Shared crawl state behind the "state lock" (spec.md §4.5, §5).

use std::collections::{HashMap, HashSet};

pub struct CrawlState {
    pub visited: HashSet<String>,
    pub pages_per_domain: HashMap<String, u64>,
    pub pages_per_superdomain: HashMap<String, u64>,
    pub fetched_count: usize,
    pub total_bytes: u64,
    pub error_counts: HashMap<u16, u64>,
}

impl CrawlState {
    pub fn new() -> Self {
        Self {
            visited: HashSet::new(),
            pages_per_domain: HashMap::new(),
            pages_per_superdomain: HashMap::new(),
            fetched_count: 0,
            total_bytes: 0,
            error_counts: HashMap::new(),
        }
    }

    pub fn domain_count(&self, domain: &str) -> u64 {
        *self.pages_per_domain.get(domain).unwrap_or(&0)
    }

    pub fn super_count(&self, superdomain: &str) -> u64 {
        *self.pages_per_superdomain.get(superdomain).unwrap_or(&0)
    }
}

impl Default for CrawlState {
    fn default() -> Self {
        Self::new()
    }
}

/// The `1/log2(2 + domain_pages)` term of the priority formula (spec.md §3),
/// reported standalone as the audit CSV's `page_score` column.
pub fn page_score(domain_pages: u64) -> f64 {
    1.0 / (2.0 + domain_pages as f64).log2()
}

/// The `W·1/log2(2 + superdomain_pages)` term of the priority formula
/// (spec.md §3), reported standalone as the audit CSV's `super_score` column.
pub fn super_score(super_pages: u64, weight: f64) -> f64 {
    weight / (2.0 + super_pages as f64).log2()
}

/// `priority = 1/log2(2 + domain_pages) + W·1/log2(2 + superdomain_pages)`
/// (spec.md §3 "Priority").
pub fn priority(domain_pages: u64, super_pages: u64, weight: f64) -> f64 {
    page_score(domain_pages) + super_score(super_pages, weight)
}
