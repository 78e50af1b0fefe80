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

//! Priority frontier (component C, spec.md §3 "Frontier entry", §4.5).

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

/// `(priority, depth, sequence, url, priority_at_push)`, ordered by
/// descending priority, ties broken by ascending `sequence` (FIFO among
/// equal priority).
#[derive(Debug, Clone)]
pub struct FrontierEntry {
    pub priority: f64,
    pub depth: u32,
    pub sequence: u64,
    pub url: String,
    pub priority_at_push: f64,
}

impl PartialEq for FrontierEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}
impl Eq for FrontierEntry {}

impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrontierEntry {
    /// `BinaryHeap` is a max-heap; "greater" must mean "pops first", i.e.
    /// higher priority, and among equal priority, the *smaller* sequence
    /// number (earlier push).
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// The priority heap plus the membership set used to avoid duplicate
/// pending entries, behind the crawler's "frontier lock" (spec.md §4.5).
pub struct Frontier {
    heap: BinaryHeap<FrontierEntry>,
    in_frontier: HashSet<String>,
    next_sequence: u64,
}

impl Frontier {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            in_frontier: HashSet::new(),
            next_sequence: 0,
        }
    }

    pub fn contains(&self, url: &str) -> bool {
        self.in_frontier.contains(url)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Pushes a new entry, assigning it the next monotonic sequence number.
    /// Caller must already have checked `!contains(url)`.
    pub fn push(&mut self, url: String, priority: f64, depth: u32) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.in_frontier.insert(url.clone());
        self.heap.push(FrontierEntry {
            priority,
            depth,
            sequence,
            url,
            priority_at_push: priority,
        });
    }

    /// Pops the highest-priority entry, removing it from the membership set.
    pub fn pop(&mut self) -> Option<FrontierEntry> {
        let entry = self.heap.pop()?;
        self.in_frontier.remove(&entry.url);
        Some(entry)
    }

    /// Frontier-cap trimming (spec.md §4.5, §5 "Backpressure"): if the
    /// frontier exceeds `cap`, retain only the top `keep` entries by
    /// priority. Never evicts an entry that has already been popped — it
    /// only operates on pending entries still in the heap.
    pub fn trim_if_over_cap(&mut self, cap: usize, keep: usize) {
        if self.heap.len() <= cap {
            return;
        }
        let mut all: Vec<FrontierEntry> = std::mem::take(&mut self.heap).into_sorted_vec();
        // into_sorted_vec is ascending; take the top `keep` from the end.
        let drop_count = all.len().saturating_sub(keep);
        for dropped in all.drain(0..drop_count) {
            self.in_frontier.remove(&dropped.url);
        }
        self.heap = all.into_iter().collect();
    }
}

impl Default for Frontier {
    fn default() -> Self {
        Self::new()
    }
}
