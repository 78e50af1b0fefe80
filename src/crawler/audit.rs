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

//! Crawl audit CSV writer (spec.md §3 "Crawl audit record", §6).

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use chrono::Utc;

use crate::error::Result;
use crate::fetch::FetchStatus;

pub struct AuditRow {
    pub url: String,
    pub status: FetchStatus,
    pub depth: u32,
    pub bytes: usize,
    pub domain: String,
    pub superdomain: String,
    pub domain_count_before: u64,
    pub super_count_before: u64,
    pub page_score: f64,
    pub super_score: f64,
    pub total_priority: f64,
    pub priority_at_pop: f64,
}

pub struct AuditWriter {
    writer: csv::Writer<BufWriter<File>>,
}

impl AuditWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(BufWriter::new(file));
        writer.write_record([
            "ts_iso",
            "url",
            "status",
            "depth",
            "bytes",
            "domain",
            "superdomain",
            "domain_count_before",
            "super_count_before",
            "page_score",
            "super_score",
            "total_priority",
            "priority_at_pop",
        ])?;
        Ok(Self { writer })
    }

    pub fn write_row(&mut self, row: &AuditRow) -> Result<()> {
        let ts_iso = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        self.writer.write_record([
            ts_iso,
            row.url.clone(),
            row.status.as_csv_field(),
            row.depth.to_string(),
            row.bytes.to_string(),
            row.domain.clone(),
            row.superdomain.clone(),
            row.domain_count_before.to_string(),
            row.super_count_before.to_string(),
            format!("{:.3}", row.page_score),
            format!("{:.3}", row.super_score),
            format!("{:.3}", row.total_priority),
            format!("{:.3}", row.priority_at_pop),
        ])?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
