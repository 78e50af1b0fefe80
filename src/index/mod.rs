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

//! Component group: corpus parsing, tokenization, shard indexing, sorted
//! runs, blocked postings codec, external merge, DAAT query execution, and
//! the searcher that wires them together.

pub mod codec;
pub mod cursor;
pub mod daat;
pub mod doclengths;
pub mod merge;
pub mod parser;
pub mod run;
pub mod searcher;
pub mod shard;
pub mod tokenizer;

pub use searcher::Searcher;
