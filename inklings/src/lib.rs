// Copyright (C) 2025-2026 the inklings authors
//
// This file is part of inklings.
//
// inklings is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// inklings is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with inklings.  If not,
// see <http://www.gnu.org/licenses/>.

//! # inklings
//!
//! A small self-hosted blog service: entries are composed in markdown, carry an append-only
//! comment log, and are ranked in the archive view by the proportion of their votes that were
//! positive.
//!
//! The library is organized around a narrow storage abstraction ([storage::Backend], implemented
//! for PostgreSQL in [postgres]) and a handful of operations over it: the vote aggregator
//! ([votes]), the ranking computation ([ranking]), the comment appender ([comments]), and the
//! entry composer ([compose], with slug derivation in [slug]). The request layer ([entries],
//! [authors]) is a thin JSON surface over those operations; it carries no sessions, no HTML, and
//! no uploads.

pub mod authors;
pub mod comments;
pub mod compose;
pub mod entities;
pub mod entries;
pub mod http;
pub mod postgres;
pub mod ranking;
pub mod slug;
pub mod storage;
pub mod votes;
