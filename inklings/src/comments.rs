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

//! # comments
//!
//! The comment appender.
//!
//! An entry's comment log is a single text column of fragments, each terminated by [DELIMITER]
//! (`'~'`), most recent *first*: a new comment is prepended in one server-side statement, so
//! concurrent commenters can't lose each other's updates. Fragments are never edited or removed.
//!
//! A fragment reads `"{author}: {text}~"`. The delimiter is not escaped if it appears in the
//! comment text itself -- a known limit of the log format, kept for parity with the stored data
//! this service inherits.

use crate::{
    entities::{AuthorId, EntryId},
    storage::{self, Backend},
};

use snafu::{prelude::*, Backtrace};
use tracing::debug;

/// Terminates each fragment in the stored comment log.
pub const DELIMITER: char = '~';

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("comment storage operation failed: {source}"))]
    Storage {
        source: storage::Error,
        backtrace: Backtrace,
    },
}

type Result<T> = std::result::Result<T, Error>;

/// Format a single comment-log fragment.
pub fn fragment(author: AuthorId, text: &str) -> String {
    format!("{}: {}{}", author, text, DELIMITER)
}

/// Prepend `author`'s comment to `entry`'s log.
///
/// Blank text (empty, or whitespace only) is a no-op: the log is never polluted with empty
/// fragments. Everything else lands verbatim.
pub async fn append(
    storage: &(dyn Backend + Send + Sync),
    entry: EntryId,
    author: AuthorId,
    text: &str,
) -> Result<()> {
    if text.trim().is_empty() {
        debug!("skipping blank comment on entry {} from {}", entry, author);
        return Ok(());
    }
    storage
        .prepend_comment(entry, &fragment(author, text))
        .await
        .context(StorageSnafu)
}
