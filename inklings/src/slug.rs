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

//! # slug
//!
//! Deriving the URL-safe name under which an entry is published.
//!
//! The pipeline, in order: NFKD-decompose the title (so accented characters shed their marks),
//! collapse every maximal run of non-word characters to a single space, lowercase, trim,
//! hyphen-join the remaining words, and strip anything still outside ASCII. A title that
//! normalizes to nothing falls back to the literal `"entry"`.
//!
//! Collisions are resolved with a numeric suffix: `slug`, `slug-2`, `slug-3`, and so on. The
//! existence check here is inherently racy between two authors composing similarly-titled entries
//! at once; the slug column's uniqueness constraint is the actual guard, and the composer retries
//! on a constraint violation rather than trusting the check alone.

use crate::{
    entities::Slug,
    storage::{self, Backend},
};

use lazy_static::lazy_static;
use regex::Regex;
use snafu::{prelude::*, Backtrace};
use tap::Pipe;
use unicode_normalization::UnicodeNormalization;

/// What a title with no usable characters becomes.
pub const FALLBACK: &str = "entry";

lazy_static! {
    static ref NON_WORD: Regex = Regex::new(r"[^\w]+").unwrap(/* known good */);
}

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("slug existence check failed: {source}"))]
    Storage {
        source: storage::Error,
        backtrace: Backtrace,
    },
}

type Result<T> = std::result::Result<T, Error>;

/// Derive the base slug for a title; pure, no uniqueness applied.
pub fn derive(title: &str) -> Slug {
    let decomposed: String = title.nfkd().collect();
    let spaced = NON_WORD.replace_all(&decomposed, " ");
    let lowered = spaced.to_lowercase();
    let joined = lowered
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-");
    let ascii: String = joined.chars().filter(char::is_ascii).collect();
    if ascii.is_empty() {
        FALLBACK
    } else {
        ascii.as_str()
    }
    .pipe(Slug::new)
    .unwrap(/* the pipeline above only emits [a-z0-9_-] */)
}

/// Derive a slug for `title` that no existing entry carries.
///
/// Collision handling advances a numeric suffix (`-2`, `-3`, ...) until a free name turns up.
/// Derivation happens on entry creation only -- a slug, once assigned, never changes, even if the
/// title does.
pub async fn unique(storage: &(dyn Backend + Send + Sync), title: &str) -> Result<Slug> {
    let base = derive(title);
    let mut candidate = base.clone();
    let mut n = 2u64;
    while storage.slug_exists(&candidate).await.context(StorageSnafu)? {
        candidate = Slug::new(&format!("{}-{}", base, n)).unwrap(/* suffix keeps it well-formed */);
        n += 1;
    }
    Ok(candidate)
}
