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

//! # inklings entities
//!
//! I hate these sort of "catch-all" modules, but these types are truly foundational: every other
//! module in the crate is written in terms of them. Identifiers are storage-assigned 64-bit
//! integers (`BIGSERIAL` on the PostgreSQL side), so the id newtypes here are transparent wrappers
//! over [i64].

use std::{fmt::Display, str::FromStr};

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Utc};
use email_address::EmailAddress;
use lazy_static::lazy_static;
use password_hash::{rand_core::OsRng, SaltString};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use snafu::{prelude::*, Backtrace};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("{email} is not a valid e-mail address: {source}"))]
    BadEmail {
        email: String,
        source: email_address::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("{text} is not a valid vote direction (expected \"up\" or \"down\")"))]
    BadDirection { text: String, backtrace: Backtrace },
    #[snafu(display("{text} is not a valid slug"))]
    BadSlug { text: String, backtrace: Backtrace },
    #[snafu(display("an author's display name may not be blank"))]
    BlankName { backtrace: Backtrace },
    #[snafu(display("Failed to hash password: {source}"))]
    HashPassword {
        source: password_hash::errors::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Bad stored credential: {source}"))]
    HashString {
        source: password_hash::errors::Error,
        backtrace: Backtrace,
    },
}

type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          identifiers                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Uniquely identifies an [Entry]; assigned by the storage layer on creation.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct EntryId(i64);

impl From<i64> for EntryId {
    fn from(value: i64) -> Self {
        EntryId(value)
    }
}

impl Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Uniquely identifies an [Author]; assigned by the storage layer on creation.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct AuthorId(i64);

impl From<i64> for AuthorId {
    fn from(value: i64) -> Self {
        AuthorId(value)
    }
}

impl Display for AuthorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                              Slug                                              //
////////////////////////////////////////////////////////////////////////////////////////////////////

lazy_static! {
    static ref SLUG_RE: Regex = Regex::new("^[a-z0-9_-]+$").unwrap(/* known good */);
}

/// The URL-safe name under which an [Entry] is reachable
///
/// Slugs are non-empty, ASCII, and drawn from `[a-z0-9_-]`; they are derived from the entry title
/// at creation time (see [slug::derive]) and immutable thereafter. Note that [Slug] deliberately
/// does *not* implement [Deserialize]: request-layer text becomes a [Slug] only through
/// [Slug::new], so an un-validated slug can't sneak in through serde.
///
/// [slug::derive]: crate::slug::derive
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct Slug(String);

impl Slug {
    pub fn new(text: &str) -> Result<Slug> {
        if SLUG_RE.is_match(text) {
            Ok(Slug(text.to_owned()))
        } else {
            BadSlugSnafu { text }.fail()
        }
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Slug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Slug {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        Slug::new(s)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         vote datatypes                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The direction of a cast vote
///
/// On the wire this is the lowercase string "up" or "down"; in the vote relation it's stored as a
/// `SMALLINT` of +1 or -1.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// The stored vote value: +1 for [Direction::Up], -1 for [Direction::Down].
    pub fn value(self) -> i16 {
        match self {
            Direction::Up => 1,
            Direction::Down => -1,
        }
    }
}

impl FromStr for Direction {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            text => BadDirectionSnafu { text }.fail(),
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// A viewer's standing with respect to a given entry
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewerState {
    NotVoted,
    Upvoted,
    Downvoted,
}

/// The aggregate vote state of a single entry
///
/// `downvotes` is reported as a positive magnitude; `net` is `upvotes - downvotes`. An entry with
/// no votes at all tallies to all zeros, never to an absent value.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Tally {
    pub net: i64,
    pub upvotes: i64,
    pub downvotes: i64,
}

/// One row of the vote relation
///
/// At most one [Vote] may exist per (entry, author) pair; the storage layer enforces this with a
/// composite primary key, and re-voting overwrites the value in place.
#[derive(Clone, Copy, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct Vote {
    #[sqlx(rename = "entry_id")]
    pub entry: EntryId,
    #[sqlx(rename = "author_id")]
    pub author: AuthorId,
    #[sqlx(rename = "vote")]
    pub value: i16,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                             Entry                                              //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A blog entry
///
/// `comments` is the entry's append-only comment log: a single text column of delimited fragments,
/// most recent first (see [comments]). `html` is rendered from `markdown` by the composer; the two
/// are only ever written together.
///
/// [comments]: crate::comments
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Entry {
    pub id: EntryId,
    #[sqlx(rename = "author_id")]
    pub author: AuthorId,
    pub title: String,
    pub slug: Slug,
    pub markdown: String,
    pub html: String,
    pub comments: String,
    pub published: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// An [Entry] as handed to the storage layer for creation; the id and timestamps are assigned
/// there.
#[derive(Clone, Debug)]
pub struct NewEntry {
    pub author: AuthorId,
    pub title: String,
    pub slug: Slug,
    pub markdown: String,
    pub html: String,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                             Author                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// An author, as read back from storage
///
/// `credential` is a PHC-format Argon2id hash string, produced in [NewAuthor::new]. The plaintext
/// password is never stored, and nothing in this crate compares credentials by string equality.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Author {
    pub id: AuthorId,
    pub email: String,
    pub name: String,
    pub credential: String,
}

impl Author {
    /// Check a submitted password against the stored Argon2id hash.
    ///
    /// No endpoint in this service calls this (sessions are somebody else's job); it exists so
    /// that whatever front-door is bolted on never has a reason to reach for `==`.
    pub fn verify_credential(&self, password: &SecretString) -> Result<bool> {
        let hash = PasswordHash::new(&self.credential).context(HashStringSnafu)?;
        match Argon2::default().verify_password(password.expose_secret().as_bytes(), &hash) {
            Ok(()) => Ok(true),
            Err(password_hash::errors::Error::Password) => Ok(false),
            Err(err) => Err(err).context(HashStringSnafu),
        }
    }
}

/// An [Author] as handed to the storage layer for creation
#[derive(Clone, Debug)]
pub struct NewAuthor {
    pub email: String,
    pub name: String,
    pub credential: String,
}

impl NewAuthor {
    /// Validate an e-mail & display name, and hash the password with Argon2id under a fresh salt.
    pub fn new(email: &str, name: &str, password: &SecretString) -> Result<NewAuthor> {
        let email = EmailAddress::from_str(email)
            .context(BadEmailSnafu { email })?
            .to_string();
        ensure!(!name.trim().is_empty(), BlankNameSnafu);
        let salt = SaltString::generate(&mut OsRng);
        let credential = Argon2::default()
            .hash_password(password.expose_secret().as_bytes(), &salt)
            .context(HashPasswordSnafu)?
            .to_string();
        Ok(NewAuthor {
            email,
            name: name.to_owned(),
            credential,
        })
    }
}
