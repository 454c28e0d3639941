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

//! # storage
//!
//! Abstractions for the inklings storage layer.
//!
//! The contract is deliberately narrow: parameterized reads, and atomic conditional writes for the
//! two operations that would otherwise race (the vote upsert and the comment prepend). Lookups
//! that expect at most one row report finding more as [Error::Ambiguous] -- that's a data-model
//! invariant violation, and callers are expected to fail the request rather than guess which row
//! is authoritative.

use crate::entities::{Author, AuthorId, Entry, EntryId, NewAuthor, NewEntry, Slug, Vote};

use async_trait::async_trait;

/// The storage-layer error type
///
/// Driver faults are carried opaquely in [Error::Backend]; the other variants are *typed
/// outcomes* that the operations above this layer dispatch on: [Error::NotFound] becomes a
/// user-visible 404, [Error::Conflict] is retried where the concurrency rules say so,
/// [Error::MissingReference] becomes a user-visible 400, and [Error::Ambiguous] is logged &
/// failed.
#[derive(Debug)]
pub enum Error {
    /// A lookup expected exactly one row & found zero.
    NotFound { what: &'static str, key: String },
    /// A lookup expected at most one row & found more; the invariants say this can't happen, so
    /// observing it means the relation is corrupt.
    Ambiguous {
        what: &'static str,
        key: String,
        count: usize,
    },
    /// A write lost a race against a uniqueness constraint.
    Conflict { what: &'static str, key: String },
    /// A write referenced a row (an author, an entry) that doesn't exist.
    MissingReference { what: &'static str, key: String },
    /// The store itself failed.
    Backend {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NotFound { what, key } => write!(f, "no {} matching {}", what, key),
            Error::Ambiguous { what, key, count } => write!(
                f,
                "{} rows of {} matching {}; at most one may exist",
                count, what, key
            ),
            Error::Conflict { what, key } => {
                write!(f, "uniqueness conflict writing {} {}", what, key)
            }
            Error::MissingReference { what, key } => {
                write!(f, "writing {} {}: a referenced row is missing", what, key)
            }
            Error::Backend { source } => write!(f, "{}", source),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Backend { source } => {
                let source: &(dyn std::error::Error + 'static) = source.as_ref();
                Some(source)
            }
            _ => None,
        }
    }
}

impl Error {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Error {
        Error::Backend {
            source: Box::new(err),
        }
    }
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Error::Ambiguous { .. })
    }
    pub fn is_missing_reference(&self) -> bool {
        matches!(self, Error::MissingReference { .. })
    }
}

type Result<T> = std::result::Result<T, Error>;

#[async_trait]
pub trait Backend {
    /// Insert a new author row; the e-mail column is unique, so a duplicate signup surfaces as
    /// [Error::Conflict].
    async fn add_author(&self, author: &NewAuthor) -> Result<Author>;
    /// Retrieve an [Author] by id. None means there is no author with that id.
    async fn author_by_id(&self, id: AuthorId) -> Result<Option<Author>>;
    /// Insert a new entry row, assigning the id and setting published = updated = now. The slug
    /// column is unique; losing the check-then-insert race surfaces as [Error::Conflict], and the
    /// composer re-derives & retries rather than trusting its pre-check. An author id with no
    /// author row behind it surfaces as [Error::MissingReference].
    async fn create_entry(&self, entry: &NewEntry) -> Result<Entry>;
    /// Overwrite an entry's title, markdown & rendered HTML (never its slug), bumping `updated`.
    async fn update_entry(
        &self,
        id: EntryId,
        title: &str,
        markdown: &str,
        html: &str,
    ) -> Result<()>;
    /// Remove an entry; [Error::NotFound] if no entry carries the slug.
    async fn delete_entry(&self, slug: &Slug) -> Result<()>;
    async fn entry_by_id(&self, id: EntryId) -> Result<Option<Entry>>;
    async fn entry_by_slug(&self, slug: &Slug) -> Result<Option<Entry>>;
    /// All entries, publish-date-descending. This is the natural order the ranking computation
    /// degrades to on ties, so implementations must honor it.
    async fn entries(&self) -> Result<Vec<Entry>>;
    /// One author's entries, publish-date-descending.
    async fn entries_by_author(&self, author: AuthorId) -> Result<Vec<Entry>>;
    async fn slug_exists(&self, slug: &Slug) -> Result<bool>;
    /// The raw vote rows for an entry. Zero rows is an ordinary outcome, not an error.
    async fn votes_for_entry(&self, entry: EntryId) -> Result<Vec<Vote>>;
    /// The single vote (if any) cast by `author` on `entry`; more than one row is
    /// [Error::Ambiguous].
    async fn vote_for(&self, entry: EntryId, author: AuthorId) -> Result<Option<Vote>>;
    /// Insert-or-overwrite the (entry, author) vote in one atomic statement, guarded by the
    /// composite key. A voter always ends up with exactly one active vote per entry. Both ids
    /// must name existing rows; a stray one surfaces as [Error::MissingReference].
    async fn upsert_vote(&self, entry: EntryId, author: AuthorId, value: i16) -> Result<()>;
    /// Prepend an already-formatted fragment to an entry's comment log in one server-side
    /// statement, so concurrent commenters can't lose each other's updates.
    async fn prepend_comment(&self, entry: EntryId, fragment: &str) -> Result<()>;
}

#[cfg(test)]
pub mod test {

    //! An in-memory [Backend] for exercising the operations above the storage layer without a
    //! running database. All mutation happens under a single [Mutex], which trivially satisfies
    //! the atomicity the trait demands.

    use super::*;
    use crate::entities::Tally;

    use std::sync::Mutex;

    use chrono::Utc;
    use secrecy::SecretString;

    #[derive(Debug, Default)]
    struct Inner {
        authors: Vec<Author>,
        entries: Vec<Entry>,
        votes: Vec<Vote>,
        next_author: i64,
        next_entry: i64,
    }

    #[derive(Debug, Default)]
    pub struct InMemory {
        inner: Mutex<Inner>,
    }

    impl InMemory {
        pub fn new() -> InMemory {
            InMemory::default()
        }
        /// Push a raw vote row, bypassing the composite-key and reference guards. Only exists so
        /// tests can manufacture corrupt states (double rows, stray values) and watch them
        /// surface.
        pub fn inject_vote(&self, vote: Vote) {
            self.inner.lock().unwrap().votes.push(vote);
        }
        /// Direct read of an entry's tally, for asserting on post-conditions.
        pub fn raw_tally(&self, entry: EntryId) -> Tally {
            let inner = self.inner.lock().unwrap();
            let upvotes = inner
                .votes
                .iter()
                .filter(|v| v.entry == entry && v.value == 1)
                .count() as i64;
            let downvotes = inner
                .votes
                .iter()
                .filter(|v| v.entry == entry && v.value == -1)
                .count() as i64;
            Tally {
                net: upvotes - downvotes,
                upvotes,
                downvotes,
            }
        }
        pub fn vote_count(&self, entry: EntryId) -> usize {
            self.inner
                .lock()
                .unwrap()
                .votes
                .iter()
                .filter(|v| v.entry == entry)
                .count()
        }
    }

    #[async_trait]
    impl Backend for InMemory {
        async fn add_author(&self, author: &NewAuthor) -> Result<Author> {
            let mut inner = self.inner.lock().unwrap();
            if inner.authors.iter().any(|a| a.email == author.email) {
                return Err(Error::Conflict {
                    what: "author",
                    key: author.email.clone(),
                });
            }
            inner.next_author += 1;
            let author = Author {
                id: AuthorId::from(inner.next_author),
                email: author.email.clone(),
                name: author.name.clone(),
                credential: author.credential.clone(),
            };
            inner.authors.push(author.clone());
            Ok(author)
        }
        async fn author_by_id(&self, id: AuthorId) -> Result<Option<Author>> {
            let inner = self.inner.lock().unwrap();
            Ok(inner.authors.iter().find(|a| a.id == id).cloned())
        }
        async fn create_entry(&self, entry: &NewEntry) -> Result<Entry> {
            let mut inner = self.inner.lock().unwrap();
            if !inner.authors.iter().any(|a| a.id == entry.author) {
                return Err(Error::MissingReference {
                    what: "entry",
                    key: entry.slug.to_string(),
                });
            }
            if inner.entries.iter().any(|e| e.slug == entry.slug) {
                return Err(Error::Conflict {
                    what: "entry",
                    key: entry.slug.to_string(),
                });
            }
            inner.next_entry += 1;
            let now = Utc::now();
            let entry = Entry {
                id: EntryId::from(inner.next_entry),
                author: entry.author,
                title: entry.title.clone(),
                slug: entry.slug.clone(),
                markdown: entry.markdown.clone(),
                html: entry.html.clone(),
                comments: String::new(),
                published: now,
                updated: now,
            };
            inner.entries.push(entry.clone());
            Ok(entry)
        }
        async fn update_entry(
            &self,
            id: EntryId,
            title: &str,
            markdown: &str,
            html: &str,
        ) -> Result<()> {
            let mut inner = self.inner.lock().unwrap();
            match inner.entries.iter_mut().find(|e| e.id == id) {
                Some(entry) => {
                    entry.title = title.to_owned();
                    entry.markdown = markdown.to_owned();
                    entry.html = html.to_owned();
                    entry.updated = Utc::now();
                    Ok(())
                }
                None => Err(Error::NotFound {
                    what: "entry",
                    key: id.to_string(),
                }),
            }
        }
        async fn delete_entry(&self, slug: &Slug) -> Result<()> {
            let mut inner = self.inner.lock().unwrap();
            let before = inner.entries.len();
            inner.entries.retain(|e| &e.slug != slug);
            if inner.entries.len() == before {
                Err(Error::NotFound {
                    what: "entry",
                    key: slug.to_string(),
                })
            } else {
                Ok(())
            }
        }
        async fn entry_by_id(&self, id: EntryId) -> Result<Option<Entry>> {
            let inner = self.inner.lock().unwrap();
            Ok(inner.entries.iter().find(|e| e.id == id).cloned())
        }
        async fn entry_by_slug(&self, slug: &Slug) -> Result<Option<Entry>> {
            let inner = self.inner.lock().unwrap();
            Ok(inner.entries.iter().find(|e| &e.slug == slug).cloned())
        }
        async fn entries(&self) -> Result<Vec<Entry>> {
            let inner = self.inner.lock().unwrap();
            let mut entries = inner.entries.clone();
            // Stable, so entries sharing a timestamp keep insertion order.
            entries.sort_by(|lhs, rhs| rhs.published.cmp(&lhs.published));
            Ok(entries)
        }
        async fn entries_by_author(&self, author: AuthorId) -> Result<Vec<Entry>> {
            let mut entries = self.entries().await?;
            entries.retain(|e| e.author == author);
            Ok(entries)
        }
        async fn slug_exists(&self, slug: &Slug) -> Result<bool> {
            let inner = self.inner.lock().unwrap();
            Ok(inner.entries.iter().any(|e| &e.slug == slug))
        }
        async fn votes_for_entry(&self, entry: EntryId) -> Result<Vec<Vote>> {
            let inner = self.inner.lock().unwrap();
            Ok(inner
                .votes
                .iter()
                .filter(|v| v.entry == entry)
                .copied()
                .collect())
        }
        async fn vote_for(&self, entry: EntryId, author: AuthorId) -> Result<Option<Vote>> {
            let inner = self.inner.lock().unwrap();
            let matching: Vec<Vote> = inner
                .votes
                .iter()
                .filter(|v| v.entry == entry && v.author == author)
                .copied()
                .collect();
            match matching.len() {
                0 => Ok(None),
                1 => Ok(Some(matching[0])),
                count => Err(Error::Ambiguous {
                    what: "vote",
                    key: format!("({}, {})", entry, author),
                    count,
                }),
            }
        }
        async fn upsert_vote(&self, entry: EntryId, author: AuthorId, value: i16) -> Result<()> {
            let mut inner = self.inner.lock().unwrap();
            if !inner.entries.iter().any(|e| e.id == entry)
                || !inner.authors.iter().any(|a| a.id == author)
            {
                return Err(Error::MissingReference {
                    what: "vote",
                    key: format!("({}, {})", entry, author),
                });
            }
            match inner
                .votes
                .iter_mut()
                .find(|v| v.entry == entry && v.author == author)
            {
                Some(vote) => vote.value = value,
                None => inner.votes.push(Vote {
                    entry,
                    author,
                    value,
                }),
            }
            Ok(())
        }
        async fn prepend_comment(&self, entry: EntryId, fragment: &str) -> Result<()> {
            let mut inner = self.inner.lock().unwrap();
            match inner.entries.iter_mut().find(|e| e.id == entry) {
                Some(entry) => {
                    entry.comments = format!("{}{}", fragment, entry.comments);
                    Ok(())
                }
                None => Err(Error::NotFound {
                    what: "entry",
                    key: entry.to_string(),
                }),
            }
        }
    }

    /// Register an additional author; tests needing several distinct identities use this.
    pub async fn another_author(storage: &InMemory, email: &str) -> Author {
        storage
            .add_author(
                &NewAuthor::new(email, "A. Nother", &SecretString::from("s3kr1t".to_owned()))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    /// A backend pre-loaded with one author & one entry; most tests start here.
    pub async fn fixture() -> (InMemory, Author, Entry) {
        let storage = InMemory::new();
        let author = storage
            .add_author(
                &NewAuthor::new(
                    "author@example.com",
                    "A. Nonymous",
                    &SecretString::from("s3kr1t".to_owned()),
                )
                .unwrap(),
            )
            .await
            .unwrap();
        let entry = storage
            .create_entry(&NewEntry {
                author: author.id,
                title: "First post".to_owned(),
                slug: Slug::new("first-post").unwrap(),
                markdown: "Hello, *world*.".to_owned(),
                html: "<p>Hello, <em>world</em>.</p>\n".to_owned(),
            })
            .await
            .unwrap();
        (storage, author, entry)
    }

    #[tokio::test]
    async fn invariants() {
        let (storage, author, entry) = fixture().await;
        // Duplicate e-mail is a Conflict:
        assert!(storage
            .add_author(
                &NewAuthor::new("author@example.com", "Imposter", &"x".to_owned().into()).unwrap()
            )
            .await
            .unwrap_err()
            .is_conflict());
        // Duplicate slug is a Conflict:
        assert!(storage
            .create_entry(&NewEntry {
                author: author.id,
                title: "First post".to_owned(),
                slug: Slug::new("first-post").unwrap(),
                markdown: String::new(),
                html: String::new(),
            })
            .await
            .unwrap_err()
            .is_conflict());
        // Deleting a non-existent slug is NotFound:
        assert!(storage
            .delete_entry(&Slug::new("no-such").unwrap())
            .await
            .unwrap_err()
            .is_not_found());
        // Writes naming rows that don't exist are typed MissingReference, matching the
        // foreign-key constraints on the PostgreSQL side:
        assert!(storage
            .create_entry(&NewEntry {
                author: AuthorId::from(99),
                title: "Stray".to_owned(),
                slug: Slug::new("stray").unwrap(),
                markdown: String::new(),
                html: String::new(),
            })
            .await
            .unwrap_err()
            .is_missing_reference());
        assert!(storage
            .upsert_vote(EntryId::from(42), author.id, 1)
            .await
            .unwrap_err()
            .is_missing_reference());
        assert!(storage
            .upsert_vote(entry.id, AuthorId::from(99), 1)
            .await
            .unwrap_err()
            .is_missing_reference());
        // A manufactured double-row surfaces as Ambiguous:
        storage.inject_vote(Vote {
            entry: entry.id,
            author: author.id,
            value: 1,
        });
        storage.inject_vote(Vote {
            entry: entry.id,
            author: author.id,
            value: -1,
        });
        assert!(storage
            .vote_for(entry.id, author.id)
            .await
            .unwrap_err()
            .is_ambiguous());
    }
}
