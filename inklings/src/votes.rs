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

//! # votes
//!
//! The vote aggregator: per-entry tallies, per-viewer vote state, and the one side-effecting
//! operation in this module, [apply_vote].
//!
//! The data-model invariant underpinning everything here is *at most one vote row per
//! (entry, author) pair*. The storage layer enforces it with a composite key and an atomic
//! upsert; this module is written so that a violation observed at read time (a double row, or a
//! value outside {+1, -1}) is treated as corruption -- logged and failed, never papered over.

use crate::{
    entities::{AuthorId, Direction, EntryId, Tally, ViewerState},
    storage::{self, Backend},
};

use snafu::{prelude::*, Backtrace};
use tracing::{debug, error};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("entry {entry} has a vote row with value {value}; only +1/-1 are legal"))]
    BadVoteValue {
        entry: EntryId,
        value: i16,
        backtrace: Backtrace,
    },
    #[snafu(display("vote storage operation failed: {source}"))]
    Storage {
        source: storage::Error,
        backtrace: Backtrace,
    },
}

type Result<T> = std::result::Result<T, Error>;

/// Compute the aggregate vote state for `entry` from its raw vote rows.
///
/// An entry nobody has voted on tallies to (0, 0, 0) -- the caller never sees an absent value.
/// Downvotes are reported as a positive magnitude, matching how they're displayed.
pub async fn tally(storage: &(dyn Backend + Send + Sync), entry: EntryId) -> Result<Tally> {
    let mut upvotes = 0i64;
    let mut downvotes = 0i64;
    for vote in storage
        .votes_for_entry(entry)
        .await
        .context(StorageSnafu)?
    {
        match vote.value {
            1 => upvotes += 1,
            -1 => downvotes += 1,
            value => {
                error!("entry {} carries a corrupt vote value {}", entry, value);
                return BadVoteValueSnafu { entry, value }.fail();
            }
        }
    }
    Ok(Tally {
        net: upvotes - downvotes,
        upvotes,
        downvotes,
    })
}

/// Report where `author` stands on `entry`: upvoted, downvoted, or not voted at all.
///
/// Finding more than one row for the pair means the composite-key invariant has been violated;
/// that's logged & surfaced as an error rather than guessing which row is authoritative.
pub async fn viewer_state(
    storage: &(dyn Backend + Send + Sync),
    entry: EntryId,
    author: AuthorId,
) -> Result<ViewerState> {
    match storage.vote_for(entry, author).await {
        Ok(None) => Ok(ViewerState::NotVoted),
        Ok(Some(vote)) => match vote.value {
            1 => Ok(ViewerState::Upvoted),
            -1 => Ok(ViewerState::Downvoted),
            value => {
                error!("entry {} carries a corrupt vote value {}", entry, value);
                BadVoteValueSnafu { entry, value }.fail()
            }
        },
        Err(err) => {
            if err.is_ambiguous() {
                error!("corrupt vote relation for entry {}: {}", entry, err);
            }
            Err(err).context(StorageSnafu)
        }
    }
}

/// Cast (or re-cast) `author`'s vote on `entry`.
///
/// Insert-or-overwrite: a voter always has exactly one active vote per entry, and a new vote
/// replaces rather than accumulates. The write itself is a single atomic upsert in the storage
/// layer; should it nonetheless lose a race against a concurrent insert, it's retried once before
/// the error is surfaced.
pub async fn apply_vote(
    storage: &(dyn Backend + Send + Sync),
    entry: EntryId,
    author: AuthorId,
    direction: Direction,
) -> Result<()> {
    let value = direction.value();
    match storage.upsert_vote(entry, author, value).await {
        Err(err) if err.is_conflict() => {
            debug!(
                "vote upsert for ({}, {}) lost a race; retrying once",
                entry, author
            );
            storage
                .upsert_vote(entry, author, value)
                .await
                .context(StorageSnafu)
        }
        other => other.context(StorageSnafu),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        entities::Vote,
        storage::test::{another_author, fixture},
    };

    #[tokio::test]
    async fn unvoted_entries_tally_to_zero() {
        let (storage, _author, entry) = fixture().await;
        let t = tally(&storage, entry.id).await.unwrap();
        assert_eq!(t, Tally::default());
        // The same must hold for an id nothing has ever referenced:
        let t = tally(&storage, EntryId::from(42)).await.unwrap();
        assert_eq!((t.net, t.upvotes, t.downvotes), (0, 0, 0));
    }

    #[tokio::test]
    async fn revoting_overwrites() {
        let (storage, author, entry) = fixture().await;
        apply_vote(&storage, entry.id, author.id, Direction::Up)
            .await
            .unwrap();
        apply_vote(&storage, entry.id, author.id, Direction::Down)
            .await
            .unwrap();
        // Exactly one row, value -1 -- overwrite, not accumulate:
        assert_eq!(storage.vote_count(entry.id), 1);
        let t = tally(&storage, entry.id).await.unwrap();
        assert_eq!((t.net, t.upvotes, t.downvotes), (-1, 0, 1));
        assert_eq!(
            viewer_state(&storage, entry.id, author.id).await.unwrap(),
            ViewerState::Downvoted
        );
    }

    #[tokio::test]
    async fn tallies_count_both_directions() {
        let (storage, _author, entry) = fixture().await;
        for email in ["b@example.com", "c@example.com", "d@example.com"] {
            let fan = another_author(&storage, email).await;
            apply_vote(&storage, entry.id, fan.id, Direction::Up)
                .await
                .unwrap();
        }
        let critic = another_author(&storage, "e@example.com").await;
        apply_vote(&storage, entry.id, critic.id, Direction::Down)
            .await
            .unwrap();
        let t = tally(&storage, entry.id).await.unwrap();
        assert_eq!((t.net, t.upvotes, t.downvotes), (2, 3, 1));
    }

    #[tokio::test]
    async fn votes_must_reference_real_rows() {
        let (storage, author, entry) = fixture().await;
        // An author id with no author behind it is rejected, not recorded:
        match apply_vote(&storage, entry.id, AuthorId::from(99), Direction::Up)
            .await
            .unwrap_err()
        {
            Error::Storage { source, .. } => assert!(source.is_missing_reference()),
            other => panic!("unexpected error: {}", other),
        }
        // Likewise an entry id with no entry behind it:
        match apply_vote(&storage, EntryId::from(42), author.id, Direction::Up)
            .await
            .unwrap_err()
        {
            Error::Storage { source, .. } => assert!(source.is_missing_reference()),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(storage.vote_count(entry.id), 0);
    }

    #[tokio::test]
    async fn viewer_state_maps_rows() {
        let (storage, author, entry) = fixture().await;
        assert_eq!(
            viewer_state(&storage, entry.id, author.id).await.unwrap(),
            ViewerState::NotVoted
        );
        apply_vote(&storage, entry.id, author.id, Direction::Up)
            .await
            .unwrap();
        assert_eq!(
            viewer_state(&storage, entry.id, author.id).await.unwrap(),
            ViewerState::Upvoted
        );
    }

    #[tokio::test]
    async fn corruption_is_surfaced_not_guessed() {
        let (storage, author, entry) = fixture().await;
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
        assert!(matches!(
            viewer_state(&storage, entry.id, author.id).await,
            Err(Error::Storage { .. })
        ));
        // A vote value outside {+1, -1} is likewise corruption:
        storage.inject_vote(Vote {
            entry: entry.id,
            author: AuthorId::from(99),
            value: 3,
        });
        assert!(matches!(
            tally(&storage, entry.id).await,
            Err(Error::BadVoteValue { value: 3, .. })
        ));
    }
}
