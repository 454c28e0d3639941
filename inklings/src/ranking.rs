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

//! # ranking
//!
//! The archive-view ordering: entries descending by the fraction of their votes that were
//! positive.
//!
//! Two properties of this ordering are load-bearing:
//!
//! 1. An unvoted entry scores 0 -- neutral, not unranked. It sorts among the downvoted, not to
//!    some special position.
//! 2. The reorder is *stable*. The input arrives publish-date-descending, and entries with equal
//!    scores must degrade gracefully to that recency order; an unstable sort would visibly
//!    shuffle same-scored entries on every page load.
//!
//! Note that the score is a pure proportion: one upvote and a thousand upvotes both score 1.0.
//! The magnitude of engagement is deliberately not part of the score, so resist the urge to
//! Wilson-interval this.

use crate::{
    entities::{Entry, EntryId, Tally},
    storage::Backend,
    votes,
};

use snafu::{prelude::*, Backtrace};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to tally entry {entry}: {source}"))]
    Tally {
        entry: EntryId,
        source: votes::Error,
        backtrace: Backtrace,
    },
}

type Result<T> = std::result::Result<T, Error>;

/// The ranking score for a tally: up / (up + down), in [0, 1]; 0 when there are no votes at all.
pub fn score(tally: &Tally) -> f64 {
    let total = tally.upvotes + tally.downvotes;
    if total == 0 {
        0.0
    } else {
        tally.upvotes as f64 / total as f64
    }
}

/// Reorder already-tallied entries descending by [score].
///
/// This is a permutation -- same entries, same count -- and it's stable: pairs with equal scores
/// keep their input order. [slice::sort_by] guarantees the latter.
pub fn order(mut scored: Vec<(Entry, Tally)>) -> Vec<Entry> {
    scored.sort_by(|lhs, rhs| score(&rhs.1).total_cmp(&score(&lhs.1)));
    scored.into_iter().map(|(entry, _)| entry).collect()
}

/// Rank `entries` for the archive view, pulling each entry's tally from the aggregator.
pub async fn rank(
    storage: &(dyn Backend + Send + Sync),
    entries: Vec<Entry>,
) -> Result<Vec<Entry>> {
    let mut scored = Vec::with_capacity(entries.len());
    for entry in entries {
        let tally = votes::tally(storage, entry.id)
            .await
            .context(TallySnafu { entry: entry.id })?;
        scored.push((entry, tally));
    }
    Ok(order(scored))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        entities::{AuthorId, Direction, Slug},
        storage::test::InMemory,
        votes::apply_vote,
    };

    use chrono::Utc;

    fn mk_entry(id: i64, slug: &str) -> Entry {
        let now = Utc::now();
        Entry {
            id: EntryId::from(id),
            author: AuthorId::from(1),
            title: slug.to_owned(),
            slug: Slug::new(slug).unwrap(),
            markdown: String::new(),
            html: String::new(),
            comments: String::new(),
            published: now,
            updated: now,
        }
    }

    fn mk_tally(upvotes: i64, downvotes: i64) -> Tally {
        Tally {
            net: upvotes - downvotes,
            upvotes,
            downvotes,
        }
    }

    fn slugs(entries: &[Entry]) -> Vec<&str> {
        entries.iter().map(|e| e.slug.as_str()).collect()
    }

    #[test]
    fn scores() {
        assert_eq!(score(&mk_tally(0, 0)), 0.0);
        assert_eq!(score(&mk_tally(3, 1)), 0.75);
        assert_eq!(score(&mk_tally(30, 10)), 0.75);
        // Proportion only; volume is deliberately irrelevant:
        assert_eq!(score(&mk_tally(1, 0)), 1.0);
        assert_eq!(score(&mk_tally(1000, 0)), 1.0);
        assert_eq!(score(&mk_tally(0, 7)), 0.0);
    }

    #[test]
    fn order_is_a_permutation() {
        let scored = vec![
            (mk_entry(1, "a"), mk_tally(0, 1)),
            (mk_entry(2, "b"), mk_tally(5, 0)),
            (mk_entry(3, "c"), mk_tally(1, 1)),
        ];
        let mut before: Vec<EntryId> = scored.iter().map(|(e, _)| e.id).collect();
        let ranked = order(scored);
        let mut after: Vec<EntryId> = ranked.iter().map(|e| e.id).collect();
        before.sort();
        after.sort();
        assert_eq!(before, after);
        assert_eq!(slugs(&ranked), vec!["b", "c", "a"]);
    }

    #[test]
    fn equal_scores_keep_input_order() {
        // 3:1 and 30:10 both score 0.75; the input (recency) order must survive.
        let scored = vec![
            (mk_entry(1, "newer"), mk_tally(3, 1)),
            (mk_entry(2, "older"), mk_tally(30, 10)),
            (mk_entry(3, "best"), mk_tally(2, 0)),
        ];
        assert_eq!(slugs(&order(scored)), vec!["best", "newer", "older"]);
    }

    #[test]
    fn unvoted_entries_are_neutral() {
        // Score 0 ties an unvoted entry with an all-downvoted one; input order breaks the tie.
        let scored = vec![
            (mk_entry(1, "unvoted"), mk_tally(0, 0)),
            (mk_entry(2, "panned"), mk_tally(0, 4)),
            (mk_entry(3, "liked"), mk_tally(1, 0)),
        ];
        assert_eq!(slugs(&order(scored)), vec!["liked", "unvoted", "panned"]);
    }

    #[tokio::test]
    async fn rank_pulls_tallies_from_storage() {
        let (storage, entries) = seed().await;
        let ranked = rank(&storage, entries).await.unwrap();
        // "second" is 100% positive, "first" 50%, "third" unvoted.
        assert_eq!(slugs(&ranked), vec!["second", "first", "third"]);
    }

    async fn seed() -> (InMemory, Vec<Entry>) {
        use crate::entities::NewEntry;
        use crate::storage::test::another_author;

        let storage = InMemory::new();
        let poster = another_author(&storage, "poster@example.com").await;
        let reader = another_author(&storage, "reader@example.com").await;
        for slug in ["first", "second", "third"] {
            storage
                .create_entry(&NewEntry {
                    author: poster.id,
                    title: slug.to_owned(),
                    slug: Slug::new(slug).unwrap(),
                    markdown: String::new(),
                    html: String::new(),
                })
                .await
                .unwrap();
        }
        let entries = storage.entries().await.unwrap();
        let by_slug = |s: &str| {
            entries
                .iter()
                .find(|e| e.slug.as_str() == s)
                .unwrap()
                .id
        };
        apply_vote(&storage, by_slug("first"), poster.id, Direction::Up)
            .await
            .unwrap();
        apply_vote(&storage, by_slug("first"), reader.id, Direction::Down)
            .await
            .unwrap();
        apply_vote(&storage, by_slug("second"), poster.id, Direction::Up)
            .await
            .unwrap();
        (storage, entries)
    }
}
