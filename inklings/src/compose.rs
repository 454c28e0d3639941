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

//! # compose
//!
//! The entry composer: create, update & delete.
//!
//! Creation renders the markdown, derives a slug (see [slug]), and inserts. The slug
//! existence-check-then-insert can lose a race against another author composing a
//! similarly-titled entry at the same moment; when the insert trips the uniqueness constraint,
//! the slug is re-derived (which now sees the winner's row) and the insert retried, a bounded
//! number of times.
//!
//! Updates touch title, markdown & rendered HTML only. The slug is immutable once assigned; it is
//! never recomputed on edit, so links to an entry survive retitling.
//!
//! [slug]: crate::slug

use crate::{
    entities::{AuthorId, Entry, EntryId, NewEntry, Slug},
    slug,
    storage::{self, Backend},
};

use pulldown_cmark::{html, Parser};
use snafu::{prelude::*, Backtrace};
use tracing::{debug, info};

/// How many times a create will re-derive its slug after losing an insert race.
const SLUG_RACE_RETRIES: usize = 3;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("failed to derive a slug: {source}"))]
    Slug {
        source: slug::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("couldn't find a free slug for \"{title}\" after {SLUG_RACE_RETRIES} attempts"))]
    SlugExhausted { title: String, backtrace: Backtrace },
    #[snafu(display("entry storage operation failed: {source}"))]
    Storage {
        source: storage::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("entry {id} vanished between update & re-read"))]
    Vanished { id: EntryId, backtrace: Backtrace },
}

type Result<T> = std::result::Result<T, Error>;

/// Render an entry's markdown source to HTML.
pub fn render(markdown: &str) -> String {
    let mut rendered = String::new();
    html::push_html(&mut rendered, Parser::new(markdown));
    rendered
}

/// Compose a new entry: render, derive a slug, insert.
pub async fn create(
    storage: &(dyn Backend + Send + Sync),
    author: AuthorId,
    title: &str,
    markdown: &str,
) -> Result<Entry> {
    let rendered = render(markdown);
    for _ in 0..SLUG_RACE_RETRIES {
        let slug = slug::unique(storage, title).await.context(SlugSnafu)?;
        let new = NewEntry {
            author,
            title: title.to_owned(),
            slug,
            markdown: markdown.to_owned(),
            html: rendered.clone(),
        };
        match storage.create_entry(&new).await {
            Ok(entry) => {
                info!("{} composed entry {} ({})", author, entry.id, entry.slug);
                return Ok(entry);
            }
            Err(err) if err.is_conflict() => {
                debug!("slug {} lost an insert race; re-deriving", new.slug);
            }
            Err(err) => return Err(err).context(StorageSnafu),
        }
    }
    SlugExhaustedSnafu { title }.fail()
}

/// Re-title and/or re-word an existing entry. The slug stays put.
pub async fn update(
    storage: &(dyn Backend + Send + Sync),
    id: EntryId,
    title: &str,
    markdown: &str,
) -> Result<Entry> {
    let rendered = render(markdown);
    storage
        .update_entry(id, title, markdown, &rendered)
        .await
        .context(StorageSnafu)?;
    info!("entry {} updated", id);
    storage
        .entry_by_id(id)
        .await
        .context(StorageSnafu)?
        .context(VanishedSnafu { id })
}

/// Remove the entry published under `slug`.
pub async fn delete(storage: &(dyn Backend + Send + Sync), slug: &Slug) -> Result<()> {
    storage.delete_entry(slug).await.context(StorageSnafu)?;
    info!("entry {} deleted", slug);
    Ok(())
}

/// One author's entries, most recent first -- the author's home view. Recency, not score, orders
/// an author's own page.
pub async fn by_author(
    storage: &(dyn Backend + Send + Sync),
    author: AuthorId,
) -> Result<Vec<Entry>> {
    storage
        .entries_by_author(author)
        .await
        .context(StorageSnafu)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::storage::test::{another_author, fixture};

    #[tokio::test]
    async fn create_renders_and_slugs() {
        let (storage, author, _entry) = fixture().await;
        let entry = create(&storage, author.id, "Hello, World!!", "Some *text*.")
            .await
            .unwrap();
        assert_eq!(entry.slug.as_str(), "hello-world");
        assert_eq!(entry.title, "Hello, World!!");
        assert_eq!(entry.html, "<p>Some <em>text</em>.</p>\n");
        assert_eq!(entry.comments, "");
        assert_eq!(entry.published, entry.updated);
    }

    #[tokio::test]
    async fn colliding_titles_get_suffixed() {
        let (storage, author, _entry) = fixture().await;
        // The fixture already published "first-post".
        let entry = create(&storage, author.id, "First post", "").await.unwrap();
        assert_eq!(entry.slug.as_str(), "first-post-2");
        let entry = create(&storage, author.id, "First post", "").await.unwrap();
        assert_eq!(entry.slug.as_str(), "first-post-3");
    }

    #[tokio::test]
    async fn update_preserves_the_slug() {
        let (storage, _author, entry) = fixture().await;
        let updated = update(&storage, entry.id, "A Whole New Title", "New words.")
            .await
            .unwrap();
        assert_eq!(updated.slug, entry.slug);
        assert_eq!(updated.title, "A Whole New Title");
        assert_eq!(updated.html, "<p>New words.</p>\n");
        assert!(updated.updated >= entry.updated);
        // An unknown id is a typed storage NotFound:
        assert!(matches!(
            update(&storage, EntryId::from(42), "t", "m").await,
            Err(Error::Storage { .. })
        ));
    }

    #[tokio::test]
    async fn by_author_is_scoped() {
        let (storage, author, entry) = fixture().await;
        let other = another_author(&storage, "other@example.com").await;
        create(&storage, other.id, "Interloper", "").await.unwrap();
        let second = create(&storage, author.id, "Second post", "").await.unwrap();
        let entries = by_author(&storage, author.id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.author == author.id));
        assert!(entries.iter().any(|e| e.id == entry.id));
        assert!(entries.iter().any(|e| e.id == second.id));
        // An author with nothing published has an empty view, not an error:
        let nobody = another_author(&storage, "lurker@example.com").await;
        assert!(by_author(&storage, nobody.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_round_trip() {
        let (storage, _author, entry) = fixture().await;
        delete(&storage, &entry.slug).await.unwrap();
        assert!(storage.entry_by_slug(&entry.slug).await.unwrap().is_none());
        assert!(matches!(
            delete(&storage, &entry.slug).await,
            Err(Error::Storage { .. })
        ));
    }
}
