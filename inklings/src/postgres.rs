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

//! # postgres
//!
//! [Backend] implementation for PostgreSQL.
//!
//! Every trait method is one parameterized statement. The two writes the concurrency rules care
//! about are single atomic statements here: the vote upsert rides `ON CONFLICT ... DO UPDATE` on
//! the composite primary key, and the comment prepend does its read-modify-write server-side
//! (`comments = $1 || comments`). Constraint violations are classified into typed outcomes:
//! unique violations become [storage::Error::Conflict] so the layers above can retry where
//! they're supposed to, foreign-key violations [storage::Error::MissingReference] so a write
//! naming a non-existent author or entry comes back as a caller error, not a driver fault.
//!
//! [Backend]: crate::storage::Backend

use crate::{
    entities::{Author, AuthorId, Entry, EntryId, NewAuthor, NewEntry, Slug, Vote},
    storage,
};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use snafu::{prelude::*, Backtrace};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::{debug, info};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to bootstrap the blog schema: {source}"))]
    Bootstrap {
        source: sqlx::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to connect to PostgreSQL at {host}:{port}: {source}"))]
    Connect {
        host: String,
        port: u16,
        source: sqlx::Error,
        backtrace: Backtrace,
    },
}

type Result<T> = std::result::Result<T, Error>;

/// Connection configuration; all fields default, so an empty TOML table works on a stock local
/// install.
#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: SecretString,
    pub max_connections: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "localhost".to_owned(),
            port: 5432,
            database: "inklings".to_owned(),
            user: "inklings".to_owned(),
            password: SecretString::from(String::new()),
            max_connections: 8,
        }
    }
}

/// Create-if-absent; safe to run on every startup.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS authors (
    id          BIGSERIAL   PRIMARY KEY,
    email       TEXT        NOT NULL UNIQUE,
    name        TEXT        NOT NULL,
    credential  TEXT        NOT NULL
);

CREATE TABLE IF NOT EXISTS entries (
    id          BIGSERIAL   PRIMARY KEY,
    author_id   BIGINT      NOT NULL REFERENCES authors (id),
    title       TEXT        NOT NULL,
    slug        TEXT        NOT NULL UNIQUE,
    markdown    TEXT        NOT NULL,
    html        TEXT        NOT NULL,
    comments    TEXT        NOT NULL DEFAULT '',
    published   TIMESTAMPTZ NOT NULL,
    updated     TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS entries_by_published ON entries (published DESC);

CREATE TABLE IF NOT EXISTS votes (
    entry_id    BIGINT      NOT NULL REFERENCES entries (id) ON DELETE CASCADE,
    author_id   BIGINT      NOT NULL REFERENCES authors (id),
    vote        SMALLINT    NOT NULL CHECK (vote IN (1, -1)),
    PRIMARY KEY (entry_id, author_id)
);
"#;

const ENTRY_COLUMNS: &str = "id, author_id, title, slug, markdown, html, comments, published, updated";

pub struct Backend {
    pool: PgPool,
}

impl Backend {
    /// Build a connection pool & run the create-if-absent schema bootstrap.
    pub async fn new(cfg: &Config) -> Result<Backend> {
        let options = PgConnectOptions::new()
            .host(&cfg.host)
            .port(cfg.port)
            .username(&cfg.user)
            .password(cfg.password.expose_secret())
            .database(&cfg.database);
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .connect_with(options)
            .await
            .context(ConnectSnafu {
                host: cfg.host.clone(),
                port: cfg.port,
            })?;
        info!(
            "connected to PostgreSQL at {}:{} (database {})",
            cfg.host, cfg.port, cfg.database
        );
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .context(BootstrapSnafu)?;
        debug!("schema bootstrap complete");
        Ok(Backend { pool })
    }
}

/// Tell a lost uniqueness race & a dangling reference apart from an honest-to-goodness driver
/// fault.
fn classify(what: &'static str, key: String, err: sqlx::Error) -> storage::Error {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            storage::Error::Conflict { what, key }
        }
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            storage::Error::MissingReference { what, key }
        }
        _ => storage::Error::backend(err),
    }
}

#[async_trait]
impl storage::Backend for Backend {
    async fn add_author(&self, author: &NewAuthor) -> std::result::Result<Author, storage::Error> {
        sqlx::query_as::<_, Author>(
            "INSERT INTO authors (email, name, credential) VALUES ($1, $2, $3) \
             RETURNING id, email, name, credential",
        )
        .bind(&author.email)
        .bind(&author.name)
        .bind(&author.credential)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| classify("author", author.email.clone(), err))
    }

    async fn author_by_id(
        &self,
        id: AuthorId,
    ) -> std::result::Result<Option<Author>, storage::Error> {
        sqlx::query_as::<_, Author>(
            "SELECT id, email, name, credential FROM authors WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage::Error::backend)
    }

    async fn create_entry(&self, entry: &NewEntry) -> std::result::Result<Entry, storage::Error> {
        sqlx::query_as::<_, Entry>(&format!(
            "INSERT INTO entries (author_id, title, slug, markdown, html, published, updated) \
             VALUES ($1, $2, $3, $4, $5, now(), now()) RETURNING {}",
            ENTRY_COLUMNS
        ))
        .bind(entry.author)
        .bind(&entry.title)
        .bind(entry.slug.as_str())
        .bind(&entry.markdown)
        .bind(&entry.html)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| classify("entry", entry.slug.to_string(), err))
    }

    async fn update_entry(
        &self,
        id: EntryId,
        title: &str,
        markdown: &str,
        html: &str,
    ) -> std::result::Result<(), storage::Error> {
        let affected = sqlx::query(
            "UPDATE entries SET title = $1, markdown = $2, html = $3, updated = now() \
             WHERE id = $4",
        )
        .bind(title)
        .bind(markdown)
        .bind(html)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(storage::Error::backend)?
        .rows_affected();
        if affected == 0 {
            Err(storage::Error::NotFound {
                what: "entry",
                key: id.to_string(),
            })
        } else {
            Ok(())
        }
    }

    async fn delete_entry(&self, slug: &Slug) -> std::result::Result<(), storage::Error> {
        let affected = sqlx::query("DELETE FROM entries WHERE slug = $1")
            .bind(slug.as_str())
            .execute(&self.pool)
            .await
            .map_err(storage::Error::backend)?
            .rows_affected();
        if affected == 0 {
            Err(storage::Error::NotFound {
                what: "entry",
                key: slug.to_string(),
            })
        } else {
            Ok(())
        }
    }

    async fn entry_by_id(&self, id: EntryId) -> std::result::Result<Option<Entry>, storage::Error> {
        sqlx::query_as::<_, Entry>(&format!(
            "SELECT {} FROM entries WHERE id = $1",
            ENTRY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage::Error::backend)
    }

    async fn entry_by_slug(
        &self,
        slug: &Slug,
    ) -> std::result::Result<Option<Entry>, storage::Error> {
        sqlx::query_as::<_, Entry>(&format!(
            "SELECT {} FROM entries WHERE slug = $1",
            ENTRY_COLUMNS
        ))
        .bind(slug.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage::Error::backend)
    }

    async fn entries(&self) -> std::result::Result<Vec<Entry>, storage::Error> {
        sqlx::query_as::<_, Entry>(&format!(
            "SELECT {} FROM entries ORDER BY published DESC",
            ENTRY_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage::Error::backend)
    }

    async fn entries_by_author(
        &self,
        author: AuthorId,
    ) -> std::result::Result<Vec<Entry>, storage::Error> {
        sqlx::query_as::<_, Entry>(&format!(
            "SELECT {} FROM entries WHERE author_id = $1 ORDER BY published DESC",
            ENTRY_COLUMNS
        ))
        .bind(author)
        .fetch_all(&self.pool)
        .await
        .map_err(storage::Error::backend)
    }

    async fn slug_exists(&self, slug: &Slug) -> std::result::Result<bool, storage::Error> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM entries WHERE slug = $1)")
            .bind(slug.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(storage::Error::backend)
    }

    async fn votes_for_entry(
        &self,
        entry: EntryId,
    ) -> std::result::Result<Vec<Vote>, storage::Error> {
        sqlx::query_as::<_, Vote>("SELECT entry_id, author_id, vote FROM votes WHERE entry_id = $1")
            .bind(entry)
            .fetch_all(&self.pool)
            .await
            .map_err(storage::Error::backend)
    }

    async fn vote_for(
        &self,
        entry: EntryId,
        author: AuthorId,
    ) -> std::result::Result<Option<Vote>, storage::Error> {
        // LIMIT 2: one row is the answer, two is proof of corruption; no need to drag back more.
        let rows = sqlx::query_as::<_, Vote>(
            "SELECT entry_id, author_id, vote FROM votes \
             WHERE entry_id = $1 AND author_id = $2 LIMIT 2",
        )
        .bind(entry)
        .bind(author)
        .fetch_all(&self.pool)
        .await
        .map_err(storage::Error::backend)?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(Some(rows[0])),
            count => Err(storage::Error::Ambiguous {
                what: "vote",
                key: format!("({}, {})", entry, author),
                count,
            }),
        }
    }

    async fn upsert_vote(
        &self,
        entry: EntryId,
        author: AuthorId,
        value: i16,
    ) -> std::result::Result<(), storage::Error> {
        sqlx::query(
            "INSERT INTO votes (entry_id, author_id, vote) VALUES ($1, $2, $3) \
             ON CONFLICT (entry_id, author_id) DO UPDATE SET vote = EXCLUDED.vote",
        )
        .bind(entry)
        .bind(author)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|err| classify("vote", format!("({}, {})", entry, author), err))?;
        Ok(())
    }

    async fn prepend_comment(
        &self,
        entry: EntryId,
        fragment: &str,
    ) -> std::result::Result<(), storage::Error> {
        let affected = sqlx::query("UPDATE entries SET comments = $1 || comments WHERE id = $2")
            .bind(fragment)
            .bind(entry)
            .execute(&self.pool)
            .await
            .map_err(storage::Error::backend)?
            .rows_affected();
        if affected == 0 {
            Err(storage::Error::NotFound {
                what: "entry",
                key: entry.to_string(),
            })
        } else {
            Ok(())
        }
    }
}
