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

//! # Entries API
//!
//! The JSON surface over the composer, the vote aggregator, the comment appender & the ranking
//! computation.
//!
//! There are no sessions here. Where an operation needs to know who's acting, the caller says so
//! as plain data: the `X-Inklings-Author` header on reads (so a single-entry view can report the
//! viewer's vote state), an `author` body field on writes. Verifying that claim is the front
//! door's job, not this service's.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header::CONTENT_TYPE, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::{prelude::*, Backtrace};
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer};
use tracing::{debug, error, info};

use crate::{
    comments, compose,
    entities::{self, Author, AuthorId, Direction, Entry, EntryId, Slug, Tally, ViewerState},
    http::{ErrorResponseBody, Inklings},
    ranking, storage, votes,
};

/// Names the acting author on read requests.
pub const AUTHOR_HEADER: &str = "x-inklings-author";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("The {AUTHOR_HEADER} header must be a decimal author id"))]
    BadAuthorHeader { backtrace: Backtrace },
    #[snafu(display("\"{text}\" can't be an entry slug"))]
    BadSlug {
        text: String,
        source: entities::Error,
    },
    #[snafu(display("A comment may not be blank"))]
    BlankComment { backtrace: Backtrace },
    #[snafu(display("Failed to append comment: {source}"))]
    Comment { source: comments::Error },
    #[snafu(display("Failed to compose entry: {source}"))]
    Compose { source: compose::Error },
    #[snafu(display("Failed to rank the archive: {source}"))]
    Rank { source: ranking::Error },
    #[snafu(display("Entry lookup failed: {source}"))]
    Storage { source: storage::Error },
    #[snafu(display("No author with id {id}"))]
    UnknownAuthor { id: AuthorId },
    #[snafu(display("No entry is published under \"{slug}\""))]
    UnknownEntry { slug: Slug },
    #[snafu(display("Failed to apply vote: {source}"))]
    Vote { source: votes::Error },
}

impl Error {
    pub fn as_status_and_msg(&self) -> (StatusCode, String) {
        match self {
            ////////////////////////////////////////////////////////////////////////////////////////
            // Broken requests-- tell the caller how to fix it
            ////////////////////////////////////////////////////////////////////////////////////////
            Error::BadAuthorHeader { .. } => (StatusCode::BAD_REQUEST, format!("{}", self)),
            Error::BlankComment { .. } => (StatusCode::BAD_REQUEST, format!("{}", self)),
            Error::Compose {
                source: compose::Error::Storage { source, .. },
            } if source.is_missing_reference() => (
                StatusCode::BAD_REQUEST,
                "The entry names an unknown author".to_owned(),
            ),
            Error::Vote {
                source: votes::Error::Storage { source, .. },
            } if source.is_missing_reference() => (
                StatusCode::BAD_REQUEST,
                "The vote names an unknown author or entry".to_owned(),
            ),
            ////////////////////////////////////////////////////////////////////////////////////////
            // Lookups that came up empty-- a malformed slug can't name an entry either
            ////////////////////////////////////////////////////////////////////////////////////////
            Error::BadSlug { text, .. } => (
                StatusCode::NOT_FOUND,
                format!("No entry is published under \"{}\"", text),
            ),
            Error::UnknownAuthor { .. } => (StatusCode::NOT_FOUND, format!("{}", self)),
            Error::UnknownEntry { .. } => (StatusCode::NOT_FOUND, format!("{}", self)),
            ////////////////////////////////////////////////////////////////////////////////////////
            // Internal failure-- own up to it:
            ////////////////////////////////////////////////////////////////////////////////////////
            Error::Comment { source } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to append comment: {}", source),
            ),
            Error::Compose { source } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to compose entry: {}", source),
            ),
            Error::Rank { source } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to rank the archive: {}", source),
            ),
            Error::Storage { source } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal storage error: {}", source),
            ),
            Error::Vote { source } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to apply vote: {}", source),
            ),
        }
    }
}

impl axum::response::IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let (code, msg) = self.as_status_and_msg();
        (code, Json(ErrorResponseBody { error: msg })).into_response()
    }
}

type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                       shared extraction                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Resolve request-path text to a stored entry, or a 404-shaped error trying.
async fn entry_or_404(state: &Inklings, text: &str) -> Result<Entry> {
    let slug = Slug::new(text).context(BadSlugSnafu { text })?;
    state
        .storage
        .entry_by_slug(&slug)
        .await
        .context(StorageSnafu)?
        .context(UnknownEntrySnafu { slug })
}

/// Resolve a path id to a stored author, or a 404-shaped error trying.
async fn author_or_404(state: &Inklings, id: AuthorId) -> Result<Author> {
    state
        .storage
        .author_by_id(id)
        .await
        .context(StorageSnafu)?
        .context(UnknownAuthorSnafu { id })
}

/// The acting author, per the `X-Inklings-Author` header; absent is fine (an anonymous read).
fn viewer_from_headers(headers: &HeaderMap) -> Result<Option<AuthorId>> {
    match headers.get(AUTHOR_HEADER) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|text| text.parse::<i64>().ok())
            .map(AuthorId::from)
            .map(Some)
            .ok_or(BadAuthorHeaderSnafu.build()),
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                        response bodies                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Debug, Serialize)]
pub struct EntryRsp {
    pub id: EntryId,
    pub author: AuthorId,
    pub title: String,
    pub slug: Slug,
    pub html: String,
    pub comments: String,
    pub published: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl From<Entry> for EntryRsp {
    fn from(entry: Entry) -> Self {
        EntryRsp {
            id: entry.id,
            author: entry.author,
            title: entry.title,
            slug: entry.slug,
            html: entry.html,
            comments: entry.comments,
            published: entry.published,
            updated: entry.updated,
        }
    }
}

#[derive(Debug, Serialize)]
struct ArchiveRsp {
    entries: Vec<EntryRsp>,
}

#[derive(Debug, Serialize)]
struct SingleEntryRsp {
    #[serde(flatten)]
    entry: EntryRsp,
    tally: Tally,
    viewer: ViewerState,
}

#[derive(Debug, Serialize)]
struct VoteRsp {
    tally: Tally,
    viewer: ViewerState,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         `GET /entries`                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The archive view: every entry, ordered by the ranking computation.
///
/// Entries arrive from storage publish-date-descending; the ranking reorder is stable, so entries
/// with equal scores stay in recency order.
async fn archive(State(state): State<Arc<Inklings>>) -> axum::response::Response {
    async fn archive1(state: &Inklings) -> Result<ArchiveRsp> {
        let entries = state.storage.entries().await.context(StorageSnafu)?;
        let ranked = ranking::rank(state.storage.as_ref(), entries)
            .await
            .context(RankSnafu)?;
        Ok(ArchiveRsp {
            entries: ranked.into_iter().map(EntryRsp::from).collect(),
        })
    }

    match archive1(state.as_ref()).await {
        Ok(rsp) => {
            debug!("served the archive ({} entries)", rsp.entries.len());
            Json(rsp).into_response()
        }
        Err(err) => {
            error!("archive request failed: {}", err);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                 `GET /authors/{id}/entries`                                    //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// One author's entries, most recent first: their home view. Unlike the archive, this is recency
/// order, not score order.
async fn author_entries(
    State(state): State<Arc<Inklings>>,
    Path(id): Path<i64>,
) -> axum::response::Response {
    async fn author_entries1(state: &Inklings, id: AuthorId) -> Result<ArchiveRsp> {
        let author = author_or_404(state, id).await?;
        let entries = compose::by_author(state.storage.as_ref(), author.id)
            .await
            .context(ComposeSnafu)?;
        Ok(ArchiveRsp {
            entries: entries.into_iter().map(EntryRsp::from).collect(),
        })
    }

    match author_entries1(state.as_ref(), AuthorId::from(id)).await {
        Ok(rsp) => {
            debug!("served author {}'s view ({} entries)", id, rsp.entries.len());
            Json(rsp).into_response()
        }
        Err(err @ Error::UnknownAuthor { .. }) => {
            info!("{}", err);
            err.into_response()
        }
        Err(err) => {
            error!("author view request for {} failed: {}", id, err);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                        `POST /entries`                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Debug, Deserialize)]
struct ComposeReq {
    /// Present to edit an existing entry; absent to compose a new one.
    id: Option<EntryId>,
    author: AuthorId,
    title: String,
    markdown: String,
}

/// Compose a new entry, or re-title/re-word an existing one.
///
/// With no `id`, a new entry is created: the markdown is rendered, a fresh slug derived from the
/// title. With an `id`, the named entry's title, markdown & HTML are overwritten; its slug never
/// changes.
async fn compose_entry(
    State(state): State<Arc<Inklings>>,
    Json(req): Json<ComposeReq>,
) -> axum::response::Response {
    async fn compose1(state: &Inklings, req: &ComposeReq) -> Result<(StatusCode, EntryRsp)> {
        let storage = state.storage.as_ref();
        match req.id {
            Some(id) => compose::update(storage, id, &req.title, &req.markdown)
                .await
                .map(|entry| (StatusCode::OK, EntryRsp::from(entry)))
                .context(ComposeSnafu),
            None => compose::create(storage, req.author, &req.title, &req.markdown)
                .await
                .map(|entry| (StatusCode::CREATED, EntryRsp::from(entry)))
                .context(ComposeSnafu),
        }
    }

    match compose1(state.as_ref(), &req).await {
        Ok((code, rsp)) => (code, Json(rsp)).into_response(),
        Err(Error::Compose {
            source: compose::Error::Storage { ref source, .. },
        }) if source.is_not_found() => {
            info!("compose request named an unknown entry id");
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponseBody {
                    error: "No entry with that id".to_owned(),
                }),
            )
                .into_response()
        }
        Err(err) => {
            error!("compose request failed: {}", err);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                     `GET /entries/{slug}`                                      //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A single entry, with its tally and -- when the caller identifies themselves -- their own vote
/// state.
async fn entry(
    State(state): State<Arc<Inklings>>,
    Path(slug): Path<String>,
    headers: HeaderMap,
) -> axum::response::Response {
    async fn entry1(state: &Inklings, slug: &str, headers: &HeaderMap) -> Result<SingleEntryRsp> {
        let storage = state.storage.as_ref();
        let entry = entry_or_404(state, slug).await?;
        let tally = votes::tally(storage, entry.id).await.context(VoteSnafu)?;
        let viewer = match viewer_from_headers(headers)? {
            Some(author) => votes::viewer_state(storage, entry.id, author)
                .await
                .context(VoteSnafu)?,
            None => ViewerState::NotVoted,
        };
        Ok(SingleEntryRsp {
            entry: EntryRsp::from(entry),
            tally,
            viewer,
        })
    }

    match entry1(state.as_ref(), &slug, &headers).await {
        Ok(rsp) => Json(rsp).into_response(),
        Err(err @ (Error::BadSlug { .. } | Error::UnknownEntry { .. })) => {
            info!("{}", err);
            err.into_response()
        }
        Err(err) => {
            error!("entry request for \"{}\" failed: {}", slug, err);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                    `DELETE /entries/{slug}`                                    //
////////////////////////////////////////////////////////////////////////////////////////////////////

async fn delete_entry(
    State(state): State<Arc<Inklings>>,
    Path(slug): Path<String>,
) -> axum::response::Response {
    async fn delete1(state: &Inklings, slug: &str) -> Result<()> {
        let entry = entry_or_404(state, slug).await?;
        compose::delete(state.storage.as_ref(), &entry.slug)
            .await
            .context(ComposeSnafu)
    }

    match delete1(state.as_ref(), &slug).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err @ (Error::BadSlug { .. } | Error::UnknownEntry { .. })) => {
            info!("{}", err);
            err.into_response()
        }
        Err(err) => {
            error!("delete request for \"{}\" failed: {}", slug, err);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                  `POST /entries/{slug}/vote`                                   //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Debug, Deserialize)]
struct VoteReq {
    author: AuthorId,
    direction: Direction,
}

/// Cast (or flip) a vote; responds with the updated tally & the voter's new state.
async fn vote(
    State(state): State<Arc<Inklings>>,
    Path(slug): Path<String>,
    Json(req): Json<VoteReq>,
) -> axum::response::Response {
    async fn vote1(state: &Inklings, slug: &str, req: &VoteReq) -> Result<VoteRsp> {
        let storage = state.storage.as_ref();
        let entry = entry_or_404(state, slug).await?;
        votes::apply_vote(storage, entry.id, req.author, req.direction)
            .await
            .context(VoteSnafu)?;
        let tally = votes::tally(storage, entry.id).await.context(VoteSnafu)?;
        let viewer = votes::viewer_state(storage, entry.id, req.author)
            .await
            .context(VoteSnafu)?;
        Ok(VoteRsp { tally, viewer })
    }

    match vote1(state.as_ref(), &slug, &req).await {
        Ok(rsp) => {
            info!(
                "{} voted {} on \"{}\" (now {:+})",
                req.author, req.direction, slug, rsp.tally.net
            );
            Json(rsp).into_response()
        }
        Err(err @ (Error::BadSlug { .. } | Error::UnknownEntry { .. })) => {
            info!("{}", err);
            err.into_response()
        }
        Err(err) => {
            error!("vote request for \"{}\" failed: {}", slug, err);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                `POST /entries/{slug}/comments`                                 //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Debug, Deserialize)]
struct CommentReq {
    author: AuthorId,
    text: String,
}

/// Append a comment to an entry's log. Blank text is rejected at this edge; the appender itself
/// would also skip it.
async fn comment(
    State(state): State<Arc<Inklings>>,
    Path(slug): Path<String>,
    Json(req): Json<CommentReq>,
) -> axum::response::Response {
    async fn comment1(state: &Inklings, slug: &str, req: &CommentReq) -> Result<()> {
        ensure!(!req.text.trim().is_empty(), BlankCommentSnafu);
        let entry = entry_or_404(state, slug).await?;
        comments::append(state.storage.as_ref(), entry.id, req.author, &req.text)
            .await
            .context(CommentSnafu)
    }

    match comment1(state.as_ref(), &slug, &req).await {
        Ok(()) => {
            info!("{} commented on \"{}\"", req.author, slug);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err @ (Error::BadSlug { .. } | Error::UnknownEntry { .. } | Error::BlankComment { .. })) => {
            info!("{}", err);
            err.into_response()
        }
        Err(err) => {
            error!("comment request for \"{}\" failed: {}", slug, err);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                             router                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

pub fn make_router(state: Arc<Inklings>) -> Router {
    Router::new()
        .route("/entries", get(archive).post(compose_entry))
        .route("/entries/{slug}", get(entry).delete(delete_entry))
        .route("/entries/{slug}/vote", post(vote))
        .route("/entries/{slug}/comments", post(comment))
        .route("/authors/{id}/entries", get(author_entries))
        // All responses are JSON; add the appropriate Content-Type header (but leave the existing
        // Content-Type header should a handler set it specially).
        .layer(SetResponseHeaderLayer::if_not_present(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
