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

//! # Authors API
//!
//! Author creation, and nothing else: no login, no logout, no sessions. The one job this module
//! does beyond the insert is making sure the submitted password is hashed (Argon2id) before it
//! goes anywhere near storage -- the stored credential is a PHC hash string, and no endpoint
//! anywhere compares it to anything.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer};
use tracing::{error, info};

use crate::{
    entities::{self, AuthorId, NewAuthor},
    http::{ErrorResponseBody, Inklings},
    storage,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to add author: {source}"))]
    AddAuthor { source: storage::Error },
    #[snafu(display("Invalid signup: {source}"))]
    Invalid { source: entities::Error },
}

impl Error {
    pub fn as_status_and_msg(&self) -> (StatusCode, String) {
        match self {
            Error::AddAuthor { source } if source.is_conflict() => (
                StatusCode::CONFLICT,
                "An author with that e-mail already exists".to_owned(),
            ),
            Error::AddAuthor { source } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to add author: {}", source),
            ),
            Error::Invalid { source } => (StatusCode::BAD_REQUEST, format!("{}", source)),
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

#[derive(Clone, Debug, Deserialize)]
struct CreateReq {
    email: String,
    name: String,
    password: SecretString,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CreateRsp {
    pub id: AuthorId,
    pub name: String,
}

/// Create an author
///
/// Parameters:
///
/// - email: a contact e-mail; must be unique among authors
///
/// - name: the author's display name; arbitrary non-blank UTF-8
///
/// - password: arbitrary UTF-8; hashed with Argon2id under a fresh salt before storage, and never
///   stored or logged in the clear
async fn create(
    State(state): State<Arc<Inklings>>,
    Json(req): Json<CreateReq>,
) -> axum::response::Response {
    async fn create1(state: &Inklings, req: &CreateReq) -> Result<CreateRsp> {
        let new = NewAuthor::new(&req.email, &req.name, &req.password).context(InvalidSnafu)?;
        let author = state.storage.add_author(&new).await.context(AddAuthorSnafu)?;
        Ok(CreateRsp {
            id: author.id,
            name: author.name,
        })
    }

    match create1(state.as_ref(), &req).await {
        Ok(rsp) => {
            info!("created author {} ({})", rsp.id, rsp.name);
            (StatusCode::CREATED, Json(rsp)).into_response()
        }
        Err(err) => {
            let (code, _) = err.as_status_and_msg();
            if code.is_server_error() {
                error!("author creation failed: {}", err);
            } else {
                info!("author creation rejected: {}", err);
            }
            err.into_response()
        }
    }
}

pub fn make_router(state: Arc<Inklings>) -> Router {
    Router::new()
        .route("/authors", post(create))
        .layer(SetResponseHeaderLayer::if_not_present(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::storage::{test::InMemory, Backend as _};

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let storage = InMemory::new();
        let new = NewAuthor::new("a@example.com", "A", &"pw".to_owned().into()).unwrap();
        storage.add_author(&new).await.unwrap();
        let err = Error::AddAuthor {
            source: storage.add_author(&new).await.unwrap_err(),
        };
        assert_eq!(err.as_status_and_msg().0, StatusCode::CONFLICT);
    }
}
