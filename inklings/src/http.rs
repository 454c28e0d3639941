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

//! # http
//!
//! Shared plumbing for the JSON request layer.

use crate::storage::Backend as StorageBackend;

use axum::Json;
use serde::{Deserialize, Serialize};

/// A serializable struct for use in HTTP error responses
///
/// Every handler in this service returns a JSON body, errors included. There's no way to *enforce*
/// that rule on axum handlers, but there can at least be one standard representation of an error
/// response for them all to use; the [IntoResponse] implementations on the per-module error types
/// go through this.
///
/// [IntoResponse]: https://docs.rs/axum/latest/axum/response/trait.IntoResponse.html
#[derive(Debug, Deserialize, Serialize)]
pub struct ErrorResponseBody {
    pub error: String,
}

impl axum::response::IntoResponse for ErrorResponseBody {
    fn into_response(self) -> axum::response::Response {
        Json(self).into_response()
    }
}

/// Application state available to all handlers
///
/// One of these is built at startup & handed to each router inside an [Arc]; handlers reach the
/// storage layer through it and nothing else. No component holds its own connection -- the pool
/// lives here, behind the [Backend] trait.
///
/// [Arc]: std::sync::Arc
/// [Backend]: crate::storage::Backend
pub struct Inklings {
    pub storage: Box<dyn StorageBackend + Send + Sync>,
}
