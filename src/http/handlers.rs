//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, Uri},
    response::{IntoResponse, Redirect, Response},
};

use crate::playlist::{generate_m3u, playlist_base_url, PLAYLIST_CONTENT_TYPE};
use crate::state::AppState;

/// Playlist endpoint
/// GET /playlist.m3u8
pub async fn playlist(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let host = request_host(&headers, &uri);
    let base_url = playlist_base_url(&state.config.credentials, host);
    let playlist = generate_m3u(&base_url, &state.config.media_files);

    (
        [
            (header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        playlist,
    )
        .into_response()
}

/// GET /
pub async fn root_redirect() -> Redirect {
    Redirect::to("/playlist.m3u8")
}

/// Fallback for everything else
pub async fn not_found() -> impl IntoResponse {
    (axum::http::StatusCode::NOT_FOUND, "Not Found\n")
}

/// The host the client used to reach us: the `Host` header for HTTP/1, the
/// URI authority for HTTP/2.
fn request_host<'a>(headers: &'a HeaderMap, uri: &'a Uri) -> &'a str {
    headers
        .get(header::HOST)
        .and_then(|host| host.to_str().ok())
        .or_else(|| uri.authority().map(|authority| authority.as_str()))
        .unwrap_or("localhost")
}
