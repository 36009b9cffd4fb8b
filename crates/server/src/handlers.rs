//! Wire protocol handlers.
//!
//! Maps the binary cache HTTP protocol onto the upstream [`MultiStore`],
//! with an optional local write-through cache. Serving a narinfo records
//! which upstream produced it, keyed by NAR pathname, so the NAR request
//! that typically follows is routed to the same upstream instead of
//! re-probing the whole fallback chain.
//!
//! [`MultiStore`]: larder_store::MultiStore

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use larder_core::{Compression, NarInfo, NarListing, StorePathHash};
use larder_store::{ByteStream, Store, WritableStore};
use tracing::warn;

/// GET /nix-cache-info
pub async fn get_cache_info(State(state): State<AppState>) -> impl IntoResponse {
    let body = format!(
        "StoreDir: {}\nWantMassQuery: 1\nPriority: {}\n",
        state.store.store_dir(),
        state.priority
    );
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/x-nix-cache-info")],
        body,
    )
}

/// Fallback handler for `/{hash}.narinfo` and `/{hash}.ls`.
/// These use a fallback since axum doesn't support `/{param}.suffix`
/// route patterns.
pub async fn meta_fallback(State(state): State<AppState>, req: Request) -> Response {
    let path = req.uri().path().to_string();

    let (hash, kind) = if let Some(hash) = path
        .strip_prefix('/')
        .and_then(|p| p.strip_suffix(".narinfo"))
    {
        (hash, MetaKind::NarInfo)
    } else if let Some(hash) = path.strip_prefix('/').and_then(|p| p.strip_suffix(".ls")) {
        (hash, MetaKind::Listing)
    } else {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    };

    let Ok(hash) = StorePathHash::new(hash) else {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    };

    let method = req.method().clone();
    let result = if method == Method::GET || method == Method::HEAD {
        match kind {
            MetaKind::NarInfo => get_narinfo(&state, &hash).await,
            MetaKind::Listing => get_listing(&state, &hash).await,
        }
    } else if method == Method::PUT {
        match kind {
            MetaKind::NarInfo => put_narinfo(&state, &hash, req).await,
            MetaKind::Listing => put_listing(&state, &hash, req).await,
        }
    } else {
        Err(ApiError::MethodNotAllowed)
    };
    result.unwrap_or_else(IntoResponse::into_response)
}

#[derive(Clone, Copy)]
enum MetaKind {
    NarInfo,
    Listing,
}

fn narinfo_response(info: &NarInfo) -> Response {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/x-nix-narinfo")],
        info.to_text(),
    )
        .into_response()
}

async fn get_narinfo(state: &AppState, hash: &StorePathHash) -> ApiResult<Response> {
    if let Some(local) = &state.local
        && let Ok(info) = local.get_info(hash).await
    {
        return Ok(narinfo_response(&info));
    }

    let located = state.store.get_info(hash).await?;
    state
        .affinity
        .insert(located.value.nar_pathname.clone(), located.source);

    if let Some(local) = &state.local
        && let Err(e) = local.put_info(hash, &located.value).await
    {
        warn!(%hash, "failed to cache narinfo locally: {e}");
    }
    Ok(narinfo_response(&located.value))
}

async fn put_narinfo(state: &AppState, hash: &StorePathHash, req: Request) -> ApiResult<Response> {
    let local = writable(state)?;
    let body = read_body_text(req).await?;
    let info = NarInfo::parse(&body, local.store_dir(), hash.clone())
        .map_err(|e| ApiError::BadRequest(format!("invalid narinfo: {e}")))?;
    local.put_info(hash, &info).await?;
    Ok((StatusCode::OK, "ok").into_response())
}

async fn get_listing(state: &AppState, hash: &StorePathHash) -> ApiResult<Response> {
    let listing = match &state.local {
        Some(local) => match local.get_listing(hash).await {
            Ok(listing) => listing,
            Err(_) => {
                let located = state.store.get_listing(hash).await?;
                if let Err(e) = local.put_listing(hash, &located.value).await {
                    warn!(%hash, "failed to cache listing locally: {e}");
                }
                located.value
            }
        },
        None => state.store.get_listing(hash).await?.value,
    };
    Ok((
        StatusCode::OK,
        [(CONTENT_TYPE, "application/json")],
        listing.to_json(),
    )
        .into_response())
}

async fn put_listing(state: &AppState, hash: &StorePathHash, req: Request) -> ApiResult<Response> {
    let local = writable(state)?;
    let body = read_body_text(req).await?;
    let listing = NarListing::from_json(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid listing: {e}")))?;
    local.put_listing(hash, &listing).await?;
    Ok((StatusCode::OK, "ok").into_response())
}

/// GET /nar/{name} — serve a NAR, locally when cached, otherwise from the
/// affinity-routed (or fallback) upstream, writing through on the way.
pub async fn get_nar(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    let pathname = format!("nar/{name}");

    if let Some(local) = &state.local
        && let Ok(stream) = local.get_nar(&pathname).await
    {
        return Ok(nar_response(&pathname, stream));
    }

    // Copy the index out so the map guard is not held across the fetch.
    let source = state.affinity.get(&pathname).map(|entry| *entry.value());
    let upstream = match source {
        // The narinfo that referenced this NAR came from one specific
        // upstream; the NAR lives only there, so no fallback.
        Some(source) => state.store.get_nar_from(source, &pathname).await?,
        None => state.store.get_nar(&pathname).await?,
    };

    match &state.local {
        Some(local) => {
            // Stage through the local cache so the response is served from
            // a complete file and the next request never leaves disk.
            local.put_nar(&pathname, upstream).await?;
            let stream = local.get_nar(&pathname).await?;
            Ok(nar_response(&pathname, stream))
        }
        None => Ok(nar_response(&pathname, upstream)),
    }
}

/// PUT /nar/{name}
pub async fn put_nar(
    State(state): State<AppState>,
    Path(name): Path<String>,
    req: Request,
) -> ApiResult<Response> {
    let local = writable(&state)?;
    let pathname = format!("nar/{name}");
    let body: ByteStream = Box::pin(
        req.into_body()
            .into_data_stream()
            .map(|chunk| chunk.map_err(|e| larder_store::StoreError::Io(std::io::Error::other(e)))),
    );
    local.put_nar(&pathname, body).await?;
    Ok((StatusCode::OK, "ok").into_response())
}

fn nar_response(pathname: &str, stream: ByteStream) -> Response {
    let content_type = match Compression::from_extension(pathname) {
        Compression::None => "application/x-nix-nar",
        Compression::Gzip => "application/gzip",
        Compression::Bzip2 => "application/x-bzip2",
        Compression::Zstd => "application/zstd",
        Compression::Xz => "application/x-xz",
    };
    let body = Body::from_stream(stream.map(|chunk| chunk.map_err(std::io::Error::other)));
    (StatusCode::OK, [(CONTENT_TYPE, content_type)], body).into_response()
}

fn writable(state: &AppState) -> ApiResult<&dyn WritableStore> {
    state
        .local
        .as_deref()
        .and_then(|local| local.as_writable())
        .ok_or(ApiError::NotWritable)
}

async fn read_body_text(req: Request) -> ApiResult<String> {
    let bytes = axum::body::to_bytes(req.into_body(), 16 * 1024 * 1024)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
    String::from_utf8(bytes.to_vec()).map_err(|e| ApiError::BadRequest(format!("invalid utf-8: {e}")))
}
