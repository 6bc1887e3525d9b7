//! Static file endpoints and the SPA fallback.

use std::path::Path;

use axum::{
    extract::{Path as UrlPath, State},
    http::{header, Method, Uri},
    response::{IntoResponse, Response},
};

use crate::assets::{
    cache_control_for, content_type_for, is_allowed_share_image, is_blocked_share_image_path,
    resolve_in_root, NamedAsset, IMAGE_CACHE, NO_CACHE, SHARE_IMAGE_DIR,
};
use crate::errors::AppError;
use crate::AppState;

/// Read a file and respond with the given content type and cache policy.
pub async fn serve_file(
    path: &Path,
    content_type: &str,
    cache_control: &str,
) -> Result<Response, AppError> {
    let bytes = tokio::fs::read(path).await?;
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, cache_control),
        ],
        bytes,
    )
        .into_response())
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

/// GET /favicon.ico, /manifest.json, ... - Root-level files with fixed headers.
pub async fn named_asset(state: &AppState, asset: &NamedAsset) -> Result<Response, AppError> {
    let path = state.config.build_dir.join(asset.file);
    serve_file(&path, asset.content_type, asset.cache_control)
        .await
        .map_err(|e| match e {
            AppError::NotFound(_) => AppError::NotFound(format!("{} not found", asset.route)),
            other => other,
        })
}

/// GET /share-images/:imageName - Allow-listed social share images.
pub async fn share_image(
    State(state): State<AppState>,
    UrlPath(image_name): UrlPath<String>,
) -> Result<Response, AppError> {
    if !is_allowed_share_image(&image_name) {
        tracing::debug!("Rejected share image request for {:?}", image_name);
        return Err(AppError::NotFound("Image not found".to_string()));
    }

    let path = state
        .config
        .build_dir
        .join(SHARE_IMAGE_DIR)
        .join(&image_name);
    serve_file(&path, content_type_for(&path), IMAGE_CACHE)
        .await
        .map_err(|e| match e {
            AppError::NotFound(_) => AppError::NotFound("Image not found".to_string()),
            other => other,
        })
}

/// GET * - Serve a build file if one matches, otherwise `index.html` for client routing.
pub async fn spa_fallback(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
) -> Result<Response, AppError> {
    if method != Method::GET && method != Method::HEAD {
        return Err(AppError::NotFound(format!(
            "Cannot {} {}",
            method,
            uri.path()
        )));
    }

    // paths the share image route did not match still obey its allow-list
    if is_blocked_share_image_path(uri.path()) {
        tracing::debug!("Rejected share image path {:?}", uri.path());
        return Err(AppError::NotFound("Image not found".to_string()));
    }

    let build_dir = &state.config.build_dir;
    if let Some(path) = resolve_in_root(build_dir, uri.path()) {
        if is_file(&path).await {
            return serve_file(&path, content_type_for(&path), cache_control_for(&path)).await;
        }
    }

    tracing::debug!("SPA fallback for {}", uri.path());
    serve_file(
        &build_dir.join("index.html"),
        "text/html; charset=utf-8",
        NO_CACHE,
    )
    .await
    .map_err(|e| match e {
        AppError::NotFound(_) => {
            tracing::warn!("index.html missing from {:?}", build_dir);
            AppError::NotFound("Application build not found".to_string())
        }
        other => other,
    })
}
