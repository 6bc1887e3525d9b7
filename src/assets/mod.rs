//! Static asset lookup: content types, cache policy and the fixed allow-lists.

use std::path::{Component, Path, PathBuf};

pub const NO_CACHE: &str = "no-cache, no-store, must-revalidate";
pub const IMMUTABLE: &str = "public, max-age=31536000, immutable";
pub const IMAGE_CACHE: &str = "public, max-age=2592000";
pub const DAILY_CACHE: &str = "public, max-age=86400";
pub const DEFAULT_CACHE: &str = "public, max-age=3600";

/// Directory under the build root holding social share images.
pub const SHARE_IMAGE_DIR: &str = "share-images";

/// Share images that may be served. Anything else is a 404.
pub const SHARE_IMAGES: &[&str] = &[
    "default-share.jpg",
    "home-share.jpg",
    "directory-share.jpg",
    "business-share.jpg",
    "news-share.jpg",
    "events-share.jpg",
    "questions-share.jpg",
    "referral-share.jpg",
];

/// A root-level file served under a fixed route.
#[derive(Debug, Clone, Copy)]
pub struct NamedAsset {
    pub route: &'static str,
    pub file: &'static str,
    pub content_type: &'static str,
    pub cache_control: &'static str,
}

pub const NAMED_ASSETS: &[NamedAsset] = &[
    NamedAsset {
        route: "/favicon.ico",
        file: "favicon.ico",
        content_type: "image/x-icon",
        cache_control: DAILY_CACHE,
    },
    NamedAsset {
        route: "/favicon.webp",
        file: "favicon.webp",
        content_type: "image/webp",
        cache_control: DAILY_CACHE,
    },
    NamedAsset {
        route: "/manifest.json",
        file: "manifest.json",
        content_type: "application/json",
        cache_control: DAILY_CACHE,
    },
    NamedAsset {
        route: "/logo192.png",
        file: "logo192.png",
        content_type: "image/png",
        cache_control: IMAGE_CACHE,
    },
    NamedAsset {
        route: "/logo512.png",
        file: "logo512.png",
        content_type: "image/png",
        cache_control: IMAGE_CACHE,
    },
    NamedAsset {
        route: "/robots.txt",
        file: "robots.txt",
        content_type: "text/plain; charset=utf-8",
        cache_control: DAILY_CACHE,
    },
];

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

pub fn content_type_for(path: &Path) -> &'static str {
    match extension(path).as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "js" | "mjs" => "application/javascript; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "json" | "map" => "application/json",
        "webmanifest" => "application/manifest+json",
        "txt" => "text/plain; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        _ => "application/octet-stream",
    }
}

pub fn cache_control_for(path: &Path) -> &'static str {
    match extension(path).as_str() {
        "html" | "htm" => NO_CACHE,
        "js" | "mjs" | "css" | "woff" | "woff2" | "ttf" | "map" => IMMUTABLE,
        "png" | "jpg" | "jpeg" | "webp" | "gif" | "svg" | "ico" => IMAGE_CACHE,
        "json" | "txt" | "webmanifest" => DAILY_CACHE,
        _ => DEFAULT_CACHE,
    }
}

/// Map a request path onto a location under `root`.
///
/// Returns `None` for paths that would escape the root.
pub fn resolve_in_root(root: &Path, request_path: &str) -> Option<PathBuf> {
    let mut resolved = root.to_path_buf();
    for component in Path::new(request_path.trim_start_matches('/')).components() {
        match component {
            Component::Normal(segment) => resolved.push(segment),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(resolved)
}

pub fn is_allowed_share_image(name: &str) -> bool {
    SHARE_IMAGES.contains(&name)
}

/// True when the path lands in the share image directory on anything other
/// than a single allow-listed file name.
///
/// Empty segments and trailing slashes are ignored, the same way
/// `resolve_in_root` ignores them.
pub fn is_blocked_share_image_path(request_path: &str) -> bool {
    let segments: Vec<&str> = Path::new(request_path.trim_start_matches('/'))
        .components()
        .filter_map(|component| match component {
            Component::Normal(segment) => segment.to_str(),
            _ => None,
        })
        .collect();

    match segments.as_slice() {
        [dir, rest @ ..] if *dir == SHARE_IMAGE_DIR => {
            !matches!(rest, [name] if is_allowed_share_image(name))
        }
        _ => false,
    }
}
