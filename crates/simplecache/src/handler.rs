use std::collections::HashMap;

use http::header::IF_NONE_MATCH;
use http::{HeaderMap, Response, StatusCode};
use time::OffsetDateTime;

use crate::app::{Application, ViewSystem, minimal_boot};
use crate::error::CacheError;
use crate::headers::{content_type_for, etag_for, insert_cache_headers, set_content_type};
use crate::request::{ViewRequest, parse_request_var};
use crate::store::CacheStore;

pub(crate) fn forbidden(message: &'static str) -> Response<String> {
    let mut response = Response::new(message.to_string());
    *response.status_mut() = StatusCode::FORBIDDEN;
    response
}

pub(crate) fn error_response(err: CacheError, mut headers: HeaderMap) -> Response<String> {
    match &err {
        CacheError::Forbidden(_) => {}
        other => tracing::warn!(error = %other, "simplecache request failed"),
    }
    headers.clear();
    forbidden(err.client_message())
}

pub(crate) fn respond(status: StatusCode, headers: HeaderMap, body: String) -> Response<String> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

pub(crate) fn etag_matches(request_headers: &HeaderMap, etag: &str) -> bool {
    request_headers
        .get(IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == etag)
}

pub(crate) fn timestamp_matches(ts: &str, last_cache: i64) -> bool {
    ts.parse::<i64>().is_ok_and(|ts| ts == last_cache)
}

/// Serves `/<ts>/<viewtype>/<view>` from the on-disk cache, rendering and
/// persisting on a miss.
pub struct CacheHandler<A: Application> {
    app: A,
}

impl<A: Application> CacheHandler<A> {
    pub fn new(app: A) -> Self {
        Self { app }
    }

    pub fn app(&self) -> &A {
        &self.app
    }

    pub fn handle_request(&self, get_vars: &HashMap<String, String>, request_headers: &HeaderMap) -> Response<String> {
        let Some(request) = get_vars
            .get("request")
            .filter(|r| !r.is_empty())
            .and_then(|r| parse_request_var(r))
        else {
            return forbidden(CacheError::BAD_REQUEST);
        };

        let mut headers = HeaderMap::new();
        if let Some(content_type) = content_type_for(&request.view) {
            set_content_type(&mut headers, content_type);
        }

        match self.serve(&request, request_headers, &mut headers) {
            Ok((status, body)) => respond(status, headers, body),
            Err(e) => error_response(e, headers),
        }
    }

    fn serve(
        &self,
        request: &ViewRequest,
        request_headers: &HeaderMap,
        headers: &mut HeaderMap,
    ) -> Result<(StatusCode, String), CacheError> {
        let settings = minimal_boot(&self.app)?;

        if !settings.simplecache_enabled {
            let views = self.app.boot_core()?;
            if !views.is_cacheable(&request.view) {
                return Err(CacheError::Forbidden(CacheError::BAD_REQUEST));
            }
            return Ok((StatusCode::OK, render_view(views.as_ref(), request)?));
        }

        let etag = etag_for(&request.ts);
        if etag_matches(request_headers, &etag) {
            return Ok((StatusCode::NOT_MODIFIED, String::new()));
        }

        let store = CacheStore::new(settings.cache_dir());
        let key = format!("{}|{}", request.viewtype, request.view);
        match store.read(&key) {
            Ok(Some(content)) => {
                tracing::debug!(view = %request.view, "simplecache hit");
                insert_cache_headers(headers, &etag, OffsetDateTime::now_utc());
                return Ok((StatusCode::OK, content));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, view = %request.view, "unreadable simplecache file"),
        }

        let views = self.app.boot_core()?;
        if !views.is_cacheable(&request.view) {
            return Err(CacheError::Forbidden(CacheError::BAD_REQUEST));
        }

        if !timestamp_matches(&request.ts, self.app.last_cache()?) {
            // Stale timestamp: serve without long-lived caching so the client
            // comes back with the current one.
            tracing::debug!(view = %request.view, ts = %request.ts, "stale simplecache timestamp");
            return Ok((StatusCode::OK, render_view(views.as_ref(), request)?));
        }

        let content = render_view(views.as_ref(), request)?;
        let content = views.process_for_cache(&request.view, &request.viewtype, content);
        if let Err(e) = store.write(&key, &content) {
            tracing::warn!(error = %e, view = %request.view, "unable to write simplecache file");
        } else {
            tracing::debug!(view = %request.view, "simplecache file written");
        }
        insert_cache_headers(headers, &etag, OffsetDateTime::now_utc());
        Ok((StatusCode::OK, content))
    }
}

fn render_view(views: &dyn ViewSystem, request: &ViewRequest) -> Result<String, CacheError> {
    if !views.view_exists(&request.view, &request.viewtype) {
        return Err(CacheError::Forbidden(CacheError::BAD_REQUEST));
    }
    Ok(views.render(&request.view, &request.viewtype))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn etag_comparison_trims() {
        let mut headers = HeaderMap::new();
        assert!(!etag_matches(&headers, "\"5\""));
        headers.insert(IF_NONE_MATCH, HeaderValue::from_static(" \"5\" "));
        assert!(etag_matches(&headers, "\"5\""));
        assert!(!etag_matches(&headers, "\"6\""));
    }

    #[test]
    fn timestamps_compare_numerically() {
        assert!(timestamp_matches("0042", 42));
        assert!(!timestamp_matches("41", 42));
        assert!(!timestamp_matches("99999999999999999999", 42));
    }
}
