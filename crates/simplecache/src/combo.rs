use std::collections::HashMap;

use http::{HeaderMap, Response, StatusCode};
use time::OffsetDateTime;

use crate::amd;
use crate::app::{Application, ViewSystem, minimal_boot};
use crate::error::CacheError;
use crate::handler::{error_response, etag_matches, forbidden, respond, timestamp_matches};
use crate::headers::{etag_for, insert_cache_headers, set_content_type};
use crate::request::{ComboRequest, parse_combo_vars};
use crate::store::CacheStore;

/// Serves several AMD modules concatenated into one script:
/// `?m=<space separated modules>&ts=<ts>`.
pub struct ComboHandler<A: Application> {
    app: A,
}

impl<A: Application> ComboHandler<A> {
    pub fn new(app: A) -> Self {
        Self { app }
    }

    pub fn handle_request(&self, get_vars: &HashMap<String, String>, request_headers: &HeaderMap) -> Response<String> {
        let Some(request) = parse_combo_vars(
            get_vars.get("m").map(String::as_str),
            get_vars.get("ts").map(String::as_str),
        ) else {
            return forbidden(CacheError::BAD_REQUEST);
        };

        let mut headers = HeaderMap::new();
        set_content_type(&mut headers, "text/javascript");

        match self.serve(&request, request_headers, &mut headers) {
            Ok((status, body)) => respond(status, headers, body),
            Err(e) => error_response(e, headers),
        }
    }

    fn serve(
        &self,
        request: &ComboRequest,
        request_headers: &HeaderMap,
        headers: &mut HeaderMap,
    ) -> Result<(StatusCode, String), CacheError> {
        let settings = minimal_boot(&self.app)?;

        if !settings.simplecache_enabled {
            let views = self.app.boot_core()?;
            return Ok((StatusCode::OK, combine(views.as_ref(), &request.modules, false)?));
        }

        let etag = etag_for(&request.ts);
        if etag_matches(request_headers, &etag) {
            return Ok((StatusCode::NOT_MODIFIED, String::new()));
        }

        let store = CacheStore::new(settings.cache_dir());
        let key = format!("combo|{}", request.modules.join(" "));
        match store.read(&key) {
            Ok(Some(content)) => {
                insert_cache_headers(headers, &etag, OffsetDateTime::now_utc());
                return Ok((StatusCode::OK, content));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "unreadable combo cache file"),
        }

        let views = self.app.boot_core()?;
        if !timestamp_matches(&request.ts, self.app.last_cache()?) {
            return Ok((StatusCode::OK, combine(views.as_ref(), &request.modules, false)?));
        }

        let content = combine(views.as_ref(), &request.modules, true)?;
        if let Err(e) = store.write(&key, &content) {
            tracing::warn!(error = %e, "unable to write combo cache file");
        }
        insert_cache_headers(headers, &etag, OffsetDateTime::now_utc());
        Ok((StatusCode::OK, content))
    }
}

/// Concatenate the modules' views, naming anonymous modules and skipping
/// empty output and scripts that are not modules.
fn combine(views: &dyn ViewSystem, modules: &[String], for_cache: bool) -> Result<String, CacheError> {
    let mut parts = Vec::with_capacity(modules.len());
    for module in modules {
        let view = format!("js/{module}.js");
        if !views.is_cacheable(&view) {
            return Err(CacheError::Forbidden(CacheError::BAD_REQUEST));
        }
        if !views.view_exists(&view, "default") {
            continue;
        }
        let mut output = views.render(&view, "default");
        if for_cache {
            output = views.process_for_cache(&view, "default", output);
        }
        if output.is_empty() {
            continue;
        }
        let filtered = amd::filter(&view, &output);
        if filtered == output && !amd::has_named_define(&output) {
            tracing::debug!(module = %module, "skipping non-module script");
            continue;
        }
        parts.push(filtered);
    }
    Ok(parts.join("\n"))
}
