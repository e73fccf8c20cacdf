use http::HeaderMap;
use http::header::{CACHE_CONTROL, CONTENT_TYPE, ETAG, EXPIRES, HeaderValue, PRAGMA};
use time::{Date, Duration, Month, OffsetDateTime};

/// Content type implied by a view's first path segment.
pub fn content_type_for(view: &str) -> Option<&'static str> {
    match view.split('/').next() {
        Some("css") => Some("text/css"),
        Some("js") => Some("text/javascript"),
        _ => None,
    }
}

pub fn set_content_type(headers: &mut HeaderMap, content_type: &'static str) {
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
}

/// `"<ts>"`
pub fn etag_for(ts: &str) -> String {
    format!("\"{ts}\"")
}

/// Long-lived caching headers: six months' expiry, public, with `etag`.
pub fn insert_cache_headers(headers: &mut HeaderMap, etag: &str, now: OffsetDateTime) {
    if let Ok(expires) = HeaderValue::from_str(&http_date(add_months(now, 6))) {
        headers.insert(EXPIRES, expires);
    }
    headers.insert(PRAGMA, HeaderValue::from_static("public"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("public"));
    if let Ok(etag) = HeaderValue::from_str(etag) {
        headers.insert(ETAG, etag);
    }
}

/// Calendar month arithmetic; a day past the end of the target month rolls
/// into the next one.
pub fn add_months(at: OffsetDateTime, months: u8) -> OffsetDateTime {
    let zero_based = i32::from(u8::from(at.month())) - 1 + i32::from(months);
    let year = at.year() + zero_based / 12;
    let target = Month::try_from((zero_based % 12 + 1) as u8)
        .and_then(|month| Date::from_calendar_date(year, month, 1));
    match target {
        Ok(first) => at
            .replace_date(first)
            .saturating_add(Duration::days(i64::from(at.day()) - 1)),
        Err(_) => at.saturating_add(Duration::days(183)),
    }
}

/// `D, d M Y H:i:s GMT`
pub fn http_date(at: OffsetDateTime) -> String {
    let at = at.to_offset(time::UtcOffset::UTC);
    let weekday = at.weekday().to_string();
    let month = at.month().to_string();
    format!(
        "{}, {:02} {} {} {:02}:{:02}:{:02} GMT",
        &weekday[..3],
        at.day(),
        &month[..3],
        at.year(),
        at.hour(),
        at.minute(),
        at.second()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn formats_http_dates() {
        assert_eq!(http_date(datetime!(2024-03-05 07:08:09 UTC)), "Tue, 05 Mar 2024 07:08:09 GMT");
    }

    #[test]
    fn adds_calendar_months() {
        assert_eq!(add_months(datetime!(2024-01-15 12:00 UTC), 6), datetime!(2024-07-15 12:00 UTC));
        assert_eq!(add_months(datetime!(2024-09-30 00:00 UTC), 6), datetime!(2025-03-30 00:00 UTC));
        // Feb 31 rolls over into March.
        assert_eq!(add_months(datetime!(2023-08-31 00:00 UTC), 6), datetime!(2024-03-02 00:00 UTC));
    }

    #[test]
    fn content_types_by_prefix() {
        assert_eq!(content_type_for("css/elgg"), Some("text/css"));
        assert_eq!(content_type_for("js/lib/x.js"), Some("text/javascript"));
        assert_eq!(content_type_for("json/x"), None);
        assert_eq!(content_type_for("cssx/y"), None);
    }

    #[test]
    fn cache_headers_are_public() {
        let mut headers = HeaderMap::new();
        insert_cache_headers(&mut headers, &etag_for("42"), datetime!(2024-01-01 00:00 UTC));
        assert_eq!(headers[CACHE_CONTROL], "public");
        assert_eq!(headers[PRAGMA], "public");
        assert_eq!(headers[ETAG], "\"42\"");
        assert_eq!(headers[EXPIRES], "Mon, 01 Jul 2024 00:00:00 GMT");
    }
}
