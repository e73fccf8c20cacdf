/// A single-view request: `/<ts>/<viewtype>/<view/name.ext>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewRequest {
    pub ts: String,
    pub viewtype: String,
    pub view: String,
}

/// A module aggregation request: `?m=<modules>&ts=<ts>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComboRequest {
    pub ts: String,
    /// Sorted, without duplicates.
    pub modules: Vec<String>,
}

fn allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '-' | '_')
}

/// Parse the `request` variable. Returns `None` for anything containing
/// `..`, characters outside `[A-Za-z0-9/._-]`, or the wrong shape.
pub fn parse_request_var(request: &str) -> Option<ViewRequest> {
    if request.contains("..") || !request.chars().all(allowed_char) {
        return None;
    }
    let rest = request.strip_prefix('/').unwrap_or(request);
    let (ts, rest) = rest.split_once('/')?;
    if ts.is_empty() || !ts.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let (viewtype, view) = rest.split_once('/')?;
    if viewtype.is_empty() || view.is_empty() {
        return None;
    }
    Some(ViewRequest {
        ts: ts.to_string(),
        viewtype: viewtype.to_string(),
        view: view.to_string(),
    })
}

/// Parse the `m` and `ts` variables. The bootstrap module `elgg` and
/// language modules cannot be requested this way.
pub fn parse_combo_vars(modules: Option<&str>, ts: Option<&str>) -> Option<ComboRequest> {
    let modules = modules.filter(|m| !m.is_empty())?;
    let ts = ts?;
    let mut modules: Vec<String> = modules.split(' ').map(str::to_string).collect();
    modules.sort();
    modules.dedup();
    if modules
        .iter()
        .any(|name| name == "elgg" || name.starts_with("languages/"))
    {
        return None;
    }
    Some(ComboRequest {
        ts: ts.to_string(),
        modules,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_view_requests() {
        let req = parse_request_var("/1234/default/js/lib/ui.min.js").unwrap();
        assert_eq!(req.ts, "1234");
        assert_eq!(req.viewtype, "default");
        assert_eq!(req.view, "js/lib/ui.min.js");

        let req = parse_request_var("55/mobile/css/elgg").unwrap();
        assert_eq!(req.view, "css/elgg");
    }

    #[test]
    fn rejects_bad_requests() {
        for bad in [
            "",
            "/1234/default/../secret",
            "/1234/default/css/a b",
            "/1234/default/css/<x>",
            "/abc/default/css/elgg",
            "/1234/default",
            "/1234//css",
            "//default/css",
        ] {
            assert!(parse_request_var(bad).is_none(), "{bad}");
        }
    }

    #[test]
    fn combo_modules_are_sorted_and_unique() {
        let req = parse_combo_vars(Some("b a b c"), Some("9")).unwrap();
        assert_eq!(req.modules, vec!["a", "b", "c"]);
        assert_eq!(req.ts, "9");
    }

    #[test]
    fn combo_rejects_reserved_modules() {
        assert!(parse_combo_vars(Some("a elgg"), Some("1")).is_none());
        assert!(parse_combo_vars(Some("languages/en"), Some("1")).is_none());
        assert!(parse_combo_vars(Some(""), Some("1")).is_none());
        assert!(parse_combo_vars(Some("a"), None).is_none());
    }
}
