//! Naming of anonymous AMD modules.

/// Module name for a view under `js/` ending in `.js`.
pub fn amd_name(view: &str) -> Option<&str> {
    view.strip_prefix("js/")?.strip_suffix(".js").filter(|n| !n.is_empty())
}

/// Give the first anonymous `define(` in `content` the module's name, so it
/// can be concatenated with other modules. Content of other views passes
/// through unchanged.
pub fn filter(view: &str, content: &str) -> String {
    let Some(name) = amd_name(view) else {
        return content.to_string();
    };
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        let indent = line.len() - line.trim_start().len();
        let body = &line[indent..];
        if let Some(rest) = body.strip_prefix("define(") {
            if !rest.is_empty() && !rest.starts_with(['\'', '"']) {
                let at = offset + indent + "define(".len();
                return format!("{}\"{name}\", {}", &content[..at], &content[at..]);
            }
        }
        offset += line.len();
    }
    content.to_string()
}

/// Whether some line starts with a named `define(`.
pub fn has_named_define(content: &str) -> bool {
    content
        .lines()
        .any(|line| line.starts_with("define('") || line.starts_with("define(\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_anonymous_modules() {
        let out = filter("js/elgg/spinner.js", "define(function(require) {\n});\n");
        assert_eq!(out, "define(\"elgg/spinner\", function(require) {\n});\n");

        let out = filter("js/x.js", "// header\n  define(['a'], f);");
        assert_eq!(out, "// header\n  define(\"x\", ['a'], f);");
    }

    #[test]
    fn leaves_named_and_foreign_views_alone() {
        let named = "define('x', function() {});";
        assert_eq!(filter("js/x.js", named), named);
        assert!(has_named_define(named));
        assert_eq!(filter("css/x.css", "define(f)"), "define(f)");
        assert_eq!(amd_name("js/.js"), None);
    }
}
