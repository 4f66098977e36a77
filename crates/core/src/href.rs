//! Archive-internal href resolution.
//!
//! Every href stored in a manifest item or a chapter entry passes through
//! [`resolve_href`] exactly once. For hrefs that stay inside the base
//! directory a second pass over the resolved value changes nothing.

/// Directory part of an archive path, including the trailing slash.
/// `OEBPS/content.opf` gives `OEBPS/`; `content.opf` gives the empty string.
pub fn base_dir_of(path: &str) -> String {
    match path.rfind('/') {
        Some(i) => path[..=i].to_string(),
        None => String::new(),
    }
}

/// Resolve `href` against `base_dir` (as produced by [`base_dir_of`]).
///
/// The fragment is kept verbatim. An href that already carries the base
/// directory is not prefixed a second time. `.` and `..` segments and empty
/// segments are normalized without climbing above the archive root, and the
/// doubled extensions `.htm.html` / `.html.html` are collapsed.
pub fn resolve_href(base_dir: &str, href: &str) -> String {
    let (path, fragment) = match href.find('#') {
        Some(i) => (&href[..i], Some(&href[i..])),
        None => (href, None),
    };

    let joined = if path.is_empty() {
        String::new()
    } else if path.starts_with('/') || base_dir.is_empty() || path.starts_with(base_dir) {
        path.trim_start_matches('/').to_string()
    } else {
        format!("{base_dir}{path}")
    };

    let mut out = collapse_doubled_extension(&normalize_segments(&joined));
    if let Some(frag) = fragment {
        out.push_str(frag);
    }
    out
}

/// `chapter1.html.html` becomes `chapter1.html`; `chapter1.htm.html`
/// becomes `chapter1.htm`. Matching ignores case and keeps the casing of the
/// surviving extension.
pub fn collapse_doubled_extension(path: &str) -> String {
    let mut current = path.to_string();
    loop {
        let lower = current.to_ascii_lowercase();
        if lower.ends_with(".html.html") || lower.ends_with(".htm.html") {
            current.truncate(current.len() - ".html".len());
        } else {
            return current;
        }
    }
}

fn normalize_segments(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    let mut out = parts.join("/");
    // Keep a trailing slash for directory paths such as a base dir.
    if path.ends_with('/') && !out.is_empty() {
        out.push('/');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn base_dir() {
        assert_eq!(base_dir_of("OEBPS/content.opf"), "OEBPS/");
        assert_eq!(base_dir_of("a/b/package.opf"), "a/b/");
        assert_eq!(base_dir_of("content.opf"), "");
    }

    #[test]
    fn prefixes_base() {
        assert_eq!(resolve_href("OEBPS/", "text/ch1.xhtml"), "OEBPS/text/ch1.xhtml");
        assert_eq!(resolve_href("", "ch1.xhtml"), "ch1.xhtml");
    }

    #[test]
    fn does_not_double_prefix() {
        assert_eq!(resolve_href("OEBPS/", "OEBPS/ch1.xhtml"), "OEBPS/ch1.xhtml");
    }

    #[test]
    fn keeps_fragment() {
        assert_eq!(
            resolve_href("OEBPS/", "ch1.xhtml#sec-2"),
            "OEBPS/ch1.xhtml#sec-2"
        );
        assert_eq!(resolve_href("OEBPS/", "#top"), "#top");
    }

    #[test]
    fn normalizes_dot_segments() {
        assert_eq!(resolve_href("OEBPS/text/", "../images/c.jpg"), "OEBPS/images/c.jpg");
        assert_eq!(resolve_href("OEBPS/", "./ch1.xhtml"), "OEBPS/ch1.xhtml");
        assert_eq!(resolve_href("OEBPS/", "a//b.xhtml"), "OEBPS/a/b.xhtml");
        assert_eq!(resolve_href("", "../../escape.xhtml"), "escape.xhtml");
    }

    #[test]
    fn collapses_doubled_extensions() {
        assert_eq!(resolve_href("", "chapter1.html.html"), "chapter1.html");
        assert_eq!(resolve_href("", "chapter1.htm.html"), "chapter1.htm");
        assert_eq!(resolve_href("OEBPS/", "Ch1.HTML.html#p3"), "OEBPS/Ch1.HTML#p3");
        assert_eq!(collapse_doubled_extension("a.xhtml"), "a.xhtml");
        assert_eq!(collapse_doubled_extension("a.html.html.html"), "a.html");
    }

    proptest! {
        #[test]
        fn resolution_is_idempotent(
            base in "([a-zA-Z]{1,6}/){0,2}",
            href in "(\\./)?[a-zA-Z0-9_]{1,8}(/[a-zA-Z0-9_]{1,8})?(\\.html|\\.htm|\\.xhtml)(\\.html)?(#[a-z0-9]{1,4})?",
        ) {
            let once = resolve_href(&base, &href);
            let twice = resolve_href(&base, &once);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn no_doubled_extension_survives(
            base in "([a-zA-Z]{1,6}/){0,2}",
            stem in "[a-zA-Z0-9_]{1,8}",
            first in "(html|htm|HTML|Htm)",
            repeats in 1usize..4,
        ) {
            let href = format!("{stem}.{first}{}", ".html".repeat(repeats));
            let resolved = resolve_href(&base, &href).to_ascii_lowercase();
            prop_assert!(!resolved.ends_with(".html.html"));
            prop_assert!(!resolved.ends_with(".htm.html"));
        }
    }
}
