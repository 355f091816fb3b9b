//! Rewrites `<link>` and `<script>` URLs in rendered HTML to the URLs the
//! host build assigned.
//!
//! Works in two lazy passes: [`scan_tags`] finds candidate tags in document
//! order, then [`attributes`] walks the attributes of one tag. Each tag is
//! rewritten on its own; tags never interact.
//!
//! A URL ending in `?allowSkip` marks an optional asset: when the manifest
//! doesn't know it, the whole tag is replaced by `<!-- skipped: <url> -->`
//! instead of being left pointing at a file that was never built.

use crate::manifest::AssetManifest;
use regex::{CaptureMatches, Regex};
use std::borrow::Cow;
use std::ops::Range;
use std::sync::LazyLock;

/// Marker for assets that may be absent from the build.
pub const SKIP_MARKER: &str = "?allowSkip";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Link,
    Script,
}

/// A tag found by [`scan_tags`]; `span` indexes the scanned HTML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub kind: TagKind,
    pub span: Range<usize>,
}

/// One attribute of a tag; `value` indexes the tag text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute<'a> {
    pub name: &'a str,
    pub value: Range<usize>,
}

/// Rewrites every recognised tag in `html` against `manifest`.
pub fn rewrite(html: &str, manifest: &AssetManifest) -> String {
    let mut out = String::with_capacity(html.len());
    let mut last = 0;

    for tag in scan_tags(html) {
        out.push_str(&html[last..tag.span.start]);
        out.push_str(&rewrite_tag(&html[tag.span.clone()], manifest));
        last = tag.span.end;
    }

    out.push_str(&html[last..]);
    out
}

/// Rewrites a single tag. Returns it unchanged when there is nothing to do.
pub fn rewrite_tag<'a>(tag: &'a str, manifest: &AssetManifest) -> Cow<'a, str> {
    let Some(attr) = url_attribute(tag) else {
        return Cow::Borrowed(tag);
    };

    let url = &tag[attr.value.clone()];
    if url.is_empty() {
        return Cow::Borrowed(tag);
    }

    let (cleaned, skippable) = match url.strip_suffix(SKIP_MARKER) {
        Some(cleaned) => (cleaned, true),
        None => (url, false),
    };

    match manifest.resolve(cleaned) {
        Some(resolved) => {
            let mut out = String::with_capacity(tag.len() + resolved.len());
            out.push_str(&tag[..attr.value.start]);
            out.push_str(resolved);
            out.push_str(&tag[attr.value.end..]);
            Cow::Owned(out)
        }
        None if skippable => Cow::Owned(format!("<!-- skipped: {cleaned} -->")),
        None => Cow::Borrowed(tag),
    }
}

/// First `src` or `href` attribute of a tag.
pub fn url_attribute(tag: &str) -> Option<Attribute<'_>> {
    attributes(tag).find(|attr| {
        attr.name.eq_ignore_ascii_case("src") || attr.name.eq_ignore_ascii_case("href")
    })
}

// ============================================================================
// Tag scanning
// ============================================================================

/// Opening `<link>`/`<script>` tag, optionally followed by `</script>`.
///
/// Attribute values only open a quote right after `=`; an unquoted value
/// may contain quote characters past its first one (`title=Bob's`).
static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"(?i)(?P<open><(?P<name>link|script)"#,
        r#"(?:\s+[^\s"'<>/=]+(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'=<>`][^\s<>]*))?)*"#,
        r#"\s*/?>)(?P<close></script\s*>)?"#,
    ))
    .unwrap()
});

/// One attribute inside an opening tag, after the tag name.
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"\s(?P<name>[^\s"'<>/=]+)"#,
        r#"(?:\s*=\s*(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)'|(?P<uq>[^\s"'=<>`][^\s<>]*)))?"#,
    ))
    .unwrap()
});

pub fn scan_tags(html: &str) -> TagScanner<'_> {
    TagScanner {
        matches: TAG.captures_iter(html),
    }
}

/// Iterator over `<link …>`, `<script …></script>` and `<script …/>`.
///
/// A `<script>` with an inline body is not a rewrite target and is skipped,
/// as is anything that doesn't parse as a tag. Scanning resumes after it.
pub struct TagScanner<'a> {
    matches: CaptureMatches<'static, 'a>,
}

impl Iterator for TagScanner<'_> {
    type Item = Tag;

    fn next(&mut self) -> Option<Tag> {
        for caps in self.matches.by_ref() {
            let (Some(open), Some(name)) = (caps.name("open"), caps.name("name")) else {
                continue;
            };

            if name.as_str().eq_ignore_ascii_case("link") {
                return Some(Tag {
                    kind: TagKind::Link,
                    span: open.range(),
                });
            }

            let end = match caps.name("close") {
                _ if open.as_str().ends_with("/>") => open.end(),
                Some(close) => close.end(),
                None => continue,
            };
            return Some(Tag {
                kind: TagKind::Script,
                span: open.start()..end,
            });
        }

        None
    }
}

// ============================================================================
// Attribute scanning
// ============================================================================

/// Attributes of a single tag, in order.
pub fn attributes(tag: &str) -> Attributes<'_> {
    // Skip `<` and the tag name.
    let offset = usize::from(tag.starts_with('<'));
    let offset = offset
        + tag[offset..]
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(tag.len() - offset);

    Attributes {
        offset,
        matches: ATTRIBUTE.captures_iter(&tag[offset..]),
    }
}

pub struct Attributes<'a> {
    offset: usize,
    matches: CaptureMatches<'static, 'a>,
}

impl<'a> Iterator for Attributes<'a> {
    type Item = Attribute<'a>;

    fn next(&mut self) -> Option<Attribute<'a>> {
        let caps = self.matches.next()?;
        let name = caps.name("name")?;

        let value = ["dq", "sq", "uq"]
            .into_iter()
            .find_map(|group| caps.name(group))
            .map_or(name.end()..name.end(), |value| value.range());

        Some(Attribute {
            name: name.as_str(),
            value: value.start + self.offset..value.end + self.offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(entries: &[(&str, &str)]) -> AssetManifest {
        entries.iter().copied().collect()
    }

    #[test]
    fn test_rewrites_script_src() {
        let m = manifest(&[("bundle.js", "/static/bundle.a1b2.js")]);
        assert_eq!(
            rewrite(r#"<script src="bundle.js"></script>"#, &m),
            r#"<script src="/static/bundle.a1b2.js"></script>"#
        );
    }

    #[test]
    fn test_skips_optional_missing_asset() {
        assert_eq!(
            rewrite(r#"<link href="style.css?allowSkip">"#, &AssetManifest::new()),
            "<!-- skipped: style.css -->"
        );
    }

    #[test]
    fn test_optional_asset_present_drops_marker() {
        let m = manifest(&[("style.css", "/s/style.9f.css")]);
        assert_eq!(
            rewrite(r#"<link rel="stylesheet" href="style.css?allowSkip" />"#, &m),
            r#"<link rel="stylesheet" href="/s/style.9f.css" />"#
        );
    }

    #[test]
    fn test_unknown_asset_left_alone() {
        let html = r#"<head><link rel="icon" href="/favicon.ico"><script src="cdn.js"></script></head>"#;
        assert_eq!(rewrite(html, &manifest(&[("main.js", "/main.1.js")])), html);
    }

    #[test]
    fn test_html_without_targets_is_identity() {
        let html = "<!doctype html>\n<html><body><h1>Hi</h1><p>a < b > c</p><linked/></body></html>";
        assert_eq!(rewrite(html, &manifest(&[("main.js", "/main.1.js")])), html);
    }

    #[test]
    fn test_other_attributes_untouched() {
        let m = manifest(&[("main.js", "/main.77.js")]);
        assert_eq!(
            rewrite(
                r#"<SCRIPT type="module" SRC='main.js' defer crossorigin="anonymous"></SCRIPT>"#,
                &m
            ),
            r#"<SCRIPT type="module" SRC='/main.77.js' defer crossorigin="anonymous"></SCRIPT>"#
        );
    }

    #[test]
    fn test_unquoted_and_self_closing() {
        let m = manifest(&[("main.css", "/main.3.css"), ("main.js", "/main.3.js")]);
        assert_eq!(
            rewrite("<link rel=stylesheet href=main.css><script src=main.js />", &m),
            "<link rel=stylesheet href=/main.3.css><script src=/main.3.js />"
        );
    }

    #[test]
    fn test_inline_script_is_not_a_target() {
        let m = manifest(&[("main.js", "/main.3.js")]);
        let html = r#"<script>load("main.js")</script><script src="main.js"></script>"#;
        assert_eq!(
            rewrite(html, &m),
            r#"<script>load("main.js")</script><script src="/main.3.js"></script>"#
        );
    }

    #[test]
    fn test_tags_processed_independently_in_order() {
        let m = manifest(&[("a.js", "/a.1.js")]);
        let html = concat!(
            r#"<script src="a.js"></script>"#,
            r#"<script src="b.js?allowSkip"></script>"#,
            r#"<link href="c.css">"#,
            r#"<script src="a.js"></script>"#,
        );
        assert_eq!(
            rewrite(html, &m),
            concat!(
                r#"<script src="/a.1.js"></script>"#,
                "<!-- skipped: b.js -->",
                r#"<link href="c.css">"#,
                r#"<script src="/a.1.js"></script>"#,
            )
        );
    }

    #[test]
    fn test_only_first_url_attribute_counts() {
        let m = manifest(&[("a.css", "/a.1.css"), ("b.css", "/b.1.css")]);
        assert_eq!(
            rewrite(r#"<link href="a.css" src="b.css">"#, &m),
            r#"<link href="/a.1.css" src="b.css">"#
        );
    }

    #[test]
    fn test_empty_manifest_url_is_a_miss() {
        let m = manifest(&[("main.js", "")]);
        assert_eq!(
            rewrite(r#"<script src="main.js?allowSkip"></script>"#, &m),
            "<!-- skipped: main.js -->"
        );
    }

    #[test]
    fn test_rewrite_is_idempotent_when_nothing_matches() {
        let m = manifest(&[("x.js", "/x.1.js")]);
        let html = r#"<link href="a.css"><script src="b.js"></script>"#;
        let once = rewrite(html, &m);
        assert_eq!(rewrite(&once, &m), once);
    }

    #[test]
    fn test_quoted_gt_does_not_end_tag() {
        let tags: Vec<_> = scan_tags(r#"<link title="a>b" href="x.css"><p>"#).collect();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].kind, TagKind::Link);
        assert_eq!(tags[0].span, 0..31);
    }

    #[test]
    fn test_unterminated_tag_is_not_a_target() {
        assert_eq!(scan_tags("<p>ok</p><link href=\"a.css\"").count(), 0);
    }

    #[test]
    fn test_quote_inside_unquoted_value() {
        let m = manifest(&[("main.js", "/main.1.js")]);
        assert_eq!(
            rewrite(r#"<link rel=alternate title=Bob's><script src="main.js"></script>"#, &m),
            r#"<link rel=alternate title=Bob's><script src="/main.1.js"></script>"#
        );
    }

    #[test]
    fn test_malformed_tag_does_not_stop_later_tags() {
        let m = manifest(&[("a.css", "/a.1.css"), ("main.js", "/main.1.js")]);
        let html = concat!(
            r#"<link href="a.css>"#,
            r#"<script src="main.js"></script>"#,
            r#"<link href="a.css">"#,
        );
        assert_eq!(
            rewrite(html, &m),
            concat!(
                r#"<link href="a.css>"#,
                r#"<script src="/main.1.js"></script>"#,
                r#"<link href="/a.1.css">"#,
            )
        );
    }

    #[test]
    fn test_script_with_inline_body_resumes_scan() {
        let tags: Vec<_> = scan_tags("<script>var a = 1;</script><script src=x.js></script>")
            .map(|t| t.span)
            .collect();
        assert_eq!(tags, [27..53]);
    }

    #[test]
    fn test_attributes_of_tag() {
        let tag = r#"<script async src="app.js" data-x='1' />"#;
        let attrs: Vec<_> = attributes(tag)
            .map(|a| (a.name, &tag[a.value]))
            .collect();
        assert_eq!(attrs, [("async", ""), ("src", "app.js"), ("data-x", "1")]);
    }

    #[test]
    fn test_data_src_is_not_src() {
        assert!(url_attribute(r#"<script data-src="a.js"></script>"#).is_none());
    }

    #[test]
    fn test_multiline_tag() {
        let m = manifest(&[("main.css", "/main.5.css")]);
        assert_eq!(
            rewrite("<link\n  rel=\"stylesheet\"\n  href=\"main.css\"\n>", &m),
            "<link\n  rel=\"stylesheet\"\n  href=\"/main.5.css\"\n>"
        );
    }
}
