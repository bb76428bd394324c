//! Resource URL rewriting for fetched fragment markup.
//!
//! A remote fragment references its stylesheets and scripts relative to its
//! own origin. Once grafted into the host document those references would
//! resolve against the host, so every `href`/`src` value is rewritten to an
//! absolute URL rooted at the fragment's base before parsing.
//!
//! Two passes over the text, in a fixed order:
//!
//! 1. root-relative values (`/app.css`), prefixed with the base;
//! 2. general-relative values (`./bundle.js`, `bundle.js`), `./` stripped
//!    then prefixed.
//!
//! The second pass is the broader pattern and must not touch values that
//! already carry a scheme, which includes everything pass one produced.

enum RewritePass {
    RootRelative,
    Relative,
}

/// Rewrite every relative `href="…"` / `src="…"` value in `html` to an
/// absolute URL under `base_url`. Absolute values are left untouched.
pub fn rewrite_urls(html: &str, base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let pass_one = rewrite_pass(html, base, RewritePass::RootRelative);
    rewrite_pass(&pass_one, base, RewritePass::Relative)
}

fn rewrite_pass(input: &str, base: &str, pass: RewritePass) -> String {
    let mut out = String::with_capacity(input.len() + 64);
    let mut rest = input;

    while let Some(found) = next_url_attribute(rest) {
        let UrlAttribute {
            value_start,
            value_end,
        } = found;
        out.push_str(&rest[..value_start]);
        let value = &rest[value_start..value_end];
        match rewrite_value(value, base, &pass) {
            Some(rewritten) => out.push_str(&rewritten),
            None => out.push_str(value),
        }
        rest = &rest[value_end..];
    }

    out.push_str(rest);
    out
}

fn rewrite_value(value: &str, base: &str, pass: &RewritePass) -> Option<String> {
    match pass {
        RewritePass::RootRelative => {
            // "//host/x" is protocol-relative, leave it alone
            if value.starts_with('/') && !value.starts_with("//") {
                Some(format!("{base}{value}"))
            } else {
                None
            }
        }
        RewritePass::Relative => {
            if value.is_empty()
                || value.starts_with('/')
                || value.starts_with('#')
                || has_scheme(value)
            {
                return None;
            }
            let trimmed = value.strip_prefix("./").unwrap_or(value);
            Some(format!("{base}/{trimmed}"))
        }
    }
}

/// RFC 3986 scheme prefix: ALPHA *( ALPHA / DIGIT / "+" / "-" / "." ) ":"
fn has_scheme(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    for c in chars {
        match c {
            ':' => return true,
            c if c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.') => {}
            _ => return false,
        }
    }
    false
}

struct UrlAttribute {
    value_start: usize,
    value_end: usize,
}

/// Locate the next quoted `href=` or `src=` attribute value.
///
/// The returned offsets are relative to `input` and span the value between
/// (not including) its quotes. Unquoted values are skipped; the transform is
/// conservative and leaves anything it cannot delimit exactly.
fn next_url_attribute(input: &str) -> Option<UrlAttribute> {
    // Byte-wise scan: `i` may land inside a multi-byte character, so only
    // byte comparisons happen until the offsets are pinned to quote bytes.
    let bytes = input.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let name_len = if bytes[i..].starts_with(b"href") {
            4
        } else if bytes[i..].starts_with(b"src") {
            3
        } else {
            i += 1;
            continue;
        };

        // Must be a standalone attribute name ("data-src" does not count)
        let boundary_before = i == 0 || bytes[i - 1].is_ascii_whitespace();
        if !boundary_before {
            i += name_len;
            continue;
        }

        let mut j = i + name_len;
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            j += 1;
        }
        if j >= bytes.len() || bytes[j] != b'=' {
            i += name_len;
            continue;
        }
        j += 1;
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            j += 1;
        }
        let quote = match bytes.get(j) {
            Some(b'"') => b'"',
            Some(b'\'') => b'\'',
            _ => {
                i = j;
                continue;
            }
        };
        // Both offsets sit next to ASCII quote bytes, so they are valid
        // char boundaries for the caller's str slicing.
        let value_start = j + 1;
        let value_end = match bytes[value_start..].iter().position(|&b| b == quote) {
            Some(offset) => value_start + offset,
            None => return None, // unterminated, leave the tail as-is
        };
        return Some(UrlAttribute {
            value_start,
            value_end,
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "http://localhost:5003";

    #[test]
    fn root_relative_href_is_rewritten() {
        assert_eq!(
            rewrite_urls(r#"<link href="/app.css">"#, BASE),
            r#"<link href="http://localhost:5003/app.css">"#
        );
    }

    #[test]
    fn dot_relative_src_is_rewritten() {
        assert_eq!(
            rewrite_urls(r#"<script src="./bundle.js"></script>"#, BASE),
            r#"<script src="http://localhost:5003/bundle.js"></script>"#
        );
    }

    #[test]
    fn bare_relative_src_is_rewritten() {
        assert_eq!(
            rewrite_urls(r#"<script src="bundle.js"></script>"#, BASE),
            r#"<script src="http://localhost:5003/bundle.js"></script>"#
        );
    }

    #[test]
    fn absolute_url_is_untouched() {
        let html = r#"<link href="http://other.host/x.css">"#;
        assert_eq!(rewrite_urls(html, BASE), html);
    }

    #[test]
    fn already_rewritten_value_is_not_rewritten_twice() {
        let once = rewrite_urls(r#"<link href="/app.css">"#, BASE);
        assert_eq!(rewrite_urls(&once, BASE), once);
    }

    #[test]
    fn protocol_relative_url_is_untouched() {
        let html = r#"<script src="//cdn.example/x.js"></script>"#;
        assert_eq!(rewrite_urls(html, BASE), html);
    }

    #[test]
    fn fragment_only_href_is_untouched() {
        let html = r##"<a href="#section">jump</a>"##;
        assert_eq!(rewrite_urls(html, BASE), html);
    }

    #[test]
    fn single_quoted_values_are_handled() {
        assert_eq!(
            rewrite_urls("<script src='./main.js'></script>", BASE),
            "<script src='http://localhost:5003/main.js'></script>"
        );
    }

    #[test]
    fn data_src_attribute_is_not_a_src() {
        let html = r#"<img data-src="lazy.png">"#;
        assert_eq!(rewrite_urls(html, BASE), html);
    }

    #[test]
    fn non_ascii_text_around_attributes_is_preserved() {
        assert_eq!(
            rewrite_urls(r#"<p>café</p><link href="/app.css">"#, BASE),
            r#"<p>café</p><link href="http://localhost:5003/app.css">"#
        );
    }

    #[test]
    fn non_ascii_url_value_is_rewritten() {
        assert_eq!(
            rewrite_urls(r#"<a href="./café menü.html">x</a>"#, BASE),
            r#"<a href="http://localhost:5003/café menü.html">x</a>"#
        );
    }

    #[test]
    fn trailing_slash_on_base_is_normalized() {
        assert_eq!(
            rewrite_urls(r#"<link href="/app.css">"#, "http://localhost:5003/"),
            r#"<link href="http://localhost:5003/app.css">"#
        );
    }

    #[test]
    fn rewrites_a_whole_document() {
        let html = concat!(
            "<!DOCTYPE html><html><head>\n",
            r#"<link rel="stylesheet" href="/styles/app.css">"#,
            "\n",
            r#"<link rel="icon" href="./favicon.ico">"#,
            "\n</head><body>\n",
            r#"<img src="assets/logo.png">"#,
            "\n",
            r#"<script src="https://cdn.example/vendor.js"></script>"#,
            "\n",
            r#"<script src="/bundle.js"></script>"#,
            "\n</body></html>",
        );
        insta::assert_snapshot!(rewrite_urls(html, BASE), @r#"
        <!DOCTYPE html><html><head>
        <link rel="stylesheet" href="http://localhost:5003/styles/app.css">
        <link rel="icon" href="http://localhost:5003/favicon.ico">
        </head><body>
        <img src="http://localhost:5003/assets/logo.png">
        <script src="https://cdn.example/vendor.js"></script>
        <script src="http://localhost:5003/bundle.js"></script>
        </body></html>
        "#);
    }
}
