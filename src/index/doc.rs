//! Package documentation.
//!
//! Mirrors the classic `go/doc` behaviour godoc sites rely on:
//! `CommentGroup.Text` for extracting a doc comment, `Synopsis` for the
//! one-line summary, and `ToHTML` for the rendered documentation fragment.

const ILLEGAL_SYNOPSIS_PREFIXES: &[&str] = &["copyright", "all rights", "author"];

const URL_SCHEMES: &[&str] = &["https", "http", "ftp", "file", "gopher", "mailto", "nntp"];

/// Text of a comment group, given its raw comments (markers included).
///
/// Comment markers and directive comments (`//go:build`, `//line ...`) are
/// removed, trailing whitespace is stripped, leading blank lines are dropped
/// and runs of blank lines collapse to one. A non-empty result ends in a newline.
pub fn comment_text<S: AsRef<str>>(comments: &[S]) -> String {
    let mut lines: Vec<String> = Vec::new();
    for comment in comments {
        let c = comment.as_ref();
        let body = if let Some(rest) = c.strip_prefix("//") {
            if let Some(rest) = rest.strip_prefix(' ') {
                rest
            } else if is_directive(rest) {
                continue;
            } else {
                rest
            }
        } else if let Some(rest) = c.strip_prefix("/*") {
            rest.strip_suffix("*/").unwrap_or(rest)
        } else {
            c
        };
        for line in body.split('\n') {
            lines.push(line.trim_end_matches([' ', '\t', '\n', '\r']).to_string());
        }
    }

    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    for line in lines {
        if !line.is_empty() || out.last().is_some_and(|prev| !prev.is_empty()) {
            out.push(line);
        }
    }
    if out.last().is_some_and(|last| !last.is_empty()) {
        out.push(String::new());
    }
    out.join("\n")
}

/// `//line`, `//extern`, `//export` and `//[a-z0-9]+:[a-z0-9]` comments.
fn is_directive(c: &str) -> bool {
    if c.starts_with("line ") || c.starts_with("extern ") || c.starts_with("export ") {
        return true;
    }
    let bytes = c.as_bytes();
    let Some(colon) = c.find(':') else {
        return false;
    };
    if colon == 0 || colon + 1 >= bytes.len() {
        return false;
    }
    (0..=colon + 1)
        .filter(|&i| i != colon)
        .all(|i| bytes[i].is_ascii_lowercase() || bytes[i].is_ascii_digit())
}

/// First sentence of a doc comment, cleaned up for one-line display.
pub fn synopsis(text: &str) -> String {
    let s = clean(&text[..first_sentence_len(text)]);
    let lower = s.to_lowercase();
    if ILLEGAL_SYNOPSIS_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return String::new();
    }
    convert_quotes(&s)
}

fn first_sentence_len(s: &str) -> usize {
    let (mut ppp, mut pp, mut p) = ('\0', '\0', '\0');
    for (i, q) in s.char_indices() {
        let q = if matches!(q, '\n' | '\r' | '\t') { ' ' } else { q };
        if q == ' ' && p == '.' && (!pp.is_uppercase() || ppp.is_uppercase()) {
            return i;
        }
        if p == '。' || p == '．' {
            return i;
        }
        ppp = pp;
        pp = p;
        p = q;
    }
    s.len()
}

/// Collapse whitespace runs to single spaces and drop a trailing space.
fn clean(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev = ' ';
    for c in s.chars() {
        let c = if matches!(c, '\n' | '\r' | '\t') { ' ' } else { c };
        if c != ' ' || prev != ' ' {
            out.push(c);
            prev = c;
        }
    }
    if prev == ' ' {
        out.pop();
    }
    out
}

fn convert_quotes(s: &str) -> String {
    s.replace("``", "\u{201c}").replace("''", "\u{201d}")
}

/// Escape text the way Go's `template.HTMLEscape` does.
pub fn html_escape(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\0' => out.push('\u{fffd}'),
            _ => out.push(c),
        }
    }
}

/// Escape comment text, turning ``` `` ``` and `''` into HTML curly quotes.
fn comment_escape(out: &mut String, s: &str) {
    let mut escaped = String::with_capacity(s.len());
    html_escape(&mut escaped, &convert_quotes(s));
    out.push_str(&escaped.replace('\u{201c}', "&ldquo;").replace('\u{201d}', "&rdquo;"));
}

#[derive(Debug, PartialEq, Eq)]
enum Block {
    Para(Vec<String>),
    Heading(String),
    Pre(Vec<String>),
}

fn is_blank(line: &str) -> bool {
    line.is_empty() || line == "\n"
}

fn indent_len(line: &str) -> usize {
    line.bytes().take_while(|&b| b == b' ' || b == b'\t').count()
}

fn unindent(block: &mut [String]) {
    let Some(first) = block.first() else {
        return;
    };
    let mut prefix = first[..indent_len(first)].to_string();
    for line in block.iter().filter(|l| !is_blank(l)) {
        let indent = &line[..indent_len(line)];
        let common = prefix.bytes().zip(indent.bytes()).take_while(|(a, b)| a == b).count();
        prefix.truncate(common);
    }
    let n = prefix.len();
    for line in block.iter_mut().filter(|l| !is_blank(l)) {
        line.drain(..n);
    }
}

fn heading(line: &str) -> Option<String> {
    let line = line.trim();
    let first = line.chars().next()?;
    if !first.is_alphabetic() || !first.is_uppercase() {
        return None;
    }
    let last = line.chars().next_back()?;
    if !last.is_alphabetic() && !last.is_numeric() {
        return None;
    }
    if line.contains(|c: char| ";:!?+*/=[]{}_^°&§~%#@<\">\\".contains(c)) {
        return None;
    }

    // "'" is only allowed in a possessive "'s"
    let mut rest = line;
    while let Some(i) = rest.find('\'') {
        let after = &rest.as_bytes()[i + 1..];
        if after.first() != Some(&b's') || after.get(1).is_some_and(|&b| b != b' ') {
            return None;
        }
        rest = &rest[i + 2..];
    }

    // "." is only allowed when followed by a non-space
    let mut rest = line;
    while let Some(i) = rest.find('.') {
        match rest.as_bytes().get(i + 1) {
            None | Some(b' ') => return None,
            Some(_) => rest = &rest[i + 1..],
        }
    }

    Some(line.to_string())
}

fn blocks(text: &str) -> Vec<Block> {
    let mut lines: Vec<String> = text.split_inclusive('\n').map(str::to_string).collect();
    if text.is_empty() || text.ends_with('\n') {
        lines.push(String::new());
    }
    unindent(&mut lines);

    let mut out = Vec::new();
    let mut para: Vec<String> = Vec::new();
    let mut last_was_blank = false;
    let mut last_was_heading = false;

    fn close(para: &mut Vec<String>, out: &mut Vec<Block>) {
        if !para.is_empty() {
            out.push(Block::Para(std::mem::take(para)));
        }
    }

    let mut i = 0;
    while i < lines.len() {
        let line = &lines[i];
        if is_blank(line) {
            close(&mut para, &mut out);
            i += 1;
            last_was_blank = true;
            continue;
        }
        if indent_len(line) > 0 {
            close(&mut para, &mut out);
            let mut j = i + 1;
            while j < lines.len() && (is_blank(&lines[j]) || indent_len(&lines[j]) > 0) {
                j += 1;
            }
            while j > i && is_blank(&lines[j - 1]) {
                j -= 1;
            }
            let mut pre = lines[i..j].to_vec();
            unindent(&mut pre);
            out.push(Block::Pre(pre));
            i = j;
            last_was_heading = false;
            continue;
        }
        if last_was_blank
            && !last_was_heading
            && i + 2 < lines.len()
            && is_blank(&lines[i + 1])
            && !is_blank(&lines[i + 2])
            && indent_len(&lines[i + 2]) == 0
        {
            if let Some(head) = heading(line) {
                close(&mut para, &mut out);
                out.push(Block::Heading(head));
                i += 2;
                last_was_heading = true;
                continue;
            }
        }
        last_was_blank = false;
        last_was_heading = false;
        para.push(line.clone());
        i += 1;
    }
    close(&mut para, &mut out);
    out
}

fn anchor_id(line: &str) -> String {
    let mut id = String::from("hdr-");
    for c in line.chars() {
        id.push(if c.is_ascii_alphanumeric() { c } else { '_' });
    }
    id
}

/// Length of a URL starting at `s`, if `s` starts with one.
fn url_len(s: &str) -> Option<usize> {
    let scheme = URL_SCHEMES.iter().find(|scheme| {
        s.len() > scheme.len() + 3 && s.starts_with(*scheme) && s[scheme.len()..].starts_with("://")
    })?;
    let start = scheme.len() + 3;
    let bytes = s.as_bytes();

    let host = bytes[start..]
        .iter()
        .take_while(|&&b| b.is_ascii_alphanumeric() || b"_@-.[]:".contains(&b))
        .count();
    if host == 0 {
        return None;
    }
    let mut end = start + host;
    end += bytes[end..]
        .iter()
        .take_while(|&&b| b.is_ascii_alphanumeric() || b".,:;?!$'()*+&#=@~_/-[]%".contains(&b))
        .count();

    // sentences may end in a URL
    while end > start + host && b".,:;?!".contains(&bytes[end - 1]) {
        end -= 1;
    }
    let mut url = &s[..end];
    while url.ends_with(')') && url.matches('(').count() < url.matches(')').count() {
        url = &url[..url.len() - 1];
    }
    Some(url.len())
}

/// Escape a paragraph line, turning URLs into links.
fn emphasize(out: &mut String, line: &str) {
    let mut plain_start = 0;
    let mut i = 0;
    while i < line.len() {
        if !line.is_char_boundary(i) {
            i += 1;
            continue;
        }
        match url_len(&line[i..]) {
            Some(n) => {
                comment_escape(out, &line[plain_start..i]);
                let url = &line[i..i + n];
                out.push_str("<a href=\"");
                html_escape(out, url);
                out.push_str("\">");
                comment_escape(out, url);
                out.push_str("</a>");
                i += n;
                plain_start = i;
            }
            None => i += 1,
        }
    }
    comment_escape(out, &line[plain_start..]);
}

/// Render doc comment text as an HTML fragment.
pub fn to_html(text: &str) -> String {
    let mut out = String::new();
    for block in blocks(text) {
        match block {
            Block::Para(lines) => {
                out.push_str("<p>\n");
                for line in &lines {
                    emphasize(&mut out, line);
                }
                out.push_str("</p>\n");
            }
            Block::Heading(line) => {
                out.push_str("<h3 id=\"");
                out.push_str(&anchor_id(&line));
                out.push_str("\">");
                comment_escape(&mut out, &line);
                out.push_str("</h3>\n");
            }
            Block::Pre(lines) => {
                out.push_str("<pre>");
                for line in &lines {
                    html_escape(&mut out, line);
                }
                out.push_str("</pre>\n");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comment_text_line_comments() {
        let text = comment_text(&["// Package kebabcase provides a parser.", "//", "// It is small.  "]);
        assert_eq!(text, "Package kebabcase provides a parser.\n\nIt is small.\n");
    }

    #[test]
    fn test_comment_text_strips_directives_and_blank_runs() {
        let text = comment_text(&["//", "// First.", "//", "//", "// Second.", "//go:generate stringer"]);
        assert_eq!(text, "First.\n\nSecond.\n");
    }

    #[test]
    fn test_comment_text_block_comment() {
        let text = comment_text(&["/*\nPackage foo does things.\n\n  indented\n*/"]);
        assert_eq!(text, "Package foo does things.\n\n  indented\n");
    }

    #[test]
    fn test_is_directive() {
        assert!(is_directive("go:build linux"));
        assert!(is_directive("go:generate x"));
        assert!(is_directive("line foo.go:10"));
        assert!(is_directive("export Foo"));
        assert!(!is_directive("TODO: fix"));
        assert!(!is_directive(":x"));
        assert!(!is_directive("http://example.com"));
    }

    #[test]
    fn test_synopsis() {
        assert_eq!(synopsis("Package foo does things. More text."), "Package foo does things.");
        assert_eq!(synopsis("Package foo\nspans lines.\n"), "Package foo spans lines.");
        assert_eq!(synopsis("Package foo uses the U.S. system. Yes."), "Package foo uses the U.S. system.");
        assert_eq!(synopsis("Copyright 2018 The Authors. All rights reserved."), "");
        assert_eq!(synopsis("Package q implements ``quoting''. Rest."), "Package q implements \u{201c}quoting\u{201d}.");
        assert_eq!(synopsis(""), "");
    }

    #[test]
    fn test_html_escape() {
        let mut out = String::new();
        html_escape(&mut out, "<a href=\"x\">'&'</a>");
        assert_eq!(out, "&lt;a href=&#34;x&#34;&gt;&#39;&amp;&#39;&lt;/a&gt;");
    }

    #[test]
    fn test_to_html_paragraphs_and_pre() {
        let html = to_html("Package foo does things.\n\nExample:\n\n\tfoo.Bar()\n\tfoo.Baz()\n\nDone.\n");
        assert_eq!(
            html,
            "<p>\nPackage foo does things.\n</p>\n\
             <p>\nExample:\n</p>\n\
             <pre>foo.Bar()\nfoo.Baz()\n</pre>\n\
             <p>\nDone.\n</p>\n"
        );
    }

    #[test]
    fn test_to_html_heading() {
        let html = to_html("Package foo.\n\nUsage Notes\n\nCall it.\n");
        assert_eq!(
            html,
            "<p>\nPackage foo.\n</p>\n<h3 id=\"hdr-Usage_Notes\">Usage Notes</h3>\n<p>\nCall it.\n</p>\n"
        );
    }

    #[test]
    fn test_heading_rules() {
        assert_eq!(heading("Usage Notes\n"), Some("Usage Notes".to_string()));
        assert_eq!(heading("Go's Heading"), Some("Go's Heading".to_string()));
        assert_eq!(heading("lowercase start"), None);
        assert_eq!(heading("Ends with period."), None);
        assert_eq!(heading("Has: colon"), None);
        assert_eq!(heading("Version 1.2 Notes"), Some("Version 1.2 Notes".to_string()));
    }

    #[test]
    fn test_to_html_links_and_quotes() {
        let html = to_html("See https://golang.org/doc. Uses ``quotes''.\n");
        assert_eq!(
            html,
            "<p>\nSee <a href=\"https://golang.org/doc\">https://golang.org/doc</a>. Uses &ldquo;quotes&rdquo;.\n</p>\n"
        );
    }

    #[test]
    fn test_to_html_empty() {
        assert_eq!(to_html(""), "");
    }
}
