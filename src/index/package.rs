//! Go package loading.
//!
//! Only the file header matters here: the comments above the package clause
//! (doc comment and build constraints) and the package name itself. Bodies
//! are never parsed.

use crate::index::constraint::{self, BuildContext};
use crate::index::directory::Package;
use crate::index::doc;
use crate::index::error::PackageError;

/// A raw comment with the lines it spans (1-based).
#[derive(Debug, Clone)]
struct Comment {
    text: String,
    start_line: usize,
    end_line: usize,
}

/// What the loader needs from a single `.go` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub package: String,
    /// text of the doc comment directly above the package clause
    pub doc: String,
}

/// Report whether a file name can be part of a package at all.
pub fn is_candidate(name: &str) -> bool {
    name.ends_with(".go") && !name.starts_with('_') && !name.starts_with('.')
}

/// Parse the header of a Go source file up to and including the package clause.
pub fn parse_header(file: &str, src: &str) -> Result<FileHeader, PackageError> {
    let src = src.strip_prefix('\u{feff}').unwrap_or(src);
    let syntax = |reason: &str| PackageError::Syntax {
        file: file.to_string(),
        reason: reason.to_string(),
    };

    let bytes = src.as_bytes();
    let mut pos = 0;
    let mut line = 1;
    let mut comments: Vec<Comment> = Vec::new();

    loop {
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            if bytes[pos] == b'\n' {
                line += 1;
            }
            pos += 1;
        }
        let rest = &src[pos..];
        if rest.starts_with("//") {
            let len = rest.find('\n').unwrap_or(rest.len());
            comments.push(Comment {
                text: rest[..len].trim_end_matches('\r').to_string(),
                start_line: line,
                end_line: line,
            });
            pos += len;
        } else if rest.starts_with("/*") {
            let len = rest[2..].find("*/").ok_or_else(|| syntax("comment not terminated"))? + 4;
            let text = rest[..len].replace('\r', "");
            let start_line = line;
            line += text.matches('\n').count();
            comments.push(Comment {
                text,
                start_line,
                end_line: line,
            });
            pos += len;
        } else {
            break;
        }
    }

    let package_line = line;
    let rest = &src[pos..];
    let after_keyword = rest
        .strip_prefix("package")
        .filter(|r| r.starts_with(|c: char| c.is_whitespace() || c == '/'))
        .ok_or_else(|| syntax("expected 'package'"))?;
    let name = package_name(after_keyword).ok_or_else(|| syntax("expected package name"))?;

    Ok(FileHeader {
        package: name,
        doc: doc_comment(&comments, package_line),
    })
}

/// The identifier after `package`, skipping whitespace and block comments.
fn package_name(s: &str) -> Option<String> {
    let mut s = s.trim_start();
    while let Some(rest) = s.strip_prefix("/*") {
        let end = rest.find("*/")?;
        s = rest[end + 2..].trim_start();
    }
    let mut chars = s.chars();
    let first = chars.next()?;
    if !(first.is_alphabetic() || first == '_') {
        return None;
    }
    let len = s
        .char_indices()
        .find(|&(_, c)| !(c.is_alphanumeric() || c == '_'))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    Some(s[..len].to_string())
}

/// Text of the last comment group if it ends on the line above the package clause.
fn doc_comment(comments: &[Comment], package_line: usize) -> String {
    let mut groups: Vec<Vec<&Comment>> = Vec::new();
    for comment in comments {
        let adjacent = groups
            .last()
            .and_then(|group| group.last())
            .is_some_and(|prev| comment.start_line <= prev.end_line + 1);
        if adjacent {
            let last = groups.len() - 1;
            groups[last].push(comment);
        } else {
            groups.push(vec![comment]);
        }
    }
    match groups.last() {
        Some(group) if group.last().is_some_and(|c| c.end_line + 1 == package_line) => {
            let texts: Vec<&str> = group.iter().map(|c| c.text.as_str()).collect();
            doc::comment_text(&texts)
        }
        _ => String::new(),
    }
}

/// Evaluate a file's header build constraints.
///
/// A `//go:build` line anywhere in the leading comments wins. Otherwise every
/// `// +build` line that is followed by a blank line must be satisfied.
pub fn should_build(ctx: &BuildContext, src: &str) -> Result<bool, PackageError> {
    let lines: Vec<&str> = src.lines().collect();
    let mut end = 0;
    let mut go_build: Option<&str> = None;
    let mut in_block = false;

    for (i, raw) in lines.iter().enumerate() {
        let line = raw.trim();
        if in_block {
            if let Some(idx) = line.find("*/") {
                in_block = false;
                if !line[idx + 2..].trim().is_empty() {
                    break;
                }
            }
            continue;
        }
        if line.is_empty() {
            end = i;
            continue;
        }
        if line.starts_with("//") {
            if constraint::is_go_build_line(line) {
                if go_build.is_some() {
                    return Err(PackageError::BadConstraint {
                        line: line.to_string(),
                        reason: "multiple //go:build comments".to_string(),
                    });
                }
                go_build = Some(line);
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("/*") {
            match rest.find("*/") {
                Some(idx) if !rest[idx + 2..].trim().is_empty() => break,
                Some(_) => {}
                None => in_block = true,
            }
            continue;
        }
        break;
    }

    if let Some(line) = go_build {
        return Ok(constraint::parse_go_build(line)?.eval(ctx));
    }

    for line in lines[..end].iter().map(|l| l.trim()) {
        if constraint::is_plus_build_line(line) && !constraint::parse_plus_build(line)?.eval(ctx) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Load a directory's files as one Go package.
///
/// `files` holds `(name, contents)` pairs for the candidate files of a single
/// directory. Returns `None` when no file is buildable for `ctx`.
pub fn load_package(ctx: &BuildContext, files: &[(String, Vec<u8>)]) -> Result<Option<Package>, PackageError> {
    let mut sorted: Vec<&(String, Vec<u8>)> = files.iter().filter(|(name, _)| is_candidate(name)).collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut package: Option<(String, String)> = None;
    let mut doc_text = String::new();

    for (name, contents) in sorted {
        if !ctx.good_os_arch_file(name) {
            continue;
        }
        let src = String::from_utf8_lossy(contents);
        if !should_build(ctx, &src)? {
            continue;
        }

        let header = parse_header(name, &src)?;
        let is_test = name.ends_with("_test.go");
        let mut pkg_name = header.package;
        if pkg_name == "documentation" {
            continue;
        }
        if is_test {
            if let Some(stripped) = pkg_name.strip_suffix("_test") {
                pkg_name = stripped.to_string();
            }
        }

        let (first, first_file) = package.get_or_insert_with(|| (pkg_name.clone(), name.clone()));
        if *first != pkg_name {
            return Err(PackageError::MultiplePackages {
                first: first.clone(),
                first_file: first_file.clone(),
                second: pkg_name,
                second_file: name.clone(),
            });
        }

        if !is_test && doc_text.is_empty() && !header.doc.is_empty() {
            doc_text = header.doc;
        }
    }

    Ok(package.map(|(name, _)| Package {
        name,
        synopsis: doc::synopsis(&doc_text),
        doc_html: doc::to_html(&doc_text),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, src: &str) -> (String, Vec<u8>) {
        (name.to_string(), src.as_bytes().to_vec())
    }

    fn ctx() -> BuildContext {
        BuildContext::linux_amd64()
    }

    #[test]
    fn test_is_candidate() {
        assert!(is_candidate("main.go"));
        assert!(is_candidate("main_test.go"));
        assert!(!is_candidate("_main.go"));
        assert!(!is_candidate(".main.go"));
        assert!(!is_candidate("main.c"));
    }

    #[test]
    fn test_parse_header_doc_comment() {
        let src = "// Copyright 2018 Somebody.\n\n// Package kebabcase parses kebab-case.\n// It is tiny.\npackage kebabcase\n";
        let header = parse_header("k.go", src).unwrap();
        assert_eq!(header.package, "kebabcase");
        assert_eq!(header.doc, "Package kebabcase parses kebab-case.\nIt is tiny.\n");
    }

    #[test]
    fn test_parse_header_detached_comment_is_not_doc() {
        let src = "// Package foo is detached.\n\npackage foo\n";
        let header = parse_header("f.go", src).unwrap();
        assert_eq!(header.package, "foo");
        assert_eq!(header.doc, "");
    }

    #[test]
    fn test_parse_header_block_comment_and_directives() {
        let src = "//go:build linux\n\n/*\nPackage bar does things.\n*/\npackage bar // import \"x/bar\"\n";
        let header = parse_header("b.go", src).unwrap();
        assert_eq!(header.package, "bar");
        assert_eq!(header.doc, "Package bar does things.\n");
    }

    #[test]
    fn test_parse_header_syntax_errors() {
        assert!(matches!(parse_header("a.go", "func main() {}"), Err(PackageError::Syntax { .. })));
        assert!(matches!(parse_header("a.go", "package\n"), Err(PackageError::Syntax { .. })));
        assert!(matches!(parse_header("a.go", "/* open\npackage a"), Err(PackageError::Syntax { .. })));
        assert!(matches!(parse_header("a.go", "packagefoo\n"), Err(PackageError::Syntax { .. })));
    }

    #[test]
    fn test_should_build() {
        let ctx = ctx();
        assert!(should_build(&ctx, "package a\n").unwrap());
        assert!(!should_build(&ctx, "//go:build ignore\n\npackage a\n").unwrap());
        assert!(should_build(&ctx, "// Doc.\n//go:build linux && cgo\npackage a\n").unwrap());
        assert!(!should_build(&ctx, "// +build windows\n\npackage a\n").unwrap());
        assert!(should_build(&ctx, "// +build linux darwin\n// +build amd64\n\npackage a\n").unwrap());
        // a +build line not followed by a blank line is ignored
        assert!(should_build(&ctx, "// +build windows\npackage a\n").unwrap());
        // //go:build takes precedence over +build
        assert!(should_build(&ctx, "//go:build linux\n// +build windows\n\npackage a\n").unwrap());
        assert!(should_build(&ctx, "//go:build linux &&\n\npackage a\n").is_err());
    }

    #[test]
    fn test_load_package() {
        let files = vec![
            file("b.go", "package kebab\n"),
            file("a.go", "// Package kebab converts identifiers. More.\npackage kebab\n"),
            file("a_test.go", "// Not the doc.\npackage kebab_test\n"),
            file("doc_windows.go", "package other\n"),
            file("gen.go", "//go:build ignore\n\npackage main\n"),
            file("README.md", "# readme"),
        ];
        let pkg = load_package(&ctx(), &files).unwrap().unwrap();
        assert_eq!(pkg.name, "kebab");
        assert_eq!(pkg.synopsis, "Package kebab converts identifiers.");
        assert_eq!(pkg.doc_html, "<p>\nPackage kebab converts identifiers. More.\n</p>\n");
    }

    #[test]
    fn test_load_package_no_go_files() {
        let files = vec![file("input.txt", "data"), file("_skip.go", "package skip\n")];
        assert_eq!(load_package(&ctx(), &files).unwrap(), None);

        let excluded = vec![file("x.go", "//go:build ignore\n\npackage main\n")];
        assert_eq!(load_package(&ctx(), &excluded).unwrap(), None);
    }

    #[test]
    fn test_load_package_multiple_packages() {
        let files = vec![file("a.go", "package a\n"), file("b.go", "package b\n")];
        let err = load_package(&ctx(), &files).unwrap_err();
        assert_eq!(
            err,
            PackageError::MultiplePackages {
                first: "a".into(),
                first_file: "a.go".into(),
                second: "b".into(),
                second_file: "b.go".into(),
            }
        );
    }

    #[test]
    fn test_load_package_ignores_documentation() {
        let files = vec![file("doc.go", "package documentation\n"), file("a.go", "package a\n")];
        let pkg = load_package(&ctx(), &files).unwrap().unwrap();
        assert_eq!(pkg.name, "a");
        assert_eq!(pkg.synopsis, "");
    }
}
