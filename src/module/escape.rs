//! Module path and version escaping.
//!
//! Module proxies must work on case-insensitive file systems, so every
//! upper-case letter is written as `!` followed by its lower-case form:
//! `github.com/Azure` travels as `github.com/!azure`.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EscapeError {
    #[error("malformed module path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("malformed version {version:?}: {reason}")]
    InvalidVersion { version: String, reason: &'static str },
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ElemKind {
    Module,
    File,
}

const BAD_WINDOWS_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8", "COM9", "LPT1",
    "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Escape a module path for use in a proxy URL.
pub fn escape_path(path: &str) -> Result<String, EscapeError> {
    check_path(path).map_err(|reason| EscapeError::InvalidPath {
        path: path.to_string(),
        reason,
    })?;
    Ok(escape_string(path))
}

/// Reverse [`escape_path`], validating the result.
pub fn unescape_path(escaped: &str) -> Result<String, EscapeError> {
    let invalid = |reason| EscapeError::InvalidPath {
        path: escaped.to_string(),
        reason,
    };
    let path = unescape_string(escaped).ok_or_else(|| invalid("invalid escaping"))?;
    check_path(&path).map_err(invalid)?;
    Ok(path)
}

/// Escape a version for use in a proxy URL.
pub fn escape_version(version: &str) -> Result<String, EscapeError> {
    let invalid = |reason| EscapeError::InvalidVersion {
        version: version.to_string(),
        reason,
    };
    check_elem(version, ElemKind::File).map_err(invalid)?;
    if version.contains('!') {
        return Err(invalid("disallowed version string"));
    }
    Ok(escape_string(version))
}

/// Reverse [`escape_version`], validating the result.
pub fn unescape_version(escaped: &str) -> Result<String, EscapeError> {
    let invalid = |reason| EscapeError::InvalidVersion {
        version: escaped.to_string(),
        reason,
    };
    let version = unescape_string(escaped).ok_or_else(|| invalid("invalid escaping"))?;
    check_elem(&version, ElemKind::File).map_err(invalid)?;
    Ok(version)
}

fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_uppercase() {
            out.push('!');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn unescape_string(escaped: &str) -> Option<String> {
    let mut out = String::with_capacity(escaped.len());
    let mut bang = false;
    for c in escaped.chars() {
        if !c.is_ascii() {
            return None;
        }
        if bang {
            bang = false;
            if !c.is_ascii_lowercase() {
                return None;
            }
            out.push(c.to_ascii_uppercase());
            continue;
        }
        if c == '!' {
            bang = true;
            continue;
        }
        if c.is_ascii_uppercase() {
            return None;
        }
        out.push(c);
    }
    if bang {
        return None;
    }
    Some(out)
}

/// Module path rules: slash-separated elements, a dotted first element.
fn check_path(path: &str) -> Result<(), &'static str> {
    if path.is_empty() {
        return Err("empty string");
    }
    if path.starts_with('-') {
        return Err("leading dash");
    }
    if path.contains("//") {
        return Err("double slash");
    }
    if path.ends_with('/') {
        return Err("trailing slash");
    }
    for elem in path.split('/') {
        check_elem(elem, ElemKind::Module)?;
    }

    let first = path.split('/').next().unwrap_or_default();
    if first.is_empty() {
        return Err("leading slash");
    }
    if !first.contains('.') {
        return Err("missing dot in first path element");
    }
    if !first
        .chars()
        .all(|c| c == '-' || c == '.' || c.is_ascii_digit() || c.is_ascii_lowercase())
    {
        return Err("invalid char in first path element");
    }
    if let Some(last) = path.rsplit('/').next().filter(|_| path.contains('/')) {
        if is_major_suffix(last) && !is_valid_major_suffix(last) {
            return Err("invalid major version suffix");
        }
    }
    Ok(())
}

fn is_major_suffix(elem: &str) -> bool {
    elem.strip_prefix('v')
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

fn is_valid_major_suffix(elem: &str) -> bool {
    let n = &elem[1..];
    !n.starts_with('0') && n != "1"
}

fn check_elem(elem: &str, kind: ElemKind) -> Result<(), &'static str> {
    if elem.is_empty() {
        return Err("empty path element");
    }
    if elem.chars().all(|c| c == '.') {
        return Err("invalid path element");
    }
    if kind == ElemKind::Module && elem.starts_with('.') {
        return Err("leading dot in path element");
    }
    if elem.ends_with('.') {
        return Err("trailing dot in path element");
    }
    let ok = |c: char| match kind {
        ElemKind::Module => c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'),
        ElemKind::File => {
            if c.is_ascii() {
                c.is_ascii_alphanumeric() || "!#$%&()+,-.=@[]^_{}~ ".contains(c)
            } else {
                c.is_alphabetic()
            }
        }
    };
    if !elem.chars().all(ok) {
        return Err("invalid char in path element");
    }

    let short = elem.split('.').next().unwrap_or(elem);
    if BAD_WINDOWS_NAMES.iter().any(|bad| bad.eq_ignore_ascii_case(short)) {
        return Err("disallowed path element");
    }
    if kind == ElemKind::Module {
        if let Some(tilde) = short.rfind('~') {
            let suffix = &short[tilde + 1..];
            if !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) {
                return Err("trailing tilde and digits in path element");
            }
        }
    }
    Ok(())
}
