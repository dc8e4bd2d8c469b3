//! Go build constraints.
//!
//! Packages are loaded for one fixed target: `GOOS=linux`, `GOARCH=amd64`,
//! cgo enabled, the gc toolchain. A file is built when its name suffixes
//! (`_linux.go`, `_windows_arm64.go`, ...) and its header constraint
//! (`//go:build` or the legacy `// +build` lines) are satisfied for that target.

use std::fmt;

use crate::index::error::PackageError;

const KNOWN_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "js", "linux", "nacl",
    "netbsd", "openbsd", "plan9", "solaris", "wasip1", "windows", "zos",
];

const KNOWN_ARCH: &[&str] = &[
    "386", "amd64", "amd64p32", "arm", "armbe", "arm64", "arm64be", "loong64", "mips", "mipsle", "mips64",
    "mips64le", "mips64p32", "mips64p32le", "ppc", "ppc64", "ppc64le", "riscv", "riscv64", "s390", "s390x",
    "sparc", "sparc64", "wasm",
];

const UNIX_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "linux", "netbsd", "openbsd",
    "solaris",
];

/// The target packages are evaluated against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    pub goos: &'static str,
    pub goarch: &'static str,
    pub cgo_enabled: bool,
    /// highest `go1.N` release tag that is satisfied
    pub release_minor: u32,
}

impl BuildContext {
    pub fn linux_amd64() -> Self {
        Self {
            goos: "linux",
            goarch: "amd64",
            cgo_enabled: true,
            release_minor: 24,
        }
    }

    /// Report whether a single build tag is satisfied.
    pub fn match_tag(&self, tag: &str) -> bool {
        if tag.is_empty() {
            return false;
        }
        if self.cgo_enabled && tag == "cgo" {
            return true;
        }
        if tag == self.goos || tag == self.goarch || tag == "gc" {
            return true;
        }
        if tag == "unix" && UNIX_OS.contains(&self.goos) {
            return true;
        }
        if let Some(minor) = tag.strip_prefix("go1.") {
            return minor.parse::<u32>().map(|m| m >= 1 && m <= self.release_minor).unwrap_or(false);
        }
        false
    }

    /// Apply the `_GOOS`, `_GOARCH` and `_GOOS_GOARCH` file name conventions.
    pub fn good_os_arch_file(&self, name: &str) -> bool {
        let name = name.split('.').next().unwrap_or(name);
        // the part before the first underscore never constrains anything
        let Some(i) = name.find('_') else {
            return true;
        };
        let name = &name[i..];
        let name = name.strip_suffix("_test").unwrap_or(name);

        let parts: Vec<&str> = name.split('_').collect();
        let n = parts.len();
        if n >= 2 && KNOWN_OS.contains(&parts[n - 2]) && KNOWN_ARCH.contains(&parts[n - 1]) {
            return self.match_tag(parts[n - 2]) && self.match_tag(parts[n - 1]);
        }
        if n >= 1 && (KNOWN_OS.contains(&parts[n - 1]) || KNOWN_ARCH.contains(&parts[n - 1])) {
            return self.match_tag(parts[n - 1]);
        }
        true
    }
}

impl Default for BuildContext {
    fn default() -> Self {
        Self::linux_amd64()
    }
}

/// A parsed constraint expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Tag(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn eval(&self, ctx: &BuildContext) -> bool {
        match self {
            Expr::Tag(tag) => ctx.match_tag(tag),
            Expr::Not(x) => !x.eval(ctx),
            Expr::And(x, y) => x.eval(ctx) && y.eval(ctx),
            Expr::Or(x, y) => x.eval(ctx) || y.eval(ctx),
        }
    }

    fn and(x: Expr, y: Expr) -> Expr {
        Expr::And(Box::new(x), Box::new(y))
    }

    fn or(x: Expr, y: Expr) -> Expr {
        Expr::Or(Box::new(x), Box::new(y))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Tag(tag) => write!(f, "{}", tag),
            Expr::Not(x) => write!(f, "!{}", x),
            Expr::And(x, y) => write!(f, "({} && {})", x, y),
            Expr::Or(x, y) => write!(f, "({} || {})", x, y),
        }
    }
}

/// Report whether a trimmed source line is a `//go:build` line.
pub fn is_go_build_line(line: &str) -> bool {
    match line.strip_prefix("//go:build") {
        Some(rest) => rest.is_empty() || rest.starts_with([' ', '\t']),
        None => false,
    }
}

/// Report whether a trimmed source line is a legacy `// +build` line.
pub fn is_plus_build_line(line: &str) -> bool {
    let Some(rest) = line.strip_prefix("//") else {
        return false;
    };
    let rest = rest.trim_start();
    match rest.strip_prefix("+build") {
        Some(tail) => tail.is_empty() || tail.starts_with([' ', '\t']),
        None => false,
    }
}

/// Parse a `//go:build` line.
pub fn parse_go_build(line: &str) -> Result<Expr, PackageError> {
    let text = line
        .trim()
        .strip_prefix("//go:build")
        .ok_or_else(|| bad_constraint(line, "not a //go:build line"))?;

    let tokens = tokenize(text).map_err(|reason| bad_constraint(line, &reason))?;
    let mut parser = ExprParser { tokens, pos: 0 };
    let expr = parser.parse_or().map_err(|reason| bad_constraint(line, &reason))?;
    if parser.pos != parser.tokens.len() {
        return Err(bad_constraint(line, "unexpected token after expression"));
    }
    Ok(expr)
}

/// Parse a legacy `// +build` line: space-separated options are OR-ed,
/// comma-separated terms within an option are AND-ed.
pub fn parse_plus_build(line: &str) -> Result<Expr, PackageError> {
    let text = line
        .trim()
        .strip_prefix("//")
        .map(str::trim_start)
        .and_then(|rest| rest.strip_prefix("+build"))
        .ok_or_else(|| bad_constraint(line, "not a +build line"))?;

    let mut result: Option<Expr> = None;
    for option in text.split_whitespace() {
        let mut clause: Option<Expr> = None;
        for term in option.split(',') {
            let (negated, tag) = match term.strip_prefix('!') {
                Some(tag) => (true, tag),
                None => (false, term),
            };
            if !is_valid_tag(tag) {
                return Err(bad_constraint(line, &format!("invalid tag {:?}", term)));
            }
            let mut x = Expr::Tag(tag.to_string());
            if negated {
                x = Expr::Not(Box::new(x));
            }
            clause = Some(match clause {
                Some(c) => Expr::and(c, x),
                None => x,
            });
        }
        if let Some(clause) = clause {
            result = Some(match result {
                Some(r) => Expr::or(r, clause),
                None => clause,
            });
        }
    }
    result.ok_or_else(|| bad_constraint(line, "empty +build line"))
}

fn bad_constraint(line: &str, reason: &str) -> PackageError {
    PackageError::BadConstraint {
        line: line.trim().to_string(),
        reason: reason.to_string(),
    }
}

fn is_valid_tag(tag: &str) -> bool {
    !tag.is_empty() && tag.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.')
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    Not,
    And,
    Or,
    Tag(String),
}

fn tokenize(text: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '!' => {
                chars.next();
                tokens.push(Token::Not);
            }
            '&' | '|' => {
                chars.next();
                if chars.next() != Some(c) {
                    return Err(format!("expected {}{}", c, c));
                }
                tokens.push(if c == '&' { Token::And } else { Token::Or });
            }
            _ if c.is_alphanumeric() || c == '_' || c == '.' => {
                let mut tag = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '.' {
                        tag.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Tag(tag));
            }
            _ => return Err(format!("unexpected character {:?}", c)),
        }
    }
    Ok(tokens)
}

struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut x = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let y = self.parse_and()?;
            x = Expr::or(x, y);
        }
        Ok(x)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut x = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let y = self.parse_not()?;
            x = Expr::and(x, y);
        }
        Ok(x)
    }

    fn parse_not(&mut self) -> Result<Expr, String> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            if self.peek() == Some(&Token::Not) {
                return Err("double negation not allowed".to_string());
            }
            let x = self.parse_not()?;
            return Ok(Expr::Not(Box::new(x)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Expr, String> {
        match self.tokens.get(self.pos).cloned() {
            Some(Token::LParen) => {
                self.pos += 1;
                let x = self.parse_or()?;
                if self.peek() != Some(&Token::RParen) {
                    return Err("missing close paren".to_string());
                }
                self.pos += 1;
                Ok(x)
            }
            Some(Token::Tag(tag)) => {
                self.pos += 1;
                Ok(Expr::Tag(tag))
            }
            Some(other) => Err(format!("unexpected token {:?}", other)),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_go_build(line: &str) -> bool {
        parse_go_build(line).unwrap().eval(&BuildContext::linux_amd64())
    }

    fn eval_plus_build(line: &str) -> bool {
        parse_plus_build(line).unwrap().eval(&BuildContext::linux_amd64())
    }

    #[test]
    fn test_match_tag() {
        let ctx = BuildContext::linux_amd64();
        for tag in ["linux", "amd64", "unix", "cgo", "gc", "go1.1", "go1.18"] {
            assert!(ctx.match_tag(tag), "{} should match", tag);
        }
        for tag in ["windows", "arm64", "ignore", "gccgo", "go1.99", "go2.0", ""] {
            assert!(!ctx.match_tag(tag), "{} should not match", tag);
        }
    }

    #[test]
    fn test_good_os_arch_file() {
        let ctx = BuildContext::linux_amd64();
        assert!(ctx.good_os_arch_file("main.go"));
        assert!(ctx.good_os_arch_file("linux.go"));
        assert!(ctx.good_os_arch_file("file_linux.go"));
        assert!(ctx.good_os_arch_file("file_amd64.go"));
        assert!(ctx.good_os_arch_file("file_linux_amd64.go"));
        assert!(ctx.good_os_arch_file("file_linux_test.go"));
        assert!(ctx.good_os_arch_file("kebab_case.go"));
        assert!(!ctx.good_os_arch_file("file_windows.go"));
        assert!(!ctx.good_os_arch_file("file_arm64.go"));
        assert!(!ctx.good_os_arch_file("file_linux_arm64.go"));
        assert!(!ctx.good_os_arch_file("file_darwin_test.go"));
    }

    #[test]
    fn test_go_build_expressions() {
        assert!(eval_go_build("//go:build linux"));
        assert!(eval_go_build("//go:build linux && amd64"));
        assert!(eval_go_build("//go:build windows || (linux && cgo)"));
        assert!(eval_go_build("//go:build !windows"));
        assert!(!eval_go_build("//go:build ignore"));
        assert!(!eval_go_build("//go:build linux && !cgo"));
        assert!(!eval_go_build("//go:build !(linux || darwin)"));
    }

    #[test]
    fn test_go_build_syntax_errors() {
        assert!(parse_go_build("//go:build linux &&").is_err());
        assert!(parse_go_build("//go:build (linux").is_err());
        assert!(parse_go_build("//go:build linux & amd64").is_err());
        assert!(parse_go_build("//go:build !!linux").is_err());
        assert!(parse_go_build("//go:build linux darwin").is_err());
    }

    #[test]
    fn test_plus_build_lines() {
        assert!(eval_plus_build("// +build linux darwin"));
        assert!(eval_plus_build("// +build linux,amd64"));
        assert!(eval_plus_build("// +build windows linux,!arm"));
        assert!(!eval_plus_build("// +build ignore"));
        assert!(!eval_plus_build("// +build linux,!cgo"));
        assert!(parse_plus_build("// +build").is_err());
    }

    #[test]
    fn test_line_detection() {
        assert!(is_go_build_line("//go:build linux"));
        assert!(!is_go_build_line("//go:builds linux"));
        assert!(!is_go_build_line("// go:build linux"));
        assert!(is_plus_build_line("// +build linux"));
        assert!(is_plus_build_line("//+build linux"));
        assert!(!is_plus_build_line("// +builder"));
    }
}
