use std::fmt;

use percent_encoding::percent_decode_str;

use crate::module::error::{ModuleError, ModuleResult};
use crate::module::escape::{unescape_path, unescape_version};

/// The four module proxy request types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    List,
    Info,
    Mod,
    Zip,
}

impl RequestKind {
    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "info" => Some(RequestKind::Info),
            "mod" => Some(RequestKind::Mod),
            "zip" => Some(RequestKind::Zip),
            _ => None,
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestKind::List => "list",
            RequestKind::Info => "info",
            RequestKind::Mod => "mod",
            RequestKind::Zip => "zip",
        };
        f.write_str(s)
    }
}

/// A parsed module proxy request; module and version are unescaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRequest {
    pub module: String,
    pub kind: RequestKind,
    /// empty for `list`
    pub version: String,
}

impl ModuleRequest {
    /// Parse the request path that follows the proxy mount prefix,
    /// e.g. `dmitri.shuralyov.com/kebabcase/@v/list`.
    ///
    /// An unrecognized shape is `NotFound`; malformed escaping is `BadRequest`.
    pub fn parse(path: &str) -> ModuleResult<Self> {
        let path = percent_decode_str(path)
            .decode_utf8()
            .map_err(|_| ModuleError::BadRequest("path is not valid UTF-8".to_string()))?;
        let path = path.trim_start_matches('/');

        let (module, file) = path
            .rsplit_once("/@v/")
            .ok_or_else(|| ModuleError::NotFound(format!("no /@v/ in {:?}", path)))?;

        let (kind, version) = if file == "list" {
            (RequestKind::List, "")
        } else {
            let (version, ext) = file
                .rsplit_once('.')
                .ok_or_else(|| ModuleError::NotFound(format!("unrecognized file {:?}", file)))?;
            let kind = RequestKind::from_extension(ext)
                .ok_or_else(|| ModuleError::NotFound(format!("unrecognized file {:?}", file)))?;
            (kind, version)
        };

        let module = unescape_path(module).map_err(|e| ModuleError::BadRequest(e.to_string()))?;
        let version = if kind == RequestKind::List {
            String::new()
        } else {
            unescape_version(version).map_err(|e| ModuleError::BadRequest(e.to_string()))?
        };

        Ok(Self { module, kind, version })
    }
}
