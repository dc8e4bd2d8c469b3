//! module proxy
//!
//! serves every repository root as a Go module through the `GOPROXY`
//! protocol: `list`, `.info`, `.mod` and `.zip` requests for v0
//! pseudo-versions of commits on `master`.
//!
//! # Request flow
//!
//! ```text
//!   <module>/@v/<version>.<ext>
//!              │
//!              ▼
//!   ┌─────────────────────┐   400 on malformed escaping
//!   │ ModuleRequest::parse│
//!   └─────────────────────┘
//!              │
//!              ▼
//!   ┌─────────────────────┐   404 unless the module is a repository root
//!   │  CodeIndex lookup   │
//!   └─────────────────────┘
//!              │
//!              ▼
//!   ┌─────────────────────┐   404 unless the pseudo-version names exactly
//!   │   resolve_version   │   one commit (hash prefix + committer time)
//!   └─────────────────────┘   reachable from master
//!              │
//!      ┌───────┼────────┐
//!      ▼       ▼        ▼
//!    info    go.mod    zip
//! ```

mod archive;
mod dirhash;
mod error;
mod escape;
mod gomod;
mod handler;
mod pseudo;
mod request;

pub use archive::build_module_zip;
pub use dirhash::hash_zip;
pub use error::{ModuleError, ModuleResult};
pub use escape::{escape_path, escape_version, unescape_path, unescape_version, EscapeError};
pub use gomod::synthesize as synthesize_go_mod;
pub use handler::{ModuleProxy, RevInfo};
pub use pseudo::{parse_pseudo_version, pseudo_version, PseudoVersionError, SHORT_HASH_LEN};
pub use request::{ModuleRequest, RequestKind};
