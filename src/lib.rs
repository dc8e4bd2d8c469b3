//! codehost - Git hosting for Go code
//!
//! Serves a directory of bare Git repositories two ways: over Git's smart
//! HTTP protocol for clones and pushes, and as a Go module proxy that turns
//! every commit on `master` into a v0 pseudo-version. A directory index
//! keeps track of every Go package in every repository and is refreshed
//! after each push.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use codehost::index::CodeIndex;
//! use codehost::module::ModuleProxy;
//!
//! let index = Arc::new(CodeIndex::open("/srv/repos", "dmitri.shuralyov.com").unwrap());
//! let proxy = ModuleProxy::new(Arc::clone(&index));
//! for version in proxy.list("dmitri.shuralyov.com/kebabcase").unwrap() {
//!     println!("{}", version);
//! }
//! ```

pub mod config;
pub mod gitproxy;
pub mod index;
pub mod module;
pub mod server;
pub mod storage;
