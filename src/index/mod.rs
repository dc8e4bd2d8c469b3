//! directory index
//!
//! discovers every bare repository under a store directory, walks the Git
//! tree at each repository's `HEAD` and records one [`Directory`] per tree
//! directory, with its Go package when it has one.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        CodeIndex                            │
//! │   (copy-on-write snapshots, lookup, per-repo replacement)   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                      ┌──────────────┐
//!                      │   discover   │  filesystem walk + HEAD tree walk
//!                      └──────────────┘
//!                              │
//!                              ▼
//!                      ┌──────────────┐
//!                      │   package    │  package clause, doc comment
//!                      └──────────────┘
//!                        │          │
//!                        ▼          ▼
//!              ┌────────────┐  ┌────────────┐
//!              │ constraint │  │    doc     │
//!              │ (go:build) │  │ (synopsis) │
//!              └────────────┘  └────────────┘
//! ```

mod code_index;
mod constraint;
mod directory;
mod discover;
mod doc;
mod error;
mod package;

pub use code_index::{CodeIndex, IndexSnapshot};
pub use constraint::BuildContext;
pub use directory::{Directory, Package, RepoInfo};
pub use discover::{discover, discover_repository, import_path, is_excluded};
pub use error::{IndexError, IndexResult, PackageError};
pub use package::load_package;
