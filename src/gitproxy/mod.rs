//! git smart HTTP
//!
//! fronts `git-upload-pack` and `git-receive-pack` for every repository root
//! in the index. Clones and fetches are anonymous, pushes need an admin.
//!
//! # Push flow
//!
//! ```text
//!   POST <repo>/git-receive-pack
//!              │
//!              ▼
//!   ┌─────────────────────┐   401 without credentials, 403 without admin
//!   │    Authenticator    │
//!   └─────────────────────┘
//!              │
//!              ▼
//!   ┌─────────────────────┐   own process group, killed if the
//!   │     PackProcess     │   request goes away; the body is piped
//!   └─────────────────────┘   in as it arrives
//!              │
//!              ▼
//!   ┌─────────────────────┐   ref update commands read from the
//!   │    UpdateRequest    │   pkt-line section before the packfile
//!   └─────────────────────┘
//!              │
//!              ▼
//!   ┌─────────────────────┐   rejected refs dropped via report-status
//!   │    post-receive     │   CodeIndex::rediscover, then one Event per
//!   └─────────────────────┘   accepted update handed to the EventLog
//! ```

mod auth;
mod command;
mod error;
mod events;
mod handler;
mod pktline;
mod receive;
mod service;

pub use auth::{basic_credentials, Account, Authenticator, BasicAuthenticator, User};
pub use command::{
    Completion, ExitPolicy, PackCommand, PackOutput, PackProcess, PackStream, DEFAULT_MAX_BUFFERED_OUTPUT,
    HANGUP_EXIT_CODE,
};
pub use error::{AuthError, CommandError, EventLogError, GitHttpError, ProtocolError};
pub use events::{
    classify, payload_for, Event, EventLog, Payload, Push, PushCommit, RefChange, RefUpdate, RefUpdateKind,
    TracingEventLog,
};
pub use handler::GitProxy;
pub use pktline::{demux_sideband, pkt_line, PktLine, PktLineReader, PktLineWriter, FLUSH_PKT};
pub use receive::{ReportStatus, UpdateRequest};
pub use service::Service;
