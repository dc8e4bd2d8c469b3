//! Domain events for accepted pushes.
//!
//! Every ref update reported by receive-pack is classified by the ref
//! namespace it touches and by which of its object ids are zero:
//!
//! ```text
//!   namespace     old     new     kind
//!   refs/heads/   set     set     Push
//!   refs/heads/   zero    set     BranchCreate
//!   refs/heads/   set     zero    BranchDelete
//!   refs/tags/    zero    set     TagCreate
//!   refs/tags/    set     zero    TagDelete
//!   anything else                 Unrecognized
//! ```

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Serialize, Serializer};
use tracing::info;

use crate::gitproxy::auth::User;
use crate::gitproxy::error::EventLogError;
use crate::storage::{CommitId, CommitInfo, GitRepository, StorageResult};

const HEADS_PREFIX: &str = "refs/heads/";
const TAGS_PREFIX: &str = "refs/tags/";

/// One `<old> <new> <ref>` command from a receive-pack request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    pub old: CommitId,
    pub new: CommitId,
    pub ref_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefUpdateKind {
    Push { branch: String },
    BranchCreate { branch: String },
    BranchDelete { branch: String },
    TagCreate { tag: String },
    TagDelete { tag: String },
    Unrecognized,
}

pub fn classify(update: &RefUpdate) -> RefUpdateKind {
    let (old_zero, new_zero) = (update.old.is_zero(), update.new.is_zero());

    if let Some(branch) = update.ref_name.strip_prefix(HEADS_PREFIX) {
        let branch = branch.to_string();
        return match (old_zero, new_zero) {
            (false, false) => RefUpdateKind::Push { branch },
            (true, false) => RefUpdateKind::BranchCreate { branch },
            (false, true) => RefUpdateKind::BranchDelete { branch },
            (true, true) => RefUpdateKind::Unrecognized,
        };
    }
    if let Some(tag) = update.ref_name.strip_prefix(TAGS_PREFIX) {
        let tag = tag.to_string();
        return match (old_zero, new_zero) {
            (true, false) => RefUpdateKind::TagCreate { tag },
            (false, true) => RefUpdateKind::TagDelete { tag },
            _ => RefUpdateKind::Unrecognized,
        };
    }
    RefUpdateKind::Unrecognized
}

fn serialize_hex<S: Serializer>(id: &CommitId, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&id.to_hex())
}

/// Something that happened to a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Event {
    /// repository root import path
    pub repo: String,
    pub actor: String,
    /// whole seconds
    pub time: DateTime<Utc>,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Payload {
    Push(Push),
    Create(RefChange),
    Delete(RefChange),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Push {
    pub branch: String,
    #[serde(serialize_with = "serialize_hex")]
    pub head: CommitId,
    #[serde(serialize_with = "serialize_hex")]
    pub before: CommitId,
    /// oldest first
    pub commits: Vec<PushCommit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PushCommit {
    #[serde(rename = "SHA", serialize_with = "serialize_hex")]
    pub id: CommitId,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub author_time: DateTime<Utc>,
}

impl From<CommitInfo> for PushCommit {
    fn from(commit: CommitInfo) -> Self {
        Self {
            id: commit.id,
            message: commit.message,
            author_name: commit.author_name,
            author_email: commit.author_email,
            author_time: commit.author_time,
        }
    }
}

/// `Type` is `"branch"` or `"tag"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RefChange {
    #[serde(rename = "Type")]
    pub kind: String,
    pub name: String,
}

impl RefChange {
    fn branch(name: String) -> Self {
        Self {
            kind: "branch".to_string(),
            name,
        }
    }

    fn tag(name: String) -> Self {
        Self {
            kind: "tag".to_string(),
            name,
        }
    }
}

/// The payload for one update, `None` when it is unrecognized.
///
/// A push lists the commits `new` made reachable that `old` did not.
pub fn payload_for(repo: &GitRepository, update: &RefUpdate) -> StorageResult<Option<Payload>> {
    let payload = match classify(update) {
        RefUpdateKind::Push { branch } => {
            let commits = repo.commits_between(Some(update.old), update.new)?;
            Payload::Push(Push {
                branch,
                head: update.new,
                before: update.old,
                commits: commits.into_iter().map(PushCommit::from).collect(),
            })
        }
        RefUpdateKind::BranchCreate { branch } => Payload::Create(RefChange::branch(branch)),
        RefUpdateKind::BranchDelete { branch } => Payload::Delete(RefChange::branch(branch)),
        RefUpdateKind::TagCreate { tag } => Payload::Create(RefChange::tag(tag)),
        RefUpdateKind::TagDelete { tag } => Payload::Delete(RefChange::tag(tag)),
        RefUpdateKind::Unrecognized => return Ok(None),
    };
    Ok(Some(payload))
}

impl Event {
    pub fn new(repo: impl Into<String>, actor: &User, time: DateTime<Utc>, payload: Payload) -> Self {
        Self {
            repo: repo.into(),
            actor: actor.login.clone(),
            time: time.trunc_subsecs(0),
            payload,
        }
    }
}

/// Where events go. Failures are reported, never retried.
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn log(&self, event: Event) -> Result<(), EventLogError>;
}

/// Writes every event as a structured `tracing` record.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventLog;

#[async_trait]
impl EventLog for TracingEventLog {
    async fn log(&self, event: Event) -> Result<(), EventLogError> {
        let payload = serde_json::to_string(&event.payload).map_err(|e| EventLogError(e.to_string()))?;
        info!(
            target: "codehost::events",
            repo = %event.repo,
            actor = %event.actor,
            time = %event.time.to_rfc3339_opts(SecondsFormat::Secs, true),
            payload = %payload,
            "repository event"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "1111111111111111111111111111111111111111";
    const B: &str = "2222222222222222222222222222222222222222";

    fn update(old: &str, new: &str, ref_name: &str) -> RefUpdate {
        RefUpdate {
            old: CommitId::from_hex(old).unwrap(),
            new: CommitId::from_hex(new).unwrap(),
            ref_name: ref_name.to_string(),
        }
    }

    #[test]
    fn test_classify_branches() {
        let zero = CommitId::ZERO_HEX;
        assert_eq!(
            classify(&update(A, B, "refs/heads/master")),
            RefUpdateKind::Push {
                branch: "master".into()
            }
        );
        assert_eq!(
            classify(&update(zero, B, "refs/heads/feature/x")),
            RefUpdateKind::BranchCreate {
                branch: "feature/x".into()
            }
        );
        assert_eq!(
            classify(&update(A, zero, "refs/heads/old")),
            RefUpdateKind::BranchDelete { branch: "old".into() }
        );
        assert_eq!(classify(&update(zero, zero, "refs/heads/x")), RefUpdateKind::Unrecognized);
    }

    #[test]
    fn test_classify_tags() {
        let zero = CommitId::ZERO_HEX;
        assert_eq!(
            classify(&update(zero, B, "refs/tags/v1")),
            RefUpdateKind::TagCreate { tag: "v1".into() }
        );
        assert_eq!(
            classify(&update(A, zero, "refs/tags/v1")),
            RefUpdateKind::TagDelete { tag: "v1".into() }
        );
        // moving a tag is outside the classified space
        assert_eq!(classify(&update(A, B, "refs/tags/v1")), RefUpdateKind::Unrecognized);
        assert_eq!(classify(&update(A, B, "refs/notes/commits")), RefUpdateKind::Unrecognized);
    }

    #[test]
    fn test_event_json() {
        let user = User {
            login: "dmitri".into(),
            admin: true,
        };
        let time = DateTime::parse_from_rfc3339("2018-02-07T11:40:00.25Z").unwrap().with_timezone(&Utc);
        let event = Event::new(
            "dmitri.shuralyov.com/kebabcase",
            &user,
            time,
            Payload::Create(RefChange::tag("v1".into())),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "Repo": "dmitri.shuralyov.com/kebabcase",
                "Actor": "dmitri",
                "Time": "2018-02-07T11:40:00Z",
                "Payload": {"Create": {"Type": "tag", "Name": "v1"}},
            })
        );
    }

    #[test]
    fn test_push_json_uses_hex_ids() {
        let push = Payload::Push(Push {
            branch: "master".into(),
            head: CommitId::from_hex(B).unwrap(),
            before: CommitId::from_hex(A).unwrap(),
            commits: Vec::new(),
        });
        let json = serde_json::to_value(&push).unwrap();
        assert_eq!(json["Push"]["Head"], B);
        assert_eq!(json["Push"]["Before"], A);
        assert_eq!(json["Push"]["Branch"], "master");
    }

    #[tokio::test]
    async fn test_tracing_event_log_accepts_events() {
        let user = User {
            login: "dmitri".into(),
            admin: true,
        };
        let event = Event::new("r", &user, Utc::now(), Payload::Delete(RefChange::branch("x".into())));
        TracingEventLog.log(event).await.unwrap();
    }
}
