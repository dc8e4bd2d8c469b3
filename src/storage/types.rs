//! core type-safe wrappers around git primitives for the storage layer.

use std::fmt;

use git2::Oid;

/// This makes sure we don't accidentally pass a blob ID where a commit ID
/// is expected. The inner Oid is only accessible within the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitId(pub(crate) Oid);

impl CommitId {
    /// the all-zero object id git uses for "no object" in ref updates
    pub const ZERO_HEX: &'static str = "0000000000000000000000000000000000000000";

    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    /// raw Oid (for internal use only)
    pub(crate) fn raw(&self) -> Oid {
        self.0
    }

    /// parse CommitId from a full hex string
    pub fn from_hex(hex: &str) -> Result<Self, git2::Error> {
        Oid::from_str(hex).map(CommitId)
    }

    /// the first `n` hex digits of the commit ID
    pub fn short(&self, n: usize) -> String {
        let hex = self.0.to_string();
        hex[..n.min(hex.len())].to_string()
    }

    /// full lower-case hex form
    pub fn to_hex(&self) -> String {
        self.0.to_string()
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Git blob identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobId(pub(crate) Oid);

impl BlobId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    pub(crate) fn raw(&self) -> Oid {
        self.0
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// a local branch name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BranchName(pub(crate) String);

impl BranchName {
    /// the branch pseudo-versions are minted from
    pub const MASTER: &'static str = "master";

    pub fn master() -> Self {
        Self(Self::MASTER.to_string())
    }

    /// get the full ref path (e.g., "refs/heads/master")
    pub fn as_ref_path(&self) -> String {
        format!("refs/heads/{}", self.0)
    }

    /// get the short name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_id_short() {
        let id = CommitId::from_hex("4a2b3c4d5e6f708192a3b4c5d6e7f8091a2b3c4d").unwrap();
        assert_eq!(id.short(12), "4a2b3c4d5e6f");
        assert_eq!(id.short(100), id.to_hex());
        assert!(!id.is_zero());
        assert!(CommitId::from_hex(CommitId::ZERO_HEX).unwrap().is_zero());
    }

    #[test]
    fn test_branch_name_master() {
        let branch = BranchName::master();
        assert_eq!(branch.as_ref_path(), "refs/heads/master");
        assert_eq!(branch.as_str(), "master");
    }
}
