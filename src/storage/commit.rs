//!  Commit lookup and history traversal
//!
//! the module proxy and the push event log both reason about commits:
//! - pseudo-versions are minted from a commit's committer time and hash
//! - a version is only valid if its commit is reachable from master
//! - a push reports the commits it made reachable, oldest first
//!
//! this module handles commit lookup, ancestry checks and history walking

use chrono::{DateTime, TimeZone, Utc};
use git2::{ErrorCode, Repository, Revwalk, Sort};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::tree::TreeHandle;
use crate::storage::types::CommitId;

/// information about a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub id: CommitId,
    pub parent_ids: Vec<CommitId>,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub author_time: DateTime<Utc>,
    /// committer date, truncated to seconds
    pub committer_time: DateTime<Utc>,
}

impl CommitInfo {
    /// create CommitInfo from a git2::Commit
    pub(crate) fn from_git2(commit: &git2::Commit<'_>) -> Self {
        let author = commit.author();

        Self {
            id: CommitId::new(commit.id()),
            parent_ids: commit.parent_ids().map(CommitId::new).collect(),
            message: commit.message().unwrap_or("").to_string(),
            author_name: author.name().unwrap_or("Unknown").to_string(),
            author_email: author.email().unwrap_or("unknown@unknown").to_string(),
            author_time: to_utc(author.when()),
            committer_time: to_utc(commit.committer().when()),
        }
    }
}

fn to_utc(time: git2::Time) -> DateTime<Utc> {
    Utc.timestamp_opt(time.seconds(), 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// resolve an abbreviated commit hash
///
/// unknown, ambiguous and non-commit prefixes all report `CommitNotFound`
pub fn find_commit_by_prefix(repo: &Repository, prefix: &str) -> StorageResult<CommitInfo> {
    match repo.find_commit_by_prefix(prefix) {
        Ok(commit) => Ok(CommitInfo::from_git2(&commit)),
        Err(e)
            if matches!(
                e.code(),
                ErrorCode::NotFound | ErrorCode::Ambiguous | ErrorCode::InvalidSpec
            ) || e.class() == git2::ErrorClass::Invalid =>
        {
            Err(StorageError::CommitNotFound(prefix.to_string()))
        }
        Err(e) => Err(StorageError::Git(e)),
    }
}

/// get the tree snapshot at a specific commit
pub fn get_tree_at_commit(repo: &Repository, commit_id: CommitId) -> StorageResult<TreeHandle<'_>> {
    let commit = repo
        .find_commit(commit_id.raw())
        .map_err(|_| StorageError::CommitNotFound(commit_id.to_string()))?;

    let tree = commit.tree()?;
    Ok(TreeHandle::new(repo, tree))
}

/// check whether `ancestor` is `descendant` or one of its ancestors
pub fn is_ancestor_or_equal(repo: &Repository, ancestor: CommitId, descendant: CommitId) -> StorageResult<bool> {
    if ancestor == descendant {
        return Ok(true);
    }
    Ok(repo.graph_descendant_of(descendant.raw(), ancestor.raw())?)
}

/// iterate over commit history starting from a commit, newest first
pub struct HistoryIterator<'repo> {
    repo: &'repo Repository,
    revwalk: Revwalk<'repo>,
}

impl<'repo> HistoryIterator<'repo> {
    /// create a new history iterator
    pub fn new(repo: &'repo Repository, start: CommitId) -> StorageResult<Self> {
        let mut revwalk = repo.revwalk()?;
        revwalk.push(start.raw())?;
        revwalk.set_sorting(Sort::TIME | Sort::TOPOLOGICAL)?;

        Ok(Self { repo, revwalk })
    }

    /// stop the walk at `boundary` and everything reachable from it
    pub fn hide(mut self, boundary: CommitId) -> StorageResult<Self> {
        self.revwalk.hide(boundary.raw())?;
        Ok(self)
    }
}

impl<'repo> Iterator for HistoryIterator<'repo> {
    type Item = StorageResult<CommitInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.revwalk.next()? {
            Ok(oid) => match self.repo.find_commit(oid) {
                Ok(commit) => Some(Ok(CommitInfo::from_git2(&commit))),
                Err(e) => Some(Err(StorageError::Git(e))),
            },
            Err(e) => Some(Err(StorageError::Git(e))),
        }
    }
}

/// get history for a commit
pub fn history(repo: &Repository, start: CommitId) -> StorageResult<HistoryIterator<'_>> {
    HistoryIterator::new(repo, start)
}

/// commits reachable from `new` but not from `old`, oldest first
///
/// `old == None` (a newly created ref) yields the whole history of `new`
pub fn commits_between(repo: &Repository, old: Option<CommitId>, new: CommitId) -> StorageResult<Vec<CommitInfo>> {
    let mut iter = history(repo, new)?;
    if let Some(old) = old {
        // a force push can leave the old tip unreachable or even absent
        if repo.find_commit(old.raw()).is_ok() {
            iter = iter.hide(old)?;
        }
    }

    let mut commits: Vec<CommitInfo> = iter.collect::<Result<_, _>>()?;
    commits.reverse();
    Ok(commits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_repo() -> (TempDir, Repository) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init_bare(dir.path()).unwrap();
        (dir, repo)
    }

    fn commit_at(repo: &Repository, parents: &[CommitId], seconds: i64, message: &str) -> CommitId {
        let tree_id = repo.treebuilder(None).unwrap().write().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::new("Test", "test@test.com", &git2::Time::new(seconds, 0)).unwrap();
        let parents: Vec<git2::Commit<'_>> = parents.iter().map(|p| repo.find_commit(p.raw()).unwrap()).collect();
        let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();
        CommitId::new(repo.commit(None, &sig, &sig, message, &tree, &parent_refs).unwrap())
    }

    #[test]
    fn test_commit_info_times() {
        let (_dir, repo) = setup_repo();
        let id = commit_at(&repo, &[], 1_518_000_000, "Initial commit.\n");

        let info = find_commit_by_prefix(&repo, &id.to_hex()).unwrap();
        assert_eq!(info.committer_time.timestamp(), 1_518_000_000);
        assert_eq!(info.author_time, info.committer_time);
        assert_eq!(info.message, "Initial commit.\n");
        assert!(info.parent_ids.is_empty());
    }

    #[test]
    fn test_find_commit_by_prefix() {
        let (_dir, repo) = setup_repo();
        let id = commit_at(&repo, &[], 1_518_000_000, "c1");

        let found = find_commit_by_prefix(&repo, &id.short(12)).unwrap();
        assert_eq!(found.id, id);

        let missing = find_commit_by_prefix(&repo, "000000000000");
        assert!(matches!(missing, Err(StorageError::CommitNotFound(_))));
    }

    #[test]
    fn test_ancestry() {
        let (_dir, repo) = setup_repo();
        let base = commit_at(&repo, &[], 100, "base");
        let left = commit_at(&repo, &[base], 200, "left");
        let right = commit_at(&repo, &[base], 300, "right");

        assert!(is_ancestor_or_equal(&repo, base, left).unwrap());
        assert!(is_ancestor_or_equal(&repo, left, left).unwrap());
        assert!(!is_ancestor_or_equal(&repo, left, base).unwrap());
        assert!(!is_ancestor_or_equal(&repo, right, left).unwrap());
    }

    #[test]
    fn test_history_iteration() {
        let (_dir, repo) = setup_repo();
        let c1 = commit_at(&repo, &[], 100, "First");
        let c2 = commit_at(&repo, &[c1], 200, "Second");
        let c3 = commit_at(&repo, &[c2], 300, "Third");

        let commits: Vec<_> = history(&repo, c3).unwrap().collect::<Result<_, _>>().unwrap();
        let ids: Vec<_> = commits.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![c3, c2, c1]);
    }

    #[test]
    fn test_commits_between_oldest_first() {
        let (_dir, repo) = setup_repo();
        let c1 = commit_at(&repo, &[], 100, "First");
        let c2 = commit_at(&repo, &[c1], 200, "Second");
        let c3 = commit_at(&repo, &[c2], 300, "Third");

        let ids: Vec<_> = commits_between(&repo, Some(c1), c3).unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![c2, c3]);

        let all: Vec<_> = commits_between(&repo, None, c3).unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(all, vec![c1, c2, c3]);

        assert!(commits_between(&repo, Some(c3), c3).unwrap().is_empty());
    }
}
