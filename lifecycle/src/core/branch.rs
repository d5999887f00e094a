//! Branch selection after a fresh clone.

/// Branches checked out after clone, in order of preference.
pub const PREFERRED_BRANCHES: [&str; 2] = ["main", "master"];

/// Pick the branch to check out: `main`, else `master`, else none (keep the
/// clone's default).
pub fn select_branch<S: AsRef<str>>(refs: &[S]) -> Option<&'static str> {
    PREFERRED_BRANCHES
        .into_iter()
        .find(|preferred| refs.iter().any(|name| name.as_ref() == *preferred))
}

/// Reduce a full ref name to the branch name it represents.
///
/// `refs/heads/main` and `refs/remotes/origin/main` both yield `main`.
/// Symbolic `HEAD` refs, tags, and anything else yield `None`.
pub fn branch_name(full_ref: &str) -> Option<&str> {
    let name = if let Some(local) = full_ref.strip_prefix("refs/heads/") {
        local
    } else {
        let remote = full_ref.strip_prefix("refs/remotes/")?;
        remote.split_once('/')?.1
    };
    if name.is_empty() || name == "HEAD" {
        return None;
    }
    Some(name)
}
