use std::path::{Path, PathBuf};

use crate::error::WatchError;

/// Name of the git metadata directory inside a working tree.
pub const GIT_DIR: &str = ".git";
/// Branch-indicator file inside the git directory.
pub const HEAD_FILE: &str = "HEAD";

const SYMREF_PREFIX: &str = "ref: ";
const HEADS_PREFIX: &str = "refs/heads/";

/// What HEAD currently points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadTarget {
    /// Branch name, empty when HEAD is detached.
    pub branch: String,
    /// The ref file HEAD resolves to, or HEAD itself when detached.
    pub ref_file: PathBuf,
}

/// Find `<cwd>/.git`. Fails when it is missing or not a directory
/// (plain files, as used by linked worktrees, are not followed).
pub fn locate_git_dir(cwd: &Path) -> Result<PathBuf, WatchError> {
    let git_dir = cwd.join(GIT_DIR);
    if git_dir.is_dir() {
        Ok(git_dir)
    } else {
        Err(WatchError::NotARepository(cwd.to_path_buf()))
    }
}

pub fn head_file(git_dir: &Path) -> PathBuf {
    git_dir.join(HEAD_FILE)
}

/// Interpret the contents of a HEAD file.
pub fn parse_head(git_dir: &Path, contents: &str) -> HeadTarget {
    let contents = contents.trim();
    match contents.strip_prefix(SYMREF_PREFIX) {
        Some(reference) => {
            let reference = reference.trim();
            let branch = reference
                .strip_prefix(HEADS_PREFIX)
                .unwrap_or(reference)
                .to_string();
            HeadTarget {
                branch,
                ref_file: git_dir.join(reference),
            }
        }
        None => HeadTarget {
            branch: String::new(),
            ref_file: head_file(git_dir),
        },
    }
}

/// Read and parse `<git_dir>/HEAD`.
pub fn read_head(git_dir: &Path) -> Result<HeadTarget, WatchError> {
    let path = head_file(git_dir);
    let contents = std::fs::read_to_string(&path).map_err(|e| WatchError::io(&path, e))?;
    Ok(parse_head(git_dir, &contents))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbolic_ref_to_branch() {
        let git_dir = Path::new("/repo/.git");
        let target = parse_head(git_dir, "ref: refs/heads/main\n");
        assert_eq!(target.branch, "main");
        assert_eq!(target.ref_file, git_dir.join("refs/heads/main"));
    }

    #[test]
    fn nested_branch_name_keeps_slashes() {
        let git_dir = Path::new("/repo/.git");
        let target = parse_head(git_dir, "ref: refs/heads/feature/login-form");
        assert_eq!(target.branch, "feature/login-form");
        assert_eq!(target.ref_file, git_dir.join("refs/heads/feature/login-form"));
    }

    #[test]
    fn symbolic_ref_outside_heads_uses_raw_pointer() {
        let git_dir = Path::new("/repo/.git");
        let target = parse_head(git_dir, "ref: refs/remotes/origin/main\n");
        assert_eq!(target.branch, "refs/remotes/origin/main");
        assert_eq!(target.ref_file, git_dir.join("refs/remotes/origin/main"));
    }

    #[test]
    fn detached_head_has_no_branch() {
        let git_dir = Path::new("/repo/.git");
        let target = parse_head(git_dir, "4b825dc642cb6eb9a060e54bf8d69288fbee4904\n");
        assert_eq!(target.branch, "");
        assert_eq!(target.ref_file, head_file(git_dir));
    }

    #[test]
    fn empty_head_is_treated_as_detached() {
        let git_dir = Path::new("/repo/.git");
        let target = parse_head(git_dir, "");
        assert_eq!(target.branch, "");
        assert_eq!(target.ref_file, head_file(git_dir));
    }

    #[test]
    fn locate_requires_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            locate_git_dir(dir.path()),
            Err(WatchError::NotARepository(_))
        ));

        std::fs::write(dir.path().join(GIT_DIR), "gitdir: /elsewhere\n").unwrap();
        assert!(matches!(
            locate_git_dir(dir.path()),
            Err(WatchError::NotARepository(_))
        ));
    }

    #[test]
    fn locate_finds_git_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(GIT_DIR)).unwrap();
        assert_eq!(locate_git_dir(dir.path()).unwrap(), dir.path().join(GIT_DIR));
    }

    #[test]
    fn read_head_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(read_head(dir.path()), Err(WatchError::Io { .. })));
    }

    #[test]
    fn read_head_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(HEAD_FILE), "ref: refs/heads/dev\n").unwrap();
        let target = read_head(dir.path()).unwrap();
        assert_eq!(target.branch, "dev");
    }
}
