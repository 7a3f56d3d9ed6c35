use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::repo::{Repo, RepositoryReader, RepositoryWriter, package_name_from_filename};

/// Debug packages whose parent package is no longer in the repository.
pub fn orphan_debug_packages(repo_packages: &BTreeSet<String>) -> BTreeSet<String> {
    repo_packages
        .iter()
        .filter(|package| {
            package
                .strip_suffix("-debug")
                .is_some_and(|parent| !repo_packages.contains(parent))
        })
        .cloned()
        .collect()
}

/// Packages to purge from the repository: the configured removals, their
/// debug counterparts, and orphaned debug packages, restricted to what the
/// repository actually contains.
pub fn packages_to_remove(
    repo_packages: &BTreeSet<String>,
    configured: &[String],
) -> BTreeSet<String> {
    let mut candidates: BTreeSet<String> = configured.iter().cloned().collect();
    candidates.extend(configured.iter().map(|package| format!("{package}-debug")));
    candidates.extend(orphan_debug_packages(repo_packages));
    repo_packages.intersection(&candidates).cloned().collect()
}

/// Remove the given packages from the repository: package files, their
/// detached signatures, and the database entries.
///
/// An empty set is a no-op; in particular the database tool is never invoked
/// with an empty package list.
pub fn remove_packages(
    repo: &Repo,
    writer: &dyn RepositoryWriter,
    packages: &BTreeSet<String>,
) -> Result<()> {
    if packages.is_empty() {
        return Ok(());
    }

    for file in repo.package_files()? {
        let Some(file_name) = file.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let Some(name) = package_name_from_filename(file_name) else {
            continue;
        };
        if packages.contains(name) {
            fs::remove_file(&file).with_context(|| format!("deleting {}", file.display()))?;
            let sigfile = signature_file(&file);
            if sigfile.is_file() {
                fs::remove_file(&sigfile)
                    .with_context(|| format!("deleting {}", sigfile.display()))?;
            }
        }
    }

    let names: Vec<String> = packages.iter().cloned().collect();
    writer.remove(repo, &names)
}

fn signature_file(package_file: &Path) -> PathBuf {
    let mut sigfile = package_file.as_os_str().to_os_string();
    sigfile.push(".sig");
    PathBuf::from(sigfile)
}

/// Delete deprecated packages and orphaned debug packages from the
/// repository. Returns the names that were removed.
pub fn cleanup(
    repo: &Repo,
    reader: &dyn RepositoryReader,
    writer: &dyn RepositoryWriter,
    configured: &[String],
) -> Result<Vec<String>> {
    let repo_packages: BTreeSet<String> = reader.packages(repo, false)?.into_iter().collect();
    let removals = packages_to_remove(&repo_packages, configured);
    remove_packages(repo, writer, &removals)?;
    Ok(removals.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::path::Path;

    struct FakeReader {
        packages: RefCell<Vec<String>>,
    }

    impl FakeReader {
        fn new(packages: &[&str]) -> FakeReader {
            FakeReader {
                packages: RefCell::new(packages.iter().map(|s| s.to_string()).collect()),
            }
        }
    }

    impl RepositoryReader for FakeReader {
        fn packages(&self, _repo: &Repo, with_versions: bool) -> Result<Vec<String>> {
            assert!(!with_versions, "cleanup only needs bare names");
            Ok(self.packages.borrow().clone())
        }
    }

    #[derive(Default)]
    struct RecordingWriter {
        removed: RefCell<Vec<Vec<String>>>,
    }

    impl RepositoryWriter for RecordingWriter {
        fn add(&self, _repo: &Repo, _files: &[PathBuf]) -> Result<()> {
            Ok(())
        }

        fn remove(&self, _repo: &Repo, packages: &[String]) -> Result<()> {
            self.removed.borrow_mut().push(packages.to_vec());
            Ok(())
        }
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn strings(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn repo_in(dir: &Path) -> Repo {
        Repo::new(&dir.join("test.db.tar.zst")).unwrap()
    }

    #[test]
    fn orphan_debug_packages_need_a_missing_parent() {
        let repo_packages = set(&["foo", "foo-debug", "bar-debug"]);
        assert_eq!(orphan_debug_packages(&repo_packages), set(&["bar-debug"]));
    }

    #[test]
    fn packages_to_remove_is_restricted_to_repo_contents() {
        let repo_packages = set(&["foo", "foo-debug", "bar-debug", "old", "old-debug", "keep"]);
        let configured = strings(&["old", "gone-already"]);
        let removals = packages_to_remove(&repo_packages, &configured);
        // old and its debug package are configured, bar-debug is orphaned;
        // gone-already is not in the repository and must not appear
        assert_eq!(removals, set(&["old", "old-debug", "bar-debug"]));
        assert!(removals.is_subset(&repo_packages));
    }

    #[test]
    fn empty_removal_set_invokes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo_in(dir.path());
        let package = dir.path().join("keep-1.0-1-x86_64.pkg.tar.zst");
        std::fs::write(&package, b"pkg").unwrap();

        let writer = RecordingWriter::default();
        remove_packages(&repo, &writer, &BTreeSet::new()).unwrap();

        assert!(package.exists());
        assert!(writer.removed.borrow().is_empty());
    }

    #[test]
    fn remove_packages_deletes_files_and_signatures() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo_in(dir.path());
        let old = dir.path().join("old-1.0-1-x86_64.pkg.tar.zst");
        let old_sig = dir.path().join("old-1.0-1-x86_64.pkg.tar.zst.sig");
        let keep = dir.path().join("keep-1.0-1-x86_64.pkg.tar.zst");
        for file in [&old, &old_sig, &keep] {
            std::fs::write(file, b"x").unwrap();
        }

        let writer = RecordingWriter::default();
        remove_packages(&repo, &writer, &set(&["old"])).unwrap();

        assert!(!old.exists());
        assert!(!old_sig.exists());
        assert!(keep.exists());
        assert_eq!(*writer.removed.borrow(), vec![strings(&["old"])]);
    }

    #[test]
    fn cleanup_removes_configured_and_orphaned_packages() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo_in(dir.path());
        let old = dir.path().join("old-1.0-1-x86_64.pkg.tar.zst");
        let orphan = dir.path().join("bar-debug-2.0-1-x86_64.pkg.tar.zst");
        let keep = dir.path().join("keep-1.0-1-x86_64.pkg.tar.zst");
        for file in [&old, &orphan, &keep] {
            std::fs::write(file, b"x").unwrap();
        }

        let reader = FakeReader::new(&["old", "bar-debug", "keep"]);
        let writer = RecordingWriter::default();
        let removed = cleanup(&repo, &reader, &writer, &strings(&["old"])).unwrap();

        assert_eq!(removed, strings(&["bar-debug", "old"]));
        assert!(!old.exists());
        assert!(!orphan.exists());
        assert!(keep.exists());
        assert_eq!(*writer.removed.borrow(), vec![strings(&["bar-debug", "old"])]);
    }

    #[test]
    fn cleanup_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo_in(dir.path());
        let old = dir.path().join("old-1.0-1-x86_64.pkg.tar.zst");
        std::fs::write(&old, b"x").unwrap();

        let reader = FakeReader::new(&["old", "keep"]);
        let writer = RecordingWriter::default();
        let configured = strings(&["old"]);

        let removed = cleanup(&repo, &reader, &writer, &configured).unwrap();
        assert_eq!(removed, strings(&["old"]));

        // The repository now no longer contains "old"
        *reader.packages.borrow_mut() = strings(&["keep"]);
        let removed = cleanup(&repo, &reader, &writer, &configured).unwrap();
        assert!(removed.is_empty());
        // No second repo-remove invocation for the empty set
        assert_eq!(writer.removed.borrow().len(), 1);
    }
}
