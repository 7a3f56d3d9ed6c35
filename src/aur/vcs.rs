use anyhow::{Context, Result};
use duct::cmd;
use std::path::PathBuf;
use tempfile::NamedTempFile;

use crate::repo::{Repo, RepositoryReader};

/// Probe for VCS packages whose upstream sources have moved past the
/// versions currently in the repository.
pub trait OutdatedProbe {
    /// The subset of `packages` that is outdated, given the repository's
    /// current "name version" lines.
    fn outdated(&self, packages: &[String], current_versions: &[String]) -> Result<Vec<String>>;
}

/// Probe backed by `aur srcver` and `aur vercmp`.
///
/// `aur srcver` updates the VCS checkouts in the aurutils sync cache as a
/// side effect; running two instances against the same cache directory at
/// once is not safe.
pub struct AurSrcVer {
    sync_dir: PathBuf,
}

impl AurSrcVer {
    pub fn new() -> Result<AurSrcVer> {
        let cache_dir =
            dirs::cache_dir().context("could not determine the user cache directory")?;
        Ok(AurSrcVer {
            sync_dir: cache_dir.join("aurutils").join("sync"),
        })
    }
}

impl OutdatedProbe for AurSrcVer {
    fn outdated(&self, packages: &[String], current_versions: &[String]) -> Result<Vec<String>> {
        if packages.is_empty() {
            return Ok(Vec::new());
        }

        let srcver_output =
            NamedTempFile::new().context("creating temporary file for source versions")?;
        let mut args = vec!["srcver".to_string(), "--noprepare".to_string()];
        args.extend(packages.iter().cloned());
        cmd("aur", args)
            .dir(&self.sync_dir)
            .stdout_path(srcver_output.path())
            .run()
            .context("probing VCS source versions with aur srcver")?;

        let output = cmd!("aur", "vercmp", "-q", "-p", srcver_output.path())
            .stdin_bytes(current_versions.join("\n"))
            .read()
            .context("comparing package versions with aur vercmp")?;
        Ok(output.lines().map(String::from).collect())
    }
}

/// All packages from `packages` with a newer upstream source revision than
/// the version currently in the repository. An empty input skips the probe
/// and the repository query entirely.
pub fn outdated_vcs_packages(
    repo: &Repo,
    reader: &dyn RepositoryReader,
    probe: &dyn OutdatedProbe,
    packages: &[String],
) -> Result<Vec<String>> {
    if packages.is_empty() {
        return Ok(Vec::new());
    }
    let current_versions = reader.packages(repo, true)?;
    probe.outdated(packages, &current_versions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    struct PanickingReader;

    impl RepositoryReader for PanickingReader {
        fn packages(&self, _repo: &Repo, _with_versions: bool) -> Result<Vec<String>> {
            panic!("repository must not be queried for an empty package list");
        }
    }

    struct PanickingProbe;

    impl OutdatedProbe for PanickingProbe {
        fn outdated(&self, _packages: &[String], _versions: &[String]) -> Result<Vec<String>> {
            panic!("probe must not run for an empty package list");
        }
    }

    struct FakeProbe;

    impl OutdatedProbe for FakeProbe {
        fn outdated(&self, packages: &[String], versions: &[String]) -> Result<Vec<String>> {
            assert_eq!(versions, ["foo-git 1.0-1", "bar 2.0-1"]);
            Ok(packages.to_vec())
        }
    }

    struct FakeReader;

    impl RepositoryReader for FakeReader {
        fn packages(&self, _repo: &Repo, with_versions: bool) -> Result<Vec<String>> {
            assert!(with_versions);
            Ok(vec!["foo-git 1.0-1".to_string(), "bar 2.0-1".to_string()])
        }
    }

    fn repo() -> Repo {
        Repo::new(Path::new("/srv/pkgrepo/test/test.db.tar.zst")).unwrap()
    }

    #[test]
    fn empty_package_list_short_circuits() {
        let outdated =
            outdated_vcs_packages(&repo(), &PanickingReader, &PanickingProbe, &[]).unwrap();
        assert!(outdated.is_empty());
    }

    #[test]
    fn probe_receives_current_repository_versions() {
        let packages = vec!["foo-git".to_string()];
        let outdated = outdated_vcs_packages(&repo(), &FakeReader, &FakeProbe, &packages).unwrap();
        assert_eq!(outdated, packages);
    }

    #[test]
    fn srcver_probe_short_circuits_on_empty_input() {
        let probe = AurSrcVer {
            sync_dir: PathBuf::from("/nonexistent"),
        };
        assert!(probe.outdated(&[], &[]).unwrap().is_empty());
    }
}
