use anyhow::{Context, Result, bail};
use duct::cmd;
use tempfile::tempdir;

use crate::aur::sync::with_build_env;
use crate::config::Config;
use crate::repo::{self, Repo, RepositoryWriter};

const AURUTILS_GIT: &str = "https://aur.archlinux.org/aurutils.git";

/// Build and install aurutils from its AUR checkout, then create the
/// repository. This is the one operation that cannot go through `aur sync`,
/// since aurutils is not installed yet.
pub fn bootstrap(config: &Config, repo: &Repo, writer: &dyn RepositoryWriter) -> Result<()> {
    if repo.db().exists() {
        bail!("repository already exists at {}", repo.db().display());
    }

    let build_dir = tempdir().context("creating temporary build directory")?;
    println!("Building aurutils in {}", build_dir.path().display());
    cmd!("git", "clone", "--depth=1", AURUTILS_GIT)
        .dir(build_dir.path())
        .run()
        .context("cloning aurutils")?;
    with_build_env(
        cmd!("makepkg", "--noconfirm", "--nocheck", "-rsi", "--sign")
            .dir(build_dir.path().join("aurutils")),
        config,
    )
    .run()
    .context("building aurutils")?;

    repo::create_repo(repo, writer)
}
