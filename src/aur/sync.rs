use anyhow::{Context, Result, bail};
use duct::{Expression, cmd};
use std::ffi::OsString;
use std::path::Path;

use crate::cleanup;
use crate::config::Config;
use crate::repo::{Repo, RepositoryReader, RepositoryWriter};

use super::resolver::DependencyResolver;
use super::vcs::{OutdatedProbe, outdated_vcs_packages};

/// Inject the signing key and packager identity for makepkg and gpg.
pub(crate) fn with_build_env(expression: Expression, config: &Config) -> Expression {
    let expression = expression.env("GPGKEY", &config.gpg_key);
    match &config.packager {
        Some(packager) => expression.env("PACKAGER", packager),
        None => expression,
    }
}

fn sync_command(config: &Config, repo: &Repo, packages: &[String]) -> Expression {
    let mut args: Vec<OsString> = vec![
        "sync".into(),
        "-d".into(),
        repo.name().into(),
        "--nocheck".into(),
        "-ucRS".into(),
        "--makepkg-conf".into(),
        config.makepkg_conf.clone().into(),
    ];
    args.extend(packages.iter().map(OsString::from));
    with_build_env(cmd("aur", args), config)
}

/// Clean up the repository, then build and sync the desired packages and
/// their dependency closure, and finally rebuild any VCS packages with newer
/// upstream sources.
///
/// Cleanup runs first so that removed packages cannot block the database
/// update. Any failing tool invocation aborts the whole operation.
pub fn sync_repo(
    config: &Config,
    repo: &Repo,
    reader: &dyn RepositoryReader,
    writer: &dyn RepositoryWriter,
    resolver: &dyn DependencyResolver,
    probe: &dyn OutdatedProbe,
    hostname: &str,
) -> Result<()> {
    cleanup::cleanup(repo, reader, writer, &config.remove)?;

    let desired = config.desired_packages(hostname)?;
    if desired.is_empty() {
        bail!("no packages configured for host {hostname}");
    }
    let all_packages = resolver.closure(&desired)?;

    sync_command(config, repo, &all_packages)
        .run()
        .context("syncing AUR packages")?;

    let vcs_packages: Vec<String> = all_packages
        .iter()
        .filter(|package| package.ends_with("-git"))
        .cloned()
        .collect();
    let outdated = outdated_vcs_packages(repo, reader, probe, &vcs_packages)?;
    if !outdated.is_empty() {
        println!("Rebuilding {} outdated VCS packages", outdated.len());
        sync_command(config, repo, &outdated)
            .run()
            .context("re-syncing outdated VCS packages")?;
    }
    Ok(())
}

/// Build a directory with a PKGBUILD and add the result to the repository.
pub fn build_pkgbuild(config: &Config, repo: &Repo, directory: &Path) -> Result<()> {
    if !directory.join("PKGBUILD").exists() {
        bail!("missing PKGBUILD in {}", directory.display());
    }
    let args: Vec<OsString> = vec![
        "build".into(),
        "-d".into(),
        repo.name().into(),
        "-cRS".into(),
        "--nocheck".into(),
        "--makepkg-conf".into(),
        config.makepkg_conf.clone().into(),
    ];
    with_build_env(cmd("aur", args).dir(directory), config)
        .run()
        .with_context(|| format!("building PKGBUILD in {}", directory.display()))?;
    Ok(())
}
