mod aur;
mod bootstrap;
mod cleanup;
mod config;
mod repo;
mod restic;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use anyhow::Result;

use crate::aur::resolver::AurDepends;
use crate::aur::vcs::AurSrcVer;
use crate::config::Config;
use crate::repo::{AurRepoReader, Repo, RepoDatabase, RepositoryWriter};
use crate::restic::{BackupStore, ResticStore};

/// Maintain a personal Arch Linux package repository built from the AUR
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the initial empty repository
    CreateRepo,
    /// Build and sync all desired AUR packages into the repository
    AurSync,
    /// Snapshot the repository directory and prune old snapshots
    Backup,
    /// Restore the repository directory from the latest snapshot
    Restore {
        /// Pass --verbose to restic
        #[arg(long)]
        verbose: bool,
    },
    /// List snapshots of the repository directory
    Snapshots,
    /// Re-add all package files to the database, then clean up
    UpdateRepo,
    /// Remove deprecated packages and orphaned debug packages
    Cleanup,
    /// Build a directory with a PKGBUILD and add the result to the repository
    BuildPkgbuild {
        /// Directory containing the PKGBUILD
        directory: PathBuf,
    },
    /// Remove the given packages from the repository
    RemovePackages {
        /// Package names to remove
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Build aurutils and create the repository from scratch
    Bootstrap,
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let repo = Repo::new(&config.database)?;
    let reader = AurRepoReader;
    let database = RepoDatabase::new(config.gpg_key.clone());

    match cli.command {
        Commands::CreateRepo => repo::create_repo(&repo, &database),
        Commands::AurSync => aur::sync::sync_repo(
            &config,
            &repo,
            &reader,
            &database,
            &AurDepends,
            &AurSrcVer::new()?,
            &config::hostname()?,
        ),
        Commands::Backup => {
            let store = ResticStore::new(config.backup_config()?);
            store.backup(repo.directory())?;
            println!("{} {}", "Backed up".green(), repo.directory().display());
            Ok(())
        }
        Commands::Restore { verbose } => {
            let store = ResticStore::new(config.backup_config()?);
            store.restore(repo.directory(), verbose)?;
            println!("{} {}", "Restored".green(), repo.directory().display());
            Ok(())
        }
        Commands::Snapshots => {
            let store = ResticStore::new(config.backup_config()?);
            let snapshots = store.snapshots(repo.directory())?;
            if snapshots.is_empty() {
                println!("No snapshots of {}", repo.directory().display());
            }
            for snapshot in snapshots {
                println!(
                    "{}  {}  {}  {}",
                    snapshot.short_id.bold(),
                    snapshot.time,
                    snapshot.hostname,
                    snapshot.tags.join(",")
                );
            }
            Ok(())
        }
        Commands::UpdateRepo => {
            let files = repo.package_files()?;
            database.add(&repo, &files)?;
            cleanup::cleanup(&repo, &reader, &database, &config.remove)?;
            Ok(())
        }
        Commands::Cleanup => {
            let removed = cleanup::cleanup(&repo, &reader, &database, &config.remove)?;
            if removed.is_empty() {
                println!("Nothing to remove");
            }
            for package in removed {
                println!("{} {package}", "removed".red());
            }
            Ok(())
        }
        Commands::BuildPkgbuild { directory } => {
            aur::sync::build_pkgbuild(&config, &repo, &directory)
        }
        Commands::RemovePackages { packages } => {
            cleanup::remove_packages(&repo, &database, &packages.into_iter().collect())
        }
        Commands::Bootstrap => bootstrap::bootstrap(&config, &repo, &database),
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("{} {err:#}", "error:".red().bold());
        std::process::exit(1);
    }
}
