use anyhow::{Context, Result, bail};
use duct::cmd;
use nix::unistd::{getgid, getuid};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// Suffix of package archives built by makepkg.
pub const PACKAGE_SUFFIX: &str = ".pkg.tar.zst";

/// Suffixes a repository database file may carry, most specific first.
const DB_SUFFIXES: &[&str] = &[".db.tar.zst", ".db.tar.xz", ".db.tar.gz", ".db.tar", ".db"];

/// A local pacman package repository, identified by its database archive.
///
/// The containing directory holds package archives, their detached
/// signatures, and the database itself.
#[derive(Debug, Clone)]
pub struct Repo {
    db: PathBuf,
    directory: PathBuf,
    name: String,
}

impl Repo {
    pub fn new(db: &Path) -> Result<Repo> {
        let db = if db.is_absolute() {
            db.to_path_buf()
        } else {
            std::env::current_dir()
                .context("determining the current directory")?
                .join(db)
        };
        let directory = db
            .parent()
            .with_context(|| format!("database path {} has no parent directory", db.display()))?
            .to_path_buf();
        let file_name = db
            .file_name()
            .and_then(|name| name.to_str())
            .with_context(|| format!("invalid database file name in {}", db.display()))?;
        let name = strip_db_suffix(file_name).to_string();
        Ok(Repo {
            db,
            directory,
            name,
        })
    }

    pub fn db(&self) -> &Path {
        &self.db
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// All package archives currently in the repository directory.
    pub fn package_files(&self) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.directory)
            .with_context(|| format!("reading repository directory {}", self.directory.display()))?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() && entry.file_name().to_string_lossy().ends_with(PACKAGE_SUFFIX) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

fn strip_db_suffix(file_name: &str) -> &str {
    for suffix in DB_SUFFIXES {
        if let Some(stripped) = file_name.strip_suffix(suffix) {
            return stripped;
        }
    }
    file_name
}

/// Recover the bare package name from a package archive filename by splitting
/// off the three trailing hyphen-separated fields (version, release, and
/// architecture plus extension).
///
/// Best effort: a package name that itself ends in version-like hyphenated
/// fields is ambiguous, and this will mis-split it.
pub fn package_name_from_filename(file_name: &str) -> Option<&str> {
    let mut fields = file_name.rsplitn(4, '-');
    let _arch_and_extension = fields.next()?;
    let _release = fields.next()?;
    let _version = fields.next()?;
    fields.next()
}

/// Read access to a repository database.
pub trait RepositoryReader {
    /// List packages in the database, either as bare names or as
    /// "name version" lines.
    fn packages(&self, repo: &Repo, with_versions: bool) -> Result<Vec<String>>;
}

/// Reader backed by `aur repo`.
pub struct AurRepoReader;

impl RepositoryReader for AurRepoReader {
    fn packages(&self, repo: &Repo, with_versions: bool) -> Result<Vec<String>> {
        let mut args = vec!["repo", "-d", repo.name(), "-l"];
        if !with_versions {
            args.push("-q");
        }
        let output = cmd("aur", args)
            .read()
            .context("listing repository packages with aur repo")?;
        Ok(output.lines().map(String::from).collect())
    }
}

/// Write access to a repository database.
pub trait RepositoryWriter {
    /// Add package files to the database. With no files this creates an
    /// empty database, or refreshes an existing one.
    fn add(&self, repo: &Repo, files: &[PathBuf]) -> Result<()>;

    /// Drop the database entries for the given package names.
    fn remove(&self, repo: &Repo, packages: &[String]) -> Result<()>;
}

/// Writer backed by `repo-add` and `repo-remove`, signing the database with
/// a fixed GPG key.
pub struct RepoDatabase {
    gpg_key: String,
}

impl RepoDatabase {
    pub fn new(gpg_key: String) -> RepoDatabase {
        RepoDatabase { gpg_key }
    }

    fn base_args(&self, repo: &Repo) -> Vec<OsString> {
        vec![
            "--sign".into(),
            "--key".into(),
            self.gpg_key.clone().into(),
            repo.db().into(),
        ]
    }
}

impl RepositoryWriter for RepoDatabase {
    fn add(&self, repo: &Repo, files: &[PathBuf]) -> Result<()> {
        let mut args = self.base_args(repo);
        args.extend(files.iter().map(OsString::from));
        cmd("repo-add", args)
            .run()
            .context("adding packages with repo-add")?;
        Ok(())
    }

    fn remove(&self, repo: &Repo, packages: &[String]) -> Result<()> {
        let mut args = self.base_args(repo);
        args.extend(packages.iter().map(OsString::from));
        cmd("repo-remove", args)
            .run()
            .context("removing packages with repo-remove")?;
        Ok(())
    }
}

/// Create the initial empty repository: parent directory, a btrfs subvolume
/// for the repository itself, ownership for the invoking user, and a signed
/// empty database.
pub fn create_repo(repo: &Repo, writer: &dyn RepositoryWriter) -> Result<()> {
    if repo.db().exists() {
        bail!("repository already exists at {}", repo.db().display());
    }
    let parent = repo
        .directory()
        .parent()
        .context("repository directory has no parent")?;
    cmd!("sudo", "install", "-m755", "-d", parent)
        .run()
        .context("creating the repository parent directory")?;
    cmd!("sudo", "btrfs", "subvolume", "create", repo.directory())
        .run()
        .context("creating the repository subvolume")?;
    let owner = format!("{}:{}", getuid(), getgid());
    cmd!("sudo", "chown", "-R", owner, repo.directory())
        .run()
        .context("taking ownership of the repository directory")?;
    writer.add(repo, &[])?;
    println!("Created empty repository at {}", repo.db().display());
    Ok(())
}
