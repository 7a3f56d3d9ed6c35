use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Extra packages for hosts whose hostname matches a pattern.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HostRule {
    /// Regex searched against the hostname
    pub pattern: String,
    pub packages: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BackupConfig {
    /// Restic repository, e.g. "rclone:remote:restic-backups"
    pub repository: String,
    /// Tag applied to snapshots of the package repository
    pub tag: String,
    /// How many snapshots to keep when pruning
    #[serde(default = "default_keep_last")]
    pub keep_last: u32,
}

fn default_keep_last() -> u32 {
    3
}

fn default_makepkg_conf() -> PathBuf {
    PathBuf::from("/usr/share/devtools/makepkg.conf.d/x86_64.conf")
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    /// Path to the repository database archive,
    /// e.g. /srv/pkgrepo/aur/aur.db.tar.zst
    pub database: PathBuf,
    /// Key ID used to sign packages and the repository database
    pub gpg_key: String,
    /// Value exported as PACKAGER while building packages
    #[serde(default)]
    pub packager: Option<String>,
    #[serde(default = "default_makepkg_conf")]
    pub makepkg_conf: PathBuf,
    /// AUR packages to build on every host
    #[serde(default)]
    pub packages: Vec<String>,
    /// Packages to purge from the repository
    #[serde(default)]
    pub remove: Vec<String>,
    /// Host-specific extra packages; the first matching rule wins
    #[serde(default)]
    pub host_packages: Vec<HostRule>,
    #[serde(default)]
    pub backup: Option<BackupConfig>,
}

fn default_config_path() -> Result<PathBuf> {
    let config_dir =
        dirs::config_dir().context("could not determine the user configuration directory")?;
    Ok(config_dir.join("pkgrepo").join("pkgrepo.toml"))
}

impl Config {
    /// Load the config from `path`, or from the default location if none is
    /// given. A missing or malformed file is a hard error; there is no
    /// sensible default package set to fall back to.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => default_config_path()?,
        };
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config.expand_paths())
    }

    fn expand_paths(mut self) -> Config {
        self.database = expand_tilde(&self.database);
        self.makepkg_conf = expand_tilde(&self.makepkg_conf);
        self
    }

    /// Desired packages for `hostname`: the base set plus the extra packages
    /// of the first host rule whose pattern matches.
    pub fn desired_packages(&self, hostname: &str) -> Result<Vec<String>> {
        let mut packages = self.packages.clone();
        for rule in &self.host_packages {
            let pattern = Regex::new(&rule.pattern)
                .with_context(|| format!("invalid host pattern {:?}", rule.pattern))?;
            if pattern.is_match(hostname) {
                packages.extend(rule.packages.iter().cloned());
                break;
            }
        }
        Ok(packages)
    }

    pub fn backup_config(&self) -> Result<&BackupConfig> {
        self.backup
            .as_ref()
            .context("no [backup] section in the configuration")
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) => PathBuf::from(shellexpand::tilde(s).into_owned()),
        None => path.to_path_buf(),
    }
}

/// The hostname used to select host-specific packages.
pub fn hostname() -> Result<String> {
    let hostname = nix::unistd::gethostname().context("querying hostname")?;
    Ok(hostname.to_string_lossy().into_owned())
}
