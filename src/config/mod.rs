//! Configuration management for `lb`.
//!
//! Configuration sources and precedence (highest wins):
//! 1. CLI flags
//! 2. Environment variables (`LINEAR_API_KEY`, `LB_TEAM_KEY`, `LB_TEAM_ID`,
//!    `LB_REPO_NAME`)
//! 3. Per-repo config (`<repo>/.lb/config.jsonc`)
//! 4. Global config (`~/.config/lb/config.jsonc`)
//! 5. Defaults
//!
//! Both config files are JSONC; a sibling `.json` file is the fallback.

use crate::error::{LbError, Result};
use crate::util::jsonc;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Freshness window for `ensure_fresh` when not configured.
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 120;

/// Which Remote mechanism scopes issues to this repo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RepoScope {
    #[default]
    Label,
    Project,
    Both,
}

impl RepoScope {
    #[must_use]
    pub const fn uses_label(self) -> bool {
        matches!(self, Self::Label | Self::Both)
    }

    #[must_use]
    pub const fn uses_project(self) -> bool {
        matches!(self, Self::Project | Self::Both)
    }
}

impl fmt::Display for RepoScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Label => "label",
            Self::Project => "project",
            Self::Both => "both",
        };
        write!(f, "{s}")
    }
}

impl FromStr for RepoScope {
    type Err = LbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "label" => Ok(Self::Label),
            "project" => Ok(Self::Project),
            "both" => Ok(Self::Both),
            other => Err(LbError::Config(format!(
                "invalid repo_scope '{other}' (use label, project, or both)"
            ))),
        }
    }
}

/// One config file's worth of options; every field optional so layers merge.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConfigFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_scope: Option<RepoScope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_issue_types: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_ttl_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_only: Option<bool>,
}

impl ConfigFile {
    /// Merge `higher` over `self`, field by field.
    fn overlay(&mut self, higher: Self) {
        macro_rules! take {
            ($field:ident) => {
                if higher.$field.is_some() {
                    self.$field = higher.$field;
                }
            };
        }
        take!(api_key);
        take!(team_key);
        take!(team_id);
        take!(repo_name);
        take!(repo_scope);
        take!(use_issue_types);
        take!(cache_ttl_seconds);
        take!(local_only);
    }

    /// Read the environment-variable layer.
    #[must_use]
    pub fn from_env() -> Self {
        let get = |name: &str| env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            api_key: get("LINEAR_API_KEY"),
            team_key: get("LB_TEAM_KEY"),
            team_id: get("LB_TEAM_ID"),
            repo_name: get("LB_REPO_NAME"),
            ..Self::default()
        }
    }
}

/// CLI flag layer (highest precedence).
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub team_key: Option<String>,
}

impl CliOverrides {
    fn into_layer(self) -> ConfigFile {
        ConfigFile {
            team_key: self.team_key,
            ..ConfigFile::default()
        }
    }
}

/// Fully resolved configuration for one invocation.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub team_key: Option<String>,
    pub team_id: Option<String>,
    pub repo_name: String,
    pub repo_scope: RepoScope,
    pub use_issue_types: bool,
    pub cache_ttl_seconds: u64,
    pub local_only: bool,
}

impl Config {
    /// The credential, or the fatal Auth-class error telling the user to
    /// run `lb auth`.
    ///
    /// # Errors
    ///
    /// Returns `LbError::NoApiKey` when no credential is configured.
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or(LbError::NoApiKey)
    }
}

/// Filesystem layout of the per-repo state directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LbPaths {
    pub repo_root: PathBuf,
    pub lb_dir: PathBuf,
}

impl LbPaths {
    #[must_use]
    pub fn new(repo_root: PathBuf) -> Self {
        let lb_dir = repo_root.join(".lb");
        Self { repo_root, lb_dir }
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.lb_dir.join("cache.db")
    }

    #[must_use]
    pub fn pid_path(&self) -> PathBuf {
        self.lb_dir.join("sync.pid")
    }

    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.lb_dir.join("sync.log")
    }

    #[must_use]
    pub fn jsonl_path(&self) -> PathBuf {
        self.lb_dir.join("issues.jsonl")
    }

    #[must_use]
    pub fn jsonl_tmp_path(&self) -> PathBuf {
        self.lb_dir.join("issues.jsonl.tmp")
    }

    #[must_use]
    pub fn export_stamp_path(&self) -> PathBuf {
        self.lb_dir.join("export.pending")
    }

    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.lb_dir.join("config.jsonc")
    }

    #[must_use]
    pub fn import_map_path(&self) -> PathBuf {
        self.lb_dir.join("import-map.jsonl")
    }

    /// Create `.lb/` if missing.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory cannot be created.
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.lb_dir)?;
        Ok(())
    }
}

/// Discover the repo root: walk up from `start` looking for a `.git`
/// marker; if none is found the starting directory itself is used.
#[must_use]
pub fn discover_repo_root(start: &Path) -> PathBuf {
    let mut current = start.to_path_buf();
    loop {
        if current.join(".git").exists() {
            return current;
        }
        if !current.pop() {
            return start.to_path_buf();
        }
    }
}

/// Discover paths from the process working directory.
///
/// # Errors
///
/// Returns an error when the CWD cannot be read.
pub fn discover_paths() -> Result<LbPaths> {
    let cwd = env::current_dir()?;
    Ok(LbPaths::new(discover_repo_root(&cwd)))
}

/// Path of the global config file (`~/.config/lb/config.jsonc`).
#[must_use]
pub fn global_config_path() -> Option<PathBuf> {
    let home = env::var_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("lb")
            .join("config.jsonc"),
    )
}

/// Load one JSONC config file, falling back to a sibling `.json` file.
///
/// A missing file yields the empty layer; an unreadable or unparseable file
/// is a configuration error.
///
/// # Errors
///
/// Returns `LbError::Config` on read or parse failure.
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let candidate = if path.exists() {
        Some(path.to_path_buf())
    } else {
        let fallback = path.with_extension("json");
        fallback.exists().then_some(fallback)
    };

    let Some(file) = candidate else {
        return Ok(ConfigFile::default());
    };

    let contents = fs::read_to_string(&file)
        .map_err(|e| LbError::Config(format!("cannot read {}: {e}", file.display())))?;
    jsonc::from_str(&contents)
        .map_err(|e| LbError::Config(format!("cannot parse {}: {e}", file.display())))
}

/// Pure layered merge, exposed for tests.
#[must_use]
pub fn merge_layers(
    global: ConfigFile,
    repo: ConfigFile,
    env_layer: ConfigFile,
    cli: CliOverrides,
    paths: &LbPaths,
) -> Config {
    let mut merged = ConfigFile::default();
    merged.overlay(global);
    merged.overlay(repo);
    merged.overlay(env_layer);
    merged.overlay(cli.into_layer());

    let repo_name = merged
        .repo_name
        .unwrap_or_else(|| default_repo_name(&paths.repo_root));

    Config {
        api_key: merged.api_key,
        team_key: merged.team_key,
        team_id: merged.team_id,
        repo_name,
        repo_scope: merged.repo_scope.unwrap_or_default(),
        use_issue_types: merged.use_issue_types.unwrap_or(false),
        cache_ttl_seconds: merged.cache_ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECONDS),
        local_only: merged.local_only.unwrap_or(false),
    }
}

/// Load the resolved configuration for this repo.
///
/// # Errors
///
/// Returns an error when a config file exists but cannot be parsed.
pub fn load(paths: &LbPaths, cli: CliOverrides) -> Result<Config> {
    let global = match global_config_path() {
        Some(path) => load_config_file(&path)?,
        None => ConfigFile::default(),
    };
    let repo = load_config_file(&paths.config_path())?;
    Ok(merge_layers(global, repo, ConfigFile::from_env(), cli, paths))
}

/// Repo name heuristic: first git remote URL tail, then directory basename.
#[must_use]
pub fn default_repo_name(repo_root: &Path) -> String {
    if let Some(name) = git_remote_tail(repo_root) {
        return name;
    }
    repo_root
        .file_name()
        .map_or_else(|| "repo".to_string(), |n| n.to_string_lossy().into_owned())
}

/// Pull the tail of the first `url = ...` entry in `.git/config`.
fn git_remote_tail(repo_root: &Path) -> Option<String> {
    let contents = fs::read_to_string(repo_root.join(".git").join("config")).ok()?;
    for line in contents.lines() {
        let line = line.trim();
        if let Some(url) = line.strip_prefix("url = ").or_else(|| line.strip_prefix("url=")) {
            let tail = url
                .trim_end_matches('/')
                .rsplit(['/', ':'])
                .next()?
                .trim_end_matches(".git");
            if !tail.is_empty() {
                return Some(tail.to_string());
            }
        }
    }
    None
}

/// Write the global config file with owner-only permissions.
///
/// # Errors
///
/// Returns an error when the file cannot be written.
pub fn save_global_config(config: &ConfigFile) -> Result<()> {
    let path = global_config_path()
        .ok_or_else(|| LbError::Config("cannot determine home directory".to_string()))?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = serde_json::to_string_pretty(config)?;
    fs::write(&path, body + "\n")?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

/// Write (or overwrite) the per-repo config file.
///
/// # Errors
///
/// Returns an error when the file cannot be written.
pub fn save_repo_config(paths: &LbPaths, config: &ConfigFile) -> Result<()> {
    paths.ensure_dir()?;
    let body = serde_json::to_string_pretty(config)?;
    fs::write(paths.config_path(), body + "\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths_for(root: &Path) -> LbPaths {
        LbPaths::new(root.to_path_buf())
    }

    #[test]
    fn test_merge_precedence() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = paths_for(tmp.path());

        let global = ConfigFile {
            api_key: Some("global-key".to_string()),
            team_key: Some("GLB".to_string()),
            cache_ttl_seconds: Some(60),
            ..ConfigFile::default()
        };
        let repo = ConfigFile {
            team_key: Some("RPO".to_string()),
            repo_name: Some("myrepo".to_string()),
            ..ConfigFile::default()
        };
        let env_layer = ConfigFile {
            api_key: Some("env-key".to_string()),
            ..ConfigFile::default()
        };
        let cli = CliOverrides {
            team_key: Some("CLI".to_string()),
        };

        let config = merge_layers(global, repo, env_layer, cli, &paths);
        assert_eq!(config.api_key.as_deref(), Some("env-key"));
        assert_eq!(config.team_key.as_deref(), Some("CLI"));
        assert_eq!(config.repo_name, "myrepo");
        assert_eq!(config.cache_ttl_seconds, 60);
        assert!(!config.local_only);
        assert_eq!(config.repo_scope, RepoScope::Label);
    }

    #[test]
    fn test_defaults_when_all_layers_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = paths_for(tmp.path());
        let config = merge_layers(
            ConfigFile::default(),
            ConfigFile::default(),
            ConfigFile::default(),
            CliOverrides::default(),
            &paths,
        );
        assert_eq!(config.cache_ttl_seconds, DEFAULT_CACHE_TTL_SECONDS);
        assert!(config.api_key.is_none());
        // Falls back to the directory basename.
        assert_eq!(
            config.repo_name,
            tmp.path().file_name().unwrap().to_string_lossy()
        );
    }

    #[test]
    fn test_load_config_file_jsonc() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.jsonc");
        std::fs::write(
            &path,
            "// lb config\n{\n  \"team_key\": \"ENG\", // team\n  \"local_only\": true\n}\n",
        )
        .unwrap();
        let layer = load_config_file(&path).unwrap();
        assert_eq!(layer.team_key.as_deref(), Some("ENG"));
        assert_eq!(layer.local_only, Some(true));
    }

    #[test]
    fn test_load_config_file_json_fallback() {
        let tmp = tempfile::tempdir().unwrap();
        let jsonc_path = tmp.path().join("config.jsonc");
        std::fs::write(
            tmp.path().join("config.json"),
            "{\"repo_name\": \"fallback\"}",
        )
        .unwrap();
        let layer = load_config_file(&jsonc_path).unwrap();
        assert_eq!(layer.repo_name.as_deref(), Some("fallback"));
    }

    #[test]
    fn test_load_config_file_missing_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let layer = load_config_file(&tmp.path().join("config.jsonc")).unwrap();
        assert_eq!(layer, ConfigFile::default());
    }

    #[test]
    fn test_discover_repo_root_walks_to_git_marker() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join(".git")).unwrap();
        let nested = tmp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(discover_repo_root(&nested), tmp.path());
    }

    #[test]
    fn test_discover_repo_root_without_git_uses_start() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("plain");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(discover_repo_root(&nested), nested);
    }

    #[test]
    fn test_git_remote_tail() {
        let tmp = tempfile::tempdir().unwrap();
        let git_dir = tmp.path().join(".git");
        std::fs::create_dir_all(&git_dir).unwrap();
        std::fs::write(
            git_dir.join("config"),
            "[remote \"origin\"]\n\turl = git@github.com:acme/widgets.git\n",
        )
        .unwrap();
        assert_eq!(default_repo_name(tmp.path()), "widgets");
    }

    #[test]
    fn test_repo_scope_parse() {
        assert_eq!("label".parse::<RepoScope>().unwrap(), RepoScope::Label);
        assert_eq!("both".parse::<RepoScope>().unwrap(), RepoScope::Both);
        assert!("repo".parse::<RepoScope>().is_err());
        assert!(RepoScope::Both.uses_label());
        assert!(RepoScope::Both.uses_project());
        assert!(!RepoScope::Label.uses_project());
    }
}
