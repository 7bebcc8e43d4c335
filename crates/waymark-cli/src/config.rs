//! Configuration file management for waymark.
//!
//! A TOML file at `$XDG_CONFIG_HOME/waymark/config.toml` (falling back to
//! `~/.config/waymark/config.toml`) and a resolution chain:
//! CLI flag > env var > config file > default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use waymark_core::conversation::OrchestratorConfig;
use waymark_core::generation::HttpGenerationClient;
use waymark_db::config::DbConfig;

pub const DEFAULT_GENERATION_URL: &str = "http://localhost:8000";
pub const DATABASE_URL_ENV: &str = "WAYMARK_DATABASE_URL";
pub const GENERATION_URL_ENV: &str = "WAYMARK_GENERATION_URL";
pub const DB_MAX_CONNECTIONS_ENV: &str = "WAYMARK_DB_MAX_CONNECTIONS";

/// Range the Generation Service accepts for `num_topics`.
const NUM_TOPICS_RANGE: std::ops::RangeInclusive<u32> = 1..=20;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    #[serde(default)]
    pub generation: GenerationSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSection {
    pub base_url: String,
    pub generate_timeout_secs: u64,
    pub chat_timeout_secs: u64,
    pub cooldown_secs: u64,
    pub num_topics: u32,
}

impl Default for GenerationSection {
    fn default() -> Self {
        let defaults = OrchestratorConfig::default();
        Self {
            base_url: DEFAULT_GENERATION_URL.to_owned(),
            generate_timeout_secs: defaults.generate_timeout.as_secs(),
            chat_timeout_secs: defaults.chat_timeout.as_secs(),
            cooldown_secs: defaults.cooldown.as_secs(),
            num_topics: defaults.num_topics.unwrap_or(5),
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the waymark config directory. Always XDG layout, also on macOS.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("waymark");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("waymark")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load the config file at `path`. A missing file is `Ok(None)`; a file
/// that exists but does not parse is an error.
pub fn load_config_from(path: &Path) -> Result<Option<ConfigFile>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("failed to read config file at {}", path.display()));
        }
    };
    let config = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(Some(config))
}

/// Write the config file, creating parent dirs. The file is made
/// owner-only on Unix since the database URL may carry a password.
pub fn save_config_to(path: &Path, config: &ConfigFile) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug, Clone)]
pub struct WaymarkConfig {
    pub db_config: DbConfig,
    pub generation_url: String,
    pub orchestrator: OrchestratorConfig,
}

impl WaymarkConfig {
    /// Resolve from the process environment and the default config file.
    pub fn resolve(cli_db_url: Option<&str>, cli_generation_url: Option<&str>) -> Result<Self> {
        let file = load_config_from(&config_path())?;
        Self::resolve_with(cli_db_url, cli_generation_url, |key| std::env::var(key).ok(), file)
    }

    /// Resolution with the environment and file injected.
    ///
    /// - DB URL: flag > `WAYMARK_DATABASE_URL` > `database.url` > `DbConfig::DEFAULT_URL`
    /// - Generation URL: flag > `WAYMARK_GENERATION_URL` > `generation.base_url` > `DEFAULT_GENERATION_URL`
    /// - Pool size: `WAYMARK_DB_MAX_CONNECTIONS` > `DbConfig::DEFAULT_MAX_CONNECTIONS`
    /// - Timeouts, cooldown and `num_topics`: file > default
    pub fn resolve_with(
        cli_db_url: Option<&str>,
        cli_generation_url: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
        file: Option<ConfigFile>,
    ) -> Result<Self> {
        let db_url = cli_db_url
            .map(str::to_owned)
            .or_else(|| env(DATABASE_URL_ENV))
            .or_else(|| file.as_ref().map(|f| f.database.url.clone()))
            .unwrap_or_else(|| DbConfig::DEFAULT_URL.to_owned());
        let max_connections = match env(DB_MAX_CONNECTIONS_ENV) {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .with_context(|| format!("{DB_MAX_CONNECTIONS_ENV} must be a number, got {raw:?}"))?,
            None => DbConfig::DEFAULT_MAX_CONNECTIONS,
        };

        let generation = file.map(|f| f.generation).unwrap_or_default();
        let generation_url = cli_generation_url
            .map(str::to_owned)
            .or_else(|| env(GENERATION_URL_ENV))
            .unwrap_or_else(|| generation.base_url.clone());

        if !NUM_TOPICS_RANGE.contains(&generation.num_topics) {
            bail!(
                "generation.num_topics must be between {} and {}, got {}",
                NUM_TOPICS_RANGE.start(),
                NUM_TOPICS_RANGE.end(),
                generation.num_topics
            );
        }
        if generation.generate_timeout_secs == 0 || generation.chat_timeout_secs == 0 {
            bail!("generation timeouts must be at least one second");
        }

        Ok(Self {
            db_config: DbConfig::new(db_url).with_max_connections(max_connections),
            generation_url,
            orchestrator: OrchestratorConfig {
                generate_timeout: Duration::from_secs(generation.generate_timeout_secs),
                chat_timeout: Duration::from_secs(generation.chat_timeout_secs),
                cooldown: Duration::from_secs(generation.cooldown_secs),
                num_topics: Some(generation.num_topics),
            },
        })
    }

    /// HTTP client for the configured Generation Service, with the
    /// configured timeouts.
    pub fn generation_client(&self) -> Result<HttpGenerationClient> {
        let client = HttpGenerationClient::new(&self.generation_url)
            .context("failed to create generation client")?;
        Ok(client.with_timeouts(
            self.orchestrator.generate_timeout,
            self.orchestrator.chat_timeout,
        ))
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn file(db_url: &str) -> ConfigFile {
        ConfigFile {
            database: DatabaseSection {
                url: db_url.to_owned(),
            },
            generation: GenerationSection {
                base_url: "http://rag.file:8000".to_owned(),
                generate_timeout_secs: 120,
                chat_timeout_secs: 20,
                cooldown_secs: 1,
                num_topics: 8,
            },
        }
    }

    #[test]
    fn save_and_load_config_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("waymark").join("config.toml");
        let original = file("postgresql://testhost:5432/testdb");

        save_config_to(&path, &original).unwrap();
        let loaded = load_config_from(&path).unwrap().unwrap();
        assert_eq!(loaded, original);
    }

    #[cfg(unix)]
    #[test]
    fn save_config_sets_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        save_config_to(&path, &file("postgresql://x/y")).unwrap();

        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn missing_file_is_none_and_bad_file_is_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        assert!(load_config_from(&path).unwrap().is_none());

        std::fs::write(&path, "database = 42").unwrap();
        let err = load_config_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse config file"));
    }

    #[test]
    fn generation_section_is_optional() {
        let parsed: ConfigFile =
            toml::from_str("[database]\nurl = \"postgresql://h/db\"\n").unwrap();
        assert_eq!(parsed.generation, GenerationSection::default());
        assert_eq!(parsed.generation.base_url, DEFAULT_GENERATION_URL);
        assert_eq!(parsed.generation.generate_timeout_secs, 90);
    }

    #[test]
    fn cli_flag_overrides_all() {
        let env = env_from(&[
            (DATABASE_URL_ENV, "postgresql://env:5432/envdb"),
            (GENERATION_URL_ENV, "http://rag.env:8000"),
        ]);
        let cfg = WaymarkConfig::resolve_with(
            Some("postgresql://cli:5432/clidb"),
            Some("http://rag.cli:8000"),
            env,
            Some(file("postgresql://file:5432/filedb")),
        )
        .unwrap();
        assert_eq!(cfg.db_config.database_url, "postgresql://cli:5432/clidb");
        assert_eq!(cfg.generation_url, "http://rag.cli:8000");
    }

    #[test]
    fn env_overrides_config_file() {
        let env = env_from(&[
            (DATABASE_URL_ENV, "postgresql://env:5432/envdb"),
            (GENERATION_URL_ENV, "http://rag.env:8000"),
        ]);
        let cfg = WaymarkConfig::resolve_with(
            None,
            None,
            env,
            Some(file("postgresql://file:5432/filedb")),
        )
        .unwrap();
        assert_eq!(cfg.db_config.database_url, "postgresql://env:5432/envdb");
        assert_eq!(cfg.generation_url, "http://rag.env:8000");
        // Tunables only come from the file.
        assert_eq!(cfg.orchestrator.generate_timeout, Duration::from_secs(120));
        assert_eq!(cfg.orchestrator.num_topics, Some(8));
    }

    #[test]
    fn config_file_overrides_defaults() {
        let cfg = WaymarkConfig::resolve_with(
            None,
            None,
            env_from(&[]),
            Some(file("postgresql://file:5432/filedb")),
        )
        .unwrap();
        assert_eq!(cfg.db_config.database_url, "postgresql://file:5432/filedb");
        assert_eq!(cfg.generation_url, "http://rag.file:8000");
        assert_eq!(cfg.orchestrator.chat_timeout, Duration::from_secs(20));
        assert_eq!(cfg.orchestrator.cooldown, Duration::from_secs(1));
    }

    #[test]
    fn defaults_when_nothing_set() {
        let cfg = WaymarkConfig::resolve_with(None, None, env_from(&[]), None).unwrap();
        assert_eq!(cfg.db_config.database_url, DbConfig::DEFAULT_URL);
        assert_eq!(cfg.generation_url, DEFAULT_GENERATION_URL);
        assert_eq!(cfg.orchestrator.cooldown, Duration::from_secs(3));
        assert_eq!(cfg.orchestrator.num_topics, Some(5));
    }

    #[test]
    fn pool_size_comes_from_env() {
        let env = env_from(&[(DB_MAX_CONNECTIONS_ENV, "24")]);
        let cfg = WaymarkConfig::resolve_with(None, None, env, None).unwrap();
        assert_eq!(cfg.db_config.max_connections, 24);

        let env = env_from(&[(DB_MAX_CONNECTIONS_ENV, "lots")]);
        assert!(WaymarkConfig::resolve_with(None, None, env, None).is_err());
    }

    #[test]
    fn num_topics_out_of_range_is_rejected() {
        let mut f = file("postgresql://file/db");
        f.generation.num_topics = 50;
        let err = WaymarkConfig::resolve_with(None, None, env_from(&[]), Some(f)).unwrap_err();
        assert!(err.to_string().contains("num_topics"));
    }

    #[test]
    fn generation_client_uses_resolved_url() {
        let cfg = WaymarkConfig::resolve_with(None, Some("http://rag:9000/"), env_from(&[]), None)
            .unwrap();
        assert_eq!(cfg.generation_client().unwrap().base_url(), "http://rag:9000");
    }

    #[test]
    fn config_path_honors_xdg() {
        let _lock = crate::test_util::lock_env();
        let tmp = tempfile::TempDir::new().unwrap();
        let orig_xdg = std::env::var("XDG_CONFIG_HOME").ok();
        unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };

        let path = config_path();

        match orig_xdg {
            Some(x) => unsafe { std::env::set_var("XDG_CONFIG_HOME", x) },
            None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
        }
        assert_eq!(path, tmp.path().join("waymark").join("config.toml"));
    }
}
