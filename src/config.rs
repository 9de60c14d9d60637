use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::net::DEFAULT_MAX_SEARCH;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_MAX_LOG_LINES: usize = 5000;

/// User settings that get saved to TOML file
/// Missing fields fall back to defaults so old files keep loading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Folder pre-filled in the "Folder to serve" field
    pub folder: String,
    /// Preferred port; scanning starts here when it is busy
    pub port: u16,
    #[serde(rename = "bind_address")]
    bind_address_raw: String,
    pub max_port_search: u16,
    pub dark_mode: bool,
    pub auto_scroll: bool,
    pub copy_url_on_start: bool,
    pub max_log_lines: usize,
    pub log_level: String,

    #[serde(skip)]
    path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        let folder = dirs::home_dir()
            .and_then(|p| p.to_str().map(String::from))
            .unwrap_or_else(|| ".".to_string());

        Self {
            folder,
            port: DEFAULT_PORT,
            bind_address_raw: Ipv4Addr::UNSPECIFIED.to_string(),
            max_port_search: DEFAULT_MAX_SEARCH,
            dark_mode: false,
            auto_scroll: true,
            copy_url_on_start: true,
            max_log_lines: DEFAULT_MAX_LOG_LINES,
            log_level: "info".to_string(),
            path: None,
        }
    }
}

impl Settings {
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("quickserve");
        path.push("quickserve.toml");
        path
    }

    /// Load from `path` (or the default location), applying env var overrides.
    /// A missing or unreadable file is regenerated from defaults.
    pub fn load(path: Option<&Path>) -> Self {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);

        let mut settings = match Self::read_file(&path) {
            Some(stored) => stored,
            None => {
                let defaults = Self {
                    path: Some(path.clone()),
                    ..Self::default()
                };
                if let Err(e) = defaults.save() {
                    error!("Failed to save config: {e:?}");
                } else {
                    info!("Generated config file: {}", path.display());
                }
                defaults
            }
        };

        settings.apply_overrides(|var| env::var(var).ok());
        settings.sanitize();
        settings
    }

    /// Settings exactly as stored on disk, without any overrides
    fn read_file(path: &Path) -> Option<Self> {
        let contents = fs::read_to_string(path).ok()?;
        match toml::from_str::<Settings>(&contents) {
            Ok(mut settings) => {
                settings.path = Some(path.to_path_buf());
                Some(settings)
            }
            Err(e) => {
                error!("Failed to parse {}: {e}", path.display());
                None
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = self.path.clone().unwrap_or_else(Self::default_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(&path, contents).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Persist the values the GUI edits (folder, port, theme, auto-scroll).
    /// Everything else is written back as the file had it, so CLI and env
    /// overrides for this run never end up on disk.
    pub fn save_preferences(&self) -> Result<()> {
        let path = self.path.clone().unwrap_or_else(Self::default_path);
        let mut stored = Self::read_file(&path).unwrap_or_else(|| Self {
            path: Some(path.clone()),
            ..Self::default()
        });

        stored.folder.clone_from(&self.folder);
        stored.port = self.port;
        stored.dark_mode = self.dark_mode;
        stored.auto_scroll = self.auto_scroll;
        stored.save()
    }

    /// Bind address, falling back to all interfaces if the stored value is invalid
    pub fn bind_address(&self) -> IpAddr {
        self.bind_address_raw.parse().unwrap_or_else(|e| {
            error!("Invalid bind_address '{}': {e}, using 0.0.0.0", self.bind_address_raw);
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        })
    }

    pub fn set_bind_address(&mut self, addr: IpAddr) {
        self.bind_address_raw = addr.to_string();
    }

    /// Parsed log level, defaulting to INFO
    pub fn tracing_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }

    fn parse_num<T>(raw: &str, var: &str) -> Option<T>
    where
        T: std::str::FromStr + TryFrom<u64>,
        <T as std::str::FromStr>::Err: std::fmt::Debug,
        <T as TryFrom<u64>>::Error: std::fmt::Debug,
    {
        let s = raw.trim();
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            u64::from_str_radix(hex, 16)
                .map_err(|e| format!("{e:?}"))
                .and_then(|n| T::try_from(n).map_err(|e| format!("{e:?}")))
                .inspect_err(|e| error!("failed to parse '{var}' err={e}"))
                .ok()
        } else {
            s.parse::<T>()
                .inspect_err(|e| error!("failed to parse '{var}' err={e:?}"))
                .ok()
        }
    }

    /// Apply `QUICKSERVE_*` overrides from `lookup` (normally the process environment)
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(folder) = lookup("QUICKSERVE_FOLDER") {
            self.folder = folder;
        }
        if let Some(port) = lookup("QUICKSERVE_PORT").and_then(|s| Self::parse_num(&s, "QUICKSERVE_PORT")) {
            self.port = port;
        }
        if let Some(bind) = lookup("QUICKSERVE_BIND") {
            match bind.trim().parse::<IpAddr>() {
                Ok(addr) => self.set_bind_address(addr),
                Err(e) => error!("failed to parse 'QUICKSERVE_BIND' err={e:?}"),
            }
        }
        if let Some(level) = lookup("QUICKSERVE_LOG_LEVEL") {
            self.log_level = level.trim().to_lowercase();
        }
    }

    fn sanitize(&mut self) {
        if self.port == 0 {
            error!("port 0 is not allowed, using {DEFAULT_PORT}");
            self.port = DEFAULT_PORT;
        }
        if self.max_port_search == 0 {
            self.max_port_search = DEFAULT_MAX_SEARCH;
        }
        if self.max_log_lines == 0 {
            self.max_log_lines = DEFAULT_MAX_LOG_LINES;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let settings: Settings = toml::from_str("port = 9000\ndark_mode = true\n").unwrap();
        assert_eq!(settings.port, 9000);
        assert!(settings.dark_mode);
        assert!(settings.auto_scroll);
        assert_eq!(settings.max_log_lines, DEFAULT_MAX_LOG_LINES);
        assert_eq!(settings.bind_address(), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = Settings::default();
        settings.apply_overrides(lookup(&[
            ("QUICKSERVE_PORT", "0x1F90"),
            ("QUICKSERVE_BIND", "127.0.0.1"),
            ("QUICKSERVE_FOLDER", "/srv/share"),
            ("QUICKSERVE_LOG_LEVEL", "DEBUG"),
        ]));

        assert_eq!(settings.port, 8080);
        assert_eq!(settings.bind_address(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(settings.folder, "/srv/share");
        assert_eq!(settings.tracing_level(), tracing::Level::DEBUG);
    }

    #[test]
    fn test_invalid_overrides_are_ignored() {
        let mut settings = Settings::default();
        settings.apply_overrides(lookup(&[
            ("QUICKSERVE_PORT", "99999"),
            ("QUICKSERVE_BIND", "not-an-ip"),
        ]));

        assert_eq!(settings.port, DEFAULT_PORT);
        assert_eq!(settings.bind_address(), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }

    #[test]
    fn test_invalid_bind_address_falls_back() {
        let settings: Settings = toml::from_str("bind_address = \"localhost\"").unwrap();
        assert_eq!(settings.bind_address(), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }

    #[test]
    fn test_load_generates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("quickserve.toml");

        let settings = Settings::load(Some(&path));
        assert!(path.exists());

        let mut changed = settings.clone();
        changed.port = 8123;
        changed.dark_mode = true;
        changed.save().unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let reloaded: Settings = toml::from_str(&contents).unwrap();
        assert_eq!(reloaded.port, 8123);
        assert!(reloaded.dark_mode);
    }

    #[test]
    fn test_overrides_are_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quickserve.toml");
        fs::write(
            &path,
            "folder = \"/srv/share\"\nport = 8000\nbind_address = \"0.0.0.0\"\nlog_level = \"info\"\n",
        )
        .unwrap();

        let mut settings = Settings::read_file(&path).unwrap();
        settings.apply_overrides(lookup(&[
            ("QUICKSERVE_BIND", "127.0.0.1"),
            ("QUICKSERVE_LOG_LEVEL", "trace"),
        ]));
        // as if passed with --port
        settings.port = 9001;
        settings.dark_mode = true;
        settings.save_preferences().unwrap();

        let reloaded = Settings::read_file(&path).unwrap();
        assert_eq!(reloaded.bind_address(), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(reloaded.log_level, "info");
        assert_eq!(reloaded.folder, "/srv/share");
        assert_eq!(reloaded.port, 9001);
        assert!(reloaded.dark_mode);
    }

    #[test]
    fn test_generated_file_has_no_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quickserve.toml");

        let mut settings = Settings::load(Some(&path));
        settings.apply_overrides(lookup(&[("QUICKSERVE_BIND", "127.0.0.1")]));
        settings.auto_scroll = false;
        settings.save_preferences().unwrap();

        let reloaded = Settings::read_file(&path).unwrap();
        assert_eq!(reloaded.bind_address(), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert!(!reloaded.auto_scroll);
    }

    #[test]
    fn test_port_zero_is_sanitized() {
        let mut settings: Settings = toml::from_str("port = 0\nmax_log_lines = 0").unwrap();
        settings.sanitize();
        assert_eq!(settings.port, DEFAULT_PORT);
        assert_eq!(settings.max_log_lines, DEFAULT_MAX_LOG_LINES);
    }
}
