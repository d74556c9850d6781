#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use blossom_core::CheckConfig;
use miette::Diagnostic;
use thiserror::Error;

pub const CONFIG_FILE: &str = "blossom.toml";

#[derive(Debug, Error, Diagnostic)]
#[error("config error: {message}")]
#[diagnostic(code(blossom::config))]
pub struct ConfigError {
    pub message: String,
}

/// Contents of `blossom.toml`.
///
/// ```toml
/// [check]
/// max_specializations = 100000
/// jobs = 4
///
/// [log]
/// level = "debug"
/// file = "logs/blossom.log"
/// ```
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
pub struct BlossomConfig {
    #[serde(default)]
    pub check: CheckConfig,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
pub struct LogConfig {
    /// Default filter directive when `BLOSSOM_LOG` is unset (e.g. "info", "blossom_core=debug").
    #[serde(default)]
    pub level: Option<String>,

    /// Write logs to this file instead of stderr.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: default_cache_enabled(),
            path: None,
        }
    }
}

fn default_cache_enabled() -> bool {
    true
}

/// A loaded config plus where it came from.
#[derive(Clone, Debug, Default)]
pub struct ResolvedConfig {
    pub path: Option<PathBuf>,
    /// Directory relative paths in the config resolve against.
    pub root: PathBuf,
    pub config: BlossomConfig,
}

impl ResolvedConfig {
    pub fn log_file(&self) -> Option<PathBuf> {
        self.config
            .log
            .file
            .as_ref()
            .map(|f| resolve_path(&self.root, f))
    }

    pub fn cache_file(&self) -> PathBuf {
        match &self.config.cache.path {
            Some(p) => resolve_path(&self.root, p),
            None => self.root.join(".blossom-cache.json"),
        }
    }
}

/// Walk up from `start` looking for `blossom.toml`.
pub fn find_config(start: &Path) -> Option<PathBuf> {
    let mut cur = if start.is_file() {
        start.parent()?.to_path_buf()
    } else {
        start.to_path_buf()
    };

    loop {
        let candidate = cur.join(CONFIG_FILE);
        if candidate.exists() {
            return Some(candidate);
        }
        match cur.parent() {
            Some(p) => cur = p.to_path_buf(),
            None => return None,
        }
    }
}

pub fn parse_config(raw: &str, origin: &Path) -> Result<BlossomConfig, ConfigError> {
    toml::from_str(raw).map_err(|e| ConfigError {
        message: format!("failed to parse {}: {e}", origin.display()),
    })
}

/// Load `explicit` if given, else the nearest `blossom.toml` above `start`, else defaults.
pub fn load_config(explicit: Option<&Path>, start: &Path) -> Result<ResolvedConfig, ConfigError> {
    let found = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => find_config(start),
    };
    let Some(path) = found else {
        let root = if start.is_file() {
            start.parent().unwrap_or_else(|| Path::new(".")).to_path_buf()
        } else {
            start.to_path_buf()
        };
        return Ok(ResolvedConfig {
            path: None,
            root,
            config: BlossomConfig::default(),
        });
    };

    let raw = fs::read_to_string(&path).map_err(|e| ConfigError {
        message: format!("failed to read {}: {e}", path.display()),
    })?;
    let config = parse_config(&raw, &path)?;
    let root = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok(ResolvedConfig {
        path: Some(path),
        root,
        config,
    })
}

fn resolve_path(base: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_fill_in_defaults() {
        let cfg = parse_config(
            "[check]\njobs = 3\n\n[log]\nlevel = \"debug\"\n",
            Path::new("blossom.toml"),
        )
        .expect("parse");
        assert_eq!(cfg.check.jobs, 3);
        assert_eq!(cfg.check.max_specializations, CheckConfig::default().max_specializations);
        assert_eq!(cfg.log.level.as_deref(), Some("debug"));
        assert!(cfg.cache.enabled);
    }

    #[test]
    fn empty_file_is_the_default_config() {
        let cfg = parse_config("", Path::new("blossom.toml")).expect("parse");
        assert_eq!(cfg, BlossomConfig::default());
    }

    #[test]
    fn bad_toml_names_the_file() {
        let err = parse_config("[check\n", Path::new("conf/blossom.toml")).unwrap_err();
        assert!(err.message.contains("conf/blossom.toml"), "{}", err.message);
    }

    #[test]
    fn relative_paths_resolve_against_the_config_directory() {
        let resolved = ResolvedConfig {
            path: Some(PathBuf::from("/proj/blossom.toml")),
            root: PathBuf::from("/proj"),
            config: BlossomConfig {
                log: LogConfig {
                    level: None,
                    file: Some(PathBuf::from("logs/blossom.log")),
                },
                ..BlossomConfig::default()
            },
        };
        assert_eq!(resolved.log_file(), Some(PathBuf::from("/proj/logs/blossom.log")));
        assert_eq!(resolved.cache_file(), PathBuf::from("/proj/.blossom-cache.json"));
    }
}
