use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub version: u32,
    pub database: Database,
    #[serde(default)]
    pub library_source: LibrarySource,
    pub http: HttpConfig,
    #[serde(default)]
    pub public: PublicEndpoint,
    #[serde(default)]
    pub playback: Playback,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Config> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&contents).with_context(|| "Failed to parse config TOML")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub bind_addr: String,
    pub port: u16,
    /// when set, admin routes require this value in the `X-Admin-Token` header
    #[serde(default)]
    pub admin_token: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Database {
    pub in_memory: bool,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LibrarySource {
    #[serde(default)]
    pub roots: Vec<PathBuf>,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default)]
    pub ignored_dirs: Vec<PathBuf>,
    /// artist recorded for imported files
    #[serde(default = "default_artist")]
    pub default_artist: String,
}

fn default_artist() -> String {
    "Unknown Artist".to_string()
}

impl Default for LibrarySource {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            follow_symlinks: false,
            ignored_dirs: Vec::new(),
            default_artist: default_artist(),
        }
    }
}

/// Base url used for links shared outside the application
#[derive(Debug, Deserialize, Clone)]
pub struct PublicEndpoint {
    pub base_url: String,
}

impl Default for PublicEndpoint {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Playback {
    /// use the single-statement play count increment when the database supports it
    #[serde(default = "enabled")]
    pub atomic_play_count: bool,
}

fn enabled() -> bool {
    true
}

impl Default for Playback {
    fn default() -> Self {
        Self {
            atomic_play_count: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_config_toml() -> anyhow::Result<()> {
        let toml_str = r#"
version = 1

[database]
in_memory = true

[library_source]
roots = ["/srv/music"]
follow_symlinks = true
ignored_dirs = ['/srv/music/demos']
default_artist = "Atilla"

[http]
bind_addr = "127.0.0.1"
port = 8080
admin_token = "secret"

[public]
base_url = "https://music.example"

[playback]
atomic_play_count = false
"#;

        let cfg: Config = toml::from_str(toml_str)?;

        assert_eq!(cfg.version, 1);
        assert!(cfg.database.in_memory);

        assert_eq!(cfg.library_source.roots, vec![PathBuf::from("/srv/music")]);
        assert!(cfg.library_source.follow_symlinks);
        assert_eq!(cfg.library_source.default_artist, "Atilla");

        assert_eq!(cfg.http.admin_token.as_deref(), Some("secret"));
        assert_eq!(cfg.public.base_url, "https://music.example");
        assert!(!cfg.playback.atomic_play_count);

        Ok(())
    }

    #[test]
    fn test_optional_sections_default() -> anyhow::Result<()> {
        let toml_str = r#"
version = 1

[database]
in_memory = false
path = "/tmp/encore.db"

[http]
bind_addr = "0.0.0.0"
port = 9000
"#;

        let cfg: Config = toml::from_str(toml_str)?;

        assert!(!cfg.database.in_memory);
        assert_eq!(cfg.database.path, Some(PathBuf::from("/tmp/encore.db")));

        assert!(cfg.library_source.roots.is_empty());
        assert_eq!(cfg.library_source.default_artist, "Unknown Artist");
        assert_eq!(cfg.http.admin_token, None);
        assert!(cfg.playback.atomic_play_count);

        Ok(())
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = Config::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }
}
