//! Client configuration.
//!
//! Stored as TOML at `$RHFS_CONFIG`, or `~/.config/rhfs/client.toml` when
//! the variable is unset.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rhfs_data_channel::{ClientOptions, DEFAULT_PORT};
use rhfs_protocol::{AuthContext, MAX_PAYLOAD_LEN};
use rhfs_remote_fs::DEFAULT_WRITE_BUFFER;
use rhfs_transfer::DEFAULT_BLOCK_SIZE;
use serde::{Deserialize, Serialize};

/// Environment variable overriding the configuration file location.
pub const CONFIG_ENV: &str = "RHFS_CONFIG";

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Data service host.
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Username sent with every call (`$USER` by default).
    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default)]
    pub credential: String,

    /// Upper bound for one remote call, in seconds. Must be non-zero.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Remote write buffer capacity in bytes; at most one frame payload.
    #[serde(default = "default_write_buffer_size")]
    pub write_buffer_size: usize,

    /// Local read block size for uploads, in bytes.
    #[serde(default = "default_put_block_size")]
    pub put_block_size: usize,
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_username() -> String {
    std::env::var("USER")
        .ok()
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| "anonymous".into())
}

fn default_call_timeout() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_write_buffer_size() -> usize {
    DEFAULT_WRITE_BUFFER
}

fn default_put_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: default_username(),
            credential: String::new(),
            call_timeout_secs: default_call_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            write_buffer_size: default_write_buffer_size(),
            put_block_size: default_put_block_size(),
        }
    }
}

impl Config {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            tracing::debug!(path = %path.display(), "configuration loaded");
            config
        } else {
            let config = Config::default();
            config.save_to(path)?;
            config
        };
        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration, readable by the owner only on Unix.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.call_timeout_secs == 0 {
            anyhow::bail!("call_timeout_secs must be greater than zero");
        }
        if self.write_buffer_size > MAX_PAYLOAD_LEN {
            anyhow::bail!(
                "write_buffer_size must be at most {MAX_PAYLOAD_LEN} bytes, got {}",
                self.write_buffer_size
            );
        }
        Ok(())
    }

    /// `host:port` of the data service.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn auth(&self) -> AuthContext {
        AuthContext::new(&self.username, &self.credential)
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            call_timeout: Duration::from_secs(self.call_timeout_secs),
        }
    }
}

/// Returns the configuration file path.
fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home)
        .join(".config")
        .join("rhfs")
        .join("client.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9091);
        assert!(!config.username.is_empty());
        assert_eq!(config.credential, "");
        assert_eq!(config.call_timeout_secs, 60);
        assert_eq!(config.connect_timeout_secs, 30);
        assert_eq!(config.write_buffer_size, 2_000_000);
        assert_eq!(config.put_block_size, 1_000_000);
    }

    #[test]
    fn config_partial_toml() {
        let config: Config = toml::from_str(
            r#"
host = "10.0.0.5"
username = "james"
"#,
        )
        .unwrap();
        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.username, "james");
        assert_eq!(config.port, 9091);
        assert_eq!(config.address(), "10.0.0.5:9091");
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("client.toml");

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn config_save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("client.toml");
        let config = Config {
            username: "james".into(),
            credential: "secret".into(),
            call_timeout_secs: 5,
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.auth(), AuthContext::new("james", "secret"));
        assert_eq!(
            loaded.client_options().call_timeout,
            Duration::from_secs(5)
        );
    }

    #[test]
    fn zero_call_timeout_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("client.toml");
        std::fs::write(&path, "call_timeout_secs = 0\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn write_buffer_must_fit_in_one_frame() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("client.toml");
        std::fs::write(&path, format!("write_buffer_size = {}\n", 64 * 1024 * 1024)).unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("write_buffer_size"));

        std::fs::write(&path, format!("write_buffer_size = {MAX_PAYLOAD_LEN}\n")).unwrap();
        assert_eq!(
            Config::load_from(&path).unwrap().write_buffer_size,
            MAX_PAYLOAD_LEN
        );
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("client.toml");
        std::fs::write(&path, "port = \"not a number\"\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
