use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "buzznet", about = "Post to BuzzNet, even when the server is down")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Base URL of the posts API
    #[arg(long, env = "BUZZNET_API_URL", global = true)]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the posts API
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Create a post, queueing it locally if the server is unreachable
    Post {
        #[arg(short, long, default_value = "")]
        title: String,

        #[arg(long, default_value = "")]
        content: String,

        #[arg(short, long, default_value = "")]
        author: String,
    },
    /// List posts waiting in the local queue
    Pending,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub remote: RemoteConfig,
    pub storage: StorageConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct RemoteConfig {
    pub url: String,
    pub timeout_secs: u64,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:5000".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli)?;
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI overrides
        if let Some(ref url) = cli.api_url {
            config.remote.url = url.clone();
        }
        if let Command::Serve { host, port } = &cli.command {
            if let Some(host) = host {
                config.server.host = host.clone();
            }
            if let Some(port) = port {
                config.server.port = *port;
            }
        }

        // Resolve paths relative to data dir
        if config.database.path.is_none() {
            config.database.path = Some(data_dir.join("buzznet.db"));
        }
        if config.storage.path.is_none() {
            config.storage.path = Some(data_dir.join("local_storage.db"));
        }

        Ok(config)
    }

    pub fn data_dir(cli: &Cli) -> anyhow::Result<PathBuf> {
        match &cli.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::home_dir()
                .map(|home| home.join(".buzznet"))
                .ok_or_else(|| anyhow::anyhow!("Could not determine home directory")),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.database.path.clone().unwrap_or_else(|| PathBuf::from("buzznet.db"))
    }

    pub fn local_storage_path(&self) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("local_storage.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("buzznet").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.remote.url, "http://localhost:5000");
        assert_eq!(config.remote.timeout_secs, 10);
        assert!(config.database.path.is_none());
        assert!(config.storage.path.is_none());
    }

    #[test]
    fn data_dir_uses_cli_override() {
        let cli = cli(&["--data-dir", "/tmp/test-buzznet", "pending"]);
        assert_eq!(
            Config::data_dir(&cli).unwrap(),
            PathBuf::from("/tmp/test-buzznet")
        );
    }

    #[test]
    fn load_with_no_config_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().to_str().unwrap();
        let config = Config::load(&cli(&["--data-dir", dir, "pending"])).unwrap();

        assert_eq!(config.server.port, 5000);
        assert_eq!(config.db_path(), tmp.path().join("buzznet.db"));
        assert_eq!(
            config.local_storage_path(),
            tmp.path().join("local_storage.db")
        );
    }

    #[test]
    fn load_applies_serve_overrides() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().to_str().unwrap();
        let config = Config::load(&cli(&[
            "--data-dir",
            dir,
            "serve",
            "--host",
            "127.0.0.1",
            "--port",
            "8080",
        ]))
        .unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn load_reads_toml_file() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
[server]
port = 9000

[remote]
url = "http://posts.example:5000"
timeout_secs = 3

[storage]
path = "/var/lib/buzznet/queue.db"
"#,
        )
        .unwrap();

        let dir = tmp.path().to_str().unwrap();
        let config = Config::load(&cli(&["--data-dir", dir, "pending"])).unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.remote.url, "http://posts.example:5000");
        assert_eq!(config.remote.timeout_secs, 3);
        assert_eq!(
            config.local_storage_path(),
            PathBuf::from("/var/lib/buzznet/queue.db")
        );
    }

    #[test]
    fn api_url_flag_beats_toml_value() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("custom.toml");
        std::fs::write(
            &config_path,
            r#"
[remote]
url = "http://from-file:5000"
"#,
        )
        .unwrap();

        let dir = tmp.path().to_str().unwrap();
        let path = config_path.to_str().unwrap();
        let config = Config::load(&cli(&[
            "--data-dir",
            dir,
            "--config",
            path,
            "--api-url",
            "http://from-flag:7000",
            "pending",
        ]))
        .unwrap();

        assert_eq!(config.remote.url, "http://from-flag:7000");
    }

    #[test]
    fn post_command_parses_fields() {
        let cli = cli(&["post", "-t", "Hi", "--content", "Body", "-a", "Ann"]);
        match cli.command {
            Command::Post {
                title,
                content,
                author,
            } => {
                assert_eq!((title.as_str(), content.as_str(), author.as_str()), ("Hi", "Body", "Ann"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
