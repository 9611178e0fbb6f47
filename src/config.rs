use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::{Principal, UserRole};

#[derive(Parser, Debug)]
#[command(name = "gallery", about = "Share and discuss NFT collections")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Cache stale time in seconds
    #[arg(long, global = true)]
    pub stale_secs: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Sign in, creating an identity on first use
    Login,
    /// Sign out
    Logout,
    /// Show the current identity, profile and role
    Whoami,
    /// Create or update your profile
    Profile {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
    },
    /// List posts, newest first
    Feed {
        /// Only posts from users you follow
        #[arg(long)]
        following: bool,
    },
    /// Show a post with its comment thread
    Show { post: u64 },
    /// Publish a post with up to four images
    Post {
        #[arg(long)]
        caption: String,
        /// Image file path or http(s) URL; repeat for more
        #[arg(long = "image", num_args = 1..)]
        images: Vec<String>,
    },
    /// Comment on a post, or reply to one of its comments
    Comment {
        post: u64,
        text: String,
        #[arg(long)]
        reply_to: Option<u64>,
    },
    /// Like or unlike a post
    Like { post: u64 },
    Follow { principal: Principal },
    Unfollow { principal: Principal },
    Followers,
    Following,
    /// Admin: delete a post
    DeletePost { post: u64 },
    /// Admin: delete a comment and its replies
    DeleteComment { comment: u64 },
    /// Admin: give a principal a role
    Grant { principal: Principal, role: UserRole },
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub cache: CacheConfig,
    pub identity: IdentityConfig,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct GatewayConfig {
    pub database: Option<PathBuf>,
    pub uploads: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub stale_secs: u64,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct IdentityConfig {
    pub key_file: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { stale_secs: 30 }
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
        if let Some(secs) = cli.stale_secs {
            config.cache.stale_secs = secs;
        }

        // Resolve paths relative to data dir
        config.gateway.database = Some(resolve(&data_dir, config.gateway.database, "gallery.db"));
        config.gateway.uploads = Some(resolve(&data_dir, config.gateway.uploads, "uploads"));
        config.identity.key_file = Some(resolve(&data_dir, config.identity.key_file, "identity"));

        Ok(config)
    }

    pub fn data_dir(cli: &Cli) -> anyhow::Result<PathBuf> {
        match &cli.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::home_dir()
                .map(|home| home.join(".gallery"))
                .ok_or_else(|| anyhow::anyhow!("Could not determine home directory")),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.gateway.database.clone().unwrap_or_else(|| PathBuf::from("gallery.db"))
    }

    pub fn uploads_path(&self) -> PathBuf {
        self.gateway.uploads.clone().unwrap_or_else(|| PathBuf::from("uploads"))
    }

    pub fn key_file(&self) -> PathBuf {
        self.identity.key_file.clone().unwrap_or_else(|| PathBuf::from("identity"))
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.cache.stale_secs)
    }
}

/// Relative paths in the config file are taken from the data dir.
fn resolve(data_dir: &std::path::Path, configured: Option<PathBuf>, default: &str) -> PathBuf {
    match configured {
        Some(path) if path.is_absolute() => path,
        Some(path) => data_dir.join(path),
        None => data_dir.join(default),
    }
}
