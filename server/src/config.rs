//! Server configuration.
//!
//! The server is launched with a single positional argument: a path to a
//! YAML config file. There is no environment-variable fallback and no
//! `$XDG_CONFIG_HOME` discovery — unlike the teacher, there is exactly one
//! way to configure this server, because the deployment always supplies an
//! explicit config path.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use derivative::Derivative;
use serde::Deserialize;

/// Top level server configuration, deserialized directly from YAML.
#[derive(Clone, Derivative, Deserialize)]
#[derivative(Debug)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Port to listen on. Always binds `0.0.0.0`.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed `Host` headers. Empty means all hosts are allowed.
    #[serde(rename = "allowed-hosts", default)]
    pub allowed_hosts: Vec<String>,

    /// Per-project JWT HMAC secrets, keyed by `pnum`.
    #[serde(rename = "jwt_secrets")]
    #[derivative(Debug = "ignore")]
    pub jwt_secrets: HashMap<String, String>,

    /// Per-project upload roots, keyed by `pnum`.
    pub uploads_root: HashMap<String, PathBuf>,

    /// Shared root under which all SNS submissions live, partitioned by
    /// `pnum` beneath it.
    pub sns_uploads_root: PathBuf,

    /// Per-project export roots, keyed by `pnum`.
    pub export_root: HashMap<String, PathBuf>,

    /// Cap on form-data request bodies. Streaming uploads are unbounded
    /// modulo available disk.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,

    /// How long an idle resumable upload survives before the background
    /// sweeper reaps its chunk directory.
    #[serde(default = "default_resumable_ttl_seconds")]
    pub resumable_ttl_seconds: u64,

    /// Path to the `gpg` binary used to decrypt the `Aes-Key` header.
    pub gpg_binary: PathBuf,

    /// GnuPG home directory.
    pub gpg_homedir: PathBuf,

    /// Public keyring file passed to `gpg --no-default-keyring --keyring`.
    pub gpg_keyring: PathBuf,

    /// Secret keyring file passed to `gpg --secret-keyring`.
    pub gpg_secring: PathBuf,

    /// Key id of the server's own PGP keypair, used to decrypt inbound
    /// `Aes-Key` headers.
    pub public_key_id: String,
}

fn default_port() -> u16 {
    3003
}

fn default_max_body_bytes() -> u64 {
    40 * 1024 * 1024
}

fn default_resumable_ttl_seconds() -> u64 {
    24 * 60 * 60
}

impl Config {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.port)
    }

    pub fn jwt_secret_for(&self, pnum: &str) -> Option<&str> {
        self.jwt_secrets.get(pnum).map(|s| s.as_str())
    }
}

/// Loads and parses the YAML config at `path`. Unlike the teacher, there
/// is no generated-template fallback: a missing or malformed config is a
/// startup-time fatal error, since this server has no interactive `init`
/// flow.
pub async fn load_config(path: &Path) -> anyhow::Result<Config> {
    let raw = tokio::fs::read_to_string(path).await?;
    let config: Config = serde_yaml::from_str(&raw)?;
    Ok(config)
}
