use std::{
    collections::HashMap,
    env,
    fs,
    io::{BufRead, BufReader},
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use directories::BaseDirs;

use crate::{cli::Cli, utils::parse_kv_line};

pub const DEFAULT_TOKEN: &str = "bff-alpha-token";
pub const DEFAULT_DELEGATE_URL: &str = "https://emkc.org/api/v2/piston";

#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Config {
    /// Defaults, overlaid by the rc file, overlaid by the environment.
    pub fn load(path: Option<&Path>) -> Self {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
        let mut map = default_map();

        if config_path.exists() {
            if let Ok(file) = fs::File::open(&config_path) {
                let reader = BufReader::new(file);
                for line in reader.lines().map_while(Result::ok) {
                    if let Some((k, v)) = parse_kv_line(&line) {
                        map.insert(k, v);
                    }
                }
            }
        }

        for (k, v) in env::vars() {
            if is_config_key(&k) {
                map.insert(k, v);
            }
        }

        Self { inner: map, config_path }
    }

    /// Config built from explicit pairs on top of the defaults. Ignores the
    /// environment; used by tests and embedders.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = default_map();
        for (k, v) in pairs {
            map.insert(k.into(), v.into());
        }
        Self { inner: map, config_path: default_config_path() }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).cloned()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.trim().parse::<u64>().ok())
    }

    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        self.get(key).filter(|v| !v.trim().is_empty()).map(PathBuf::from)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.get_path("DATA_DIR").unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn secrets_path(&self) -> PathBuf {
        self.get_path("SECRETS_FILE")
            .unwrap_or_else(|| self.data_dir().join(".env"))
    }
}

/// Fully resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind: SocketAddr,
    pub token: String,
    pub data_dir: PathBuf,
    pub secrets_path: PathBuf,
    pub default_project: String,
    pub delegate_url: String,
    pub delegate_timeout: Option<Duration>,
    pub allow_shell_escape: bool,
    pub max_cascade: usize,
    pub max_operations: u64,
}

impl Settings {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let host = cfg.get("BRIDGE_BIND").unwrap_or_else(|| "127.0.0.1".into());
        let ip: IpAddr = host
            .trim()
            .parse()
            .with_context(|| format!("invalid BRIDGE_BIND address: {host}"))?;
        let port = cfg
            .get("BRIDGE_PORT")
            .ok_or_else(|| anyhow!("BRIDGE_PORT is not set"))?
            .trim()
            .parse::<u16>()
            .context("invalid BRIDGE_PORT")?;

        let token = cfg.get("BRIDGE_TOKEN").unwrap_or_default();
        if token.is_empty() {
            return Err(anyhow!("BRIDGE_TOKEN must not be empty"));
        }

        let timeout = cfg.get_u64("REQUEST_TIMEOUT").unwrap_or(0);

        Ok(Self {
            bind: SocketAddr::new(ip, port),
            token,
            data_dir: cfg.data_dir(),
            secrets_path: cfg.secrets_path(),
            default_project: cfg.get("DEFAULT_PROJECT").unwrap_or_else(|| "default".into()),
            delegate_url: cfg
                .get("DELEGATE_URL")
                .unwrap_or_else(|| DEFAULT_DELEGATE_URL.to_string()),
            delegate_timeout: (timeout > 0).then(|| Duration::from_secs(timeout)),
            allow_shell_escape: cfg.get_bool("ALLOW_SHELL_ESCAPE"),
            max_cascade: cfg.get_u64("MAX_CASCADE").unwrap_or(256) as usize,
            max_operations: cfg.get_u64("LOCAL_MAX_OPERATIONS").unwrap_or(0),
        })
    }

    /// CLI flags take precedence over config and environment.
    pub fn resolve(cfg: &Config, args: &Cli) -> Result<Self> {
        let mut settings = Self::from_config(cfg)?;
        if let Some(port) = args.port {
            settings.bind.set_port(port);
        }
        if let Some(host) = args.bind.as_deref() {
            let ip: IpAddr = host.parse().with_context(|| format!("invalid --bind address: {host}"))?;
            settings.bind.set_ip(ip);
        }
        if let Some(token) = args.token.clone().filter(|t| !t.is_empty()) {
            settings.token = token;
        }
        if let Some(dir) = args.data_dir.clone() {
            if cfg.get_path("SECRETS_FILE").is_none() {
                settings.secrets_path = dir.join(".env");
            }
            settings.data_dir = dir;
        }
        if let Some(url) = args.delegate_url.clone() {
            settings.delegate_url = url;
        }
        if args.allow_shell {
            settings.allow_shell_escape = true;
        }
        Ok(settings)
    }
}

fn is_config_key(k: &str) -> bool {
    const KEYS: &[&str] = &[
        "BRIDGE_BIND",
        "BRIDGE_PORT",
        "BRIDGE_TOKEN",
        "DATA_DIR",
        "SECRETS_FILE",
        "DEFAULT_PROJECT",
        "DELEGATE_URL",
        "REQUEST_TIMEOUT",
        "ALLOW_SHELL_ESCAPE",
        "MAX_CASCADE",
        "LOCAL_MAX_OPERATIONS",
    ];

    KEYS.contains(&k)
}

fn default_config_path() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("cell_bridge").join(".bridgerc")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();

    m.insert("BRIDGE_BIND".into(), "127.0.0.1".into());
    m.insert("BRIDGE_PORT".into(), "8888".into());
    m.insert("BRIDGE_TOKEN".into(), DEFAULT_TOKEN.into());
    m.insert("DATA_DIR".into(), ".".into());
    m.insert("DEFAULT_PROJECT".into(), "default".into());
    m.insert("DELEGATE_URL".into(), DEFAULT_DELEGATE_URL.into());

    // Numbers; 0 disables the limit
    m.insert("REQUEST_TIMEOUT".into(), "0".into());
    m.insert("MAX_CASCADE".into(), "256".into());
    m.insert("LOCAL_MAX_OPERATIONS".into(), "0".into());

    m.insert("ALLOW_SHELL_ESCAPE".into(), "false".into());

    m
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve_to_local_port_8888() {
        let settings = Settings::from_config(&Config::from_pairs(Vec::<(String, String)>::new())).unwrap();
        assert_eq!(settings.bind, "127.0.0.1:8888".parse().unwrap());
        assert_eq!(settings.token, DEFAULT_TOKEN);
        assert_eq!(settings.secrets_path, PathBuf::from(".").join(".env"));
        assert!(!settings.allow_shell_escape);
        assert!(settings.delegate_timeout.is_none());
    }

    #[test]
    fn pairs_override_defaults() {
        let cfg = Config::from_pairs([
            ("BRIDGE_PORT", "9000"),
            ("DATA_DIR", "/tmp/bridge"),
            ("ALLOW_SHELL_ESCAPE", "true"),
            ("REQUEST_TIMEOUT", "15"),
        ]);
        let settings = Settings::from_config(&cfg).unwrap();
        assert_eq!(settings.bind.port(), 9000);
        assert_eq!(settings.secrets_path, PathBuf::from("/tmp/bridge/.env"));
        assert!(settings.allow_shell_escape);
        assert_eq!(settings.delegate_timeout, Some(Duration::from_secs(15)));
    }

    #[test]
    fn empty_token_is_rejected() {
        let cfg = Config::from_pairs([("BRIDGE_TOKEN", "")]);
        assert!(Settings::from_config(&cfg).is_err());
    }
}
