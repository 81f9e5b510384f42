//! Process settings and server configuration.

use crate::error::{ServerError, ServerResult};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;
use tablemirror_sync_engine::FetchConfig;

/// Default database connection string.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:///./integration.db";

/// Immutable process settings, loaded once and passed by reference.
#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    /// Upstream API key.
    pub airtable_api_key: String,
    /// Upstream base identifier.
    pub airtable_base_id: String,
    /// Mirror database connection string.
    pub database_url: String,
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Shared webhook secret. `None` accepts unauthenticated deliveries.
    pub webhook_secret: Option<String>,
    /// Largest accepted webhook timestamp skew. `None` disables the check.
    pub webhook_max_skew: Option<Duration>,
}

impl Settings {
    /// Environment variable holding the upstream API key.
    pub const API_KEY_VAR: &'static str = "AIRTABLE_API_KEY";
    /// Environment variable holding the upstream base identifier.
    pub const BASE_ID_VAR: &'static str = "AIRTABLE_BASE_ID";
    /// Environment variable holding the database URL.
    pub const DATABASE_URL_VAR: &'static str = "DATABASE_URL";
    /// Environment variable holding the bind host.
    pub const HOST_VAR: &'static str = "HOST";
    /// Environment variable holding the bind port.
    pub const PORT_VAR: &'static str = "PORT";
    /// Environment variable holding the webhook secret.
    pub const WEBHOOK_SECRET_VAR: &'static str = "WEBHOOK_SECRET";
    /// Environment variable holding the webhook timestamp skew in seconds.
    pub const WEBHOOK_MAX_SKEW_VAR: &'static str = "WEBHOOK_MAX_SKEW_SECS";

    /// Loads settings from the process environment, then `./.env`.
    pub fn from_env() -> ServerResult<Self> {
        let file = EnvFile::load(EnvFile::DEFAULT_PATH)?;
        Self::from_lookup(|key| std::env::var(key).ok().or_else(|| file.get(key)))
    }

    /// Loads settings through `lookup`.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> ServerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| ServerError::Config(format!("{key} must be set")))
        };

        let port = match get(Self::PORT_VAR) {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ServerError::Config(format!("{} is not a port: {raw:?}", Self::PORT_VAR)))?,
            None => 8000,
        };
        let webhook_max_skew = match get(Self::WEBHOOK_MAX_SKEW_VAR) {
            Some(raw) => Some(raw.trim().parse::<u64>().map(Duration::from_secs).map_err(|_| {
                ServerError::Config(format!(
                    "{} is not a number of seconds: {raw:?}",
                    Self::WEBHOOK_MAX_SKEW_VAR
                ))
            })?),
            None => None,
        };

        Ok(Self {
            airtable_api_key: required(Self::API_KEY_VAR)?,
            airtable_base_id: required(Self::BASE_ID_VAR)?,
            database_url: get(Self::DATABASE_URL_VAR).unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            host: get(Self::HOST_VAR).unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            webhook_secret: get(Self::WEBHOOK_SECRET_VAR),
            webhook_max_skew,
        })
    }

    /// Returns `host:port`, bracketing IPv6 literals.
    pub fn bind_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Resolves the bind address. Host names go through the system resolver.
    pub fn resolve_bind_addr(&self) -> ServerResult<SocketAddr> {
        resolve(&self.bind_addr())
    }

    /// Fetch client configuration for these settings.
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig::new(&self.airtable_base_id, &self.airtable_api_key)
    }

    /// Server configuration for these settings.
    pub fn server_config(&self) -> ServerConfig {
        let mut config = ServerConfig::new(self.bind_addr());
        if let Some(secret) = &self.webhook_secret {
            config = config.with_webhook_secret(secret.as_bytes());
        }
        if let Some(skew) = self.webhook_max_skew {
            config = config.with_max_timestamp_skew(skew);
        }
        config
    }
}

fn resolve(addr: &str) -> ServerResult<SocketAddr> {
    addr.to_socket_addrs()
        .map_err(|e| ServerError::Config(format!("cannot resolve bind address {addr:?}: {e}")))?
        .next()
        .ok_or_else(|| ServerError::Config(format!("bind address {addr:?} resolved to nothing")))
}

/// Variables read from a dotenv file.
///
/// Lines are `KEY=VALUE`, optionally prefixed with `export`. Blank lines and
/// `#` comments are skipped, and one pair of matching quotes around a value
/// is removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvFile {
    vars: HashMap<String, String>,
}

impl EnvFile {
    /// File read by [`Settings::from_env`].
    pub const DEFAULT_PATH: &'static str = ".env";

    /// Reads `path`. A missing file yields no variables.
    pub fn load(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(Self::parse(&contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ServerError::Config(format!(
                "cannot read {}: {e}",
                path.display()
            ))),
        }
    }

    /// Parses dotenv text.
    pub fn parse(contents: &str) -> Self {
        let vars = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let line = line.strip_prefix("export ").unwrap_or(line);
                let (key, value) = line.split_once('=')?;
                let key = key.trim();
                (!key.is_empty()).then(|| (key.to_string(), unquote(value.trim()).to_string()))
            })
            .collect();
        Self { vars }
    }

    /// Returns the value of `key`, if the file set it.
    pub fn get(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }

    /// Returns the number of variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Returns true if the file set nothing.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("airtable_api_key", &"<redacted>")
            .field("airtable_base_id", &self.airtable_base_id)
            .field("database_url", &self.database_url)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "<redacted>"))
            .field("webhook_max_skew", &self.webhook_max_skew)
            .finish()
    }
}

/// Configuration for the mirror server.
#[derive(Clone)]
pub struct ServerConfig {
    /// `host:port` an HTTP listener should bind to.
    pub bind_addr: String,
    /// Shared webhook secret (if authentication enabled).
    pub webhook_secret: Option<Vec<u8>>,
    /// Largest accepted distance between the delivery timestamp and now.
    pub max_timestamp_skew: Option<Duration>,
    /// Largest accepted list `limit`.
    pub max_list_limit: usize,
    /// `limit` used when none is given.
    pub default_list_limit: usize,
    /// Tables served under `/api/v1/<name>`.
    pub convenience_tables: Vec<String>,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            webhook_secret: None,
            max_timestamp_skew: None,
            max_list_limit: 1000,
            default_list_limit: 100,
            convenience_tables: vec!["people".to_string(), "tasks".to_string()],
        }
    }

    /// Enables webhook authentication with the given secret.
    pub fn with_webhook_secret(mut self, secret: impl Into<Vec<u8>>) -> Self {
        self.webhook_secret = Some(secret.into());
        self
    }

    /// Rejects deliveries whose timestamp is further than `skew` from now.
    pub fn with_max_timestamp_skew(mut self, skew: Duration) -> Self {
        self.max_timestamp_skew = Some(skew);
        self
    }

    /// Sets the largest accepted list limit.
    pub fn with_max_list_limit(mut self, limit: usize) -> Self {
        self.max_list_limit = limit;
        self
    }

    /// Sets the default list limit.
    pub fn with_default_list_limit(mut self, limit: usize) -> Self {
        self.default_list_limit = limit;
        self
    }

    /// Sets the tables with convenience list routes.
    pub fn with_convenience_tables<I, T>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.convenience_tables = tables.into_iter().map(Into::into).collect();
        self
    }

    /// Resolves [`Self::bind_addr`] for a listener.
    pub fn resolve_bind_addr(&self) -> ServerResult<SocketAddr> {
        resolve(&self.bind_addr)
    }

    /// Returns true if webhook deliveries must be signed.
    pub fn requires_signature(&self) -> bool {
        self.webhook_secret.is_some()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("0.0.0.0:8000")
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("requires_signature", &self.requires_signature())
            .field("max_timestamp_skew", &self.max_timestamp_skew)
            .field("max_list_limit", &self.max_list_limit)
            .field("default_list_limit", &self.default_list_limit)
            .field("convenience_tables", &self.convenience_tables)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn settings_defaults() {
        let settings = Settings::from_lookup(lookup(&[
            ("AIRTABLE_API_KEY", "key"),
            ("AIRTABLE_BASE_ID", "appBASE"),
        ]))
        .unwrap();

        assert_eq!(settings.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(settings.host, "0.0.0.0");
        assert_eq!(settings.port, 8000);
        assert!(settings.webhook_secret.is_none());
        assert!(settings.webhook_max_skew.is_none());
        assert_eq!(settings.bind_addr(), "0.0.0.0:8000");
        assert_eq!(settings.fetch_config().base_id, "appBASE");
    }

    #[test]
    fn settings_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            ("AIRTABLE_API_KEY", "key"),
            ("AIRTABLE_BASE_ID", "appBASE"),
            ("DATABASE_URL", "sqlite:///tmp/m.db"),
            ("HOST", "127.0.0.1"),
            ("PORT", "9000"),
            ("WEBHOOK_SECRET", "s3cr3t"),
        ]))
        .unwrap();

        assert_eq!(settings.port, 9000);
        let config = settings.server_config();
        assert!(config.requires_signature());
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(
            config.resolve_bind_addr().unwrap(),
            SocketAddr::from(([127, 0, 0, 1], 9000))
        );
    }

    #[test]
    fn empty_secret_is_absent() {
        let settings = Settings::from_lookup(lookup(&[
            ("AIRTABLE_API_KEY", "key"),
            ("AIRTABLE_BASE_ID", "appBASE"),
            ("WEBHOOK_SECRET", ""),
        ]))
        .unwrap();
        assert!(settings.webhook_secret.is_none());
        assert!(!settings.server_config().requires_signature());
    }

    #[test]
    fn missing_or_bad_values_rejected() {
        let err = Settings::from_lookup(lookup(&[("AIRTABLE_BASE_ID", "appBASE")])).unwrap_err();
        assert!(err.to_string().contains("AIRTABLE_API_KEY"));
        assert_eq!(err.status_code(), 500);

        let err = Settings::from_lookup(lookup(&[
            ("AIRTABLE_API_KEY", "key"),
            ("AIRTABLE_BASE_ID", "appBASE"),
            ("PORT", "http"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
    }

    #[test]
    fn host_names_are_kept_until_bind() {
        let settings = Settings::from_lookup(lookup(&[
            ("AIRTABLE_API_KEY", "key"),
            ("AIRTABLE_BASE_ID", "appBASE"),
            ("HOST", "localhost"),
            ("PORT", "8080"),
        ]))
        .unwrap();

        let config = settings.server_config();
        assert_eq!(config.bind_addr, "localhost:8080");
        assert_eq!(config.resolve_bind_addr().unwrap().port(), 8080);
    }

    #[test]
    fn ipv6_hosts_are_bracketed() {
        let settings = Settings::from_lookup(lookup(&[
            ("AIRTABLE_API_KEY", "key"),
            ("AIRTABLE_BASE_ID", "appBASE"),
            ("HOST", "::1"),
        ]))
        .unwrap();
        assert_eq!(settings.bind_addr(), "[::1]:8000");
        assert_eq!(
            settings.resolve_bind_addr().unwrap(),
            "[::1]:8000".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn webhook_skew_reaches_server_config() {
        let settings = Settings::from_lookup(lookup(&[
            ("AIRTABLE_API_KEY", "key"),
            ("AIRTABLE_BASE_ID", "appBASE"),
            ("WEBHOOK_MAX_SKEW_SECS", "300"),
        ]))
        .unwrap();
        assert_eq!(settings.webhook_max_skew, Some(Duration::from_secs(300)));
        assert_eq!(
            settings.server_config().max_timestamp_skew,
            Some(Duration::from_secs(300))
        );

        let err = Settings::from_lookup(lookup(&[
            ("AIRTABLE_API_KEY", "key"),
            ("AIRTABLE_BASE_ID", "appBASE"),
            ("WEBHOOK_MAX_SKEW_SECS", "5m"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("WEBHOOK_MAX_SKEW_SECS"));
    }

    #[test]
    fn env_file_parsing() {
        let file = EnvFile::parse(
            "# upstream\n\
             AIRTABLE_API_KEY=keyFILE\n\
             export AIRTABLE_BASE_ID = \"appFILE\"\n\
             WEBHOOK_SECRET='a=b'\n\
             \n\
             not a pair\n\
             =orphan\n",
        );
        assert_eq!(file.len(), 3);
        assert_eq!(file.get("AIRTABLE_API_KEY").as_deref(), Some("keyFILE"));
        assert_eq!(file.get("AIRTABLE_BASE_ID").as_deref(), Some("appFILE"));
        assert_eq!(file.get("WEBHOOK_SECRET").as_deref(), Some("a=b"));
        assert!(file.get("not a pair").is_none());
    }

    #[test]
    fn env_file_load() {
        let dir = tempfile::tempdir().unwrap();
        let missing = EnvFile::load(dir.path().join(".env")).unwrap();
        assert!(missing.is_empty());

        let path = dir.path().join(".env");
        std::fs::write(&path, "AIRTABLE_API_KEY=k\nAIRTABLE_BASE_ID=b\nPORT=9100\n").unwrap();
        let file = EnvFile::load(&path).unwrap();
        let settings = Settings::from_lookup(|key| file.get(key)).unwrap();
        assert_eq!(settings.airtable_base_id, "b");
        assert_eq!(settings.port, 9100);
    }

    #[test]
    fn debug_redacts_secrets() {
        let settings = Settings::from_lookup(lookup(&[
            ("AIRTABLE_API_KEY", "keySECRET"),
            ("AIRTABLE_BASE_ID", "appBASE"),
            ("WEBHOOK_SECRET", "hush"),
        ]))
        .unwrap();
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("keySECRET"));
        assert!(!rendered.contains("hush"));

        let config = settings.server_config();
        assert!(!format!("{config:?}").contains("hush"));
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::default()
            .with_webhook_secret("s")
            .with_max_timestamp_skew(Duration::from_secs(300))
            .with_max_list_limit(50)
            .with_default_list_limit(10)
            .with_convenience_tables(["projects"]);

        assert_eq!(config.webhook_secret, Some(b"s".to_vec()));
        assert_eq!(config.max_timestamp_skew, Some(Duration::from_secs(300)));
        assert_eq!(config.max_list_limit, 50);
        assert_eq!(config.default_list_limit, 10);
        assert_eq!(config.convenience_tables, vec!["projects".to_string()]);
    }
}
