//! Client configuration.
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::binary::BinaryError;
use crate::protocol::{SettingValue, Settings};

pub const DEFAULT_PORT: u16 = 9000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Host {
    pub host: String,
    pub port: u16,
}

impl Host {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::new("localhost", DEFAULT_PORT)
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Order in which hosts are tried when (re)connecting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HostSelectionPolicy {
    /// Start one host further along the list on every attempt.
    #[default]
    RoundRobin,
    /// Shuffle the whole list on every attempt.
    Random,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    /// Verify the server certificate chain and name.
    pub verify: bool,
    /// PEM file with trusted CA certificates. Replaces the bundled web roots.
    pub ca_file: Option<PathBuf>,
    /// In-memory PEM with trusted CA certificates. Takes precedence over `ca_file`.
    pub ca_pem: Option<Vec<u8>>,
    pub client_cert_file: Option<PathBuf>,
    pub client_key_file: Option<PathBuf>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            verify: true,
            ca_file: None,
            ca_pem: None,
            client_cert_file: None,
            client_key_file: None,
        }
    }
}

/// How far the server should take a query before returning results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryStage {
    FetchColumns = 0,
    WithMergeableState = 1,
    #[default]
    Complete = 2,
    WithMergeableStateAfterAggregation = 3,
}

impl QueryStage {
    pub fn from_u64(value: u64) -> Result<Self, BinaryError> {
        match value {
            0 => Ok(QueryStage::FetchColumns),
            1 => Ok(QueryStage::WithMergeableState),
            2 => Ok(QueryStage::Complete),
            3 => Ok(QueryStage::WithMergeableStateAfterAggregation),
            other => Err(BinaryError::malformed(format!("unknown query stage {other}"))),
        }
    }
}

/// Per-call options for queries, executes and inserts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    /// Defaults to a fresh v4 UUID.
    pub query_id: Option<String>,
    pub stage: QueryStage,
    /// Merged over [`Config::settings`].
    pub settings: Settings,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query_id(mut self, query_id: impl Into<String>) -> Self {
        self.query_id = Some(query_id.into());
        self
    }

    pub fn with_stage(mut self, stage: QueryStage) -> Self {
        self.stage = stage;
        self
    }

    pub fn with_setting(mut self, name: impl Into<String>, value: impl Into<SettingValue>) -> Self {
        self.settings.set(name, value);
        self
    }
}

/// Everything a [`Client`](crate::Client) needs to open and maintain its connection.
#[derive(Debug, Clone)]
pub struct Config {
    pub hosts: Vec<Host>,
    pub host_selection: HostSelectionPolicy,
    pub database: String,
    pub user: String,
    pub password: String,
    /// Reported to the server as `"ClickHouse <client_name>"`.
    pub client_name: String,
    /// Bounds connect plus handshake, and the whole reconnect loop after a failure.
    pub connect_timeout: Duration,
    /// Bounds each wait for a server packet. [`Duration::ZERO`] waits forever.
    pub query_timeout: Duration,
    /// LZ4 compression of data blocks.
    pub compression: bool,
    /// Connection-wide settings sent with every query.
    pub settings: Settings,
    pub tcp_keepalive: bool,
    pub send_buffer_size: Option<usize>,
    pub recv_buffer_size: Option<usize>,
    pub tls: Option<TlsConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hosts: vec![Host::default()],
            host_selection: HostSelectionPolicy::default(),
            database: "default".to_string(),
            user: "default".to_string(),
            password: String::new(),
            client_name: "chnative".to_string(),
            connect_timeout: Duration::from_secs(10),
            query_timeout: Duration::from_secs(60),
            compression: false,
            settings: Settings::new(),
            tcp_keepalive: false,
            send_buffer_size: None,
            recv_buffer_size: None,
            tls: None,
        }
    }
}

impl Config {
    /// Default configuration pointing at a single host.
    pub fn with_host(host: impl Into<String>, port: u16) -> Self {
        Self {
            hosts: vec![Host::new(host, port)],
            ..Self::default()
        }
    }

    /// Hosts to try, falling back to `localhost:9000` when none are configured.
    pub fn resolved_hosts(&self) -> Vec<Host> {
        if self.hosts.is_empty() {
            vec![Host::default()]
        } else {
            self.hosts.clone()
        }
    }

    pub fn add_host(mut self, host: impl Into<String>, port: u16) -> Self {
        self.hosts.push(Host::new(host, port));
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    pub fn with_compression(mut self, compression: bool) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn with_setting(mut self, name: impl Into<String>, value: impl Into<SettingValue>) -> Self {
        self.settings.set(name, value);
        self
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }
}
