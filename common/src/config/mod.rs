use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::err::MysqlError;

/// Root configuration for an embedded MySQL protocol server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub app_name: String,

    pub net: NetConfig,
    pub base: BaseConfig,
}

/// Listener and capability-negotiation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetConfig {
    pub bind_host: String,
    pub bind_port: u16,

    /// 16-bit server id embedded in the high bits of every connection id.
    /// `None` means "pick one at random at startup".
    pub server_id: Option<u16>,

    pub max_connections: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseConfig {
    /// Directory for rolling log files; unset keeps logging on stdout.
    pub log_dir: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            app_name: "mysql-server".to_string(),
            net: NetConfig::default(),
            base: BaseConfig::default(),
        }
    }
}

impl Default for NetConfig {
    fn default() -> Self {
        NetConfig {
            bind_host: "0.0.0.0".to_string(),
            bind_port: 3306,
            server_id: None,
            max_connections: 1000,
        }
    }
}

impl Default for BaseConfig {
    fn default() -> Self {
        BaseConfig { log_dir: None }
    }
}

/// Loads a `ServerConfig` from a TOML file, falling back to field defaults
/// for anything the file omits.
pub fn read_config<P: AsRef<Path>>(path: P) -> Result<ServerConfig, MysqlError> {
    let mut file = File::open(path.as_ref())?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;

    toml::from_str(contents.as_str()).map_err(|e| MysqlError::Other(e.to_string()))
}

#[cfg(test)]
mod test {
    use super::ServerConfig;

    #[test]
    fn defaults_bind_to_standard_mysql_port() {
        let config = ServerConfig::default();
        assert_eq!(config.net.bind_port, 3306);
        assert_eq!(config.net.server_id, None);
    }

    #[test]
    fn round_trips_through_toml() {
        let config = ServerConfig::default();
        let serialized = toml::to_string(&config).expect("serialize config");
        let parsed: ServerConfig = toml::from_str(&serialized).expect("parse config");
        assert_eq!(parsed.net.bind_port, config.net.bind_port);
    }
}
