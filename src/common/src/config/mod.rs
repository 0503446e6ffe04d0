use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

/// Default configuration file looked up in the working directory
pub const CONFIG_FILE: &str = "bucketdb.toml";

/// Prefix for environment overrides, e.g. `BUCKETDB__DATABASE__DSN`
pub const ENV_PREFIX: &str = "BUCKETDB__";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// `sqlite://...`, `postgres://...` or `memory://`
    pub dsn: String,
    /// Upper bound on pooled connections
    pub max_connections: u32,
    /// How long a request waits for a pooled connection
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dsn: String::from("sqlite://.data/bucketdb.db"),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

impl DatabaseConfig {
    /// Create an in-memory SQLite configuration
    pub fn in_memory() -> Self {
        Self {
            dsn: String::from("sqlite::memory:"),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address the HTTP server binds to
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: String::from("0.0.0.0:3000"),
        }
    }
}

/// Where purge backups are published.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Object store DSN (`file://`, `memory://`, `s3://`)
    pub dsn: String,
    /// Key prefix inside the object store
    pub prefix: String,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dsn: String::from("file:///.data"),
            prefix: String::from("backups"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimeConfig {
    /// IANA time zone used for calendar boundaries ("midnight", "first of month")
    pub timezone: String,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            timezone: String::from("UTC"),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Configuration {
    /// Bucket store connection
    pub database: DatabaseConfig,
    /// HTTP listener
    pub server: ServerConfig,
    /// Backup artifact destination
    pub backup: BackupConfig,
    /// Calendar settings
    pub time: TimeConfig,
}

impl Configuration {
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::figment(Toml::file(CONFIG_FILE))
            .extract()
            .map_err(Box::new)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        Self::figment(Toml::file(path)).extract().map_err(Box::new)
    }

    fn figment(file: figment::providers::Data<Toml>) -> Figment {
        Figment::from(Serialized::defaults(Configuration::default()))
            .merge(file)
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Parsed service time zone.
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.time
            .timezone
            .parse::<Tz>()
            .map_err(|e| ConfigError::InvalidTimezone {
                timezone: self.time.timezone.clone(),
                message: e.to_string(),
            })
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .listen
            .parse()
            .map_err(|_| ConfigError::InvalidListenAddress(self.server.listen.clone()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.dsn.is_empty() {
            return Err(ConfigError::EmptyDsn("database.dsn"));
        }
        if self.backup.dsn.is_empty() {
            return Err(ConfigError::EmptyDsn("backup.dsn"));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::NoConnections);
        }
        self.listen_addr()?;
        self.timezone()?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} cannot be empty")]
    EmptyDsn(&'static str),

    #[error("database.max_connections must be at least 1")]
    NoConnections,

    #[error("Invalid listen address '{0}'")]
    InvalidListenAddress(String),

    #[error("Invalid timezone '{timezone}': {message}")]
    InvalidTimezone { timezone: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_configuration() {
        let config = Configuration::default();

        assert_eq!(config.database.dsn, "sqlite://.data/bucketdb.db");
        assert_eq!(config.database.acquire_timeout, Duration::from_secs(5));
        assert_eq!(config.server.listen, "0.0.0.0:3000");
        assert_eq!(config.backup.prefix, "backups");
        assert_eq!(config.timezone().unwrap(), chrono_tz::UTC);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_configless_operation() {
        Jail::expect_with(|_jail| {
            let config = Configuration::load().map_err(|e| *e)?;
            assert_eq!(config.database.dsn, "sqlite://.data/bucketdb.db");
            assert_eq!(config.listen_addr().unwrap().port(), 3000);
            Ok(())
        });
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE,
                r#"
                [database]
                dsn = "postgres://localhost/buckets"
                acquire_timeout = "30s"

                [time]
                timezone = "Europe/Berlin"
                "#,
            )?;

            let config = Configuration::load().map_err(|e| *e)?;
            assert_eq!(config.database.dsn, "postgres://localhost/buckets");
            assert_eq!(config.database.acquire_timeout, Duration::from_secs(30));
            assert_eq!(config.database.max_connections, 5);
            assert_eq!(config.timezone().unwrap(), chrono_tz::Europe::Berlin);
            Ok(())
        });
    }

    #[test]
    fn test_env_var_override() {
        Jail::expect_with(|jail| {
            jail.create_file(CONFIG_FILE, "[server]\nlisten = \"127.0.0.1:4000\"")?;
            jail.set_env("BUCKETDB__SERVER__LISTEN", "127.0.0.1:5000");
            jail.set_env("BUCKETDB__BACKUP__PREFIX", "purged");

            let config = Configuration::load().map_err(|e| *e)?;
            assert_eq!(config.server.listen, "127.0.0.1:5000");
            assert_eq!(config.backup.prefix, "purged");
            Ok(())
        });
    }

    #[test]
    fn test_load_from_explicit_path() {
        Jail::expect_with(|jail| {
            jail.create_file("custom.toml", "[backup]\ndsn = \"memory://\"")?;

            let config = Configuration::load_from_path(Path::new("custom.toml")).map_err(|e| *e)?;
            assert_eq!(config.backup.dsn, "memory://");
            Ok(())
        });
    }

    #[test]
    fn test_validation_failures() {
        let mut config = Configuration::default();
        config.time.timezone = "Mars/Olympus_Mons".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTimezone { .. })
        ));

        let mut config = Configuration::default();
        config.server.listen = "localhost".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidListenAddress(_))
        ));

        let mut config = Configuration::default();
        config.database.dsn.clear();
        assert!(matches!(config.validate(), Err(ConfigError::EmptyDsn(_))));
    }
}
