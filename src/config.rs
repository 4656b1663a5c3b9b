//! Configuration: device connection settings and the bundle file locations.
//!
//! Settings are read from a JSON file and may be overridden from the
//! environment:
//!
//! | Setting     | Variables                              |
//! |-------------|----------------------------------------|
//! | `host`      | `AMT_HOST`                             |
//! | `username`  | `AMT_USERNAME`                         |
//! | `password`  | `AMT_PASSWORD`                         |
//! | `cert_path` | `AMT_CERT`, then `LEGO_CERT_PATH`      |
//! | `key_path`  | `AMT_KEY`, then `LEGO_CERT_KEY_PATH`   |
//! | `pinned_cert` | `AMT_PINNED_CERT`                    |
//! | any boolean | `AMT_` + upper-cased name, e.g. `AMT_USE_TLS` |
//!
//! Booleans accept `1`, `t`, `true` and `0`, `f`, `false` in any case.
//!
//! The `LEGO_*` variables are the ones the `lego` ACME client exports to its
//! renewal hooks.

use crate::bundle::CredentialBundle;
use crate::error::Error;
use crate::prelude::debug;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

const HOST_ENV: &[&str] = &["AMT_HOST"];
const USERNAME_ENV: &[&str] = &["AMT_USERNAME"];
const PASSWORD_ENV: &[&str] = &["AMT_PASSWORD"];
const CERT_PATH_ENV: &[&str] = &["AMT_CERT", "LEGO_CERT_PATH"];
const KEY_PATH_ENV: &[&str] = &["AMT_KEY", "LEGO_CERT_KEY_PATH"];
const PINNED_CERT_ENV: &[&str] = &["AMT_PINNED_CERT"];
const USE_DIGEST_ENV: &[&str] = &["AMT_USE_DIGEST"];
const USE_TLS_ENV: &[&str] = &["AMT_USE_TLS"];
const SELF_SIGNED_ALLOWED_ENV: &[&str] = &["AMT_SELF_SIGNED_ALLOWED"];
const LOG_AMT_MESSAGES_ENV: &[&str] = &["AMT_LOG_AMT_MESSAGES"];
const IS_REDIRECTION_ENV: &[&str] = &["AMT_IS_REDIRECTION"];
const ALLOW_INSECURE_CIPHER_SUITES_ENV: &[&str] = &["AMT_ALLOW_INSECURE_CIPHER_SUITES"];

/// An error that may arise loading or validating a [`Config`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed reading config file {}", path.display())]
    Read {
        /// The configuration file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid JSON for [`Config`].
    #[error("failed parsing config")]
    Parse(#[from] serde_json::Error),

    /// A required setting is empty or missing.
    #[error("missing required setting '{0}'")]
    Missing(&'static str),

    /// A password was configured without a username.
    #[error("a password is set but no username")]
    PasswordWithoutUsername,

    /// An environment variable holds a value its setting cannot take.
    #[error("invalid value '{value}' for {name}, expected a boolean")]
    InvalidEnv {
        /// The variable.
        name: &'static str,
        /// Its value.
        value: String,
    },
}

/// Settings for one device and one local bundle.
#[derive(Clone, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Address of the device.
    pub host: String,
    /// User to authenticate as.
    pub username: String,
    /// Password of `username`.
    pub password: String,
    /// Use HTTP digest authentication.
    pub use_digest: bool,
    /// Connect over TLS.
    pub use_tls: bool,
    /// Accept a self-signed device certificate.
    pub self_signed_allowed: bool,
    /// Log every message exchanged with the device.
    pub log_amt_messages: bool,
    /// Connect to the redirection port instead of the management port.
    pub is_redirection: bool,
    /// Pin the device certificate to this SHA-256 fingerprint.
    pub pinned_cert: Option<String>,
    /// Allow cipher suites older devices need.
    pub allow_insecure_cipher_suites: bool,
    /// PEM certificate to install.
    pub cert_path: Option<PathBuf>,
    /// PEM PKCS#1 private key of the certificate.
    pub key_path: Option<PathBuf>,
}

/// The subset of a [`Config`] a store client needs to reach a device.
#[derive(Clone, Eq, PartialEq)]
pub struct ConnectionParams {
    /// Address of the device.
    pub target: String,
    /// User to authenticate as.
    pub username: String,
    /// Password of `username`.
    pub password: String,
    /// Use HTTP digest authentication.
    pub use_digest: bool,
    /// Connect over TLS.
    pub use_tls: bool,
    /// Accept a self-signed device certificate.
    pub self_signed_allowed: bool,
    /// Log every message exchanged with the device.
    pub log_messages: bool,
    /// Connect to the redirection port instead of the management port.
    pub is_redirection: bool,
    /// Pin the device certificate to this SHA-256 fingerprint.
    pub pinned_cert: Option<String>,
    /// Allow cipher suites older devices need.
    pub allow_insecure_cipher_suites: bool,
}

impl Config {
    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON or unknown settings.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it cannot be parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Reads a configuration file, applies environment overrides and validates
    /// the result.
    ///
    /// # Errors
    ///
    /// See [`Config::from_file`], [`Config::apply_env`] and [`Config::validate`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env()?;
        config.validate()?;
        debug!("Using config: {config:?}");
        Ok(config)
    }

    /// Applies overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] for a boolean variable that does
    /// not parse. The settings applied before it are kept.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Applies overrides looked up through `lookup`. Empty values are ignored.
    ///
    /// # Errors
    ///
    /// See [`Config::apply_env`].
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |names: &[&'static str]| {
            names.iter().find_map(|name| {
                lookup(name)
                    .filter(|value| !value.is_empty())
                    .map(|value| (*name, value))
            })
        };
        let flag = |names: &[&'static str], setting: &mut bool| -> Result<(), ConfigError> {
            if let Some((name, value)) = first(names) {
                *setting = parse_bool(&value).ok_or(ConfigError::InvalidEnv { name, value })?;
            }
            Ok(())
        };

        if let Some((_, host)) = first(HOST_ENV) {
            self.host = host;
        }
        if let Some((_, username)) = first(USERNAME_ENV) {
            self.username = username;
        }
        if let Some((_, password)) = first(PASSWORD_ENV) {
            self.password = password;
        }
        if let Some((_, cert_path)) = first(CERT_PATH_ENV) {
            self.cert_path = Some(PathBuf::from(cert_path));
        }
        if let Some((_, key_path)) = first(KEY_PATH_ENV) {
            self.key_path = Some(PathBuf::from(key_path));
        }
        if let Some((_, pinned_cert)) = first(PINNED_CERT_ENV) {
            self.pinned_cert = Some(pinned_cert);
        }

        flag(USE_DIGEST_ENV, &mut self.use_digest)?;
        flag(USE_TLS_ENV, &mut self.use_tls)?;
        flag(SELF_SIGNED_ALLOWED_ENV, &mut self.self_signed_allowed)?;
        flag(LOG_AMT_MESSAGES_ENV, &mut self.log_amt_messages)?;
        flag(IS_REDIRECTION_ENV, &mut self.is_redirection)?;
        flag(
            ALLOW_INSECURE_CIPHER_SUITES_ENV,
            &mut self.allow_insecure_cipher_suites,
        )?;
        Ok(())
    }

    /// Checks that every setting needed for a run is present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] naming the first missing setting, or
    /// [`ConfigError::PasswordWithoutUsername`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Missing("host"));
        }
        if !self.password.is_empty() && self.username.is_empty() {
            return Err(ConfigError::PasswordWithoutUsername);
        }
        self.cert_path()?;
        self.key_path()?;
        Ok(())
    }

    /// Returns the settings a store client needs to connect.
    pub fn connection(&self) -> ConnectionParams {
        ConnectionParams {
            target: self.host.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            use_digest: self.use_digest,
            use_tls: self.use_tls,
            self_signed_allowed: self.self_signed_allowed,
            log_messages: self.log_amt_messages,
            is_redirection: self.is_redirection,
            pinned_cert: self.pinned_cert.clone(),
            allow_insecure_cipher_suites: self.allow_insecure_cipher_suites,
        }
    }

    /// Loads the bundle named by `cert_path` and `key_path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a path is missing and [`Error::Bundle`] if
    /// the files cannot be loaded.
    pub fn load_bundle(&self) -> Result<CredentialBundle, Error> {
        Ok(CredentialBundle::load(self.cert_path()?, self.key_path()?)?)
    }

    fn cert_path(&self) -> Result<&Path, ConfigError> {
        non_empty_path(self.cert_path.as_deref()).ok_or(ConfigError::Missing("cert_path"))
    }

    fn key_path(&self) -> Result<&Path, ConfigError> {
        non_empty_path(self.key_path.as_deref()).ok_or(ConfigError::Missing("key_path"))
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" => Some(true),
        "0" | "f" | "false" => Some(false),
        _ => None,
    }
}

fn non_empty_path(path: Option<&Path>) -> Option<&Path> {
    path.filter(|p| !p.as_os_str().is_empty())
}

fn redacted(secret: &str) -> &'static str {
    if secret.is_empty() {
        ""
    } else {
        "<redacted>"
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &redacted(&self.password))
            .field("use_digest", &self.use_digest)
            .field("use_tls", &self.use_tls)
            .field("self_signed_allowed", &self.self_signed_allowed)
            .field("log_amt_messages", &self.log_amt_messages)
            .field("is_redirection", &self.is_redirection)
            .field("pinned_cert", &self.pinned_cert)
            .field(
                "allow_insecure_cipher_suites",
                &self.allow_insecure_cipher_suites,
            )
            .field("cert_path", &self.cert_path)
            .field("key_path", &self.key_path)
            .finish()
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("target", &self.target)
            .field("username", &self.username)
            .field("password", &redacted(&self.password))
            .field("use_digest", &self.use_digest)
            .field("use_tls", &self.use_tls)
            .field("self_signed_allowed", &self.self_signed_allowed)
            .field("log_messages", &self.log_messages)
            .field("is_redirection", &self.is_redirection)
            .field("pinned_cert", &self.pinned_cert)
            .field(
                "allow_insecure_cipher_suites",
                &self.allow_insecure_cipher_suites,
            )
            .finish()
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_from_json_with_defaults() {
        let config = Config::from_json(r#"{"host": "amt.example.org", "use_tls": true}"#).unwrap();

        assert_eq!(config.host, "amt.example.org");
        assert!(config.use_tls);
        assert!(!config.use_digest);
        assert_eq!(config.cert_path, None);
    }

    #[test]
    fn test_from_json_rejects_unknown_settings() {
        let result = Config::from_json(r#"{"hostname": "amt.example.org"}"#);
        assert!(matches!(result.unwrap_err(), ConfigError::Parse(..)));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = Config::from_json(
            r#"{"host": "old.example.org", "cert_path": "/etc/old.crt", "key_path": "/etc/old.key"}"#,
        )
        .unwrap();

        config.apply_env_from(lookup(&[
            ("AMT_HOST", "new.example.org"),
            ("LEGO_CERT_PATH", "/lego/new.crt"),
            ("AMT_KEY", ""),
        ]))
        .unwrap();

        assert_eq!(config.host, "new.example.org");
        assert_eq!(config.cert_path, Some(PathBuf::from("/lego/new.crt")));
        assert_eq!(config.key_path, Some(PathBuf::from("/etc/old.key")));
    }

    #[test]
    fn test_amt_variables_win_over_lego_variables() {
        let mut config = Config::default();
        config.apply_env_from(lookup(&[
            ("AMT_CERT", "/amt/cert.pem"),
            ("LEGO_CERT_PATH", "/lego/cert.pem"),
            ("LEGO_CERT_KEY_PATH", "/lego/key.pem"),
        ]))
        .unwrap();

        assert_eq!(config.cert_path, Some(PathBuf::from("/amt/cert.pem")));
        assert_eq!(config.key_path, Some(PathBuf::from("/lego/key.pem")));
    }

    #[test]
    fn test_env_overrides_every_setting() {
        let mut config = Config::from_json(
            r#"{"use_tls": true, "use_digest": false, "is_redirection": true}"#,
        )
        .unwrap();

        config
            .apply_env_from(lookup(&[
                ("AMT_USE_TLS", "false"),
                ("AMT_USE_DIGEST", "1"),
                ("AMT_SELF_SIGNED_ALLOWED", "TRUE"),
                ("AMT_LOG_AMT_MESSAGES", "t"),
                ("AMT_IS_REDIRECTION", "0"),
                ("AMT_ALLOW_INSECURE_CIPHER_SUITES", "True"),
                ("AMT_PINNED_CERT", "ab:cd:ef"),
            ]))
            .unwrap();

        assert!(!config.use_tls);
        assert!(config.use_digest);
        assert!(config.self_signed_allowed);
        assert!(config.log_amt_messages);
        assert!(!config.is_redirection);
        assert!(config.allow_insecure_cipher_suites);
        assert_eq!(config.pinned_cert.as_deref(), Some("ab:cd:ef"));
    }

    #[test]
    fn test_env_rejects_invalid_boolean() {
        let mut config = Config {
            use_tls: true,
            ..Config::default()
        };

        let error = config
            .apply_env_from(lookup(&[("AMT_USE_TLS", "nope")]))
            .unwrap_err();

        match error {
            ConfigError::InvalidEnv { name, value } => {
                assert_eq!(name, "AMT_USE_TLS");
                assert_eq!(value, "nope");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(config.use_tls);
    }

    #[test]
    fn test_empty_boolean_variable_is_ignored() {
        let mut config = Config {
            use_tls: true,
            ..Config::default()
        };

        config
            .apply_env_from(lookup(&[("AMT_USE_TLS", "")]))
            .unwrap();

        assert!(config.use_tls);
    }

    #[test]
    fn test_validate() {
        let mut config = Config {
            host: "amt.example.org".to_string(),
            cert_path: Some(PathBuf::from("cert.pem")),
            key_path: Some(PathBuf::from("key.pem")),
            ..Config::default()
        };
        config.validate().unwrap();

        config.password = "secret".to_string();
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::PasswordWithoutUsername
        ));

        config.username = "admin".to_string();
        config.key_path = None;
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::Missing("key_path")
        ));

        config.host.clear();
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::Missing("host")
        ));
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = Config {
            username: "admin".to_string(),
            password: "P@ssw0rd".to_string(),
            ..Config::default()
        };

        assert!(!format!("{config:?}").contains("P@ssw0rd"));
        assert!(!format!("{:?}", config.connection()).contains("P@ssw0rd"));
        assert_eq!(config.connection().password, "P@ssw0rd");
    }
}
