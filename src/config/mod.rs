use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use log::{debug, trace};
use pingora::server::configuration::{Opt, ServerConf};
use pingora_error::{ErrorType::*, OrErr, Result};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

#[derive(Default, Debug, Serialize, Deserialize, Validate)]
pub struct Config {
    #[serde(default)]
    pub pingora: ServerConf,

    #[serde(default)]
    #[validate(nested)]
    pub oker: Oker,
}

// Config file load and validation
impl Config {
    pub fn load_from_yaml<P>(path: P) -> Result<Self>
    where
        P: AsRef<std::path::Path> + std::fmt::Display,
    {
        let conf_str = fs::read_to_string(&path).or_err_with(ReadError, || {
            format!("Unable to read conf file from {path}")
        })?;
        debug!("Conf file read from {path}");
        Self::from_yaml(&conf_str)
    }

    // config file load entry point
    pub fn load_yaml_with_opt_override(opt: &Opt) -> Result<Self> {
        let mut conf = match &opt.conf {
            Some(path) => Self::load_from_yaml(path)?,
            None => {
                debug!("No conf file specified, using built-in defaults");
                Self::default()
            }
        };
        conf.merge_with_opt(opt);
        Ok(conf)
    }

    pub fn from_yaml(conf_str: &str) -> Result<Self> {
        trace!("Read conf file: {conf_str}");
        let conf: Config = serde_yaml::from_str(conf_str).or_err_with(ReadError, || {
            format!("Unable to parse yaml conf {conf_str}")
        })?;

        trace!("Loaded conf: {conf:?}");

        conf.validate()
            .or_err_with(FileReadError, || "Conf file valid failed")?;

        Ok(conf)
    }

    #[allow(dead_code)]
    pub fn to_yaml(&self) -> String {
        serde_yaml::to_string(self).unwrap()
    }

    pub fn merge_with_opt(&mut self, opt: &Opt) {
        if opt.daemon {
            self.pingora.daemon = true;
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct Oker {
    #[serde(default = "Oker::default_listeners")]
    #[validate(length(min = 1))]
    #[validate(nested)]
    pub listeners: Vec<Listener>,

    #[serde(default)]
    #[validate(nested)]
    pub toolchain: Toolchain,

    #[serde(default)]
    pub workspace: Workspace,

    /// Largest accepted `/compile` request body, in bytes.
    #[serde(default = "Oker::default_max_body_bytes")]
    #[validate(range(min = 1))]
    pub max_body_bytes: usize,

    pub assets: Option<Assets>,
    pub status: Option<Status>,
    pub prometheus: Option<Prometheus>,
    pub log: Option<Log>,
}

impl Default for Oker {
    fn default() -> Self {
        Self {
            listeners: Self::default_listeners(),
            toolchain: Toolchain::default(),
            workspace: Workspace::default(),
            max_body_bytes: Self::default_max_body_bytes(),
            assets: None,
            status: None,
            prometheus: None,
            log: None,
        }
    }
}

impl Oker {
    fn default_listeners() -> Vec<Listener> {
        vec![Listener {
            address: SocketAddr::from(([0, 0, 0, 0], 5000)),
            tls: None,
            offer_h2: false,
        }]
    }

    fn default_max_body_bytes() -> usize {
        1024 * 1024
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = "Listener::validate_tls_for_offer_h2"))]
pub struct Listener {
    pub address: SocketAddr,
    pub tls: Option<Tls>,
    #[serde(default)]
    pub offer_h2: bool,
}

impl Listener {
    fn validate_tls_for_offer_h2(&self) -> Result<(), ValidationError> {
        if self.offer_h2 && self.tls.is_none() {
            Err(ValidationError::new("tls_required_for_h2"))
        } else {
            Ok(())
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tls {
    pub cert_path: String,
    pub key_path: String,
}

/// How the external compiler is invoked.
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct Toolchain {
    /// Compiler executable, resolved against `working_dir` when relative.
    #[serde(default = "Toolchain::default_binary")]
    #[validate(length(min = 1))]
    pub binary: String,

    /// Working directory of every invocation. Defaults to the directory
    /// holding the running executable.
    pub working_dir: Option<PathBuf>,

    #[serde(default = "Toolchain::default_timeout_secs")]
    #[validate(range(min = 1, max = 300))]
    pub timeout_secs: u64,

    /// Per-stream capture cap for stdout and stderr.
    #[serde(default = "Toolchain::default_max_output_bytes")]
    #[validate(range(min = 1))]
    pub max_output_bytes: usize,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            binary: Self::default_binary(),
            working_dir: None,
            timeout_secs: Self::default_timeout_secs(),
            max_output_bytes: Self::default_max_output_bytes(),
        }
    }
}

impl Toolchain {
    fn default_binary() -> String {
        "./oker".to_string()
    }

    fn default_timeout_secs() -> u64 {
        10
    }

    fn default_max_output_bytes() -> usize {
        1024 * 1024
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The configured working directory, or the installation root.
    pub fn resolved_working_dir(&self) -> PathBuf {
        if let Some(dir) = &self.working_dir {
            return dir.clone();
        }

        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Workspace {
    /// Directory receiving the per-request source files. Defaults to the OS temp dir.
    pub dir: Option<PathBuf>,
}

impl Workspace {
    /// Absolute, since the toolchain runs in a different working directory.
    pub fn resolved_dir(&self) -> PathBuf {
        let dir = self.dir.clone().unwrap_or_else(std::env::temp_dir);
        if dir.is_relative() {
            if let Ok(cwd) = std::env::current_dir() {
                return cwd.join(dir);
            }
        }
        dir
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Assets {
    pub root: PathBuf,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Status {
    pub address: SocketAddr,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Prometheus {
    pub address: SocketAddr,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Log {
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_log() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn not_a_test_i_cannot_write_yaml_by_hand() {
        init_log();
        let conf = Config::default();
        // cargo test -- --nocapture not_a_test_i_cannot_write_yaml_by_hand
        println!("{}", conf.to_yaml());
    }

    #[test]
    fn test_default_config() {
        init_log();
        let conf = Config::default();
        assert!(conf.validate().is_ok());
        assert_eq!(1, conf.oker.listeners.len());
        assert_eq!("0.0.0.0:5000", conf.oker.listeners[0].address.to_string());
        assert_eq!("./oker", conf.oker.toolchain.binary);
        assert_eq!(Duration::from_secs(10), conf.oker.toolchain.timeout());
        assert_eq!(1024 * 1024, conf.oker.toolchain.max_output_bytes);
        assert_eq!(1024 * 1024, conf.oker.max_body_bytes);
        assert!(conf.oker.status.is_none());
    }

    #[test]
    fn test_load_file() {
        init_log();
        let conf_str = r#"
---
pingora:
  version: 1
  threads: 2

oker:
  listeners:
    - address: 0.0.0.0:8080
    - address: "[::1]:8443"
      tls:
        cert_path: /etc/ssl/server.crt
        key_path: /etc/ssl/server.key
      offer_h2: true
  toolchain:
    binary: /opt/oker/bin/oker
    working_dir: /opt/oker
    timeout_secs: 5
    max_output_bytes: 4096
  workspace:
    dir: /var/tmp/oker
  max_body_bytes: 65536
  assets:
    root: /opt/oker/web
  status:
    address: 127.0.0.1:5001
  prometheus:
    address: 127.0.0.1:5002
  log:
    path: /var/log/oker-web.log
        "#
        .to_string();
        let conf = Config::from_yaml(&conf_str).unwrap();
        assert_eq!(1, conf.pingora.version);
        assert_eq!(2, conf.pingora.threads);
        assert_eq!(2, conf.oker.listeners.len());
        assert_eq!("/opt/oker/bin/oker", conf.oker.toolchain.binary);
        assert_eq!(
            PathBuf::from("/opt/oker"),
            conf.oker.toolchain.resolved_working_dir()
        );
        assert_eq!(Duration::from_secs(5), conf.oker.toolchain.timeout());
        assert_eq!(4096, conf.oker.toolchain.max_output_bytes);
        assert_eq!(
            PathBuf::from("/var/tmp/oker"),
            conf.oker.workspace.resolved_dir()
        );
        assert_eq!(65536, conf.oker.max_body_bytes);
        assert_eq!(
            PathBuf::from("/opt/oker/web"),
            conf.oker.assets.as_ref().unwrap().root
        );
        assert!(conf.oker.status.is_some());
        assert!(conf.oker.prometheus.is_some());
        assert_eq!("/var/log/oker-web.log", conf.oker.log.as_ref().unwrap().path);
        print!("{}", conf.to_yaml());
    }

    #[test]
    fn test_partial_sections_use_defaults() {
        init_log();
        let conf_str = r#"
---
oker:
  toolchain:
    timeout_secs: 3
        "#;
        let conf = Config::from_yaml(conf_str).unwrap();
        assert_eq!(1, conf.oker.listeners.len());
        assert_eq!("./oker", conf.oker.toolchain.binary);
        assert_eq!(3, conf.oker.toolchain.timeout_secs);
        assert_eq!(std::env::temp_dir(), conf.oker.workspace.resolved_dir());
    }

    #[test]
    fn test_default_working_dir_is_executable_dir() {
        let toolchain = Toolchain::default();
        let exe_dir = std::env::current_exe()
            .unwrap()
            .parent()
            .unwrap()
            .to_path_buf();
        assert_eq!(exe_dir, toolchain.resolved_working_dir());
    }

    #[test]
    fn test_valid_listeners_length() {
        init_log();
        let conf_str = r#"
---
oker:
  listeners: []
        "#;
        assert!(Config::from_yaml(conf_str).is_err());
    }

    #[test]
    fn test_valid_listeners_tls_for_offer_h2() {
        init_log();
        let conf_str = r#"
---
oker:
  listeners:
    - address: "[::1]:8080"
      offer_h2: true
        "#;
        assert!(Config::from_yaml(conf_str).is_err());
    }

    #[test]
    fn test_valid_toolchain_timeout_range() {
        init_log();
        for timeout in ["0", "301"] {
            let conf_str = format!(
                r#"
---
oker:
  toolchain:
    timeout_secs: {timeout}
        "#
            );
            match Config::from_yaml(&conf_str) {
                Ok(_) => panic!("Expected error for timeout_secs {timeout}"),
                Err(e) => eprintln!("Error: {:?}", e),
            }
        }
    }

    #[test]
    fn test_valid_toolchain_binary_not_empty() {
        init_log();
        let conf_str = r#"
---
oker:
  toolchain:
    binary: ""
        "#;
        assert!(Config::from_yaml(conf_str).is_err());
    }

    #[test]
    fn test_valid_max_body_bytes() {
        init_log();
        let conf_str = r#"
---
oker:
  max_body_bytes: 0
        "#;
        assert!(Config::from_yaml(conf_str).is_err());
    }

    #[test]
    fn test_invalid_yaml() {
        init_log();
        assert!(Config::from_yaml("oker: [unclosed").is_err());
    }
}
