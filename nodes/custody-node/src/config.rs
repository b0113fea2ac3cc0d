// std
use std::{net::SocketAddr, path::PathBuf};
// crates
use clap::{Parser, ValueEnum};
use color_eyre::eyre::{eyre, Result};
use custody_tracing::{logging::local::FileConfig, LoggerLayer, TracingSettings};
use key_management_system::HsmBackendSettings;
use serde::{Deserialize, Serialize};
use tracing::Level;
// internal
use crate::api::{http::AxumBackendSettings, rpc::RpcBackendSettings};

#[derive(ValueEnum, Clone, Debug, Default, PartialEq, Eq)]
pub enum LoggerLayerType {
    File,
    #[default]
    Stdout,
    Stderr,
    None,
}

#[derive(Parser, Debug, Clone, Default)]
pub struct LogArgs {
    /// Directory for the File backend
    #[clap(long = "log-dir", env = "LOG_DIR", required_if_eq("backend", "file"))]
    pub directory: Option<PathBuf>,

    /// Prefix for the File backend
    #[clap(long = "log-prefix", env = "LOG_PREFIX")]
    pub prefix: Option<PathBuf>,

    /// Backend type
    #[clap(long = "log-backend", env = "LOG_BACKEND", value_enum)]
    pub backend: Option<LoggerLayerType>,

    #[clap(long = "log-level", env = "LOG_LEVEL")]
    pub level: Option<String>,
}

#[derive(Parser, Debug, Clone, Default)]
pub struct HttpArgs {
    #[clap(long = "http-addr", env = "HTTP_ADDR")]
    pub http_addr: Option<SocketAddr>,

    #[clap(long = "http-cors-origin", env = "HTTP_CORS_ORIGIN")]
    pub cors_origins: Option<Vec<String>>,
}

#[derive(Parser, Debug, Clone, Default)]
pub struct RpcArgs {
    #[clap(long = "rpc-addr", env = "RPC_ADDR")]
    pub rpc_addr: Option<SocketAddr>,
}

/// Where an HSM backend's hardware session comes from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleConfig {
    /// In-process simulated token.
    Soft,
    Pkcs11 {
        library: PathBuf,
        #[serde(default)]
        slot: Option<u64>,
        pin: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsmConfig {
    pub module: ModuleConfig,
    #[serde(flatten)]
    pub settings: HsmBackendSettings,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    Software,
    Hsm(HsmConfig),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Routing tag. Defaults to the backend's own algorithm.
    #[serde(default)]
    pub algorithm: Option<String>,
    pub kind: BackendKind,
}

#[derive(Deserialize, Debug, Clone, Serialize)]
pub struct Config {
    #[serde(default)]
    pub tracing: TracingSettings,
    pub http: AxumBackendSettings,
    pub rpc: RpcBackendSettings,
    pub backends: Vec<BackendConfig>,
}

impl Config {
    pub fn update_from_args(
        mut self,
        log_args: LogArgs,
        http_args: HttpArgs,
        rpc_args: RpcArgs,
    ) -> Result<Self> {
        update_tracing(&mut self.tracing, log_args)?;
        update_http(&mut self.http, http_args)?;
        update_rpc(&mut self.rpc, rpc_args)?;
        Ok(self)
    }
}

pub fn update_tracing(tracing: &mut TracingSettings, tracing_args: LogArgs) -> Result<()> {
    let LogArgs {
        directory,
        prefix,
        backend,
        level,
    } = tracing_args;

    // Override the file config with the one from env variables.
    if let Some(backend) = backend {
        tracing.logger = match backend {
            LoggerLayerType::File => LoggerLayer::File(FileConfig {
                directory: directory.ok_or_else(|| eyre!("File backend requires a directory."))?,
                prefix,
            }),
            LoggerLayerType::Stdout => LoggerLayer::Stdout,
            LoggerLayerType::Stderr => LoggerLayer::Stderr,
            LoggerLayerType::None => LoggerLayer::None,
        }
    };

    if let Some(level) = level {
        tracing.level = level
            .parse::<Level>()
            .map_err(|_| eyre!("Invalid log level provided: {level}"))?;
    }
    Ok(())
}

pub fn update_http(http: &mut AxumBackendSettings, http_args: HttpArgs) -> Result<()> {
    let HttpArgs {
        http_addr,
        cors_origins,
    } = http_args;

    if let Some(addr) = http_addr {
        http.address = addr;
    }

    if let Some(cors) = cors_origins {
        http.cors_origins = cors;
    }

    Ok(())
}

pub fn update_rpc(rpc: &mut RpcBackendSettings, rpc_args: RpcArgs) -> Result<()> {
    if let Some(addr) = rpc_args.rpc_addr {
        rpc.address = addr;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use custody_tracing::FilterLayer;

    use super::*;

    const CONFIG: &str = r#"
tracing:
  logger: Stderr
  filter: None
  level: DEBUG
http:
  address: 127.0.0.1:4000
  cors_origins: []
rpc:
  address: 127.0.0.1:4001
backends:
  - kind: Software
  - algorithm: rsa
    kind: !Hsm
      module: Soft
      modulus_bits: 3072
  - algorithm: rsa-token
    kind: !Hsm
      module: !Pkcs11
        library: /usr/lib/softhsm/libsofthsm2.so
        pin: "1234"
      destroy_on_delete: true
"#;

    #[test]
    fn parses_config_file() {
        let config: Config = serde_yaml::from_str(CONFIG).unwrap();
        assert_eq!(config.tracing.logger, LoggerLayer::Stderr);
        assert_eq!(config.tracing.filter, FilterLayer::None);
        assert_eq!(config.tracing.level, Level::DEBUG);
        assert_eq!(config.http.address, "127.0.0.1:4000".parse().unwrap());
        assert_eq!(config.rpc.address, "127.0.0.1:4001".parse().unwrap());
        assert_eq!(
            config.backends,
            vec![
                BackendConfig {
                    algorithm: None,
                    kind: BackendKind::Software,
                },
                BackendConfig {
                    algorithm: Some("rsa".to_owned()),
                    kind: BackendKind::Hsm(HsmConfig {
                        module: ModuleConfig::Soft,
                        settings: HsmBackendSettings {
                            modulus_bits: 3072,
                            destroy_on_delete: false,
                        },
                    }),
                },
                BackendConfig {
                    algorithm: Some("rsa-token".to_owned()),
                    kind: BackendKind::Hsm(HsmConfig {
                        module: ModuleConfig::Pkcs11 {
                            library: PathBuf::from("/usr/lib/softhsm/libsofthsm2.so"),
                            slot: None,
                            pin: "1234".to_owned(),
                        },
                        settings: HsmBackendSettings {
                            modulus_bits: 2048,
                            destroy_on_delete: true,
                        },
                    }),
                },
            ]
        );
    }

    #[test]
    fn shipped_config_parses() {
        let config: Config = serde_yaml::from_str(include_str!("../config.yaml")).unwrap();
        assert_eq!(config.backends.len(), 2);
        assert!(matches!(config.tracing.filter, FilterLayer::EnvFilter(_)));
    }

    #[test]
    fn cli_overrides_apply() {
        let config: Config = serde_yaml::from_str(CONFIG).unwrap();
        let config = config
            .update_from_args(
                LogArgs {
                    directory: Some(PathBuf::from("/tmp/logs")),
                    prefix: None,
                    backend: Some(LoggerLayerType::File),
                    level: Some("WARN".to_owned()),
                },
                HttpArgs {
                    http_addr: Some("0.0.0.0:8080".parse().unwrap()),
                    cors_origins: Some(vec!["https://notary.example".to_owned()]),
                },
                RpcArgs {
                    rpc_addr: Some("0.0.0.0:7899".parse().unwrap()),
                },
            )
            .unwrap();
        assert_eq!(
            config.tracing.logger,
            LoggerLayer::File(FileConfig {
                directory: PathBuf::from("/tmp/logs"),
                prefix: None,
            })
        );
        assert_eq!(config.tracing.level, Level::WARN);
        assert_eq!(config.http.address, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.http.cors_origins, vec!["https://notary.example"]);
        assert_eq!(config.rpc.address, "0.0.0.0:7899".parse().unwrap());
    }

    #[test]
    fn invalid_overrides_are_rejected() {
        let mut tracing = TracingSettings::default();
        assert!(update_tracing(
            &mut tracing,
            LogArgs {
                backend: Some(LoggerLayerType::File),
                ..Default::default()
            }
        )
        .is_err());
        assert!(update_tracing(
            &mut tracing,
            LogArgs {
                level: Some("LOUD".to_owned()),
                ..Default::default()
            }
        )
        .is_err());
        assert_eq!(tracing, TracingSettings::default());
    }

    #[test]
    fn cli_parses_flags() {
        #[derive(Parser, Debug)]
        struct Cli {
            #[clap(flatten)]
            log: LogArgs,
            #[clap(flatten)]
            http: HttpArgs,
            #[clap(flatten)]
            rpc: RpcArgs,
        }

        let cli = Cli::try_parse_from([
            "custody-node",
            "--log-backend",
            "stderr",
            "--log-level",
            "INFO",
            "--http-addr",
            "127.0.0.1:9000",
            "--rpc-addr",
            "127.0.0.1:9001",
        ])
        .unwrap();
        assert_eq!(cli.log.backend, Some(LoggerLayerType::Stderr));
        assert_eq!(cli.http.http_addr, Some("127.0.0.1:9000".parse().unwrap()));
        assert_eq!(cli.rpc.rpc_addr, Some("127.0.0.1:9001".parse().unwrap()));

        assert!(Cli::try_parse_from(["custody-node", "--log-backend", "file"]).is_err());
    }
}
