//! Logging setup for the custody signer.

// crates
use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt};
// internal
use crate::{
    filter::envfilter::{create_envfilter_layer, EnvFilterConfig},
    logging::local::{create_file_layer, create_writer_layer, FileConfig},
};

pub mod filter {
    pub mod envfilter;
}
pub mod logging {
    pub mod local;
}
pub mod panic;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoggerLayer {
    File(FileConfig),
    Stdout,
    Stderr,
    // do not collect logs
    None,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterLayer {
    EnvFilter(EnvFilterConfig),
    None,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracingSettings {
    pub logger: LoggerLayer,
    pub filter: FilterLayer,
    #[serde(with = "serde_level")]
    pub level: Level,
}

impl Default for TracingSettings {
    fn default() -> Self {
        Self {
            logger: LoggerLayer::Stdout,
            filter: FilterLayer::None,
            level: Level::INFO,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TracingError {
    #[error("Invalid filter directives: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),
    #[error("Global subscriber could not be installed: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Keeps buffered log writers alive. Dropping it flushes pending output, so
/// hold it until the process is about to exit.
#[must_use]
pub struct LoggingGuard {
    _writer: Option<WorkerGuard>,
}

/// Installs the global subscriber and the panic hook.
pub fn init(settings: TracingSettings) -> Result<LoggingGuard, TracingError> {
    let mut layers: Vec<Box<dyn tracing_subscriber::Layer<_> + Send + Sync>> = vec![];

    let (logger_layer, writer_guard): (
        Box<dyn tracing_subscriber::Layer<_> + Send + Sync>,
        Option<WorkerGuard>,
    ) = match settings.logger {
        LoggerLayer::File(config) => {
            let (layer, guard) = create_file_layer(config);
            (Box::new(layer), Some(guard))
        }
        LoggerLayer::Stdout => {
            let (layer, guard) = create_writer_layer(std::io::stdout());
            (Box::new(layer), Some(guard))
        }
        LoggerLayer::Stderr => {
            let (layer, guard) = create_writer_layer(std::io::stderr());
            (Box::new(layer), Some(guard))
        }
        LoggerLayer::None => (Box::new(tracing_subscriber::layer::Identity::new()), None),
    };
    layers.push(logger_layer);

    if let FilterLayer::EnvFilter(config) = &settings.filter {
        layers.push(Box::new(create_envfilter_layer(config)?));
    }

    tracing_subscriber::registry()
        .with(LevelFilter::from(settings.level))
        .with(layers)
        .try_init()?;

    std::panic::set_hook(Box::new(panic::panic_hook));

    Ok(LoggingGuard {
        _writer: writer_guard,
    })
}

mod serde_level {
    use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

    use super::Level;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        <String>::deserialize(deserializer).and_then(|v| {
            v.parse()
                .map_err(|e| D::Error::custom(format!("invalid log level {e}")))
        })
    }

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S>(value: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.as_str().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn settings_from_yaml() {
        let settings: TracingSettings = serde_yaml::from_str(
            r#"
logger: !File
  directory: /var/log/custody
  prefix: signer.log
filter: !EnvFilter
  filters:
    key_management_system: debug
level: WARN
"#,
        )
        .unwrap();
        assert_eq!(
            settings.logger,
            LoggerLayer::File(FileConfig {
                directory: PathBuf::from("/var/log/custody"),
                prefix: Some(PathBuf::from("signer.log")),
            })
        );
        assert_eq!(settings.level, Level::WARN);
        let FilterLayer::EnvFilter(filter) = settings.filter else {
            panic!("expected an env filter");
        };
        assert_eq!(filter.directives(), "key_management_system=debug");
    }

    #[test]
    fn level_round_trips_as_text() {
        let yaml = serde_yaml::to_string(&TracingSettings::default()).unwrap();
        assert!(yaml.contains("level: INFO"));
        assert!(serde_yaml::from_str::<TracingSettings>("logger: None\nfilter: None\nlevel: chatty\n").is_err());
    }

    #[test]
    fn bad_filter_fails_init_before_installing() {
        let settings = TracingSettings {
            logger: LoggerLayer::None,
            filter: FilterLayer::EnvFilter(EnvFilterConfig {
                filters: [("custody_api".to_owned(), "loud".to_owned())].into(),
            }),
            level: Level::INFO,
        };
        assert!(matches!(init(settings), Err(TracingError::Filter(_))));
    }
}
