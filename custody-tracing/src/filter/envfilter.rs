// std
use std::collections::BTreeMap;
// crates
use serde::{Deserialize, Serialize};
use tracing_subscriber::{filter::ParseError, EnvFilter};
// internal

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvFilterConfig {
    /// Target (crate or module path) to level, e.g. `key_management_system: debug`.
    /// More: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/filter/struct.EnvFilter.html#directives
    pub filters: BTreeMap<String, String>,
}

impl EnvFilterConfig {
    pub fn directives(&self) -> String {
        self.filters
            .iter()
            .map(|(target, level)| format!("{target}={level}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

pub fn create_envfilter_layer(config: &EnvFilterConfig) -> Result<EnvFilter, ParseError> {
    EnvFilter::try_new(config.directives())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_are_joined_per_target() {
        let config = EnvFilterConfig {
            filters: [
                ("key_management_system".to_owned(), "debug".to_owned()),
                ("custody_api".to_owned(), "info".to_owned()),
            ]
            .into(),
        };
        assert_eq!(
            config.directives(),
            "custody_api=info,key_management_system=debug"
        );
        assert!(create_envfilter_layer(&config).is_ok());
    }

    #[test]
    fn bad_level_is_rejected() {
        let config = EnvFilterConfig {
            filters: [("custody_api".to_owned(), "loud".to_owned())].into(),
        };
        assert!(create_envfilter_layer(&config).is_err());
    }
}
