use std::time::Duration;

use crate::dataservice::normalize_base_url;
use crate::error::RegistryError;
use crate::handler::DEFAULT_LOW_WATER_MARK;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub dataservice_api: Option<String>,
    pub dataservice_token: Option<String>,
    pub file_registry: Option<String>,
    pub slack_token: Option<String>,
    pub slack_channels: Vec<String>,
    pub low_water_mark: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, RegistryError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, RegistryError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let low_water_mark = match var("LOW_WATER_MARK_MS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|err| RegistryError::ConfigParse(format!("LOW_WATER_MARK_MS: {err}")))?,
            None => DEFAULT_LOW_WATER_MARK,
        };

        Ok(Self {
            dataservice_api: var("DATASERVICE_API").map(|url| normalize_base_url(&url)),
            dataservice_token: var("DATASERVICE_TOKEN"),
            file_registry: var("FILEREGISTRY"),
            slack_token: var("SLACK_SECRET"),
            slack_channels: var("SLACK_CHANNEL")
                .map(|raw| parse_channels(&raw))
                .unwrap_or_default(),
            low_water_mark,
        })
    }

    pub fn require_dataservice_api(&self) -> Result<&str, RegistryError> {
        self.dataservice_api
            .as_deref()
            .ok_or_else(|| RegistryError::MissingEnv("DATASERVICE_API".to_string()))
    }

    pub fn require_file_registry(&self) -> Result<&str, RegistryError> {
        self.file_registry
            .as_deref()
            .ok_or_else(|| RegistryError::MissingEnv("FILEREGISTRY".to_string()))
    }
}

fn parse_channels(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|channel| channel.trim().replace(['#', '@'], ""))
        .filter(|channel| !channel.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn resolve_minimal() {
        let config = Config::from_lookup(lookup(&[("DATASERVICE_API", "http://api.com")])).unwrap();
        assert_eq!(config.require_dataservice_api().unwrap(), "http://api.com/");
        assert_eq!(config.dataservice_token, None);
        assert_eq!(config.low_water_mark, DEFAULT_LOW_WATER_MARK);
        assert!(config.slack_channels.is_empty());
        assert_matches!(
            config.require_file_registry(),
            Err(RegistryError::MissingEnv(name)) if name == "FILEREGISTRY"
        );
    }

    #[test]
    fn resolve_full() {
        let config = Config::from_lookup(lookup(&[
            ("DATASERVICE_API", "http://api.com/"),
            ("DATASERVICE_TOKEN", "abc123"),
            ("FILEREGISTRY", "kf-file-registry"),
            ("SLACK_SECRET", "xoxb"),
            ("SLACK_CHANNEL", "#data-ops, @someone,"),
            ("LOW_WATER_MARK_MS", "500"),
        ]))
        .unwrap();
        assert_eq!(config.dataservice_token.as_deref(), Some("abc123"));
        assert_eq!(config.require_file_registry().unwrap(), "kf-file-registry");
        assert_eq!(config.slack_channels, vec!["data-ops", "someone"]);
        assert_eq!(config.low_water_mark, Duration::from_millis(500));
    }

    #[test]
    fn fanout_only_environment() {
        let config = Config::from_lookup(lookup(&[("FILEREGISTRY", "kf-file-registry")])).unwrap();
        assert_eq!(config.require_file_registry().unwrap(), "kf-file-registry");
        assert_eq!(config.dataservice_api, None);
        assert_matches!(
            config.require_dataservice_api(),
            Err(RegistryError::MissingEnv(name)) if name == "DATASERVICE_API"
        );
    }

    #[test]
    fn bad_low_water_mark() {
        let err = Config::from_lookup(lookup(&[
            ("DATASERVICE_API", "http://api.com"),
            ("LOW_WATER_MARK_MS", "soon"),
        ]))
        .unwrap_err();
        assert_matches!(err, RegistryError::ConfigParse(_));
    }
}
