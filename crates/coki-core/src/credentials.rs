//! API key selection.
//!
//! The front end owns the actual prompt; the core only asks whether a key is
//! available and requests that the host open its selection flow.

use crate::config::Config;

/// Environment variables checked for a key, in order
pub const KEY_ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

/// Host hook used before privileged calls
pub trait KeySelector {
    fn has_selected_key(&self) -> bool;

    /// Ask the host to start its key selection flow
    fn open_select_key(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Env,
    Config,
    Prompt,
}

impl KeySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeySource::Env => "env",
            KeySource::Config => "config",
            KeySource::Prompt => "entered",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedKey {
    pub key: String,
    pub source: KeySource,
}

/// Env vars first, then the config file
pub fn resolve_api_key(config: &Config) -> Option<ResolvedKey> {
    resolve_with(|name| std::env::var(name).ok(), config)
}

fn resolve_with(env: impl Fn(&str) -> Option<String>, config: &Config) -> Option<ResolvedKey> {
    KEY_ENV_VARS
        .iter()
        .filter_map(|name| env(name))
        .find(|key| !key.trim().is_empty())
        .map(|key| ResolvedKey {
            key,
            source: KeySource::Env,
        })
        .or_else(|| {
            config
                .api_key
                .clone()
                .filter(|key| !key.trim().is_empty())
                .map(|key| ResolvedKey {
                    key,
                    source: KeySource::Config,
                })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_key(key: Option<&str>) -> Config {
        Config {
            api_key: key.map(str::to_string),
            ..Config::new()
        }
    }

    #[test]
    fn test_env_wins_over_config() {
        let resolved = resolve_with(
            |name| (name == "API_KEY").then(|| "from-env".to_string()),
            &config_with_key(Some("from-config")),
        )
        .unwrap();
        assert_eq!(resolved.key, "from-env");
        assert_eq!(resolved.source, KeySource::Env);
    }

    #[test]
    fn test_falls_back_to_config() {
        let resolved = resolve_with(|_| None, &config_with_key(Some("from-config"))).unwrap();
        assert_eq!(resolved.source, KeySource::Config);
    }

    #[test]
    fn test_blank_keys_are_missing() {
        let resolved = resolve_with(|_| Some(" ".to_string()), &config_with_key(Some("")));
        assert!(resolved.is_none());
    }
}
