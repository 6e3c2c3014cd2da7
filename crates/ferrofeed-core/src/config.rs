//! Environment configuration.
//!
//! [`FeedConfig`] is built once at startup and passed by value into the
//! adapters and orchestrator. Every knob has a default; a variable that is set
//! but unparseable is a [`ConfigError`] rather than a silent fallback.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `FERROFEED_{FAMILY}_TIMEOUT_SECONDS` | 10 / 15 / 60 |
//! | `FERROFEED_{FAMILY}_MAX_RETRIES` | 3 / 3 / 2 |
//! | `FERROFEED_{FAMILY}_BACKOFF_BASE_SECONDS` | 1.0 / 2.0 / 2.0 |
//! | `FERROFEED_{FAMILY}_BACKOFF_MULTIPLIER` | 2.0 |
//! | `FERROFEED_{FAMILY}_BACKOFF_JITTER_SECONDS` | 0.25 / 0.5 / 0.5 |
//! | `FERROFEED_FINNHUB_API_KEY` (or `FINNHUB_API_KEY`) | unset |
//! | `FERROFEED_FINNHUB_REQUESTS_PER_MINUTE` | 60 |
//! | `FERROFEED_REDDIT_TOKEN` (or `REDDIT_TOKEN`) | unset |
//! | `FERROFEED_REDDIT_COMMUNITY` | `stocks` |
//! | `FERROFEED_MAX_CONCURRENCY` | 4 |
//! | `FERROFEED_CYCLE_TIMEOUT_SECONDS` | unset |
//!
//! `{FAMILY}` is one of `DATA_API`, `SOCIAL`, `LLM`.

use std::str::FromStr;
use std::time::Duration;

use crate::orchestrator::OrchestratorConfig;
use crate::retry::RetryPolicy;
use crate::source::ProviderFamily;
use crate::ConfigError;

pub const FINNHUB_BASE_URL: &str = "https://finnhub.io/api/v1";
pub const REDDIT_OAUTH_BASE_URL: &str = "https://oauth.reddit.com";
pub const REDDIT_PUBLIC_BASE_URL: &str = "https://www.reddit.com";

/// Finnhub adapter settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FinnhubOptions {
    pub api_key: Option<String>,
    pub base_url: String,
    pub requests_per_minute: u32,
    /// Category requested from the market news endpoint.
    pub market_news_category: String,
    pub retry_policy: RetryPolicy,
}

impl Default for FinnhubOptions {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: String::from(FINNHUB_BASE_URL),
            requests_per_minute: 60,
            market_news_category: String::from("general"),
            retry_policy: RetryPolicy::default_for(ProviderFamily::DataApi),
        }
    }
}

/// Reddit adapter settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RedditOptions {
    /// OAuth bearer token; without one the public JSON endpoints are used.
    pub token: Option<String>,
    pub base_url: Option<String>,
    pub community: String,
    pub user_agent: String,
    pub limit: u32,
    pub retry_policy: RetryPolicy,
}

impl RedditOptions {
    pub fn effective_base_url(&self) -> &str {
        match (&self.base_url, &self.token) {
            (Some(base_url), _) => base_url,
            (None, Some(_)) => REDDIT_OAUTH_BASE_URL,
            (None, None) => REDDIT_PUBLIC_BASE_URL,
        }
    }
}

impl Default for RedditOptions {
    fn default() -> Self {
        Self {
            token: None,
            base_url: None,
            community: String::from("stocks"),
            user_agent: format!("ferrofeed/{}", env!("CARGO_PKG_VERSION")),
            limit: 100,
            retry_policy: RetryPolicy::default_for(ProviderFamily::Social),
        }
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    pub data_api: RetryPolicy,
    pub social: RetryPolicy,
    pub llm: RetryPolicy,
    pub finnhub: FinnhubOptions,
    pub reddit: RedditOptions,
    pub orchestrator: OrchestratorConfig,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            data_api: RetryPolicy::default_for(ProviderFamily::DataApi),
            social: RetryPolicy::default_for(ProviderFamily::Social),
            llm: RetryPolicy::default_for(ProviderFamily::Llm),
            finnhub: FinnhubOptions::default(),
            reddit: RedditOptions::default(),
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

impl FeedConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(&lookup);

        let data_api = env.policy(ProviderFamily::DataApi)?;
        let social = env.policy(ProviderFamily::Social)?;
        let llm = env.policy(ProviderFamily::Llm)?;

        let finnhub_defaults = FinnhubOptions::default();
        let finnhub = FinnhubOptions {
            api_key: env.first(&["FERROFEED_FINNHUB_API_KEY", "FINNHUB_API_KEY"]),
            requests_per_minute: env
                .parsed("FERROFEED_FINNHUB_REQUESTS_PER_MINUTE")?
                .unwrap_or(finnhub_defaults.requests_per_minute),
            retry_policy: data_api.clone(),
            ..finnhub_defaults
        };

        let reddit_defaults = RedditOptions::default();
        let reddit = RedditOptions {
            token: env.first(&["FERROFEED_REDDIT_TOKEN", "REDDIT_TOKEN"]),
            community: env
                .get("FERROFEED_REDDIT_COMMUNITY")
                .unwrap_or_else(|| reddit_defaults.community.clone()),
            retry_policy: social.clone(),
            ..reddit_defaults
        };

        let max_concurrency: usize = env
            .parsed("FERROFEED_MAX_CONCURRENCY")?
            .unwrap_or(crate::orchestrator::DEFAULT_MAX_CONCURRENCY);
        if max_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                name: String::from("FERROFEED_MAX_CONCURRENCY"),
                value: String::from("0"),
                reason: String::from("must be at least 1"),
            });
        }
        let cycle_timeout = env.seconds("FERROFEED_CYCLE_TIMEOUT_SECONDS")?;

        Ok(Self {
            data_api,
            social,
            llm,
            finnhub,
            reddit,
            orchestrator: OrchestratorConfig {
                max_concurrency,
                cycle_timeout,
            },
        })
    }

    pub fn policy_for(&self, family: ProviderFamily) -> &RetryPolicy {
        match family {
            ProviderFamily::DataApi => &self.data_api,
            ProviderFamily::Social => &self.social,
            ProviderFamily::Llm => &self.llm,
        }
    }
}

struct Lookup<'a, F>(&'a F);

impl<F> Lookup<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    }

    fn first(&self, names: &[&str]) -> Option<String> {
        names.iter().find_map(|name| self.get(name))
    }

    fn parsed<T>(&self, name: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let Some(raw) = self.get(name) else {
            return Ok(None);
        };
        raw.parse::<T>()
            .map(Some)
            .map_err(|error| ConfigError::InvalidValue {
                name: name.to_owned(),
                value: raw.clone(),
                reason: error.to_string(),
            })
    }

    fn seconds(&self, name: &str) -> Result<Option<Duration>, ConfigError> {
        let Some(seconds) = self.parsed::<f64>(name)? else {
            return Ok(None);
        };
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(ConfigError::InvalidValue {
                name: name.to_owned(),
                value: seconds.to_string(),
                reason: String::from("must be a finite, non-negative number of seconds"),
            });
        }
        Ok(Duration::try_from_secs_f64(seconds).ok())
    }

    fn policy(&self, family: ProviderFamily) -> Result<RetryPolicy, ConfigError> {
        let defaults = RetryPolicy::default_for(family);
        let var = |suffix: &str| format!("FERROFEED_{}_{suffix}", family.env_token());

        let timeout = self
            .seconds(&var("TIMEOUT_SECONDS"))?
            .unwrap_or(defaults.timeout());
        let max_retries = self
            .parsed::<u32>(&var("MAX_RETRIES"))?
            .unwrap_or(defaults.max_retries());
        let base = self
            .seconds(&var("BACKOFF_BASE_SECONDS"))?
            .unwrap_or(defaults.base());
        let multiplier = self
            .parsed::<f64>(&var("BACKOFF_MULTIPLIER"))?
            .unwrap_or(defaults.multiplier());
        let jitter = self
            .seconds(&var("BACKOFF_JITTER_SECONDS"))?
            .unwrap_or(defaults.jitter());

        Ok(RetryPolicy::new(timeout, max_retries, base, multiplier, jitter)?)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::ValidationError;

    fn config_from(pairs: &[(&str, &str)]) -> Result<FeedConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();
        FeedConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = config_from(&[]).expect("defaults");
        assert_eq!(config, FeedConfig::default());
        assert_eq!(config.data_api.timeout(), Duration::from_secs(10));
        assert_eq!(config.social.base(), Duration::from_secs(2));
        assert_eq!(config.llm.max_retries(), 2);
    }

    #[test]
    fn family_overrides_apply_to_that_family_only() {
        let config = config_from(&[
            ("FERROFEED_SOCIAL_MAX_RETRIES", "7"),
            ("FERROFEED_SOCIAL_BACKOFF_JITTER_SECONDS", "0"),
        ])
        .expect("valid");

        assert_eq!(config.social.max_retries(), 7);
        assert_eq!(config.social.jitter(), Duration::ZERO);
        assert_eq!(config.reddit.retry_policy, config.social);
        assert_eq!(config.data_api.max_retries(), 3);
    }

    #[test]
    fn credentials_fall_back_to_unprefixed_names() {
        let config = config_from(&[("FINNHUB_API_KEY", "abc"), ("REDDIT_TOKEN", " ")]).expect("valid");
        assert_eq!(config.finnhub.api_key.as_deref(), Some("abc"));
        assert_eq!(config.reddit.token, None);
        assert_eq!(config.reddit.effective_base_url(), REDDIT_PUBLIC_BASE_URL);
    }

    #[test]
    fn unparseable_value_is_an_error() {
        let err = config_from(&[("FERROFEED_DATA_API_MAX_RETRIES", "lots")]).expect_err("invalid");
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref name, .. } if name == "FERROFEED_DATA_API_MAX_RETRIES"
        ));
    }

    #[test]
    fn shrinking_multiplier_is_rejected() {
        let err = config_from(&[("FERROFEED_LLM_BACKOFF_MULTIPLIER", "0.5")]).expect_err("invalid");
        assert!(matches!(
            err,
            ConfigError::Validation(ValidationError::InvalidMultiplier { .. })
        ));
    }

    #[test]
    fn orchestrator_settings_are_read() {
        let config = config_from(&[
            ("FERROFEED_MAX_CONCURRENCY", "8"),
            ("FERROFEED_CYCLE_TIMEOUT_SECONDS", "30"),
        ])
        .expect("valid");
        assert_eq!(config.orchestrator.max_concurrency, 8);
        assert_eq!(config.orchestrator.cycle_timeout, Some(Duration::from_secs(30)));

        assert!(config_from(&[("FERROFEED_MAX_CONCURRENCY", "0")]).is_err());
    }
}
