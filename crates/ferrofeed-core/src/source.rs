use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Canonical provider identifiers used in logs and fetch reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Finnhub,
    Reddit,
    Llm,
}

impl ProviderId {
    pub const ALL: [Self; 3] = [Self::Finnhub, Self::Reddit, Self::Llm];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Finnhub => "finnhub",
            Self::Reddit => "reddit",
            Self::Llm => "llm",
        }
    }

    /// Retry-policy family the provider belongs to.
    pub const fn family(self) -> ProviderFamily {
        match self {
            Self::Finnhub => ProviderFamily::DataApi,
            Self::Reddit => ProviderFamily::Social,
            Self::Llm => ProviderFamily::Llm,
        }
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "finnhub" => Ok(Self::Finnhub),
            "reddit" => Ok(Self::Reddit),
            "llm" => Ok(Self::Llm),
            other => Err(ValidationError::InvalidSource {
                value: other.to_owned(),
            }),
        }
    }
}

/// Provider families sharing one retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderFamily {
    /// Generic HTTP/JSON market data APIs.
    DataApi,
    /// Social discussion APIs.
    Social,
    /// LLM completion SDK calls.
    Llm,
}

impl ProviderFamily {
    pub const ALL: [Self; 3] = [Self::DataApi, Self::Social, Self::Llm];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DataApi => "data_api",
            Self::Social => "social",
            Self::Llm => "llm",
        }
    }

    /// Upper-case token used in `FERROFEED_{FAMILY}_*` environment variables.
    pub const fn env_token(self) -> &'static str {
        match self {
            Self::DataApi => "DATA_API",
            Self::Social => "SOCIAL",
            Self::Llm => "LLM",
        }
    }
}

impl Display for ProviderFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
