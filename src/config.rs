//! Configuration loading from environment variables.
//!
//! Two credential/amount profiles (mainnet and testnet) are read once at
//! startup and `USE_TESTNET` selects one. Loading never fails: missing or
//! malformed values fall back to empty defaults and are logged, so a coin
//! without a configured amount later shows up as a zero-quantity skip.

use rust_decimal::Decimal;
use secrecy::SecretString;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

const MAINNET_BASE_URL: &str = "https://api.bybit.com";
const TESTNET_BASE_URL: &str = "https://api-testnet.bybit.com";

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    /// Environment variable prefix for this network's profile.
    fn env_prefix(&self) -> &'static str {
        match self {
            Network::Mainnet => "MAINNET",
            Network::Testnet => "TESTNET",
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            Network::Mainnet => MAINNET_BASE_URL,
            Network::Testnet => TESTNET_BASE_URL,
        }
    }

    /// Wallet account type queried for balances unless overridden.
    pub fn default_account_type(&self) -> &'static str {
        match self {
            Network::Mainnet => "SPOT",
            Network::Testnet => "UNIFIED",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet => write!(f, "testnet"),
        }
    }
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// API credentials. The secret is redacted from `Debug` output.
#[derive(Debug)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: SecretString,
}

/// Ordered coin symbol → USD buy amount mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoinAmounts(Vec<(String, Decimal)>);

impl CoinAmounts {
    pub fn new(entries: Vec<(String, Decimal)>) -> Self {
        Self(entries)
    }

    /// Parse a JSON object such as `{"BTC": 50, "ETH": "25.5"}`.
    ///
    /// Anything other than an object yields an empty mapping; entries that
    /// are not numeric are dropped.
    pub fn from_json(raw: &str) -> Self {
        let value: serde_json::Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Coin list is not valid JSON, using an empty list");
                return Self::default();
            }
        };

        let Some(map) = value.as_object() else {
            warn!("Coin list is not a JSON object, using an empty list");
            return Self::default();
        };

        let entries = map
            .iter()
            .filter_map(|(coin, amount)| {
                let parsed = match amount {
                    serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
                    serde_json::Value::String(s) => Decimal::from_str(s.trim()).ok(),
                    _ => None,
                };
                if parsed.is_none() {
                    warn!(coin = %coin, amount = %amount, "Ignoring non-numeric coin amount");
                }
                parsed.map(|a| (coin.clone(), a))
            })
            .collect();

        Self(entries)
    }

    /// Configured amount for `coin`, zero when the coin is not listed.
    pub fn amount_for(&self, coin: &str) -> Decimal {
        self.0
            .iter()
            .find(|(c, _)| c == coin)
            .map(|(_, a)| *a)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.0.iter().map(|(c, a)| (c.as_str(), *a))
    }

    pub fn coins(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(c, _)| c.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One network's credentials and buy amounts.
#[derive(Debug)]
pub struct Profile {
    pub network: Network,
    pub credentials: Credentials,
    pub coins: CoinAmounts,
}

impl Profile {
    fn load<F>(network: Network, lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = network.env_prefix();
        let read = |suffix: &str| {
            let key = format!("{prefix}_{suffix}");
            lookup(key.as_str())
        };

        let api_key = read("API_KEY").unwrap_or_default();
        let api_secret = read("API_SECRET").unwrap_or_default();
        let coins = read("COIN_LIST")
            .map(|raw| CoinAmounts::from_json(&raw))
            .unwrap_or_default();

        Self {
            network,
            credentials: Credentials {
                api_key,
                api_secret: SecretString::new(api_secret),
            },
            coins,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig
// ---------------------------------------------------------------------------

/// Configuration for one invocation.
#[derive(Debug)]
pub struct AppConfig {
    /// The selected profile.
    pub profile: Profile,
    /// Wallet account type for balance queries.
    pub account_type: String,
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary key lookup.
    ///
    /// Both profiles are read; only the one selected by `USE_TESTNET`
    /// (exactly `"True"`) is kept.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mainnet = Profile::load(Network::Mainnet, &lookup);
        let testnet = Profile::load(Network::Testnet, &lookup);

        let use_testnet = lookup("USE_TESTNET").as_deref() == Some("True");
        let profile = if use_testnet { testnet } else { mainnet };

        if profile.credentials.api_key.is_empty() {
            warn!(network = %profile.network, "No API key configured, exchange calls will be rejected");
        }
        if profile.coins.is_empty() {
            warn!(network = %profile.network, "No coins configured");
        }

        let account_type = lookup("BYBIT_ACCOUNT_TYPE")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| profile.network.default_account_type().to_string());

        debug!(
            network = %profile.network,
            coins = profile.coins.len(),
            account_type = %account_type,
            "Configuration loaded"
        );

        Self {
            profile,
            account_type,
        }
    }
}
