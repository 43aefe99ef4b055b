//! Preparation settings loaded from the environment.
//!
//! | Variable               | Default                                   |
//! |------------------------|-------------------------------------------|
//! | `BTC_NETWORK`          | `testnet`                                 |
//! | `ESPLORA_URL`          | per-network Esplora endpoint              |
//! | `ORDINALS_API_URL`     | Hiro ordinals API on mainnet, else unset  |
//! | `PROVISIONAL_FEE_RATE` | `10` sat/vB                               |
//! | `FEE_TIER`             | `regular`                                 |
//! | `PREPARE_TIMEOUT_SECS` | `30`                                      |

use std::env;
use std::time::Duration;

use chain_btc::fee::{FeeRate, FeeTier};
use chain_btc::network::BtcNetwork;

use crate::error::PrepError;

/// Hiro's ordinals indexer. Mainnet only.
pub const HIRO_ORDINALS_API: &str = "https://api.hiro.so/ordinals/v1";

/// Placeholder rate for the provisional selection pass.
pub const DEFAULT_PROVISIONAL_FEE_RATE: FeeRate = FeeRate::from_sat_per_vb_const(10);

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct PrepConfig {
    pub network: BtcNetwork,
    /// Esplora API base URL, without a trailing slash.
    pub esplora_url: String,
    /// Ordinals indexer base URL. Without one no outputs are treated as
    /// payload-marked.
    pub ordinals_api_url: Option<String>,
    pub provisional_fee_rate: FeeRate,
    /// Which fetched tier pays for the transaction.
    pub fee_tier: FeeTier,
    /// Upper bound on one whole preparation call.
    pub request_timeout: Duration,
}

impl PrepConfig {
    /// Defaults for `network`.
    pub fn for_network(network: BtcNetwork) -> Self {
        Self {
            network,
            esplora_url: network.default_rpc_url().to_string(),
            ordinals_api_url: default_ordinals_url(network).map(str::to_string),
            provisional_fee_rate: DEFAULT_PROVISIONAL_FEE_RATE,
            fee_tier: FeeTier::default(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, PrepError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PrepError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let network = match var("BTC_NETWORK") {
            None => BtcNetwork::Testnet,
            Some(value) => value.parse().unwrap_or_else(|_| {
                log::warn!("unknown BTC_NETWORK {value:?}, defaulting to testnet");
                BtcNetwork::Testnet
            }),
        };
        let mut config = Self::for_network(network);

        if let Some(url) = var("ESPLORA_URL") {
            config.esplora_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = var("ORDINALS_API_URL") {
            config.ordinals_api_url = Some(url.trim_end_matches('/').to_string());
        }
        if let Some(rate) = var("PROVISIONAL_FEE_RATE") {
            config.provisional_fee_rate = rate
                .parse()
                .map_err(|e| PrepError::InvalidConfig(format!("PROVISIONAL_FEE_RATE: {e}")))?;
        }
        if let Some(tier) = var("FEE_TIER") {
            config.fee_tier = tier
                .parse()
                .map_err(|e| PrepError::InvalidConfig(format!("FEE_TIER: {e}")))?;
        }
        if let Some(secs) = var("PREPARE_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|_| PrepError::InvalidConfig(format!("PREPARE_TIMEOUT_SECS: not a number: {secs:?}")))?;
            if secs == 0 {
                return Err(PrepError::InvalidConfig(
                    "PREPARE_TIMEOUT_SECS must be positive".into(),
                ));
            }
            config.request_timeout = Duration::from_secs(secs);
        }

        log::info!(
            "network {}, esplora {}, ordinals {}",
            config.network,
            config.esplora_url,
            config.ordinals_api_url.as_deref().unwrap_or("disabled")
        );
        Ok(config)
    }
}

impl Default for PrepConfig {
    fn default() -> Self {
        Self::for_network(BtcNetwork::Testnet)
    }
}

fn default_ordinals_url(network: BtcNetwork) -> Option<&'static str> {
    match network {
        BtcNetwork::Mainnet => Some(HIRO_ORDINALS_API),
        _ => None,
    }
}
