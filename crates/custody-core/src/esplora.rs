//! HTTP retrieval against an Esplora API and an ordinals indexer.

use std::collections::HashMap;

use chain_btc::error::BtcError;
use chain_btc::fee::{FeeRate, FeeRateTiers};
use chain_btc::network::BtcNetwork;
use chain_btc::source::{FeeRateSource, RawTransactionSource, UtxoSource};
use chain_btc::utxo::SpendableOutput;
use serde::Deserialize;

use crate::config::PrepConfig;

/// Confirmation targets Esplora reports, in ascending order.
const ESPLORA_TARGETS: [u32; 28] = [
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 144,
    504, 1008,
];

const FAST_TARGET: u32 = 1;
const REGULAR_TARGET: u32 = 3;
const SLOW_TARGET: u32 = 6;

/// Page size for the inscriptions listing (the indexer's maximum).
const INSCRIPTION_PAGE_LIMIT: usize = 60;

/// Entry of `GET /address/{address}/utxo`.
#[derive(Debug, Deserialize)]
struct EsploraUtxo {
    txid: String,
    vout: u32,
    value: u64,
}

/// One page of `GET /inscriptions?address=`.
#[derive(Debug, Deserialize)]
struct InscriptionPage {
    total: usize,
    results: Vec<Inscription>,
}

#[derive(Debug, Deserialize)]
struct Inscription {
    /// `txid:vout` of the output holding the inscription.
    output: String,
    /// Output value in satoshis, as a decimal string.
    value: String,
}

/// Pick the rate for `target`, falling back to the next higher target that
/// has an estimate.
fn rate_for_target(estimates: &HashMap<String, f64>, target: u32) -> Option<f64> {
    ESPLORA_TARGETS
        .iter()
        .filter(|t| **t >= target)
        .find_map(|t| estimates.get(&t.to_string()).copied())
}

/// Tiers from an Esplora `/fee-estimates` map: fast is the 1-block target,
/// regular 3 blocks, slow 6 blocks.
pub fn tiers_from_estimates(estimates: &HashMap<String, f64>) -> Result<FeeRateTiers, BtcError> {
    let tier = |target: u32| -> Result<FeeRate, BtcError> {
        let rate = rate_for_target(estimates, target).ok_or_else(|| {
            BtcError::UpstreamRetrieval(format!("no fee estimate for {target} blocks or later"))
        })?;
        FeeRate::from_sat_per_vb(rate).map_err(|e| BtcError::UpstreamRetrieval(e.to_string()))
    };
    Ok(FeeRateTiers {
        fast: tier(FAST_TARGET)?,
        regular: tier(REGULAR_TARGET)?,
        slow: tier(SLOW_TARGET)?,
    })
}

/// Offset of the next inscriptions page, or `None` once the listing is
/// exhausted. An empty page always ends the listing.
fn next_page_offset(offset: usize, page: &InscriptionPage) -> Option<usize> {
    let next = offset + page.results.len();
    (!page.results.is_empty() && next < page.total).then_some(next)
}

/// Decode a `/tx/{txid}/hex` body.
fn decode_raw_transaction(url: &str, body: &str) -> Result<Vec<u8>, BtcError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(BtcError::UpstreamRetrieval(format!("GET {url}: empty body")));
    }
    hex::decode(body).map_err(|e| BtcError::UpstreamRetrieval(format!("GET {url}: invalid hex: {e}")))
}

fn parse_inscription(inscription: &Inscription, address: &str) -> Result<SpendableOutput, BtcError> {
    let malformed = || BtcError::UpstreamRetrieval(format!("malformed inscription output {:?}", inscription.output));
    let (txid, vout) = inscription.output.rsplit_once(':').ok_or_else(malformed)?;
    let vout: u32 = vout.parse().map_err(|_| malformed())?;
    let value: u64 = inscription.value.parse().map_err(|_| malformed())?;
    Ok(SpendableOutput::new(txid, vout, value, address))
}

/// Esplora + ordinals client implementing the retrieval traits.
pub struct EsploraClient {
    client: reqwest::Client,
    base_url: String,
    ordinals_url: Option<String>,
}

impl EsploraClient {
    pub fn new(base_url: impl Into<String>, ordinals_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ordinals_url: ordinals_url.map(|u| u.trim_end_matches('/').to_string()),
        }
    }

    pub fn from_config(config: &PrepConfig) -> Self {
        Self::new(config.esplora_url.clone(), config.ordinals_api_url.clone())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, BtcError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BtcError::UpstreamRetrieval(format!("GET {url}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(BtcError::UpstreamRetrieval(format!("GET {url}: HTTP {status}")));
        }
        Ok(response)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, BtcError> {
        self.get(url)
            .await?
            .json()
            .await
            .map_err(|e| BtcError::UpstreamRetrieval(format!("GET {url}: bad response body: {e}")))
    }
}

impl UtxoSource for EsploraClient {
    async fn fetch_unspent_outputs(&self, address: &str) -> Result<Vec<SpendableOutput>, BtcError> {
        let url = format!("{}/address/{address}/utxo", self.base_url);
        let utxos: Vec<EsploraUtxo> = self.get_json(&url).await?;
        log::debug!("{} unspent outputs for {address}", utxos.len());
        Ok(utxos
            .into_iter()
            .map(|u| SpendableOutput::new(u.txid, u.vout, u.value, address))
            .collect())
    }

    async fn fetch_payload_marked_outputs(
        &self,
        network: BtcNetwork,
        address: &str,
    ) -> Result<Vec<SpendableOutput>, BtcError> {
        let Some(ordinals_url) = &self.ordinals_url else {
            log::debug!("no ordinals indexer on {network}, treating no outputs as inscribed");
            return Ok(Vec::new());
        };

        let mut marked = Vec::new();
        let mut offset = 0;
        loop {
            let url = format!(
                "{ordinals_url}/inscriptions?address={address}&offset={offset}&limit={INSCRIPTION_PAGE_LIMIT}"
            );
            let page: InscriptionPage = self.get_json(&url).await?;
            for inscription in &page.results {
                marked.push(parse_inscription(inscription, address)?);
            }
            match next_page_offset(offset, &page) {
                Some(next) => offset = next,
                None => break,
            }
        }
        log::debug!("{} inscribed outputs for {address}", marked.len());
        Ok(marked)
    }
}

impl FeeRateSource for EsploraClient {
    async fn fetch_fee_rate_tiers(&self, network: BtcNetwork) -> Result<FeeRateTiers, BtcError> {
        let url = format!("{}/fee-estimates", self.base_url);
        let estimates: HashMap<String, f64> = self.get_json(&url).await?;
        let tiers = tiers_from_estimates(&estimates)?;
        log::debug!(
            "{network} fee tiers: slow {}, regular {}, fast {}",
            tiers.slow,
            tiers.regular,
            tiers.fast
        );
        Ok(tiers)
    }
}

impl RawTransactionSource for EsploraClient {
    async fn fetch_raw_transaction(&self, txid: &str) -> Result<Vec<u8>, BtcError> {
        let url = format!("{}/tx/{txid}/hex", self.base_url);
        let body = self
            .get(&url)
            .await?
            .text()
            .await
            .map_err(|e| BtcError::UpstreamRetrieval(format!("GET {url}: {e}")))?;
        decode_raw_transaction(&url, &body)
    }
}
