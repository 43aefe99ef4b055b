//! Custody transaction preparation.
//!
//! Ties the Bitcoin pipeline together: gather fundable outputs, select and
//! reconcile inputs against the network fee, and assemble an unsigned PSBT
//! for the hardware signer, all under one caller-level timeout. Also exposes
//! the Stacks signature patcher for after the signer returns.

pub mod config;
pub mod error;
pub mod esplora;
pub mod logging;

use std::future::Future;

use bitcoin::psbt::Psbt;
use chain_btc::fee::FeeRate;
use chain_btc::gather::{gather_candidates, CandidateSet};
use chain_btc::reconcile::{FeeReconciler, VsizeFeeReconciler};
use chain_btc::selection::{SelectionOrchestrator, SelectionRequest, SelectionResult};
use chain_btc::source::{FeeRateSource, RawTransactionSource, UtxoSource};
use chain_btc::transaction::{
    build_mixed_psbt, build_segwit_psbt, build_taproot_psbt, OutputPlan, SchemeMap, SegwitSigner,
    TaprootSigner,
};
use chain_btc::utxo::{CoinSelector, LargestFirstSelector, Recipient, SpendableOutput};
use chain_stx::transaction::StacksTransaction;

pub use config::PrepConfig;
pub use error::PrepError;
pub use esplora::EsploraClient;
pub use logging::init_logging;

/// One payment to prepare.
#[derive(Debug, Clone)]
pub struct PrepareRequest {
    /// Address the inputs are gathered from; change returns here.
    pub funding_address: String,
    pub recipients: Vec<Recipient>,
    /// Caller override for the authoritative fee rate.
    pub fee_rate: Option<FeeRate>,
    /// Output that must be spent, typically an inscription being moved.
    pub pinned: Option<SpendableOutput>,
}

impl PrepareRequest {
    pub fn new(funding_address: impl Into<String>, recipients: Vec<Recipient>) -> Self {
        Self {
            funding_address: funding_address.into(),
            recipients,
            fee_rate: None,
            pinned: None,
        }
    }

    pub fn with_fee_rate(mut self, fee_rate: FeeRate) -> Self {
        self.fee_rate = Some(fee_rate);
        self
    }

    pub fn with_pinned(mut self, pinned: SpendableOutput) -> Self {
        self.pinned = Some(pinned);
        self
    }
}

/// An unsigned PSBT ready for the hardware signer.
#[derive(Debug, Clone)]
pub struct PreparedTransaction {
    pub psbt: Psbt,
    /// Inputs in PSBT order.
    pub selected: Vec<SpendableOutput>,
    pub fee_sat: u64,
    pub change_sat: u64,
    /// Whether the pinned output was one of the funding address's own
    /// unspent outputs.
    pub pinned_is_own_funds: bool,
}

/// Runs gather, selection and assembly against one chain client.
pub struct TransactionPreparer<C, S = LargestFirstSelector, R = VsizeFeeReconciler> {
    client: C,
    selector: S,
    reconciler: R,
    config: PrepConfig,
}

impl<C> TransactionPreparer<C>
where
    C: UtxoSource + FeeRateSource + RawTransactionSource,
{
    /// Largest-first selection, reconciled at the configured fee tier.
    pub fn new(client: C, config: PrepConfig) -> Self {
        let reconciler = VsizeFeeReconciler::new(config.fee_tier);
        Self::with_strategies(client, LargestFirstSelector, reconciler, config)
    }
}

impl<C, S, R> TransactionPreparer<C, S, R>
where
    C: UtxoSource + FeeRateSource + RawTransactionSource,
    S: CoinSelector,
    R: FeeReconciler,
{
    pub fn with_strategies(client: C, selector: S, reconciler: R, config: PrepConfig) -> Self {
        Self {
            client,
            selector,
            reconciler,
            config,
        }
    }

    pub fn config(&self) -> &PrepConfig {
        &self.config
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Every input comes from the nested-segwit funding address.
    pub async fn prepare_segwit(
        &self,
        request: &PrepareRequest,
        signer: &SegwitSigner,
    ) -> Result<PreparedTransaction, PrepError> {
        self.with_timeout(async {
            let (candidates, selection) = self.select(request).await?;
            let psbt = build_segwit_psbt(
                &self.client,
                &selection.selected,
                signer,
                &self.output_plan(request, &selection),
            )
            .await?;
            Ok(self.finish("segwit", psbt, selection, &candidates))
        })
        .await
    }

    /// Every input comes from the taproot funding address.
    pub async fn prepare_taproot(
        &self,
        request: &PrepareRequest,
        signer: &TaprootSigner,
    ) -> Result<PreparedTransaction, PrepError> {
        self.with_timeout(async {
            let (candidates, selection) = self.select(request).await?;
            let psbt = build_taproot_psbt(
                &selection.selected,
                signer,
                &self.output_plan(request, &selection),
            )?;
            Ok(self.finish("taproot", psbt, selection, &candidates))
        })
        .await
    }

    /// Funding comes from the segwit address and the pinned output may sit
    /// on the taproot one; `schemes` routes each input.
    pub async fn prepare_mixed(
        &self,
        request: &PrepareRequest,
        schemes: &SchemeMap,
        segwit: &SegwitSigner,
        taproot: &TaprootSigner,
    ) -> Result<PreparedTransaction, PrepError> {
        self.with_timeout(async {
            let (candidates, selection) = self.select(request).await?;
            let psbt = build_mixed_psbt(
                &self.client,
                &selection.selected,
                schemes,
                segwit,
                taproot,
                &self.output_plan(request, &selection),
            )
            .await?;
            Ok(self.finish("mixed", psbt, selection, &candidates))
        })
        .await
    }

    async fn with_timeout<T>(
        &self,
        fut: impl Future<Output = Result<T, PrepError>>,
    ) -> Result<T, PrepError> {
        let limit = self.config.request_timeout;
        tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| PrepError::Timeout(limit))?
    }

    async fn select(
        &self,
        request: &PrepareRequest,
    ) -> Result<(CandidateSet, SelectionResult), PrepError> {
        let network = self.config.network;
        let candidates = gather_candidates(
            &self.client,
            network,
            &request.funding_address,
            request.pinned.as_ref(),
        )
        .await?;

        let orchestrator = SelectionOrchestrator::new(&self.client, &self.selector, &self.reconciler);
        let selection = orchestrator
            .select(&SelectionRequest {
                candidates: &candidates.fundable,
                recipients: &request.recipients,
                fee_rate_override: request.fee_rate,
                provisional_fee_rate: self.config.provisional_fee_rate,
                funding_address: &request.funding_address,
                network,
                pinned: request.pinned.as_ref(),
            })
            .await?;
        Ok((candidates, selection))
    }

    fn output_plan<'a>(
        &self,
        request: &'a PrepareRequest,
        selection: &SelectionResult,
    ) -> OutputPlan<'a> {
        OutputPlan {
            recipients: &request.recipients,
            change_address: &request.funding_address,
            change_sat: selection.change_sat,
            network: self.config.network,
        }
    }

    fn finish(
        &self,
        variant: &str,
        psbt: Psbt,
        selection: SelectionResult,
        candidates: &CandidateSet,
    ) -> PreparedTransaction {
        log::info!(
            "prepared {variant} psbt: {} inputs, {} outputs, fee {} sat, change {} sat",
            psbt.inputs.len(),
            psbt.outputs.len(),
            selection.fee_sat,
            selection.change_sat
        );
        PreparedTransaction {
            psbt,
            selected: selection.selected,
            fee_sat: selection.fee_sat,
            change_sat: selection.change_sat,
            pinned_is_own_funds: candidates.pinned_is_own_funds,
        }
    }
}

/// Patch a hardware-signer signature into a serialized Stacks transaction.
///
/// Both arguments are hex, with or without a `0x` prefix.
pub fn apply_stx_signature(
    raw_tx_hex: &str,
    signature_hex: &str,
) -> Result<StacksTransaction, PrepError> {
    let tx = StacksTransaction::from_hex(raw_tx_hex)?;
    let signature = chain_stx::signature::encode_signature_hex(signature_hex)?;
    Ok(chain_stx::signature::patch_signature(tx, signature))
}
