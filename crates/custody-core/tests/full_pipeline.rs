//! Cross-crate tests for the full preparation pipeline:
//! gather -> provisional selection -> fee reconciliation -> PSBT assembly.
//!
//! The chain is an in-memory mock; addresses and parent transactions are
//! derived from fixed keys so every fixture is a valid network object.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};
use chain_btc::error::BtcError;
use chain_btc::fee::{FeeRate, FeeRateTiers};
use chain_btc::network::BtcNetwork;
use chain_btc::source::{FeeRateSource, RawTransactionSource, UtxoSource};
use chain_btc::transaction::{SchemeMap, SegwitSigner, TaprootSigner, INPUT_SEQUENCE};
use chain_btc::utxo::{Recipient, SpendableOutput};
use custody_core::{apply_stx_signature, PrepConfig, PrepareRequest, TransactionPreparer};

// ─── Fixtures ──────────────────────────────────────────────────────

fn pubkey(byte: u8) -> PublicKey {
    let secp = Secp256k1::new();
    PublicKey::from_secret_key(&secp, &SecretKey::from_slice(&[byte; 32]).unwrap())
}

fn segwit_signer() -> SegwitSigner {
    SegwitSigner::new(
        pubkey(0x11),
        [0x0c, 0x0f, 0xfe, 0xe0].into(),
        "m/49'/1'/0'/0/0".parse().unwrap(),
        BtcNetwork::Testnet,
    )
}

fn taproot_signer() -> TaprootSigner {
    let (xonly, _) = pubkey(0x22).x_only_public_key();
    TaprootSigner::new(
        xonly,
        [0x0c, 0x0f, 0xfe, 0xe0].into(),
        "m/86'/1'/0'/0/0".parse().unwrap(),
        BtcNetwork::Testnet,
    )
}

fn recipient_address() -> String {
    let (xonly, _) = pubkey(0x33).x_only_public_key();
    chain_btc::address::taproot_address(xonly, BtcNetwork::Testnet).to_string()
}

fn parent_tx(tag: u8, values: &[u64], script: &ScriptBuf) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::new(Txid::from_byte_array([tag; 32]), 0),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::default(),
        }],
        output: values
            .iter()
            .map(|v| TxOut {
                value: Amount::from_sat(*v),
                script_pubkey: script.clone(),
            })
            .collect(),
    }
}

fn rate(value: f64) -> FeeRate {
    FeeRate::from_sat_per_vb(value).unwrap()
}

/// In-memory chain with call counters.
#[derive(Default)]
struct MockChain {
    unspent: HashMap<String, Vec<SpendableOutput>>,
    marked: HashMap<String, Vec<SpendableOutput>>,
    raw: HashMap<String, Vec<u8>>,
    regular_rate: f64,
    utxo_delay: Option<Duration>,
    fail_fees: bool,
    fee_calls: AtomicUsize,
    raw_calls: AtomicUsize,
}

impl MockChain {
    fn new(regular_rate: f64) -> Self {
        Self {
            regular_rate,
            ..Default::default()
        }
    }

    /// Register every output of `parent` as unspent at `address`.
    fn fund(&mut self, address: &str, parent: &Transaction) -> Vec<SpendableOutput> {
        let txid = parent.compute_txid().to_string();
        self.raw
            .insert(txid.clone(), bitcoin::consensus::serialize(parent));
        let outputs: Vec<SpendableOutput> = parent
            .output
            .iter()
            .enumerate()
            .map(|(vout, out)| SpendableOutput::new(txid.clone(), vout as u32, out.value.to_sat(), address))
            .collect();
        self.unspent
            .entry(address.to_string())
            .or_default()
            .extend(outputs.iter().cloned());
        outputs
    }

    fn mark(&mut self, output: &SpendableOutput) {
        self.marked
            .entry(output.address.clone())
            .or_default()
            .push(output.clone());
    }
}

impl UtxoSource for MockChain {
    async fn fetch_unspent_outputs(&self, address: &str) -> Result<Vec<SpendableOutput>, BtcError> {
        if let Some(delay) = self.utxo_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.unspent.get(address).cloned().unwrap_or_default())
    }

    async fn fetch_payload_marked_outputs(
        &self,
        _network: BtcNetwork,
        address: &str,
    ) -> Result<Vec<SpendableOutput>, BtcError> {
        Ok(self.marked.get(address).cloned().unwrap_or_default())
    }
}

impl FeeRateSource for MockChain {
    async fn fetch_fee_rate_tiers(&self, _network: BtcNetwork) -> Result<FeeRateTiers, BtcError> {
        self.fee_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fees {
            return Err(BtcError::UpstreamRetrieval("fee-estimates: HTTP 503".into()));
        }
        Ok(FeeRateTiers {
            slow: rate(1.0),
            regular: rate(self.regular_rate),
            fast: rate(self.regular_rate * 2.0),
        })
    }
}

impl RawTransactionSource for MockChain {
    async fn fetch_raw_transaction(&self, txid: &str) -> Result<Vec<u8>, BtcError> {
        self.raw_calls.fetch_add(1, Ordering::SeqCst);
        self.raw
            .get(txid)
            .cloned()
            .ok_or_else(|| BtcError::UpstreamRetrieval(format!("tx {txid} not found")))
    }
}

fn total_input(prepared: &custody_core::PreparedTransaction) -> u64 {
    prepared.selected.iter().map(|u| u.amount_sat).sum()
}

fn total_output(prepared: &custody_core::PreparedTransaction) -> u64 {
    prepared
        .psbt
        .unsigned_tx
        .output
        .iter()
        .map(|o| o.value.to_sat())
        .sum()
}

// ─── Segwit ────────────────────────────────────────────────────────

#[tokio::test]
async fn segwit_pays_recipient_and_returns_change() {
    let signer = segwit_signer();
    let funding = signer.address.to_string();
    let mut chain = MockChain::new(5.0);
    chain.fund(&funding, &parent_tx(1, &[30_000, 40_000], &signer.script_pubkey));

    let preparer = TransactionPreparer::new(chain, PrepConfig::default());
    let request = PrepareRequest::new(&funding, vec![Recipient::new(recipient_address(), 50_000)]);

    let prepared = preparer.prepare_segwit(&request, &signer).await.unwrap();

    assert_eq!(prepared.selected.len(), 2);
    assert!(prepared.fee_sat > 0);
    assert!(total_input(&prepared) as u128 >= 50_000 + prepared.fee_sat as u128);
    assert_eq!(
        prepared.change_sat,
        total_input(&prepared) - 50_000 - prepared.fee_sat
    );

    let outputs = &prepared.psbt.unsigned_tx.output;
    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs[0].value.to_sat(), 50_000);
    assert_eq!(outputs[1].value.to_sat(), prepared.change_sat);
    assert_eq!(outputs[1].script_pubkey, signer.script_pubkey);
    assert_eq!(total_input(&prepared) - total_output(&prepared), prepared.fee_sat);

    assert!(prepared
        .psbt
        .unsigned_tx
        .input
        .iter()
        .all(|txin| txin.sequence == INPUT_SEQUENCE));
    assert!(prepared.psbt.inputs.iter().all(|input| input.non_witness_utxo.is_some()
        && input.witness_utxo.is_some()
        && input.redeem_script.is_some()));

    // two inputs, one parent transaction
    assert_eq!(preparer.client().raw_calls.load(Ordering::SeqCst), 1);
    assert_eq!(preparer.client().fee_calls.load(Ordering::SeqCst), 1);
    assert!(!prepared.pinned_is_own_funds);
}

#[tokio::test]
async fn insufficient_funds_skip_fee_and_parent_fetches() {
    let signer = segwit_signer();
    let funding = signer.address.to_string();
    let mut chain = MockChain::new(5.0);
    chain.fund(&funding, &parent_tx(2, &[50_000, 40_000], &signer.script_pubkey));

    let preparer = TransactionPreparer::new(chain, PrepConfig::default());
    let request = PrepareRequest::new(
        &funding,
        vec![
            Recipient::new(recipient_address(), 60_000),
            Recipient::new(recipient_address(), 40_000),
        ],
    );

    let err = preparer.prepare_segwit(&request, &signer).await.unwrap_err();

    assert_eq!(err.code(), "INSUFFICIENT_FUNDS");
    assert!(err.is_insufficient_funds());
    assert_eq!(preparer.client().fee_calls.load(Ordering::SeqCst), 0);
    assert_eq!(preparer.client().raw_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn inscribed_outputs_are_not_spent_as_funds() {
    let signer = segwit_signer();
    let funding = signer.address.to_string();
    let mut chain = MockChain::new(2.0);
    let outputs = chain.fund(&funding, &parent_tx(3, &[100_000, 20_000, 15_000], &signer.script_pubkey));
    chain.mark(&outputs[0]);

    let preparer = TransactionPreparer::new(chain, PrepConfig::default());
    let request = PrepareRequest::new(&funding, vec![Recipient::new(recipient_address(), 30_000)]);

    let prepared = preparer.prepare_segwit(&request, &signer).await.unwrap();
    assert!(prepared.selected.iter().all(|u| !u.same_outpoint(&outputs[0])));
    assert_eq!(prepared.selected.len(), 2);
}

#[tokio::test]
async fn fee_override_skips_tier_fetch() {
    let signer = segwit_signer();
    let funding = signer.address.to_string();
    let mut chain = MockChain::new(5.0);
    chain.fund(&funding, &parent_tx(4, &[100_000], &signer.script_pubkey));

    let preparer = TransactionPreparer::new(chain, PrepConfig::default());
    let request = PrepareRequest::new(&funding, vec![Recipient::new(recipient_address(), 10_000)])
        .with_fee_rate("1".parse().unwrap());

    let prepared = preparer.prepare_segwit(&request, &signer).await.unwrap();
    assert_eq!(preparer.client().fee_calls.load(Ordering::SeqCst), 0);

    // 42 + 364 + 172 (p2tr) + 128 (p2sh) = 706 WU -> 177 vB at 1 sat/vB
    assert_eq!(prepared.fee_sat, 177);
}

#[tokio::test]
async fn fee_fetch_failure_surfaces_as_upstream_error() {
    let signer = segwit_signer();
    let funding = signer.address.to_string();
    let mut chain = MockChain::new(5.0);
    chain.fail_fees = true;
    chain.fund(&funding, &parent_tx(5, &[100_000], &signer.script_pubkey));

    let preparer = TransactionPreparer::new(chain, PrepConfig::default());
    let request = PrepareRequest::new(&funding, vec![Recipient::new(recipient_address(), 10_000)]);

    let err = preparer.prepare_segwit(&request, &signer).await.unwrap_err();
    assert_eq!(err.code(), "UPSTREAM_RETRIEVAL_FAILURE");
    assert!(!err.is_insufficient_funds());
}

// ─── Taproot ───────────────────────────────────────────────────────

#[tokio::test]
async fn taproot_moves_own_inscription_with_funding() {
    let signer = taproot_signer();
    let funding = signer.address.to_string();
    let mut chain = MockChain::new(3.0);
    let outputs = chain.fund(&funding, &parent_tx(6, &[546, 80_000], &signer.script_pubkey));
    let inscription = outputs[0].clone();
    chain.mark(&inscription);

    let preparer = TransactionPreparer::new(chain, PrepConfig::default());
    let request = PrepareRequest::new(
        &funding,
        vec![
            Recipient::new(recipient_address(), 546),
            Recipient::new(recipient_address(), 20_000),
        ],
    )
    .with_pinned(inscription.clone());

    let prepared = preparer.prepare_taproot(&request, &signer).await.unwrap();

    assert!(prepared.pinned_is_own_funds);
    assert!(prepared.selected[0].same_outpoint(&inscription));
    assert_eq!(prepared.selected.len(), 2);
    assert!(prepared
        .psbt
        .inputs
        .iter()
        .all(|input| input.tap_internal_key == Some(signer.internal_key)
            && input.non_witness_utxo.is_none()));
    assert_eq!(preparer.client().raw_calls.load(Ordering::SeqCst), 0);
    assert_eq!(prepared.psbt.unsigned_tx.output.len(), 3);
}

// ─── Mixed ─────────────────────────────────────────────────────────

#[tokio::test]
async fn mixed_spends_external_inscription_with_segwit_funds() {
    let segwit = segwit_signer();
    let taproot = taproot_signer();
    let funding = segwit.address.to_string();
    let ordinals = taproot.address.to_string();

    let mut chain = MockChain::new(4.0);
    chain.fund(&funding, &parent_tx(7, &[25_000, 35_000], &segwit.script_pubkey));
    let inscription = chain.fund(&ordinals, &parent_tx(8, &[546], &taproot.script_pubkey))[0].clone();

    let preparer = TransactionPreparer::new(chain, PrepConfig::default());
    let request = PrepareRequest::new(
        &funding,
        vec![
            Recipient::new(recipient_address(), 546),
            Recipient::new(recipient_address(), 30_000),
        ],
    )
    .with_pinned(inscription.clone());
    let schemes = SchemeMap::change_and_other(&funding, &ordinals);

    let prepared = preparer
        .prepare_mixed(&request, &schemes, &segwit, &taproot)
        .await
        .unwrap();

    assert!(!prepared.pinned_is_own_funds);
    assert!(prepared.selected[0].same_outpoint(&inscription));
    assert_eq!(prepared.psbt.inputs.len(), prepared.selected.len());

    for (input, utxo) in prepared.psbt.inputs.iter().zip(&prepared.selected) {
        if utxo.address == funding {
            assert!(input.non_witness_utxo.is_some());
            assert!(input.redeem_script.is_some());
        } else {
            assert_eq!(input.tap_internal_key, Some(taproot.internal_key));
            assert!(input.non_witness_utxo.is_none());
        }
    }
    // only the segwit parent is fetched
    assert_eq!(preparer.client().raw_calls.load(Ordering::SeqCst), 1);
    assert_eq!(total_input(&prepared) - total_output(&prepared), prepared.fee_sat);
}

// ─── Timeout ───────────────────────────────────────────────────────

#[tokio::test]
async fn slow_upstream_hits_the_request_timeout() {
    let signer = segwit_signer();
    let funding = signer.address.to_string();
    let mut chain = MockChain::new(5.0);
    chain.utxo_delay = Some(Duration::from_secs(5));

    let config = PrepConfig {
        request_timeout: Duration::from_millis(20),
        ..PrepConfig::default()
    };
    let preparer = TransactionPreparer::new(chain, config);
    let request = PrepareRequest::new(&funding, vec![Recipient::new(recipient_address(), 1_000)]);

    let err = preparer.prepare_segwit(&request, &signer).await.unwrap_err();
    assert_eq!(err.code(), "TIMEOUT");
}

// ─── Stacks ────────────────────────────────────────────────────────

#[test]
fn stx_signature_is_patched_from_hex() {
    // version, chain id, standard auth, P2PKH origin with empty signature,
    // then an opaque payload
    let mut raw = vec![0x80, 0x80, 0x00, 0x00, 0x00, 0x04, 0x00];
    raw.extend_from_slice(&[0xaa; 20]);
    raw.extend_from_slice(&1u64.to_be_bytes());
    raw.extend_from_slice(&200u64.to_be_bytes());
    raw.push(0x00);
    raw.extend_from_slice(&[0u8; 65]);
    raw.extend_from_slice(&[0x03, 0x02, 0x00, 0x00, 0x00, 0x00]);

    let signature = [0x5a; 65];
    let patched = apply_stx_signature(&hex::encode(&raw), &hex::encode(signature)).unwrap();

    assert_eq!(patched.origin_signature().as_bytes(), &signature);
    assert_eq!(patched.serialize().len(), raw.len());
    assert_ne!(patched.txid(), chain_stx::StacksTransaction::deserialize(&raw).unwrap().txid());
}

#[test]
fn stx_bad_signature_keeps_its_code() {
    let err = apply_stx_signature("00", "abcd").unwrap_err();
    // the transaction is rejected before the signature is looked at
    assert_eq!(err.code(), "STX_SERIALIZATION_ERROR");
}
