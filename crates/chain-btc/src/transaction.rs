//! Unsigned PSBT assembly.
//!
//! Three input-authorization shapes share one output rule: one output per
//! recipient in order, then a single change output only when change is
//! positive. Every input carries [`INPUT_SEQUENCE`].

use std::collections::{HashMap, HashSet};

use bitcoin::absolute::LockTime;
use bitcoin::address::Address;
use bitcoin::bip32::{DerivationPath, Fingerprint, KeySource};
use bitcoin::psbt::{Input as PsbtInput, Psbt};
use bitcoin::script::ScriptBuf;
use bitcoin::secp256k1::{PublicKey, XOnlyPublicKey};
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, Sequence, Transaction, TxIn, TxOut, Txid, Witness};
use futures::future::try_join_all;

use crate::address::{nested_segwit_scripts, parse_address, taproot_address};
use crate::error::BtcError;
use crate::network::BtcNetwork;
use crate::source::RawTransactionSource;
use crate::utxo::{Recipient, SpendableOutput};

/// Sequence on every input: replaceable, and lets the locktime take effect.
pub const INPUT_SEQUENCE: Sequence = Sequence::ENABLE_RBF_NO_LOCKTIME;

/// Signing metadata for a P2SH-P2WPKH address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegwitSigner {
    pub address: Address,
    pub script_pubkey: ScriptBuf,
    pub redeem_script: ScriptBuf,
    pub public_key: PublicKey,
    pub key_source: KeySource,
}

impl SegwitSigner {
    pub fn new(
        public_key: PublicKey,
        fingerprint: Fingerprint,
        path: DerivationPath,
        network: BtcNetwork,
    ) -> Self {
        let scripts = nested_segwit_scripts(&public_key, network);
        Self {
            address: scripts.address,
            script_pubkey: scripts.script_pubkey,
            redeem_script: scripts.redeem_script,
            public_key,
            key_source: (fingerprint, path),
        }
    }

    // The hardware signer wants both the witness UTXO and the full parent.
    fn fill_input(&self, input: &mut PsbtInput, amount_sat: u64, parent: Transaction) {
        input.witness_utxo = Some(TxOut {
            value: Amount::from_sat(amount_sat),
            script_pubkey: self.script_pubkey.clone(),
        });
        input.non_witness_utxo = Some(parent);
        input.redeem_script = Some(self.redeem_script.clone());
        input
            .bip32_derivation
            .insert(self.public_key, self.key_source.clone());
    }
}

/// Signing metadata for a key-path P2TR address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaprootSigner {
    pub address: Address,
    pub script_pubkey: ScriptBuf,
    pub internal_key: XOnlyPublicKey,
    pub key_source: KeySource,
}

impl TaprootSigner {
    pub fn new(
        internal_key: XOnlyPublicKey,
        fingerprint: Fingerprint,
        path: DerivationPath,
        network: BtcNetwork,
    ) -> Self {
        let address = taproot_address(internal_key, network);
        Self {
            script_pubkey: address.script_pubkey(),
            address,
            internal_key,
            key_source: (fingerprint, path),
        }
    }

    fn fill_input(&self, input: &mut PsbtInput, amount_sat: u64) {
        input.witness_utxo = Some(TxOut {
            value: Amount::from_sat(amount_sat),
            script_pubkey: self.script_pubkey.clone(),
        });
        input
            .tap_key_origins
            .insert(self.internal_key, (Vec::new(), self.key_source.clone()));
        input.tap_internal_key = Some(self.internal_key);
    }
}

/// How an input is authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningScheme {
    Segwit,
    Taproot,
}

/// Owning address to signing scheme, used to route inputs in mixed mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemeMap {
    schemes: HashMap<String, SigningScheme>,
}

impl SchemeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The two-address case: the change address is segwit, the other taproot.
    pub fn change_and_other(change_address: &str, other_address: &str) -> Self {
        let mut map = Self::new();
        map.insert(change_address, SigningScheme::Segwit);
        map.insert(other_address, SigningScheme::Taproot);
        map
    }

    pub fn insert(&mut self, address: impl Into<String>, scheme: SigningScheme) {
        self.schemes.insert(address.into(), scheme);
    }

    pub fn scheme_of(&self, address: &str) -> Option<SigningScheme> {
        self.schemes.get(address).copied()
    }

    pub fn len(&self) -> usize {
        self.schemes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemes.is_empty()
    }
}

/// Where the value goes.
#[derive(Debug, Clone, Copy)]
pub struct OutputPlan<'a> {
    pub recipients: &'a [Recipient],
    pub change_address: &'a str,
    pub change_sat: u64,
    pub network: BtcNetwork,
}

impl OutputPlan<'_> {
    fn to_outputs(&self) -> Result<Vec<TxOut>, BtcError> {
        let mut outputs = Vec::with_capacity(self.recipients.len() + 1);
        for recipient in self.recipients {
            outputs.push(TxOut {
                value: Amount::from_sat(recipient.amount_sat),
                script_pubkey: parse_address(&recipient.address, self.network)?.script_pubkey(),
            });
        }
        if self.change_sat > 0 {
            outputs.push(TxOut {
                value: Amount::from_sat(self.change_sat),
                script_pubkey: parse_address(self.change_address, self.network)?.script_pubkey(),
            });
        }
        Ok(outputs)
    }
}

fn outpoint(utxo: &SpendableOutput) -> Result<OutPoint, BtcError> {
    let txid: Txid = utxo
        .txid
        .parse()
        .map_err(|e| BtcError::TransactionBuildError(format!("invalid txid {}: {e}", utxo.txid)))?;
    Ok(OutPoint::new(txid, utxo.vout))
}

fn unsigned_psbt(inputs: &[OutPoint], outputs: Vec<TxOut>) -> Result<Psbt, BtcError> {
    if inputs.is_empty() {
        return Err(BtcError::TransactionBuildError("no inputs selected".into()));
    }
    let tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: inputs
            .iter()
            .map(|previous_output| TxIn {
                previous_output: *previous_output,
                script_sig: ScriptBuf::new(),
                sequence: INPUT_SEQUENCE,
                witness: Witness::default(),
            })
            .collect(),
        output: outputs,
    };
    Psbt::from_unsigned_tx(tx).map_err(|e| BtcError::TransactionBuildError(e.to_string()))
}

fn decode_parent(expected: Txid, bytes: &[u8]) -> Result<Transaction, String> {
    let tx: Transaction = bitcoin::consensus::deserialize(bytes)
        .map_err(|e| format!("undecodable parent transaction {expected}: {e}"))?;
    let actual = tx.compute_txid();
    if actual != expected {
        return Err(format!("requested parent {expected}, got {actual}"));
    }
    Ok(tx)
}

/// Fetch the parent transaction of every input, once per distinct txid.
///
/// Inputs that already carry their raw parent are decoded in place. The
/// remaining fetches run concurrently and all must succeed; each result is
/// decoded and checked against the requested txid.
pub async fn fetch_parent_transactions<S: RawTransactionSource>(
    source: &S,
    inputs: &[&SpendableOutput],
) -> Result<HashMap<Txid, Transaction>, BtcError> {
    let mut parents = HashMap::new();
    let mut missing = Vec::new();
    let mut seen = HashSet::new();

    for utxo in inputs {
        let txid = outpoint(utxo)?.txid;
        if !seen.insert(txid) {
            continue;
        }
        match &utxo.raw_tx {
            Some(raw) => {
                let tx = decode_parent(txid, raw).map_err(BtcError::TransactionBuildError)?;
                parents.insert(txid, tx);
            }
            None => missing.push(txid),
        }
    }

    log::debug!(
        "fetching {} parent transactions for {} inputs",
        missing.len(),
        inputs.len()
    );

    let fetched = try_join_all(missing.into_iter().map(|txid| async move {
        let bytes = source.fetch_raw_transaction(&txid.to_string()).await?;
        let tx = decode_parent(txid, &bytes).map_err(BtcError::UpstreamRetrieval)?;
        Ok::<_, BtcError>((txid, tx))
    }))
    .await?;

    parents.extend(fetched);
    Ok(parents)
}

fn take_parent(parents: &HashMap<Txid, Transaction>, txid: &Txid) -> Result<Transaction, BtcError> {
    parents
        .get(txid)
        .cloned()
        .ok_or_else(|| BtcError::TransactionBuildError(format!("missing parent transaction {txid}")))
}

/// Variant A: every input is spent from the segwit signer's address.
pub async fn build_segwit_psbt<S: RawTransactionSource>(
    source: &S,
    inputs: &[SpendableOutput],
    signer: &SegwitSigner,
    plan: &OutputPlan<'_>,
) -> Result<Psbt, BtcError> {
    let outpoints = inputs.iter().map(outpoint).collect::<Result<Vec<_>, _>>()?;
    let outputs = plan.to_outputs()?;

    let refs: Vec<&SpendableOutput> = inputs.iter().collect();
    let parents = fetch_parent_transactions(source, &refs).await?;

    let mut psbt = unsigned_psbt(&outpoints, outputs)?;
    for ((utxo, point), input) in inputs.iter().zip(&outpoints).zip(psbt.inputs.iter_mut()) {
        signer.fill_input(input, utxo.amount_sat, take_parent(&parents, &point.txid)?);
    }
    Ok(psbt)
}

/// Variant B: every input is spent from the taproot signer's address.
pub fn build_taproot_psbt(
    inputs: &[SpendableOutput],
    signer: &TaprootSigner,
    plan: &OutputPlan<'_>,
) -> Result<Psbt, BtcError> {
    let outpoints = inputs.iter().map(outpoint).collect::<Result<Vec<_>, _>>()?;
    let mut psbt = unsigned_psbt(&outpoints, plan.to_outputs()?)?;
    for (utxo, input) in inputs.iter().zip(psbt.inputs.iter_mut()) {
        signer.fill_input(input, utxo.amount_sat);
    }
    Ok(psbt)
}

/// Variant C: inputs from both signers, routed by owning address.
///
/// Every input is classified before anything is fetched, so an unmapped
/// address fails without touching the network.
pub async fn build_mixed_psbt<S: RawTransactionSource>(
    source: &S,
    inputs: &[SpendableOutput],
    schemes: &SchemeMap,
    segwit: &SegwitSigner,
    taproot: &TaprootSigner,
    plan: &OutputPlan<'_>,
) -> Result<Psbt, BtcError> {
    let routed = inputs
        .iter()
        .map(|utxo| {
            schemes.scheme_of(&utxo.address).ok_or_else(|| {
                BtcError::TransactionBuildError(format!(
                    "no signing scheme for input address {}",
                    utxo.address
                ))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let outpoints = inputs.iter().map(outpoint).collect::<Result<Vec<_>, _>>()?;
    let outputs = plan.to_outputs()?;

    let segwit_inputs: Vec<&SpendableOutput> = inputs
        .iter()
        .zip(&routed)
        .filter(|(_, scheme)| **scheme == SigningScheme::Segwit)
        .map(|(utxo, _)| utxo)
        .collect();
    log::debug!(
        "mixed inputs: {} segwit, {} taproot",
        segwit_inputs.len(),
        inputs.len() - segwit_inputs.len()
    );
    let parents = fetch_parent_transactions(source, &segwit_inputs).await?;

    let mut psbt = unsigned_psbt(&outpoints, outputs)?;
    for (((utxo, point), scheme), input) in inputs
        .iter()
        .zip(&outpoints)
        .zip(&routed)
        .zip(psbt.inputs.iter_mut())
    {
        match scheme {
            SigningScheme::Segwit => {
                segwit.fill_input(input, utxo.amount_sat, take_parent(&parents, &point.txid)?)
            }
            SigningScheme::Taproot => taproot.fill_input(input, utxo.amount_sat),
        }
    }
    Ok(psbt)
}
