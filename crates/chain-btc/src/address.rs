use bitcoin::address::{Address, AddressType, NetworkUnchecked};
use bitcoin::key::CompressedPublicKey;
use bitcoin::script::ScriptBuf;
use bitcoin::secp256k1::{PublicKey, Secp256k1, XOnlyPublicKey};

use crate::error::BtcError;
use crate::fee::InputKind;
use crate::network::BtcNetwork;

/// Parse an address string and require it to belong to `network`.
pub fn parse_address(address: &str, network: BtcNetwork) -> Result<Address, BtcError> {
    address
        .parse::<Address<NetworkUnchecked>>()
        .map_err(|e| BtcError::InvalidAddress(format!("{address}: {e}")))?
        .require_network(network.to_bitcoin_network())
        .map_err(|e| BtcError::InvalidAddress(format!("{address} wrong network: {e}")))
}

/// Classify the spending shape of an address for size estimation.
///
/// Only the script template matters here, so the network is not checked.
/// Unknown or unparseable templates are treated as native segwit.
pub fn input_kind(address: &str) -> InputKind {
    let Ok(parsed) = address.parse::<Address<NetworkUnchecked>>() else {
        return InputKind::NativeSegwit;
    };
    match parsed.assume_checked().address_type() {
        Some(AddressType::P2sh) => InputKind::NestedSegwit,
        Some(AddressType::P2tr) => InputKind::Taproot,
        Some(AddressType::P2pkh) => InputKind::Legacy,
        _ => InputKind::NativeSegwit,
    }
}

/// Scripts controlling a P2SH-wrapped P2WPKH output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedSegwitScripts {
    pub address: Address,
    /// `OP_HASH160 <hash> OP_EQUAL`, the prevout's scriptPubKey.
    pub script_pubkey: ScriptBuf,
    /// `OP_0 <pubkey hash>`, revealed in the scriptSig when spending.
    pub redeem_script: ScriptBuf,
}

/// Derive the P2SH-P2WPKH address and scripts for a compressed public key.
pub fn nested_segwit_scripts(
    public_key: &PublicKey,
    network: BtcNetwork,
) -> NestedSegwitScripts {
    let compressed = CompressedPublicKey(*public_key);
    let address = Address::p2shwpkh(&compressed, network.to_bitcoin_network());
    NestedSegwitScripts {
        script_pubkey: address.script_pubkey(),
        redeem_script: ScriptBuf::new_p2wpkh(&compressed.wpubkey_hash()),
        address,
    }
}

/// Derive the key-path-only P2TR address for an untweaked internal key.
pub fn taproot_address(internal_key: XOnlyPublicKey, network: BtcNetwork) -> Address {
    let secp = Secp256k1::verification_only();
    Address::p2tr(&secp, internal_key, None, network.to_bitcoin_network())
}
