//! Bitcoin transaction preparation for hardware-custody signing.
//!
//! Gathers fundable outputs for an address, selects inputs against an
//! authoritative fee rate, and assembles an unsigned PSBT for nested-segwit,
//! taproot, or mixed inputs. Nothing here signs or broadcasts; retrieval is
//! delegated to the traits in [`source`].

pub mod address;
pub mod error;
pub mod fee;
pub mod gather;
pub mod network;
pub mod reconcile;
pub mod selection;
pub mod source;
pub mod transaction;
pub mod utxo;

pub use error::BtcError;
pub use fee::{FeeRate, FeeRateChoice, FeeRateTiers, FeeTier};
pub use gather::{gather_candidates, CandidateSet};
pub use network::BtcNetwork;
pub use reconcile::{FeeReconciler, VsizeFeeReconciler};
pub use selection::{SelectionOrchestrator, SelectionRequest, SelectionResult};
pub use source::{FeeRateSource, RawTransactionSource, UtxoSource};
pub use transaction::{
    build_mixed_psbt, build_segwit_psbt, build_taproot_psbt, OutputPlan, SchemeMap,
    SegwitSigner, SigningScheme, TaprootSigner,
};
pub use utxo::{CoinSelector, LargestFirstSelector, Recipient, SpendableOutput};
