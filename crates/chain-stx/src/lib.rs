//! Stacks transaction support for the custody flow.
//!
//! Decodes just enough of the Stacks wire format to locate the origin's
//! single-signature slot, and patches a signature produced by the hardware
//! signer into it. Payloads are carried through as opaque bytes.

pub mod error;
pub mod signature;
pub mod transaction;

pub use error::StxError;
pub use signature::{apply_signature, encode_signature, encode_signature_hex, patch_signature};
pub use transaction::{
    HashMode, KeyEncoding, MessageSignature, SingleSigSpendingCondition, StacksTransaction,
    TransactionAuth,
};
