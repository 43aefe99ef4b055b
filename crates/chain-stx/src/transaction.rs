//! Stacks transaction wire format, as far as signature insertion needs it.
//!
//! Only the authorization section is decoded; everything after it is kept as
//! opaque bytes and written back unchanged.
//!
//! ```text
//! Transaction:
//!   version                 u8
//!   chain_id                u32 (big-endian)
//!   auth_type               u8   0x04 standard, 0x05 sponsored
//!   origin condition        (see below)
//!   sponsor condition       only when sponsored
//!   remainder               anchor mode, post-conditions, payload
//!
//! Single-signature spending condition:
//!   hash_mode               u8   0x00 P2PKH, 0x02 P2WPKH
//!   signer                  20 bytes (hash160)
//!   nonce                   u64 (big-endian)
//!   fee                     u64 (big-endian)
//!   key_encoding            u8   0x00 compressed, 0x01 uncompressed
//!   signature               65 bytes (recovery id + r + s)
//! ```

use sha2::{Digest, Sha512_256};

use crate::error::StxError;

pub const AUTH_STANDARD: u8 = 0x04;
pub const AUTH_SPONSORED: u8 = 0x05;

/// Length of a recoverable secp256k1 signature.
pub const SIGNATURE_LENGTH: usize = 65;

/// A recoverable signature in the slot layout: recovery id, then r and s.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageSignature(pub [u8; SIGNATURE_LENGTH]);

impl MessageSignature {
    /// The all-zero placeholder an unsigned transaction carries.
    pub fn empty() -> Self {
        MessageSignature([0u8; SIGNATURE_LENGTH])
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Debug for MessageSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MessageSignature({})", self.to_hex())
    }
}

/// How the signer hash is derived from the public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashMode {
    P2pkh,
    P2wpkh,
}

impl HashMode {
    fn from_byte(byte: u8) -> Result<Self, StxError> {
        match byte {
            0x00 => Ok(HashMode::P2pkh),
            0x02 => Ok(HashMode::P2wpkh),
            0x01 | 0x03 | 0x05 | 0x07 => Err(StxError::UnsupportedAuth(format!(
                "multisig spending condition (hash mode {byte:#04x})"
            ))),
            other => Err(StxError::Serialization(format!(
                "unknown hash mode {other:#04x}"
            ))),
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            HashMode::P2pkh => 0x00,
            HashMode::P2wpkh => 0x02,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEncoding {
    Compressed,
    Uncompressed,
}

impl KeyEncoding {
    fn from_byte(byte: u8) -> Result<Self, StxError> {
        match byte {
            0x00 => Ok(KeyEncoding::Compressed),
            0x01 => Ok(KeyEncoding::Uncompressed),
            other => Err(StxError::Serialization(format!(
                "unknown key encoding {other:#04x}"
            ))),
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            KeyEncoding::Compressed => 0x00,
            KeyEncoding::Uncompressed => 0x01,
        }
    }
}

/// A single-signature spending condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleSigSpendingCondition {
    pub hash_mode: HashMode,
    pub signer: [u8; 20],
    pub nonce: u64,
    pub fee: u64,
    pub key_encoding: KeyEncoding,
    pub signature: MessageSignature,
}

impl SingleSigSpendingCondition {
    fn read(reader: &mut Reader<'_>) -> Result<Self, StxError> {
        Ok(Self {
            hash_mode: HashMode::from_byte(reader.u8()?)?,
            signer: reader.array()?,
            nonce: reader.u64_be()?,
            fee: reader.u64_be()?,
            key_encoding: KeyEncoding::from_byte(reader.u8()?)?,
            signature: MessageSignature(reader.array()?),
        })
    }

    fn write(&self, buf: &mut Vec<u8>) {
        buf.push(self.hash_mode.to_byte());
        buf.extend_from_slice(&self.signer);
        buf.extend_from_slice(&self.nonce.to_be_bytes());
        buf.extend_from_slice(&self.fee.to_be_bytes());
        buf.push(self.key_encoding.to_byte());
        buf.extend_from_slice(&self.signature.0);
    }
}

/// Who authorizes and who pays.
///
/// Sponsor conditions are decoded only in single-signature form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionAuth {
    Standard(SingleSigSpendingCondition),
    Sponsored {
        origin: SingleSigSpendingCondition,
        sponsor: SingleSigSpendingCondition,
    },
}

impl TransactionAuth {
    pub fn origin(&self) -> &SingleSigSpendingCondition {
        match self {
            TransactionAuth::Standard(origin) => origin,
            TransactionAuth::Sponsored { origin, .. } => origin,
        }
    }

    pub fn origin_mut(&mut self) -> &mut SingleSigSpendingCondition {
        match self {
            TransactionAuth::Standard(origin) => origin,
            TransactionAuth::Sponsored { origin, .. } => origin,
        }
    }
}

/// A deserialized Stacks transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StacksTransaction {
    pub version: u8,
    pub chain_id: u32,
    pub auth: TransactionAuth,
    /// Anchor mode, post-conditions and payload, undecoded.
    pub remainder: Vec<u8>,
}

impl StacksTransaction {
    pub fn deserialize(bytes: &[u8]) -> Result<Self, StxError> {
        let mut reader = Reader::new(bytes);
        let version = reader.u8()?;
        let chain_id = reader.u32_be()?;
        let auth = match reader.u8()? {
            AUTH_STANDARD => TransactionAuth::Standard(SingleSigSpendingCondition::read(&mut reader)?),
            AUTH_SPONSORED => TransactionAuth::Sponsored {
                origin: SingleSigSpendingCondition::read(&mut reader)?,
                sponsor: SingleSigSpendingCondition::read(&mut reader)?,
            },
            other => {
                return Err(StxError::Serialization(format!(
                    "unknown authorization type {other:#04x}"
                )))
            }
        };
        let remainder = reader.rest();
        if remainder.is_empty() {
            return Err(StxError::Serialization(
                "transaction has no payload".into(),
            ));
        }
        Ok(Self {
            version,
            chain_id,
            auth,
            remainder: remainder.to_vec(),
        })
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, StxError> {
        let trimmed = hex_str.trim();
        let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(trimmed)
            .map_err(|e| StxError::Serialization(format!("invalid hex: {e}")))?;
        Self::deserialize(&bytes)
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + 4 + 1 + 2 * 103 + self.remainder.len());
        buf.push(self.version);
        buf.extend_from_slice(&self.chain_id.to_be_bytes());
        match &self.auth {
            TransactionAuth::Standard(origin) => {
                buf.push(AUTH_STANDARD);
                origin.write(&mut buf);
            }
            TransactionAuth::Sponsored { origin, sponsor } => {
                buf.push(AUTH_SPONSORED);
                origin.write(&mut buf);
                sponsor.write(&mut buf);
            }
        }
        buf.extend_from_slice(&self.remainder);
        buf
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.serialize())
    }

    /// SHA-512/256 of the serialized transaction.
    pub fn txid(&self) -> [u8; 32] {
        Sha512_256::digest(self.serialize()).into()
    }

    pub fn txid_hex(&self) -> String {
        hex::encode(self.txid())
    }

    /// The signature currently in the origin's slot.
    pub fn origin_signature(&self) -> MessageSignature {
        self.auth.origin().signature
    }

    pub fn is_testnet(&self) -> bool {
        self.version & 0x80 != 0
    }
}

/// Bounds-checked cursor over a byte slice.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], StxError> {
        let end = self.pos + len;
        if end > self.data.len() {
            return Err(StxError::Serialization(format!(
                "unexpected end of data: need {len} bytes at offset {}, have {}",
                self.pos,
                self.data.len() - self.pos
            )));
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], StxError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, StxError> {
        Ok(self.take(1)?[0])
    }

    fn u32_be(&mut self) -> Result<u32, StxError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn u64_be(&mut self) -> Result<u64, StxError> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    fn rest(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos..];
        self.pos = self.data.len();
        rest
    }
}
