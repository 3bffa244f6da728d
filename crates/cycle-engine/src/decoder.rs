//! Transfer event decoding.
//!
//! Normalizes a [`RawLog`] into a [`TransferEvent`]: addresses become
//! [`Address`] values (so comparisons are byte-wise and case-free), the
//! amount becomes a [`U256`] regardless of whether the source delivered bytes
//! or hex text, and the block number becomes a `u64`. All encoding variance
//! ends here; nothing downstream sees strings.

use alloy::primitives::{Address, B256, U256};
use cycle_data::types::{RawData, RawLog, RawQuantity};
use thiserror::Error;

/// Why a log could not be turned into a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// topic0 is not the expected transfer signature.
    #[error("log signature {found} is not a transfer event")]
    WrongSignature { found: String },
    /// A transfer carries exactly three topics: signature, from, to.
    #[error("transfer log must carry 3 topics, found {found}")]
    WrongTopicCount { found: usize },
    #[error("invalid topic `{0}`")]
    BadTopic(String),
    #[error("invalid contract address `{0}`")]
    BadAddress(String),
    #[error("invalid amount payload: {0}")]
    BadAmount(String),
    #[error("invalid block number: {0}")]
    BadBlockNumber(String),
    #[error("invalid transaction hash `{0}`")]
    BadTxHash(String),
}

/// A normalized token transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferEvent {
    /// Token contract (the log emitter).
    pub token: Address,
    /// Sender of the token transfer.
    pub from: Address,
    /// Recipient of the token transfer.
    pub to: Address,
    /// Raw integer amount.
    pub amount: U256,
    /// Block containing the log.
    pub block_number: u64,
    /// Transaction that emitted the log.
    pub tx_hash: B256,
    /// Log index for ordering.
    pub log_index: u64,
}

impl TransferEvent {
    /// Ledger position of the log; totally ordered across a run.
    pub fn position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}

/// Decode a transfer-shaped log whose topic0 must equal `signature`.
///
/// # Errors
/// Returns [`DecodeError`] when the log is not a transfer of that signature
/// or one of its fields is malformed.
pub fn decode_transfer(log: &RawLog, signature: B256) -> Result<TransferEvent, DecodeError> {
    let topic0 = log
        .topics
        .first()
        .ok_or(DecodeError::WrongTopicCount { found: 0 })?;
    if parse_b256(topic0)? != signature {
        return Err(DecodeError::WrongSignature {
            found: topic0.clone(),
        });
    }
    if log.topics.len() != 3 {
        return Err(DecodeError::WrongTopicCount {
            found: log.topics.len(),
        });
    }

    let from = address_from_topic(&log.topics[1])?;
    let to = address_from_topic(&log.topics[2])?;
    let token = log
        .address
        .parse::<Address>()
        .map_err(|_| DecodeError::BadAddress(log.address.clone()))?;
    let amount = normalize_amount(&log.data)?;
    let block_number = normalize_quantity(&log.block_number)?;
    let tx_hash = log
        .transaction_hash
        .parse::<B256>()
        .map_err(|_| DecodeError::BadTxHash(log.transaction_hash.clone()))?;

    Ok(TransferEvent {
        token,
        from,
        to,
        amount,
        block_number,
        tx_hash,
        log_index: log.log_index,
    })
}

/// Block number of a raw log without decoding the rest of it.
///
/// # Errors
/// Returns [`DecodeError::BadBlockNumber`] for unparseable encodings.
pub fn log_block_number(log: &RawLog) -> Result<u64, DecodeError> {
    normalize_quantity(&log.block_number)
}

/// Normalize a log payload to an integer amount.
///
/// Only the first 32-byte word is read. An empty payload is zero.
///
/// # Errors
/// Returns [`DecodeError::BadAmount`] for non-hex text.
pub fn normalize_amount(data: &RawData) -> Result<U256, DecodeError> {
    match data {
        RawData::Bytes(bytes) => {
            let word = &bytes[..bytes.len().min(32)];
            Ok(U256::from_be_slice(word))
        }
        RawData::Hex(text) => {
            let hex = text.strip_prefix("0x").unwrap_or(text);
            if hex.is_empty() {
                return Ok(U256::ZERO);
            }
            let word = hex
                .get(..hex.len().min(64))
                .ok_or_else(|| DecodeError::BadAmount(format!("non-ascii payload `{text}`")))?;
            U256::from_str_radix(word, 16).map_err(|e| DecodeError::BadAmount(e.to_string()))
        }
    }
}

/// Normalize a block number encoding to `u64`.
///
/// # Errors
/// Returns [`DecodeError::BadBlockNumber`] for unparseable or oversized values.
pub fn normalize_quantity(quantity: &RawQuantity) -> Result<u64, DecodeError> {
    match quantity {
        RawQuantity::Number(n) => Ok(*n),
        RawQuantity::Hex(text) => {
            let trimmed = text.trim();
            match trimmed.strip_prefix("0x") {
                Some(hex) => u64::from_str_radix(hex, 16),
                None => trimmed.parse::<u64>(),
            }
            .map_err(|e| DecodeError::BadBlockNumber(format!("`{trimmed}`: {e}")))
        }
        RawQuantity::Bytes(bytes) => {
            let significant: Vec<u8> = bytes.iter().copied().skip_while(|b| *b == 0).collect();
            if significant.len() > 8 {
                return Err(DecodeError::BadBlockNumber(format!(
                    "{} significant bytes exceed u64",
                    significant.len()
                )));
            }
            Ok(significant
                .iter()
                .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte)))
        }
    }
}

/// Parse an address from a 32-byte topic hex string.
///
/// Addresses are right-aligned in 32-byte topics: bytes 12..32 hold the address.
fn address_from_topic(topic_hex: &str) -> Result<Address, DecodeError> {
    let topic = parse_b256(topic_hex)?;
    Ok(Address::from_slice(&topic[12..]))
}

fn parse_b256(topic_hex: &str) -> Result<B256, DecodeError> {
    topic_hex
        .parse::<B256>()
        .map_err(|_| DecodeError::BadTopic(topic_hex.to_string()))
}

/// Left-pad an address into a 32-byte topic string.
pub fn address_topic(address: Address) -> String {
    format!("{:#x}", address.into_word())
}
