//! Immutable ledger snapshots.
//!
//! A [`Ledger`] is a closed, content-hashed snapshot: its header fields and
//! transaction set never change after construction. The only way to obtain
//! one is through [`LedgerBuilder::build`] (which derives the hash from the
//! contents) or [`Ledger::from_parts`] (for stores that already know the
//! hash). Because `Ledger` exposes no mutating methods, any `Arc<Ledger>`
//! handed to the caches is read-only for every holder.
//!
//! # Transaction Set
//!
//! Transactions are stored as `(key, metadata blob)` pairs in a `BTreeMap`,
//! so [`Ledger::transactions`] always yields them in ascending key order.

use std::collections::BTreeMap;

use ledgerwatch_common::Hash256;
use serde::{Deserialize, Serialize};

use crate::meta::TxMeta;
use crate::{LedgerError, Result};

/// Domain separator for ledger header hashing.
const LEDGER_HASH_PREFIX: &[u8; 4] = b"LWR\0";

/// Domain separator for transaction set hashing.
const TX_SET_HASH_PREFIX: &[u8; 4] = b"TXS\0";

/// Default close time resolution in seconds.
pub const DEFAULT_CLOSE_TIME_RESOLUTION: u32 = 10;

/// Header fields of a closed ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerInfo {
    /// Ledger sequence number.
    pub seq: u32,
    /// Content hash identifying this ledger.
    pub hash: Hash256,
    /// Hash of the ledger this one was built on.
    pub parent_hash: Hash256,
    /// Agreed close time, seconds since the network epoch.
    pub close_time: u64,
    /// Granularity the close time was rounded to.
    pub close_time_resolution: u32,
    /// Root hash of the state trie.
    pub state_hash: Hash256,
    /// Root hash of the transaction set.
    pub tx_hash: Hash256,
}

impl LedgerInfo {
    /// Compute the header hash from every other field.
    pub fn compute_hash(&self) -> Hash256 {
        Hash256::hash_parts(&[
            LEDGER_HASH_PREFIX,
            &self.seq.to_be_bytes(),
            self.parent_hash.as_bytes(),
            &self.close_time.to_be_bytes(),
            &self.close_time_resolution.to_be_bytes(),
            self.state_hash.as_bytes(),
            self.tx_hash.as_bytes(),
        ])
    }
}

/// Compute the transaction set root over `(key, metadata)` pairs in key order.
fn compute_tx_hash(transactions: &BTreeMap<Hash256, Vec<u8>>) -> Hash256 {
    let mut parts: Vec<&[u8]> = Vec::with_capacity(1 + transactions.len() * 2);
    parts.push(TX_SET_HASH_PREFIX);
    let lengths: Vec<[u8; 4]> = transactions
        .values()
        .map(|meta| (meta.len() as u32).to_be_bytes())
        .collect();
    for ((key, meta), len) in transactions.iter().zip(lengths.iter()) {
        parts.push(key.as_bytes());
        parts.push(len);
        parts.push(meta);
    }
    Hash256::hash_parts(&parts)
}

/// An immutable, content-hashed ledger.
///
/// Shared between holders as `Arc<Ledger>`; see the module docs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LedgerRepr", into = "LedgerRepr")]
pub struct Ledger {
    info: LedgerInfo,
    transactions: BTreeMap<Hash256, Vec<u8>>,
}

impl Ledger {
    /// Assemble a ledger whose hash is already known.
    ///
    /// The hash is taken as given; use [`Ledger::verify_hash`] to check it
    /// against the contents.
    pub fn from_parts<I>(info: LedgerInfo, transactions: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Hash256, Vec<u8>)>,
    {
        let mut map = BTreeMap::new();
        for (key, meta) in transactions {
            if map.insert(key, meta).is_some() {
                return Err(LedgerError::DuplicateTransaction(key.to_hex()));
            }
        }
        Ok(Self {
            info,
            transactions: map,
        })
    }

    /// Returns the header fields.
    pub fn info(&self) -> &LedgerInfo {
        &self.info
    }

    /// Ledger sequence number.
    pub fn seq(&self) -> u32 {
        self.info.seq
    }

    /// Content hash of this ledger.
    pub fn hash(&self) -> Hash256 {
        self.info.hash
    }

    /// Hash of the parent ledger.
    pub fn parent_hash(&self) -> Hash256 {
        self.info.parent_hash
    }

    /// Agreed close time.
    pub fn close_time(&self) -> u64 {
        self.info.close_time
    }

    /// Root hash of the state trie.
    pub fn state_hash(&self) -> Hash256 {
        self.info.state_hash
    }

    /// Number of transactions in this ledger.
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }

    /// Iterate `(key, metadata)` pairs in ascending key order.
    pub fn transactions(&self) -> impl Iterator<Item = (&Hash256, &[u8])> + '_ {
        self.transactions
            .iter()
            .map(|(key, meta)| (key, meta.as_slice()))
    }

    /// Raw metadata for a transaction, if present.
    pub fn read_transaction(&self, key: &Hash256) -> Option<&[u8]> {
        self.transactions.get(key).map(Vec::as_slice)
    }

    /// Parsed metadata for a transaction.
    ///
    /// Returns `None` when the transaction is absent or its metadata does not
    /// decode.
    pub fn read_meta(&self, key: &Hash256) -> Option<TxMeta> {
        self.read_transaction(key)
            .and_then(|bytes| TxMeta::from_bytes(bytes).ok())
    }

    /// Returns `true` if the stored hash matches the contents.
    pub fn verify_hash(&self) -> bool {
        self.info.tx_hash == compute_tx_hash(&self.transactions)
            && self.info.hash == self.info.compute_hash()
    }

    /// Like [`verify_hash`](Self::verify_hash), but reports what differs.
    pub fn check_hash(&self) -> Result<()> {
        let tx_hash = compute_tx_hash(&self.transactions);
        if self.info.tx_hash != tx_hash {
            return Err(LedgerError::HashMismatch {
                expected: self.info.tx_hash.to_hex(),
                actual: tx_hash.to_hex(),
            });
        }
        let hash = self.info.compute_hash();
        if self.info.hash != hash {
            return Err(LedgerError::HashMismatch {
                expected: self.info.hash.to_hex(),
                actual: hash.to_hex(),
            });
        }
        Ok(())
    }

    /// Header summary for diagnostics (no transaction bodies).
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "seq": self.info.seq,
            "hash": self.info.hash,
            "parent_hash": self.info.parent_hash,
            "close_time": self.info.close_time,
            "close_time_resolution": self.info.close_time_resolution,
            "state_hash": self.info.state_hash,
            "tx_hash": self.info.tx_hash,
            "tx_count": self.transactions.len(),
        })
    }

    /// Decode a ledger from its JSON form.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Encode this ledger as pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Wire form of a [`Ledger`]: metadata blobs are hex encoded.
#[derive(Serialize, Deserialize)]
struct LedgerRepr {
    #[serde(flatten)]
    info: LedgerInfo,
    #[serde(default)]
    transactions: Vec<TxRepr>,
}

#[derive(Serialize, Deserialize)]
struct TxRepr {
    key: Hash256,
    #[serde(with = "hex::serde")]
    meta: Vec<u8>,
}

impl TryFrom<LedgerRepr> for Ledger {
    type Error = LedgerError;

    fn try_from(repr: LedgerRepr) -> Result<Self> {
        Ledger::from_parts(
            repr.info,
            repr.transactions.into_iter().map(|tx| (tx.key, tx.meta)),
        )
    }
}

impl From<Ledger> for LedgerRepr {
    fn from(ledger: Ledger) -> Self {
        LedgerRepr {
            info: ledger.info,
            transactions: ledger
                .transactions
                .into_iter()
                .map(|(key, meta)| TxRepr { key, meta })
                .collect(),
        }
    }
}

/// Fluent builder for closing a ledger.
///
/// The builder is the mutable, open form of a ledger; [`LedgerBuilder::build`]
/// seals it into an immutable [`Ledger`] with a content-derived hash.
///
/// # Example
///
/// ```rust
/// use ledgerwatch_common::Hash256;
/// use ledgerwatch_ledger::LedgerBuilder;
///
/// let ledger = LedgerBuilder::new(7, Hash256::hash(b"parent"))
///     .close_time(1_000)
///     .transaction(Hash256::hash(b"tx"), b"{}".to_vec())
///     .build();
/// assert_eq!(ledger.seq(), 7);
/// assert!(ledger.verify_hash());
/// ```
#[derive(Debug, Clone)]
pub struct LedgerBuilder {
    seq: u32,
    parent_hash: Hash256,
    close_time: u64,
    close_time_resolution: u32,
    state_hash: Option<Hash256>,
    transactions: BTreeMap<Hash256, Vec<u8>>,
}

impl LedgerBuilder {
    /// Start a ledger at `seq` on top of `parent_hash`.
    pub fn new(seq: u32, parent_hash: Hash256) -> Self {
        Self {
            seq,
            parent_hash,
            close_time: 0,
            close_time_resolution: DEFAULT_CLOSE_TIME_RESOLUTION,
            state_hash: None,
            transactions: BTreeMap::new(),
        }
    }

    /// Set the close time.
    pub fn close_time(mut self, close_time: u64) -> Self {
        self.close_time = close_time;
        self
    }

    /// Set the close time resolution.
    pub fn close_time_resolution(mut self, resolution: u32) -> Self {
        self.close_time_resolution = resolution;
        self
    }

    /// Set the state trie root.
    pub fn state_hash(mut self, state_hash: Hash256) -> Self {
        self.state_hash = Some(state_hash);
        self
    }

    /// Add or replace a transaction with raw metadata.
    pub fn transaction(mut self, key: Hash256, meta: Vec<u8>) -> Self {
        self.transactions.insert(key, meta);
        self
    }

    /// Add or replace a transaction with structured metadata.
    pub fn transaction_meta(self, key: Hash256, meta: &TxMeta) -> Self {
        self.transaction(key, meta.to_bytes())
    }

    /// Seal the ledger and derive its hash.
    pub fn build(self) -> Ledger {
        // Without an explicit state root, derive one from the position in the
        // chain so it is never zero.
        let state_hash = self.state_hash.unwrap_or_else(|| {
            Hash256::hash_parts(&[
                b"STATE",
                &self.seq.to_be_bytes(),
                self.parent_hash.as_bytes(),
            ])
        });
        let mut info = LedgerInfo {
            seq: self.seq,
            hash: Hash256::ZERO,
            parent_hash: self.parent_hash,
            close_time: self.close_time,
            close_time_resolution: self.close_time_resolution,
            state_hash,
            tx_hash: compute_tx_hash(&self.transactions),
        };
        info.hash = info.compute_hash();
        Ledger {
            info,
            transactions: self.transactions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u8) -> Hash256 {
        Hash256([n; 32])
    }

    #[test]
    fn test_hash_depends_on_contents() {
        let base = LedgerBuilder::new(10, key(1)).close_time(100);
        let a = base.clone().transaction(key(2), b"a".to_vec()).build();
        let b = base.clone().transaction(key(2), b"b".to_vec()).build();
        let c = base.clone().close_time(110).build();
        let d = base.build();

        assert_ne!(a.hash(), b.hash());
        assert_ne!(c.hash(), d.hash());
        assert!(!a.hash().is_zero());
        assert!(!d.state_hash().is_zero());
    }

    #[test]
    fn test_builder_is_deterministic() {
        let make = || {
            LedgerBuilder::new(3, key(9))
                .close_time(42)
                .transaction(key(5), b"x".to_vec())
                .transaction(key(4), b"y".to_vec())
                .build()
        };
        assert_eq!(make().hash(), make().hash());
        assert!(make().verify_hash());
    }

    #[test]
    fn test_transactions_in_key_order() {
        let ledger = LedgerBuilder::new(1, key(0))
            .transaction(key(9), vec![9])
            .transaction(key(3), vec![3])
            .transaction(key(6), vec![6])
            .build();
        let keys: Vec<Hash256> = ledger.transactions().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![key(3), key(6), key(9)]);
        assert_eq!(ledger.read_transaction(&key(6)), Some(&[6u8][..]));
        assert_eq!(ledger.read_transaction(&key(7)), None);
        assert_eq!(ledger.tx_count(), 3);
    }

    #[test]
    fn test_from_parts_rejects_duplicates() {
        let info = LedgerBuilder::new(1, key(0)).build().info().clone();
        let err = Ledger::from_parts(info, vec![(key(1), vec![]), (key(1), vec![1])]);
        assert!(matches!(err, Err(LedgerError::DuplicateTransaction(_))));
    }

    #[test]
    fn test_from_parts_keeps_given_hash() {
        let mut info = LedgerBuilder::new(1, key(0)).build().info().clone();
        info.hash = key(77);
        let ledger = Ledger::from_parts(info, Vec::new()).unwrap();
        assert_eq!(ledger.hash(), key(77));
        assert!(!ledger.verify_hash());
        assert!(matches!(
            ledger.check_hash(),
            Err(LedgerError::HashMismatch { .. })
        ));
    }

    #[test]
    fn test_check_hash_catches_tx_set_tampering() {
        let ledger = LedgerBuilder::new(3, key(0))
            .transaction(key(1), b"a".to_vec())
            .build();
        assert!(ledger.check_hash().is_ok());

        let tampered = Ledger::from_parts(ledger.info().clone(), vec![(key(1), b"b".to_vec())])
            .unwrap();
        let err = tampered.check_hash().unwrap_err();
        assert!(err.to_string().contains(&ledger.info().tx_hash.to_hex()));
    }

    #[test]
    fn test_json_form() {
        let ledger = LedgerBuilder::new(12, key(1))
            .close_time(500)
            .transaction(key(2), b"meta".to_vec())
            .build();
        let text = ledger.to_json_string().unwrap();
        assert!(text.contains("6d657461"));
        let back = Ledger::from_json_slice(text.as_bytes()).unwrap();
        assert_eq!(back, ledger);

        let summary = ledger.to_json();
        assert_eq!(summary["seq"], 12);
        assert_eq!(summary["tx_count"], 1);
    }
}
