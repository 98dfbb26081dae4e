//! Transaction metadata.
//!
//! Each transaction in a ledger carries an opaque metadata blob. When two
//! ledgers disagree on that blob for the same transaction, the blob is parsed
//! into a [`TxMeta`] so the mismatch can be narrowed to the result code, the
//! apply order, the list of touched ledger entries, or some combination.
//!
//! The serialized form is JSON:
//!
//! ```json
//! {
//!   "result": "tesSUCCESS",
//!   "index": 3,
//!   "affected_nodes": [
//!     { "action": "modified", "entry_type": "AccountRoot",
//!       "ledger_index": "…", "fields": { "Balance": "1000" } }
//!   ]
//! }
//! ```

use ledgerwatch_common::Hash256;
use serde::{Deserialize, Serialize};

use crate::Result;

/// How a transaction touched a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeAction {
    Created,
    Modified,
    Deleted,
}

/// One ledger entry affected by a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedNode {
    pub action: NodeAction,
    /// Kind of entry, e.g. `AccountRoot`.
    pub entry_type: String,
    /// Key of the entry in the state trie.
    pub ledger_index: Hash256,
    /// Entry fields after (or, for deletions, before) the change.
    #[serde(default)]
    pub fields: serde_json::Value,
}

/// Parsed per-transaction execution metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxMeta {
    /// Result code token, e.g. `tesSUCCESS` or `tecUNFUNDED_PAYMENT`.
    pub result: String,
    /// Position at which the transaction was applied within its ledger.
    pub index: u32,
    /// Entries created, modified or deleted by the transaction.
    #[serde(default)]
    pub affected_nodes: Vec<AffectedNode>,
}

impl TxMeta {
    /// Metadata with no affected nodes.
    pub fn new(result: impl Into<String>, index: u32) -> Self {
        Self {
            result: result.into(),
            index,
            affected_nodes: Vec::new(),
        }
    }

    /// Append an affected node.
    pub fn with_node(mut self, node: AffectedNode) -> Self {
        self.affected_nodes.push(node);
        self
    }

    /// Decode metadata from its serialized form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Encode metadata to its serialized form.
    pub fn to_bytes(&self) -> Vec<u8> {
        // A struct of strings, integers and JSON values cannot fail to encode.
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Full JSON view, used when dumping the expensive node-list diffs.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// JSON view of the affected nodes only.
    pub fn nodes_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.affected_nodes).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_defaults() {
        let meta = TxMeta::from_bytes(br#"{"result":"tesSUCCESS","index":2}"#).unwrap();
        assert_eq!(meta, TxMeta::new("tesSUCCESS", 2));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(TxMeta::from_bytes(b"\x00\x01").is_err());
        assert!(TxMeta::from_bytes(br#"{"index":2}"#).is_err());
    }

    #[test]
    fn test_encode_decode_with_nodes() {
        let meta = TxMeta::new("tecUNFUNDED_PAYMENT", 0).with_node(AffectedNode {
            action: NodeAction::Modified,
            entry_type: "AccountRoot".to_string(),
            ledger_index: Hash256::hash(b"acct"),
            fields: serde_json::json!({"Balance": "10"}),
        });
        let decoded = TxMeta::from_bytes(&meta.to_bytes()).unwrap();
        assert_eq!(decoded, meta);
        assert_eq!(meta.nodes_json()[0]["action"], "modified");
    }
}
