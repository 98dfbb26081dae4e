//! Peer message type codes.

use std::fmt;

/// Protocol message type, carried big-endian in header bytes 4–5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Manifests,
    Ping,
    Cluster,
    Endpoints,
    Transaction,
    GetLedger,
    LedgerData,
    ProposeLedger,
    StatusChange,
    HaveSet,
    Validation,
    GetObjects,
    ValidatorList,
    /// Any code this node does not name.
    Other(u16),
}

impl MessageType {
    /// Wire code of this type.
    pub fn code(self) -> u16 {
        match self {
            MessageType::Manifests => 2,
            MessageType::Ping => 3,
            MessageType::Cluster => 5,
            MessageType::Endpoints => 15,
            MessageType::Transaction => 30,
            MessageType::GetLedger => 31,
            MessageType::LedgerData => 32,
            MessageType::ProposeLedger => 33,
            MessageType::StatusChange => 34,
            MessageType::HaveSet => 35,
            MessageType::Validation => 41,
            MessageType::GetObjects => 42,
            MessageType::ValidatorList => 54,
            MessageType::Other(code) => code,
        }
    }

    /// Returns true if payloads of this type may be sent compressed.
    ///
    /// Small, latency-sensitive consensus messages are never compressed.
    pub fn is_compressible(self) -> bool {
        matches!(
            self,
            MessageType::Manifests
                | MessageType::Endpoints
                | MessageType::Transaction
                | MessageType::GetLedger
                | MessageType::LedgerData
                | MessageType::GetObjects
                | MessageType::ValidatorList
        )
    }

    /// Human-readable name for logging.
    pub fn name(self) -> &'static str {
        match self {
            MessageType::Manifests => "MANIFESTS",
            MessageType::Ping => "PING",
            MessageType::Cluster => "CLUSTER",
            MessageType::Endpoints => "ENDPOINTS",
            MessageType::Transaction => "TRANSACTION",
            MessageType::GetLedger => "GET_LEDGER",
            MessageType::LedgerData => "LEDGER_DATA",
            MessageType::ProposeLedger => "PROPOSE_LEDGER",
            MessageType::StatusChange => "STATUS_CHANGE",
            MessageType::HaveSet => "HAVE_SET",
            MessageType::Validation => "VALIDATION",
            MessageType::GetObjects => "GET_OBJECTS",
            MessageType::ValidatorList => "VALIDATOR_LIST",
            MessageType::Other(_) => "UNKNOWN",
        }
    }
}

impl From<u16> for MessageType {
    fn from(code: u16) -> Self {
        match code {
            2 => MessageType::Manifests,
            3 => MessageType::Ping,
            5 => MessageType::Cluster,
            15 => MessageType::Endpoints,
            30 => MessageType::Transaction,
            31 => MessageType::GetLedger,
            32 => MessageType::LedgerData,
            33 => MessageType::ProposeLedger,
            34 => MessageType::StatusChange,
            35 => MessageType::HaveSet,
            41 => MessageType::Validation,
            42 => MessageType::GetObjects,
            54 => MessageType::ValidatorList,
            other => MessageType::Other(other),
        }
    }
}

impl From<MessageType> for u16 {
    fn from(t: MessageType) -> Self {
        t.code()
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Other(code) => write!(f, "UNKNOWN({})", code),
            known => write!(f, "{}", known.name()),
        }
    }
}
