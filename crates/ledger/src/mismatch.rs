//! Forensic diagnosis of built/validated ledger divergence.
//!
//! When a node's built ledger and the network's validated ledger disagree
//! for one sequence, [`MismatchAnalyzer::analyze`] walks from the cheapest,
//! most general explanation down to per-transaction detail and stops at the
//! first one that applies:
//!
//! 1. Either ledger unobtainable: nothing to analyze.
//! 2. Different parent: the node was building on another chain
//!    (synchronization divergence, not a fault).
//! 3. Same parent, different close time: the round agreed on different
//!    values (Byzantine-failure signal).
//! 4. Otherwise: diff the two transaction sets by key and classify every
//!    transaction whose metadata differs.
//!
//! Findings go to the log (`error!` for summaries and both ledger headers,
//! `debug!` for per-transaction details) and
//! are returned as a [`Diagnosis`].

use std::cmp::Ordering;
use std::sync::Arc;

use ledgerwatch_common::{Counter, Hash256};
use serde::Serialize;
use tracing::{debug, enabled, error, Level};

use crate::meta::TxMeta;
use crate::tracker::MismatchInput;
use crate::Ledger;

/// Resolves ledger hashes to full ledgers.
pub trait LedgerSource {
    /// Fetch a ledger by hash through whatever cache/store path applies.
    fn ledger_by_hash(&self, hash: &Hash256) -> Option<Arc<Ledger>>;
}

/// Outcome of a mismatch analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnosis {
    /// One or both ledgers could not be obtained.
    Unanalyzable { built_found: bool, valid_found: bool },
    /// The two ledgers were built on different parents.
    PriorLedger {
        built_parent: Hash256,
        valid_parent: Hash256,
    },
    /// Same parent but different agreed close time.
    CloseTime {
        built_close_time: u64,
        valid_close_time: u64,
    },
    /// Same parent and close time; the transaction sets were compared.
    Transactions(TxDiffReport),
}

impl Diagnosis {
    /// The pattern points at fault or malice rather than lag.
    pub fn is_byzantine(&self) -> bool {
        matches!(self, Diagnosis::CloseTime { .. })
    }

    /// The node had simply diverged onto another parent.
    pub fn is_sync_divergence(&self) -> bool {
        matches!(self, Diagnosis::PriorLedger { .. })
    }

    /// Transaction-level report, if the analysis got that far.
    pub fn tx_report(&self) -> Option<&TxDiffReport> {
        match self {
            Diagnosis::Transactions(report) => Some(report),
            _ => None,
        }
    }
}

/// Comparison of the consensus transaction sets behind each side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusSetComparison {
    Same(Hash256),
    Different { built: Hash256, validated: Hash256 },
}

/// Transaction-level differences between the built and validated ledgers.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TxDiffReport {
    /// Present only when both consensus-set hashes were known.
    pub consensus_set: Option<ConsensusSetComparison>,
    pub built_count: usize,
    pub valid_count: usize,
    /// Both ledgers contain exactly the same transaction keys.
    pub same_tx_set: bool,
    /// Keys in the built ledger only.
    pub missing_from_valid: Vec<Hash256>,
    /// Keys in the validated ledger only.
    pub missing_from_built: Vec<Hash256>,
    /// Keys present on both sides with differing metadata.
    pub metadata_diffs: Vec<(Hash256, MetaDifference)>,
}

/// Which parts of one transaction's metadata differ between the two sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaDifference {
    /// The bytes differ but result, index and nodes all compare equal.
    NoApparentMismatch,
    Result,
    Index,
    ResultAndIndex,
    Nodes,
    ResultAndNodes,
    IndexAndNodes,
    ResultIndexAndNodes,
    /// Only the validated side has readable metadata.
    BuiltHasNone,
    /// Only the built side has readable metadata.
    ValidHasNone,
    /// Neither side's metadata could be read.
    BothUnreadable,
}

impl MetaDifference {
    fn from_flags(result: bool, index: bool, nodes: bool) -> Self {
        match (result, index, nodes) {
            (false, false, false) => MetaDifference::NoApparentMismatch,
            (true, false, false) => MetaDifference::Result,
            (false, true, false) => MetaDifference::Index,
            (true, true, false) => MetaDifference::ResultAndIndex,
            (false, false, true) => MetaDifference::Nodes,
            (true, false, true) => MetaDifference::ResultAndNodes,
            (false, true, true) => MetaDifference::IndexAndNodes,
            (true, true, true) => MetaDifference::ResultIndexAndNodes,
        }
    }

    /// Whether the result code is among the differing fields.
    pub fn result_differs(self) -> bool {
        matches!(
            self,
            MetaDifference::Result
                | MetaDifference::ResultAndIndex
                | MetaDifference::ResultAndNodes
                | MetaDifference::ResultIndexAndNodes
        )
    }

    /// Whether the apply index is among the differing fields.
    pub fn index_differs(self) -> bool {
        matches!(
            self,
            MetaDifference::Index
                | MetaDifference::ResultAndIndex
                | MetaDifference::IndexAndNodes
                | MetaDifference::ResultIndexAndNodes
        )
    }

    /// Whether the affected node list is among the differing fields.
    pub fn nodes_differ(self) -> bool {
        matches!(
            self,
            MetaDifference::Nodes
                | MetaDifference::ResultAndNodes
                | MetaDifference::IndexAndNodes
                | MetaDifference::ResultIndexAndNodes
        )
    }
}

/// Runs the ordered mismatch checks for one diverging pair.
pub struct MismatchAnalyzer<'a> {
    source: &'a dyn LedgerSource,
    mismatches: &'a Counter,
}

impl<'a> MismatchAnalyzer<'a> {
    /// Analyzer resolving ledgers through `source` and counting into
    /// `mismatches`.
    pub fn new(source: &'a dyn LedgerSource, mismatches: &'a Counter) -> Self {
        Self { source, mismatches }
    }

    /// Diagnose why `input.built` and `input.valid` differ.
    ///
    /// # Panics
    ///
    /// Panics if the two hashes are equal, or if both ledgers resolve but
    /// carry different sequence numbers.
    pub fn analyze(&self, input: &MismatchInput) -> Diagnosis {
        assert!(
            input.built != input.valid,
            "invariant violated: mismatch analysis on equal hashes {}",
            input.built
        );
        self.mismatches.inc();

        let built_ledger = self.source.ledger_by_hash(&input.built);
        let valid_ledger = self.source.ledger_by_hash(&input.valid);

        let (built, valid) = match (built_ledger, valid_ledger) {
            (Some(built), Some(valid)) => (built, valid),
            (built, valid) => {
                error!(
                    built = %input.built,
                    built_found = built.is_some(),
                    valid = %input.valid,
                    valid_found = valid.is_some(),
                    "MISMATCH cannot be analyzed"
                );
                return Diagnosis::Unanalyzable {
                    built_found: built.is_some(),
                    valid_found: valid.is_some(),
                };
            }
        };

        assert!(
            built.seq() == valid.seq(),
            "invariant violated: mismatch between ledgers {} and {}",
            built.seq(),
            valid.seq()
        );

        if enabled!(Level::DEBUG) {
            debug!(
                seq = built.seq(),
                built = %built.to_json(),
                valid = %valid.to_json(),
                consensus = %input.consensus,
                "Mismatch"
            );
        }

        // Disagreement over prior ledger indicates sync issue
        if built.parent_hash() != valid.parent_hash() {
            error!(
                seq = built.seq(),
                built_parent = %built.parent_hash(),
                valid_parent = %valid.parent_hash(),
                "MISMATCH on prior ledger"
            );
            return Diagnosis::PriorLedger {
                built_parent: built.parent_hash(),
                valid_parent: valid.parent_hash(),
            };
        }

        // Disagreement over close time indicates Byzantine failure
        if built.close_time() != valid.close_time() {
            error!(
                seq = built.seq(),
                built_close_time = built.close_time(),
                valid_close_time = valid.close_time(),
                "MISMATCH on close time"
            );
            return Diagnosis::CloseTime {
                built_close_time: built.close_time(),
                valid_close_time: valid.close_time(),
            };
        }

        let mut report = TxDiffReport {
            consensus_set: compare_consensus_sets(input),
            ..TxDiffReport::default()
        };
        diff_transactions(&built, &valid, &mut report);
        Diagnosis::Transactions(report)
    }
}

fn compare_consensus_sets(input: &MismatchInput) -> Option<ConsensusSetComparison> {
    let (built, validated) = match (input.built_consensus_hash, input.validated_consensus_hash) {
        (Some(built), Some(validated)) => (built, validated),
        _ => return None,
    };
    if built != validated {
        error!(
            built = %built,
            validated = %validated,
            "MISMATCH on consensus transaction set"
        );
        Some(ConsensusSetComparison::Different { built, validated })
    } else {
        error!(set = %built, "MISMATCH with same consensus transaction set");
        Some(ConsensusSetComparison::Same(built))
    }
}

/// Merge-join the two key-ordered transaction sets.
fn diff_transactions(built: &Ledger, valid: &Ledger, report: &mut TxDiffReport) {
    let built_txs: Vec<(&Hash256, &[u8])> = built.transactions().collect();
    let valid_txs: Vec<(&Hash256, &[u8])> = valid.transactions().collect();

    report.built_count = built_txs.len();
    report.valid_count = valid_txs.len();
    report.same_tx_set = built_txs.len() == valid_txs.len()
        && built_txs
            .iter()
            .zip(valid_txs.iter())
            .all(|((b, _), (v, _))| b == v);

    if report.same_tx_set {
        error!(count = report.built_count, "MISMATCH with same transactions");
    } else {
        error!(
            built = report.built_count,
            valid = report.valid_count,
            "MISMATCH with different transactions"
        );
    }
    error!(ledger = %built.to_json(), "built");
    error!(ledger = %valid.to_json(), "valid");

    let (mut b, mut v) = (0, 0);
    while b < built_txs.len() && v < valid_txs.len() {
        let (built_key, built_meta) = built_txs[b];
        let (valid_key, valid_meta) = valid_txs[v];
        match built_key.cmp(valid_key) {
            Ordering::Less => {
                log_missing(built, built_key, "valid");
                report.missing_from_valid.push(*built_key);
                b += 1;
            }
            Ordering::Greater => {
                log_missing(valid, valid_key, "built");
                report.missing_from_built.push(*valid_key);
                v += 1;
            }
            Ordering::Equal => {
                if built_meta != valid_meta {
                    let diff = classify_metadata(built, valid, built_key);
                    report.metadata_diffs.push((*built_key, diff));
                }
                b += 1;
                v += 1;
            }
        }
    }
    for (key, _) in &built_txs[b..] {
        log_missing(built, key, "valid");
        report.missing_from_valid.push(**key);
    }
    for (key, _) in &valid_txs[v..] {
        log_missing(valid, key, "built");
        report.missing_from_built.push(**key);
    }
}

/// Log a transaction found in only one ledger; `missing_in` names the other.
fn log_missing(ledger: &Ledger, tx: &Hash256, missing_in: &str) {
    match ledger.read_meta(tx) {
        Some(meta) => debug!(
            tx = %tx,
            meta = %meta.to_json(),
            "MISMATCH on TX: {} is missing this transaction",
            missing_in
        ),
        None => debug!(tx = %tx, "MISMATCH on TX: {} is missing this transaction", missing_in),
    }
}

/// Narrow a metadata byte difference down to the fields that differ.
fn classify_metadata(built: &Ledger, valid: &Ledger, tx: &Hash256) -> MetaDifference {
    let (built_meta, valid_meta) = match (built.read_meta(tx), valid.read_meta(tx)) {
        (Some(b), Some(v)) => (b, v),
        (None, Some(v)) => {
            error!(tx = %tx, meta = %v.to_json(), "MISMATCH on TX: Metadata Difference (built has none)");
            return MetaDifference::BuiltHasNone;
        }
        (Some(b), None) => {
            error!(tx = %tx, meta = %b.to_json(), "MISMATCH on TX: Metadata Difference (valid has none)");
            return MetaDifference::ValidHasNone;
        }
        (None, None) => {
            error!(tx = %tx, "MISMATCH on TX: metadata unreadable on both sides");
            return MetaDifference::BothUnreadable;
        }
    };

    let diff = MetaDifference::from_flags(
        built_meta.result != valid_meta.result,
        built_meta.index != valid_meta.index,
        built_meta.affected_nodes != valid_meta.affected_nodes,
    );
    log_metadata_difference(tx, diff, &built_meta, &valid_meta);
    diff
}

fn log_metadata_difference(tx: &Hash256, diff: MetaDifference, built: &TxMeta, valid: &TxMeta) {
    match diff {
        MetaDifference::NoApparentMismatch => {
            error!(tx = %tx, "MISMATCH on TX: No apparent mismatches detected!");
        }
        MetaDifference::ResultAndIndex => {
            debug!(tx = %tx, "MISMATCH on TX: Different result and index!");
            debug!(result = %built.result, index = built.index, " Built:");
            debug!(result = %valid.result, index = valid.index, " Valid:");
        }
        MetaDifference::Result => {
            debug!(tx = %tx, "MISMATCH on TX: Different result!");
            debug!(result = %built.result, " Built:");
            debug!(result = %valid.result, " Valid:");
        }
        MetaDifference::Index => {
            debug!(tx = %tx, "MISMATCH on TX: Different index!");
            debug!(index = built.index, " Built:");
            debug!(index = valid.index, " Valid:");
        }
        MetaDifference::ResultIndexAndNodes => {
            debug!(tx = %tx, "MISMATCH on TX: Different result, index and nodes!");
            debug!(meta = %built.to_json(), " Built:");
            debug!(meta = %valid.to_json(), " Valid:");
        }
        MetaDifference::ResultAndNodes => {
            debug!(tx = %tx, "MISMATCH on TX: Different result and nodes!");
            debug!(result = %built.result, nodes = %built.nodes_json(), " Built:");
            debug!(result = %valid.result, nodes = %valid.nodes_json(), " Valid:");
        }
        MetaDifference::IndexAndNodes => {
            debug!(tx = %tx, "MISMATCH on TX: Different index and nodes!");
            debug!(index = built.index, nodes = %built.nodes_json(), " Built:");
            debug!(index = valid.index, nodes = %valid.nodes_json(), " Valid:");
        }
        MetaDifference::Nodes => {
            debug!(tx = %tx, "MISMATCH on TX: Different nodes!");
            debug!(nodes = %built.nodes_json(), " Built:");
            debug!(nodes = %valid.nodes_json(), " Valid:");
        }
        MetaDifference::BuiltHasNone
        | MetaDifference::ValidHasNone
        | MetaDifference::BothUnreadable => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::meta::{AffectedNode, NodeAction};
    use crate::LedgerBuilder;

    #[derive(Default)]
    struct Ledgers(HashMap<Hash256, Arc<Ledger>>);

    impl Ledgers {
        fn add(&mut self, ledger: Ledger) -> Hash256 {
            let hash = ledger.hash();
            self.0.insert(hash, Arc::new(ledger));
            hash
        }
    }

    impl LedgerSource for Ledgers {
        fn ledger_by_hash(&self, hash: &Hash256) -> Option<Arc<Ledger>> {
            self.0.get(hash).cloned()
        }
    }

    fn key(n: u8) -> Hash256 {
        Hash256([n; 32])
    }

    fn input(built: Hash256, valid: Hash256) -> MismatchInput {
        MismatchInput {
            seq: 10,
            built,
            valid,
            built_consensus_hash: None,
            validated_consensus_hash: None,
            consensus: serde_json::Value::Null,
        }
    }

    fn node(balance: &str) -> AffectedNode {
        AffectedNode {
            action: NodeAction::Modified,
            entry_type: "AccountRoot".to_string(),
            ledger_index: key(200),
            fields: serde_json::json!({ "Balance": balance }),
        }
    }

    fn base() -> LedgerBuilder {
        LedgerBuilder::new(10, key(1)).close_time(100)
    }

    /// Diagnose two ledgers that differ only in one transaction's metadata.
    fn classify(built: TxMeta, valid: TxMeta) -> MetaDifference {
        let mut ledgers = Ledgers::default();
        let b = ledgers.add(base().transaction_meta(key(5), &built).build());
        let v = ledgers.add(base().transaction_meta(key(5), &valid).build());
        let counter = Counter::new();
        let diagnosis = MismatchAnalyzer::new(&ledgers, &counter).analyze(&input(b, v));
        let report = diagnosis.tx_report().unwrap();
        assert!(report.same_tx_set);
        assert_eq!(report.metadata_diffs.len(), 1);
        report.metadata_diffs[0].1
    }

    #[test]
    fn test_unanalyzable() {
        let mut ledgers = Ledgers::default();
        let b = ledgers.add(base().build());
        let counter = Counter::new();
        let diagnosis = MismatchAnalyzer::new(&ledgers, &counter).analyze(&input(b, key(99)));
        assert_eq!(
            diagnosis,
            Diagnosis::Unanalyzable {
                built_found: true,
                valid_found: false
            }
        );
        assert_eq!(counter.get(), 1);
    }

    #[test]
    fn test_prior_ledger() {
        let mut ledgers = Ledgers::default();
        let b = ledgers.add(base().build());
        let v = ledgers.add(LedgerBuilder::new(10, key(2)).close_time(200).build());
        let counter = Counter::new();
        let diagnosis = MismatchAnalyzer::new(&ledgers, &counter).analyze(&input(b, v));
        assert!(diagnosis.is_sync_divergence());
        assert!(diagnosis.tx_report().is_none());
    }

    #[test]
    fn test_close_time() {
        let mut ledgers = Ledgers::default();
        let b = ledgers.add(base().build());
        let v = ledgers.add(base().close_time(110).build());
        let counter = Counter::new();
        let diagnosis = MismatchAnalyzer::new(&ledgers, &counter).analyze(&input(b, v));
        assert!(diagnosis.is_byzantine());
        assert_eq!(
            diagnosis,
            Diagnosis::CloseTime {
                built_close_time: 100,
                valid_close_time: 110
            }
        );
    }

    #[test]
    fn test_missing_transactions() {
        let mut ledgers = Ledgers::default();
        let m = TxMeta::new("tesSUCCESS", 0);
        let b = ledgers.add(
            base()
                .transaction_meta(key(1), &m)
                .transaction_meta(key(2), &m)
                .build(),
        );
        let v = ledgers.add(
            base()
                .transaction_meta(key(1), &m)
                .transaction_meta(key(3), &m)
                .build(),
        );
        let counter = Counter::new();
        let mut inp = input(b, v);
        inp.built_consensus_hash = Some(key(50));
        inp.validated_consensus_hash = Some(key(51));
        let diagnosis = MismatchAnalyzer::new(&ledgers, &counter).analyze(&inp);

        let report = diagnosis.tx_report().unwrap();
        assert_eq!(report.missing_from_valid, vec![key(2)]);
        assert_eq!(report.missing_from_built, vec![key(3)]);
        assert!(report.metadata_diffs.is_empty());
        assert!(!report.same_tx_set);
        assert_eq!((report.built_count, report.valid_count), (2, 2));
        assert_eq!(
            report.consensus_set,
            Some(ConsensusSetComparison::Different {
                built: key(50),
                validated: key(51)
            })
        );
    }

    #[test]
    fn test_trailing_transactions() {
        let mut ledgers = Ledgers::default();
        let m = TxMeta::new("tesSUCCESS", 0);
        let b = ledgers.add(
            base()
                .transaction_meta(key(1), &m)
                .transaction_meta(key(7), &m)
                .transaction_meta(key(8), &m)
                .build(),
        );
        let v = ledgers.add(base().transaction_meta(key(1), &m).build());
        let counter = Counter::new();
        let diagnosis = MismatchAnalyzer::new(&ledgers, &counter).analyze(&input(b, v));
        let report = diagnosis.tx_report().unwrap();
        assert_eq!(report.missing_from_valid, vec![key(7), key(8)]);
        assert!(report.missing_from_built.is_empty());
        assert_eq!(report.consensus_set, None);
    }

    #[test]
    fn test_classify_result_only() {
        let diff = classify(TxMeta::new("tesSUCCESS", 1), TxMeta::new("tecPATH_DRY", 1));
        assert_eq!(diff, MetaDifference::Result);
        assert!(diff.result_differs());
        assert!(!diff.index_differs());
        assert!(!diff.nodes_differ());
    }

    #[test]
    fn test_classify_combinations() {
        let a = TxMeta::new("tesSUCCESS", 1).with_node(node("10"));
        assert_eq!(
            classify(a.clone(), TxMeta::new("tesSUCCESS", 2).with_node(node("10"))),
            MetaDifference::Index
        );
        assert_eq!(
            classify(a.clone(), TxMeta::new("tecX", 2).with_node(node("10"))),
            MetaDifference::ResultAndIndex
        );
        assert_eq!(
            classify(a.clone(), TxMeta::new("tesSUCCESS", 1).with_node(node("11"))),
            MetaDifference::Nodes
        );
        assert_eq!(
            classify(a.clone(), TxMeta::new("tecX", 1).with_node(node("11"))),
            MetaDifference::ResultAndNodes
        );
        assert_eq!(
            classify(a.clone(), TxMeta::new("tesSUCCESS", 2).with_node(node("11"))),
            MetaDifference::IndexAndNodes
        );
        assert_eq!(
            classify(a, TxMeta::new("tecX", 2)),
            MetaDifference::ResultIndexAndNodes
        );
    }

    #[test]
    fn test_classify_same_fields_different_bytes() {
        let mut ledgers = Ledgers::default();
        let b = ledgers.add(
            base()
                .transaction(key(5), br#"{"result":"tesSUCCESS","index":0}"#.to_vec())
                .build(),
        );
        let v = ledgers.add(
            base()
                .transaction(key(5), br#"{"index":0,"result":"tesSUCCESS"}"#.to_vec())
                .build(),
        );
        let counter = Counter::new();
        let diagnosis = MismatchAnalyzer::new(&ledgers, &counter).analyze(&input(b, v));
        assert_eq!(
            diagnosis.tx_report().unwrap().metadata_diffs,
            vec![(key(5), MetaDifference::NoApparentMismatch)]
        );
    }

    #[test]
    fn test_classify_one_side_unreadable() {
        let mut ledgers = Ledgers::default();
        let b = ledgers.add(base().transaction(key(5), b"garbage".to_vec()).build());
        let v = ledgers.add(
            base()
                .transaction_meta(key(5), &TxMeta::new("tesSUCCESS", 0))
                .build(),
        );
        let counter = Counter::new();
        let diagnosis = MismatchAnalyzer::new(&ledgers, &counter).analyze(&input(b, v));
        assert_eq!(
            diagnosis.tx_report().unwrap().metadata_diffs,
            vec![(key(5), MetaDifference::BuiltHasNone)]
        );
    }

    #[test]
    #[should_panic(expected = "invariant violated")]
    fn test_equal_hashes_rejected() {
        let ledgers = Ledgers::default();
        let counter = Counter::new();
        MismatchAnalyzer::new(&ledgers, &counter).analyze(&input(key(1), key(1)));
    }

    #[test]
    #[should_panic(expected = "invariant violated")]
    fn test_different_sequences_rejected() {
        let mut ledgers = Ledgers::default();
        let b = ledgers.add(base().build());
        let v = ledgers.add(LedgerBuilder::new(11, key(1)).close_time(100).build());
        let counter = Counter::new();
        MismatchAnalyzer::new(&ledgers, &counter).analyze(&input(b, v));
    }

    #[test]
    fn test_diagnosis_json() {
        let diagnosis = Diagnosis::CloseTime {
            built_close_time: 1,
            valid_close_time: 2,
        };
        let json = serde_json::to_value(&diagnosis).unwrap();
        assert_eq!(json["kind"], "close_time");
        assert_eq!(json["valid_close_time"], 2);
    }

    /// Collects `(level, message)` for every event.
    #[derive(Clone, Default)]
    struct CapturedEvents(Arc<parking_lot::Mutex<Vec<(Level, String)>>>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for CapturedEvents {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            struct Message(String);
            impl tracing::field::Visit for Message {
                fn record_debug(
                    &mut self,
                    field: &tracing::field::Field,
                    value: &dyn std::fmt::Debug,
                ) {
                    if field.name() == "message" {
                        self.0 = format!("{:?}", value);
                    }
                }
            }
            let mut message = Message(String::new());
            event.record(&mut message);
            self.0.lock().push((*event.metadata().level(), message.0));
        }
    }

    #[test]
    fn test_ledger_headers_logged_at_error() {
        use tracing_subscriber::layer::SubscriberExt;

        let mut ledgers = Ledgers::default();
        let b = ledgers.add(base().transaction(key(5), b"{}".to_vec()).build());
        let v = ledgers.add(base().transaction(key(6), b"{}".to_vec()).build());
        let counter = Counter::new();

        let events = CapturedEvents::default();
        let subscriber = tracing_subscriber::registry().with(events.clone());
        let diagnosis = tracing::subscriber::with_default(subscriber, || {
            MismatchAnalyzer::new(&ledgers, &counter).analyze(&input(b, v))
        });
        assert!(!diagnosis.tx_report().unwrap().same_tx_set);

        let events = events.0.lock();
        for header in ["built", "valid"] {
            assert!(
                events
                    .iter()
                    .any(|(level, message)| *level == Level::ERROR && message == header),
                "missing error-level {} header",
                header
            );
        }
    }
}
