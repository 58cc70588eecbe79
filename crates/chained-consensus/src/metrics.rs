//! # Chain Metrics
//!
//! Prometheus metrics for monitoring the chained consensus core.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! chained-consensus = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `cbft_blocks_added_total` - Counter of blocks admitted to the forest
//! - `cbft_blocks_rejected_total` - Counter of rejected blocks (by reason)
//! - `cbft_votes_rejected_total` - Counter of rejected votes (by reason)
//! - `cbft_qcs_formed_total` - Counter of quorum certificates assembled
//! - `cbft_blocks_committed_total` - Counter of committed blocks
//! - `cbft_blocks_pruned_total` - Counter of blocks removed by pruning
//! - `cbft_high_qc_view` - Gauge of the highest certified view
//! - `cbft_chain_quality` - Gauge of honest / committed blocks

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{
    register_gauge, register_int_counter, register_int_counter_vec, register_int_gauge, Gauge,
    IntCounter, IntCounterVec, IntGauge,
};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Total blocks admitted to the forest
    pub static ref BLOCKS_ADDED: IntCounter = register_int_counter!(
        "cbft_blocks_added_total",
        "Total number of blocks admitted to the block forest"
    )
    .expect("Failed to create BLOCKS_ADDED metric");

    /// Total blocks rejected, labeled by rejection reason
    pub static ref BLOCKS_REJECTED: IntCounterVec = register_int_counter_vec!(
        "cbft_blocks_rejected_total",
        "Total number of blocks rejected",
        &["reason"]
    )
    .expect("Failed to create BLOCKS_REJECTED metric");

    /// Total votes rejected, labeled by rejection reason
    pub static ref VOTES_REJECTED: IntCounterVec = register_int_counter_vec!(
        "cbft_votes_rejected_total",
        "Total number of votes rejected",
        &["reason"]
    )
    .expect("Failed to create VOTES_REJECTED metric");

    /// Total quorum certificates assembled locally
    pub static ref QCS_FORMED: IntCounter = register_int_counter!(
        "cbft_qcs_formed_total",
        "Total number of quorum certificates formed"
    )
    .expect("Failed to create QCS_FORMED metric");

    /// Total blocks committed
    pub static ref BLOCKS_COMMITTED: IntCounter = register_int_counter!(
        "cbft_blocks_committed_total",
        "Total number of blocks committed"
    )
    .expect("Failed to create BLOCKS_COMMITTED metric");

    /// Total blocks removed by pruning
    pub static ref BLOCKS_PRUNED: IntCounter = register_int_counter!(
        "cbft_blocks_pruned_total",
        "Total number of blocks pruned from the forest"
    )
    .expect("Failed to create BLOCKS_PRUNED metric");

    /// View of the highest known quorum certificate
    pub static ref HIGH_QC_VIEW: IntGauge = register_int_gauge!(
        "cbft_high_qc_view",
        "View of the highest quorum certificate"
    )
    .expect("Failed to create HIGH_QC_VIEW metric");

    /// Honest share of committed blocks
    pub static ref CHAIN_QUALITY: Gauge = register_gauge!(
        "cbft_chain_quality",
        "Honest committed blocks divided by committed blocks"
    )
    .expect("Failed to create CHAIN_QUALITY metric");
}

/// Record a block admitted to the forest
#[cfg(feature = "metrics")]
pub fn record_block_added() {
    BLOCKS_ADDED.inc();
}

/// Record a rejected block with reason
#[cfg(feature = "metrics")]
pub fn record_block_rejected(reason: &str) {
    BLOCKS_REJECTED.with_label_values(&[reason]).inc();
}

/// Record a rejected vote with reason
#[cfg(feature = "metrics")]
pub fn record_vote_rejected(reason: &str) {
    VOTES_REJECTED.with_label_values(&[reason]).inc();
}

/// Record a quorum certificate formed
#[cfg(feature = "metrics")]
pub fn record_qc_formed() {
    QCS_FORMED.inc();
}

/// Record a commit and the pruning it triggered
#[cfg(feature = "metrics")]
pub fn record_commit(committed: usize, pruned: usize) {
    BLOCKS_COMMITTED.inc_by(committed as u64);
    BLOCKS_PRUNED.inc_by(pruned as u64);
}

/// Set the highest certified view
#[cfg(feature = "metrics")]
pub fn set_high_qc_view(view: u64) {
    HIGH_QC_VIEW.set(i64::try_from(view).unwrap_or(i64::MAX));
}

/// Set the current chain quality
#[cfg(feature = "metrics")]
pub fn set_chain_quality(quality: f64) {
    CHAIN_QUALITY.set(quality);
}

// No-op implementations when metrics feature is disabled
#[cfg(not(feature = "metrics"))]
pub fn record_block_added() {}

#[cfg(not(feature = "metrics"))]
pub fn record_block_rejected(_reason: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_vote_rejected(_reason: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_qc_formed() {}

#[cfg(not(feature = "metrics"))]
pub fn record_commit(_committed: usize, _pruned: usize) {}

#[cfg(not(feature = "metrics"))]
pub fn set_high_qc_view(_view: u64) {}

#[cfg(not(feature = "metrics"))]
pub fn set_chain_quality(_quality: f64) {}
