//! Domain layer of the chained consensus core
//!
//! - forest: levelled block forest with pruning
//! - quorum: vote aggregation into quorum certificates
//! - blockchain: admission, high QC and the commit rule
//! - config: replica set and fault bound

mod blockchain;
mod config;
mod error;
mod forest;
mod quorum;

pub use blockchain::*;
pub use config::*;
pub use error::*;
pub use forest::*;
pub use quorum::*;
