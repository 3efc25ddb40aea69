//! tether-align: a barcode-scoped paired-end aligner for linked-read
//! sequencing data.
//!
//! Read pairs tagged with a molecule barcode are aligned together, one
//! barcode batch at a time. Candidate placements pooled across the batch
//! form spatial clusters, and cluster membership resolves placements a
//! single-pair aligner would leave ambiguous.

pub mod align_opt;
pub mod aligner;
pub mod genome;
pub mod index;
pub mod io;
pub mod reads;
pub mod stats;
pub mod worker;

pub use align_opt::AlignOpt;
pub use aligner::{AlignError, BarcodeOrchestrator};
pub use index::{HashSeedIndex, ReferenceIndex};
pub use stats::AlignerStats;
pub use worker::run_alignment;
