//! Preprint sources for the papercrawl pipeline
//!
//! Each source turns listing pages from its public API into [`Paper`]
//! records. [`JsonlSink`] persists them.

mod de;

pub mod arxiv;
pub mod biorxiv;
pub mod chemrxiv;
pub mod paper;
pub mod storage;

pub use arxiv::ArxivParser;
pub use biorxiv::BiorxivParser;
pub use chemrxiv::ChemRxivParser;
pub use paper::{Author, Paper, Source, normalize_whitespace};
pub use storage::{JsonlSink, StorageSummary, cleanup_tmp_files};
