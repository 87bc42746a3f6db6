//! Backstitch core — continuous futures series construction.
//!
//! Builds one unbroken price/volume series out of a sequence of expiring
//! futures contracts:
//! - Rollover detection on traded volume: per-date liquidity leadership,
//!   corrected so the series never rolls back to a younger contract, one
//!   anchor per contract (`detect`)
//! - Multiplicative back-adjustment through a reverse-chronological walk
//!   that tolerates missing data at the roll (`adjust`)
//! - Ordering diagnostics and canonical sorting for raw tables (`ordering`)
//! - CSV/Parquet ingestion helpers for callers (`ingest`)
//!
//! The pipeline is a pure, synchronous transformation over an immutable
//! polars `DataFrame`; independent invocations share nothing and may run
//! concurrently.

pub mod adjust;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod ordering;

pub use adjust::build_continuous_series;
pub use detect::detect_rollover_anchors;
pub use error::ContinuousError;
