//! Core of the catalog reload pipeline.
//!
//! This crate rebuilds the `products` / `substitutions` dataset in shadow
//! ("buffer") tables and promotes them to the live names in one atomic step.
//!
//! # Architecture
//!
//! ```text
//!  IdGenerator ──► RowSynthesizer ──► BatchLoader ──► *_buffer tables
//!                                                        │
//!  SchemaManager (reset / create live / create shadow)   │
//!                                                        ▼
//!                  SwapCoordinator: Empty → LiveBuilding → ShadowBuilding → Promoted
//! ```
//!
//! Every database interaction goes through the [`ReloadStore`] trait, so the
//! same pipeline runs against PostgreSQL, MySQL, or the in-memory
//! [`MemoryStore`] used by tests.
//!
//! # Example
//!
//! ```rust
//! use reload_core::{run_pipeline, MemoryStore, PipelineConfig};
//!
//! # tokio_test::block_on(async {
//! let store = MemoryStore::new();
//! let config = PipelineConfig {
//!     product_count: 10,
//!     ..PipelineConfig::default()
//! };
//! let summary = run_pipeline(&store, &config).await.unwrap();
//! assert_eq!(summary.products.rows, 10);
//! # });
//! ```

pub mod deadline;
pub mod error;
pub mod ids;
pub mod loader;
pub mod memory;
pub mod pipeline;
pub mod schema;
pub mod store;
pub mod swap;
pub mod synth;
pub mod types;
pub mod verify;

pub use deadline::{bounded, Operation};
pub use error::{Phase, ReloadError};
pub use ids::IdGenerator;
pub use loader::{BatchLoader, LoadRow, LoadStats, DEFAULT_BATCH_SIZE};
pub use memory::{FailPoint, MemoryStore};
pub use pipeline::{run_pipeline, PipelineConfig, RunSummary};
pub use schema::SchemaManager;
pub use store::{ConnectParams, ConnectTarget, ReloadStore, RowBatch, SwapPlan};
pub use swap::{SwapCoordinator, SwapState};
pub use synth::RowSynthesizer;
pub use types::{Incarnation, LogicalTable, Product, Substitution};
pub use verify::{verify_dataset, verify_live, VerifyReport};
