//! Model Management Module
//!
//! Tracks the catalog of transcription models and drives each one through
//! its lifecycle.
//!
//! # Architecture
//!
//! ```text
//! ModelManager
//!   ├── Catalog        - built-in + registered descriptors, persisted flags
//!   ├── Transfers      - one in-flight download per id, fan-out to joiners
//!   │     └── AssetFetcher (HttpFetcher)
//!   ├── extract        - tar/tar.gz unpacking for directory models
//!   └── EngineHost     - loaded engine, pending load, session status
//!
//! none → downloading → (extracting →) downloaded → loading → ready
//!          │               │                          │        │
//!          └── error ──────┴──────────────────────────┘    unloaded
//! ```
//!
//! Failures always return a model to a retryable state: a failed download or
//! extraction leaves nothing on disk, a failed load keeps the previous engine.

pub mod catalog;
pub mod download;
pub mod extract;
pub mod manager;
pub mod parakeet;
pub mod types;
pub mod whisper;

pub use catalog::Catalog;
pub use download::{AssetFetcher, HttpFetcher, ProgressFn};
pub use manager::ModelManager;
pub use types::{DownloadProgress, EngineKind, ModelDescriptor, ModelStatus, ModelView};

pub const DEFAULT_MODEL: &str = whisper::DEFAULT_MODEL;
