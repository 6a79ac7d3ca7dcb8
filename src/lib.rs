//! AssetCat Core - Dependency-Resolving Asset Concatenator
//!
//! # Guarantees
//! 1. Required sources appear exactly once, in depth-first order
//! 2. Every required source shares the root's content type
//! 3. Included sources are re-rendered inline wherever they are named
//! 4. Digest and length are fed segment by segment, never recomputed
//! 5. Staleness is always checked against live timestamps

pub mod pathname;
pub mod source;
pub mod filesystem;
pub mod engines;
pub mod hashing;
pub mod compat;
pub mod asset;
pub mod config;

pub use pathname::Pathname;
pub use source::{SourceFile, SourceEnvironment, MemoryEnvironment};
pub use filesystem::FileEnvironment;
pub use engines::{EngineRegistry, EngineError, RenderStep, TeraEngine};
pub use hashing::{sha1_hex, RunningDigest};
pub use asset::{AssetError, AssetManifest, AssetPipeline, ConcatenatedAsset};
pub use config::{AssetConfig, ConfigError};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
