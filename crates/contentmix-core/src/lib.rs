//! # Contentmix Core
//!
//! Merges paginated content from several independent providers into one
//! ordered stream.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | In-process sample provider |
//! | [`client`] | Provider client contract and fetch errors |
//! | [`config`] | Service configuration and environment overrides |
//! | [`cursor`] | Per-request progress state |
//! | [`domain`] | Content items, provider descriptors, query parameters |
//! | [`engine`] | Batched concurrent fetch-and-merge |
//! | [`error`] | Configuration, sink, and run errors |
//! | [`registry`] | Ordered provider mix with client lookup |
//! | [`sink`] | Incremental result sinks |
//! | [`source`] | Provider identifiers |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use contentmix_core::{BatchFetchEngine, CollectingSink, MixConfig, ProviderRegistry, RequestCursor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MixConfig::default();
//!     let registry = Arc::new(ProviderRegistry::from_config(&config)?);
//!     let engine = BatchFetchEngine::with_config(registry, config.engine_config());
//!
//!     let mut cursor = RequestCursor::new(5, 0);
//!     let mut sink = CollectingSink::new();
//!     engine.run(&mut cursor, &mut sink).await?;
//!
//!     for item in sink.items() {
//!         println!("{} from {}", item.title, item.source);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  HTTP handler   │
//! └────────┬────────┘
//!          │ (count, offset)
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ BatchFetchEngine│────▶│ ProviderRegistry │
//! └────────┬────────┘     └────────┬─────────┘
//!          │                       │ primary / fallback
//!          ▼                       ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │  ResultSink     │     │  Client (trait)  │
//! └─────────────────┘     └──────────────────┘
//! ```

pub mod adapters;
pub mod client;
pub mod config;
pub mod cursor;
pub mod domain;
pub mod engine;
pub mod error;
pub mod registry;
pub mod sink;
pub mod source;

// Adapter implementations
pub use adapters::{SampleBehavior, SampleProvider};

// Client contract
pub use client::{Client, ClientFuture, FetchError, FetchErrorKind};

// Configuration
pub use config::MixConfig;

// Request state
pub use cursor::RequestCursor;

// Domain models
pub use domain::{ContentItem, ContentQuery, ProviderDescriptor, UtcDateTime};

// Engine
pub use engine::{AbortPolicy, BatchFetchEngine, EngineConfig, FetchOutcome, RunSummary};

// Error types
pub use error::{ConfigurationError, MixError, ProviderRole, SinkError, ValidationError};

// Registry
pub use registry::{ProviderRegistry, RegistryBuilder};

// Sinks
pub use sink::{CollectingSink, JsonArrayEncoder, JsonArrayWriter, ResultSink, SinkFuture};

// Source identifiers
pub use source::ProviderId;
