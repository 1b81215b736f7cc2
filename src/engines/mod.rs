//! Engine abstraction for scrapebox
//!
//! Engines are the opaque backends that turn a URL into raw HTML, markdown
//! and a status code. This module defines what the orchestrator needs from
//! them and how they are declared.
//!
//! ## Key Components
//!
//! - [`Engine`] - Trait every backend implements
//! - [`EngineSpec`] - Static capability declaration (features, quality, pacing)
//! - [`EngineRegistry`] - Ordered registry of engines and their declarations
//! - [`EngineContext`] - Per-attempt view of the request handed to an engine
//! - [`EngineResult`] / [`EngineError`] - What an engine reports back
//!
//! ## Example
//!
//! ```rust,ignore
//! use scrapebox::engines::{EngineRegistry, EngineSpec};
//! use scrapebox::features::FeatureFlag;
//!
//! let mut registry = EngineRegistry::new();
//! registry.register(
//!     EngineSpec::builder()
//!         .name("browser")
//!         .features([FeatureFlag::Screenshot, FeatureFlag::Actions].into())
//!         .quality(50)
//!         .build(),
//!     Arc::new(MyBrowserEngine::new()),
//! );
//! ```

mod registry;
mod traits;
mod types;

pub use registry::{EngineRegistry, EngineSpec, RegisteredEngine, RegistryError};
pub use traits::Engine;
pub use types::{EngineContext, EngineError, EngineResult, PdfPrefetch};
