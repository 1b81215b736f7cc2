use async_trait::async_trait;

use super::types::{EngineContext, EngineError, EngineResult};

/// Scraping backend trait
///
/// Engines only report raw success or failure. They never retry, pick other
/// engines or interpret status codes; the orchestrator does all of that.
/// Implementations should watch `ctx.abort` and return promptly once it
/// fires, although an attempt that is cancelled is also dropped at its next
/// await point.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Fetch `ctx.url` and return what was found
    async fn scrape(&self, ctx: &EngineContext) -> Result<EngineResult, EngineError>;

    /// Request-specific max-reasonable-time estimate in milliseconds.
    ///
    /// Overrides the declared estimate when `Some`. Non-finite or
    /// non-positive values are tolerated and mean "launch the next engine
    /// immediately".
    fn max_reasonable_time(&self, _ctx: &EngineContext) -> Option<f64> {
        None
    }
}
