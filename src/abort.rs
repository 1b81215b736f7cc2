//! Hierarchical cancellation with tiered deadlines.
//!
//! An [`AbortManager`] is a stack of levels. The root level is the caller's
//! token (tier [`AbortTier::External`]), the next is the whole-scrape deadline
//! ([`AbortTier::Scrape`]) and every engine attempt pushes one more level
//! ([`AbortTier::Engine`]). Cancelling a level cancels everything below it and
//! nothing above it. Checks walk root-first, so the outermost level that fired
//! is the one reported.

use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbortTier {
    /// Cancellation requested by whoever called the scrape
    External,
    /// Whole-scrape deadline
    Scrape,
    /// Single engine attempt
    Engine,
}

impl fmt::Display for AbortTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortTier::External => f.write_str("external"),
            AbortTier::Scrape => f.write_str("scrape"),
            AbortTier::Engine => f.write_str("engine"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    Cancelled,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{tier} tier aborted ({reason:?})")]
pub struct AbortError {
    pub tier: AbortTier,
    pub reason: AbortReason,
}

impl AbortError {
    pub fn is_timeout(&self) -> bool {
        self.reason == AbortReason::TimedOut
    }
}

#[derive(Debug, Clone)]
struct Level {
    tier: AbortTier,
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Level {
    fn fired(&self, now: Instant) -> Option<AbortError> {
        if self.token.is_cancelled() {
            return Some(AbortError {
                tier: self.tier,
                reason: AbortReason::Cancelled,
            });
        }
        match self.deadline {
            Some(deadline) if now >= deadline => Some(AbortError {
                tier: self.tier,
                reason: AbortReason::TimedOut,
            }),
            _ => None,
        }
    }
}

/// Cancellation handle for one scrape or one engine attempt within it
#[derive(Debug, Clone)]
pub struct AbortManager {
    levels: Vec<Level>,
}

impl AbortManager {
    /// Root manager for a scrape: the caller's token (if any) plus the scrape deadline.
    pub fn new(external: Option<CancellationToken>, scrape_timeout: Duration) -> Self {
        let external = external.unwrap_or_default();
        let scrape = Level {
            tier: AbortTier::Scrape,
            token: external.child_token(),
            deadline: Some(Instant::now() + scrape_timeout),
        };
        let root = Level {
            tier: AbortTier::External,
            token: external,
            deadline: None,
        };

        Self {
            levels: vec![root, scrape],
        }
    }

    /// Derive a sub-manager that inherits every ancestor's cancellation and
    /// adds its own tier and optional deadline.
    pub fn child(&self, tier: AbortTier, timeout: Option<Duration>) -> Self {
        let mut levels = self.levels.clone();
        levels.push(Level {
            tier,
            token: self.leaf().token.child_token(),
            deadline: timeout.map(|t| Instant::now() + t),
        });
        Self { levels }
    }

    fn leaf(&self) -> &Level {
        // `new` seeds two levels and `child` only ever pushes
        &self.levels[self.levels.len() - 1]
    }

    pub fn tier(&self) -> AbortTier {
        self.leaf().tier
    }

    /// Cancel this level and all of its descendants
    pub fn cancel(&self) {
        self.leaf().token.cancel();
    }

    /// Token that is cancelled when this level (or an ancestor) is cancelled.
    /// Deadlines do not cancel it; use [`AbortManager::aborted`] for those.
    pub fn token(&self) -> CancellationToken {
        self.leaf().token.clone()
    }

    pub fn check(&self) -> Option<AbortError> {
        let now = Instant::now();
        self.levels.iter().find_map(|level| level.fired(now))
    }

    pub fn is_aborted(&self) -> bool {
        self.check().is_some()
    }

    pub fn throw_if_aborted(&self) -> Result<(), AbortError> {
        match self.check() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Earliest deadline among this level and its ancestors
    pub fn deadline(&self) -> Option<Instant> {
        self.levels.iter().filter_map(|level| level.deadline).min()
    }

    pub fn scrape_deadline(&self) -> Option<Instant> {
        self.levels
            .iter()
            .find(|level| level.tier == AbortTier::Scrape)
            .and_then(|level| level.deadline)
    }

    /// Resolves once any level fires, reporting the outermost one.
    pub async fn aborted(&self) -> AbortError {
        loop {
            if let Some(err) = self.check() {
                return err;
            }

            let token = self.leaf().token.clone();
            match self.deadline() {
                Some(deadline) => {
                    tokio::select! {
                        _ = token.cancelled() => {}
                        _ = tokio::time::sleep_until(deadline) => {}
                    }
                }
                None => token.cancelled().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG: Duration = Duration::from_secs(60);

    #[test]
    fn test_fresh_manager_is_not_aborted() {
        let manager = AbortManager::new(None, LONG);
        assert!(manager.throw_if_aborted().is_ok());
        assert!(!manager.is_aborted());
        assert_eq!(manager.tier(), AbortTier::Scrape);
        assert!(manager.scrape_deadline().is_some());
    }

    #[tokio::test]
    async fn test_child_cancel_does_not_touch_parent_or_siblings() {
        let root = AbortManager::new(None, LONG);
        let a = root.child(AbortTier::Engine, None);
        let b = root.child(AbortTier::Engine, None);

        a.cancel();

        let err = a.throw_if_aborted().unwrap_err();
        assert_eq!(err.tier, AbortTier::Engine);
        assert_eq!(err.reason, AbortReason::Cancelled);
        assert!(a.is_aborted());
        assert!(root.throw_if_aborted().is_ok());
        assert!(!b.is_aborted());
    }

    #[tokio::test]
    async fn test_parent_cancel_reaches_descendants_with_parent_tier() {
        let external = CancellationToken::new();
        let root = AbortManager::new(Some(external.clone()), LONG);
        let engine = root.child(AbortTier::Engine, None);

        external.cancel();

        let err = engine.throw_if_aborted().unwrap_err();
        assert_eq!(err.tier, AbortTier::External);
        assert!(engine.token().is_cancelled());
    }

    #[tokio::test]
    async fn test_engine_deadline_reports_engine_tier() {
        let root = AbortManager::new(None, LONG);
        let engine = root.child(AbortTier::Engine, Some(Duration::from_millis(10)));

        let err = engine.aborted().await;
        assert_eq!(err.tier, AbortTier::Engine);
        assert!(err.is_timeout());
        assert!(root.throw_if_aborted().is_ok());
    }

    #[tokio::test]
    async fn test_scrape_deadline_wins_over_longer_engine_deadline() {
        let root = AbortManager::new(None, Duration::from_millis(10));
        let engine = root.child(AbortTier::Engine, Some(LONG));

        let err = engine.aborted().await;
        assert_eq!(err.tier, AbortTier::Scrape);
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_aborted_wakes_on_cancel() {
        let root = AbortManager::new(None, LONG);
        let engine = root.child(AbortTier::Engine, None);
        let handle = engine.clone();

        let waiter = tokio::spawn(async move { handle.aborted().await });
        engine.cancel();

        let err = waiter.await.unwrap();
        assert_eq!(err.tier, AbortTier::Engine);
        assert_eq!(err.reason, AbortReason::Cancelled);
    }
}
