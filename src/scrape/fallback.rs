//! Ordered engine candidates for one scheduler run.

use std::cmp::Reverse;
use tracing::{debug, warn};

use crate::engines::{EngineRegistry, RegisteredEngine};
use crate::features::FeatureSet;

#[derive(Debug, Clone)]
pub struct FallbackEntry {
    pub engine: RegisteredEngine,
    /// Requested flags this engine cannot honor
    pub unsupported_features: FeatureSet,
}

impl FallbackEntry {
    pub fn name(&self) -> &str {
        &self.engine.spec.name
    }
}

/// Build the fallback list for the current feature set.
///
/// With `force_engine` the named engines are used verbatim and in the given
/// order. Otherwise an engine qualifies when its supported requested flags
/// are worth at least half of the total priority, and candidates are ordered
/// by support score, then quality, then registration order.
pub fn build_fallback_list(
    registry: &EngineRegistry,
    features: &FeatureSet,
    force_engine: Option<&[String]>,
) -> Vec<FallbackEntry> {
    if let Some(forced) = force_engine {
        return forced
            .iter()
            .filter_map(|name| match registry.get(name) {
                Ok(engine) => Some(FallbackEntry {
                    engine: engine.clone(),
                    unsupported_features: features.difference(&engine.spec.features),
                }),
                Err(e) => {
                    warn!(engine = %name, error = %e, "Forced engine is not registered, skipping");
                    None
                }
            })
            .collect();
    }

    let threshold = features.total_priority() / 2;

    let mut candidates: Vec<(usize, u32, FallbackEntry)> = registry
        .iter()
        .enumerate()
        .filter_map(|(position, entry)| {
            let unsupported = features.difference(&entry.spec.features);
            let supported_count = features.len() - unsupported.len();
            if !features.is_empty() && supported_count == 0 {
                return None;
            }

            let score = features.total_priority() - unsupported.total_priority();
            if score < threshold {
                return None;
            }

            Some((
                position,
                score,
                FallbackEntry {
                    engine: entry.clone(),
                    unsupported_features: unsupported,
                },
            ))
        })
        .collect();

    if candidates
        .iter()
        .any(|(_, _, entry)| entry.engine.spec.quality > 0)
    {
        candidates.retain(|(_, _, entry)| entry.engine.spec.quality > 0);
    }

    candidates.sort_by_key(|(position, score, entry)| {
        (Reverse(*score), Reverse(entry.engine.spec.quality), *position)
    });

    let list: Vec<FallbackEntry> = candidates.into_iter().map(|(_, _, entry)| entry).collect();
    debug!(
        features = %features,
        engines = ?list.iter().map(FallbackEntry::name).collect::<Vec<_>>(),
        "Built fallback list"
    );
    list
}
