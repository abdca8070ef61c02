//! Quality tier selection over the variants a manifest actually offers
//!
//! Selection never upgrades: asking for `sd` when only `fhd` and `hd` exist
//! is an error, not a silent bump to a higher tier.

use crate::error::{ManifestError, Result};
use crate::types::Tier;

/// Concrete tiers in descending quality order, used for `best` resolution
/// and for downgrade fallback
const FALLBACK_ORDER: [Tier; 4] = [Tier::Fhd, Tier::Hd, Tier::Sd, Tier::Ld];

/// Resolve a requested tier against the tiers available in a manifest
///
/// `best` picks the highest available concrete tier. A concrete request is
/// honored exactly when available; otherwise the next tier *down* in
/// `[fhd, hd, sd, ld]` is taken. The choice is deterministic for a given
/// (request, available) pair.
pub fn select_tier(requested: Tier, available: &[Tier]) -> Result<Tier> {
    if available.is_empty() {
        return Err(no_suitable(requested, available));
    }

    let start = match requested {
        Tier::Best => 0,
        concrete => FALLBACK_ORDER
            .iter()
            .position(|t| *t == concrete)
            .unwrap_or(0),
    };

    FALLBACK_ORDER[start..]
        .iter()
        .find(|t| available.contains(t))
        .copied()
        .ok_or_else(|| no_suitable(requested, available))
}

fn no_suitable(requested: Tier, available: &[Tier]) -> crate::error::Error {
    ManifestError::NoSuitableTier {
        requested: requested.to_string(),
        available: available
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(", "),
    }
    .into()
}
