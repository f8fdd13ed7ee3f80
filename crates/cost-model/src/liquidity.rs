// In crates/cost-model/src/liquidity.rs

use std::collections::HashMap;
use std::sync::Arc;

use core_types::Symbol;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::types::{LiquidityInfo, LiquidityTier, ResolvedLiquidity, TierProfiles};

/// Supplies 24h volume / spread / depth per symbol.
///
/// Implementations may be backed by a static table or by an injected service;
/// the estimator only ever sees them through a `LiquidityCache`.
pub trait LiquiditySource: Send + Sync {
    fn lookup(&self, symbol: &Symbol) -> Option<LiquidityInfo>;
}

/// An in-memory liquidity table.
#[derive(Debug, Clone, Default)]
pub struct StaticLiquidityTable {
    entries: HashMap<Symbol, LiquidityInfo>,
}

impl StaticLiquidityTable {
    pub fn new(entries: impl IntoIterator<Item = LiquidityInfo>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|info| (info.symbol.clone(), info))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl LiquiditySource for StaticLiquidityTable {
    fn lookup(&self, symbol: &Symbol) -> Option<LiquidityInfo> {
        self.entries.get(symbol).cloned()
    }
}

/// Resolves each symbol once per evaluation and remembers the answer.
///
/// Unknown symbols resolve to the `VeryLow` tier with `known = false`.
pub struct LiquidityCache {
    source: Arc<dyn LiquiditySource>,
    tiers: TierProfiles,
    resolved: RwLock<HashMap<Symbol, ResolvedLiquidity>>,
}

impl LiquidityCache {
    pub fn new(source: Arc<dyn LiquiditySource>, tiers: TierProfiles) -> Self {
        Self {
            source,
            tiers,
            resolved: RwLock::new(HashMap::new()),
        }
    }

    pub fn resolve(&self, symbol: &Symbol) -> ResolvedLiquidity {
        if let Some(hit) = self.resolved.read().get(symbol) {
            return *hit;
        }

        let resolved = match self.source.lookup(symbol) {
            Some(info) => {
                let tier = LiquidityTier::from_volume(info.volume_24h_usd);
                let profile = self.tiers.get(tier);
                debug!(%symbol, ?tier, volume = info.volume_24h_usd, "Liquidity resolved.");
                ResolvedLiquidity {
                    tier,
                    spread_bps: info
                        .spread_bps
                        .filter(|s| s.is_finite() && *s >= 0.0)
                        .unwrap_or(profile.base_spread_bps),
                    depth_usd: info
                        .depth_usd
                        .filter(|d| d.is_finite() && *d > 0.0)
                        .unwrap_or(profile.default_depth_usd),
                    known: true,
                }
            }
            None => {
                let profile = self.tiers.get(LiquidityTier::VeryLow);
                warn!(%symbol, "Symbol missing from liquidity table; assuming very low liquidity.");
                ResolvedLiquidity {
                    tier: LiquidityTier::VeryLow,
                    spread_bps: profile.base_spread_bps,
                    depth_usd: profile.default_depth_usd,
                    known: false,
                }
            }
        };

        self.resolved.write().insert(symbol.clone(), resolved);
        resolved
    }

    /// Number of distinct symbols resolved so far.
    pub fn resolved_count(&self) -> usize {
        self.resolved.read().len()
    }
}
