//! Reciprocal Rank Fusion (RRF) over named-vector result lists.
//!
//! RRF is a rank aggregation technique that combines ranked lists from multiple
//! retrieval systems without requiring score normalization.
//!
//! # Algorithm
//!
//! For each point `p` appearing in ranking `r`:
//!
//! ```text
//! RRF_score(p) = sum(1 / (k + rank_r(p)))
//! ```
//!
//! Where:
//! - `k` = 60 (standard constant, dampens the weight of top ranks)
//! - `rank_r(p)` = position of point `p` in ranking `r` (1-indexed)
//!
//! Points absent from a list contribute nothing for it.
//!
//! # Ordering
//!
//! 1. Fused score, descending
//! 2. Number of lists the point appeared in, descending
//! 3. Point ID
//!
//! Per-point contributions are summed in sorted order, so two points with the
//! same multiset of ranks get bit-identical scores and reach the tie-breaks.
//!
//! # References
//!
//! - Cormack, G. V., Clarke, C. L., & Buettcher, S. (2009). "Reciprocal Rank Fusion
//!   outperforms Condorcet and individual Rank Learning Methods"

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::models::FusedHit;
use crate::storage::ScoredPoint;

/// Default RRF smoothing constant.
pub const DEFAULT_RRF_K: f64 = 60.0;

/// Default number of fused results.
pub const DEFAULT_LIMIT: usize = 10;

/// Configuration for RRF fusion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RrfConfig {
    /// The k constant for RRF scoring (default: 60).
    ///
    /// Higher values dampen the contribution of top-ranked points.
    pub k: f64,

    /// Maximum number of results to return.
    pub limit: usize,
}

impl Default for RrfConfig {
    fn default() -> Self {
        Self {
            k: DEFAULT_RRF_K,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl RrfConfig {
    /// Creates a new RRF configuration with the specified limit.
    #[must_use]
    pub const fn with_limit(limit: usize) -> Self {
        Self {
            k: DEFAULT_RRF_K,
            limit,
        }
    }

    /// Sets the k constant.
    #[must_use]
    pub const fn with_k(mut self, k: f64) -> Self {
        self.k = k;
        self
    }
}

/// One ranked result list, best first.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedList {
    /// Name of the list (the named vector it came from).
    pub source: String,
    /// Hits in rank order.
    pub hits: Vec<ScoredPoint>,
}

impl RankedList {
    /// Creates a ranked list.
    #[must_use]
    pub fn new(source: impl Into<String>, hits: Vec<ScoredPoint>) -> Self {
        Self {
            source: source.into(),
            hits,
        }
    }

    /// Creates a ranked list of bare IDs with empty payloads.
    #[must_use]
    pub fn from_ids(source: impl Into<String>, ids: &[&str]) -> Self {
        let hits = ids
            .iter()
            .map(|id| ScoredPoint {
                id: (*id).to_string(),
                score: 0.0,
                payload: serde_json::Value::Null,
            })
            .collect();
        Self::new(source, hits)
    }
}

/// Reciprocal Rank Fusion combiner.
///
/// # Example
///
/// ```ignore
/// use cardsmith::services::{RankedList, RrfFusion};
///
/// let fusion = RrfFusion::with_limit(10);
/// let fused = fusion.fuse(&[
///     RankedList::from_ids("identity", &["A", "B", "C"]),
///     RankedList::from_ids("content", &["B", "A"]),
///     RankedList::from_ids("structure", &["C"]),
/// ]);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct RrfFusion {
    config: RrfConfig,
}

struct Accumulator {
    contributions: Vec<f64>,
    lists: usize,
    ranks: BTreeMap<String, usize>,
    payload: serde_json::Value,
}

impl RrfFusion {
    /// Creates a new RRF fusion combiner with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new RRF fusion combiner with the specified configuration.
    #[must_use]
    pub const fn with_config(config: RrfConfig) -> Self {
        Self { config }
    }

    /// Creates a new RRF fusion combiner with the specified limit.
    #[must_use]
    pub const fn with_limit(limit: usize) -> Self {
        Self {
            config: RrfConfig::with_limit(limit),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> RrfConfig {
        self.config
    }

    /// Fuses ranked lists into one deduplicated ranking.
    ///
    /// A point listed twice in the same list counts once, at its best rank.
    ///
    /// ```text
    /// identity:  [A@1, B@2, C@3]
    /// content:   [B@1, A@2]
    /// structure: [C@1]
    ///
    /// A = 1/61 + 1/62   B = 1/62 + 1/61   C = 1/63 + 1/61
    ///
    /// A and B tie on score and list count; the ID breaks the tie.
    /// Final ranking: [A, B, C]
    /// ```
    #[must_use]
    pub fn fuse(&self, lists: &[RankedList]) -> Vec<FusedHit> {
        let k = self.config.k;
        let capacity: usize = lists.iter().map(|l| l.hits.len()).sum();
        let mut points: HashMap<&str, Accumulator> = HashMap::with_capacity(capacity);

        let names = display_names(lists);
        for (list, source) in lists.iter().zip(&names) {
            let mut seen_ids: HashSet<&str> = HashSet::new();
            for (position, hit) in list.hits.iter().enumerate() {
                let id = hit.id.as_str();
                if !seen_ids.insert(id) {
                    continue;
                }
                let rank = position + 1;
                #[allow(clippy::cast_precision_loss)]
                let contribution = 1.0 / (k + rank as f64);

                let entry = points.entry(id).or_insert_with(|| Accumulator {
                    contributions: Vec::new(),
                    lists: 0,
                    ranks: BTreeMap::new(),
                    payload: hit.payload.clone(),
                });
                entry.contributions.push(contribution);
                entry.lists += 1;
                entry.ranks.insert(source.clone(), rank);
            }
        }

        let mut fused: Vec<FusedHit> = points
            .into_iter()
            .map(|(id, mut acc)| {
                acc.contributions.sort_by(f64::total_cmp);
                FusedHit {
                    id: id.to_string(),
                    score: acc.contributions.iter().sum(),
                    lists: acc.lists,
                    ranks: acc.ranks,
                    payload: acc.payload,
                }
            })
            .collect();

        fused.sort_by(compare);
        fused.truncate(self.config.limit);

        #[allow(clippy::cast_precision_loss)]
        metrics::histogram!("cardsmith_fusion_results").record(fused.len() as f64);
        fused
    }
}

/// One distinct name per list. A repeated name gets `#<index>` appended
/// until it no longer clashes with any earlier name.
fn display_names(lists: &[RankedList]) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::with_capacity(lists.len());
    lists
        .iter()
        .enumerate()
        .map(|(idx, list)| {
            let mut name = list.source.clone();
            while used.contains(&name) {
                name = format!("{name}#{idx}");
            }
            used.insert(name.clone());
            name
        })
        .collect()
}

fn compare(a: &FusedHit, b: &FusedHit) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.list_count().cmp(&a.list_count()))
        .then_with(|| a.id.cmp(&b.id))
}
