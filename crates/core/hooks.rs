//! Caller-supplied property aggregation.
//!
//! The engine never inspects custom cluster properties. It calls these hooks
//! when a cluster is created and whenever a member is added to or removed
//! from it, then re-stamps the reserved keys (`isCluster`, `clusterSize`,
//! `zoom`), so hook writes to those keys are discarded.
//!
//! Hooks run inside the update path with the pyramid locked. They must not
//! call back into the provider.

use spatio_cluster_types::feature::Properties;
use std::fmt;
use std::sync::Arc;

/// Direction of a membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Add,
    Remove,
}

/// Custom per-cluster statistics.
///
/// `feature` is the member's properties: a leaf feature's own map, or a
/// finer-level cluster's map (recognisable by `isCluster: true`).
pub trait PropertyAggregator: Send + Sync {
    /// Initial properties of a cluster seeded by its first member.
    fn create_properties(&self, _feature: &Properties) -> Properties {
        Properties::new()
    }

    /// Fold a member in or out of `cluster`.
    fn aggregate_properties(
        &self,
        _cluster: &mut Properties,
        _feature: &Properties,
        _op: AggregateOp,
    ) {
    }
}

/// Tracks no custom properties.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAggregator;

impl PropertyAggregator for DefaultAggregator {}

type CreateFn = dyn Fn(&Properties) -> Properties + Send + Sync;
type AggregateFn = dyn Fn(&mut Properties, &Properties, AggregateOp) + Send + Sync;

/// Aggregator assembled from two closures.
///
/// ```
/// use spatio_cluster::hooks::{AggregateOp, FnAggregator, PropertyAggregator};
/// use spatio_cluster_types::feature::Properties;
///
/// let hooks = FnAggregator::new(
///     |_| {
///         let mut p = Properties::new();
///         p.insert("members".into(), 1.into());
///         p
///     },
///     |cluster, _feature, op| {
///         let n = cluster["members"].as_i64().unwrap_or(0);
///         let delta = if op == AggregateOp::Add { 1 } else { -1 };
///         cluster.insert("members".into(), (n + delta).into());
///     },
/// );
///
/// let mut props = hooks.create_properties(&Properties::new());
/// hooks.aggregate_properties(&mut props, &Properties::new(), AggregateOp::Add);
/// assert_eq!(props["members"], 2);
/// ```
#[derive(Clone)]
pub struct FnAggregator {
    create: Arc<CreateFn>,
    aggregate: Arc<AggregateFn>,
}

impl FnAggregator {
    pub fn new<C, A>(create: C, aggregate: A) -> Self
    where
        C: Fn(&Properties) -> Properties + Send + Sync + 'static,
        A: Fn(&mut Properties, &Properties, AggregateOp) + Send + Sync + 'static,
    {
        Self {
            create: Arc::new(create),
            aggregate: Arc::new(aggregate),
        }
    }
}

impl fmt::Debug for FnAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAggregator").finish_non_exhaustive()
    }
}

impl PropertyAggregator for FnAggregator {
    fn create_properties(&self, feature: &Properties) -> Properties {
        (self.create)(feature)
    }

    fn aggregate_properties(&self, cluster: &mut Properties, feature: &Properties, op: AggregateOp) {
        (self.aggregate)(cluster, feature, op)
    }
}
