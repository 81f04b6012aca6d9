//! Metric deriver: computed fields over joined country records.

mod metric;
mod rank;
mod registry;

pub use metric::{Comparison, DerivedMetric, MetricRule, NullPolicy, RankMethod, RankOrder, ZeroDivision};
pub use rank::{ordinal, rank_values};
pub use registry::MetricRegistry;
