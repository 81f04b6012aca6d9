//! Join engine: keys source rows by canonical country and unions them.

mod engine;
mod keyed;

pub use engine::{JoinEngine, JoinOrder, JoinedCountryRecord, JoinedTable};
pub use keyed::{KeyedRow, KeyedTable, KeyingReport, TableField};
