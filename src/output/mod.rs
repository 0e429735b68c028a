// Output module
pub mod table;

pub use table::{
    CacheStatsRow, ConversationRow, OutputFormat, ReconcileRow, SnapshotSummaryRow, format_number,
};
