pub mod schema;
pub mod writer;

pub use writer::{
    DailyTotal, PageHits, SqliteStore, VisitStore, apply_snapshot, query_daily_totals,
    query_hits, query_top_pages, query_total_hits,
};
