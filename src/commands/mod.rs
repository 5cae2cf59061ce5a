pub mod days;
pub mod ingest;
pub mod query;
pub mod top;
