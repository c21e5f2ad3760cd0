pub mod db;
pub mod query;
pub mod schema;
pub mod spans;
pub mod write;

pub use db::CollectorDb;
pub use spans::{IngestReport, SpanStore};
