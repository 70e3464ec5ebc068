pub mod merge;
pub mod record;
pub mod record_table;
pub mod schema;
