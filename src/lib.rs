pub mod db;
pub mod logging;
pub mod unit;

pub const TARGET_DB: &str = "db_query";
pub const TARGET_PIPELINE: &str = "pipeline";
