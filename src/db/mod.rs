// Re-export the Database struct and other public items
pub mod core;
mod schema;
mod source;
mod unit;

pub use self::core::Database;
pub use sqlx::Row;
