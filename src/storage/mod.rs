pub mod engine;
pub mod memory;
pub mod sqlite;

pub use engine::{Dialect, Engine, RowStream};
pub use memory::Memory;
pub use sqlite::SqliteEngine;
