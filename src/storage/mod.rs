mod comments;
mod posts;
mod schema;
mod sources;
mod types;

pub use schema::Database;
pub use types::{CacheCleared, DatabaseError, NewSource, UpsertOutcome};
