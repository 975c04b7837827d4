//! Storage layer: record store and vector index.
//!
//! Traits live in [`traits`] and [`vector`]; the reference implementations
//! are SQLite-backed ([`SqliteStore`], [`SqliteVectorIndex`]) and double as
//! in-memory fakes for tests via `open_in_memory`.

pub mod sqlite;
pub mod traits;
pub mod vector;

pub use sqlite::SqliteStore;
pub use traits::{PersistentSummary, RecordStore};
pub use vector::{RecordKind, SqliteVectorIndex, VectorFilter, VectorHit, VectorIndex, VectorMetadata};

use std::sync::{Mutex, MutexGuard};

/// Helper to acquire a mutex lock with poison recovery.
///
/// If the mutex is poisoned (a panic in a previous critical section), we
/// recover the inner value and log a warning so one failed operation does
/// not cascade into every later one.
pub(crate) fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("storage mutex was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// Escapes SQL LIKE wildcards in a string.
///
/// `SQLite` LIKE patterns treat `%` as "any characters" and `_` as "single
/// character"; user input containing them must be escaped to match literally.
/// Uses `\` as the escape character (requires `ESCAPE '\'` in the LIKE clause).
pub(crate) fn escape_like_wildcards(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' | '_' | '\\' => {
                result.push('\\');
                result.push(c);
            }
            _ => result.push(c),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like_wildcards() {
        assert_eq!(escape_like_wildcards("100%"), "100\\%");
        assert_eq!(escape_like_wildcards("user_name"), "user\\_name");
        assert_eq!(escape_like_wildcards("plain"), "plain");
    }
}
