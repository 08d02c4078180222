//! Process-wide cache of each user's favorites. Reads go through the
//! cache; a successful toggle invalidates the acting user's entry so the
//! next read sees the new state.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use anyhow::Result;
use rusqlite::Connection;

use crate::store::{self, FavoriteEntry};

static FAVORITES_CACHE: OnceLock<Mutex<HashMap<i64, Vec<FavoriteEntry>>>> = OnceLock::new();

fn cache() -> &'static Mutex<HashMap<i64, Vec<FavoriteEntry>>> {
    FAVORITES_CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// The user's favorites, served from cache when present.
pub fn favorites_for_user(connection: &Connection, user_id: i64) -> Result<Vec<FavoriteEntry>> {
    if let Ok(guard) = cache().lock()
        && let Some(entries) = guard.get(&user_id)
    {
        return Ok(entries.clone());
    }

    let entries = store::list_favorites(connection, user_id)?;
    if let Ok(mut guard) = cache().lock() {
        guard.insert(user_id, entries.clone());
    }
    Ok(entries)
}

/// Drop the cached favorites of one user after their state changed.
pub fn invalidate_user(user_id: i64) {
    if let Ok(mut guard) = cache().lock() {
        guard.remove(&user_id);
    }
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::{favorites_for_user, invalidate_user};
    use crate::store::{Direction, run_migrations, toggle};

    fn store_with_favorite(user_id: i64) -> Connection {
        let connection = Connection::open_in_memory().expect("open in-memory db");
        run_migrations(&connection).expect("migrate");
        toggle(&connection, 0, "Alpha", user_id, Direction::Favorite).expect("favorite");
        connection
    }

    #[test]
    fn cached_read_survives_store_change_until_invalidated() {
        // User ids are unique per test; the cache is process-wide.
        let user_id = 9101;
        let connection = store_with_favorite(user_id);

        let first = favorites_for_user(&connection, user_id).expect("first read");
        assert_eq!(first.len(), 1);

        toggle(&connection, 0, "Beta", user_id, Direction::Favorite).expect("favorite beta");
        let stale = favorites_for_user(&connection, user_id).expect("stale read");
        assert_eq!(stale.len(), 1);

        invalidate_user(user_id);
        let fresh = favorites_for_user(&connection, user_id).expect("fresh read");
        assert_eq!(fresh.len(), 2);
    }

    #[test]
    fn invalidating_one_user_keeps_other_entries() {
        let first_user = 9201;
        let second_user = 9202;
        let connection = store_with_favorite(first_user);
        toggle(&connection, 0, "Alpha", second_user, Direction::Favorite).expect("favorite");

        favorites_for_user(&connection, first_user).expect("warm first");
        favorites_for_user(&connection, second_user).expect("warm second");

        toggle(&connection, 0, "Beta", first_user, Direction::Favorite).expect("beta first");
        toggle(&connection, 0, "Beta", second_user, Direction::Favorite).expect("beta second");
        invalidate_user(first_user);

        assert_eq!(
            favorites_for_user(&connection, first_user)
                .expect("first read")
                .len(),
            2
        );
        // Second user was not invalidated and still sees the cached state.
        assert_eq!(
            favorites_for_user(&connection, second_user)
                .expect("second read")
                .len(),
            1
        );
    }
}
