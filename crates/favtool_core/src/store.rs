use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use serde::Serialize;

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "favoritelist",
    sql: include_str!("migrations/v001_favoritelist.sql"),
}];

/// Whether a toggle adds or removes the favorite relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Favorite,
    Unfavorite,
}

/// One persisted favoritelist row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FavoriteEntry {
    pub user_id: i64,
    pub namespace: i32,
    pub title: String,
}

/// Report returned after running migrations.
#[derive(Debug, Clone)]
pub struct MigrateReport {
    pub applied: Vec<AppliedMigration>,
    pub current_version: u32,
}

#[derive(Debug, Clone)]
pub struct AppliedMigration {
    pub version: u32,
    pub name: String,
}

/// Open the favorites database with the pragmas every caller needs.
/// Creates parent directories if they do not exist.
pub fn open_store(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create database directory {}", parent.display()))?;
    }
    let connection =
        Connection::open(db_path).with_context(|| format!("failed to open {}", db_path.display()))?;
    connection
        .busy_timeout(Duration::from_secs(5))
        .context("failed to set sqlite busy timeout")?;
    connection
        .pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign_keys pragma")?;
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to enable WAL journal mode")?;
    Ok(connection)
}

/// Run all pending migrations against an open store.
pub fn run_migrations(connection: &Connection) -> Result<MigrateReport> {
    ensure_schema_migrations_table(connection)?;

    let current = current_version(connection)?;
    let mut applied = Vec::new();
    for migration in MIGRATIONS {
        if migration.version <= current {
            continue;
        }
        apply_migration(connection, migration).with_context(|| {
            format!(
                "failed to apply migration v{:03}_{}",
                migration.version, migration.name
            )
        })?;
        applied.push(AppliedMigration {
            version: migration.version,
            name: migration.name.to_string(),
        });
    }

    Ok(MigrateReport {
        applied,
        current_version: current_version(connection)?,
    })
}

/// Returns the number of migrations that have not yet been applied.
pub fn pending_migration_count(db_path: &Path) -> Result<usize> {
    if !db_path.exists() {
        return Ok(MIGRATIONS.len());
    }
    let connection = open_store(db_path)?;
    ensure_schema_migrations_table(&connection)?;
    let current = current_version(&connection)?;
    Ok(MIGRATIONS.iter().filter(|m| m.version > current).count())
}

/// Returns the highest applied migration version, or 0 if none applied.
pub fn current_version(connection: &Connection) -> Result<u32> {
    let version: i64 = connection
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .context("failed to read current migration version")?;
    u32::try_from(version).context("migration version does not fit into u32")
}

/// The toggle operation: a single conditional mutation of the
/// favoritelist relation.
///
/// `Favorite` inserts the (user, namespace, title) row and reports `true`
/// iff a row was actually created; an already-favorited page is not an
/// error, just no change. `Unfavorite` deletes the matching row and
/// reports `true` iff exactly one row went away. The result is always the
/// exact affected-row count from SQLite, never an assumption. Callers
/// must pass the subject namespace; talk pages normalize before this
/// point.
pub fn toggle(
    connection: &Connection,
    subject_namespace: i32,
    page_key: &str,
    user_id: i64,
    direction: Direction,
) -> Result<bool> {
    let affected = match direction {
        Direction::Favorite => connection
            .execute(
                "INSERT OR IGNORE INTO favoritelist (fl_user, fl_namespace, fl_title)
                 VALUES (?1, ?2, ?3)",
                params![user_id, subject_namespace, page_key],
            )
            .with_context(|| format!("failed to insert favorite for {page_key}"))?,
        Direction::Unfavorite => connection
            .execute(
                "DELETE FROM favoritelist
                 WHERE fl_user = ?1 AND fl_namespace = ?2 AND fl_title = ?3",
                params![user_id, subject_namespace, page_key],
            )
            .with_context(|| format!("failed to delete favorite for {page_key}"))?,
    };
    Ok(affected == 1)
}

/// All favorites of one user, ordered by namespace then title.
pub fn list_favorites(connection: &Connection, user_id: i64) -> Result<Vec<FavoriteEntry>> {
    let mut statement = connection
        .prepare(
            "SELECT fl_user, fl_namespace, fl_title FROM favoritelist
             WHERE fl_user = ?1
             ORDER BY fl_namespace, fl_title",
        )
        .context("failed to prepare favoritelist query")?;
    let rows = statement
        .query_map([user_id], |row| {
            Ok(FavoriteEntry {
                user_id: row.get(0)?,
                namespace: row.get(1)?,
                title: row.get(2)?,
            })
        })
        .context("failed to query favoritelist")?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row.context("failed to read favoritelist row")?);
    }
    Ok(entries)
}

pub fn is_favorited(
    connection: &Connection,
    user_id: i64,
    subject_namespace: i32,
    page_key: &str,
) -> Result<bool> {
    let exists: i64 = connection
        .query_row(
            "SELECT EXISTS(
                SELECT 1 FROM favoritelist
                WHERE fl_user = ?1 AND fl_namespace = ?2 AND fl_title = ?3
             )",
            params![user_id, subject_namespace, page_key],
            |row| row.get(0),
        )
        .context("failed to check favorite existence")?;
    Ok(exists == 1)
}

pub fn count_favorites(connection: &Connection, user_id: i64) -> Result<usize> {
    let count: i64 = connection
        .query_row(
            "SELECT COUNT(*) FROM favoritelist WHERE fl_user = ?1",
            [user_id],
            |row| row.get(0),
        )
        .context("failed to count favorites")?;
    usize::try_from(count).context("favorite count does not fit into usize")
}

/// Total favoritelist rows across all users.
pub fn count_all_favorites(connection: &Connection) -> Result<usize> {
    let count: i64 = connection
        .query_row("SELECT COUNT(*) FROM favoritelist", [], |row| row.get(0))
        .context("failed to count favoritelist rows")?;
    usize::try_from(count).context("favorite count does not fit into usize")
}

fn ensure_schema_migrations_table(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at_unix INTEGER NOT NULL
            );",
        )
        .context("failed to create schema_migrations table")
}

fn apply_migration(connection: &Connection, migration: &Migration) -> Result<()> {
    connection
        .execute_batch("SAVEPOINT migration_apply")
        .context("failed to create savepoint")?;

    let result = (|| -> Result<()> {
        connection
            .execute_batch(migration.sql)
            .with_context(|| format!("SQL execution failed for v{:03}", migration.version))?;

        let now_unix = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .context("system clock error")?
            .as_secs();

        connection
            .execute(
                "INSERT INTO schema_migrations (version, name, applied_at_unix) VALUES (?1, ?2, ?3)",
                params![
                    i64::from(migration.version),
                    migration.name,
                    i64::try_from(now_unix).context("timestamp does not fit into i64")?,
                ],
            )
            .context("failed to record migration")?;
        Ok(())
    })();

    match result {
        Ok(()) => {
            connection
                .execute_batch("RELEASE SAVEPOINT migration_apply")
                .context("failed to release savepoint")?;
            Ok(())
        }
        Err(err) => {
            let _ = connection.execute_batch("ROLLBACK TO SAVEPOINT migration_apply");
            let _ = connection.execute_batch("RELEASE SAVEPOINT migration_apply");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;
    use tempfile::tempdir;

    use super::{
        Direction, MIGRATIONS, count_favorites, is_favorited, list_favorites, open_store,
        pending_migration_count, run_migrations, toggle,
    };

    fn memory_store() -> Connection {
        let connection = Connection::open_in_memory().expect("open in-memory db");
        run_migrations(&connection).expect("run migrations");
        connection
    }

    #[test]
    fn migrations_apply_on_fresh_db() {
        let connection = Connection::open_in_memory().expect("open");
        let report = run_migrations(&connection).expect("run_migrations");
        assert_eq!(report.applied.len(), MIGRATIONS.len());
        assert_eq!(report.current_version, 1);
    }

    #[test]
    fn migrations_are_idempotent() {
        let connection = Connection::open_in_memory().expect("open");
        let first = run_migrations(&connection).expect("first run");
        assert_eq!(first.applied.len(), MIGRATIONS.len());

        let second = run_migrations(&connection).expect("second run");
        assert!(second.applied.is_empty());
        assert_eq!(second.current_version, 1);
    }

    #[test]
    fn pending_count_tracks_db_file() {
        let temp = tempdir().expect("tempdir");
        let db_path = temp.path().join("data").join("favtool.db");
        assert_eq!(
            pending_migration_count(&db_path).expect("pending"),
            MIGRATIONS.len()
        );

        let connection = open_store(&db_path).expect("open store");
        run_migrations(&connection).expect("migrate");
        drop(connection);
        assert_eq!(pending_migration_count(&db_path).expect("pending"), 0);
    }

    #[test]
    fn favorite_then_unfavorite_leaves_no_row() {
        let connection = memory_store();
        assert!(toggle(&connection, 0, "Main_Page", 7, Direction::Favorite).expect("favorite"));
        assert_eq!(count_favorites(&connection, 7).expect("count"), 1);

        assert!(toggle(&connection, 0, "Main_Page", 7, Direction::Unfavorite).expect("unfavorite"));
        assert_eq!(count_favorites(&connection, 7).expect("count"), 0);
    }

    #[test]
    fn favoriting_twice_reports_no_change_and_keeps_one_row() {
        let connection = memory_store();
        assert!(toggle(&connection, 0, "Main_Page", 7, Direction::Favorite).expect("first"));
        assert!(!toggle(&connection, 0, "Main_Page", 7, Direction::Favorite).expect("second"));
        assert_eq!(count_favorites(&connection, 7).expect("count"), 1);
    }

    #[test]
    fn unfavoriting_missing_row_reports_no_change() {
        let connection = memory_store();
        assert!(!toggle(&connection, 0, "Main_Page", 7, Direction::Unfavorite).expect("toggle"));
        assert_eq!(count_favorites(&connection, 7).expect("count"), 0);
    }

    #[test]
    fn favorites_are_scoped_per_user() {
        let connection = memory_store();
        assert!(toggle(&connection, 0, "Main_Page", 7, Direction::Favorite).expect("user 7"));
        assert!(toggle(&connection, 0, "Main_Page", 8, Direction::Favorite).expect("user 8"));

        assert!(!toggle(&connection, 0, "Main_Page", 9, Direction::Unfavorite).expect("user 9"));
        assert!(is_favorited(&connection, 7, 0, "Main_Page").expect("check 7"));
        assert!(is_favorited(&connection, 8, 0, "Main_Page").expect("check 8"));
    }

    #[test]
    fn list_favorites_orders_by_namespace_then_title() {
        let connection = memory_store();
        toggle(&connection, 14, "Stubs", 7, Direction::Favorite).expect("category");
        toggle(&connection, 0, "Zulu", 7, Direction::Favorite).expect("zulu");
        toggle(&connection, 0, "Alpha", 7, Direction::Favorite).expect("alpha");

        let entries = list_favorites(&connection, 7).expect("list");
        let keys = entries
            .iter()
            .map(|entry| (entry.namespace, entry.title.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(keys, vec![(0, "Alpha"), (0, "Zulu"), (14, "Stubs")]);
    }
}
