use crate::Database;
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    pub fn get_value(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|conn| query_value(conn, key))
    }

    /// Insert or overwrite the value stored under `key`.
    pub fn put_value(&self, key: &str, value: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO local_storage (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
                (key, value),
            )?;
            Ok(())
        })
    }

    /// Removing a key that was never stored is not an error.
    pub fn delete_value(&self, key: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM local_storage WHERE key = ?1", [key])?;
            Ok(())
        })
    }
}

fn query_value(conn: &Connection, key: &str) -> Result<Option<String>> {
    let mut stmt = conn.prepare("SELECT value FROM local_storage WHERE key = ?1")?;

    let value: Option<String> = stmt.query_row([key], |row| row.get(0)).optional()?;

    Ok(value)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_overwrites_existing_value() {
        let db = Database::open_in_memory().unwrap();
        db.put_value("token", "first").unwrap();
        db.put_value("token", "second").unwrap();
        assert_eq!(db.get_value("token").unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn delete_missing_key_is_ok() {
        let db = Database::open_in_memory().unwrap();
        db.delete_value("never-set").unwrap();
        assert_eq!(db.get_value("never-set").unwrap(), None);
    }
}
