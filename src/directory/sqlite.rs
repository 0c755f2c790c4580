use std::any::Any;
use std::io::{self, Read, Write};
use std::sync::Arc;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use crate::core::error::{Result, StoreError};
use crate::directory::dir::{Directory, IndexOutput};
use crate::lock::factory::{DirectoryLock, LockFactory};
use crate::lock::single_instance::SingleInstanceLockFactory;

/// Directory persisted in a relational table, one row per file. All
/// directories of one store share the connection; each partition gets its
/// own table.
pub struct SqliteDirectory {
    conn: Arc<Mutex<Connection>>,
    table: String,
    lock_factory: Arc<dyn LockFactory>,
}

impl SqliteDirectory {
    pub(crate) fn open(conn: Arc<Mutex<Connection>>, table: String) -> Result<Self> {
        {
            let conn = conn.lock();
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (\
                 name TEXT PRIMARY KEY, \
                 content BLOB NOT NULL, \
                 size INTEGER NOT NULL, \
                 updated_at TEXT NOT NULL)"
            ))?;
        }
        Ok(SqliteDirectory {
            conn,
            table,
            lock_factory: Arc::new(SingleInstanceLockFactory::new()),
        })
    }

    pub(crate) fn table(&self) -> &str {
        &self.table
    }
}

impl Directory for SqliteDirectory {
    fn list_files(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("SELECT name FROM {}", self.table))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut names = Vec::new();
        for row in rows {
            names.push(row?);
        }
        Ok(names)
    }

    fn file_exists(&self, name: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let found = conn
            .query_row(
                &format!("SELECT 1 FROM {} WHERE name = ?1", self.table),
                params![name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn file_len(&self, name: &str) -> Result<u64> {
        let conn = self.conn.lock();
        let size = conn
            .query_row(
                &format!("SELECT size FROM {} WHERE name = ?1", self.table),
                params![name],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        size.map(|s| s as u64)
            .ok_or_else(|| StoreError::file_not_found(name))
    }

    fn open_input(&self, name: &str) -> Result<Box<dyn Read + Send>> {
        let conn = self.conn.lock();
        let content = conn
            .query_row(
                &format!("SELECT content FROM {} WHERE name = ?1", self.table),
                params![name],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        let content = content.ok_or_else(|| StoreError::file_not_found(name))?;
        Ok(Box::new(io::Cursor::new(content)))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn IndexOutput>> {
        Ok(Box::new(SqliteOutput {
            conn: Arc::clone(&self.conn),
            table: self.table.clone(),
            name: name.to_string(),
            buf: Vec::new(),
        }))
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            &format!("DELETE FROM {} WHERE name = ?1", self.table),
            params![name],
        )?;
        if deleted == 0 {
            return Err(StoreError::file_not_found(name));
        }
        Ok(())
    }

    fn make_lock(&self, name: &str) -> Result<Box<dyn DirectoryLock>> {
        self.lock_factory.make_lock(name)
    }

    fn clear_lock(&self, name: &str) -> Result<()> {
        self.lock_factory.clear_lock(name)
    }

    fn set_lock_factory(&mut self, factory: Arc<dyn LockFactory>) {
        self.lock_factory = factory;
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct SqliteOutput {
    conn: Arc<Mutex<Connection>>,
    table: String,
    name: String,
    buf: Vec<u8>,
}

impl Write for SqliteOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl IndexOutput for SqliteOutput {
    fn finish(&mut self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {} (name, content, size, updated_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                self.table
            ),
            params![
                self.name,
                self.buf,
                self.buf.len() as i64,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::dir::{read_file, write_file};

    fn memory_conn() -> Arc<Mutex<Connection>> {
        Arc::new(Mutex::new(
            Connection::open_in_memory().expect("open in-memory db"),
        ))
    }

    #[test]
    fn write_then_read_roundtrip() {
        let dir = SqliteDirectory::open(memory_conn(), "idx_posts".to_string()).expect("open");

        write_file(&dir, "seg.bin", b"in a row").expect("write");
        assert!(dir.file_exists("seg.bin").expect("exists"));
        assert_eq!(dir.file_len("seg.bin").expect("len"), 8);
        assert_eq!(read_file(&dir, "seg.bin").expect("read"), b"in a row");

        write_file(&dir, "seg.bin", b"replaced").expect("rewrite");
        assert_eq!(read_file(&dir, "seg.bin").expect("read"), b"replaced");
    }

    #[test]
    fn tables_isolate_partitions() {
        let conn = memory_conn();
        let posts =
            SqliteDirectory::open(Arc::clone(&conn), "idx_posts".to_string()).expect("open");
        let users =
            SqliteDirectory::open(Arc::clone(&conn), "idx_users".to_string()).expect("open");

        write_file(&posts, "seg.bin", b"posts").expect("write");
        assert!(!users.file_exists("seg.bin").expect("exists"));
        assert!(users.list_files().expect("list").is_empty());
    }

    #[test]
    fn delete_missing_file_errors() {
        let dir = SqliteDirectory::open(memory_conn(), "idx_posts".to_string()).expect("open");
        assert!(matches!(
            dir.delete_file("nope.bin"),
            Err(StoreError::FileNotFound { .. })
        ));
    }
}
