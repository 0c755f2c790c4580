use std::fs;
use std::path::Path;
use std::sync::Arc;
use parking_lot::Mutex;
use rusqlite::Connection;
use crate::core::error::Result;
use crate::directory::dir::Directory;
use crate::directory::sqlite::SqliteDirectory;
use crate::index::meta::META_FILE_NAME;
use crate::store::backend::DirectoryStore;

/// SQLite backend. Every sub index maps to its own table inside one shared
/// database file, so all directories ride the same connection.
pub struct SqliteDirectoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDirectoryStore {
    pub fn open(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Ok(SqliteDirectoryStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(SqliteDirectoryStore {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
        })
    }

    pub(crate) fn table_name(sub_context: &str, sub_index: &str) -> String {
        let sanitize = |s: &str| {
            s.chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect::<String>()
        };
        format!("idx_{}_{}", sanitize(sub_context), sanitize(sub_index))
    }
}

impl DirectoryStore for SqliteDirectoryStore {
    fn open(&self, sub_context: &str, sub_index: &str) -> Result<Box<dyn Directory>> {
        let table = Self::table_name(sub_context, sub_index);
        Ok(Box::new(SqliteDirectory::open(
            Arc::clone(&self.conn),
            table,
        )?))
    }

    fn index_exists(&self, dir: &dyn Directory) -> Option<bool> {
        // The table itself proves nothing; only the completion marker does.
        dir.as_any()
            .downcast_ref::<SqliteDirectory>()
            .map(|d| d.file_exists(META_FILE_NAME).unwrap_or(false))
    }

    fn delete_index(&self, dir: &dyn Directory, _sub_context: &str, _sub_index: &str) -> Result<()> {
        if let Some(d) = dir.as_any().downcast_ref::<SqliteDirectory>() {
            let conn = self.conn.lock();
            conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", d.table()))?;
        }
        Ok(())
    }

    fn clean_index(&self, dir: &dyn Directory, _sub_context: &str, _sub_index: &str) -> Result<()> {
        if let Some(d) = dir.as_any().downcast_ref::<SqliteDirectory>() {
            let conn = self.conn.lock();
            conn.execute_batch(&format!("DELETE FROM {}", d.table()))?;
        }
        Ok(())
    }
}
