use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use log::debug;

use mizanflow_core::errors::Result;
use mizanflow_core::sync::LocalStore;

use super::model::KvEntryDB;
use crate::db::{
    create_pool, get_connection, init, run_migrations, spawn_writer, DbPool, WriteHandle,
};
use crate::errors::StorageError;
use crate::schema::kv_store;

/// [`LocalStore`] persisted in the `kv_store` table.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SqliteStore {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    /// Opens (creating and migrating if needed) the database under `app_data_dir`.
    pub fn open(app_data_dir: &str) -> Result<Self> {
        let db_path = init(app_data_dir)?;
        run_migrations(&db_path)?;
        let pool = create_pool(&db_path)?;
        let writer = spawn_writer(pool.as_ref().clone());
        Ok(Self::new(pool, writer))
    }

    /// Keys starting with `prefix`, in key order.
    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut conn = get_connection(&self.pool)?;
        let keys = kv_store::table
            .filter(kv_store::key.like(format!("{}%", escape_like(prefix))).escape('\\'))
            .order(kv_store::key.asc())
            .select(kv_store::key)
            .load::<String>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(keys)
    }

    pub fn entry(&self, key: &str) -> Result<Option<KvEntryDB>> {
        let mut conn = get_connection(&self.pool)?;
        let row = kv_store::table
            .find(key)
            .select(KvEntryDB::as_select())
            .first::<KvEntryDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        Ok(row)
    }
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[async_trait]
impl LocalStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entry(key)?.map(|row| row.value))
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let row = KvEntryDB {
            key: key.to_string(),
            value,
            updated_at: Utc::now().to_rfc3339(),
        };
        self.writer
            .exec(move |conn| {
                diesel::insert_into(kv_store::table)
                    .values(&row)
                    .on_conflict(kv_store::key)
                    .do_update()
                    .set((
                        kv_store::value.eq(row.value.as_str()),
                        kv_store::updated_at.eq(row.updated_at.as_str()),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.writer
            .exec(move |conn| {
                let removed = diesel::delete(kv_store::table.find(key.as_str()))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                if removed > 0 {
                    debug!("[KV] Removed {}", key);
                }
                Ok(())
            })
            .await
    }
}
