//! SQLite BinderStore implementation.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use sea_query::{Expr, OnConflict, Order, Query, SqliteQueryBuilder};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::document::Document;
use crate::storage::schema::{BinderEntries, Binders, CREATE_BINDER_TABLES};
use crate::storage::{Binder, BinderStore, Result, StorageError};

/// Entries fetched per round-trip while iterating a binder.
const ITERATE_PAGE_SIZE: u64 = 256;

/// A binder backed by the `binder_entries` table.
pub struct SqliteBinder {
    name: String,
    pool: SqlitePool,
}

/// Keyset-pagination cursor for lazy iteration.
struct PageCursor {
    pool: SqlitePool,
    binder: String,
    after: Option<String>,
    page: VecDeque<(String, Vec<u8>)>,
    exhausted: bool,
}

async fn fetch_page(
    pool: &SqlitePool,
    binder: &str,
    after: Option<&str>,
) -> Result<Vec<(String, Vec<u8>)>> {
    // SelectStatement is not Send; render it before the await.
    let query = {
        let mut select = Query::select();
        select
            .columns([BinderEntries::Key, BinderEntries::Document])
            .from(BinderEntries::Table)
            .and_where(Expr::col(BinderEntries::Binder).eq(binder))
            .order_by(BinderEntries::Key, Order::Asc)
            .limit(ITERATE_PAGE_SIZE);
        if let Some(after) = after {
            select.and_where(Expr::col(BinderEntries::Key).gt(after));
        }
        select.to_string(SqliteQueryBuilder)
    };

    let rows = sqlx::query(&query).fetch_all(pool).await?;
    Ok(rows
        .iter()
        .map(|row| (row.get("key"), row.get("document")))
        .collect())
}

#[async_trait]
impl Binder for SqliteBinder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, key: &str, document: &Document) -> Result<()> {
        let updated_at = chrono::Utc::now().to_rfc3339();

        let query = Query::insert()
            .into_table(BinderEntries::Table)
            .columns([
                BinderEntries::Binder,
                BinderEntries::Key,
                BinderEntries::Document,
                BinderEntries::UpdatedAt,
            ])
            .values_panic([
                self.name.as_str().into(),
                key.into(),
                document.encode()?.into(),
                updated_at.into(),
            ])
            .on_conflict(
                OnConflict::columns([BinderEntries::Binder, BinderEntries::Key])
                    .update_columns([BinderEntries::Document, BinderEntries::UpdatedAt])
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Document>> {
        let query = Query::select()
            .column(BinderEntries::Document)
            .from(BinderEntries::Table)
            .and_where(Expr::col(BinderEntries::Binder).eq(self.name.as_str()))
            .and_where(Expr::col(BinderEntries::Key).eq(key))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => {
                let bytes: Vec<u8> = row.get("document");
                Ok(Some(Document::decode(&bytes)?))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let query = Query::delete()
            .from_table(BinderEntries::Table)
            .and_where(Expr::col(BinderEntries::Binder).eq(self.name.as_str()))
            .and_where(Expr::col(BinderEntries::Key).eq(key))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    fn iterate(&self) -> BoxStream<'static, Result<(String, Document)>> {
        let cursor = PageCursor {
            pool: self.pool.clone(),
            binder: self.name.clone(),
            after: None,
            page: VecDeque::new(),
            exhausted: false,
        };

        stream::unfold(cursor, |mut cursor| async move {
            loop {
                if let Some((key, bytes)) = cursor.page.pop_front() {
                    let entry = Document::decode(&bytes)
                        .map(|doc| (key, doc))
                        .map_err(StorageError::from);
                    return Some((entry, cursor));
                }
                if cursor.exhausted {
                    return None;
                }
                match fetch_page(&cursor.pool, &cursor.binder, cursor.after.as_deref()).await {
                    Ok(rows) => {
                        cursor.exhausted = (rows.len() as u64) < ITERATE_PAGE_SIZE;
                        if let Some((key, _)) = rows.last() {
                            cursor.after = Some(key.clone());
                        }
                        cursor.page.extend(rows);
                    }
                    Err(e) => {
                        cursor.exhausted = true;
                        return Some((Err(e), cursor));
                    }
                }
            }
        })
        .boxed()
    }
}

/// SQLite implementation of BinderStore.
pub struct SqliteBinderStore {
    pool: SqlitePool,
    open: RwLock<HashMap<String, Arc<SqliteBinder>>>,
}

impl SqliteBinderStore {
    /// Create a new SQLite binder store.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            open: RwLock::new(HashMap::new()),
        }
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::raw_sql(CREATE_BINDER_TABLES).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl BinderStore for SqliteBinderStore {
    async fn open(&self, name: &str) -> Result<Arc<dyn Binder>> {
        if let Some(binder) = self.get(name) {
            return Ok(binder);
        }

        let created_at = chrono::Utc::now().to_rfc3339();
        let query = Query::insert()
            .into_table(Binders::Table)
            .columns([Binders::Name, Binders::CreatedAt])
            .values_panic([name.into(), created_at.into()])
            .on_conflict(OnConflict::column(Binders::Name).do_nothing().to_owned())
            .to_string(SqliteQueryBuilder);
        sqlx::query(&query).execute(&self.pool).await?;

        let mut open = self.open.write().unwrap_or_else(PoisonError::into_inner);
        let binder = open
            .entry(name.to_string())
            .or_insert_with(|| {
                info!(binder = %name, "Opened binder");
                Arc::new(SqliteBinder {
                    name: name.to_string(),
                    pool: self.pool.clone(),
                })
            })
            .clone();
        Ok(binder as Arc<dyn Binder>)
    }

    fn get(&self, name: &str) -> Option<Arc<dyn Binder>> {
        let open = self.open.read().unwrap_or_else(PoisonError::into_inner);
        open.get(name).map(|b| b.clone() as Arc<dyn Binder>)
    }

    async fn binder_names(&self) -> Result<Vec<String>> {
        let query = Query::select()
            .column(Binders::Name)
            .from(Binders::Table)
            .order_by(Binders::Name, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(|row| row.get("name")).collect())
    }

    async fn close(&self) {
        self.open
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.pool.close().await;
        debug!("SQLite binder store closed");
    }
}
