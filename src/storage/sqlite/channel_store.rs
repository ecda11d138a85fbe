//! SQLite ChannelStore implementation.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use sea_query::{Expr, OnConflict, Order, Query, SqliteQueryBuilder};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use super::parse_timestamp;
use crate::storage::schema::{Channels, Events, CREATE_CHANNEL_TABLES};
use crate::storage::{ChannelHandle, ChannelStore, EventRecord, Result, StorageError};

/// SQLite implementation of ChannelStore.
pub struct SqliteChannelStore {
    pool: SqlitePool,
    closed: AtomicBool,
}

impl SqliteChannelStore {
    /// Create a new SQLite channel store.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            closed: AtomicBool::new(false),
        }
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::raw_sql(CREATE_CHANNEL_TABLES).execute(&self.pool).await?;
        Ok(())
    }

    fn decode_row(row: &sqlx::sqlite::SqliteRow) -> Result<EventRecord> {
        let sequence: i64 = row.get("sequence");
        let created_at: String = row.get("created_at");
        Ok(EventRecord {
            sequence: sequence as u64,
            event_type: row.get("event_type"),
            created_at: parse_timestamp(&created_at)?,
            data: row.get("event_data"),
        })
    }
}

#[async_trait]
impl ChannelStore for SqliteChannelStore {
    async fn exists(&self, channel: &str) -> Result<bool> {
        let query = Query::select()
            .column(Channels::Name)
            .from(Channels::Table)
            .and_where(Expr::col(Channels::Name).eq(channel))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        Ok(row.is_some())
    }

    async fn create(&self, channel: &str) -> Result<ChannelHandle> {
        let created_at = chrono::Utc::now().to_rfc3339();

        // Racing creators both succeed; the first insert wins.
        let query = Query::insert()
            .into_table(Channels::Table)
            .columns([Channels::Name, Channels::CreatedAt])
            .values_panic([channel.into(), created_at.into()])
            .on_conflict(OnConflict::column(Channels::Name).do_nothing().to_owned())
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;
        if result.rows_affected() > 0 {
            info!(channel = %channel, "Provisioned channel log");
        }

        Ok(ChannelHandle::new(channel))
    }

    async fn open(&self, channel: &str) -> Result<ChannelHandle> {
        if self.exists(channel).await? {
            Ok(ChannelHandle::new(channel))
        } else {
            Err(StorageError::ChannelNotFound(channel.to_string()))
        }
    }

    async fn put(&self, handle: &ChannelHandle, record: &EventRecord) -> Result<()> {
        let query = Query::insert()
            .into_table(Events::Table)
            .columns([
                Events::Channel,
                Events::Sequence,
                Events::EventType,
                Events::CreatedAt,
                Events::EventData,
            ])
            .values_panic([
                handle.name().into(),
                (record.sequence as i64).into(),
                record.event_type.as_str().into(),
                record.created_at.to_rfc3339().into(),
                record.data.clone().into(),
            ])
            .to_string(SqliteQueryBuilder);

        match sqlx::query(&query).execute(&self.pool).await {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StorageError::SequenceConflict {
                    channel: handle.name().to_string(),
                    sequence: record.sequence,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, handle: &ChannelHandle, sequence: u64) -> Result<Option<EventRecord>> {
        let query = Query::select()
            .columns([
                Events::Sequence,
                Events::EventType,
                Events::CreatedAt,
                Events::EventData,
            ])
            .from(Events::Table)
            .and_where(Expr::col(Events::Channel).eq(handle.name()))
            .and_where(Expr::col(Events::Sequence).eq(sequence as i64))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::decode_row).transpose()
    }

    async fn read_from(&self, handle: &ChannelHandle, from: u64) -> Result<Vec<EventRecord>> {
        let query = Query::select()
            .columns([
                Events::Sequence,
                Events::EventType,
                Events::CreatedAt,
                Events::EventData,
            ])
            .from(Events::Table)
            .and_where(Expr::col(Events::Channel).eq(handle.name()))
            .and_where(Expr::col(Events::Sequence).gte(from as i64))
            .order_by(Events::Sequence, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(Self::decode_row(row)?);
        }
        Ok(records)
    }

    async fn max_sequence(&self, handle: &ChannelHandle) -> Result<Option<u64>> {
        let query = Query::select()
            .expr(Expr::col(Events::Sequence).max())
            .from(Events::Table)
            .and_where(Expr::col(Events::Channel).eq(handle.name()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        let max_seq: Option<i64> = match row {
            Some(row) => row.get(0),
            None => None,
        };
        Ok(max_seq.map(|s| s as u64))
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // The pool is shared with the binder store; closing waits for
        // checked-out connections to be returned.
        self.pool.close().await;
        debug!("SQLite channel store closed");
    }
}
