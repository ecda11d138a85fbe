//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Provisioned channels.
#[derive(Iden)]
pub enum Channels {
    Table,
    #[iden = "name"]
    Name,
    #[iden = "created_at"]
    CreatedAt,
}

/// Events table schema. One row per (channel, sequence).
#[derive(Iden)]
pub enum Events {
    Table,
    #[iden = "channel"]
    Channel,
    #[iden = "sequence"]
    Sequence,
    #[iden = "event_type"]
    EventType,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "event_data"]
    EventData,
}

/// Opened binders.
#[derive(Iden)]
pub enum Binders {
    Table,
    #[iden = "name"]
    Name,
    #[iden = "created_at"]
    CreatedAt,
}

/// Binder entries table schema. One row per (binder, key).
#[derive(Iden)]
pub enum BinderEntries {
    Table,
    #[iden = "binder"]
    Binder,
    #[iden = "key"]
    Key,
    #[iden = "document"]
    Document,
    #[iden = "updated_at"]
    UpdatedAt,
}

/// SQL for creating the channel tables.
pub const CREATE_CHANNEL_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS channels (
    name TEXT PRIMARY KEY NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS events (
    channel TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    event_type TEXT NOT NULL,
    created_at TEXT NOT NULL,
    event_data BLOB NOT NULL,
    PRIMARY KEY (channel, sequence)
);
"#;

/// SQL for creating the binder tables.
pub const CREATE_BINDER_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS binders (
    name TEXT PRIMARY KEY NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS binder_entries (
    binder TEXT NOT NULL,
    key TEXT NOT NULL,
    document BLOB NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (binder, key)
);
"#;
