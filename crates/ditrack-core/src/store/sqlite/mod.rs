//! SQLite-backed [`DocumentStore`].
//!
//! Connections are opened with:
//! - `journal_mode = WAL` so readers do not block the writer
//! - `busy_timeout = 5s` to ride out short lock contention
//! - `foreign_keys = ON`

pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::{DocumentStore, StoreError};
use crate::cards::CardReference;
use crate::model::item::{clear_card_pointer, set_card_pointer, set_photo_attachment};
use crate::model::{Credentials, PropertyIntegration, UserProfile};

/// Busy timeout used for store connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Document store over one SQLite connection.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`, apply pragmas and migrate.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory, connection, pragmas or migrations
    /// fail.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create store directory {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("open store database {}", path.display()))?;
        Self::prepare(conn)
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory store")?;
        Self::prepare(conn)
    }

    fn prepare(mut conn: Connection) -> Result<Self> {
        configure_connection(&conn).context("configure sqlite pragmas")?;
        migrations::migrate(&mut conn).context("apply store migrations")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

fn now_us() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

fn load_json<T: DeserializeOwned>(
    conn: &Connection,
    sql: &str,
    key: &str,
) -> Result<Option<T>, StoreError> {
    let raw: Option<String> = conn
        .query_row(sql, [key], |row| row.get(0))
        .optional()?;
    raw.map(|text| serde_json::from_str(&text))
        .transpose()
        .map_err(StoreError::from)
}

fn load_item(conn: &Connection, item_id: &str) -> Result<Option<Value>, StoreError> {
    load_json(
        conn,
        "SELECT document_json FROM items WHERE item_id = ?1",
        item_id,
    )
}

fn write_item(conn: &Connection, item_id: &str, document: &Value) -> Result<(), StoreError> {
    let property_id = document.get("property").and_then(Value::as_str);
    conn.execute(
        "INSERT INTO items (item_id, property_id, document_json, updated_at_us)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(item_id) DO UPDATE SET
             property_id = excluded.property_id,
             document_json = excluded.document_json,
             updated_at_us = excluded.updated_at_us",
        params![item_id, property_id, serde_json::to_string(document)?, now_us()],
    )?;
    Ok(())
}

fn to_json<T: Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(StoreError::from)
}

/// Read-modify-write an item inside `tx`. Writes only when `edit` reports a
/// change.
fn edit_item(
    tx: &Transaction<'_>,
    item_id: &str,
    edit: impl FnOnce(&mut Value) -> bool,
) -> Result<bool, StoreError> {
    let Some(mut document) = load_item(tx, item_id)? else {
        return Ok(false);
    };
    if !edit(&mut document) {
        return Ok(false);
    }
    write_item(tx, item_id, &document)?;
    Ok(true)
}

fn card_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CardReference> {
    Ok(CardReference {
        organization_id: row.get(0)?,
        property_id: row.get(1)?,
        card_id: row.get(2)?,
        item_id: row.get(3)?,
        url: row.get(4)?,
    })
}

impl DocumentStore for SqliteStore {
    fn item(&self, item_id: &str) -> Result<Option<Value>, StoreError> {
        load_item(&*self.lock()?, item_id)
    }

    fn put_item(&self, item_id: &str, document: &Value) -> Result<(), StoreError> {
        write_item(&*self.lock()?, item_id, document)
    }

    fn property_integration(
        &self,
        property_id: &str,
    ) -> Result<Option<PropertyIntegration>, StoreError> {
        load_json(
            &*self.lock()?,
            "SELECT document_json FROM property_integrations WHERE property_id = ?1",
            property_id,
        )
    }

    fn put_property_integration(
        &self,
        integration: &PropertyIntegration,
    ) -> Result<(), StoreError> {
        self.lock()?.execute(
            "INSERT INTO property_integrations (property_id, organization_id, document_json)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(property_id) DO UPDATE SET
                 organization_id = excluded.organization_id,
                 document_json = excluded.document_json",
            params![
                integration.property_id,
                integration.organization_id,
                to_json(integration)?
            ],
        )?;
        Ok(())
    }

    fn credentials(&self, organization_id: &str) -> Result<Option<Credentials>, StoreError> {
        load_json(
            &*self.lock()?,
            "SELECT document_json FROM credentials WHERE organization_id = ?1",
            organization_id,
        )
    }

    fn put_credentials(
        &self,
        organization_id: &str,
        credentials: &Credentials,
    ) -> Result<(), StoreError> {
        self.lock()?.execute(
            "INSERT INTO credentials (organization_id, document_json) VALUES (?1, ?2)
             ON CONFLICT(organization_id) DO UPDATE SET document_json = excluded.document_json",
            params![organization_id, to_json(credentials)?],
        )?;
        Ok(())
    }

    fn user(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        load_json(
            &*self.lock()?,
            "SELECT document_json FROM users WHERE user_id = ?1",
            user_id,
        )
    }

    fn put_user(&self, user_id: &str, profile: &UserProfile) -> Result<(), StoreError> {
        self.lock()?.execute(
            "INSERT INTO users (user_id, document_json) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET document_json = excluded.document_json",
            params![user_id, to_json(profile)?],
        )?;
        Ok(())
    }

    fn find_card(
        &self,
        property_id: &str,
        item_id: &str,
    ) -> Result<Option<CardReference>, StoreError> {
        let found = self
            .lock()?
            .query_row(
                "SELECT organization_id, property_id, card_id, item_id, url
                 FROM card_references
                 WHERE property_id = ?1 AND item_id = ?2",
                params![property_id, item_id],
                card_from_row,
            )
            .optional()?;
        Ok(found)
    }

    fn item_for_card(
        &self,
        organization_id: &str,
        property_id: &str,
        card_id: &str,
    ) -> Result<Option<String>, StoreError> {
        let found = self
            .lock()?
            .query_row(
                "SELECT item_id FROM card_references
                 WHERE organization_id = ?1 AND property_id = ?2 AND card_id = ?3",
                params![organization_id, property_id, card_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found)
    }

    fn insert_card(&self, reference: &CardReference) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let linked: Option<String> = tx
            .query_row(
                "SELECT card_id FROM card_references WHERE property_id = ?1 AND item_id = ?2",
                params![reference.property_id, reference.item_id],
                |row| row.get(0),
            )
            .optional()?;
        if linked.is_some_and(|card_id| card_id != reference.card_id) {
            return Err(StoreError::Conflict(format!(
                "item {} already linked to another card",
                reference.item_id
            )));
        }

        let owner: Option<String> = tx
            .query_row(
                "SELECT item_id FROM card_references
                 WHERE organization_id = ?1 AND property_id = ?2 AND card_id = ?3",
                params![
                    reference.organization_id,
                    reference.property_id,
                    reference.card_id
                ],
                |row| row.get(0),
            )
            .optional()?;
        if owner.is_some_and(|item_id| item_id != reference.item_id) {
            return Err(StoreError::Conflict(format!(
                "card {} already linked to another item",
                reference.card_id
            )));
        }

        tx.execute(
            "INSERT INTO card_references
                 (organization_id, property_id, card_id, item_id, url, created_at_us)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(organization_id, property_id, card_id) DO UPDATE SET
                 url = excluded.url",
            params![
                reference.organization_id,
                reference.property_id,
                reference.card_id,
                reference.item_id,
                reference.url,
                now_us()
            ],
        )?;
        edit_item(&tx, &reference.item_id, |document| {
            set_card_pointer(document, &reference.pointer())
        })?;

        tx.commit()?;
        Ok(())
    }

    fn remove_card(&self, reference: &CardReference) -> Result<bool, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let deleted = tx.execute(
            "DELETE FROM card_references
             WHERE organization_id = ?1 AND property_id = ?2 AND card_id = ?3",
            params![
                reference.organization_id,
                reference.property_id,
                reference.card_id
            ],
        )?;
        let cleared = edit_item(&tx, &reference.item_id, |document| {
            clear_card_pointer(document, &reference.card_id)
        })?;

        tx.commit()?;
        Ok(deleted > 0 || cleared)
    }

    fn set_photo_attachment(
        &self,
        item_id: &str,
        entry_id: &str,
        attachment_id: &str,
    ) -> Result<bool, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let written = edit_item(&tx, item_id, |document| {
            set_photo_attachment(document, entry_id, attachment_id)
        })?;
        tx.commit()?;
        Ok(written)
    }

    fn has_comment_receipt(&self, key: &str) -> Result<bool, StoreError> {
        let exists = self.lock()?.query_row(
            "SELECT EXISTS(SELECT 1 FROM comment_receipts WHERE receipt_key = ?1)",
            [key],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn record_comment_receipt(&self, key: &str) -> Result<(), StoreError> {
        self.lock()?.execute(
            "INSERT OR IGNORE INTO comment_receipts (receipt_key, recorded_at_us) VALUES (?1, ?2)",
            params![key, now_us()],
        )?;
        Ok(())
    }
}
