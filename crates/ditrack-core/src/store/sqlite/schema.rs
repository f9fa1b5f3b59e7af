//! SQLite schema for the document store.
//!
//! Documents are kept as JSON text keyed by id; only the card index is
//! relational, because it is the one structure queried in both directions:
//! - `items`, `property_integrations`, `credentials`, `users` hold documents
//! - `card_references` maps `(organization, property, card)` to an item and
//!   allows at most one card per item within a property
//! - `comment_receipts` records comments already posted
//! - `store_meta` tracks the applied schema version

/// Migration v1: documents, card index and metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS items (
    item_id TEXT PRIMARY KEY,
    property_id TEXT,
    document_json TEXT NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS property_integrations (
    property_id TEXT PRIMARY KEY,
    organization_id TEXT NOT NULL,
    document_json TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS credentials (
    organization_id TEXT PRIMARY KEY,
    document_json TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    user_id TEXT PRIMARY KEY,
    document_json TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS card_references (
    organization_id TEXT NOT NULL CHECK (length(trim(organization_id)) > 0),
    property_id TEXT NOT NULL CHECK (length(trim(property_id)) > 0),
    card_id TEXT NOT NULL CHECK (length(trim(card_id)) > 0),
    item_id TEXT NOT NULL CHECK (length(trim(item_id)) > 0),
    url TEXT,
    created_at_us INTEGER NOT NULL,
    PRIMARY KEY (organization_id, property_id, card_id),
    UNIQUE (property_id, item_id)
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO store_meta (id, schema_version) VALUES (1, 0);

CREATE INDEX IF NOT EXISTS idx_items_property
    ON items(property_id);

CREATE INDEX IF NOT EXISTS idx_card_references_item
    ON card_references(item_id);
";

/// Migration v2: comment receipts for redelivery dedupe.
pub const MIGRATION_V2_SQL: &str = r"
CREATE TABLE IF NOT EXISTS comment_receipts (
    receipt_key TEXT PRIMARY KEY,
    recorded_at_us INTEGER NOT NULL
);
";

/// Indexes expected after all migrations.
pub const REQUIRED_INDEXES: &[&str] = &["idx_items_property", "idx_card_references_item"];
