use anyhow::{Context as _, Result};
use clap::Args;
use ditrack_core::cards::{self, CardReference};
use ditrack_core::model::{Credentials, PropertyIntegration, UserProfile};
use ditrack_core::store::DocumentStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::output::{OutputMode, pretty_kv, render};

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// JSON file with `items`, `users`, `credentials`, `integrations` and
    /// `cards`; every section is optional.
    pub file: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ImportFile {
    #[serde(default)]
    items: BTreeMap<String, Value>,
    #[serde(default)]
    users: BTreeMap<String, UserProfile>,
    #[serde(default)]
    credentials: BTreeMap<String, Credentials>,
    #[serde(default)]
    integrations: Vec<PropertyIntegration>,
    #[serde(default)]
    cards: Vec<CardReference>,
}

#[derive(Debug, Default, Serialize)]
struct ImportSummary {
    store: String,
    items: usize,
    users: usize,
    credentials: usize,
    integrations: usize,
    cards: usize,
}

fn apply(store: &dyn DocumentStore, file: &ImportFile) -> Result<ImportSummary> {
    for (item_id, document) in &file.items {
        store
            .put_item(item_id, document)
            .with_context(|| format!("store item {item_id}"))?;
    }
    for (user_id, profile) in &file.users {
        store
            .put_user(user_id, profile)
            .with_context(|| format!("store user {user_id}"))?;
    }
    for (organization_id, credentials) in &file.credentials {
        store
            .put_credentials(organization_id, credentials)
            .with_context(|| format!("store credentials for {organization_id}"))?;
    }
    for integration in &file.integrations {
        store
            .put_property_integration(integration)
            .with_context(|| format!("store integration for {}", integration.property_id))?;
    }
    // Items first, so registering a card also writes the item's pointer.
    for reference in &file.cards {
        cards::register(store, reference)
            .with_context(|| format!("link card {}", reference.card_id))?;
    }

    Ok(ImportSummary {
        items: file.items.len(),
        users: file.users.len(),
        credentials: file.credentials.len(),
        integrations: file.integrations.len(),
        cards: file.cards.len(),
        ..ImportSummary::default()
    })
}

/// Execute `ditrack import`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, the store cannot
/// be opened, or any write fails.
pub fn run_import(
    args: &ImportArgs,
    config: Option<&Path>,
    project_root: &Path,
    output: OutputMode,
) -> Result<()> {
    let content = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let file: ImportFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", args.file.display()))?;

    let loaded = super::load(config, project_root)?;
    let store = super::open_store(&loaded, project_root)?;
    let mut summary = apply(store.as_ref(), &file)?;
    summary.store = loaded
        .config
        .store
        .resolve_path(project_root)
        .display()
        .to_string();

    info!(
        items = summary.items,
        cards = summary.cards,
        store = %summary.store,
        "import finished"
    );

    render(output, &summary, |summary, w| {
        pretty_kv(w, "store", &summary.store)?;
        pretty_kv(w, "items", summary.items.to_string())?;
        pretty_kv(w, "users", summary.users.to_string())?;
        pretty_kv(w, "credentials", summary.credentials.to_string())?;
        pretty_kv(w, "integrations", summary.integrations.to_string())?;
        pretty_kv(w, "cards", summary.cards.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ditrack_core::store::MemoryStore;
    use serde_json::json;

    #[test]
    fn cards_link_imported_items() {
        let file: ImportFile = serde_json::from_value(json!({
            "items": { "di-1": { "property": "prop-1", "state": "pending" } },
            "cards": [{
                "organizationId": "org-1",
                "propertyId": "prop-1",
                "cardId": "card-1",
                "itemId": "di-1"
            }]
        }))
        .unwrap();
        let store = MemoryStore::new();

        let summary = apply(&store, &file).unwrap();

        assert_eq!(summary.items, 1);
        assert_eq!(summary.cards, 1);
        assert_eq!(store.item("di-1").unwrap().unwrap()["card"]["id"], "card-1");
    }

    #[test]
    fn unknown_sections_are_rejected() {
        let parsed = serde_json::from_value::<ImportFile>(json!({ "tickets": [] }));
        assert!(parsed.is_err());
    }
}
