use anyhow::Context;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::item::Item;
use crate::storage::KeyValueStore;

pub const ITEMS_KEY: &str = "tasks";

/// Reads and writes the whole item collection as one JSON array under
/// [`ITEMS_KEY`].
#[derive(Debug)]
pub struct ItemStore<S> {
    storage: S,
}

impl<S: KeyValueStore> ItemStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Loads every stored item. A blob that is not a JSON array yields an
    /// empty list; array entries that fail to parse or validate are dropped.
    #[tracing::instrument(skip(self))]
    pub fn load_items(&self) -> anyhow::Result<Vec<Item>> {
        let Some(raw) = self
            .storage
            .get_item(ITEMS_KEY)
            .context("failed to read stored items")?
        else {
            debug!("no stored items");
            return Ok(Vec::new());
        };

        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        let entries = match serde_json::from_str::<Vec<Value>>(&raw) {
            Ok(entries) => entries,
            Err(error) => {
                warn!(%error, "stored items are malformed; treating as empty");
                return Ok(Vec::new());
            }
        };

        let mut items: Vec<Item> = Vec::with_capacity(entries.len());
        for (idx, entry) in entries.into_iter().enumerate() {
            let parsed = serde_json::from_value::<Item>(entry)
                .map_err(|err| err.to_string())
                .and_then(|item| item.validated().map_err(|err| err.to_string()));
            match parsed {
                Ok(item) if items.iter().any(|existing| existing.id == item.id) => {
                    warn!(index = idx, id = item.id, "dropping stored item with duplicate id");
                }
                Ok(item) => items.push(item),
                Err(error) => {
                    warn!(index = idx, %error, "dropping invalid stored item");
                }
            }
        }

        debug!(count = items.len(), "loaded items");
        Ok(items)
    }

    #[tracing::instrument(skip(self, items), fields(count = items.len()))]
    pub fn save_items(&mut self, items: &[Item]) -> anyhow::Result<()> {
        let serialized = serde_json::to_string(items).context("failed to serialize items")?;
        self.storage
            .set_item(ITEMS_KEY, &serialized)
            .context("failed to save items")
    }

    #[tracing::instrument(skip(self))]
    pub fn clear(&mut self) -> anyhow::Result<()> {
        self.storage
            .remove_item(ITEMS_KEY)
            .context("failed to clear items")?;
        info!("cleared stored items");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::{ITEMS_KEY, ItemStore};
    use crate::item::{Category, Item};
    use crate::storage::{KeyValueStore, MemoryStore};

    #[test]
    fn missing_and_malformed_blobs_load_as_empty() {
        let mut store = ItemStore::new(MemoryStore::new());
        assert!(store.load_items().expect("load").is_empty());

        store
            .storage_mut()
            .set_item(ITEMS_KEY, "{not json")
            .expect("set");
        assert!(store.load_items().expect("load").is_empty());

        store
            .storage_mut()
            .set_item(ITEMS_KEY, r#"{"id":1}"#)
            .expect("set");
        assert!(store.load_items().expect("load").is_empty());
    }

    #[test]
    fn invalid_entries_are_dropped_and_the_rest_kept() {
        let mut store = ItemStore::new(MemoryStore::new());
        let raw = r#"[
            {"id":1,"title":"keep","date":"2024-06-01"},
            {"id":2,"title":"   ","date":"2024-06-01"},
            {"id":3,"title":"no date"},
            {"id":1,"title":"dup","date":"2024-06-02"}
        ]"#;
        store.storage_mut().set_item(ITEMS_KEY, raw).expect("set");

        let items = store.load_items().expect("load");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "keep");
    }

    #[test]
    fn save_then_load_preserves_items() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).single().expect("valid now");
        let date = NaiveDate::from_ymd_opt(2024, 6, 1);
        let item = Item::new(1, "Buy milk", date, None, Category::Life, now).expect("item");

        let mut store = ItemStore::new(MemoryStore::new());
        store.save_items(std::slice::from_ref(&item)).expect("save");
        assert_eq!(store.load_items().expect("load"), vec![item]);

        store.clear().expect("clear");
        assert_eq!(store.storage().get_item(ITEMS_KEY).expect("get"), None);
    }
}
