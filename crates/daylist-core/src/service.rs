use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tracing::{debug, info, instrument};

use crate::datastore::ItemStore;
use crate::item::{Category, Item, ItemError, ItemPatch};
use crate::storage::KeyValueStore;

/// CRUD over the stored item list. Every mutation reads the whole list,
/// changes it and writes the whole list back.
#[derive(Debug)]
pub struct ItemService<S> {
    store: ItemStore<S>,
}

impl<S: KeyValueStore> ItemService<S> {
    pub fn new(storage: S) -> Self {
        Self {
            store: ItemStore::new(storage),
        }
    }

    pub fn store(&self) -> &ItemStore<S> {
        &self.store
    }

    pub fn list(&self) -> Result<Vec<Item>, ItemError> {
        Ok(self.store.load_items()?)
    }

    pub fn get(&self, id: i64) -> Result<Item, ItemError> {
        self.list()?
            .into_iter()
            .find(|item| item.id == id)
            .ok_or(ItemError::NotFound(id))
    }

    #[instrument(skip(self, title, now))]
    pub fn add(
        &mut self,
        title: &str,
        date: Option<NaiveDate>,
        time: Option<NaiveTime>,
        category: Category,
        now: DateTime<Utc>,
    ) -> Result<Item, ItemError> {
        let mut items = self.list()?;
        let id = next_id(&items, now)?;
        let item = Item::new(id, title, date, time, category, now)?;

        items.push(item.clone());
        self.store.save_items(&items)?;

        info!(id, count = items.len(), "item added");
        Ok(item)
    }

    #[instrument(skip(self, patch))]
    pub fn update(&mut self, id: i64, patch: &ItemPatch) -> Result<Item, ItemError> {
        let mut items = self.list()?;
        let item = items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or(ItemError::NotFound(id))?;
        item.apply(patch)?;
        let updated = item.clone();

        self.store.save_items(&items)?;
        debug!(id, "item updated");
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub fn toggle_complete(&mut self, id: i64) -> Result<Item, ItemError> {
        let mut items = self.list()?;
        let item = items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or(ItemError::NotFound(id))?;
        item.completed = !item.completed;
        let toggled = item.clone();

        self.store.save_items(&items)?;
        debug!(id, completed = toggled.completed, "item toggled");
        Ok(toggled)
    }

    #[instrument(skip(self))]
    pub fn remove(&mut self, id: i64) -> Result<Item, ItemError> {
        let mut items = self.list()?;
        let idx = items
            .iter()
            .position(|item| item.id == id)
            .ok_or(ItemError::NotFound(id))?;
        let removed = items.remove(idx);

        self.store.save_items(&items)?;
        info!(id, count = items.len(), "item removed");
        Ok(removed)
    }

    /// Removes every listed item in one write. Unknown ids are skipped.
    #[instrument(skip(self, ids), fields(requested = ids.len()))]
    pub fn remove_many(&mut self, ids: &BTreeSet<i64>) -> Result<usize, ItemError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut items = self.list()?;
        let before = items.len();
        items.retain(|item| !ids.contains(&item.id));
        let removed = before - items.len();

        if removed > 0 {
            self.store.save_items(&items)?;
        }
        info!(removed, "bulk remove");
        Ok(removed)
    }

    /// Marks every listed item completed in one write. Unknown ids are
    /// skipped; items already completed stay completed.
    #[instrument(skip(self, ids), fields(requested = ids.len()))]
    pub fn complete_many(&mut self, ids: &BTreeSet<i64>) -> Result<usize, ItemError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut items = self.list()?;
        let mut matched = 0_usize;
        for item in items.iter_mut().filter(|item| ids.contains(&item.id)) {
            item.completed = true;
            matched += 1;
        }

        if matched > 0 {
            self.store.save_items(&items)?;
        }
        info!(matched, "bulk complete");
        Ok(matched)
    }

    #[instrument(skip(self))]
    pub fn clear_all(&mut self) -> Result<(), ItemError> {
        Ok(self.store.clear()?)
    }
}

/// Millisecond timestamp of `now`, bumped past the largest stored id so
/// identifiers stay unique when several items are created in one tick.
/// When the largest id is `i64::MAX`, the first free id at or above the
/// timestamp is used instead.
fn next_id(items: &[Item], now: DateTime<Utc>) -> Result<i64, ItemError> {
    let candidate = now.timestamp_millis();
    let Some(max) = items.iter().map(|item| item.id).max() else {
        return Ok(candidate);
    };
    if candidate > max {
        return Ok(candidate);
    }
    if let Some(bumped) = max.checked_add(1) {
        return Ok(bumped);
    }

    let taken: BTreeSet<i64> = items.iter().map(|item| item.id).collect();
    (candidate..=i64::MAX)
        .find(|id| !taken.contains(id))
        .ok_or(ItemError::IdsExhausted)
}
