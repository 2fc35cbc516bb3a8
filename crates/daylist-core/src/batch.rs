use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::item::ItemError;
use crate::service::ItemService;
use crate::storage::KeyValueStore;

/// Multi-select mode. The selection only exists while the mode is active.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BatchSelection {
    #[default]
    Normal,
    Active(BTreeSet<i64>),
}

impl BatchSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }

    /// Enters batch mode with an empty selection, or leaves it.
    pub fn toggle(&mut self) -> bool {
        *self = match self {
            Self::Normal => Self::Active(BTreeSet::new()),
            Self::Active(_) => Self::Normal,
        };
        debug!(active = self.is_active(), "batch mode toggled");
        self.is_active()
    }

    pub fn cancel(&mut self) {
        *self = Self::Normal;
    }

    pub fn selected(&self) -> Option<&BTreeSet<i64>> {
        match self {
            Self::Active(ids) => Some(ids),
            Self::Normal => None,
        }
    }

    /// Returns whether the id was newly selected.
    pub fn select(&mut self, id: i64) -> Result<bool, ItemError> {
        Ok(self.selection_mut()?.insert(id))
    }

    /// Returns whether the id had been selected.
    pub fn deselect(&mut self, id: i64) -> Result<bool, ItemError> {
        Ok(self.selection_mut()?.remove(&id))
    }

    /// Flips one id; returns whether it is selected afterwards.
    pub fn toggle_selected(&mut self, id: i64) -> Result<bool, ItemError> {
        let ids = self.selection_mut()?;
        if ids.remove(&id) {
            Ok(false)
        } else {
            ids.insert(id);
            Ok(true)
        }
    }

    /// Deletes exactly the selected items and returns to normal mode.
    pub fn bulk_delete<S: KeyValueStore>(
        &mut self,
        service: &mut ItemService<S>,
    ) -> Result<usize, ItemError> {
        let ids = self.take_selection()?;
        let removed = service.remove_many(&ids)?;
        info!(selected = ids.len(), removed, "batch delete committed");
        Ok(removed)
    }

    /// Completes exactly the selected items and returns to normal mode.
    pub fn bulk_complete<S: KeyValueStore>(
        &mut self,
        service: &mut ItemService<S>,
    ) -> Result<usize, ItemError> {
        let ids = self.take_selection()?;
        let completed = service.complete_many(&ids)?;
        info!(selected = ids.len(), completed, "batch complete committed");
        Ok(completed)
    }

    fn selection_mut(&mut self) -> Result<&mut BTreeSet<i64>, ItemError> {
        match self {
            Self::Active(ids) => Ok(ids),
            Self::Normal => Err(ItemError::BatchInactive),
        }
    }

    fn take_selection(&mut self) -> Result<BTreeSet<i64>, ItemError> {
        match std::mem::take(self) {
            Self::Active(ids) => Ok(ids),
            Self::Normal => Err(ItemError::BatchInactive),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::BatchSelection;
    use crate::datastore::ITEMS_KEY;
    use crate::item::{Category, ItemError};
    use crate::service::ItemService;
    use crate::storage::{KeyValueStore, MemoryStore};

    fn seeded() -> (ItemService<MemoryStore>, Vec<i64>) {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).single().expect("valid now");
        let date = NaiveDate::from_ymd_opt(2024, 6, 1);
        let mut svc = ItemService::new(MemoryStore::new());
        let ids = ["a", "b", "c"]
            .into_iter()
            .map(|title| svc.add(title, date, None, Category::Work, now).expect("add").id)
            .collect();
        (svc, ids)
    }

    #[test]
    fn selection_is_rejected_in_normal_mode() {
        let mut batch = BatchSelection::new();
        assert!(matches!(batch.select(1), Err(ItemError::BatchInactive)));
        assert!(matches!(batch.deselect(1), Err(ItemError::BatchInactive)));
        assert_eq!(batch.selected(), None);
    }

    #[test]
    fn toggle_starts_empty_and_cancel_clears() {
        let mut batch = BatchSelection::new();
        assert!(batch.toggle());
        assert!(batch.select(5).expect("select"));
        assert!(!batch.select(5).expect("select again"));
        batch.cancel();
        assert!(!batch.is_active());

        batch.toggle();
        assert_eq!(batch.selected().map(|ids| ids.len()), Some(0));
    }

    #[test]
    fn bulk_delete_removes_selected_and_exits() {
        let (mut svc, ids) = seeded();
        let mut batch = BatchSelection::new();
        batch.toggle();
        batch.select(ids[0]).expect("select");
        batch.select(ids[2]).expect("select");
        assert!(!batch.toggle_selected(ids[2]).expect("toggle off"));
        assert!(batch.toggle_selected(ids[1]).expect("toggle on"));

        assert_eq!(batch.bulk_delete(&mut svc).expect("delete"), 2);
        assert!(!batch.is_active());
        let left: Vec<i64> = svc.list().expect("list").iter().map(|i| i.id).collect();
        assert_eq!(left, vec![ids[2]]);
    }

    #[test]
    fn bulk_complete_marks_selected_and_exits() {
        let (mut svc, ids) = seeded();
        let mut batch = BatchSelection::new();
        batch.toggle();
        batch.select(ids[1]).expect("select");

        assert_eq!(batch.bulk_complete(&mut svc).expect("complete"), 1);
        assert!(!batch.is_active());
        let done: Vec<bool> = svc.list().expect("list").iter().map(|i| i.completed).collect();
        assert_eq!(done, vec![false, true, false]);
    }

    #[test]
    fn bulk_delete_with_empty_selection_is_a_noop() {
        let (mut svc, _) = seeded();
        let before = svc.store().storage().get_item(ITEMS_KEY).expect("get");

        let mut batch = BatchSelection::new();
        batch.toggle();
        assert_eq!(batch.bulk_delete(&mut svc).expect("delete"), 0);
        assert!(!batch.is_active());
        assert_eq!(svc.store().storage().get_item(ITEMS_KEY).expect("get"), before);
    }

    #[test]
    fn bulk_operations_require_batch_mode() {
        let (mut svc, _) = seeded();
        let mut batch = BatchSelection::new();
        assert!(matches!(batch.bulk_complete(&mut svc), Err(ItemError::BatchInactive)));
    }
}
