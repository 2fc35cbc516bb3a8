use std::collections::BTreeMap;

use crate::item::{Category, Item};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    /// Pending items per category.
    pub by_category: BTreeMap<Category, usize>,
}

impl Stats {
    pub fn from_items(items: &[Item]) -> Self {
        let total = items.len();
        let completed = items.iter().filter(|item| item.completed).count();

        let mut by_category = BTreeMap::new();
        for item in items.iter().filter(|item| !item.completed) {
            *by_category.entry(item.category).or_insert(0) += 1;
        }

        Self {
            total,
            completed,
            pending: total - completed,
            by_category,
        }
    }
}
