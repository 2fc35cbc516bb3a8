use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::item::Item;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateGroup {
    pub date: NaiveDate,
    pub items: Vec<Item>,
}

/// Partitions items by date. Groups come out most recent date first; items
/// inside a group follow [`compare_within_day`].
pub fn group_by_date(items: &[Item]) -> Vec<DateGroup> {
    let mut by_date: BTreeMap<NaiveDate, Vec<Item>> = BTreeMap::new();
    for item in items {
        by_date.entry(item.date).or_default().push(item.clone());
    }

    by_date
        .into_iter()
        .rev()
        .map(|(date, mut items)| {
            items.sort_by(compare_within_day);
            DateGroup { date, items }
        })
        .collect()
}

/// Timed items first, ascending by time; untimed items after them in
/// creation order. Remaining ties fall back to creation time, then id.
pub fn compare_within_day(a: &Item, b: &Item) -> Ordering {
    let by_time = match (a.time, b.time) {
        (Some(left), Some(right)) => left.cmp(&right),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_time
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}
