use std::collections::BTreeSet;

use anyhow::anyhow;
use chrono::{Datelike, NaiveDate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayCell {
  pub day:       u32,
  pub today:     bool,
  pub has_items: bool
}

/// One month laid out Sunday-first. `None` cells pad the first week up to
/// the weekday of the 1st.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthGrid {
  pub year:  i32,
  pub month: u32,
  pub cells: Vec<Option<DayCell>>
}

impl MonthGrid {
  pub fn for_month(
    year: i32,
    month: u32,
    today: NaiveDate,
    marked: &BTreeSet<NaiveDate>
  ) -> anyhow::Result<Self> {
    let first =
      NaiveDate::from_ymd_opt(
        year, month, 1
      )
      .ok_or_else(|| {
        anyhow!(
          "invalid month: \
           {year}-{month:02}"
        )
      })?;

    let leading = first
      .weekday()
      .num_days_from_sunday()
      as usize;
    let days = days_in_month(first);

    let mut cells =
      Vec::with_capacity(
        leading + days as usize
      );
    cells.resize(leading, None);
    for day in 1..=days {
      let date = first
        .with_day(day)
        .ok_or_else(|| {
          anyhow!(
            "invalid day {day} in \
             {year}-{month:02}"
          )
        })?;
      cells.push(Some(DayCell {
        day,
        today: date == today,
        has_items: marked
          .contains(&date)
      }));
    }

    Ok(Self {
      year,
      month,
      cells
    })
  }

  pub fn weeks(
    &self
  ) -> impl Iterator<
    Item = &[Option<DayCell>]
  > {
    self.cells.chunks(7)
  }
}

fn days_in_month(
  first: NaiveDate
) -> u32 {
  let next_first =
    if first.month() == 12 {
      NaiveDate::from_ymd_opt(
        first.year() + 1,
        1,
        1
      )
    } else {
      NaiveDate::from_ymd_opt(
        first.year(),
        first.month() + 1,
        1
      )
    };
  next_first
    .map(|next| {
      next
        .signed_duration_since(first)
        .num_days() as u32
    })
    .unwrap_or(31)
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeSet;

  use chrono::NaiveDate;

  use super::MonthGrid;

  fn date(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  #[test]
  fn pads_to_weekday_of_first() {
    // 2024-06-01 is a Saturday.
    let grid = MonthGrid::for_month(
      2024,
      6,
      date(2024, 6, 15),
      &BTreeSet::new()
    )
    .expect("grid");
    assert_eq!(
      grid
        .cells
        .iter()
        .take_while(|c| c.is_none())
        .count(),
      6
    );
    assert_eq!(grid.cells.len(), 36);
    assert_eq!(grid.weeks().count(), 6);
  }

  #[test]
  fn marks_today_and_days_with_items() {
    let marked: BTreeSet<NaiveDate> =
      [date(2024, 2, 29)]
        .into_iter()
        .collect();
    let grid = MonthGrid::for_month(
      2024,
      2,
      date(2024, 2, 10),
      &marked
    )
    .expect("grid");

    let days: Vec<_> = grid
      .cells
      .iter()
      .flatten()
      .collect();
    assert_eq!(days.len(), 29);
    assert!(days[9].today);
    assert!(days[28].has_items);
    assert_eq!(
      days
        .iter()
        .filter(|d| d.today)
        .count(),
      1
    );
  }

  #[test]
  fn today_outside_month_is_not_marked()
  {
    let grid = MonthGrid::for_month(
      2023,
      12,
      date(2024, 1, 1),
      &BTreeSet::new()
    )
    .expect("grid");
    assert!(
      grid
        .cells
        .iter()
        .flatten()
        .all(|d| !d.today)
    );
    assert_eq!(
      grid
        .cells
        .iter()
        .flatten()
        .count(),
      31
    );
  }
}
