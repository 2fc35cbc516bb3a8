use chrono::{
  DateTime,
  Datelike,
  Duration,
  Local,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  Timelike,
  Utc,
  Weekday
};

use crate::item::ItemError;

/// Source of "now" for commands; the system clock in the binary, a fixed
/// instant in tests.
pub trait Clock {
  fn now_utc(&self) -> DateTime<Utc>;

  fn now_local(&self) -> NaiveDateTime;

  fn today(&self) -> NaiveDate {
    self.now_local().date()
  }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now_utc(&self) -> DateTime<Utc> {
    Utc::now()
  }

  fn now_local(&self) -> NaiveDateTime {
    Local::now().naive_local()
  }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
  pub utc:   DateTime<Utc>,
  pub local: NaiveDateTime
}

impl FixedClock {
  /// Treats the local wall clock as UTC.
  pub fn at(local: NaiveDateTime) -> Self {
    Self {
      utc: local.and_utc(),
      local
    }
  }
}

impl Clock for FixedClock {
  fn now_utc(&self) -> DateTime<Utc> {
    self.utc
  }

  fn now_local(&self) -> NaiveDateTime {
    self.local
  }
}

/// Resolves a user supplied date against `today`.
///
/// Accepts `YYYY-MM-DD`, `today`, `tomorrow`, `yesterday`, `+Nd` / `-Nd`
/// offsets and weekday names (the next occurrence strictly after today).
#[tracing::instrument(skip(today), fields(input = input))]
pub fn parse_date_expr(
  input: &str,
  today: NaiveDate
) -> Result<NaiveDate, ItemError> {
  let token = input.trim();
  if token.is_empty() {
    return Err(ItemError::MissingDate);
  }
  let lower =
    token.to_ascii_lowercase();
  let shift = |days: i64| {
    Duration::try_days(days)
      .and_then(|delta| {
        today.checked_add_signed(delta)
      })
      .ok_or_else(|| {
        ItemError::InvalidDate(
          token.to_string()
        )
      })
  };

  match lower.as_str() {
    | "today" => return Ok(today),
    | "tomorrow" => return shift(1),
    | "yesterday" => return shift(-1),
    | _ => {}
  }

  if let Some(days) =
    parse_day_offset(&lower)
  {
    return shift(days);
  }

  if let Some(weekday) =
    parse_weekday(&lower)
  {
    let current = today
      .weekday()
      .num_days_from_monday()
      as i64;
    let target = weekday
      .num_days_from_monday()
      as i64;
    let mut delta =
      (target - current + 7) % 7;
    if delta == 0 {
      delta = 7;
    }
    return shift(delta);
  }

  NaiveDate::parse_from_str(
    token, "%Y-%m-%d"
  )
  .map_err(|_| {
    ItemError::InvalidDate(
      token.to_string()
    )
  })
}

/// Parses `HH:MM`, `H:MM`, `3pm` and `3:30pm` into a minute precision time.
pub fn parse_time(
  input: &str
) -> Result<NaiveTime, ItemError> {
  let token = input.trim();
  let invalid = || {
    ItemError::InvalidTime(
      token.to_string()
    )
  };
  let lower =
    token.to_ascii_lowercase();

  let (body, meridiem) =
    if let Some(rest) =
      lower.strip_suffix("am")
    {
      (rest.trim(), Some(false))
    } else if let Some(rest) =
      lower.strip_suffix("pm")
    {
      (rest.trim(), Some(true))
    } else {
      (lower.as_str(), None)
    };

  let (hour_raw, minute_raw) =
    match body.split_once(':') {
      | Some((h, m)) => (h, m),
      | None if meridiem.is_some() => {
        (body, "0")
      }
      | None => return Err(invalid())
    };

  if hour_raw.is_empty()
    || minute_raw.is_empty()
    || !hour_raw
      .chars()
      .chain(minute_raw.chars())
      .all(|c| c.is_ascii_digit())
  {
    return Err(invalid());
  }

  let mut hour: u32 = hour_raw
    .parse()
    .map_err(|_| invalid())?;
  let minute: u32 = minute_raw
    .parse()
    .map_err(|_| invalid())?;

  if let Some(pm) = meridiem {
    if hour == 0 || hour > 12 {
      return Err(invalid());
    }
    hour %= 12;
    if pm {
      hour += 12;
    }
  }

  NaiveTime::from_hms_opt(
    hour, minute, 0
  )
  .ok_or_else(invalid)
}

/// Parses `YYYY-MM` into a `(year, month)` pair.
pub fn parse_year_month(
  input: &str
) -> anyhow::Result<(i32, u32)> {
  let token = input.trim();
  let parsed = token
    .split_once('-')
    .and_then(|(y, m)| {
      Some((
        y.parse::<i32>().ok()?,
        m.parse::<u32>().ok()?
      ))
    })
    .filter(|(y, m)| {
      NaiveDate::from_ymd_opt(
        *y, *m, 1
      )
      .is_some()
    });
  parsed.ok_or_else(|| {
    anyhow::anyhow!(
      "invalid month {token:?}: \
       expected YYYY-MM"
    )
  })
}

/// The clock line shown above the list, e.g. `2024年6月1日 09:05:03`.
#[must_use]
pub fn format_clock(
  now: NaiveDateTime
) -> String {
  format!(
    "{}年{}月{}日 {:02}:{:02}:{:02}",
    now.year(),
    now.month(),
    now.day(),
    now.hour(),
    now.minute(),
    now.second()
  )
}

#[must_use]
pub fn format_time(
  time: NaiveTime
) -> String {
  time.format("%H:%M").to_string()
}

fn parse_day_offset(
  lower: &str
) -> Option<i64> {
  let digits = lower.strip_suffix('d')?;
  let (sign, magnitude) =
    if let Some(rest) =
      digits.strip_prefix('+')
    {
      (1, rest)
    } else if let Some(rest) =
      digits.strip_prefix('-')
    {
      (-1, rest)
    } else {
      return None;
    };
  if magnitude.is_empty()
    || !magnitude
      .chars()
      .all(|c| c.is_ascii_digit())
  {
    return None;
  }
  magnitude
    .parse::<i64>()
    .ok()
    .map(|n| sign * n)
}

fn parse_weekday(
  lower: &str
) -> Option<Weekday> {
  match lower {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    NaiveTime
  };

  use super::{
    format_clock,
    parse_date_expr,
    parse_time,
    parse_year_month
  };
  use crate::item::ItemError;

  fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(
      2026, 2, 17
    )
    .expect("valid today")
  }

  #[test]
  fn parses_relative_keywords() {
    assert_eq!(
      parse_date_expr("today", today())
        .expect("today"),
      today()
    );
    assert_eq!(
      parse_date_expr(
        "Tomorrow",
        today()
      )
      .expect("tomorrow")
      .to_string(),
      "2026-02-18"
    );
    assert_eq!(
      parse_date_expr("-3d", today())
        .expect("offset")
        .to_string(),
      "2026-02-14"
    );
  }

  #[test]
  fn parses_weekday_name() {
    // 2026-02-17 is a Tuesday.
    assert_eq!(
      parse_date_expr(
        "wednesday",
        today()
      )
      .expect("weekday")
      .to_string(),
      "2026-02-18"
    );
    assert_eq!(
      parse_date_expr("tue", today())
        .expect("same weekday")
        .to_string(),
      "2026-02-24"
    );
  }

  #[test]
  fn rejects_garbage_and_empty_dates() {
    assert!(matches!(
      parse_date_expr(
        "2024-13-01",
        today()
      ),
      Err(ItemError::InvalidDate(_))
    ));
    assert!(matches!(
      parse_date_expr("  ", today()),
      Err(ItemError::MissingDate)
    ));
  }

  #[test]
  fn out_of_range_offsets_are_invalid() {
    for raw in [
      "+999999999999999d",
      "-999999999999999d",
      "+99999999999999999999d"
    ] {
      assert!(matches!(
        parse_date_expr(raw, today()),
        Err(ItemError::InvalidDate(_))
      ));
    }

    let last = NaiveDate::MAX;
    assert!(matches!(
      parse_date_expr("tomorrow", last),
      Err(ItemError::InvalidDate(_))
    ));
    assert!(matches!(
      parse_date_expr("+1d", last),
      Err(ItemError::InvalidDate(_))
    ));
  }

  #[test]
  fn parses_clock_times() {
    let expect = |h, m| {
      NaiveTime::from_hms_opt(h, m, 0)
        .expect("valid time")
    };
    assert_eq!(
      parse_time("09:00")
        .expect("24h"),
      expect(9, 0)
    );
    assert_eq!(
      parse_time("3:23pm")
        .expect("pm"),
      expect(15, 23)
    );
    assert_eq!(
      parse_time("12am").expect("am"),
      expect(0, 0)
    );
    assert!(parse_time("25:00").is_err());
    assert!(parse_time("noon").is_err());
  }

  #[test]
  fn formats_clock_line() {
    let now = NaiveDate::from_ymd_opt(
      2024, 6, 1
    )
    .and_then(|d| {
      d.and_hms_opt(9, 5, 3)
    })
    .expect("valid now");
    assert_eq!(
      format_clock(now),
      "2024年6月1日 09:05:03"
    );
  }

  #[test]
  fn parses_year_month() {
    assert_eq!(
      parse_year_month("2024-02")
        .expect("valid"),
      (2024, 2)
    );
    assert!(
      parse_year_month("2024-00")
        .is_err()
    );
  }
}

pub mod hhmm_serde {
  pub mod option {
    use chrono::NaiveTime;
    use serde::{
      Deserialize,
      Deserializer,
      Serializer
    };

    pub fn serialize<S>(
      time: &Option<NaiveTime>,
      serializer: S
    ) -> Result<S::Ok, S::Error>
    where
      S: Serializer
    {
      match time {
        | Some(value) => serializer
          .serialize_str(
            &value
              .format("%H:%M")
              .to_string()
          ),
        | None => {
          serializer.serialize_none()
        }
      }
    }

    pub fn deserialize<'de, D>(
      deserializer: D
    ) -> Result<
      Option<NaiveTime>,
      D::Error
    >
    where
      D: Deserializer<'de>
    {
      let opt =
        Option::<String>::deserialize(
          deserializer
        )?;
      match opt.as_deref().map(str::trim) {
        | None | Some("") => Ok(None),
        | Some(raw) => NaiveTime::parse_from_str(raw, "%H:%M")
          .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
          .map(Some)
          .map_err(serde::de::Error::custom)
      }
    }
  }
}
