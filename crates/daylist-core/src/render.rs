use std::collections::BTreeSet;
use std::io::{self, IsTerminal, Write};

use unicode_width::UnicodeWidthStr;

use crate::calendar::MonthGrid;
use crate::config::Config;
use crate::datetime::format_time;
use crate::grouping::DateGroup;
use crate::item::{Category, Item};
use crate::stats::Stats;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    /// Colors only when `color` is on and stdout is a terminal.
    pub fn new(cfg: &Config) -> Self {
        let color = cfg.get_bool("color").unwrap_or(true) && io::stdout().is_terminal();
        Self { color }
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    /// Prints date groups in order; `selection` adds a marker column while
    /// batch mode is active.
    #[tracing::instrument(skip_all, fields(groups = groups.len()))]
    pub fn print_groups<W: Write>(
        &self,
        out: &mut W,
        groups: &[DateGroup],
        selection: Option<&BTreeSet<i64>>,
    ) -> anyhow::Result<()> {
        if groups.is_empty() {
            writeln!(out, "No items.")?;
            return Ok(());
        }

        for (idx, group) in groups.iter().enumerate() {
            if idx > 0 {
                writeln!(out)?;
            }
            let header = group.date.format("%Y-%m-%d %a").to_string();
            writeln!(out, "{}", self.paint(&header, "1"))?;

            let mut headers = Vec::with_capacity(6);
            if selection.is_some() {
                headers.push("Sel".to_string());
            }
            headers.extend(
                ["Done", "ID", "Time", "Category", "Title"]
                    .into_iter()
                    .map(str::to_string),
            );

            let rows = group
                .items
                .iter()
                .map(|item| self.item_row(item, selection))
                .collect();
            write_table(&mut *out, headers, rows)?;
        }
        Ok(())
    }

    pub fn print_stats<W: Write>(&self, out: &mut W, stats: &Stats) -> anyhow::Result<()> {
        writeln!(
            out,
            "{} total, {} completed, {} pending",
            stats.total,
            stats.completed,
            self.paint(&stats.pending.to_string(), "33"),
        )?;
        let breakdown = Category::ALL
            .into_iter()
            .filter_map(|cat| stats.by_category.get(&cat).map(|count| format!("{cat} {count}")))
            .collect::<Vec<_>>();
        if !breakdown.is_empty() {
            writeln!(out, "pending by category: {}", breakdown.join(", "))?;
        }
        Ok(())
    }

    pub fn print_item<W: Write>(&self, out: &mut W, item: &Item) -> anyhow::Result<()> {
        writeln!(out, "id        {}", item.id)?;
        writeln!(out, "title     {}", item.title)?;
        writeln!(out, "date      {}", item.date.format("%Y-%m-%d"))?;
        writeln!(
            out,
            "time      {}",
            item.time.map(format_time).unwrap_or_else(|| "-".to_string())
        )?;
        writeln!(out, "category  {}", item.category)?;
        writeln!(out, "completed {}", if item.completed { "yes" } else { "no" })?;
        writeln!(out, "created   {}", item.created_at.to_rfc3339())?;
        Ok(())
    }

    pub fn print_calendar<W: Write>(&self, out: &mut W, grid: &MonthGrid) -> anyhow::Result<()> {
        writeln!(out, "{:^27}", format!("{}-{:02}", grid.year, grid.month))?;
        writeln!(out, "Su  Mo  Tu  We  Th  Fr  Sa")?;
        for week in grid.weeks() {
            let mut line = String::new();
            for cell in week {
                let text = match cell {
                    Some(day) => {
                        let marker = if day.has_items { "*" } else { " " };
                        let text = format!("{:>2}{marker}", day.day);
                        if day.today {
                            self.paint(&text, "7")
                        } else {
                            text
                        }
                    }
                    None => "   ".to_string(),
                };
                line.push_str(&text);
                line.push(' ');
            }
            writeln!(out, "{}", line.trim_end())?;
        }
        Ok(())
    }

    fn item_row(&self, item: &Item, selection: Option<&BTreeSet<i64>>) -> Vec<String> {
        let mut row = Vec::with_capacity(6);
        if let Some(selected) = selection {
            row.push(if selected.contains(&item.id) { "[*]" } else { "[ ]" }.to_string());
        }
        row.push(if item.completed { "[x]" } else { "[ ]" }.to_string());
        row.push(self.paint(&item.id.to_string(), "33"));
        row.push(item.time.map(format_time).unwrap_or_default());
        row.push(item.category.to_string());
        let title = if item.completed {
            self.paint(&item.title, "9")
        } else {
            item.title.clone()
        };
        row.push(title);
        row
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    let mut line = String::new();
    for idx in 0..column_count {
        line.push_str(&format!("{:width$} ", headers[idx], width = widths[idx]));
    }
    writeln!(writer, "  {}", line.trim_end())?;

    for row in rows {
        let mut line = String::new();
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            line.push_str(cell);
            line.push_str(&" ".repeat(padding));
            line.push(' ');
        }
        writeln!(writer, "  {}", line.trim_end())?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};

    use super::{Renderer, strip_ansi, write_table};
    use crate::calendar::MonthGrid;
    use crate::grouping::group_by_date;
    use crate::item::{Category, Item};
    use crate::stats::Stats;

    fn sample() -> Vec<Item> {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).single().expect("valid now");
        let date = NaiveDate::from_ymd_opt(2024, 6, 1);
        let mut milk = Item::new(1, "Buy milk", date, None, Category::Life, now).expect("item");
        milk.completed = true;
        let meeting = Item::new(
            2,
            "会议",
            date,
            NaiveTime::from_hms_opt(10, 0, 0),
            Category::Work,
            now,
        )
        .expect("item");
        vec![milk, meeting]
    }

    #[test]
    fn groups_render_with_aligned_wide_titles() {
        let renderer = Renderer::plain();
        let mut out = Vec::new();
        renderer
            .print_groups(&mut out, &group_by_date(&sample()), None)
            .expect("render");
        let text = String::from_utf8(out).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "2024-06-01 Sat");
        assert!(lines[1].starts_with("  Done ID Time  Category Title"));
        assert!(lines[2].contains("10:00") && lines[2].contains("会议"));
        assert!(lines[3].starts_with("  [x]") && lines[3].ends_with("Buy milk"));
    }

    #[test]
    fn selection_column_marks_selected_ids() {
        let renderer = Renderer::plain();
        let selected: BTreeSet<i64> = [1].into_iter().collect();
        let mut out = Vec::new();
        renderer
            .print_groups(&mut out, &group_by_date(&sample()), Some(&selected))
            .expect("render");
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.lines().nth(1).expect("header").starts_with("  Sel"));
        assert!(text.lines().nth(3).expect("row").starts_with("  [*] [x]"));
    }

    #[test]
    fn stats_and_empty_list() {
        let renderer = Renderer::plain();
        let mut out = Vec::new();
        renderer.print_groups(&mut out, &[], None).expect("render");
        renderer
            .print_stats(&mut out, &Stats::from_items(&sample()))
            .expect("render");
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.starts_with("No items.\n"));
        assert!(text.contains("2 total, 1 completed, 1 pending"));
        assert!(text.contains("pending by category: work 1"));
    }

    #[test]
    fn calendar_marks_days_with_items() {
        let renderer = Renderer::plain();
        let marked = [NaiveDate::from_ymd_opt(2024, 6, 3).expect("date")]
            .into_iter()
            .collect();
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).expect("date");
        let grid = MonthGrid::for_month(2024, 6, today, &marked).expect("grid");
        let mut out = Vec::new();
        renderer.print_calendar(&mut out, &grid).expect("render");
        let text = String::from_utf8(out).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[1], "Su  Mo  Tu  We  Th  Fr  Sa");
        assert_eq!(lines[2].trim(), "1");
        assert!(lines[3].starts_with(" 2   3*"));
    }

    #[test]
    fn table_pads_by_visible_width() {
        let mut out = Vec::new();
        write_table(
            &mut out,
            vec!["A".to_string(), "B".to_string()],
            vec![vec!["\x1b[33m1\x1b[0m".to_string(), "x".to_string()]],
        )
        .expect("table");
        let text = String::from_utf8(out).expect("utf8");
        assert_eq!(strip_ansi(&text), "  A B\n  1 x\n");
    }
}
