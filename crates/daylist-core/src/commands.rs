use std::collections::BTreeSet;
use std::io::{BufRead, Write};

use anyhow::{Context as _, anyhow};
use chrono::{Datelike, NaiveDate, NaiveTime};
use tracing::{debug, info, instrument, warn};

use crate::auth::{AuthGate, AuthPolicy};
use crate::batch::BatchSelection;
use crate::calendar::MonthGrid;
use crate::cli::Invocation;
use crate::datetime::{Clock, format_clock, parse_date_expr, parse_time, parse_year_month};
use crate::grouping::group_by_date;
use crate::item::{Category, ItemPatch};
use crate::render::Renderer;
use crate::service::ItemService;
use crate::stats::Stats;
use crate::storage::{KeyValueStore, MemoryStore};

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add",
        "list",
        "show",
        "edit",
        "toggle",
        "done",
        "delete",
        "clear",
        "stats",
        "calendar",
        "now",
        "passwd",
        "shell",
        "login",
        "logout",
        "batch",
        "select",
        "deselect",
        "bulk-delete",
        "bulk-complete",
        "cancel",
        "help",
        "version",
        "quit",
        "exit",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

/// One user action, decoupled from how it was typed and how results are shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add {
        title: String,
        date: Option<NaiveDate>,
        time: Option<NaiveTime>,
        category: Category,
    },
    List,
    Show {
        id: i64,
    },
    Edit {
        id: i64,
        patch: ItemPatch,
    },
    Toggle {
        id: i64,
    },
    Done {
        ids: BTreeSet<i64>,
    },
    Delete {
        ids: BTreeSet<i64>,
    },
    Clear {
        confirmed: bool,
    },
    Stats,
    Calendar {
        month: Option<(i32, u32)>,
    },
    Now,
    Passwd {
        current: String,
        new: String,
        confirm: String,
    },
    Shell,
    Login {
        password: String,
    },
    Logout,
    Batch,
    Select {
        ids: BTreeSet<i64>,
    },
    Deselect {
        ids: BTreeSet<i64>,
    },
    BulkDelete,
    BulkComplete,
    Cancel,
    Help,
    Version,
    Quit,
}

impl Command {
    /// Builds a command from an invocation. Dates resolve against `today`;
    /// `add` without a date uses `today`.
    #[instrument(skip(inv, today, default_category), fields(command = %inv.command))]
    pub fn parse(
        inv: &Invocation,
        today: NaiveDate,
        default_category: Category,
    ) -> anyhow::Result<Self> {
        let args = inv.command_args.as_slice();
        let command = match inv.command.as_str() {
            "add" => {
                let (title, mods) = split_title_and_mods(args, today)?;
                if title.is_empty() {
                    return Err(anyhow!("add: title is required"));
                }
                let mut date = Some(today);
                let mut time = None;
                let mut category = default_category;
                for one_mod in mods {
                    match one_mod {
                        Modifier::Date(value) => date = Some(value),
                        Modifier::Time(value) => time = value,
                        Modifier::Category(value) => category = value,
                    }
                }
                Self::Add {
                    title,
                    date,
                    time,
                    category,
                }
            }
            "list" => Self::List,
            "show" => match args {
                [id] => Self::Show { id: parse_id(id)? },
                _ => return Err(anyhow!("show: exactly one item id is required")),
            },
            "edit" => {
                let (id_arg, rest) = args
                    .split_first()
                    .ok_or_else(|| anyhow!("edit: item id is required"))?;
                let id = parse_id(id_arg)?;
                let (title, mods) = split_title_and_mods(rest, today)?;
                let mut patch = ItemPatch {
                    title: (!title.is_empty()).then_some(title),
                    ..ItemPatch::default()
                };
                for one_mod in mods {
                    match one_mod {
                        Modifier::Date(value) => patch.date = Some(value),
                        Modifier::Time(value) => patch.time = Some(value),
                        Modifier::Category(value) => patch.category = Some(value),
                    }
                }
                if patch.is_empty() {
                    return Err(anyhow!("edit: nothing to change"));
                }
                Self::Edit { id, patch }
            }
            "toggle" => {
                let ids = parse_ids(args)?;
                let mut iter = ids.into_iter();
                match (iter.next(), iter.next()) {
                    (Some(id), None) => Self::Toggle { id },
                    _ => return Err(anyhow!("toggle: exactly one item id is required")),
                }
            }
            "done" => Self::Done {
                ids: require_ids("done", args)?,
            },
            "delete" => Self::Delete {
                ids: require_ids("delete", args)?,
            },
            "clear" => Self::Clear {
                confirmed: args.iter().any(|arg| arg == "--yes" || arg == "-y"),
            },
            "stats" => Self::Stats,
            "calendar" => Self::Calendar {
                month: args.first().map(|raw| parse_year_month(raw)).transpose()?,
            },
            "now" => Self::Now,
            "passwd" => match args {
                [current, new, confirm] => Self::Passwd {
                    current: current.clone(),
                    new: new.clone(),
                    confirm: confirm.clone(),
                },
                _ => return Err(anyhow!("passwd: usage: passwd <current> <new> <confirm>")),
            },
            "shell" => Self::Shell,
            "login" => Self::Login {
                password: args.join(" "),
            },
            "logout" => Self::Logout,
            "batch" => Self::Batch,
            "select" => Self::Select {
                ids: require_ids("select", args)?,
            },
            "deselect" => Self::Deselect {
                ids: require_ids("deselect", args)?,
            },
            "bulk-delete" => Self::BulkDelete,
            "bulk-complete" => Self::BulkComplete,
            "cancel" => Self::Cancel,
            "help" => Self::Help,
            "version" => Self::Version,
            "quit" | "exit" => Self::Quit,
            other => return Err(anyhow!("unknown command: {other}")),
        };
        Ok(command)
    }

    /// Command word for logs; never includes arguments.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::List => "list",
            Self::Show { .. } => "show",
            Self::Edit { .. } => "edit",
            Self::Toggle { .. } => "toggle",
            Self::Done { .. } => "done",
            Self::Delete { .. } => "delete",
            Self::Clear { .. } => "clear",
            Self::Stats => "stats",
            Self::Calendar { .. } => "calendar",
            Self::Now => "now",
            Self::Passwd { .. } => "passwd",
            Self::Shell => "shell",
            Self::Login { .. } => "login",
            Self::Logout => "logout",
            Self::Batch => "batch",
            Self::Select { .. } => "select",
            Self::Deselect { .. } => "deselect",
            Self::BulkDelete => "bulk-delete",
            Self::BulkComplete => "bulk-complete",
            Self::Cancel => "cancel",
            Self::Help => "help",
            Self::Version => "version",
            Self::Quit => "quit",
        }
    }

    /// Whether the session flag must be set before running.
    pub fn requires_login(&self) -> bool {
        !matches!(
            self,
            Self::Now
                | Self::Passwd { .. }
                | Self::Shell
                | Self::Login { .. }
                | Self::Logout
                | Self::Help
                | Self::Version
                | Self::Quit
        )
    }

    /// Commands that only make sense inside an interactive session.
    pub fn is_interactive_only(&self) -> bool {
        matches!(
            self,
            Self::Login { .. }
                | Self::Logout
                | Self::Batch
                | Self::Select { .. }
                | Self::Deselect { .. }
                | Self::BulkDelete
                | Self::BulkComplete
                | Self::Cancel
                | Self::Quit
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Everything a running session owns: the item service over the persistent
/// store, the password gate with its session flag, and batch mode.
#[derive(Debug)]
pub struct Session<P> {
    pub items: ItemService<P>,
    pub auth: AuthGate<P, MemoryStore>,
    pub batch: BatchSelection,
}

impl<P: KeyValueStore + Clone> Session<P> {
    pub fn new(storage: P, policy: AuthPolicy) -> Self {
        Self {
            items: ItemService::new(storage.clone()),
            auth: AuthGate::new(storage, MemoryStore::new(), policy),
            batch: BatchSelection::new(),
        }
    }
}

pub struct Context<'a, C> {
    pub renderer: &'a Renderer,
    pub clock: &'a C,
}

/// Runs one command against the session. `input` answers confirmation
/// prompts; all user-facing output goes to `out`.
#[instrument(skip_all)]
pub fn execute<P, C, R, W>(
    session: &mut Session<P>,
    ctx: &Context<'_, C>,
    command: Command,
    input: &mut R,
    out: &mut W,
) -> anyhow::Result<Flow>
where
    P: KeyValueStore,
    C: Clock,
    R: BufRead,
    W: Write,
{
    if command.requires_login() {
        session.auth.require()?;
    }
    debug!(command = command.name(), "executing command");

    match command {
        Command::Add {
            title,
            date,
            time,
            category,
        } => {
            let item = session
                .items
                .add(&title, date, time, category, ctx.clock.now_utc())?;
            writeln!(out, "Created item {}.", item.id)?;
        }
        Command::List => cmd_list(session, ctx, out)?,
        Command::Show { id } => {
            let item = session.items.get(id)?;
            ctx.renderer.print_item(out, &item)?;
        }
        Command::Edit { id, patch } => {
            let item = session.items.update(id, &patch)?;
            writeln!(out, "Modified item {}.", item.id)?;
        }
        Command::Toggle { id } => {
            let item = session.items.toggle_complete(id)?;
            let state = if item.completed { "completed" } else { "pending" };
            writeln!(out, "Item {} marked {state}.", item.id)?;
        }
        Command::Done { ids } => {
            let count = session.items.complete_many(&ids)?;
            report_missing(out, &ids, count)?;
            writeln!(out, "Completed {count} item(s).")?;
        }
        Command::Delete { ids } => cmd_delete(session, &ids, out)?,
        Command::Clear { confirmed } => cmd_clear(session, confirmed, input, out)?,
        Command::Stats => {
            let items = session.items.list()?;
            ctx.renderer.print_stats(out, &Stats::from_items(&items))?;
        }
        Command::Calendar { month } => {
            let today = ctx.clock.today();
            let (year, month) = month.unwrap_or((today.year(), today.month()));
            let marked: BTreeSet<NaiveDate> =
                session.items.list()?.into_iter().map(|item| item.date).collect();
            let grid = MonthGrid::for_month(year, month, today, &marked)?;
            ctx.renderer.print_calendar(out, &grid)?;
        }
        Command::Now => writeln!(out, "{}", format_clock(ctx.clock.now_local()))?,
        Command::Passwd {
            current,
            new,
            confirm,
        } => {
            session.auth.change_password(&current, &new, &confirm)?;
            writeln!(out, "Password changed.")?;
        }
        Command::Shell => return Err(anyhow!("already in an interactive session")),
        Command::Login { password } => {
            session.auth.login(&password)?;
            writeln!(out, "Logged in.")?;
        }
        Command::Logout => {
            session.batch.cancel();
            session.auth.logout()?;
            writeln!(out, "Logged out.")?;
        }
        Command::Batch => {
            if session.batch.toggle() {
                writeln!(out, "Batch mode on. Use select/deselect, then bulk-delete or bulk-complete.")?;
            } else {
                writeln!(out, "Batch mode off.")?;
            }
        }
        Command::Select { ids } => {
            for id in &ids {
                session.items.get(*id)?;
            }
            for id in ids {
                session.batch.select(id)?;
            }
            print_selection(&session.batch, out)?;
        }
        Command::Deselect { ids } => {
            for id in ids {
                session.batch.deselect(id)?;
            }
            print_selection(&session.batch, out)?;
        }
        Command::BulkDelete => {
            let count = session.batch.bulk_delete(&mut session.items)?;
            writeln!(out, "Deleted {count} item(s). Batch mode off.")?;
        }
        Command::BulkComplete => {
            let count = session.batch.bulk_complete(&mut session.items)?;
            writeln!(out, "Completed {count} item(s). Batch mode off.")?;
        }
        Command::Cancel => {
            session.batch.cancel();
            writeln!(out, "Batch mode off.")?;
        }
        Command::Help => write!(out, "{}", help_text())?,
        Command::Version => writeln!(out, "{}", env!("CARGO_PKG_VERSION"))?,
        Command::Quit => return Ok(Flow::Quit),
    }

    Ok(Flow::Continue)
}

fn cmd_list<P, C, W>(session: &Session<P>, ctx: &Context<'_, C>, out: &mut W) -> anyhow::Result<()>
where
    P: KeyValueStore,
    C: Clock,
    W: Write,
{
    let items = session.items.list()?;
    let groups = group_by_date(&items);
    ctx.renderer
        .print_groups(out, &groups, session.batch.selected())?;
    writeln!(out)?;
    ctx.renderer.print_stats(out, &Stats::from_items(&items))?;
    Ok(())
}

fn cmd_delete<P, W>(session: &mut Session<P>, ids: &BTreeSet<i64>, out: &mut W) -> anyhow::Result<()>
where
    P: KeyValueStore,
    W: Write,
{
    if let Some(id) = single(ids) {
        let item = session.items.remove(id)?;
        writeln!(out, "Deleted item {} ({}).", item.id, item.title)?;
        return Ok(());
    }

    let count = session.items.remove_many(ids)?;
    report_missing(out, ids, count)?;
    writeln!(out, "Deleted {count} item(s).")?;
    Ok(())
}

fn cmd_clear<P, R, W>(
    session: &mut Session<P>,
    confirmed: bool,
    input: &mut R,
    out: &mut W,
) -> anyhow::Result<()>
where
    P: KeyValueStore,
    R: BufRead,
    W: Write,
{
    if !confirmed {
        write!(out, "Clear all items? This cannot be undone. [y/N] ")?;
        out.flush()?;
        let mut answer = String::new();
        input
            .read_line(&mut answer)
            .context("failed to read confirmation")?;
        if !matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes") {
            info!("clear aborted by user");
            writeln!(out, "Aborted.")?;
            return Ok(());
        }
    }

    session.items.clear_all()?;
    writeln!(out, "Cleared all items.")?;
    Ok(())
}

fn print_selection<W: Write>(batch: &BatchSelection, out: &mut W) -> anyhow::Result<()> {
    let selected = batch
        .selected()
        .map(|ids| ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", "))
        .unwrap_or_default();
    writeln!(out, "Selected: [{selected}]")?;
    Ok(())
}

fn report_missing<W: Write>(out: &mut W, ids: &BTreeSet<i64>, affected: usize) -> anyhow::Result<()> {
    if affected < ids.len() {
        warn!(requested = ids.len(), affected, "some item ids were not found");
        writeln!(out, "{} id(s) did not match any item.", ids.len() - affected)?;
    }
    Ok(())
}

fn single(ids: &BTreeSet<i64>) -> Option<i64> {
    if ids.len() == 1 {
        ids.first().copied()
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Modifier {
    Date(NaiveDate),
    Time(Option<NaiveTime>),
    Category(Category),
}

/// Splits `key:value` modifiers from title words. Everything after `--` is
/// title text.
fn split_title_and_mods(
    args: &[String],
    today: NaiveDate,
) -> anyhow::Result<(String, Vec<Modifier>)> {
    let mut title_parts = Vec::new();
    let mut mods = Vec::new();

    let mut literal = false;
    for arg in args {
        if arg == "--" && !literal {
            literal = true;
            continue;
        }

        if !literal && let Some(one_mod) = parse_one_mod(arg, today)? {
            mods.push(one_mod);
            continue;
        }

        title_parts.push(arg.as_str());
    }

    Ok((title_parts.join(" ").trim().to_string(), mods))
}

fn parse_one_mod(tok: &str, today: NaiveDate) -> anyhow::Result<Option<Modifier>> {
    let Some((key, value)) = tok.split_once(':') else {
        return Ok(None);
    };

    let modifier = match key.to_ascii_lowercase().as_str() {
        "date" | "due" => Modifier::Date(parse_date_expr(value, today)?),
        "time" | "at" => {
            if value.trim().is_empty() {
                Modifier::Time(None)
            } else {
                Modifier::Time(Some(parse_time(value)?))
            }
        }
        "cat" | "category" => Modifier::Category(value.parse()?),
        _ => return Ok(None),
    };
    Ok(Some(modifier))
}

fn parse_id(raw: &str) -> anyhow::Result<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| anyhow!("invalid item id: {raw}"))
}

/// Accepts ids as separate arguments and/or comma separated lists.
fn parse_ids(args: &[String]) -> anyhow::Result<BTreeSet<i64>> {
    args.iter()
        .flat_map(|arg| arg.split(','))
        .filter(|part| !part.trim().is_empty())
        .map(parse_id)
        .collect()
}

fn require_ids(command: &str, args: &[String]) -> anyhow::Result<BTreeSet<i64>> {
    let ids = parse_ids(args)?;
    if ids.is_empty() {
        return Err(anyhow!("{command}: at least one item id is required"));
    }
    Ok(ids)
}

pub fn help_text() -> &'static str {
    "\
Usage: daylist [--data DIR] [--rcfile FILE] [--rc KEY=VALUE] [--password PW] <command> [args]

Commands (any unique prefix works):
  add <title...> [date:D] [time:HH:MM] [cat:C]   add an item (date defaults to today)
  list                                           items grouped by date, newest first
  show <id>                                      one item in detail
  edit <id> [title...] [date:D] [time:T] [cat:C] change an item (time: clears the time)
  toggle <id>                                    flip completion
  done <id...>                                   mark items completed
  delete <id...>                                 delete items
  clear [--yes]                                  delete every item
  stats                                          total / completed / pending counts
  calendar [YYYY-MM]                             month view, * marks days with items
  now                                            current date and time
  passwd <current> <new> <confirm>               change the password
  shell                                          interactive session

Interactive session only:
  login <password>, logout, batch, select <id...>, deselect <id...>,
  bulk-delete, bulk-complete, cancel, quit
  (login takes the rest of the line after one space, spacing kept)

Dates: YYYY-MM-DD, today, tomorrow, yesterday, +Nd, -Nd, weekday names.
Categories: work, life, study, health, other.
"
}
