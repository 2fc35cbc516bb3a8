use std::io::{BufRead, Write};

use tracing::{debug, info, instrument, warn};

use crate::cli::Invocation;
use crate::commands::{Command, Context, Flow, Session, execute};
use crate::config::Config;
use crate::datetime::Clock;
use crate::item::{Category, ItemError};
use crate::storage::KeyValueStore;

/// Interactive session: one command per line until `quit` or end of input.
/// The login flag lives only as long as this loop.
#[instrument(skip_all)]
pub fn run_shell<P, C, R, W>(
    session: &mut Session<P>,
    ctx: &Context<'_, C>,
    cfg: &Config,
    password: Option<&str>,
    input: &mut R,
    out: &mut W,
) -> anyhow::Result<()>
where
    P: KeyValueStore,
    C: Clock,
    R: BufRead,
    W: Write,
{
    let default_category = cfg.default_category()?;

    match password {
        Some(password) => match session.auth.login(password) {
            Ok(()) => writeln!(out, "Logged in.")?,
            Err(err) => writeln!(out, "error: {err}")?,
        },
        None => writeln!(out, "Log in with `login <password>`. Type `help` for commands.")?,
    }

    let mut line = String::new();
    loop {
        write!(out, "{}", prompt(session))?;
        out.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(out)?;
            break;
        }

        if line.trim().is_empty() {
            continue;
        }

        match run_line(session, ctx, cfg, default_category, &line, input, out) {
            Ok(Flow::Quit) => break,
            Ok(Flow::Continue) => {}
            Err(err) => {
                let invalid_input = err
                    .downcast_ref::<ItemError>()
                    .is_some_and(ItemError::is_validation);
                if invalid_input {
                    debug!(error = %err, "rejected input");
                } else {
                    warn!(error = %err, "shell command failed");
                }
                writeln!(out, "error: {err:#}")?;
            }
        }
    }

    session.batch.cancel();
    session.auth.logout()?;
    info!("shell session ended");
    Ok(())
}

fn run_line<P, C, R, W>(
    session: &mut Session<P>,
    ctx: &Context<'_, C>,
    cfg: &Config,
    default_category: Category,
    line: &str,
    input: &mut R,
    out: &mut W,
) -> anyhow::Result<Flow>
where
    P: KeyValueStore,
    C: Clock,
    R: BufRead,
    W: Write,
{
    let tokens: Vec<String> = line.split_whitespace().map(str::to_string).collect();
    let inv = Invocation::from_tokens(cfg, &tokens)?;
    debug!(command = %inv.command, "shell line");
    let command = match Command::parse(&inv, ctx.clock.today(), default_category)? {
        Command::Login { .. } => Command::Login {
            password: text_after_command(line).to_string(),
        },
        other => other,
    };
    execute(session, ctx, command, input, out)
}

/// Everything after the command word and the single separator that follows
/// it, spacing intact. Only the line terminator is removed.
fn text_after_command(line: &str) -> &str {
    let line = line.trim_end_matches(['\r', '\n']).trim_start();
    let Some(split) = line.find(char::is_whitespace) else {
        return "";
    };
    let mut rest = line[split..].chars();
    rest.next();
    rest.as_str()
}

fn prompt<P: KeyValueStore>(session: &Session<P>) -> String {
    match session.batch.selected() {
        Some(ids) => format!("daylist [batch {}]> ", ids.len()),
        None => "daylist> ".to_string(),
    }
}
