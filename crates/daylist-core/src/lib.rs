pub mod auth;
pub mod batch;
pub mod calendar;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod grouping;
pub mod item;
pub mod render;
pub mod service;
pub mod shell;
pub mod stats;
pub mod storage;

use std::ffi::OsString;
use std::io::{
  self,
  BufRead,
  IsTerminal,
  Write
};

use anyhow::{
  Context,
  anyhow
};
use clap::Parser;
use tracing::{
  debug,
  info
};

use crate::commands::Command;
use crate::datetime::Clock;
use crate::storage::{
  FileStore,
  KeyValueStore
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting daylist"
  );
  debug!(
    overrides = pre.rc_overrides.len(),
    "preprocessed rc overrides"
  );

  let mut cfg = config::Config::load(
    cli.rcfile.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let store = FileStore::open(
    &data_dir
  )
  .with_context(|| {
    format!(
      "failed to open item store at \
       {}",
      data_dir.display()
    )
  })?;

  let renderer =
    render::Renderer::new(&cfg);
  let default_category =
    cfg.default_category()?;
  let mut session =
    commands::Session::new(
      store,
      cfg.auth_policy()?
    );
  let clock = datetime::SystemClock;
  let ctx = commands::Context {
    renderer: &renderer,
    clock:    &clock
  };

  let inv = cli::Invocation::parse(
    &cfg, cli.rest
  )?;
  let command = Command::parse(
    &inv,
    clock.today(),
    default_category
  )?;

  let stdin = io::stdin();
  let mut input = stdin.lock();
  let stdout = io::stdout();
  let mut out = stdout.lock();

  if command == Command::Shell {
    shell::run_shell(
      &mut session,
      &ctx,
      &cfg,
      cli.password.as_deref(),
      &mut input,
      &mut out
    )?;
    info!("done");
    return Ok(());
  }

  if command.is_interactive_only() {
    return Err(anyhow!(
      "`{}` is only available inside \
       `daylist shell`",
      inv.command
    ));
  }

  if command.requires_login() {
    let password = match cli.password {
      | Some(password) => password,
      | None => prompt_password(
        &mut input,
        &mut out
      )?
    };
    login_once(
      &mut session,
      &password
    )?;
  }

  commands::execute(
    &mut session,
    &ctx,
    command,
    &mut input,
    &mut out
  )?;

  info!("done");
  Ok(())
}

fn login_once<P: KeyValueStore>(
  session: &mut commands::Session<P>,
  password: &str
) -> anyhow::Result<()> {
  session.auth.login(password).context(
    "login failed (pass --password \
     or set DAYLIST_PASSWORD)"
  )?;
  Ok(())
}

fn prompt_password<R, W>(
  input: &mut R,
  out: &mut W
) -> anyhow::Result<String>
where
  R: BufRead,
  W: Write
{
  if !io::stdin().is_terminal() {
    return Err(anyhow!(
      "password required: pass \
       --password or set {}",
      cli::PASSWORD_ENV_VAR
    ));
  }

  write!(out, "Password: ")?;
  out.flush()?;
  let mut line = String::new();
  input
    .read_line(&mut line)
    .context("failed to read password")?;
  Ok(
    line
      .trim_end_matches(['\r', '\n'])
      .to_string()
  )
}
