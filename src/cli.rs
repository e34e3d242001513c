use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{Datelike, Duration, Utc};

use exec_schedule::{
    board::ScheduleBoard,
    storage::{backup::ExportData, config::Config},
    sync::{AuthorizationPrompt, SyncResult},
    ScheduleEvent,
};

pub const USAGE: &str = "Usage: exec-schedule [--auth | --sign-out | --status | --sync <event-id> | --sync-pending | --export <file> | --import <file> [--force]]";

#[derive(Debug, Clone, PartialEq)]
pub enum CliMode {
    Status,
    Auth,
    SignOut,
    Sync(String),
    SyncPending,
    Export(PathBuf),
    Import { path: PathBuf, force: bool },
    Help,
}

pub fn parse_cli_mode<I>(args: I) -> Result<CliMode, String>
where
    I: IntoIterator<Item = String>,
{
    let mut mode = None;
    let mut force = false;
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let next = match arg.as_str() {
            "--auth" => CliMode::Auth,
            "--sign-out" => CliMode::SignOut,
            "--status" => CliMode::Status,
            "--sync-pending" => CliMode::SyncPending,
            "--help" => CliMode::Help,
            "--force" => {
                force = true;
                continue;
            }
            "--sync" => CliMode::Sync(
                args.next().ok_or_else(|| "--sync needs an event id".to_string())?,
            ),
            "--export" => CliMode::Export(PathBuf::from(
                args.next().ok_or_else(|| "--export needs a file path".to_string())?,
            )),
            "--import" => CliMode::Import {
                path: PathBuf::from(
                    args.next().ok_or_else(|| "--import needs a file path".to_string())?,
                ),
                force: false,
            },
            _ => return Err(format!("Unknown argument: {}", arg)),
        };

        if mode.replace(next).is_some() {
            return Err("Only one mode may be given".to_string());
        }
    }

    match mode.unwrap_or(CliMode::Status) {
        CliMode::Import { path, .. } => Ok(CliMode::Import { path, force }),
        _ if force => Err("--force only applies to --import".to_string()),
        mode => Ok(mode),
    }
}

pub async fn run(mode: CliMode) -> anyhow::Result<()> {
    if mode == CliMode::Help {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = Config::load_or_create().context("loading configuration")?;
    let board = ScheduleBoard::connect(&config, Arc::new(TerminalPrompt))?;

    match mode {
        CliMode::Auth => authenticate(&config, &board).await,
        CliMode::SignOut => {
            board.session().sign_out()?;
            println!("Signed out.");
            Ok(())
        }
        CliMode::Status => print_status(&config, &board),
        CliMode::Sync(event_id) => match board.sync_event(&event_id).await? {
            Some(result) => {
                print_sync_result(&event_id, &result);
                Ok(())
            }
            None => bail!("No event with id {}", event_id),
        },
        CliMode::SyncPending => {
            let results = board.sync_unsynced().await?;
            if results.is_empty() {
                println!("Every event is already synced.");
            }
            for (event_id, result) in &results {
                print_sync_result(event_id, result);
            }
            Ok(())
        }
        CliMode::Export(path) => {
            let data = board.store().export_data()?;
            std::fs::write(&path, data.to_json()?)
                .with_context(|| format!("writing {}", path.display()))?;
            println!(
                "Exported {} executives and {} events to {}",
                data.executives.len(),
                data.events.len(),
                path.display()
            );
            Ok(())
        }
        CliMode::Import { path, force } => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let data = ExportData::from_json(&content)?;
            let summary = board.store().import_data(data, force)?;
            println!(
                "Imported {} events ({} executives on file). Run --sync-pending to push them.",
                summary.events_imported, summary.executives
            );
            Ok(())
        }
        CliMode::Help => Ok(()),
    }
}

/// Prints the consent instructions and reads the pasted code from stdin.
struct TerminalPrompt;

impl AuthorizationPrompt for TerminalPrompt {
    fn authorization_code(&self, auth_url: &str) -> io::Result<String> {
        let mut out = io::stdout().lock();
        writeln!(out, "\n=== Google Calendar Authentication ===\n")?;
        writeln!(out, "1. Visit this URL in your browser:\n")?;
        writeln!(out, "{}\n", auth_url)?;
        writeln!(out, "2. Sign in and authorize the application")?;
        writeln!(out, "3. Copy the 'code' parameter from the URL you are redirected to")?;
        writeln!(out, "4. Paste it below\n")?;
        writeln!(out, "Enter the authorization code: ")?;
        out.flush()?;
        drop(out);

        let mut code = String::new();
        io::stdin().read_line(&mut code)?;
        Ok(code)
    }
}

async fn authenticate(config: &Config, board: &ScheduleBoard) -> anyhow::Result<()> {
    if !config.google.has_credentials() {
        println!("Configuration incomplete. Please edit the config file at:");
        println!("{}", Config::config_path().display());
        println!("\nYou need to set:");
        println!("  - google.client_id: Your Google OAuth2 client ID");
        println!("  - google.client_secret: Your Google OAuth2 client secret");
        println!("\nGet these from: https://console.cloud.google.com/apis/credentials");
        bail!("Missing Google OAuth credentials in config");
    }

    let session = board.session().acquire().await?;
    match session.primary_identity {
        Some(identity) => println!("Authenticated as {}.", identity),
        None => println!("Authenticated."),
    }
    Ok(())
}

fn print_status(config: &Config, board: &ScheduleBoard) -> anyhow::Result<()> {
    let tz = config.sync.tz()?;
    let session = board.session();

    if session.has_session() {
        let identity = session.primary_identity().unwrap_or_else(|| "unknown account".to_string());
        println!("Signed in as {}", identity);
    } else {
        println!("Not signed in. Run exec-schedule --auth");
    }
    println!();

    let executives = board.store().executives()?;
    for executive in &executives {
        let calendar = if executive.has_calendar() {
            executive.calendar_id.as_str()
        } else {
            "(no calendar)"
        };
        println!("{:<32} {}", executive.title, calendar);
    }

    let today = Utc::now().with_timezone(&tz).date_naive();
    let week_start = today - Duration::days(today.weekday().num_days_from_monday() as i64);
    let events = board.store().events_in_week(week_start, &tz)?;

    println!();
    println!("Week of {}", week_start.format("%Y/%m/%d"));
    if events.is_empty() {
        println!("No events scheduled.");
    }
    for event in &events {
        let owner = executives
            .iter()
            .find(|e| e.id == event.executive_id)
            .map(|e| e.title.as_str())
            .unwrap_or("?");
        println!("- {}", agenda_line(event, owner, &tz));
    }

    let pending = board.store().events()?.iter().filter(|e| e.remote_id().is_none()).count();
    if pending > 0 {
        println!();
        println!("{} event(s) not yet synced.", pending);
    }
    Ok(())
}

fn agenda_line(event: &ScheduleEvent, owner: &str, tz: &chrono_tz::Tz) -> String {
    let start = event.start_date.with_timezone(tz);
    let end = event.end_date.with_timezone(tz);
    let when = if event.is_all_day {
        format!("{} All Day    ", start.format("%a %m/%d"))
    } else {
        format!("{} {}-{}", start.format("%a %m/%d"), start.format("%H:%M"), end.format("%H:%M"))
    };
    let synced = if event.remote_id().is_some() { "" } else { " (unsynced)" };

    let mut line = format!(
        "{} {} [{}] {}{}",
        when,
        owner,
        event.event_type.label(),
        event.title,
        synced
    );
    if let Some(location) = &event.location
        && !location.is_empty()
    {
        line.push_str(&format!(" @ {}", location));
    }
    line
}

fn print_sync_result(event_id: &str, result: &SyncResult) {
    match result {
        SyncResult::Created { remote_event_id } => {
            println!("{}: created remote event {}", event_id, remote_event_id)
        }
        SyncResult::Updated { remote_event_id } => {
            println!("{}: updated remote event {}", event_id, remote_event_id)
        }
        SyncResult::Failed(failure) => println!("{}: not synced ({})", event_id, failure),
    }
}
