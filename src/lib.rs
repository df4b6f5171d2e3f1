pub mod auth;
pub mod baseline;
pub mod classifier;
pub mod commands;
pub mod db;
pub mod directory;
pub mod error;
pub mod history;
pub mod session;
pub mod settings;
pub mod storage;
pub mod submission;
mod utils;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use log::warn;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use auth::{login_with_access_token, IdentityProvider, ProfileIdentity, SessionEstablisher, StaticIdentity};
use commands::AppState;
use db::{CommodityType, Database, ReadingFilter};
use directory::MeterDirectory;
use history::HistoryRetriever;
use session::ReadingSession;
use settings::SettingsStore;
use storage::LocalObjectStore;
use submission::SubmissionAssembler;

const DEFAULT_DATA_DIR: &str = "./meterdesk-data";
const PAGE_SIZE: usize = 20;

const HELP: &str = "\
commands:
  whoami                      show the signed-in operator
  commodity <water|energy>    switch commodity (clears the selection)
  scan                        open the scanner
  token <raw>                 feed a scanned token
  unscan                      close the scanner
  buildings                   list buildings
  floors <building>           list floors of a building
  meters <building> [| floor] list meters at a building/floor
  select <meter id>           select a meter manually
  clear                       drop the selected meter and pending reading
  value <reading>             type the reading
  justify <rollover|correction|none>
  photo <path>                attach the evidence photo
  unphoto                     remove the evidence photo
  reload                      fetch the meter history again
  show                        show the pending reading
  submit                      save the pending reading
  readings <water|energy> [page] [search]
  threshold <ratio>           store a new alert threshold ratio
  settings                    show settings
  register <water|energy> <name> | <building> [| floor]
  issue-token <description>   issue a field-operator access token
  quit";

/// Wire every collaborator onto the SQLite database in `data_dir`.
pub async fn build_state(data_dir: PathBuf) -> Result<AppState> {
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let database = Database::new(data_dir.join("meterdesk.sqlite3"))?;
    let settings_store = SettingsStore::new(data_dir.join("settings.json"))?;
    let settings = settings_store.get();

    let objects = LocalObjectStore::new(
        settings.evidence_dir(&data_dir),
        settings.evidence_base_url.clone(),
    )?;

    let identity: Arc<dyn IdentityProvider> = match std::env::var("METERDESK_ACCESS_TOKEN") {
        Ok(token) => match login_with_access_token(&database, &token).await {
            Ok(user) => Arc::new(StaticIdentity::new(Some(user))),
            Err(err) => {
                warn!("Access token login failed: {err:#}");
                Arc::new(StaticIdentity::new(None))
            }
        },
        Err(_) => match std::env::var("METERDESK_USER") {
            Ok(user_id) => Arc::new(ProfileIdentity::new(
                database.clone(),
                user_id,
                std::env::var("METERDESK_EMAIL").ok(),
            )),
            Err(_) => Arc::new(StaticIdentity::new(None)),
        },
    };

    let establisher = Arc::new(SessionEstablisher::new(settings.session_timeout()));
    establisher.establish(identity.as_ref()).await;

    let db = Arc::new(database.clone());
    let session = ReadingSession::new(
        CommodityType::Water,
        MeterDirectory::new(db.clone()),
        HistoryRetriever::with_limits(
            db.clone(),
            settings.history_window_days,
            settings.history_fallback_count,
        ),
        SubmissionAssembler::new(Arc::new(objects), db),
        establisher.clone(),
        settings.session_config(),
    );

    Ok(AppState {
        db: database,
        session,
        auth: establisher,
        settings: settings_store,
        data_dir,
    })
}

fn render<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|err| format!("<unprintable: {err}>"))
}

fn report<T: Serialize>(result: Result<T, String>) -> String {
    match result {
        Ok(value) => render(&value),
        Err(message) => format!("error: {message}"),
    }
}

async fn dispatch(state: &AppState, line: &str) -> Option<String> {
    let line = line.trim();
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    let output = match command {
        "" => return Some(String::new()),
        "quit" | "exit" => return None,
        "help" => HELP.to_string(),
        "whoami" => render(&commands::get_auth_state(state)),
        "commodity" => report(commands::set_commodity(state, rest).await),
        "scan" => {
            commands::begin_scan(state);
            "scanner open".to_string()
        }
        "unscan" => {
            commands::cancel_scan(state);
            "scanner closed".to_string()
        }
        "token" => match commands::offer_scan_token(state, rest).await {
            Ok(Some(meter)) => render(&meter),
            Ok(None) => "token ignored".to_string(),
            Err(message) => format!("error: {message}"),
        },
        "buildings" => report(commands::list_buildings(state).await),
        "floors" => report(commands::list_floor_options(state, rest).await),
        "meters" => {
            if rest.is_empty() {
                report(commands::list_meters(state).await)
            } else {
                let (building, floor) = match rest.split_once('|') {
                    Some((building, floor)) => (building.trim(), Some(floor.trim())),
                    None => (rest, None),
                };
                report(commands::list_meters_at(state, building, floor).await)
            }
        }
        "select" => report(commands::select_meter(state, rest).await),
        "clear" => report(commands::clear_selection(state).await),
        "value" => report(commands::set_reading_value(state, rest).await),
        "justify" => {
            let choice = match rest {
                "" | "none" => None,
                other => Some(other),
            };
            report(commands::set_justification(state, choice).await)
        }
        "photo" => report(commands::attach_evidence_file(state, std::path::Path::new(rest)).await),
        "unphoto" => report(commands::clear_evidence(state).await),
        "reload" => report(commands::reload_history(state).await),
        "show" => report(commands::get_session_view(state).await),
        "submit" => report(commands::submit_reading(state).await),
        "readings" => {
            let mut parts = rest.splitn(3, char::is_whitespace);
            let commodity = parts.next().unwrap_or_default();
            let page = parts
                .next()
                .and_then(|page| page.parse::<usize>().ok())
                .unwrap_or(1)
                .max(1);
            let filter = ReadingFilter {
                search: parts.next().map(str::to_string),
                ..ReadingFilter::default()
            };
            report(
                commands::list_readings_paginated(
                    state,
                    commodity,
                    filter,
                    PAGE_SIZE,
                    (page - 1) * PAGE_SIZE,
                )
                .await,
            )
        }
        "threshold" => match rest.parse::<f64>() {
            Ok(ratio) => report(commands::set_alert_threshold_ratio(state, ratio)),
            Err(_) => format!("error: not a number: {rest}"),
        },
        "settings" => render(&commands::get_settings(state)),
        "register" => {
            let (commodity, rest) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            let mut fields = rest.split('|').map(str::trim);
            let name = fields.next().unwrap_or_default();
            let building = fields.next().unwrap_or_default();
            let floor = fields.next();
            report(commands::register_meter(state, name, commodity, building, floor).await)
        }
        "issue-token" => report(commands::issue_access_token(state, rest).await),
        other => format!("unknown command '{other}', try 'help'"),
    };
    Some(output)
}

async fn console(state: AppState) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    stdout.write_all(b"meterdesk ready, type 'help'\n").await?;
    while let Some(line) = lines.next_line().await? {
        let Some(output) = dispatch(&state, &line).await else {
            break;
        };
        if !output.is_empty() {
            stdout.write_all(output.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
        }
        stdout.flush().await?;
    }

    log::info!("Console closed; data kept in {}", state.data_dir.display());
    Ok(())
}

pub fn run() {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    log::info!("MeterDesk starting up...");

    let data_dir = std::env::var("METERDESK_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR));

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
        .and_then(|runtime| {
            runtime.block_on(async move {
                let state = build_state(data_dir).await?;
                console(state).await
            })
        });

    if let Err(err) = result {
        log::error!("MeterDesk stopped: {err:#}");
        std::process::exit(1);
    }
}
