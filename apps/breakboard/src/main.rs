mod config;
mod render;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    AdminGate, AlfredAction, BoardSession, Committed, HttpRemote, NoRemote, RemoteSync,
    SystemClock,
};
use serde_json::{json, Value};
use shared::{
    domain::{CalendarDate, ClockTime, EmployeeId, MonthDay, WeekdaySet},
    error::{BoardError, ErrorReport},
};
use storage::Storage;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "breakboard", about = "Team meal-break board")]
struct Cli {
    /// Day to view, as YYYY-MM-DD. Defaults to today.
    #[arg(long, global = true)]
    date: Option<CalendarDate>,
    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Today's roster grouped by team.
    Roster,
    /// All registered employees.
    Employees,
    /// Pull the remote mirror and adopt it if newer.
    Sync,
    AddEmployee {
        #[arg(long)]
        name: String,
        #[arg(long)]
        team: String,
        /// e.g. "Saturday, Sunday" or "일요일".
        #[arg(long, default_value = "")]
        off_days: WeekdaySet,
    },
    EditEmployee {
        id: i64,
        #[arg(long)]
        name: String,
        #[arg(long)]
        team: String,
        #[arg(long, default_value = "")]
        off_days: WeekdaySet,
    },
    DeleteEmployee {
        id: i64,
    },
    RenameTeam {
        old_name: String,
        new_name: String,
    },
    /// Toggle a vacation day (MM-DD). Defaults to the viewed date.
    Vacation {
        employee: String,
        #[arg(long = "on")]
        day: Option<MonthDay>,
    },
    /// Start or finish the employee's break at the current time.
    Record {
        employee: String,
    },
    /// Clear the employee's break record for the viewed date.
    Cancel {
        employee: String,
    },
    /// Set break times directly. Requires the admin passphrase.
    AdminSet {
        employee: String,
        #[arg(long)]
        passphrase: String,
        #[arg(long)]
        down: Option<ClockTime>,
        #[arg(long)]
        up: Option<ClockTime>,
    },
    /// Quick command: `Kim Lee` or `Kim Lee cancel`.
    Alfred {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = config::load_settings();
    let database_url = settings.resolved_database_url();
    let storage = Storage::new(&database_url)
        .await
        .with_context(|| format!("failed to open local store at '{database_url}'"))?;
    storage.health_check().await?;

    let remote: Arc<dyn RemoteSync> = match settings.remote_url.clone() {
        Some(url) => {
            info!(endpoint = %url, "remote mirror enabled");
            Arc::new(HttpRemote::new(url).with_timeout(settings.remote_timeout))
        }
        None => Arc::new(NoRemote),
    };

    let mut session = BoardSession::open(
        storage,
        settings.storage_key.clone(),
        remote,
        Arc::new(SystemClock),
    )
    .await;
    if let Some(date) = cli.date {
        session.set_viewed_date(date);
    }

    let refresh_roster = matches!(cli.command, Command::Roster);
    let fetch =
        (!matches!(cli.command, Command::Sync)).then(|| session.fetch_remote_in_background());

    let result = run(&mut session, &settings, cli.command, cli.json).await;

    // Local work is done; remote stragglers get at most one more timeout.
    if let Some(fetch) = fetch {
        let fetched = timeout(settings.remote_timeout, fetch).await;
        if let Ok(Ok(Some(snapshot))) = fetched {
            let before = session.board().last_updated();
            if let Some(warning) = session.adopt_remote(snapshot).await {
                report_warning(&warning.to_string(), cli.json);
            }
            if refresh_roster && session.board().last_updated() != before {
                debug!("remote snapshot adopted, refreshing roster");
                print_roster(&session, cli.json)?;
            }
        }
    }
    if timeout(settings.remote_timeout, session.flush_remote()).await.is_err() {
        warn!("remote push still pending at exit, leaving it unsent");
    }

    result
}

async fn run(
    session: &mut BoardSession,
    settings: &config::Settings,
    command: Command,
    json: bool,
) -> Result<()> {
    let date = session.board().viewed_date();

    match command {
        Command::Roster => print_roster(session, json)?,
        Command::Employees => {
            let employees = session.board().employees();
            if json {
                println!("{}", serde_json::to_string_pretty(employees)?);
            } else {
                print!("{}", render::employees_text(employees));
            }
        }
        Command::Sync => {
            let adopted = session.reconcile_remote().await;
            emit(
                json,
                json!({ "adopted": adopted }),
                if adopted {
                    "adopted newer remote snapshot"
                } else {
                    "local state is current"
                },
            )?;
        }
        Command::AddEmployee {
            name,
            team,
            off_days,
        } => {
            let committed = session.add_employee(&name, &team, off_days).await;
            let id = settle(committed, json)?;
            emit(json, json!({ "id": id }), &format!("added {name} (id {id})"))?;
        }
        Command::EditEmployee {
            id,
            name,
            team,
            off_days,
        } => {
            let committed = session
                .edit_employee(EmployeeId(id), &name, &team, off_days)
                .await;
            settle(committed, json)?;
            emit(json, json!({ "id": id }), &format!("updated employee {id}"))?;
        }
        Command::DeleteEmployee { id } => {
            let removed = settle(session.delete_employee(EmployeeId(id)).await, json)?;
            emit(
                json,
                json!({ "id": id, "name": removed.name }),
                &format!("deleted {}", removed.name),
            )?;
        }
        Command::RenameTeam { old_name, new_name } => {
            let moved = settle(session.rename_team(&old_name, &new_name).await, json)?;
            emit(
                json,
                json!({ "team": new_name, "moved": moved }),
                &format!("renamed '{old_name}' to '{new_name}' ({moved} employees moved)"),
            )?;
        }
        Command::Vacation { employee, day } => {
            let id = resolve_employee(session, &employee)?;
            let day = day.unwrap_or_else(|| date.month_day());
            let on = settle(session.toggle_vacation(id, day).await, json)?;
            let state = if on { "on vacation" } else { "working" };
            emit(
                json,
                json!({ "id": id, "date": day, "onVacation": on }),
                &format!("{employee} is {state} on {day}"),
            )?;
        }
        Command::Record { employee } => {
            let id = resolve_employee(session, &employee)?;
            let transition = settle(session.record_break(id, date).await, json)?;
            emit(
                json,
                serde_json::to_value(transition)?,
                &render::transition_text(&employee, &transition),
            )?;
        }
        Command::Cancel { employee } => {
            let id = resolve_employee(session, &employee)?;
            let removed = settle(session.cancel_break(id, date).await, json)?;
            emit(
                json,
                json!({ "id": id, "removed": removed }),
                if removed {
                    "break record cleared"
                } else {
                    "nothing to clear"
                },
            )?;
        }
        Command::AdminSet {
            employee,
            passphrase,
            down,
            up,
        } => {
            let gate = AdminGate::new(settings.admin_passphrase.clone());
            let Some(access) = gate.unlock(&passphrase) else {
                bail!("admin passphrase rejected");
            };
            let id = resolve_employee(session, &employee)?;
            let record = settle(
                session.admin_upsert_break(&access, id, date, down, up).await,
                json,
            )?;
            emit(
                json,
                json!({ "recordId": record, "breakDown": down, "breakUp": up }),
                &format!("set {employee}'s break on {date}"),
            )?;
        }
        Command::Alfred { text } => {
            let line = text.join(" ");
            let committed = session.run_alfred(&line, &settings.cancel_keyword).await;
            if let Some(warning) = &committed.warning {
                report_warning(&warning.to_string(), json);
            }
            let report = committed.value;
            if json {
                let outcomes: Vec<Value> = report
                    .outcomes
                    .iter()
                    .map(|outcome| match &outcome.result {
                        Ok(action) => json!({
                            "name": outcome.name,
                            "id": outcome.employee_id,
                            "result": alfred_action_value(action),
                        }),
                        Err(err) => json!({
                            "name": outcome.name,
                            "id": outcome.employee_id,
                            "error": ErrorReport::from(err),
                        }),
                    })
                    .collect();
                let doc = json!({ "outcomes": outcomes, "unresolved": report.unresolved });
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else {
                print!("{}", render::alfred_text(&report));
            }
        }
    }

    Ok(())
}

fn alfred_action_value(action: &AlfredAction) -> Value {
    serde_json::to_value(action).unwrap_or(Value::Null)
}

/// Numeric arguments are ids, anything else is looked up by name.
fn resolve_employee(session: &BoardSession, employee: &str) -> Result<EmployeeId> {
    if let Ok(raw) = employee.parse::<i64>() {
        let id = EmployeeId(raw);
        if session.board().employee(id).is_some() {
            return Ok(id);
        }
    }
    match session.board().employee_by_name(employee) {
        Some(found) => Ok(found.id),
        None => bail!("no employee named or numbered '{employee}'"),
    }
}

/// Surfaces the save warning and turns a rejected mutation into an error.
fn settle<T>(committed: Result<Committed<T>, BoardError>, json: bool) -> Result<T> {
    match committed {
        Ok(Committed { value, warning }) => {
            if let Some(warning) = warning {
                report_warning(&warning.to_string(), json);
            }
            Ok(value)
        }
        Err(err) => {
            if json {
                println!("{}", json!({ "error": ErrorReport::from(&err) }));
            }
            Err(err.into())
        }
    }
}

fn report_warning(message: &str, json: bool) {
    if json {
        eprintln!("{}", json!({ "warning": message }));
    } else {
        eprintln!("warning: {message}");
    }
}

fn emit(json: bool, value: Value, text: &str) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{text}");
    }
    Ok(())
}

fn print_roster(session: &BoardSession, json: bool) -> Result<()> {
    let roster = session.roster();
    if json {
        println!("{}", serde_json::to_string_pretty(&roster)?);
    } else {
        print!("{}", render::roster_text(&roster));
    }
    Ok(())
}
