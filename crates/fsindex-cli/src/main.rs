mod commands;
mod logging;
mod progress;

use std::io::{self, BufRead, Write};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands, ListAction, PathAction};
use dotenv::dotenv;
use fsindex_core::{
    format_date, format_file_size, load_configuration, seed_configuration, AppConfig, Database,
    JsonRecentFiles, NoRecentFiles, RecentFilesSource, RequestBus, RequestEvent, ResultRow,
    ScanOrchestrator, StoreHandle,
};
use progress::CliReporter;
use serde_json::{json, Value};
use tracing::{error, info};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            std::process::exit(1);
        }
    };

    let args = Cli::parse();

    let Some(command) = args.command else {
        Cli::command().print_long_help()?;
        return Ok(());
    };

    match command {
        Commands::PrintConfig => {
            println!("Configuration: {:#?}", config);
            Ok(())
        }
        Commands::TruncateDb { yes } => {
            let db = Database::open(&config.db_path)
                .with_context(|| format!("opening index at {}", config.db_path))?;
            let files = db.file_count()?;
            let confirmed = yes
                || confirm_truncate(
                    &config.db_path,
                    files,
                    &mut io::stdin().lock(),
                    &mut io::stdout(),
                )?;
            if !confirmed {
                println!("Index left untouched");
                return Ok(());
            }
            db.truncate_all()?;
            println!("All tables truncated ({} files dropped)", files);
            Ok(())
        }
        command => {
            let db = Database::open(&config.db_path)
                .with_context(|| format!("opening index at {}", config.db_path))?;
            seed_configuration(&db, &config)?;
            let store = StoreHandle::spawn(db)?;
            let result = dispatch(command, &config, &store);
            store.shutdown();
            if let Err(err) = &result {
                error!("Error: {:#}", err);
            }
            result
        }
    }
}

fn dispatch(command: Commands, config: &AppConfig, store: &StoreHandle) -> anyhow::Result<()> {
    match command {
        Commands::Scan => run_scan(config, store),
        Commands::Search { terms, limit } => {
            let limit = limit.unwrap_or(config.search_limit);
            let rows = store.search(&terms.join(" "), Some(limit))?;
            print_rows(rows.into_iter().map(ResultRow::from).collect());
            Ok(())
        }
        Commands::Favorites => {
            let rows = store.favorites()?;
            print_rows(rows.into_iter().map(ResultRow::from).collect());
            Ok(())
        }
        Commands::Favorite { action } => match action {
            PathAction::Add { path } => modify_list(store, "favorites", "insert", &path),
            PathAction::Remove { path } => modify_list(store, "favorites", "delete", &path),
        },
        Commands::Root { action } => run_list_action(store, "folders_to_index", action),
        Commands::Ignore { action } => run_list_action(store, "ignore_folders", action),
        Commands::Request { payload } => {
            let payload: Value = serde_json::from_str(&payload).context("payload is not JSON")?;
            let body = send_request(store, &payload)?;
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(())
        }
        Commands::History { limit } => {
            let history = store.scan_history(limit)?;
            if history.is_empty() {
                println!("No scans recorded yet");
            }
            for entry in history {
                println!(
                    "{}  {:>6}s  {} files",
                    format_date(&entry.started_at).cyan(),
                    entry.duration_seconds,
                    entry.files_processed
                );
            }
            Ok(())
        }
        Commands::Stats => run_stats(store),
        Commands::PrintConfig | Commands::TruncateDb { .. } => Ok(()),
    }
}

fn run_scan(config: &AppConfig, store: &StoreHandle) -> anyhow::Result<()> {
    let recent: Arc<dyn RecentFilesSource> = match &config.recent_files_list {
        Some(path) => Arc::new(JsonRecentFiles::new(path)),
        None => Arc::new(NoRecentFiles),
    };
    let (tx, events) = mpsc::channel();
    let orchestrator = ScanOrchestrator::new(store.clone(), config, recent, tx)?;

    let mut reporter = CliReporter::new();
    if orchestrator.request_scan()?.is_none() {
        bail!("a scan is already running");
    }
    let summary = reporter
        .watch(&events)
        .ok_or_else(|| anyhow!("scan ended without a summary"))?;

    println!(
        "  {} {} files processed in {}",
        "✓".green(),
        summary.files_processed.to_string().green(),
        format!("{:.2}s", summary.duration.as_secs_f64()).green()
    );
    if reporter.errors() > 0 {
        println!("  {} {} roots had errors", "!".yellow(), reporter.errors());
    }
    info!("{}", summary.status);
    Ok(())
}

fn run_list_action(store: &StoreHandle, table: &str, action: ListAction) -> anyhow::Result<()> {
    match action {
        ListAction::Add { path } => modify_list(store, table, "insert", &path),
        ListAction::Remove { path } => modify_list(store, table, "delete", &path),
        ListAction::List => {
            let rows = select_paths(store, table)?;
            if rows.is_empty() {
                println!("(none)");
            }
            for path in rows {
                println!("{}", path);
            }
            Ok(())
        }
    }
}

fn modify_list(store: &StoreHandle, table: &str, verb: &str, path: &str) -> anyhow::Result<()> {
    let payload = match verb {
        "insert" => json!({
            "command": "sql_command",
            "sql": "insert",
            "table": table,
            "column_names": ["path"],
            "values": [path],
        }),
        _ => json!({
            "command": "sql_command",
            "sql": "delete",
            "table": table,
            "column": "path",
            "value": path,
        }),
    };
    let body = send_request(store, &payload)?;
    let affected = body["result"].as_u64().unwrap_or(0);
    if affected == 0 {
        println!("{} {} unchanged", table.yellow(), path);
    } else {
        println!("{} {} {}", table.green(), verb, path);
    }
    Ok(())
}

fn select_paths(store: &StoreHandle, table: &str) -> anyhow::Result<Vec<String>> {
    let payload = json!({
        "command": "sql_command",
        "sql": "select",
        "table": table,
        "columns": ["path"],
    });
    let body = send_request(store, &payload)?;
    let rows = body["result"]
        .as_array()
        .ok_or_else(|| anyhow!("unexpected response: {}", body))?;
    Ok(rows
        .iter()
        .filter_map(|row| row.get(0).and_then(Value::as_str).map(str::to_string))
        .collect())
}

/// Round-trip one payload through a request bus. Error responses become `Err`.
fn send_request(store: &StoreHandle, payload: &Value) -> anyhow::Result<Value> {
    let (tx, events) = mpsc::channel();
    let bus = RequestBus::new(store.clone(), tx)?;
    let request_id = bus.submit(payload);
    loop {
        let event = events
            .recv_timeout(REQUEST_TIMEOUT)
            .with_context(|| format!("no reply to request {}", request_id))?;
        if event.request_id() != request_id {
            continue;
        }
        return match event {
            RequestEvent::Response { body, .. } => Ok(body),
            RequestEvent::Failed { body, .. } => Err(anyhow!(
                "{}",
                body["error"].as_str().unwrap_or("request failed")
            )),
        };
    }
}

fn run_stats(store: &StoreHandle) -> anyhow::Result<()> {
    println!("{:<18} {}", "Indexed files:".bold(), store.file_count()?);
    println!(
        "{:<18} {}",
        "Folders to index:".bold(),
        select_paths(store, "folders_to_index")?.len()
    );
    println!(
        "{:<18} {}",
        "Ignored folders:".bold(),
        select_paths(store, "ignore_folders")?.len()
    );
    println!(
        "{:<18} {}",
        "Favorites:".bold(),
        select_paths(store, "favorites")?.len()
    );
    match store.scan_history(1)?.first() {
        Some(last) => println!(
            "{:<18} {} ({} files, {}s)",
            "Last scan:".bold(),
            format_date(&last.started_at),
            last.files_processed,
            last.duration_seconds
        ),
        None => println!("{:<18} never", "Last scan:".bold()),
    }
    Ok(())
}

fn print_rows(rows: Vec<ResultRow>) {
    if rows.is_empty() {
        println!("No matches");
        return;
    }
    for row in &rows {
        let star = if row.is_favorite { "★".yellow() } else { " ".normal() };
        println!(
            "{} {:<40} {:>10}  {:<22} {}",
            star,
            row.name.bold(),
            format_file_size(row.size),
            format_date(&row.modified),
            row.path.dimmed()
        );
    }
    println!("{} results", rows.len().to_string().cyan());
}

/// Ask before wiping the index. Only an explicit "y" or "yes" confirms;
/// end of input or anything else declines.
fn confirm_truncate(
    db_path: &str,
    files: i64,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> io::Result<bool> {
    write!(
        output,
        "Delete all {} indexed files and every configured folder in {}? (y/N): ",
        files, db_path
    )?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(reply: &str) -> (bool, String) {
        let mut output = Vec::new();
        let confirmed =
            confirm_truncate("index.db", 42, &mut reply.as_bytes(), &mut output).unwrap();
        (confirmed, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_confirm_truncate_names_what_is_lost() {
        let (_, prompt) = answer("n\n");
        assert!(prompt.contains("42 indexed files"));
        assert!(prompt.contains("index.db"));
    }

    #[test]
    fn test_confirm_truncate_answers() {
        assert!(answer("y\n").0);
        assert!(answer(" YES \n").0);
        assert!(!answer("\n").0);
        assert!(!answer("nope\n").0);
        assert!(!answer("").0);
    }
}
