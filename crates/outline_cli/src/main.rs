//! CLI smoke entry point.
//!
//! # Responsibility
//! - Drive a small outline through the engine and a SQLite sink.
//! - Reload it from storage and print the resulting views.
//!
//! Usage: `outline_cli [DB_PATH] [CONFIG_JSON_PATH]`. Without a path the
//! database lives in memory. Set `OUTLINE_LOG_DIR` to an absolute directory
//! to enable file logging.

use log::warn;
use outline_core::{
    init_logging_with_config, open_db, open_db_in_memory, EngineConfig, GraphRepository,
    OutlineEngine, Rank, SqliteGraphRepository, SubmitRequest, SystemClock, ViewOutcome,
};
use std::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("outline_cli: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let mut args = std::env::args().skip(1);
    let db_path = args.next();
    let config = match args.next() {
        Some(path) => EngineConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        None => EngineConfig::default(),
    };
    if let Ok(log_dir) = std::env::var("OUTLINE_LOG_DIR") {
        init_logging_with_config(&config, &log_dir)?;
    }

    let conn = match &db_path {
        Some(path) => open_db(path)?,
        None => open_db_in_memory()?,
    };
    let repo = SqliteGraphRepository::try_new(&conn)?;

    let mut engine = OutlineEngine::from_state(repo.load_state()?, config.clone(), SystemClock);
    for request in demo_requests() {
        engine.submit(&request)?;
    }
    let report = engine.flush_all(&repo);
    if !report.failed.is_empty() {
        warn!(
            "event=cli_flush module=cli status=error failed={}",
            report.failed.len()
        );
    }
    println!(
        "outline_core version={} revision={} stored={} failed={}",
        outline_core::core_version(),
        engine.revision(),
        report.dispatched,
        report.failed.len()
    );

    let reloaded = OutlineEngine::from_state(repo.load_state()?, config, SystemClock);
    let focus = path(&["Cat"]);
    let from = path(&["Pet"]);
    let (resolved, outcome) = reloaded.resolve_focus(&focus, Some(from.as_slice()))?;
    println!("focus={}", resolved.join(" > "));
    if let ViewOutcome::Render(plan) = outcome {
        for subheading in plan.subheadings {
            println!("  {}", subheading.path.join(" > "));
            for child in subheading.children {
                let marker = if child.is_leaf { "-" } else { "+" };
                println!("    {marker} {}", child.path.join(" > "));
            }
        }
    }
    Ok(())
}

fn demo_requests() -> Vec<SubmitRequest> {
    vec![
        SubmitRequest::thought("Animal", path(&["root"]), Rank(0)),
        SubmitRequest::thought("Cat", path(&["Animal"]), Rank(0)),
        SubmitRequest::thought("Dog", path(&["Animal"]), Rank(1)),
        SubmitRequest::thought("Cat", path(&["Pet"]), Rank(0)),
        SubmitRequest::thought("Whiskers", path(&["Pet", "Cat"]), Rank(0)),
    ]
}

fn path(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}
