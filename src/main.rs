use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

mod auth;
mod bookmarks;
mod cli;
mod client;
mod config;
mod ids;
mod search;
mod semantic;
#[cfg(test)]
mod tests;
mod web;

use client::{
    ClientQuery, Phase, QuerySession, RemoteSearchClient, SearchFetcher, SessionError,
    SessionOptions, SessionSnapshot,
};
use config::Config;
use search::{SearchMode, SearchScope};

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if args.verbose {
            "recall=debug,tower_http=debug"
        } else {
            "recall=info,tower_http=info"
        })
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let mut config = Config::load_with(config::base_path()?)?;

    match args.command {
        cli::Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            web::start_daemon(config)
        }

        cli::Command::Search {
            query,
            mode,
            scope,
            folder_id,
            kind,
            limit,
        } => {
            let client_config = config.client_with_env();
            let fetcher = RemoteSearchClient::new(&client_config);
            let query = ClientQuery {
                q: query,
                mode: SearchMode::parse_or(mode.as_deref(), client_config.default_mode),
                scope: scope.map(|s| SearchScope::parse_or(Some(&s), SearchScope::Compact)),
                folder_id,
                kind,
                limit,
            };

            let response = runtime()?
                .block_on(fetcher.fetch(query))
                .context("search failed")?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }

        cli::Command::Watch { mode } => {
            let client_config = config.client_with_env();
            let options = SessionOptions {
                debounce: Duration::from_millis(client_config.debounce_ms),
                mode: SearchMode::parse_or(mode.as_deref(), client_config.default_mode),
                ..Default::default()
            };
            let fetcher = Arc::new(RemoteSearchClient::new(&client_config));
            runtime()?.block_on(watch(fetcher, options))
        }
    }
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

async fn watch(fetcher: Arc<dyn SearchFetcher>, options: SessionOptions) -> anyhow::Result<()> {
    let session = QuerySession::spawn(fetcher, options);

    let mut updates = session.subscribe();
    let printer = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            print_snapshot(&snapshot);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = line.trim().to_string();
        match command.as_str() {
            ":quit" | ":q" => break,
            ":refresh" | ":r" => session.refresh(),
            ":clear" => session.input(""),
            ":reauth" => session.reauthenticated(),
            cmd if cmd.starts_with(":mode") => {
                let requested = cmd.trim_start_matches(":mode").trim();
                session.set_mode(SearchMode::parse_or(Some(requested), SearchMode::Hybrid));
            }
            _ => session.input(line),
        }
    }

    session.close().await;
    printer.abort();
    Ok(())
}

fn print_snapshot(snapshot: &SessionSnapshot) {
    match snapshot.phase {
        Phase::Idle | Phase::Cancelled | Phase::Debouncing => {}
        Phase::InFlight => eprintln!("searching {:?} ({})...", snapshot.query, snapshot.mode),
        Phase::Settled => {
            if snapshot.show_fallback_notice() {
                if let (Some(used), Some(reason)) = (snapshot.mode_used, snapshot.fallback_reason) {
                    println!("-- showing {used} results ({reason})");
                }
            }
            if snapshot.items.is_empty() {
                println!("no results");
            }
            for (i, item) in snapshot.items.iter().enumerate() {
                let folder = match (&item.folder_emoji, &item.folder_name) {
                    (Some(emoji), Some(name)) => format!(" [{emoji} {name}]"),
                    (None, Some(name)) => format!(" [{name}]"),
                    _ => String::new(),
                };
                let reasons: Vec<&str> = item
                    .match_reasons
                    .as_slice()
                    .iter()
                    .map(|r| r.as_str())
                    .collect();
                println!(
                    "{:>2}. {}{folder}  {:.3}  ({})",
                    i + 1,
                    item.title,
                    item.score,
                    reasons.join(", ")
                );
            }
        }
        Phase::Failed => match &snapshot.error {
            Some(SessionError::MustReauthenticate) => {
                eprintln!("not signed in: set RECALL_AUTH_TOKEN or client.token, then type :reauth")
            }
            Some(SessionError::Failed(message)) => {
                eprintln!("search failed: {message} (type :refresh to retry)")
            }
            None => {}
        },
    }
}
