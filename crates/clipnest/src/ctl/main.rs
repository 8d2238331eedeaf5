//! clipnest - command line client for the clipnestd daemon
//!
//! Talks to the daemon over its Unix socket to browse, search, pin and
//! restore clipboard history.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};

use clipnest::config;
use clipnest::ipc::IpcClient;
use clipnest_protocol::{ClipData, ContentEncoding, DEFAULT_LIMIT};

/// Width of the content column in table output.
const PREVIEW_WIDTH: usize = 60;

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "Error: {err:?}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

#[tokio::main]
async fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let socket = match cli.socket {
        Some(path) => config::expand_path(path)?,
        None => config::default_socket_path(),
    };
    let mut client = IpcClient::connect(&socket).await?;

    match cli.command {
        Command::List { limit } => {
            let clips = client.list(limit).await?;
            print_clips(&clips, cli.json)
        }
        Command::Search { query, limit } => {
            let clips = client.search(query, limit).await?;
            print_clips(&clips, cli.json)
        }
        Command::Pins => {
            let clips = client.pins().await?;
            print_clips(&clips, cli.json)
        }
        Command::Copy { id } => {
            client.copy(id).await?;
            print_done("copied", id, cli.json)
        }
        Command::Pin { id } => {
            client.pin(id).await?;
            print_done("pinned", id, cli.json)
        }
        Command::Unpin { id } => {
            client.unpin(id).await?;
            print_done("unpinned", id, cli.json)
        }
        Command::Remove { id } => {
            client.remove(id).await?;
            print_done("removed", id, cli.json)
        }
        Command::Clear { keep_pinned } => {
            client.clear(keep_pinned).await?;
            if cli.json {
                println!("{}", serde_json::json!({ "cleared": true, "keepPinned": keep_pinned }));
            } else if keep_pinned {
                println!("History cleared (pinned clips kept)");
            } else {
                println!("History cleared");
            }
            Ok(())
        }
        Command::Watch => handle_watch(&mut client, cli.json).await,
        Command::Ping => {
            client.ping().await?;
            if cli.json {
                println!("{}", serde_json::json!({ "ok": true }));
            } else {
                println!("clipnestd is running at {}", client.socket_path().display());
            }
            Ok(())
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "clipnest",
    author,
    version,
    about = "Browse and manage clipboard history kept by clipnestd."
)]
struct Cli {
    /// Daemon socket path
    #[arg(long, short = 's', env = "CLIPNEST_SOCKET", value_name = "PATH")]
    socket: Option<PathBuf>,

    /// Output machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the most recent clips, pinned ones included
    List {
        /// Maximum number of clips
        #[arg(default_value_t = DEFAULT_LIMIT)]
        limit: usize,
    },

    /// Find clips whose content contains a string
    Search {
        /// Case-sensitive substring to look for
        query: String,

        /// Maximum number of results
        #[arg(long, short = 'n', default_value_t = DEFAULT_LIMIT)]
        limit: usize,
    },

    /// Show pinned clips
    Pins,

    /// Put a clip back on the clipboard
    Copy { id: i64 },

    /// Keep a clip across restarts
    Pin { id: i64 },

    /// Release a pinned clip
    Unpin { id: i64 },

    /// Delete a clip from history
    Remove { id: i64 },

    /// Delete history
    Clear {
        /// Keep pinned clips
        #[arg(long)]
        keep_pinned: bool,
    },

    /// Print new clips as they are captured
    Watch,

    /// Check that the daemon is reachable
    Ping,
}

fn print_clips(clips: &[ClipData], json_output: bool) -> Result<()> {
    if json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(clips).context("serializing clips")?
        );
        return Ok(());
    }

    if clips.is_empty() {
        println!("No clips found");
        return Ok(());
    }

    println!(
        "{:<8} {:<3} {:<8} {:<19} {}",
        "ID", "PIN", "KIND", "CAPTURED", "CONTENT"
    );
    println!("{}", "-".repeat(100));
    for clip in clips {
        print_clip_row(clip);
    }
    Ok(())
}

fn print_clip_row(clip: &ClipData) {
    println!(
        "{:<8} {:<3} {:<8} {:<19} {}",
        clip.id,
        if clip.pinned { "*" } else { "" },
        clip.kind,
        format_captured(clip.captured_at),
        preview(clip)
    );
}

fn print_done(action: &str, id: i64, json_output: bool) -> Result<()> {
    if json_output {
        println!("{}", serde_json::json!({ "id": id, "status": action }));
    } else {
        println!("Clip {id} {action}");
    }
    Ok(())
}

async fn handle_watch(client: &mut IpcClient, json_output: bool) -> Result<()> {
    if !json_output {
        eprintln!(
            "Watching {} for new clips (Ctrl-C to stop)",
            client.socket_path().display()
        );
    }

    loop {
        let next = tokio::select! {
            next = client.next_push() => next?,
            _ = tokio::signal::ctrl_c() => return Ok(()),
        };
        let Some(clip) = next else {
            eprintln!("clipnestd closed the connection");
            return Ok(());
        };

        if json_output {
            println!(
                "{}",
                serde_json::to_string(&clip).context("serializing clip")?
            );
        } else {
            print_clip_row(&clip);
        }
    }
}

fn format_captured(seconds: i64) -> String {
    DateTime::from_timestamp(seconds, 0)
        .map(|ts| {
            ts.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| "-".to_string())
}

/// One-line preview of a clip's content.
fn preview(clip: &ClipData) -> String {
    if clip.encoding == ContentEncoding::Base64 {
        let size = clip.content_bytes().map(|b| b.len()).unwrap_or(0);
        return format!("<{} bytes of {}>", size, clip.kind);
    }

    let flattened: String = clip
        .content
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let shown: String = flattened.chars().take(PREVIEW_WIDTH).collect();
    if flattened.chars().count() > PREVIEW_WIDTH {
        format!("{}...", shown)
    } else {
        shown
    }
}
