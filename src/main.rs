use std::process;

use chrono::{Local, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use clipcache::clipboard::write_to_clipboard;
use clipcache::config::{AppPaths, PAGE_SIZE};
use clipcache::errors::Result;
use clipcache::history::History;
use clipcache::storage::models::{ClipboardEntry, SearchQuery};
use clipcache::watcher;

#[derive(Parser)]
#[command(name = "clipcache", version, about = "Clipboard history with search and tags")]
struct Cli {
    /// Output results as JSON
    #[arg(short = 'j', long = "json", global = true)]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct Filter {
    /// Case-insensitive text to look for
    #[arg(long)]
    text: Option<String>,

    /// Only entries carrying this tag
    #[arg(long)]
    tag: Option<String>,
}

impl Filter {
    fn query(self) -> SearchQuery {
        SearchQuery::new(self.text.unwrap_or_default(), self.tag.unwrap_or_default())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List a page of clipboard history, newest first
    List {
        /// Index of the first entry to show
        #[arg(short, long, default_value = "0")]
        start: usize,

        /// Number of entries to show
        #[arg(short = 'n', long, default_value_t = PAGE_SIZE)]
        size: usize,

        #[command(flatten)]
        filter: Filter,
    },

    /// Count entries matching a filter
    Count {
        #[command(flatten)]
        filter: Filter,
    },

    /// Show the most recent entry matching a filter
    Recent {
        #[command(flatten)]
        filter: Filter,
    },

    /// Show one entry
    Get {
        /// Entry id (its timestamp)
        id: i64,
    },

    /// Put an entry back on the clipboard
    Copy {
        /// Entry id (its timestamp)
        id: i64,
    },

    /// Delete an entry
    Delete {
        /// Entry id (its timestamp)
        id: i64,
    },

    /// Add or remove a tag on an entry
    Tag {
        /// Entry id (its timestamp)
        id: i64,

        /// Tag name
        tag: String,

        /// Remove the tag instead of adding
        #[arg(short, long)]
        remove: bool,
    },

    /// List every tag in use
    Tags {
        /// Recompute the tag index from the stored entries first
        #[arg(long)]
        rebuild: bool,
    },

    /// Watch the clipboard in the foreground, printing each new entry
    Watch,

    /// Interactive TUI
    Tui,

    /// Manage the clipboard watcher daemon
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },
}

#[derive(Subcommand)]
enum DaemonAction {
    /// Start the clipboard watcher
    Start,
    /// Stop the clipboard watcher
    Stop,
    /// Check daemon status
    Status,
    /// Run watcher in foreground (used internally)
    #[command(hide = true)]
    Run,
}

#[derive(Serialize)]
struct StatusResponse {
    success: bool,
    message: String,
}

fn main() {
    let cli = Cli::parse();
    let json = cli.json;
    setup_logging(&cli);

    if let Err(e) = run(cli) {
        if json {
            eprintln!("{}", serde_json::json!({"error": e.to_string()}));
        } else {
            eprintln!("error: {}", e);
        }
        process::exit(1);
    }
}

/// `RUST_LOG` wins over `-v`. The TUI owns the terminal, so its logs are
/// discarded.
fn setup_logging(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let daemon = matches!(
        cli.command,
        Some(Commands::Watch) | Some(Commands::Daemon { action: DaemonAction::Run })
    );
    let level = match (cli.verbose, daemon) {
        (0, false) => "warn",
        (0, true) | (1, _) => "info",
        (2, _) => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if matches!(cli.command, Some(Commands::Tui)) {
        fmt().with_env_filter(filter).with_writer(std::io::sink).init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(cli.verbose > 1)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn run(cli: Cli) -> Result<()> {
    let paths = AppPaths::new();
    let json = cli.json;

    match cli.command {
        None => cmd_list(&paths, 0, PAGE_SIZE, SearchQuery::default(), json),
        Some(Commands::List {
            start,
            size,
            filter,
        }) => cmd_list(&paths, start, size, filter.query(), json),
        Some(Commands::Count { filter }) => cmd_count(&paths, filter.query(), json),
        Some(Commands::Recent { filter }) => cmd_recent(&paths, filter.query(), json),
        Some(Commands::Get { id }) => cmd_get(&paths, id, json),
        Some(Commands::Copy { id }) => cmd_copy(&paths, id, json),
        Some(Commands::Delete { id }) => cmd_delete(&paths, id, json),
        Some(Commands::Tag { id, tag, remove }) => cmd_tag(&paths, id, &tag, remove, json),
        Some(Commands::Tags { rebuild }) => cmd_tags(&paths, rebuild, json),
        Some(Commands::Watch) => cmd_watch(&paths, json),
        Some(Commands::Tui) => clipcache::tui::run(&paths),
        Some(Commands::Daemon { action }) => cmd_daemon(&paths, action, json),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn print_status(success: bool, message: String, json: bool) -> Result<()> {
    if json {
        print_json(&StatusResponse { success, message })
    } else {
        println!("{}", message);
        Ok(())
    }
}

fn cmd_list(
    paths: &AppPaths,
    start: usize,
    size: usize,
    query: SearchQuery,
    json: bool,
) -> Result<()> {
    let mut history = History::open(paths)?;
    let entries = history.batch(start, size, &query)?;

    if json {
        return print_json(&entries);
    }

    if entries.is_empty() {
        if query.is_empty() {
            println!("No clipboard history yet.");
        } else {
            println!("No entries match the filter.");
        }
        return Ok(());
    }

    for entry in &entries {
        print_entry_row(entry);
    }
    Ok(())
}

fn cmd_count(paths: &AppPaths, query: SearchQuery, json: bool) -> Result<()> {
    let mut history = History::open(paths)?;
    let count = history.count(&query)?;
    if json {
        print_json(&serde_json::json!({ "count": count }))
    } else {
        println!("{}", count);
        Ok(())
    }
}

fn cmd_recent(paths: &AppPaths, query: SearchQuery, json: bool) -> Result<()> {
    let mut history = History::open(paths)?;
    let entry = history.most_recent(&query)?;

    if json {
        return print_json(&entry);
    }

    if entry.is_empty() {
        println!("No entries found.");
    } else {
        print_entry_detail(&entry);
    }
    Ok(())
}

fn cmd_get(paths: &AppPaths, id: i64, json: bool) -> Result<()> {
    let history = History::open(paths)?;
    let entry = history.get(id)?;

    if json {
        return print_json(&entry);
    }

    print_entry_detail(&entry);
    Ok(())
}

fn cmd_copy(paths: &AppPaths, id: i64, json: bool) -> Result<()> {
    let history = History::open(paths)?;
    let entry = history.get(id)?;
    write_to_clipboard(&entry.text, &entry.html)?;
    print_status(true, format!("Copied entry {} to clipboard.", id), json)
}

fn cmd_delete(paths: &AppPaths, id: i64, json: bool) -> Result<()> {
    let mut history = History::open(paths)?;
    let found = history.delete(id)?;
    let message = if found {
        format!("Deleted entry {}.", id)
    } else {
        format!("Entry {} not found.", id)
    };
    print_status(found, message, json)
}

fn cmd_tag(paths: &AppPaths, id: i64, tag: &str, remove: bool, json: bool) -> Result<()> {
    let mut history = History::open(paths)?;
    let tag = tag.trim();
    let (changed, message) = if remove {
        let changed = history.remove_tag(id, tag)?;
        let message = if changed {
            format!("Removed tag \"{}\" from entry {}.", tag, id)
        } else {
            format!("Entry {} has no tag \"{}\".", id, tag)
        };
        (changed, message)
    } else {
        let changed = history.add_tag(id, tag)?;
        let message = if changed {
            format!("Added tag \"{}\" to entry {}.", tag, id)
        } else {
            format!("Entry {} not found or already tagged \"{}\".", id, tag)
        };
        (changed, message)
    };
    print_status(changed, message, json)
}

fn cmd_tags(paths: &AppPaths, rebuild: bool, json: bool) -> Result<()> {
    let mut history = History::open(paths)?;
    if rebuild {
        let occurrences = history.rebuild_tags()?;
        if !json {
            println!("Rebuilt tag index ({} occurrence(s)).", occurrences);
        }
    }
    let tags = history.all_tags();

    if json {
        return print_json(&tags);
    }

    if tags.is_empty() {
        println!("No tags.");
    }
    for tag in &tags {
        println!("{}", tag);
    }
    Ok(())
}

fn cmd_watch(paths: &AppPaths, json: bool) -> Result<()> {
    let mut history = History::open(paths)?;
    history.initialize()?;
    watcher::watch(&mut history, |entry| {
        if json {
            match serde_json::to_string(entry) {
                Ok(line) => println!("{}", line),
                Err(e) => eprintln!("error: {}", e),
            }
        } else {
            print_entry_row(entry);
        }
    })
}

fn cmd_daemon(paths: &AppPaths, action: DaemonAction, json: bool) -> Result<()> {
    match action {
        DaemonAction::Start => {
            if let Ok(Some(pid)) = watcher::daemon_status(paths) {
                return print_status(true, format!("Daemon already running (pid {}).", pid), json);
            }
            let pid = watcher::start_daemon(paths)?;
            print_status(true, format!("Started clipboard watcher (pid {}).", pid), json)
        }
        DaemonAction::Stop => {
            let stopped = watcher::stop_daemon(paths)?;
            let message = if stopped {
                "Stopped clipboard watcher."
            } else {
                "Daemon is not running."
            };
            print_status(stopped, message.to_string(), json)
        }
        DaemonAction::Status => {
            let pid = watcher::daemon_status(paths)?;
            if json {
                return print_json(&serde_json::json!({
                    "running": pid.is_some(),
                    "pid": pid,
                }));
            }
            match pid {
                Some(pid) => println!("Daemon running (pid {}).", pid),
                None => println!("Daemon is not running."),
            }
            Ok(())
        }
        DaemonAction::Run => watcher::run_watcher(paths),
    }
}

fn print_entry_row(entry: &ClipboardEntry) {
    let oneline = entry.text.replace('\n', "\\n");
    let preview = if oneline.chars().count() > 60 {
        format!("{}...", oneline.chars().take(57).collect::<String>())
    } else {
        oneline
    };

    let tags = if entry.tags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", entry.tags.join(", "))
    };

    println!(
        "{:>13} {:>6}  {}{}",
        entry.timestamp,
        format_age(entry),
        preview,
        tags
    );
}

fn print_entry_detail(entry: &ClipboardEntry) {
    println!("ID:      {}", entry.timestamp);
    if let Some(at) = entry.captured_at() {
        println!("Copied:  {}", at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"));
    }
    println!("HTML:    {}", format_bytes(entry.html.len()));
    if !entry.tags.is_empty() {
        println!("Tags:    {}", entry.tags.join(", "));
    }
    println!("─────────────────────────");
    println!("{}", entry.text);
}

fn format_age(entry: &ClipboardEntry) -> String {
    let Some(at) = entry.captured_at() else {
        return "?".to_string();
    };
    let dur = Utc::now() - at;
    if dur.num_seconds() < 60 {
        "now".to_string()
    } else if dur.num_minutes() < 60 {
        format!("{}m", dur.num_minutes())
    } else if dur.num_hours() < 24 {
        format!("{}h", dur.num_hours())
    } else {
        format!("{}d", dur.num_days())
    }
}

fn format_bytes(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
