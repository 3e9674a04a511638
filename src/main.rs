use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use epc_tracker_lib::commands::{dashboard_view, download_csv, download_pdf, record_history};
use epc_tracker_lib::feed::SnapshotResult;
use epc_tracker_lib::view::{ExpansionState, HistoryLine};
use parking_lot::Mutex;
use epc_tracker_lib::{
    bootstrap, AppConfig, Dashboard, DashboardView, FeedStatus, FileFeed, SnapshotFeed,
};

#[derive(Parser)]
#[command(name = "epc-tracker")]
#[command(about = "RFID tag dashboard: tag table, history and exports", long_about = None)]
struct Cli {
    /// JSON snapshot of the tag database
    #[arg(long, global = true, env = "SNAPSHOT_FILE")]
    snapshot: Option<PathBuf>,
    /// Database path to read inside the snapshot
    #[arg(long, global = true)]
    path: Option<String>,
    /// Directory that receives exported files
    #[arg(long, global = true)]
    out: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the tag table, newest first
    List {
        /// Only show tags whose EPC contains this text
        #[arg(long)]
        query: Option<String>,
    },
    /// Export one record's history
    Export {
        /// Record id as shown by `list`
        id: String,
        #[arg(long, value_enum, default_value_t = FormatArg::Both)]
        format: FormatArg,
    },
    /// Print one record's history, oldest first
    Show {
        /// Record id as shown by `list`
        id: String,
        /// History keys whose raw payload should be printed
        #[arg(long = "open")]
        open: Vec<String>,
    },
    /// Reprint the table whenever the snapshot file changes
    Watch {
        #[arg(long)]
        query: Option<String>,
        /// Record ids whose history is printed under the table
        #[arg(long = "expand")]
        expand: Vec<String>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Csv,
    Pdf,
    Both,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::from_env();
    if let Some(path) = cli.path {
        config.database_path = path;
    }
    if let Some(out) = cli.out {
        config.export_dir = out;
    }
    let Some(snapshot) = cli.snapshot.or_else(|| config.snapshot_file.clone()) else {
        bail!("no snapshot file given; pass --snapshot or set SNAPSHOT_FILE");
    };
    let feed = FileFeed::new(&snapshot, Duration::from_millis(config.poll_interval_ms));
    let dashboard = bootstrap(config).context("failed to start dashboard")?;

    match cli.command {
        Commands::List { query } => {
            load_once(&dashboard, &feed);
            let view = dashboard_view(&dashboard, query.as_deref()).map_err(anyhow::Error::msg)?;
            print_view(&view);
        }
        Commands::Export { id, format } => {
            load_once(&dashboard, &feed);
            if let FeedStatus::Failed { message } = dashboard.status() {
                bail!("snapshot unavailable: {message}");
            }
            if matches!(format, FormatArg::Csv | FormatArg::Both) {
                let receipt = download_csv(&dashboard, &id).map_err(anyhow::Error::msg)?;
                println!("{}", receipt.path.display());
            }
            if matches!(format, FormatArg::Pdf | FormatArg::Both) {
                let receipt = download_pdf(&dashboard, &id).map_err(anyhow::Error::msg)?;
                println!("{}", receipt.path.display());
            }
        }
        Commands::Show { id, open } => {
            load_once(&dashboard, &feed);
            let mut expansion = ExpansionState::default();
            expansion.toggle_row(&id);
            for key in &open {
                expansion.toggle_entry(&id, key);
            }
            let lines = record_history(&dashboard, &id, &expansion).map_err(anyhow::Error::msg)?;
            print_history(&lines);
        }
        Commands::Watch { query, expand } => {
            let query = query.unwrap_or_default();
            let printer = dashboard.clone();
            let listener = dashboard.listener();
            let mut expansion = ExpansionState::default();
            for id in &expand {
                expansion.toggle_row(id);
            }
            let expansion = Mutex::new(expansion);
            let subscription = feed
                .subscribe(
                    &dashboard.config().database_path,
                    Arc::new(move |result: SnapshotResult| {
                        listener(result);
                        let Ok(view) = dashboard_view(&printer, Some(&query)) else {
                            return;
                        };
                        print_view(&view);
                        let mut expansion = expansion.lock();
                        expansion.retain_rows(view.rows.iter().map(|row| row.record.id.as_str()));
                        let open_rows = view
                            .rows
                            .iter()
                            .filter(|row| expansion.is_row_open(&row.record.id));
                        for row in open_rows {
                            if let Ok(lines) = record_history(&printer, &row.record.id, &expansion) {
                                println!("\n{} ({})", row.record.id, row.record.epc);
                                print_history(&lines);
                            }
                        }
                    }),
                )
                .await?;
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for ctrl-c")?;
            subscription.unsubscribe();
        }
    }

    dashboard.flush_audit();
    Ok(())
}

fn load_once(dashboard: &Dashboard, feed: &FileFeed) {
    match feed.read(&dashboard.config().database_path) {
        Ok(snapshot) => dashboard.apply_snapshot(&snapshot, epc_tracker_lib::now_millis()),
        Err(message) => dashboard.apply_feed_error(&message),
    }
}

fn print_view(view: &DashboardView) {
    match &view.status {
        FeedStatus::Loading => {
            println!("Loading...");
            return;
        }
        FeedStatus::Failed { message } => {
            println!("Error: {message}");
            return;
        }
        FeedStatus::Ready => {}
    }

    println!(
        "{} tags | last update: {}",
        view.tag_count,
        view.last_update.as_deref().unwrap_or("—")
    );
    if view.rows.is_empty() {
        println!("No tags found.");
        return;
    }
    println!(
        "{:<4} {:<24} {:<20} {:<20} {:<10} {}",
        "", "EPC", "Item", "Location", "Direction", "Last Seen"
    );
    for row in &view.rows {
        let record = &row.record;
        println!(
            "{:<4} {:<24} {:<20} {:<20} {:<10} {}",
            if row.is_new { "NEW" } else { "" },
            record.epc,
            record.item_name,
            record.last_location,
            record.last_direction,
            record.last_seen
        );
    }
}

fn print_history(lines: &[HistoryLine]) {
    if lines.is_empty() {
        println!("No history.");
        return;
    }
    println!("{:<28} {:<20} {}", "Timestamp", "Location", "Direction");
    for line in lines {
        println!("{:<28} {:<20} {}", line.label, line.location, line.direction);
        if line.open {
            match serde_json::to_string_pretty(&line.raw) {
                Ok(raw) => println!("{raw}"),
                Err(err) => println!("  <unprintable payload: {err}>"),
            }
        }
    }
}
