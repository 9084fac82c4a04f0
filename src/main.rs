use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod aggregate;
mod bucket;
mod config;
mod console;
mod datetime;
mod entry_command;
mod error;
mod goal;
mod goals_command;
mod interval;
mod logger;
mod overlap;
mod overlap_command;
mod store;
mod summary_command;
mod time_entry;

use config::Config;
use console::{ConsoleMarkdownList, ConsolePresenter};
use entry_command::{AddArgs, ClockInArgs, ClockOutArgs, DeleteArgs, EntryCommand};
use goals_command::{GoalsArgs, GoalsCommand};
use overlap_command::{OverlapArgs, OverlapCommand};
use store::JsonFileStore;
use summary_command::{SummaryArgs, SummaryCommand, SummaryReport};

/// 弁護士の請求可能時間を集計するためのCLIアプリケーション。
///
/// # Examples
/// ```
/// $ cargo run -- summary -t weekly -u Cole
/// $ cargo run -- add -u Cole -d 2025-08-12 -s 9:00AM -e 5:00PM --billable
/// $ cargo run -- overlap -u Cole -d 2025-08-12 --office-start 2025-08-12T12:30:00Z --office-end 2025-08-12T14:30:00Z
/// ```
#[derive(Debug, Parser)]
#[clap(version, about)]
struct Args {
    #[clap(
        long = "data-dir",
        global = true,
        help = "Directory of the JSON data files (overrides BILLABLES_DATA_DIR)"
    )]
    data_dir: Option<PathBuf>,

    #[clap(short = 'v', long = "verbose", global = true, help = "Show debug logs")]
    verbose: bool,

    #[clap(subcommand)]
    subcommand: SubCommands,
}

/// サブコマンドを表す列挙型。
#[derive(Debug, Subcommand)]
enum SubCommands {
    Summary(SummaryArgs),
    Overlap(OverlapArgs),
    Goals(GoalsArgs),
    Add(AddArgs),
    Delete(DeleteArgs),
    ClockIn(ClockInArgs),
    ClockOut(ClockOutArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::from_env()
        .context("Failed to load configuration")?
        .with_overrides(args.data_dir, args.verbose);
    logger::setup_logger(config.log_level)?;

    let store = JsonFileStore::new(&config.data_dir);
    let mut stdout = io::stdout();
    let mut presenter = ConsoleMarkdownList::new(&mut stdout);

    match args.subcommand {
        SubCommands::Summary(summary) => {
            match SummaryCommand::new(&store).run(summary).await? {
                SummaryReport::Total(bucket, summary) => {
                    presenter.show_summary(&bucket, &summary)?
                }
                SummaryReport::ByUser(bucket, summaries) => {
                    presenter.show_user_summaries(&bucket, &summaries)?
                }
            }
        }
        SubCommands::Overlap(overlap) => {
            let (session, report) = OverlapCommand::new(&store).run(overlap).await?;
            presenter.show_overlap(&session, &report)?;
        }
        SubCommands::Goals(goals) => {
            let (view, report) = GoalsCommand::new(&store).run(goals).await?;
            presenter.show_goals(view, &report)?;
        }
        SubCommands::Add(add) => {
            let entry = EntryCommand::new(&store).add(add).await?;
            presenter.show_time_entry(&entry)?;
        }
        SubCommands::Delete(delete) => EntryCommand::new(&store).delete(delete).await?,
        SubCommands::ClockIn(clock_in) => {
            EntryCommand::new(&store).clock_in(clock_in).await?;
        }
        SubCommands::ClockOut(clock_out) => {
            let entry = EntryCommand::new(&store).clock_out(clock_out).await?;
            presenter.show_time_entry(&entry)?;
        }
    }

    Ok(())
}
