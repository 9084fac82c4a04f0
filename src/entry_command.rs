use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use log::info;

use crate::datetime;
use crate::interval::{parse_interval, TimeInterval};
use crate::store::EntryRepository;
use crate::time_entry::{EntrySource, StoredTimeEntry};

/// `add`サブコマンドの引数。
#[derive(Debug, clap::Args)]
pub struct AddArgs {
    #[clap(short = 'u', long = "user")]
    user: String,

    #[clap(
        short = 'd',
        long = "date",
        help = "Date of the entry: YYYY-MM-DD, M/D/YYYY or a written-out date"
    )]
    date: String,

    #[clap(short = 's', long = "start", help = "Start time, e.g. 9, 9:30 or 9:30AM")]
    start: String,

    #[clap(short = 'e', long = "end", help = "End time, e.g. 17, 17:00 or 5:00PM")]
    end: String,

    #[clap(long = "billable")]
    billable: bool,

    #[clap(long = "case", help = "Case the time was spent on")]
    case_id: Option<String>,

    #[clap(long = "description", default_value = "")]
    description: String,
}

/// `delete`サブコマンドの引数。
#[derive(Debug, clap::Args)]
pub struct DeleteArgs {
    #[clap(long = "id", help = "Id of the time entry to delete")]
    id: String,
}

/// `clock-in`サブコマンドの引数。
#[derive(Debug, clap::Args)]
pub struct ClockInArgs {
    #[clap(short = 'u', long = "user")]
    user: String,
}

/// `clock-out`サブコマンドの引数。
#[derive(Debug, clap::Args)]
pub struct ClockOutArgs {
    #[clap(short = 'u', long = "user")]
    user: String,

    #[clap(long = "billable")]
    billable: bool,

    #[clap(long = "case", help = "Case the time was spent on")]
    case_id: Option<String>,

    #[clap(long = "description", default_value = "")]
    description: String,
}

/// タイムエントリーを記録・削除するためのサブコマンド群。
pub struct EntryCommand<'a, T: EntryRepository> {
    repository: &'a T,
}

impl<'a, T: EntryRepository> EntryCommand<'a, T> {
    /// 新しい`EntryCommand`を返す。
    pub fn new(repository: &'a T) -> Self {
        Self { repository }
    }

    /// 日付と開始・終了時刻からタイムエントリーを追加する。
    pub async fn add(&self, args: AddArgs) -> Result<StoredTimeEntry> {
        let interval = parse_interval(&args.date, &args.start, &args.end).with_context(|| {
            format!(
                "Failed to parse interval: {} {} - {}",
                args.date, args.start, args.end
            )
        })?;

        let entry = StoredTimeEntry::from_interval(
            &args.user,
            &interval,
            args.billable,
            args.case_id,
            args.description,
            EntrySource::Manual,
        );
        self.repository
            .append_time_entry(entry.clone())
            .await
            .context("Failed to save time entry")?;
        info!("Time entry {} added.", entry.id);

        Ok(entry)
    }

    /// タイムエントリーを削除する。存在しない場合はエラーを返す。
    pub async fn delete(&self, args: DeleteArgs) -> Result<()> {
        let removed = self
            .repository
            .delete_time_entry(&args.id)
            .await
            .context("Failed to delete time entry")?;
        if !removed {
            bail!("No time entry with id {}", args.id);
        }
        info!("Time entry {} deleted.", args.id);

        Ok(())
    }

    /// 出勤を記録し、出勤時刻を返す。
    pub async fn clock_in(&self, args: ClockInArgs) -> Result<DateTime<Utc>> {
        let now = datetime::now();
        self.repository
            .start_clock(&args.user, now)
            .await
            .with_context(|| format!("Failed to clock in {}", args.user))?;
        info!("{} clocked in at {}", args.user, now);

        Ok(now)
    }

    /// 出勤から現在までのタイムエントリーを記録する。
    ///
    /// 出勤の記録はエントリーを保存できてから消す。途中で失敗しても出勤中のまま残る。
    pub async fn clock_out(&self, args: ClockOutArgs) -> Result<StoredTimeEntry> {
        let now = datetime::now();
        let start = self
            .repository
            .clock_session(&args.user)
            .await
            .with_context(|| format!("Failed to load clock session of {}", args.user))?
            .with_context(|| format!("{} is not clocked in", args.user))?;
        let interval = TimeInterval::new(start, now).context("Failed to build clock interval")?;

        let entry = StoredTimeEntry::from_interval(
            &args.user,
            &interval,
            args.billable,
            args.case_id,
            args.description,
            EntrySource::Clock,
        );
        self.repository
            .append_time_entry(entry.clone())
            .await
            .context("Failed to save time entry")?;
        self.repository
            .finish_clock(&args.user)
            .await
            .with_context(|| format!("Failed to clock out {}", args.user))?;
        info!("{} clocked out, time entry {} added.", args.user, entry.id);

        Ok(entry)
    }
}
