use anyhow::{Context, Result};
use log::info;

use crate::aggregate::valid_entries;
use crate::overlap::{reconcile, OfficeSession, OverlapReport};
use crate::store::EntryRepository;

/// 在席時間とタイムエントリーを突き合わせるためのサブコマンド。
#[derive(Debug, clap::Args)]
pub struct OverlapArgs {
    #[clap(short = 'u', long = "user", help = "User whose entries are reconciled")]
    user: String,

    #[clap(short = 'd', long = "date", help = "Date of the office session")]
    date: String,

    #[clap(
        long = "office-start",
        help = "Start of the office session (ISO-8601, e.g. 2025-08-12T12:30:00Z)"
    )]
    office_start: String,

    #[clap(long = "office-end", help = "End of the office session (ISO-8601)")]
    office_end: String,

    #[clap(long = "billable-only", help = "Only reconcile billable entries")]
    billable_only: bool,
}

pub struct OverlapCommand<'a, T: EntryRepository> {
    repository: &'a T,
}

impl<'a, T: EntryRepository> OverlapCommand<'a, T> {
    /// 新しい`OverlapCommand`を返す。
    pub fn new(repository: &'a T) -> Self {
        Self { repository }
    }

    /// `overlap`サブコマンドの処理を行う。
    ///
    /// 在席セッションの内側にあるタイムエントリーの時間だけを集計する。
    pub async fn run(&self, args: OverlapArgs) -> Result<(OfficeSession, OverlapReport)> {
        let session = OfficeSession::parse(
            &args.user,
            &args.date,
            &args.office_start,
            &args.office_end,
        )
        .context("Failed to parse office session")?;
        info!(
            "Office session of {}: {} - {}",
            session.user_id, session.interval.start, session.interval.end
        );

        let records = self
            .repository
            .load_time_entries()
            .await
            .context("Failed to load time entries")?;
        let (entries, skipped) = valid_entries(&records);
        if skipped > 0 {
            info!("Skipped {} malformed records.", skipped);
        }

        let report = reconcile(&session, &entries, args.billable_only);
        Ok((session, report))
    }
}
