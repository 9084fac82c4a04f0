use anyhow::{Context, Result};
use chrono::Local;
use log::info;

use crate::aggregate::{aggregate, aggregate_by_user, EntryFilter, Summary, UserSummaries};
use crate::bucket::{bucket_bounds, Bucket, Timeframe};
use crate::datetime;
use crate::store::EntryRepository;

/// 集計期間ごとの時間を出力するためのサブコマンド。
#[derive(Debug, clap::Args)]
pub struct SummaryArgs {
    #[clap(
        short = 't',
        long = "timeframe",
        default_value = "daily",
        help = "Timeframe to summarize: daily, weekly, monthly or yearly"
    )]
    timeframe: Timeframe,

    #[clap(short = 'u', long = "user", help = "Only count entries of this user")]
    user: Option<String>,

    #[clap(
        long = "billable",
        help = "Only count billable (true) or non-billable (false) entries"
    )]
    billable: Option<bool>,

    #[clap(long = "by-user", help = "Show summary by user")]
    by_user: bool,
}

/// `summary`サブコマンドの結果。
#[derive(Debug, PartialEq)]
pub enum SummaryReport {
    Total(Bucket, Summary),
    ByUser(Bucket, UserSummaries),
}

pub struct SummaryCommand<'a, T: EntryRepository> {
    repository: &'a T,
}

impl<'a, T: EntryRepository> SummaryCommand<'a, T> {
    /// 新しい`SummaryCommand`を返す。
    ///
    /// # Arguments
    /// * `repository` - タイムエントリーを読み込むためのリポジトリ
    pub fn new(repository: &'a T) -> Self {
        Self { repository }
    }

    /// `summary`サブコマンドの処理を行う。
    ///
    /// Localタイムゾーンで現在時刻を含む集計期間のタイムエントリーを集計する。
    ///
    /// # Arguments
    ///
    /// * `args` - `summary`サブコマンドの引数
    pub async fn run(&self, args: SummaryArgs) -> Result<SummaryReport> {
        let now = datetime::now().with_timezone(&Local);
        let bucket = bucket_bounds(now, args.timeframe);
        info!("Start at: {}, End at: {}", bucket.start, bucket.end);

        let records = self
            .repository
            .load_time_entries()
            .await
            .context("Failed to load time entries")?;
        let filter = EntryFilter {
            user_id: args.user,
            billable: args.billable,
        };

        let report = if args.by_user {
            SummaryReport::ByUser(bucket, aggregate_by_user(&records, &bucket, &filter))
        } else {
            SummaryReport::Total(bucket, aggregate(&records, &bucket, &filter))
        };
        info!("Summarized {} records.", records.len());

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Local, TimeZone};
    use rstest::rstest;
    use serde_json::json;

    use super::{SummaryArgs, SummaryCommand, SummaryReport};
    use crate::bucket::Timeframe;
    use crate::datetime::mock_datetime;
    use crate::store::MockEntryRepository;
    use crate::time_entry::StoredTimeEntry;

    fn record(id: &str, user_id: &str, date: &str, seconds: i64, billable: bool) -> StoredTimeEntry {
        StoredTimeEntry {
            id: id.to_string(),
            user_id: user_id.to_string(),
            date: Some(date.to_string()),
            duration: Some(json!(seconds)),
            billable,
            ..Default::default()
        }
    }

    fn repository() -> MockEntryRepository {
        let mut repository = MockEntryRepository::new();
        repository.expect_load_time_entries().times(1).returning(|| {
            Ok(vec![
                record("1", "Cole", "2025-08-12", 14400, true),
                record("2", "Cole", "2025-08-12", 7200, true),
                record("3", "Cole", "2025-08-12", 3600, false),
                record("4", "Avery", "2025-08-01", 3600, true),
            ])
        });
        repository
    }

    #[rstest]
    #[case::cole_billable_today(Timeframe::Day, Some("Cole"), Some(true), 6.0, 2)]
    #[case::cole_today(Timeframe::Day, Some("Cole"), None, 7.0, 3)]
    #[case::everyone_this_month(Timeframe::Month, None, None, 8.0, 4)]
    #[tokio::test]
    async fn test_summary_command(
        #[case] timeframe: Timeframe,
        #[case] user: Option<&str>,
        #[case] billable: Option<bool>,
        #[case] total_hours: f64,
        #[case] entry_count: usize,
    ) {
        mock_datetime::set_mock_time(
            Local
                .with_ymd_and_hms(2025, 8, 12, 18, 0, 0)
                .unwrap()
                .to_utc(),
        );
        let repository = repository();
        let args = SummaryArgs {
            timeframe,
            user: user.map(str::to_string),
            billable,
            by_user: false,
        };

        let report = SummaryCommand::new(&repository).run(args).await.unwrap();
        mock_datetime::clear_mock_time();

        let (bucket, summary) = match report {
            SummaryReport::Total(bucket, summary) => (bucket, summary),
            other => panic!("Unexpected report: {:?}", other),
        };
        assert_eq!(bucket.unit, timeframe);
        assert_eq!(summary.total_hours, total_hours);
        assert_eq!(summary.entry_count, entry_count);
    }

    #[tokio::test]
    async fn test_summary_command_by_user() {
        mock_datetime::set_mock_time(
            Local
                .with_ymd_and_hms(2025, 8, 12, 18, 0, 0)
                .unwrap()
                .to_utc(),
        );
        let repository = repository();
        let args = SummaryArgs {
            timeframe: Timeframe::Month,
            user: None,
            billable: None,
            by_user: true,
        };

        let report = SummaryCommand::new(&repository).run(args).await.unwrap();
        mock_datetime::clear_mock_time();

        let summaries = match report {
            SummaryReport::ByUser(_, summaries) => summaries,
            other => panic!("Unexpected report: {:?}", other),
        };
        assert_eq!(summaries.by_user.len(), 2);
        assert_eq!(summaries.by_user["Avery"].billable_hours, 1.0);
    }

    #[tokio::test]
    async fn test_summary_command_load_error() {
        let mut repository = MockEntryRepository::new();
        repository
            .expect_load_time_entries()
            .times(1)
            .returning(|| Err(anyhow::anyhow!("disk on fire")));
        let args = SummaryArgs {
            timeframe: Timeframe::Day,
            user: None,
            billable: None,
            by_user: false,
        };

        let result = SummaryCommand::new(&repository).run(args).await;

        assert!(result.is_err());
    }
}
