use anyhow::{Context, Result};
use chrono::Local;
use log::info;

use crate::bucket::Timeframe;
use crate::datetime;
use crate::goal::{goal_counts, GoalReport};
use crate::store::EntryRepository;

/// 目標の達成状況を出力するためのサブコマンド。
#[derive(Debug, clap::Args)]
pub struct GoalsArgs {
    #[clap(
        short = 't',
        long = "timeframe",
        default_value = "daily",
        help = "Timeframe of the view: daily, weekly, monthly or yearly"
    )]
    timeframe: Timeframe,
}

pub struct GoalsCommand<'a, T: EntryRepository> {
    repository: &'a T,
}

impl<'a, T: EntryRepository> GoalsCommand<'a, T> {
    /// 新しい`GoalsCommand`を返す。
    pub fn new(repository: &'a T) -> Self {
        Self { repository }
    }

    /// `goals`サブコマンドの処理を行う。
    ///
    /// 表示単位に含まれる目標それぞれについて、現在の集計期間での達成状況を求める。
    pub async fn run(&self, args: GoalsArgs) -> Result<(Timeframe, GoalReport)> {
        let now = datetime::now().with_timezone(&Local);

        let goals = self
            .repository
            .load_goals()
            .await
            .context("Failed to load goals")?;
        let records = self
            .repository
            .load_time_entries()
            .await
            .context("Failed to load time entries")?;

        let report = goal_counts(&goals, &records, args.timeframe, now);
        info!(
            "{} of {} goals completed ({}).",
            report.counts.completed, report.counts.total, args.timeframe
        );

        Ok((args.timeframe, report))
    }
}
