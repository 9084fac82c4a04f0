use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};

use crate::aggregate::{round_millis_to_hours, Summary, UserSummaries};
use crate::bucket::{Bucket, Timeframe};
use crate::goal::GoalReport;
use crate::overlap::{OfficeSession, OverlapReport};
use crate::time_entry::StoredTimeEntry;

/// Consoleに集計結果を表示するためのtrait。
pub trait ConsolePresenter {
    /// 集計期間の集計結果を表示する。
    fn show_summary(&mut self, bucket: &Bucket, summary: &Summary) -> Result<()>;

    /// ユーザーごとの集計結果を表示する。
    fn show_user_summaries(&mut self, bucket: &Bucket, summaries: &UserSummaries) -> Result<()>;

    /// 在席セッションとタイムエントリーの重なりを表示する。
    fn show_overlap(&mut self, session: &OfficeSession, report: &OverlapReport) -> Result<()>;

    /// 目標の達成状況を表示する。
    fn show_goals(&mut self, view: Timeframe, report: &GoalReport) -> Result<()>;

    /// 記録したタイムエントリーを表示する。
    fn show_time_entry(&mut self, entry: &StoredTimeEntry) -> Result<()>;
}

/// 集計結果をMarkdownのlist形式で表示する。
pub struct ConsoleMarkdownList<'a, W: Write> {
    writer: &'a mut W,
}

impl<'a, W: Write> ConsoleMarkdownList<'a, W> {
    /// 新しい`ConsoleMarkdownList`を返す。
    pub fn new(writer: &'a mut W) -> Self {
        Self { writer }
    }

    fn bucket_heading(&mut self, bucket: &Bucket) -> Result<()> {
        writeln!(
            self.writer,
            "## {}: {} ~ {}",
            bucket.unit,
            bucket.start_date(),
            bucket.end_date()
        )
        .context("Failed to write heading")
    }
}

fn local_clock(datetime: &DateTime<Utc>) -> String {
    datetime.with_timezone(&Local).format("%H:%M").to_string()
}

impl<'a, W: Write> ConsolePresenter for ConsoleMarkdownList<'a, W> {
    fn show_summary(&mut self, bucket: &Bucket, summary: &Summary) -> Result<()> {
        self.bucket_heading(bucket)?;
        writeln!(
            self.writer,
            "- total: {:.2}h\n- billable: {:.2}h ({:.2}%)\n- non-billable: {:.2}h\n- entries: {}",
            summary.total_hours,
            summary.billable_hours,
            summary.billable_rate,
            summary.non_billable_hours,
            summary.entry_count
        )
        .with_context(|| format!("Failed to write summary: {:?}", summary))?;
        if summary.skipped_count > 0 {
            writeln!(self.writer, "- skipped: {}", summary.skipped_count)
                .context("Failed to write skipped count")?;
        }

        Ok(())
    }

    fn show_user_summaries(&mut self, bucket: &Bucket, summaries: &UserSummaries) -> Result<()> {
        self.bucket_heading(bucket)?;
        for (user_id, summary) in &summaries.by_user {
            writeln!(
                self.writer,
                "- {}: {:.2}h (billable {:.2}h, {:.2}%)",
                user_id, summary.total_hours, summary.billable_hours, summary.billable_rate
            )
            .with_context(|| format!("Failed to write summary for {}", user_id))?;
        }
        if summaries.skipped_count > 0 {
            writeln!(self.writer, "- skipped: {}", summaries.skipped_count)
                .context("Failed to write skipped count")?;
        }

        Ok(())
    }

    // 重なりのあるエントリーを開始時刻順に表示する。
    fn show_overlap(&mut self, session: &OfficeSession, report: &OverlapReport) -> Result<()> {
        writeln!(
            self.writer,
            "## {} {}: {} ~ {}",
            session.user_id,
            session.date,
            local_clock(&session.interval.start),
            local_clock(&session.interval.end)
        )
        .context("Failed to write heading")?;

        let mut sorted = report.per_entry.iter().collect::<Vec<_>>();
        sorted.sort_by_key(|overlap| overlap.entry.interval.map(|interval| interval.start));
        for overlap in sorted {
            let (start_str, end_str) = overlap
                .entry
                .interval
                .map(|interval| (local_clock(&interval.start), local_clock(&interval.end)))
                .unwrap_or_default();
            let case_str = overlap
                .entry
                .case_id
                .as_ref()
                .map(|case_id| format!(" [{}]", case_id))
                .unwrap_or_default();
            writeln!(
                self.writer,
                "- {} ~ {}: {}{} ({:.2}h)",
                start_str,
                end_str,
                overlap.entry.description,
                case_str,
                round_millis_to_hours(overlap.overlap.num_milliseconds())
            )
            .with_context(|| format!("Failed to write overlap: {:?}", overlap))?;
        }
        writeln!(
            self.writer,
            "- total: {:.2}h in {} of {} entries",
            report.total_overlap_hours,
            report.per_entry.len(),
            report.considered
        )
        .context("Failed to write overlap total")?;

        Ok(())
    }

    fn show_goals(&mut self, view: Timeframe, report: &GoalReport) -> Result<()> {
        writeln!(self.writer, "## goals ({}): {}", view, report.counts.display)
            .context("Failed to write heading")?;
        for completion in &report.completions {
            writeln!(
                self.writer,
                "- [{}] {}: {:.2} / {:.2} ({})",
                if completion.completed { "x" } else { " " },
                completion.goal_id,
                completion.current,
                completion.target,
                completion.unit
            )
            .with_context(|| format!("Failed to write goal: {:?}", completion))?;
        }

        Ok(())
    }

    fn show_time_entry(&mut self, entry: &StoredTimeEntry) -> Result<()> {
        writeln!(
            self.writer,
            "- {} {} {} ~ {}: {}{}",
            entry.id,
            entry.date.as_deref().unwrap_or_default(),
            entry.start.as_deref().unwrap_or_default(),
            entry.end.as_deref().unwrap_or_default(),
            entry.description,
            if entry.billable { " (billable)" } else { "" }
        )
        .with_context(|| format!("Failed to write time entry: {:?}", entry))
    }
}
