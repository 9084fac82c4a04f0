use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

#[cfg(not(test))]
/// 現在のUTC時間を取得する。
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// テスト時に利用するモック時間を取得する。
#[cfg(test)]
pub mod mock_datetime {
    use std::cell::RefCell;

    use super::DateTime;
    use super::Utc;

    thread_local! {
        static MOCK_TIME: RefCell<Option<DateTime<Utc>>> = const { RefCell::new(None) };
    }

    /// モック時間を取得する。
    pub fn now() -> DateTime<Utc> {
        MOCK_TIME.with(|cell| (*cell.borrow()).unwrap_or_else(Utc::now))
    }

    /// モック時間を設定する。
    pub fn set_mock_time(time: DateTime<Utc>) {
        MOCK_TIME.with(|cell| *cell.borrow_mut() = Some(time));
    }

    // 設定したモック時間をクリアする。
    pub fn clear_mock_time() {
        MOCK_TIME.with(|cell| *cell.borrow_mut() = None);
    }
}

#[cfg(test)]
pub use mock_datetime::now;

/// Localタイムゾーンの暦日と時刻を組み合わせて日時を返す。
///
/// 夏時間の切り替えで存在しない時刻は切り替え後の最初の時刻に、
/// 重複する時刻は早い方に解決する。
pub fn local_datetime(date: NaiveDate, time: NaiveTime) -> DateTime<Local> {
    resolve_in(&Local, date.and_time(time))
}

/// 指定タイムゾーンで指定日の00:00:00を返す。その時刻が存在しなければ切り替え後の時刻。
pub fn midnight_in<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Tz> {
    resolve_in(tz, date.and_time(NaiveTime::MIN))
}

fn resolve_in<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    if let Some(datetime) = tz.from_local_datetime(&naive).earliest() {
        return datetime;
    }
    // 夏時間のギャップは最大1時間なので、1時間後ろにずらせば必ず存在する
    tz.from_local_datetime(&(naive + Duration::hours(1)))
        .earliest()
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
}
