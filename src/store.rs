use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
#[cfg(test)]
use mockall::automock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::goal::Goal;
use crate::time_entry::StoredTimeEntry;

const TIME_ENTRIES_FILE: &str = "time_entries.json";
const GOALS_FILE: &str = "goals.json";
const CLOCK_SESSIONS_FILE: &str = "clock_sessions.json";

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(10);
const LOCK_TIMEOUT: Duration = Duration::from_secs(10);
/// これより古いロックファイルは異常終了したプロセスの残骸とみなす。
const STALE_LOCK_AGE: Duration = Duration::from_secs(30);

/// 出勤中のユーザーと出勤時刻。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockSession {
    pub user_id: String,
    pub start: DateTime<Utc>,
}

/// タイムエントリーと目標を読み書きするためのtrait。
///
/// 同じコレクションへの読み込みから書き込みまでは実装側で直列化する。
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EntryRepository: Send + Sync {
    /// すべてのタイムエントリーを読み込む。
    async fn load_time_entries(&self) -> Result<Vec<StoredTimeEntry>>;

    /// タイムエントリーを1件追加する。同じidのエントリーがあればエラーを返す。
    async fn append_time_entry(&self, entry: StoredTimeEntry) -> Result<()>;

    /// タイムエントリーを削除する。削除した場合は`true`を返す。
    async fn delete_time_entry(&self, id: &str) -> Result<bool>;

    async fn load_goals(&self) -> Result<Vec<Goal>>;

    /// 出勤を記録する。すでに出勤中であればエラーを返す。
    async fn start_clock(&self, user_id: &str, at: DateTime<Utc>) -> Result<()>;

    /// 出勤時刻を返す。出勤中でなければ`None`を返す。出勤の記録は残す。
    async fn clock_session(&self, user_id: &str) -> Result<Option<DateTime<Utc>>>;

    /// 出勤を終了し、出勤時刻を返す。出勤中でなければ`None`を返す。
    async fn finish_clock(&self, user_id: &str) -> Result<Option<DateTime<Utc>>>;
}

/// エントリーを追加したスナップショットを返す。
pub fn with_entry_appended(
    mut snapshot: Vec<StoredTimeEntry>,
    entry: StoredTimeEntry,
) -> Result<Vec<StoredTimeEntry>> {
    if snapshot.iter().any(|existing| existing.id == entry.id) {
        bail!("Time entry already exists: {}", entry.id);
    }
    snapshot.push(entry);
    Ok(snapshot)
}

/// 指定idのエントリーを取り除いたスナップショットと、取り除いたかどうかを返す。
pub fn without_entry(snapshot: Vec<StoredTimeEntry>, id: &str) -> (Vec<StoredTimeEntry>, bool) {
    let before = snapshot.len();
    let remaining: Vec<StoredTimeEntry> = snapshot
        .into_iter()
        .filter(|entry| entry.id != id)
        .collect();
    let removed = remaining.len() != before;
    (remaining, removed)
}

/// コレクションのロックファイル。存在する間は他のプロセスも書き込めない。
///
/// dropでロックファイルを削除する。
struct CollectionLock {
    path: PathBuf,
}

impl CollectionLock {
    async fn acquire(path: PathBuf) -> Result<Self> {
        let started = Instant::now();
        loop {
            let created = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;
            match created {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if is_stale(&path).await {
                        warn!("Removing stale lock file: {:?}", path);
                        if let Err(e) = tokio::fs::remove_file(&path).await {
                            debug!("Failed to remove stale lock file {:?}: {}", path, e);
                        }
                        continue;
                    }
                    if started.elapsed() >= LOCK_TIMEOUT {
                        bail!("Timed out waiting for lock file: {:?}", path);
                    }
                    tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to create lock file: {:?}", path));
                }
            }
        }
    }
}

impl Drop for CollectionLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove lock file {:?}: {}", self.path, e);
        }
    }
}

async fn is_stale(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .ok()
        .and_then(|metadata| metadata.modified().ok())
        .and_then(|modified| modified.elapsed().ok())
        .map_or(false, |age| age > STALE_LOCK_AGE)
}

/// コレクションごとに1つのJSONファイルへ保存するリポジトリ。
///
/// 読み込みから書き込みまでは、同じプロセス内ではMutexで、
/// プロセスをまたいではロックファイルで直列化する。
pub struct JsonFileStore {
    data_dir: PathBuf,
    entries_lock: Mutex<()>,
    clock_lock: Mutex<()>,
}

impl JsonFileStore {
    /// 新しい`JsonFileStore`を返す。ディレクトリは最初の書き込み時に作成する。
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            entries_lock: Mutex::new(()),
            clock_lock: Mutex::new(()),
        }
    }

    fn path(&self, file_name: &str) -> PathBuf {
        self.data_dir.join(file_name)
    }

    /// コレクションのロックを取る。返り値を保持している間ロックが続く。
    async fn lock_collection(&self, file_name: &str) -> Result<CollectionLock> {
        tokio::fs::create_dir_all(&self.data_dir)
            .await
            .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        CollectionLock::acquire(self.path(file_name).with_extension("json.lock")).await
    }

    /// JSONファイルを読み込む。ファイルがなければ空のコレクションとする。
    async fn read_collection<T: DeserializeOwned>(&self, file_name: &str) -> Result<Vec<T>> {
        let path = self.path(file_name);
        if !tokio::fs::try_exists(&path)
            .await
            .with_context(|| format!("Failed to check file: {:?}", path))?
        {
            debug!("{:?} does not exist, using an empty collection", path);
            return Ok(Vec::new());
        }

        let contents = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read file: {:?}", path))?;
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&contents).with_context(|| format!("Failed to parse file: {:?}", path))
    }

    /// JSONファイルに書き込む。書き込みごとに別名の一時ファイルに書いてから置き換える。
    async fn write_collection<T: Serialize>(&self, file_name: &str, items: &[T]) -> Result<()> {
        let path = self.path(file_name);
        let tmp_path = path.with_extension(format!("json.{}.tmp", Uuid::new_v4()));
        let json = serde_json::to_string_pretty(items)
            .with_context(|| format!("Failed to serialize {}", file_name))?;
        tokio::fs::write(&tmp_path, json)
            .await
            .with_context(|| format!("Failed to write file: {:?}", tmp_path))?;
        replace_file(&tmp_path, &path).await
    }
}

async fn replace_file(from: &Path, to: &Path) -> Result<()> {
    tokio::fs::rename(from, to)
        .await
        .with_context(|| format!("Failed to rename {:?} to {:?}", from, to))
}

#[async_trait]
impl EntryRepository for JsonFileStore {
    async fn load_time_entries(&self) -> Result<Vec<StoredTimeEntry>> {
        let _guard = self.entries_lock.lock().await;
        let entries = self.read_collection(TIME_ENTRIES_FILE).await?;
        info!("Loaded {} time entries", entries.len());
        Ok(entries)
    }

    async fn append_time_entry(&self, entry: StoredTimeEntry) -> Result<()> {
        let _guard = self.entries_lock.lock().await;
        let _lock = self.lock_collection(TIME_ENTRIES_FILE).await?;
        let id = entry.id.clone();
        let snapshot = self.read_collection(TIME_ENTRIES_FILE).await?;
        let snapshot = with_entry_appended(snapshot, entry)?;
        self.write_collection(TIME_ENTRIES_FILE, &snapshot).await?;
        info!("Appended time entry {}", id);
        Ok(())
    }

    async fn delete_time_entry(&self, id: &str) -> Result<bool> {
        let _guard = self.entries_lock.lock().await;
        let _lock = self.lock_collection(TIME_ENTRIES_FILE).await?;
        let snapshot = self.read_collection(TIME_ENTRIES_FILE).await?;
        let (snapshot, removed) = without_entry(snapshot, id);
        if removed {
            self.write_collection(TIME_ENTRIES_FILE, &snapshot).await?;
            info!("Deleted time entry {}", id);
        }
        Ok(removed)
    }

    async fn load_goals(&self) -> Result<Vec<Goal>> {
        self.read_collection(GOALS_FILE).await
    }

    async fn start_clock(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        let _guard = self.clock_lock.lock().await;
        let _lock = self.lock_collection(CLOCK_SESSIONS_FILE).await?;
        let mut sessions: Vec<ClockSession> = self.read_collection(CLOCK_SESSIONS_FILE).await?;
        if sessions.iter().any(|session| session.user_id == user_id) {
            bail!("{} is already clocked in", user_id);
        }
        sessions.push(ClockSession {
            user_id: user_id.to_string(),
            start: at,
        });
        self.write_collection(CLOCK_SESSIONS_FILE, &sessions).await
    }

    async fn clock_session(&self, user_id: &str) -> Result<Option<DateTime<Utc>>> {
        let _guard = self.clock_lock.lock().await;
        let sessions: Vec<ClockSession> = self.read_collection(CLOCK_SESSIONS_FILE).await?;
        Ok(sessions
            .into_iter()
            .find(|session| session.user_id == user_id)
            .map(|session| session.start))
    }

    async fn finish_clock(&self, user_id: &str) -> Result<Option<DateTime<Utc>>> {
        let _guard = self.clock_lock.lock().await;
        let _lock = self.lock_collection(CLOCK_SESSIONS_FILE).await?;
        let sessions: Vec<ClockSession> = self.read_collection(CLOCK_SESSIONS_FILE).await?;
        let (finished, remaining): (Vec<ClockSession>, Vec<ClockSession>) = sessions
            .into_iter()
            .partition(|session| session.user_id == user_id);
        let Some(session) = finished.into_iter().next() else {
            return Ok(None);
        };
        self.write_collection(CLOCK_SESSIONS_FILE, &remaining).await?;
        Ok(Some(session.start))
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use tempfile::tempdir;

    use super::{with_entry_appended, without_entry, EntryRepository, JsonFileStore};
    use crate::time_entry::StoredTimeEntry;

    /// 一時ファイルとロックファイルの残骸を返す。
    fn leftover_files(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp") || name.ends_with(".lock"))
            .collect()
    }

    fn entry(id: &str) -> StoredTimeEntry {
        StoredTimeEntry {
            id: id.to_string(),
            user_id: "Cole".to_string(),
            date: Some("2025-08-12".to_string()),
            duration: Some(json!(3600)),
            billable: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_with_entry_appended_rejects_duplicate_id() {
        let snapshot = with_entry_appended(vec![], entry("a")).unwrap();

        assert_eq!(snapshot.len(), 1);
        assert!(with_entry_appended(snapshot, entry("a")).is_err());
    }

    #[test]
    fn test_without_entry() {
        let snapshot = vec![entry("a"), entry("b")];

        let (snapshot, removed) = without_entry(snapshot, "a");
        assert!(removed);
        assert_eq!(snapshot, vec![entry("b")]);

        let (snapshot, removed) = without_entry(snapshot, "missing");
        assert!(!removed);
        assert_eq!(snapshot.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_files_are_empty() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("not-created-yet"));

        assert!(store.load_time_entries().await.unwrap().is_empty());
        assert!(store.load_goals().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_and_delete() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        store.append_time_entry(entry("a")).await.unwrap();
        store.append_time_entry(entry("b")).await.unwrap();
        assert!(store.append_time_entry(entry("a")).await.is_err());

        assert!(store.delete_time_entry("a").await.unwrap());
        assert!(!store.delete_time_entry("a").await.unwrap());

        let entries = store.load_time_entries().await.unwrap();
        assert_eq!(entries, vec![entry("b")]);
        assert_eq!(leftover_files(dir.path()), Vec::<String>::new());
    }

    #[tokio::test]
    async fn test_reads_existing_camel_case_file() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("time_entries.json"),
            r#"[{"id": 1, "userId": "Cole", "date": "2025-08-12", "duration": 7200, "billable": true}]"#,
        )
        .unwrap();
        let store = JsonFileStore::new(dir.path());

        let entries = store.load_time_entries().await.unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "1");
        assert_eq!(entries[0].duration, Some(json!(7200)));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("goals.json"), "{not json").unwrap();
        let store = JsonFileStore::new(dir.path());

        assert!(store.load_goals().await.is_err());
    }

    /// 同時に追加しても書き込みが失われない。
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_are_serialized() {
        let dir = tempdir().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path()));

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.append_time_entry(entry(&i.to_string())).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.load_time_entries().await.unwrap().len(), 20);
    }

    /// コマンドごとに別のストアを作っても書き込みが失われない。
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_from_separate_stores() {
        let dir = tempdir().unwrap();

        let handles: Vec<_> = (0..40)
            .map(|i| {
                let data_dir = dir.path().to_path_buf();
                tokio::spawn(async move {
                    JsonFileStore::new(data_dir)
                        .append_time_entry(entry(&i.to_string()))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let store = JsonFileStore::new(dir.path());
        assert_eq!(store.load_time_entries().await.unwrap().len(), 40);
        assert_eq!(leftover_files(dir.path()), Vec::<String>::new());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_clock_ins_from_separate_stores() {
        let dir = tempdir().unwrap();
        let start = Utc.with_ymd_and_hms(2025, 8, 12, 13, 0, 0).unwrap();

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let data_dir = dir.path().to_path_buf();
                tokio::spawn(async move {
                    JsonFileStore::new(data_dir)
                        .start_clock(&format!("user-{}", i), start)
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let store = JsonFileStore::new(dir.path());
        for i in 0..10 {
            assert_eq!(
                store.clock_session(&format!("user-{}", i)).await.unwrap(),
                Some(start)
            );
        }
    }

    #[tokio::test]
    async fn test_clock_in_and_out() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let start = Utc.with_ymd_and_hms(2025, 8, 12, 13, 0, 0).unwrap();

        store.start_clock("Cole", start).await.unwrap();
        assert!(store.start_clock("Cole", start).await.is_err());
        store.start_clock("Avery", start).await.unwrap();

        assert_eq!(store.clock_session("Cole").await.unwrap(), Some(start));
        assert_eq!(store.clock_session("Cole").await.unwrap(), Some(start));

        assert_eq!(store.finish_clock("Cole").await.unwrap(), Some(start));
        assert_eq!(store.finish_clock("Cole").await.unwrap(), None);
        assert_eq!(store.finish_clock("Avery").await.unwrap(), Some(start));
    }
}
