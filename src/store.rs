//! 记录存储 - 按项目命名空间的追加式持久化
//!
//! 存储布局：`~/.dev-session-monitor/projects/<project>/`
//!   - `records.jsonl`  追加式记录日志（每行一条 JSON）
//!   - `sessions.json`  会话集合（整体读写）
//!
//! 记录可能由先前已崩溃的进程写入，因此单条损坏的记录只跳过并告警，
//! 不会导致整个加载失败。

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::records::{Record, Session};

/// 存储层错误
#[derive(Debug, Error)]
pub enum StorageError {
    /// 磁盘读写失败（磁盘满、权限不足等）
    #[error("存储读写失败: {0}")]
    Io(#[from] std::io::Error),
    /// 序列化失败
    #[error("记录序列化失败: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 会话集合文件格式
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SessionCollection {
    sessions: Vec<Session>,
}

/// 记录存储
pub struct RecordStore {
    data_dir: PathBuf,
}

impl RecordStore {
    /// 创建存储，数据目录位于 `~/.dev-session-monitor`
    pub fn new() -> Self {
        let data_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".dev-session-monitor");

        Self { data_dir }
    }

    /// 创建用于测试的存储（数据目录由调用方提供）
    pub fn new_for_test(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into() }
    }

    /// 数据目录
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// 项目命名空间目录
    fn project_dir(&self, project: &str) -> PathBuf {
        self.data_dir.join("projects").join(project)
    }

    /// 记录日志文件路径
    fn records_path(&self, project: &str) -> PathBuf {
        self.project_dir(project).join("records.jsonl")
    }

    /// 会话集合文件路径
    fn sessions_path(&self, project: &str) -> PathBuf {
        self.project_dir(project).join("sessions.json")
    }

    /// 追加一条不可变记录（带文件锁）
    ///
    /// 时间戳缺失时由本方法补齐。写入失败直接返回错误，不做重试。
    pub fn append(&self, project: &str, mut record: Record) -> Result<(), StorageError> {
        use fs2::FileExt;

        if record.ts.is_none() {
            record.ts = Some(Utc::now());
        }

        // 首次写入时惰性创建命名空间目录
        fs::create_dir_all(self.project_dir(project))?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.records_path(project))?;

        file.lock_exclusive()?;
        let mut file = file;
        let result = writeln!(file, "{}", serde_json::to_string(&record)?);
        let _ = file.unlock();
        result?;

        debug!(project = %project, kind = record.kind(), "Record appended");
        Ok(())
    }

    /// 加载项目的全部记录
    ///
    /// 返回顺序为文件内顺序，不保证按时间排序。命名空间不存在时返回空序列。
    pub fn load_all(&self, project: &str) -> Result<Vec<Record>, StorageError> {
        let path = self.records_path(project);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&path)?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Record>(&line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    // 损坏的单条记录只跳过，不让整个加载失败
                    warn!(
                        project = %project,
                        line = line_no + 1,
                        error = %e,
                        "Skipping corrupted record"
                    );
                }
            }
        }

        Ok(records)
    }

    /// 加载时间窗口 `[now - window, now]` 内的记录
    pub fn load_recent(&self, project: &str, window: Duration) -> Result<Vec<Record>, StorageError> {
        let now = Utc::now();
        let cutoff = now - window;

        let records = self
            .load_all(project)?
            .into_iter()
            .filter(|r| match r.ts {
                Some(ts) => ts >= cutoff && ts <= now,
                None => false,
            })
            .collect();

        Ok(records)
    }

    /// 打开新会话，先关闭该项目已开启的会话
    ///
    /// 不变量：每个项目同一时刻至多一个开启中的会话。
    pub fn open_session(&self, project: &str, goal: &str) -> Result<Session, StorageError> {
        let mut collection = self.load_sessions(project)?;

        let now = Utc::now();
        for session in collection.sessions.iter_mut().filter(|s| s.is_open()) {
            session.ended_at = Some(now);
        }

        let session = Session::new(project, goal);
        collection.sessions.push(session.clone());
        self.save_sessions(project, &collection)?;

        debug!(project = %project, session_id = %session.id, "Session opened");
        Ok(session)
    }

    /// 复用仍开启中的会话，没有则打开新会话
    ///
    /// 先前进程崩溃未关闭的会话在这里被接续，记录不会丢失归属。
    pub fn ensure_open_session(&self, project: &str, goal: &str) -> Result<Session, StorageError> {
        if let Some(session) = self.current_session(project)? {
            debug!(project = %project, session_id = %session.id, "Continuing open session");
            return Ok(session);
        }
        self.open_session(project, goal)
    }

    /// 关闭项目当前开启的会话（设置结束时间）
    pub fn close_session(&self, project: &str) -> Result<Option<Session>, StorageError> {
        let mut collection = self.load_sessions(project)?;

        let now = Utc::now();
        let mut closed = None;
        for session in collection.sessions.iter_mut().filter(|s| s.is_open()) {
            session.ended_at = Some(now);
            closed = Some(session.clone());
        }

        if closed.is_some() {
            self.save_sessions(project, &collection)?;
        }
        Ok(closed)
    }

    /// 项目当前开启中的会话
    pub fn current_session(&self, project: &str) -> Result<Option<Session>, StorageError> {
        let collection = self.load_sessions(project)?;
        Ok(collection.sessions.into_iter().find(|s| s.is_open()))
    }

    /// 列出项目全部会话
    pub fn list_sessions(&self, project: &str) -> Result<Vec<Session>, StorageError> {
        Ok(self.load_sessions(project)?.sessions)
    }

    /// 读取会话集合
    fn load_sessions(&self, project: &str) -> Result<SessionCollection, StorageError> {
        let path = self.sessions_path(project);
        if !path.exists() {
            return Ok(SessionCollection::default());
        }

        let content = fs::read_to_string(&path)?;
        match serde_json::from_str(&content) {
            Ok(collection) => Ok(collection),
            Err(e) => {
                warn!(project = %project, error = %e, "Session collection unparsable, starting fresh");
                Ok(SessionCollection::default())
            }
        }
    }

    /// 保存会话集合
    fn save_sessions(&self, project: &str, collection: &SessionCollection) -> Result<(), StorageError> {
        fs::create_dir_all(self.project_dir(project))?;
        let content = serde_json::to_string_pretty(collection)?;
        fs::write(self.sessions_path(project), content)?;
        Ok(())
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::RecordPayload;

    fn test_store() -> (tempfile::TempDir, RecordStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new_for_test(dir.path());
        (dir, store)
    }

    #[test]
    fn test_load_all_missing_project_is_empty() {
        let (_dir, store) = test_store();
        let records = store.load_all("no-such-project").unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_append_assigns_timestamp() {
        let (_dir, store) = test_store();
        let record = Record::user_note("sess-1", "note");
        assert!(record.ts.is_none());

        store.append("demo", record).unwrap();

        let loaded = store.load_all("demo").unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded[0].ts.is_some());
    }

    #[test]
    fn test_one_open_session_per_project() {
        let (_dir, store) = test_store();

        let first = store.open_session("demo", "goal a").unwrap();
        let second = store.open_session("demo", "goal b").unwrap();
        assert_ne!(first.id, second.id);

        let sessions = store.list_sessions("demo").unwrap();
        let open: Vec<_> = sessions.iter().filter(|s| s.is_open()).collect();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, second.id);
    }

    #[test]
    fn test_corrupted_line_is_skipped() {
        let (_dir, store) = test_store();
        store.append("demo", Record::user_note("s", "first")).unwrap();

        // 模拟崩溃进程留下的半行垃圾
        let path = store.records_path("demo");
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{\"broken").unwrap();

        store.append("demo", Record::user_note("s", "second")).unwrap();

        let loaded = store.load_all("demo").unwrap();
        assert_eq!(loaded.len(), 2);
        match &loaded[1].payload {
            RecordPayload::UserNote { content, .. } => assert_eq!(content, "second"),
            _ => panic!("expected user note"),
        }
    }
}
