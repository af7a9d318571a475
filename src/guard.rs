//! 单例生命周期守卫 - 基于存活探测的标记文件互斥
//!
//! 保证每台主机至多一个监控进程。标记文件记录持有者的 PID 和创建时间，
//! 存在性检查之外再做一次存活探测（`kill -0` 零效果信号），因为仅凭
//! 文件存在无法区分已崩溃的持有者和仍在运行的持有者。
//!
//! 标记文件位置：`~/.dev-session-monitor/monitor.pid`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, warn};

/// 守卫错误
#[derive(Debug, Error)]
pub enum GuardError {
    /// 另一个存活的进程持有标记
    #[error("监控进程已在运行 (PID: {0})")]
    AlreadyRunning(u32),
    /// 标记文件读写失败
    #[error("标记文件操作失败: {0}")]
    Io(#[from] std::io::Error),
    /// 标记文件序列化失败
    #[error("标记文件序列化失败: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 进程身份标记
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessMarker {
    /// 持有者进程 ID
    pub pid: u32,
    /// 标记创建时间
    pub created_at: DateTime<Utc>,
}

/// 单例生命周期守卫
pub struct LifecycleGuard {
    marker_path: PathBuf,
    pid: u32,
}

impl LifecycleGuard {
    /// 创建守卫，标记文件位于默认数据目录
    pub fn new() -> Self {
        let marker_path = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".dev-session-monitor")
            .join("monitor.pid");

        Self {
            marker_path,
            pid: std::process::id(),
        }
    }

    /// 创建用于测试的守卫（标记路径和进程 ID 由调用方注入，便于模拟多进程）
    pub fn new_for_test(marker_path: impl Into<PathBuf>, pid: u32) -> Self {
        Self {
            marker_path: marker_path.into(),
            pid,
        }
    }

    /// 标记文件路径
    pub fn marker_path(&self) -> &Path {
        &self.marker_path
    }

    /// 尝试获取标记
    ///
    /// 无标记则写入自己的 PID。标记存在时探测记录的进程是否存活：
    /// 存活则失败；已死亡（持有者崩溃未清理）或无法解析则删除标记并重试一次。
    pub fn acquire(&self) -> Result<(), GuardError> {
        for _ in 0..2 {
            if !self.marker_path.exists() {
                self.write_marker()?;
                return Ok(());
            }

            match self.read_marker() {
                Some(marker) if Self::process_alive(marker.pid) => {
                    return Err(GuardError::AlreadyRunning(marker.pid));
                }
                Some(marker) => {
                    warn!(pid = marker.pid, "Stale marker detected, reaping");
                }
                None => {
                    warn!(path = %self.marker_path.display(), "Unparsable marker, treating as stale");
                }
            }

            fs::remove_file(&self.marker_path)?;
        }

        // 两轮探查后文件已被清除，直接写入
        self.write_marker()?;
        Ok(())
    }

    /// 释放标记
    ///
    /// 仅当标记记录的 PID 是当前进程时删除；否则视为他人持有，不动。
    pub fn release(&self) -> Result<(), GuardError> {
        match self.read_marker() {
            Some(marker) if marker.pid == self.pid => {
                fs::remove_file(&self.marker_path)?;
                debug!(pid = self.pid, "Marker released");
            }
            Some(marker) => {
                debug!(
                    holder = marker.pid,
                    own = self.pid,
                    "Marker held by another process, skipping release"
                );
            }
            None => {}
        }
        Ok(())
    }

    /// 当前持有者标记（文件缺失或无法解析时为空）
    pub fn holder(&self) -> Option<LivenessMarker> {
        self.read_marker()
    }

    /// 是否存在存活的持有者
    pub fn is_held(&self) -> bool {
        self.read_marker()
            .map(|m| Self::process_alive(m.pid))
            .unwrap_or(false)
    }

    /// 写入自己的标记
    fn write_marker(&self) -> Result<(), GuardError> {
        if let Some(parent) = self.marker_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let marker = LivenessMarker {
            pid: self.pid,
            created_at: Utc::now(),
        };
        fs::write(&self.marker_path, serde_json::to_string(&marker)?)?;
        debug!(pid = self.pid, "Marker written");
        Ok(())
    }

    /// 读取标记，缺失或无法解析时返回 None
    fn read_marker(&self) -> Option<LivenessMarker> {
        let content = fs::read_to_string(&self.marker_path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// 用零效果信号探测进程是否存活
    fn process_alive(pid: u32) -> bool {
        Command::new("kill")
            .args(["-0", &pid.to_string()])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

impl Default for LifecycleGuard {
    fn default() -> Self {
        Self::new()
    }
}
