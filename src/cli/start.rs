//! Start 命令 - 启动监控
//!
//! 获取单例守卫、打开会话并进入周期性捕获-分析-持久化循环。
//! 前台阻塞直到 Ctrl+C、SIGTERM 或 `dsm stop`。

use anyhow::{anyhow, Result};
use clap::Args;
use std::sync::Arc;

use crate::analysis::AiAnalyzer;
use crate::config::MonitorConfig;
use crate::guard::LifecycleGuard;
use crate::monitor::Monitor;
use crate::store::RecordStore;

/// Start 命令参数
#[derive(Args)]
pub struct StartArgs {
    /// 项目名称（默认当前目录名）
    #[arg(long, short)]
    pub project: Option<String>,

    /// tick 间隔（秒）
    #[arg(long, short)]
    pub interval: Option<u64>,

    /// 上下文时间窗口（秒）
    #[arg(long, short)]
    pub window: Option<u64>,

    /// 覆盖配置中的项目目标
    #[arg(long, short)]
    pub goal: Option<String>,
}

/// 处理 start 命令
pub async fn handle_start(args: StartArgs) -> Result<()> {
    let mut config = MonitorConfig::load()?;
    if let Some(interval) = args.interval {
        config.interval_secs = interval;
    }
    if let Some(window) = args.window {
        config.window_secs = window;
    }
    if let Some(goal) = args.goal {
        config.project_goal = goal;
    }

    let project = resolve_project(args.project)?;

    let adapter = AiAnalyzer::new(&config)?;
    let monitor = Monitor::new(
        &project,
        config,
        RecordStore::new(),
        LifecycleGuard::new(),
        Arc::new(adapter),
    );

    println!("开始监控项目: {}", project);
    println!("按 Ctrl+C 停止，或在其他终端运行: dsm stop");

    monitor.start().await?;

    println!("监控已停止");
    Ok(())
}

/// 解析项目名称，缺省取当前目录名
pub(crate) fn resolve_project(project: Option<String>) -> Result<String> {
    if let Some(project) = project {
        return Ok(project);
    }

    let cwd = std::env::current_dir()?;
    cwd.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("无法从当前目录推断项目名称，请使用 --project 指定"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_project_explicit() {
        let project = resolve_project(Some("demo".to_string())).unwrap();
        assert_eq!(project, "demo");
    }

    #[test]
    fn test_resolve_project_from_cwd() {
        let project = resolve_project(None).unwrap();
        assert!(!project.is_empty());
    }
}
