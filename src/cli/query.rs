//! 查询命令 - status / context / sessions / records

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use sysinfo::{Pid, System};

use crate::config::MonitorConfig;
use crate::context::build_context;
use crate::guard::LifecycleGuard;
use crate::records::RecordPayload;
use crate::store::RecordStore;

use super::start::resolve_project;

/// Status 命令输出
#[derive(Debug, Serialize)]
pub struct StatusOutput {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker_created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_usage: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<u64>,
}

/// 处理 status 命令
pub fn handle_status(json: bool) -> Result<()> {
    let guard = LifecycleGuard::new();
    let marker = guard.holder();
    let running = guard.is_held();

    let mut output = StatusOutput {
        running,
        pid: marker.as_ref().map(|m| m.pid),
        marker_created_at: marker.as_ref().map(|m| m.created_at),
        cpu_usage: None,
        memory_mb: None,
    };

    if let (true, Some(marker)) = (running, &marker) {
        let mut system = System::new_all();
        system.refresh_all();
        if let Some(process) = system.process(Pid::from_u32(marker.pid)) {
            output.cpu_usage = Some(process.cpu_usage());
            output.memory_mb = Some(process.memory() / 1024 / 1024);
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if output.running {
        println!("监控运行中");
        if let Some(pid) = output.pid {
            println!("  PID: {}", pid);
        }
        if let Some(created_at) = output.marker_created_at {
            println!("  启动时间: {}", created_at.format("%Y-%m-%d %H:%M:%S"));
        }
        if let Some(memory_mb) = output.memory_mb {
            println!("  内存: {} MB", memory_mb);
        }
    } else if marker.is_some() {
        println!("发现 stale 标记，持有进程已退出（下次启动会自动清理）");
    } else {
        println!("监控未在运行");
    }

    Ok(())
}

/// 处理 context 命令：打印当前会提交给分析服务的上下文
pub fn handle_context(project: Option<String>, window_secs: Option<u64>) -> Result<()> {
    let project = resolve_project(project)?;
    let config = MonitorConfig::load()?;
    let window = ChronoDuration::seconds(window_secs.unwrap_or(config.window_secs) as i64);

    let store = RecordStore::new();
    let context = build_context(
        &store,
        &project,
        &config.project_goal,
        &config.pinned_reminders,
        window,
    );
    print!("{}", context.render());
    Ok(())
}

/// 处理 sessions 命令
pub fn handle_sessions(project: Option<String>, json: bool) -> Result<()> {
    let project = resolve_project(project)?;
    let store = RecordStore::new();
    let sessions = store.list_sessions(&project)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
    } else if sessions.is_empty() {
        println!("项目 {} 没有会话", project);
    } else {
        println!("项目 {} 的会话 ({}):\n", project, sessions.len());
        for session in sessions {
            let state = if session.is_open() { "开启中" } else { "已结束" };
            println!(
                "  {} | {} | 开始: {}",
                session.id,
                state,
                session.started_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }
    Ok(())
}

/// 处理 records 命令
pub fn handle_records(project: Option<String>, window_secs: Option<u64>, json: bool) -> Result<()> {
    let project = resolve_project(project)?;
    let store = RecordStore::new();

    let mut records = match window_secs {
        Some(secs) => store.load_recent(&project, ChronoDuration::seconds(secs as i64))?,
        None => store.load_all(&project)?,
    };
    records.sort_by_key(|r| r.ts);

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else if records.is_empty() {
        println!("项目 {} 没有记录", project);
    } else {
        println!("项目 {} 的记录 ({}):\n", project, records.len());
        for record in records {
            let time = record
                .ts
                .map(|ts| ts.format("%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string());
            let summary = match &record.payload {
                RecordPayload::Interaction { current_state, .. } => current_state.clone(),
                RecordPayload::CodeChange { file_path, description, .. } => {
                    format!("{} - {}", file_path, description)
                }
                RecordPayload::UserNote { content, .. } => content.clone(),
            };
            println!("  [{}] {} | {}", time, record.kind(), summary);
        }
    }
    Ok(())
}
