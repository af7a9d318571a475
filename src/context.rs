//! 上下文聚合 - 为每次分析请求构建按优先级排序的上下文
//!
//! 优先级从高到低：置顶提醒 → 窗口内最近记录（按时间顺序）→ 项目目标。
//! 下游消费者可能按长度截断上下文，因此高优先级内容必须排在前面。
//! 每次请求重新计算，从不跨请求缓存。

use chrono::Duration;
use tracing::warn;

use crate::records::{Record, RecordPayload};
use crate::store::RecordStore;

/// 默认时间窗口（秒）
pub const DEFAULT_WINDOW_SECS: i64 = 300;

/// 渲染期聚合的项目上下文（派生数据，不持久化）
#[derive(Debug, Clone)]
pub struct ProjectContext {
    /// 置顶提醒（用户提供，最高优先级，完整包含）
    pub pinned_reminders: Vec<String>,
    /// 窗口内的最近记录（按时间顺序）
    pub recent_records: Vec<Record>,
    /// 项目目标（最低优先级）
    pub goal: String,
}

impl ProjectContext {
    /// 渲染为提交给分析服务的文本块
    pub fn render(&self) -> String {
        let mut out = String::new();

        if !self.pinned_reminders.is_empty() {
            out.push_str("--- 置顶提醒（必须优先遵守）---\n");
            for reminder in &self.pinned_reminders {
                out.push_str("- ");
                out.push_str(reminder);
                out.push('\n');
            }
            out.push('\n');
        }

        out.push_str("--- 最近活动 ---\n");
        if self.recent_records.is_empty() {
            out.push_str("（窗口内无记录）\n");
        } else {
            for record in &self.recent_records {
                render_record(&mut out, record);
            }
        }
        out.push('\n');

        out.push_str("--- 项目目标 ---\n");
        if self.goal.is_empty() {
            out.push_str("（未设置项目目标）\n");
        } else {
            out.push_str(&self.goal);
            out.push('\n');
        }

        out
    }
}

/// 渲染单条记录，每个变体使用自己的字段集
fn render_record(out: &mut String, record: &Record) {
    let time = record
        .ts
        .map(|ts| ts.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string());

    match &record.payload {
        RecordPayload::Interaction {
            current_state,
            files_changed,
            current_approach,
            issues,
            solutions,
            best_practices,
        } => {
            out.push_str(&format!("[{}] 交互分析: {}\n", time, current_state));
            render_list(out, "变更文件", files_changed);
            render_list(out, "当前方案", current_approach);
            render_list(out, "问题", issues);
            render_list(out, "解决方案", solutions);
            render_list(out, "最佳实践", best_practices);
        }
        RecordPayload::CodeChange {
            file_path,
            description,
            potential_issues,
            alternatives,
        } => {
            out.push_str(&format!("[{}] 代码变更: {} - {}\n", time, file_path, description));
            render_list(out, "潜在问题", potential_issues);
            render_list(out, "备选方案", alternatives);
        }
        RecordPayload::UserNote {
            content,
            metadata,
            priority,
            status,
        } => {
            out.push_str(&format!("[{}] 用户笔记: {}\n", time, content));
            if let Some(priority) = priority {
                out.push_str(&format!("  优先级: {}\n", priority));
            }
            if let Some(status) = status {
                out.push_str(&format!("  状态: {}\n", status));
            }
            for (key, value) in metadata {
                out.push_str(&format!("  {}: {}\n", key, value));
            }
        }
    }
}

fn render_list(out: &mut String, label: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("  {}:\n", label));
    for item in items {
        out.push_str(&format!("  - {}\n", item));
    }
}

/// 构建项目上下文
///
/// 存储不可用时优雅降级：只返回置顶提醒 + 项目目标，从不让调用方失败。
pub fn build_context(
    store: &RecordStore,
    project: &str,
    goal: &str,
    pinned_reminders: &[String],
    window: Duration,
) -> ProjectContext {
    let mut recent_records = match store.load_recent(project, window) {
        Ok(records) => records,
        Err(e) => {
            warn!(
                project = %project,
                error = %e,
                "Record store unavailable, degrading to reminders + goal"
            );
            Vec::new()
        }
    };

    // load_all 不保证时间顺序，这里统一排序
    recent_records.sort_by_key(|r| r.ts);

    ProjectContext {
        pinned_reminders: pinned_reminders.to_vec(),
        recent_records,
        goal: goal.to_string(),
    }
}
