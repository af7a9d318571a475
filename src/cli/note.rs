//! Note 命令 - 追加用户笔记记录

use anyhow::{anyhow, Result};
use clap::Args;

use crate::records::Record;
use crate::store::RecordStore;

use super::start::resolve_project;

/// Note 命令参数
#[derive(Args)]
pub struct NoteArgs {
    /// 笔记内容
    pub content: String,

    /// 项目名称（默认当前目录名）
    #[arg(long, short)]
    pub project: Option<String>,

    /// 优先级 (low/medium/high)
    #[arg(long)]
    pub priority: Option<String>,

    /// 状态标签
    #[arg(long)]
    pub status: Option<String>,

    /// 附加元数据，可重复 (key=value)
    #[arg(long = "meta", value_name = "KEY=VALUE")]
    pub metadata: Vec<String>,
}

/// 处理 note 命令
pub fn handle_note(args: NoteArgs) -> Result<()> {
    let project = resolve_project(args.project)?;
    let store = RecordStore::new();

    // 没有开启中的会话也允许记笔记，session_id 留空
    let session_id = store
        .current_session(&project)?
        .map(|s| s.id)
        .unwrap_or_default();

    let mut record =
        Record::user_note(&session_id, &args.content).with_metadata("project", &project);
    if let Some(priority) = &args.priority {
        record = record.with_priority(priority);
    }
    if let Some(status) = &args.status {
        record = record.with_status(status);
    }
    for pair in &args.metadata {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("无效的元数据格式: {}，应为 key=value", pair))?;
        record = record.with_metadata(key, value);
    }

    store.append(&project, record)?;
    println!("已记录笔记到项目: {}", project);
    Ok(())
}
