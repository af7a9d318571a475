//! 记录数据模型 - 会话与不可变记录
//!
//! 记录一旦持久化即不可变：只追加、只读取，从不编辑。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 工作会话 - 一段有边界的工作时期
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// 会话 ID
    pub id: String,
    /// 项目名称
    pub project: String,
    /// 项目目标（自由文本）
    pub goal: String,
    /// 开始时间
    pub started_at: DateTime<Utc>,
    /// 结束时间（开启中的会话为空）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    /// 创建新会话
    pub fn new(project: &str, goal: &str) -> Self {
        Self {
            id: format!("sess-{}", Utc::now().timestamp_millis()),
            project: project.to_string(),
            goal: goal.to_string(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// 会话是否仍在开启中（无结束时间）
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// 外部分析服务返回的结构化结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// 当前状态描述
    #[serde(default)]
    pub current_state: String,
    /// 变更的文件路径
    #[serde(default)]
    pub files_changed: Vec<String>,
    /// 当前采用的方案
    #[serde(default)]
    pub current_approach: Vec<String>,
    /// 发现的问题
    #[serde(default)]
    pub issues: Vec<String>,
    /// 解决方案
    #[serde(default)]
    pub solutions: Vec<String>,
    /// 最佳实践建议
    #[serde(default)]
    pub best_practices: Vec<String>,
}

/// 一条不可变记录：公共字段 + 按 kind 区分的变体载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// 所属会话 ID（弱引用，仅用于查找）
    pub session_id: String,
    /// 时间戳（追加时若缺失由存储层补齐）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<DateTime<Utc>>,
    /// 变体载荷
    #[serde(flatten)]
    pub payload: RecordPayload,
}

/// 记录变体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordPayload {
    /// 周期性捕获产出的交互分析
    Interaction {
        current_state: String,
        files_changed: Vec<String>,
        current_approach: Vec<String>,
        issues: Vec<String>,
        solutions: Vec<String>,
        best_practices: Vec<String>,
    },
    /// 一次代码变更
    CodeChange {
        file_path: String,
        description: String,
        potential_issues: Vec<String>,
        alternatives: Vec<String>,
    },
    /// 用户手动添加的笔记
    UserNote {
        content: String,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        metadata: HashMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        priority: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<String>,
    },
}

impl Record {
    /// 从分析结果构建交互记录
    pub fn interaction(session_id: &str, analysis: AnalysisResult) -> Self {
        Self {
            session_id: session_id.to_string(),
            ts: None,
            payload: RecordPayload::Interaction {
                current_state: analysis.current_state,
                files_changed: analysis.files_changed,
                current_approach: analysis.current_approach,
                issues: analysis.issues,
                solutions: analysis.solutions,
                best_practices: analysis.best_practices,
            },
        }
    }

    /// 构建代码变更记录
    pub fn code_change(
        session_id: &str,
        file_path: &str,
        description: &str,
        potential_issues: Vec<String>,
        alternatives: Vec<String>,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            ts: None,
            payload: RecordPayload::CodeChange {
                file_path: file_path.to_string(),
                description: description.to_string(),
                potential_issues,
                alternatives,
            },
        }
    }

    /// 构建用户笔记记录
    pub fn user_note(session_id: &str, content: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            ts: None,
            payload: RecordPayload::UserNote {
                content: content.to_string(),
                metadata: HashMap::new(),
                priority: None,
                status: None,
            },
        }
    }

    /// 设置时间戳
    pub fn with_timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.ts = Some(ts);
        self
    }

    /// 添加元数据（仅 UserNote 有效）
    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        if let RecordPayload::UserNote { ref mut metadata, .. } = self.payload {
            metadata.insert(key.to_string(), value.to_string());
        }
        self
    }

    /// 设置优先级（仅 UserNote 有效）
    pub fn with_priority(mut self, priority: &str) -> Self {
        if let RecordPayload::UserNote { priority: ref mut p, .. } = self.payload {
            *p = Some(priority.to_string());
        }
        self
    }

    /// 设置状态标签（仅 UserNote 有效）
    pub fn with_status(mut self, status: &str) -> Self {
        if let RecordPayload::UserNote { status: ref mut s, .. } = self.payload {
            *s = Some(status.to_string());
        }
        self
    }

    /// 记录类型名称
    pub fn kind(&self) -> &'static str {
        match self.payload {
            RecordPayload::Interaction { .. } => "interaction",
            RecordPayload::CodeChange { .. } => "code_change",
            RecordPayload::UserNote { .. } => "user_note",
        }
    }
}
