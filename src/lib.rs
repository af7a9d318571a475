//! Dev Session Monitor - 本地开发助理
//!
//! 周期性捕获开发会话状态，提交外部分析服务，并把结构化结果持久化
//! 到按项目划分的记录存储，供后续 CLI 查询使用。

pub mod analysis;
pub mod cli;
pub mod config;
pub mod context;
pub mod guard;
pub mod monitor;
pub mod records;
pub mod store;

pub use analysis::{AdapterError, AiAnalyzer, CaptureAnalyzer};
pub use config::MonitorConfig;
pub use context::{build_context, ProjectContext};
pub use guard::{GuardError, LifecycleGuard, LivenessMarker};
pub use monitor::{Monitor, MonitorError};
pub use records::{AnalysisResult, Record, RecordPayload, Session};
pub use store::{RecordStore, StorageError};
