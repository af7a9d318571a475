//! 配置加载模块
//!
//! 配置在 Monitor 构造时加载一次，之后以显式字段传递，不在调用点读取环境。
//!
//! 来源优先级：
//! 1. 配置文件 `~/.config/dev-session-monitor/config.json`
//! 2. 环境变量 `ANTHROPIC_API_KEY` / `ANTHROPIC_BASE_URL`（仅补齐缺失的密钥）

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// 默认 tick 间隔（秒）
pub const DEFAULT_INTERVAL_SECS: u64 = 30;

/// 默认上下文时间窗口（秒）
pub const DEFAULT_WINDOW_SECS: u64 = 300;

/// 默认适配器调用超时（毫秒）
pub const DEFAULT_ADAPTER_TIMEOUT_MS: u64 = 30_000;

/// 默认分析模型
pub const DEFAULT_MODEL: &str = "claude-haiku-4-5-20251001";

/// 监控配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// 项目目标（自由文本）
    pub project_goal: String,
    /// 置顶提醒（最高优先级，完整进入每次分析上下文）
    pub pinned_reminders: Vec<String>,
    /// 分析服务 API 密钥
    pub anthropic_api_key: String,
    /// 分析服务 base URL（支持代理）
    pub anthropic_base_url: String,
    /// 分析模型
    pub model: String,
    /// tick 间隔（秒）
    pub interval_secs: u64,
    /// 上下文时间窗口（秒）
    pub window_secs: u64,
    /// 适配器调用超时（毫秒）
    pub adapter_timeout_ms: u64,
    /// 捕获目标 tmux session（缺省为当前 pane）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_target: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            project_goal: String::new(),
            pinned_reminders: Vec::new(),
            anthropic_api_key: String::new(),
            anthropic_base_url: String::new(),
            model: DEFAULT_MODEL.to_string(),
            interval_secs: DEFAULT_INTERVAL_SECS,
            window_secs: DEFAULT_WINDOW_SECS,
            adapter_timeout_ms: DEFAULT_ADAPTER_TIMEOUT_MS,
            capture_target: None,
        }
    }
}

impl MonitorConfig {
    /// 配置文件路径
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("dev-session-monitor")
            .join("config.json")
    }

    /// 按优先级加载配置
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        let path = Self::config_path();
        if path.exists() {
            let content = fs::read_to_string(&path)?;
            config = serde_json::from_str(&content)?;
            debug!(path = %path.display(), "Config loaded from file");
        }

        // 环境变量补齐缺失的密钥
        if config.anthropic_api_key.is_empty() {
            if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
                if !key.is_empty() {
                    debug!("Using ANTHROPIC_API_KEY from environment");
                    config.anthropic_api_key = key;
                }
            }
        }
        if config.anthropic_base_url.is_empty() {
            if let Ok(url) = std::env::var("ANTHROPIC_BASE_URL") {
                if !url.is_empty() {
                    config.anthropic_base_url = url;
                }
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.interval_secs, DEFAULT_INTERVAL_SECS);
        assert_eq!(config.window_secs, DEFAULT_WINDOW_SECS);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert!(config.pinned_reminders.is_empty());
    }

    #[test]
    fn test_config_partial_file_fills_defaults() {
        let json = r#"{"project_goal": "ship v1", "interval_secs": 5}"#;
        let config: MonitorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.project_goal, "ship v1");
        assert_eq!(config.interval_secs, 5);
        assert_eq!(config.window_secs, DEFAULT_WINDOW_SECS);
    }
}
