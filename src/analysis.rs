//! 捕获与分析适配器 - 外部协作者边界
//!
//! 每个 tick 调用一次：`capture()` 产生原始捕获字节，`analyze()` 把捕获
//! 连同项目上下文提交给外部分析服务，返回结构化结果。所有失败都是
//! `AdapterError`，在 tick 层面可恢复，从不终止循环。
//!
//! 生产实现 `AiAnalyzer`：tmux capture-pane 捕获终端内容，
//! Anthropic Messages API 完成分析。

use serde::{Deserialize, Serialize};
use std::process::Command;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::MonitorConfig;
use crate::context::ProjectContext;
use crate::records::AnalysisResult;

/// Anthropic API 基础 URL
pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// API 版本
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// 默认最大输出 tokens
pub const DEFAULT_MAX_TOKENS: u32 = 1500;

/// 分析系统提示词
const ANALYSIS_SYSTEM: &str = r#"你是开发会话分析专家。分析开发者终端的当前状态，结合提供的项目上下文，输出结构化 JSON。

输出要求：只返回一个 JSON 对象，字段为 current_state（字符串）、files_changed、current_approach、issues、solutions、best_practices（均为字符串数组）。不要输出任何其他内容。"#;

/// 适配器错误（网络、编码、限流等，tick 层面均可恢复）
#[derive(Debug, Error)]
pub enum AdapterError {
    /// 捕获失败
    #[error("捕获失败: {0}")]
    Capture(String),
    /// 分析服务请求失败
    #[error("分析服务请求失败: {0}")]
    Network(String),
    /// 分析服务返回错误状态
    #[error("分析服务返回错误 ({status}): {message}")]
    Service { status: u16, message: String },
    /// 分析结果无法解析
    #[error("分析结果解析失败: {0}")]
    Decode(String),
    /// 调用超时
    #[error("分析调用超时 ({0} ms)")]
    Timeout(u64),
}

/// 捕获-分析适配器契约
pub trait CaptureAnalyzer: Send + Sync {
    /// 捕获当前工作状态，返回原始字节
    fn capture(&self) -> Result<Vec<u8>, AdapterError>;

    /// 把捕获与上下文提交给分析服务
    fn analyze(
        &self,
        capture: &[u8],
        context: &ProjectContext,
    ) -> Result<AnalysisResult, AdapterError>;
}

/// Messages API 请求体
#[derive(Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

/// Messages API 响应体
#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

/// API 错误响应
#[derive(Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

/// 生产适配器：tmux 捕获 + Anthropic 分析
pub struct AiAnalyzer {
    client: reqwest::blocking::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    timeout_ms: u64,
    capture_target: Option<String>,
}

impl AiAnalyzer {
    /// 从监控配置创建适配器
    pub fn new(config: &MonitorConfig) -> Result<Self, AdapterError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(config.adapter_timeout_ms))
            .build()
            .map_err(|e| AdapterError::Network(format!("cannot create HTTP client: {}", e)))?;

        let base_url = if config.anthropic_base_url.is_empty() {
            ANTHROPIC_API_URL.to_string()
        } else {
            normalize_base_url(&config.anthropic_base_url)
        };

        Ok(Self {
            client,
            api_key: config.anthropic_api_key.clone(),
            base_url,
            model: config.model.clone(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_ms: config.adapter_timeout_ms,
            capture_target: config.capture_target.clone(),
        })
    }
}

impl CaptureAnalyzer for AiAnalyzer {
    fn capture(&self) -> Result<Vec<u8>, AdapterError> {
        let mut cmd = Command::new("tmux");
        cmd.arg("capture-pane").arg("-p");
        if let Some(target) = &self.capture_target {
            cmd.args(["-t", target]);
        }

        let output = cmd
            .output()
            .map_err(|e| AdapterError::Capture(format!("tmux 不可用: {}", e)))?;

        if !output.status.success() {
            return Err(AdapterError::Capture(format!(
                "tmux capture-pane 失败: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(output.stdout)
    }

    fn analyze(
        &self,
        capture: &[u8],
        context: &ProjectContext,
    ) -> Result<AnalysisResult, AdapterError> {
        let snapshot = String::from_utf8_lossy(capture);
        let prompt = format!(
            "{}\n--- 终端快照 ---\n{}\n",
            context.render(),
            snapshot
        );

        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: Some(ANALYSIS_SYSTEM.to_string()),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt,
            }],
        };

        debug!(
            model = %self.model,
            base_url = %self.base_url,
            capture_len = capture.len(),
            "Sending analysis request"
        );

        let start = std::time::Instant::now();
        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    AdapterError::Timeout(self.timeout_ms)
                } else {
                    AdapterError::Network(format!(
                        "request failed after {}ms: {}",
                        start.elapsed().as_millis(),
                        e
                    ))
                }
            })?;

        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "Analysis request completed");

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| AdapterError::Network(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|r| r.error.message)
                .unwrap_or(body);
            return Err(AdapterError::Service {
                status: status.as_u16(),
                message,
            });
        }

        let response: MessagesResponse = serde_json::from_str(&body)
            .map_err(|e| AdapterError::Decode(format!("{} - body: {}", e, body)))?;

        let text = response
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .filter_map(|c| c.text.as_ref())
            .cloned()
            .collect::<Vec<String>>()
            .join("");

        if text.is_empty() {
            warn!("Empty response from analysis service");
        }

        parse_analysis_reply(&text)
    }
}

/// 确保 base URL 以 /v1/messages 结尾
fn normalize_base_url(url: &str) -> String {
    let url = url.trim_end_matches('/');
    if url.ends_with("/v1/messages") {
        url.to_string()
    } else if url.ends_with("/v1") {
        format!("{}/messages", url)
    } else {
        format!("{}/v1/messages", url)
    }
}

/// 从模型回复中解析结构化结果，容忍代码围栏
fn parse_analysis_reply(text: &str) -> Result<AnalysisResult, AdapterError> {
    let trimmed = text.trim();
    let json = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|s| s.trim_end_matches("```").trim())
        .unwrap_or(trimmed);

    serde_json::from_str(json)
        .map_err(|e| AdapterError::Decode(format!("{} - reply: {}", e, text)))
}
