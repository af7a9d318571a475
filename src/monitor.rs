//! 监控生命周期 - 周期性捕获-分析-持久化循环
//!
//! 单个可复用的 Monitor 组件，按项目名和适配器参数化，每进程构造一次。
//! 状态机：`Idle → Running → Stopping → Idle`。
//!
//! 并发模型：tick 循环运行在一个后台 tokio 任务上，前台在 `start()` 中
//! 阻塞等待循环结束，同时监听 SIGINT/SIGTERM。停止是协作式的：停止信号
//! 在 tick 边界被观察，进行中的分析调用允许完成，不做硬杀。

use chrono::Duration as ChronoDuration;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::analysis::{AdapterError, CaptureAnalyzer};
use crate::config::MonitorConfig;
use crate::context::build_context;
use crate::guard::{GuardError, LifecycleGuard};
use crate::records::{AnalysisResult, Record};
use crate::store::{RecordStore, StorageError};

/// 监控生命周期错误
///
/// 只有 start/stop 时刻的结构性错误作为硬失败向调用方传播；
/// 稳态 tick 错误全部吸收并记录日志，保持循环可用。
#[derive(Debug, Error)]
pub enum MonitorError {
    /// 另一个存活的实例持有监控资源
    #[error("监控进程已在运行 (PID: {0})")]
    AlreadyRunning(u32),
    /// 监控未在运行
    #[error("监控进程未在运行")]
    NotRunning,
    /// 守卫操作失败
    #[error(transparent)]
    Guard(#[from] GuardError),
    /// 会话存储操作失败
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// 信号监听安装失败
    #[error("信号监听安装失败: {0}")]
    Signal(#[from] std::io::Error),
}

/// 循环状态
enum LoopState {
    Idle,
    Running {
        shutdown_tx: watch::Sender<bool>,
        done_rx: watch::Receiver<bool>,
    },
    Stopping,
}

/// 监控器
pub struct Monitor {
    project: String,
    config: MonitorConfig,
    store: Arc<RecordStore>,
    guard: LifecycleGuard,
    adapter: Arc<dyn CaptureAnalyzer>,
    state: Mutex<LoopState>,
}

impl Monitor {
    /// 创建监控器，所有依赖显式传入
    pub fn new(
        project: &str,
        config: MonitorConfig,
        store: RecordStore,
        guard: LifecycleGuard,
        adapter: Arc<dyn CaptureAnalyzer>,
    ) -> Self {
        Self {
            project: project.to_string(),
            config,
            store: Arc::new(store),
            guard,
            adapter,
            state: Mutex::new(LoopState::Idle),
        }
    }

    /// 项目名称
    pub fn project(&self) -> &str {
        &self.project
    }

    /// 循环是否处于 Running 状态
    pub fn is_running(&self) -> bool {
        matches!(*self.state.lock().unwrap(), LoopState::Running { .. })
    }

    /// 启动监控并阻塞到停止
    ///
    /// 本进程已在运行或守卫被他人持有时返回 `AlreadyRunning`。
    /// 成功后阻塞调用方，直到 `stop()` 被显式调用或收到中断信号。
    pub async fn start(&self) -> Result<(), MonitorError> {
        let mut done_rx = self.spawn_loop()?;

        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

        // 前台监督：等待循环结束，中断信号走同一条停止路径
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupt received, stopping monitor");
                    self.stop_on_signal().await;
                }
                _ = sigterm.recv() => {
                    info!("Terminate signal received, stopping monitor");
                    self.stop_on_signal().await;
                }
                changed = done_rx.changed() => {
                    if changed.is_err() || *done_rx.borrow() {
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// 停止监控
    ///
    /// 通知 tick 循环在完成进行中的 tick 后退出，有界等待确认，
    /// 然后关闭会话、释放守卫标记、回到 Idle。
    pub async fn stop(&self) -> Result<(), MonitorError> {
        let (shutdown_tx, mut done_rx) = {
            let mut state = self.state.lock().unwrap();
            match std::mem::replace(&mut *state, LoopState::Stopping) {
                LoopState::Running { shutdown_tx, done_rx } => (shutdown_tx, done_rx),
                other => {
                    *state = other;
                    return Err(MonitorError::NotRunning);
                }
            }
        };

        info!(project = %self.project, "Stop requested, signalling tick loop");
        let _ = shutdown_tx.send(true);

        // 有界等待：一个 tick 处理时长（适配器超时 + 裕量）内必须得到确认
        let bound = Duration::from_millis(self.config.adapter_timeout_ms) + Duration::from_secs(1);
        let ack = tokio::time::timeout(bound, async {
            loop {
                if *done_rx.borrow() {
                    break;
                }
                if done_rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await;

        if ack.is_err() {
            warn!("Tick loop did not acknowledge stop within bound, cleaning up anyway");
        }

        if let Err(e) = self.store.close_session(&self.project) {
            warn!(error = %e, "Failed to close session");
        }
        if let Err(e) = self.guard.release() {
            warn!(error = %e, "Failed to release marker");
        }

        *self.state.lock().unwrap() = LoopState::Idle;
        info!(project = %self.project, "Monitor stopped");
        Ok(())
    }

    /// 信号路径的停止：NotRunning 说明另一条路径已完成停止，静默忽略
    async fn stop_on_signal(&self) {
        match self.stop().await {
            Ok(()) => {}
            Err(MonitorError::NotRunning) => {}
            Err(e) => warn!(error = %e, "Stop on signal failed"),
        }
    }

    /// 获取守卫、打开会话、派生 tick 循环任务
    fn spawn_loop(&self) -> Result<watch::Receiver<bool>, MonitorError> {
        let mut state = self.state.lock().unwrap();
        if !matches!(*state, LoopState::Idle) {
            return Err(MonitorError::AlreadyRunning(std::process::id()));
        }

        match self.guard.acquire() {
            Ok(()) => {}
            Err(GuardError::AlreadyRunning(pid)) => {
                return Err(MonitorError::AlreadyRunning(pid));
            }
            Err(e) => return Err(MonitorError::Guard(e)),
        }

        // 接续崩溃进程留下的开启中会话，否则打开新会话
        let session = match self
            .store
            .ensure_open_session(&self.project, &self.config.project_goal)
        {
            Ok(session) => session,
            Err(e) => {
                let _ = self.guard.release();
                return Err(MonitorError::Storage(e));
            }
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);

        let ticker = TickLoop {
            project: self.project.clone(),
            session_id: session.id.clone(),
            goal: self.config.project_goal.clone(),
            pinned_reminders: self.config.pinned_reminders.clone(),
            interval: Duration::from_secs(self.config.interval_secs),
            window: ChronoDuration::seconds(self.config.window_secs as i64),
            adapter_timeout_ms: self.config.adapter_timeout_ms,
            store: Arc::clone(&self.store),
            adapter: Arc::clone(&self.adapter),
        };
        tokio::spawn(ticker.run(shutdown_rx, done_tx));

        info!(
            project = %self.project,
            session_id = %session.id,
            interval_secs = self.config.interval_secs,
            "Monitor started"
        );

        *state = LoopState::Running {
            shutdown_tx,
            done_rx: done_rx.clone(),
        };
        Ok(done_rx)
    }
}

/// tick 循环任务
struct TickLoop {
    project: String,
    session_id: String,
    goal: String,
    pinned_reminders: Vec<String>,
    interval: Duration,
    window: ChronoDuration,
    adapter_timeout_ms: u64,
    store: Arc<RecordStore>,
    adapter: Arc<dyn CaptureAnalyzer>,
}

impl TickLoop {
    async fn run(self, mut shutdown: watch::Receiver<bool>, done_tx: watch::Sender<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            // tick 严格串行：慢分析只推迟下一个 tick，绝不并发执行
            if let Err(e) = self.tick().await {
                warn!(project = %self.project, error = %e, "Tick failed, continuing");
            }

            // tick 之间挂起；停止信号在 tick 边界被观察
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!(project = %self.project, "Tick loop exited");
        let _ = done_tx.send(true);
    }

    /// 单次 tick：构建上下文 → 捕获+分析 → 持久化
    async fn tick(&self) -> anyhow::Result<()> {
        // 上下文每次重新计算，不跨请求缓存
        let context = build_context(
            &self.store,
            &self.project,
            &self.goal,
            &self.pinned_reminders,
            self.window,
        );

        let adapter = Arc::clone(&self.adapter);
        let task = tokio::task::spawn_blocking(move || -> Result<AnalysisResult, AdapterError> {
            let blob = adapter.capture()?;
            adapter.analyze(&blob, &context)
        });

        let timeout = Duration::from_millis(self.adapter_timeout_ms);
        let analysis = match tokio::time::timeout(timeout, task).await {
            Err(_) => return Err(AdapterError::Timeout(self.adapter_timeout_ms).into()),
            Ok(Err(join_err)) => anyhow::bail!("适配器任务异常退出: {}", join_err),
            Ok(Ok(Err(e))) => return Err(e.into()),
            Ok(Ok(Ok(result))) => result,
        };

        let record = Record::interaction(&self.session_id, analysis);
        self.store.append(&self.project, record)?;
        debug!(project = %self.project, "Tick persisted");
        Ok(())
    }
}
