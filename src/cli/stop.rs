//! Stop 命令 - 停止正在运行的监控进程
//!
//! 跨进程停止：读取标记中的 PID 并发送 SIGTERM，运行中进程的信号
//! 监听会走与显式 stop 相同的停止路径（完成进行中的 tick、关闭会话、
//! 释放标记）。

use anyhow::Result;
use std::process::Command;

use crate::guard::LifecycleGuard;
use crate::monitor::MonitorError;

/// 处理 stop 命令
pub fn handle_stop() -> Result<()> {
    let guard = LifecycleGuard::new();

    let Some(marker) = guard.holder() else {
        return Err(MonitorError::NotRunning.into());
    };

    if !guard.is_held() {
        // 标记残留但持有进程已退出
        return Err(MonitorError::NotRunning.into());
    }

    Command::new("kill")
        .args(["-TERM", &marker.pid.to_string()])
        .output()?;

    println!("已发送停止信号 (PID: {})", marker.pid);
    println!("监控进程会在完成当前 tick 后退出");
    Ok(())
}
