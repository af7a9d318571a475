//! Dev Session Monitor CLI
//!
//! 本地开发助理：周期性捕获工作会话状态，提交外部分析服务并持久化结果。

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use dev_session_monitor::cli::{
    handle_context, handle_note, handle_records, handle_sessions, handle_start, handle_status,
    handle_stop, NoteArgs, StartArgs,
};

#[derive(Parser)]
#[command(name = "dsm")]
#[command(about = "Dev Session Monitor - 周期性捕获开发会话并持久化 AI 分析")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 启动监控（前台阻塞，Ctrl+C 或 dsm stop 停止）
    Start(StartArgs),
    /// 停止正在运行的监控进程
    Stop,
    /// 查看监控状态
    Status {
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 记录一条用户笔记
    Note(NoteArgs),
    /// 打印当前的分析上下文
    Context {
        /// 项目名称（默认当前目录名）
        #[arg(long, short)]
        project: Option<String>,
        /// 时间窗口（秒）
        #[arg(long, short)]
        window: Option<u64>,
    },
    /// 列出项目会话
    Sessions {
        /// 项目名称（默认当前目录名）
        #[arg(long, short)]
        project: Option<String>,
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 列出项目记录
    Records {
        /// 项目名称（默认当前目录名）
        #[arg(long, short)]
        project: Option<String>,
        /// 只看最近 N 秒内的记录
        #[arg(long, short)]
        window: Option<u64>,
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化 tracing 日志系统
    // 通过 RUST_LOG 环境变量控制日志级别，默认为 info
    // 例如: RUST_LOG=debug dsm start
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("dev_session_monitor=info,dsm=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start(args) => handle_start(args).await?,
        Commands::Stop => handle_stop()?,
        Commands::Status { json } => handle_status(json)?,
        Commands::Note(args) => handle_note(args)?,
        Commands::Context { project, window } => handle_context(project, window)?,
        Commands::Sessions { project, json } => handle_sessions(project, json)?,
        Commands::Records { project, window, json } => handle_records(project, window, json)?,
    }

    Ok(())
}
