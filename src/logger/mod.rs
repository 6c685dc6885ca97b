//! 日志模块
//!
//! 进程级诊断日志走 tracing；每次执行的文本日志（安装、运行、崩溃报告等）
//! 由 [`Logs`] 集合统一管理。

mod install_monitor;
mod log_file;
mod logs;

pub use install_monitor::InstallMonitorLog;
pub use log_file::LogFile;
pub use logs::Logs;

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// 初始化 tracing
///
/// 默认输出到终端；配置了日志目录时额外写入按天滚动的文件。
/// 返回的 guard 必须在进程退出前一直持有，否则文件日志会丢失。
pub fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if let Ok(directive) = "device_runner=debug".parse() {
        filter = filter.add_directive(directive);
    }

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "device-runner.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init();

    guard
}
