use std::path::PathBuf;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::LogFile;

/// 检查安装日志增长的间隔
const CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// 安装日志作用域
///
/// 持有安装日志和一个取消令牌。后台任务观察日志文件大小，
/// 超过 `stall_timeout` 没有任何新输出时取消令牌，让卡住的安装提前结束。
/// `stall_timeout` 为零时不启动看门狗。
/// 作用域在任何路径上被 drop 时都会取消令牌并停止后台任务。
pub struct InstallMonitorLog {
    log: LogFile,
    token: CancellationToken,
    watchdog: Option<JoinHandle<()>>,
}

impl InstallMonitorLog {
    /// 必须在 tokio 运行时内调用
    pub fn new(log: LogFile, stall_timeout: Duration) -> Self {
        let token = CancellationToken::new();
        let watchdog = if stall_timeout.is_zero() {
            warn!(log = %log.path().display(), "安装卡住超时为零，不监控安装进展");
            None
        } else {
            Some(tokio::spawn(watch_progress(
                log.path().to_path_buf(),
                stall_timeout,
                token.clone(),
            )))
        };

        Self {
            log,
            token,
            watchdog,
        }
    }

    pub fn log(&self) -> &LogFile {
        &self.log
    }

    /// 安装进程应当监听的取消令牌
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for InstallMonitorLog {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(watchdog) = &self.watchdog {
            watchdog.abort();
        }
    }
}

async fn watch_progress(path: PathBuf, stall_timeout: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval(CHECK_INTERVAL.min(stall_timeout));
    let mut last_len = 0u64;
    let mut last_progress = Instant::now();

    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let len = tokio::fs::metadata(&path)
            .await
            .map(|meta| meta.len())
            .unwrap_or(0);
        if len != last_len {
            last_len = len;
            last_progress = Instant::now();
            continue;
        }

        if last_progress.elapsed() >= stall_timeout {
            warn!(log = %path.display(), "安装 {:?} 内没有任何进展，取消安装", stall_timeout);
            token.cancel();
            return;
        }
    }
}
