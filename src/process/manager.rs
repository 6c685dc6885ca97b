use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::logger::LogFile;

/// 外部进程执行结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessResult {
    /// 退出码；被信号杀死或超时时为 None
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub cancelled: bool,
}

impl ProcessResult {
    pub fn exited(exit_code: Option<i32>) -> Self {
        Self {
            exit_code,
            timed_out: false,
            cancelled: false,
        }
    }

    pub fn timed_out() -> Self {
        Self {
            exit_code: None,
            timed_out: true,
            cancelled: false,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            exit_code: None,
            timed_out: false,
            cancelled: true,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out && !self.cancelled
    }

    /// 用于日志和失败信息的退出码文本
    pub fn exit_code_text(&self) -> String {
        match self.exit_code {
            Some(code) => code.to_string(),
            None if self.timed_out => "timed out".to_string(),
            None if self.cancelled => "cancelled".to_string(),
            None => "unknown".to_string(),
        }
    }
}

/// 单次调用的执行选项
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// 超过该时间后杀死进程
    pub timeout: Duration,
    /// 额外的环境变量
    pub env: HashMap<String, String>,
    /// 可选的外部取消信号
    pub cancel: Option<CancellationToken>,
}

impl ExecOptions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            env: HashMap::new(),
            cancel: None,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// 进程管理器 trait
#[async_trait]
pub trait ProcessManager: Send + Sync {
    /// 执行命令，stdout/stderr 写入 `log`
    ///
    /// 只有进程无法启动时才返回错误；非零退出、超时和取消都是普通结果。
    async fn execute_command(
        &self,
        program: &Path,
        args: &[String],
        log: &LogFile,
        options: ExecOptions,
    ) -> Result<ProcessResult>;
}

/// 基于 tokio::process 的进程管理器
#[derive(Debug, Default, Clone)]
pub struct TokioProcessManager;

impl TokioProcessManager {
    pub fn new() -> Self {
        Self
    }
}

enum Outcome {
    Exited(std::io::Result<std::process::ExitStatus>),
    TimedOut,
    Cancelled,
}

#[async_trait]
impl ProcessManager for TokioProcessManager {
    async fn execute_command(
        &self,
        program: &Path,
        args: &[String],
        log: &LogFile,
        options: ExecOptions,
    ) -> Result<ProcessResult> {
        debug!("执行命令: {} {}", program.display(), args.join(" "));

        let mut child = Command::new(program)
            .args(args)
            .envs(&options.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::Process(format!("无法启动 {}: {}", program.display(), e)))?;

        // 并行读取 stdout/stderr，避免管道写满后子进程阻塞
        let stdout = pump(child.stdout.take(), log.clone());
        let stderr = pump(child.stderr.take(), log.clone());
        let cancel = options.cancel.clone();

        let outcome = tokio::select! {
            status = async {
                let (status, _, _) = tokio::join!(child.wait(), stdout, stderr);
                status
            } => Outcome::Exited(status),
            _ = tokio::time::sleep(options.timeout) => Outcome::TimedOut,
            _ = async {
                match cancel {
                    Some(token) => token.cancelled().await,
                    None => futures::future::pending().await,
                }
            } => Outcome::Cancelled,
        };

        match outcome {
            Outcome::Exited(status) => {
                let status = status?;
                Ok(ProcessResult::exited(status.code()))
            }
            Outcome::TimedOut => {
                warn!("命令执行超时 ({:?}): {}", options.timeout, program.display());
                let _ = child.kill().await;
                Ok(ProcessResult::timed_out())
            }
            Outcome::Cancelled => {
                warn!("命令已取消: {}", program.display());
                let _ = child.kill().await;
                Ok(ProcessResult::cancelled())
            }
        }
    }
}

async fn pump<R: AsyncRead + Unpin>(reader: Option<R>, log: LogFile) {
    let Some(mut reader) = reader else {
        return;
    };
    let mut buffer = [0u8; 4096];
    loop {
        match reader.read(&mut buffer).await {
            Ok(0) | Err(_) => break,
            Ok(count) => {
                if let Err(e) = log.write_raw(&buffer[..count]) {
                    warn!("保存进程输出失败: {:?}", e);
                    break;
                }
            }
        }
    }
}
