//! 测试用的协作者替身

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::Result;
use crate::logger::LogFile;
use crate::process::{ExecOptions, ProcessManager, ProcessResult};

/// 一次被记录的进程调用
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub log_path: PathBuf,
    pub timeout: Duration,
    pub env: HashMap<String, String>,
}

impl RecordedCall {
    /// `--key=value` 形式参数的值
    pub fn arg_value(&self, prefix: &str) -> Option<&str> {
        self.args.iter().find_map(|arg| arg.strip_prefix(prefix))
    }

    /// 紧跟在 `flag` 之后的参数
    pub fn arg_after(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|arg| arg == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

type Responder = Box<dyn Fn(&RecordedCall) -> Result<ProcessResult> + Send + Sync>;

/// 记录所有调用并按 responder 返回结果的进程管理器
pub struct RecordingProcessManager {
    calls: Mutex<Vec<RecordedCall>>,
    responder: Responder,
}

impl RecordingProcessManager {
    pub fn succeeding() -> Self {
        Self::with_responder(|_| Ok(ProcessResult::exited(Some(0))))
    }

    pub fn with_responder(
        responder: impl Fn(&RecordedCall) -> Result<ProcessResult> + Send + Sync + 'static,
    ) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessManager for RecordingProcessManager {
    async fn execute_command(
        &self,
        program: &Path,
        args: &[String],
        log: &LogFile,
        options: ExecOptions,
    ) -> Result<ProcessResult> {
        let call = RecordedCall {
            program: program.to_path_buf(),
            args: args.to_vec(),
            log_path: log.path().to_path_buf(),
            timeout: options.timeout,
            env: options.env.clone(),
        };
        self.calls.lock().unwrap().push(call.clone());
        (self.responder)(&call)
    }
}
