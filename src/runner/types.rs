use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::device::TestTarget;

/// 一次执行的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExecutionResult {
    #[default]
    NotStarted,
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

impl ExecutionResult {
    pub fn succeeded(self) -> bool {
        self == ExecutionResult::Succeeded
    }

    /// 失败或超时
    pub fn failed(self) -> bool {
        matches!(self, ExecutionResult::Failed | ExecutionResult::TimedOut)
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionResult::NotStarted => "NotStarted",
            ExecutionResult::Running => "Running",
            ExecutionResult::Succeeded => "Succeeded",
            ExecutionResult::Failed => "Failed",
            ExecutionResult::TimedOut => "TimedOut",
        };
        f.write_str(name)
    }
}

/// 一次运行的结果和可选的失败说明
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub result: ExecutionResult,
    pub failure_message: Option<String>,
}

impl RunOutcome {
    pub fn succeeded() -> Self {
        Self {
            result: ExecutionResult::Succeeded,
            failure_message: None,
        }
    }

    pub fn failed(failure_message: Option<String>) -> Self {
        Self {
            result: ExecutionResult::Failed,
            failure_message,
        }
    }
}

/// 为一台已绑定设备创建运行器所需的全部信息
#[derive(Debug, Clone)]
pub struct AppRunnerConfig {
    /// 运行目标；平台没有设备目标时为 None
    pub target: Option<TestTarget>,
    pub device_name: String,
    pub companion_device_name: Option<String>,
    pub app_path: PathBuf,
    pub bundle_id: String,
    pub app_name: String,
    pub variation: String,
    pub timeout_multiplier: f64,
}

impl AppRunnerConfig {
    /// mlaunch 使用的设备名：手表应用通过配对的手机操作
    pub fn target_device_name(&self) -> &str {
        self.companion_device_name
            .as_deref()
            .unwrap_or(&self.device_name)
    }
}
