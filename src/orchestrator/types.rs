use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::build::{BuildCleaner, ProjectCleaner};
use crate::config::{HarnessConfig, TestTaskConfig};
use crate::device::{Device, TestPlatform};
use crate::logger::Logs;
use crate::reporting::XmlResultJargon;
use crate::runner::ExecutionResult;

/// 生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExecutionState {
    Idle,
    AcquiringDevice,
    PreUninstall,
    Installing,
    Running,
    ExtensionRunning,
    PostUninstall,
    Cleanup,
    Done,
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 一个待执行的测试任务
#[derive(Clone)]
pub struct TestTask {
    pub name: String,
    pub app_path: PathBuf,
    pub bundle_id: String,
    pub app_name: String,
    pub platform: TestPlatform,
    pub variation: String,
    /// 可以运行该任务的设备
    pub candidates: Vec<Device>,
    pub timeout_multiplier: f64,
    /// 本任务的日志目录
    pub log_directory: PathBuf,
    /// 构建产物清理；None 表示没有可清理的东西
    pub cleaner: Option<Arc<dyn BuildCleaner>>,
}

impl TestTask {
    /// 用任务配置和已知设备构造任务
    ///
    /// 配置里没有列出候选设备时，所有平台匹配的设备都是候选。
    pub fn from_config(config: &TestTaskConfig, devices: &[Device], log_root: &Path) -> Self {
        let candidates: Vec<Device> = if config.candidates.is_empty() {
            let platform = config.platform.device_platform();
            devices
                .iter()
                .filter(|device| Some(device.platform) == platform)
                .cloned()
                .collect()
        } else {
            devices
                .iter()
                .filter(|device| config.candidates.contains(&device.udid))
                .cloned()
                .collect()
        };

        let app_name = config.app_name.clone().unwrap_or_else(|| {
            config
                .app_path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| config.name.clone())
        });

        Self {
            name: config.name.clone(),
            app_path: config.app_path.clone(),
            bundle_id: config.bundle_id.clone(),
            app_name,
            platform: config.platform,
            variation: config.variation.clone(),
            candidates,
            timeout_multiplier: config.timeout_multiplier,
            log_directory: log_root.join(&config.name),
            cleaner: config
                .project_dir
                .as_ref()
                .map(|dir| Arc::new(ProjectCleaner::new(dir)) as Arc<dyn BuildCleaner>),
        }
    }
}

impl fmt::Debug for TestTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestTask")
            .field("name", &self.name)
            .field("platform", &self.platform)
            .field("candidates", &self.candidates.len())
            .finish()
    }
}

/// 影响执行流程的开关和期限
#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    pub uninstall_test_app: bool,
    pub clean_successful_test_runs: bool,
    pub generate_xml_failures: bool,
    pub in_ci: bool,
    pub xml_jargon: XmlResultJargon,
    pub crash_capture_timeout: Duration,
    pub install_stall_timeout: Duration,
    pub device_wait_timeout: Option<Duration>,
}

impl ExecutionSettings {
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            uninstall_test_app: config.uninstall_test_app,
            clean_successful_test_runs: config.clean_successful_test_runs,
            generate_xml_failures: config.generate_xml_failures,
            in_ci: config.in_ci(),
            xml_jargon: config.xml_jargon,
            crash_capture_timeout: config.crash_capture_timeout(),
            install_stall_timeout: Duration::from_secs(config.install_stall_timeout_secs),
            device_wait_timeout: config.device_wait_timeout(),
        }
    }
}

/// 一次执行的最终结果
#[derive(Debug)]
pub struct ExecutionReport {
    pub task_name: String,
    pub device: Option<Device>,
    pub companion: Option<Device>,
    pub result: ExecutionResult,
    pub failure_message: Option<String>,
    /// 按顺序访问过的状态
    pub states: Vec<ExecutionState>,
    pub logs: Arc<Logs>,
    /// Today 扩展运行的日志
    pub extension_logs: Option<Arc<Logs>>,
}

impl ExecutionReport {
    pub(crate) fn new(task_name: &str, logs: Arc<Logs>) -> Self {
        Self {
            task_name: task_name.to_string(),
            device: None,
            companion: None,
            result: ExecutionResult::NotStarted,
            failure_message: None,
            states: vec![ExecutionState::Idle],
            logs,
            extension_logs: None,
        }
    }

    pub(crate) fn enter(&mut self, state: ExecutionState) {
        self.states.push(state);
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        self.result = ExecutionResult::Failed;
        self.failure_message = Some(message.into());
    }

    pub fn succeeded(&self) -> bool {
        self.result.succeeded()
    }
}
