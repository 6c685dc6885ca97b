use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::device::{Device, TestPlatform};
use crate::reporting::XmlResultJargon;

/// 编排器完整配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Xcode 根目录（例如 /Applications/Xcode.app）
    pub xcode_root: PathBuf,

    /// mlaunch 可执行文件路径
    pub mlaunch_path: PathBuf,

    /// 日志根目录，每个任务在其下有自己的子目录
    pub log_directory: PathBuf,

    /// 运行前后是否卸载测试应用
    pub uninstall_test_app: bool,

    /// 成功后是否清理构建产物
    pub clean_successful_test_runs: bool,

    /// 安装失败时是否生成结构化失败报告
    pub generate_xml_failures: bool,

    /// 是否运行在 CI 中；未设置时从环境变量推断
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_ci: Option<bool>,

    /// 失败报告格式
    pub xml_jargon: XmlResultJargon,

    /// 运行结束后等待崩溃报告出现的时间（秒）
    pub crash_capture_timeout_secs: u64,

    /// 安装超时（秒）
    pub install_timeout_secs: u64,

    /// 安装日志无输出多久后视为卡住（秒）
    pub install_stall_timeout_secs: u64,

    /// 卸载超时（秒）
    pub uninstall_timeout_secs: u64,

    /// 单次运行超时（秒），会乘以任务的超时倍数
    pub run_timeout_secs: u64,

    /// 等待空闲设备的最长时间（秒），None 表示一直等待
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_wait_timeout_secs: Option<u64>,

    /// 静态设备列表；为空时通过 mlaunch 列出设备
    pub devices: Vec<Device>,

    /// 要执行的测试任务
    pub tasks: Vec<TestTaskConfig>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            xcode_root: PathBuf::from("/Applications/Xcode.app"),
            mlaunch_path: PathBuf::from("/usr/local/bin/mlaunch"),
            log_directory: PathBuf::from("logs"),
            uninstall_test_app: true,
            clean_successful_test_runs: false,
            generate_xml_failures: false,
            in_ci: None,
            xml_jargon: XmlResultJargon::NUnitV3,
            crash_capture_timeout_secs: 5,
            install_timeout_secs: 900, // 15 分钟
            install_stall_timeout_secs: 300,
            uninstall_timeout_secs: 60,
            run_timeout_secs: 600,
            device_wait_timeout_secs: None,
            devices: Vec::new(),
            tasks: Vec::new(),
        }
    }
}

/// 单个测试任务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestTaskConfig {
    /// 任务名（通常是项目文件名）
    pub name: String,

    /// 应用包路径
    pub app_path: PathBuf,

    /// Bundle identifier
    pub bundle_id: String,

    /// 应用显示名
    #[serde(default)]
    pub app_name: Option<String>,

    /// 测试平台
    pub platform: TestPlatform,

    /// 变体名称（Debug、Release 等）
    #[serde(default)]
    pub variation: String,

    /// 候选设备 UDID；为空表示所有平台匹配的设备
    #[serde(default)]
    pub candidates: Vec<String>,

    /// 超时倍数
    #[serde(default = "default_timeout_multiplier")]
    pub timeout_multiplier: f64,

    /// 项目目录，清理时删除其下的 bin/obj
    #[serde(default)]
    pub project_dir: Option<PathBuf>,
}

fn default_timeout_multiplier() -> f64 {
    1.0
}

impl HarnessConfig {
    /// 从 TOML 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: HarnessConfig = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// 从文件加载，并使用环境变量覆盖工具链路径
    pub fn from_file_with_env<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;

        if let Ok(xcode_root) = std::env::var("XCODE_ROOT") {
            config.xcode_root = PathBuf::from(xcode_root);
        }

        if let Ok(mlaunch_path) = std::env::var("MLAUNCH_PATH") {
            config.mlaunch_path = PathBuf::from(mlaunch_path);
        }

        config.validate()?;
        Ok(config)
    }

    /// 保存到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(path, content)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// 校验必需字段
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.xcode_root.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError("xcode_root 不能为空".into()));
        }
        if self.mlaunch_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError("mlaunch_path 不能为空".into()));
        }
        if self.log_directory.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError("log_directory 不能为空".into()));
        }
        if self.install_stall_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "install_stall_timeout_secs 必须大于 0".into(),
            ));
        }
        for task in &self.tasks {
            if task.bundle_id.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "任务 {} 缺少 bundle_id",
                    task.name
                )));
            }
            if task.timeout_multiplier <= 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "任务 {} 的 timeout_multiplier 必须为正数",
                    task.name
                )));
            }
        }
        Ok(())
    }

    /// 是否运行在 CI 中
    pub fn in_ci(&self) -> bool {
        self.in_ci.unwrap_or_else(|| {
            ["BUILD_REVISION", "CI"]
                .iter()
                .any(|key| std::env::var(key).map(|v| !v.is_empty()).unwrap_or(false))
        })
    }

    pub fn crash_capture_timeout(&self) -> Duration {
        Duration::from_secs(self.crash_capture_timeout_secs)
    }

    pub fn device_wait_timeout(&self) -> Option<Duration> {
        self.device_wait_timeout_secs.map(Duration::from_secs)
    }
}

/// 配置错误
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO 错误: {0}")]
    IoError(String),

    #[error("解析错误: {0}")]
    ParseError(String),

    #[error("序列化错误: {0}")]
    SerializeError(String),

    #[error("验证错误: {0}")]
    ValidationError(String),
}
