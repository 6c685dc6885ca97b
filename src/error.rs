use thiserror::Error;

use crate::config::ConfigError;
use crate::device::DevicePoolError;

/// 应用程序统一错误类型
#[derive(Error, Debug)]
pub enum AppError {
    /// 配置错误（构造时缺少必需的协作者或路径）
    #[error("配置错误: {0}")]
    Config(String),

    /// 配套设备未找到
    #[error("配套设备未找到: {0}")]
    CompanionNotFound(String),

    /// 设备池错误
    #[error(transparent)]
    Pool(#[from] DevicePoolError),

    /// 外部进程无法启动
    #[error("进程错误: {0}")]
    Process(String),

    /// 在 start_capture 之前调用了 end_capture
    #[error("崩溃捕获尚未开始")]
    CaptureNotStarted,

    /// IO 错误
    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON 错误
    #[error("JSON 错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

/// AppError 的 Result 类型别名
pub type Result<T> = std::result::Result<T, AppError>;
