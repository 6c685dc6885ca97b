//! 结构化失败报告

mod xml;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;
use crate::logger::{LogFile, Logs};

pub use xml::XmlResultReporter;

/// 失败报告使用的 XML 方言
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum XmlResultJargon {
    NUnitV2,
    #[default]
    NUnitV3,
    XUnit,
}

/// 一次失败的描述
#[derive(Debug, Clone)]
pub struct FailureReport {
    /// 失败的步骤，例如 `install`
    pub step: String,
    pub app_name: String,
    pub variation: String,
    pub title: String,
    pub message: String,
    /// 附带的日志文件
    pub log_path: PathBuf,
}

/// 结果报告生成器
pub trait ResultReporter: Send + Sync {
    /// 在 `logs` 中生成失败报告并返回该日志
    fn generate_failure(
        &self,
        logs: &Logs,
        failure: &FailureReport,
        jargon: XmlResultJargon,
    ) -> Result<LogFile>;
}
