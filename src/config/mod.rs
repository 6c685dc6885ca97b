//! 配置模块
//!
//! 从 TOML 文件加载编排器配置，并允许环境变量覆盖工具链路径。

mod harness_config;

pub use harness_config::{ConfigError, HarnessConfig, TestTaskConfig};
