//! 测试执行编排
//!
//! 获取设备租约后依次执行：运行前卸载、安装、运行（可选的扩展运行）、
//! 运行后卸载和清理，最后释放租约。

mod cleanup;
mod executor;
mod types;

pub use executor::TestExecutionOrchestrator;
pub use types::{ExecutionReport, ExecutionSettings, ExecutionState, TestTask};
