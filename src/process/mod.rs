//! 外部进程执行
//!
//! 所有外部调用（mlaunch、symbolicatecrash）都经过 [`ProcessManager`]，
//! 超时和取消都表现为失败的 [`ProcessResult`]，而不是错误。

mod manager;

pub use manager::{ExecOptions, ProcessManager, ProcessResult, TokioProcessManager};
