//! 应用运行器：在一台已绑定的设备上安装、运行和卸载测试应用

mod app_runner;
mod failure;
mod types;

pub use app_runner::{AppRunner, AppRunnerFactory, MlaunchAppRunnerFactory, RunnerTimeouts};
pub use failure::guess_failure_reason;
pub use types::{AppRunnerConfig, ExecutionResult, RunOutcome};
