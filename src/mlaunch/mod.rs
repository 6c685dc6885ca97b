//! mlaunch 设备控制
//!
//! 设备通信协议本身由外部 mlaunch 进程实现，这里只负责组装参数、
//! 设置每次调用的期限，并把结果以 [`ProcessResult`](crate::process::ProcessResult) 返回。

mod arguments;
mod device_control;
mod scratch;

pub use arguments::{MlaunchArgument, MlaunchArguments};
pub use device_control::DeviceControl;
pub use scratch::{default_scratch_provider, ScratchFile, ScratchProvider};
