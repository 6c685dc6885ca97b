//! 崩溃报告捕获
//!
//! 运行前后各取一次崩溃报告快照，新出现的报告作为日志附加到本次执行。
//! 模拟器读取本机诊断目录，真机通过 mlaunch 列出并下载，再尝试符号化。

mod reporter;
mod snapshot;
mod symbolicate;

pub use reporter::{
    CrashCapture, CrashReporterFactory, CrashSnapshotReporter, CrashSnapshotReporterFactory,
};
pub use snapshot::{HostSnapshotSource, RemoteSnapshotSource, SnapshotSource};
pub use symbolicate::Symbolicator;
