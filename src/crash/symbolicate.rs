use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::logger::{LogFile, Logs};
use crate::process::{ExecOptions, ProcessManager};

/// symbolicatecrash 在 Xcode 中可能的位置，按顺序查找
const SYMBOLICATE_CRASH_PATHS: [&str; 2] = [
    "Contents/SharedFrameworks/DTDeviceKitBase.framework/Versions/A/Resources/symbolicatecrash",
    "Contents/SharedFrameworks/DVTFoundation.framework/Versions/A/Resources/symbolicatecrash",
];

const SYMBOLICATE_TIMEOUT: Duration = Duration::from_secs(60);

/// 崩溃报告符号化
///
/// 任何失败都退回原始报告。
pub struct Symbolicator {
    process_manager: Arc<dyn ProcessManager>,
    xcode_root: PathBuf,
    tool: Option<PathBuf>,
}

impl Symbolicator {
    pub fn new(process_manager: Arc<dyn ProcessManager>, xcode_root: impl Into<PathBuf>) -> Self {
        let xcode_root = xcode_root.into();
        let tool = Self::locate(&xcode_root);
        Self {
            process_manager,
            xcode_root,
            tool,
        }
    }

    /// 查找 symbolicatecrash
    pub fn locate(xcode_root: &Path) -> Option<PathBuf> {
        SYMBOLICATE_CRASH_PATHS
            .iter()
            .map(|relative| xcode_root.join(relative))
            .find(|path| path.is_file())
    }

    /// 符号化 `report`，成功返回新的日志，否则返回原始报告
    pub async fn symbolicate(&self, report: LogFile, logs: &Logs, log: &LogFile) -> LogFile {
        let Some(tool) = self.tool.as_deref() else {
            log.write_line(format!(
                "Can't symbolicate {} because the symbolicatecrash script does not exist under {}",
                report.path().display(),
                self.xcode_root.display()
            ));
            return report;
        };

        let name = report.file_name();
        let symbolicated_name = Path::new(&name)
            .with_extension("symbolicated.log")
            .to_string_lossy()
            .into_owned();
        let symbolicated = match logs.create(
            &symbolicated_name,
            &format!("Symbolicated crash report: {}", name),
            false,
        ) {
            Ok(file) => file,
            Err(e) => {
                log.write_line(format!("Failed to create {}: {}", symbolicated_name, e));
                return report;
            }
        };

        let developer_dir = self.xcode_root.join("Contents").join("Developer");
        let options = ExecOptions::new(SYMBOLICATE_TIMEOUT)
            .with_env("DEVELOPER_DIR", developer_dir.display().to_string());
        let args = [report.path().display().to_string()];

        match self
            .process_manager
            .execute_command(tool, &args, &symbolicated, options)
            .await
        {
            Ok(result) if result.succeeded() => {
                log.write_line(format!("Symbolicated {} successfully.", report.path().display()));
                symbolicated
            }
            Ok(result) => {
                log.write_line(format!(
                    "Failed to symbolicate {} (exit code: {}).",
                    report.path().display(),
                    result.exit_code_text()
                ));
                report
            }
            Err(e) => {
                debug!("symbolicatecrash 启动失败: {}", e);
                log.write_line(format!("Failed to symbolicate {}: {}", report.path().display(), e));
                report
            }
        }
    }
}
