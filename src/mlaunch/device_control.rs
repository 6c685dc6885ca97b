use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{MlaunchArgument, MlaunchArguments};
use crate::error::{AppError, Result};
use crate::logger::LogFile;
use crate::process::{ExecOptions, ProcessManager, ProcessResult};

/// 列表和下载类调用的期限
const QUERY_TIMEOUT: Duration = Duration::from_secs(60);

/// 外部设备控制（mlaunch）
pub struct DeviceControl {
    process_manager: Arc<dyn ProcessManager>,
    mlaunch_path: PathBuf,
    xcode_root: PathBuf,
}

impl DeviceControl {
    /// 路径为空时立即失败
    pub fn new(
        process_manager: Arc<dyn ProcessManager>,
        mlaunch_path: impl Into<PathBuf>,
        xcode_root: impl Into<PathBuf>,
    ) -> Result<Self> {
        let mlaunch_path = mlaunch_path.into();
        let xcode_root = xcode_root.into();
        if mlaunch_path.as_os_str().is_empty() {
            return Err(AppError::Config("mlaunch 路径不能为空".into()));
        }
        if xcode_root.as_os_str().is_empty() {
            return Err(AppError::Config("Xcode 根目录不能为空".into()));
        }

        Ok(Self {
            process_manager,
            mlaunch_path,
            xcode_root,
        })
    }

    pub fn xcode_root(&self) -> &Path {
        &self.xcode_root
    }

    pub fn process_manager(&self) -> Arc<dyn ProcessManager> {
        Arc::clone(&self.process_manager)
    }

    async fn execute(
        &self,
        mut args: MlaunchArguments,
        log: &LogFile,
        options: ExecOptions,
    ) -> Result<ProcessResult> {
        args.push(MlaunchArgument::SdkRoot(self.xcode_root.clone()));
        self.process_manager
            .execute_command(&self.mlaunch_path, &args.to_args(), log, options)
            .await
    }

    /// 把已连接设备列表（JSON）写入 `output`
    pub async fn list_devices(&self, output: &Path, log: &LogFile) -> Result<ProcessResult> {
        let args = MlaunchArguments::new([
            MlaunchArgument::ListDevices(output.to_path_buf()),
            MlaunchArgument::ListExtraData,
            MlaunchArgument::OutputFormatJson,
        ]);
        self.execute(args, log, ExecOptions::new(QUERY_TIMEOUT)).await
    }

    /// 把设备上的崩溃报告标识写入 `output`
    pub async fn list_crash_reports(
        &self,
        output: &Path,
        device_name: Option<&str>,
        log: &LogFile,
    ) -> Result<ProcessResult> {
        let mut args =
            MlaunchArguments::new([MlaunchArgument::ListCrashReports(output.to_path_buf())]);
        args.push_device_name(device_name);
        self.execute(args, log, ExecOptions::new(QUERY_TIMEOUT)).await
    }

    /// 下载一个崩溃报告到 `destination`
    pub async fn download_crash_report(
        &self,
        report: &str,
        destination: &Path,
        device_name: Option<&str>,
        log: &LogFile,
    ) -> Result<ProcessResult> {
        let mut args = MlaunchArguments::new([
            MlaunchArgument::DownloadCrashReport(report.to_string()),
            MlaunchArgument::DownloadCrashReportTo(destination.to_path_buf()),
        ]);
        args.push_device_name(device_name);
        self.execute(args, log, ExecOptions::new(QUERY_TIMEOUT)).await
    }

    /// 安装应用包，`cancel` 被触发时杀死安装进程
    pub async fn install(
        &self,
        app_path: &Path,
        device_name: &str,
        log: &LogFile,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<ProcessResult> {
        let mut args = MlaunchArguments::new([
            MlaunchArgument::InstallDev(app_path.to_path_buf()),
            MlaunchArgument::Verbose,
        ]);
        args.push_device_name(Some(device_name));
        self.execute(args, log, ExecOptions::new(timeout).with_cancel(cancel))
            .await
    }

    /// 按 bundle id 卸载应用
    pub async fn uninstall(
        &self,
        bundle_id: &str,
        device_name: &str,
        log: &LogFile,
        timeout: Duration,
    ) -> Result<ProcessResult> {
        let mut args = MlaunchArguments::new([
            MlaunchArgument::UninstallDevBundleId(bundle_id.to_string()),
            MlaunchArgument::Verbose,
        ]);
        args.push_device_name(Some(device_name));
        self.execute(args, log, ExecOptions::new(timeout)).await
    }

    /// 启动应用并等待其退出
    pub async fn run(
        &self,
        app_path: &Path,
        device_name: &str,
        log: &LogFile,
        timeout: Duration,
    ) -> Result<ProcessResult> {
        let mut args = MlaunchArguments::new([
            MlaunchArgument::LaunchDev(app_path.to_path_buf()),
            MlaunchArgument::WaitForExit,
            MlaunchArgument::Verbose,
        ]);
        args.push_device_name(Some(device_name));
        self.execute(args, log, ExecOptions::new(timeout)).await
    }
}
