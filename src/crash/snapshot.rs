use async_trait::async_trait;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

use super::Symbolicator;
use crate::logger::{LogFile, Logs};
use crate::mlaunch::{DeviceControl, ScratchFile, ScratchProvider};

/// 崩溃报告快照来源
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// 当前可见的崩溃报告标识
    async fn snapshot(&self) -> HashSet<String>;

    /// 把新出现的报告变成日志产物
    async fn collect(&self, new_reports: &[String]) -> Vec<LogFile>;
}

fn report_name(report: &str) -> String {
    Path::new(report)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| report.to_string())
}

/// 模拟器：读取本机诊断目录
pub struct HostSnapshotSource {
    directory: PathBuf,
    logs: Arc<Logs>,
}

impl HostSnapshotSource {
    pub fn with_directory(directory: impl Into<PathBuf>, logs: Arc<Logs>) -> Self {
        Self {
            directory: directory.into(),
            logs,
        }
    }

    /// `~/Library/Logs/DiagnosticReports`
    pub fn default_directory() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_default()
            .join("Library")
            .join("Logs")
            .join("DiagnosticReports")
    }
}

#[async_trait]
impl SnapshotSource for HostSnapshotSource {
    async fn snapshot(&self) -> HashSet<String> {
        let mut entries = match tokio::fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            // 目录不存在说明还没有任何崩溃报告
            Err(e) if e.kind() == ErrorKind::NotFound => return HashSet::new(),
            Err(e) => {
                warn!("读取诊断目录失败 {}: {}", self.directory.display(), e);
                return HashSet::new();
            }
        };

        let mut reports = HashSet::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("遍历诊断目录失败 {}: {}", self.directory.display(), e);
                    break;
                }
            };
            let path = entry.path();
            let is_file = tokio::fs::metadata(&path)
                .await
                .map(|meta| meta.is_file())
                .unwrap_or(false);
            if is_file {
                reports.insert(path.display().to_string());
            }
        }
        reports
    }

    async fn collect(&self, new_reports: &[String]) -> Vec<LogFile> {
        new_reports
            .iter()
            .map(|path| {
                let description = format!("Crash report: {}", report_name(path));
                self.logs.add_file(path, &description)
            })
            .collect()
    }
}

/// 真机：通过 mlaunch 列出、下载并符号化
pub struct RemoteSnapshotSource {
    control: Arc<DeviceControl>,
    symbolicator: Symbolicator,
    device_name: Option<String>,
    scratch: ScratchProvider,
    logs: Arc<Logs>,
    log: LogFile,
}

impl RemoteSnapshotSource {
    pub fn new(
        control: Arc<DeviceControl>,
        symbolicator: Symbolicator,
        device_name: Option<String>,
        scratch: ScratchProvider,
        logs: Arc<Logs>,
        log: LogFile,
    ) -> Self {
        Self {
            control,
            symbolicator,
            device_name,
            scratch,
            logs,
            log,
        }
    }
}

#[async_trait]
impl SnapshotSource for RemoteSnapshotSource {
    async fn snapshot(&self) -> HashSet<String> {
        // 无论列表命令成功与否，离开作用域时都删除临时文件
        let scratch = ScratchFile::new((self.scratch)());

        let result = self
            .control
            .list_crash_reports(scratch.path(), self.device_name.as_deref(), &self.log)
            .await;

        match result {
            Ok(result) if result.succeeded() => match tokio::fs::read_to_string(scratch.path())
                .await
            {
                Ok(content) => content
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect(),
                Err(e) => {
                    self.log
                        .write_line(format!("Could not read the crash report list: {}", e));
                    HashSet::new()
                }
            },
            Ok(result) => {
                self.log.write_line(format!(
                    "Could not list crash reports, exit code: {}",
                    result.exit_code_text()
                ));
                HashSet::new()
            }
            Err(e) => {
                self.log
                    .write_line(format!("Could not list crash reports: {}", e));
                HashSet::new()
            }
        }
    }

    async fn collect(&self, new_reports: &[String]) -> Vec<LogFile> {
        let mut collected = Vec::with_capacity(new_reports.len());

        for report in new_reports {
            // 下载到项目内的日志目录，构建清理时会一起删除
            let name = report_name(report);
            let destination = match self.logs.create(&name, &format!("Crash report: {}", name), false) {
                Ok(file) => file,
                Err(e) => {
                    self.log
                        .write_line(format!("Could not create a log file for {}: {}", report, e));
                    continue;
                }
            };

            let result = self
                .control
                .download_crash_report(
                    report,
                    destination.path(),
                    self.device_name.as_deref(),
                    &self.log,
                )
                .await;

            match result {
                Ok(result) if result.succeeded() => {
                    self.log.write_line(format!(
                        "Downloaded crash report {} to {}",
                        report,
                        destination.path().display()
                    ));
                    let file = self
                        .symbolicator
                        .symbolicate(destination, &self.logs, &self.log)
                        .await;
                    collected.push(file);
                }
                Ok(result) => {
                    self.log.write_line(format!(
                        "Could not download crash report {} (exit code: {})",
                        report,
                        result.exit_code_text()
                    ));
                }
                Err(e) => {
                    self.log
                        .write_line(format!("Could not download crash report {}: {}", report, e));
                }
            }
        }

        collected
    }
}
