use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

use super::{HostSnapshotSource, RemoteSnapshotSource, SnapshotSource, Symbolicator};
use crate::error::{AppError, Result};
use crate::logger::{LogFile, Logs};
use crate::mlaunch::{DeviceControl, ScratchProvider};

/// 两次空检查之间的等待时间
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// 崩溃捕获 trait
#[async_trait]
pub trait CrashCapture: Send {
    /// 记录当前已有的崩溃报告作为基线
    async fn start_capture(&mut self) -> Result<()>;

    /// 等待新的崩溃报告出现，最多等待 `timeout`
    ///
    /// 超时返回空列表；没有先调用 `start_capture` 时返回
    /// [`AppError::CaptureNotStarted`]。
    async fn end_capture(&mut self, timeout: Duration) -> Result<Vec<LogFile>>;
}

/// 基于快照差集的崩溃报告捕获
pub struct CrashSnapshotReporter {
    source: Box<dyn SnapshotSource>,
    log: LogFile,
    baseline: Option<HashSet<String>>,
}

impl CrashSnapshotReporter {
    pub fn new(source: Box<dyn SnapshotSource>, log: LogFile) -> Self {
        Self {
            source,
            log,
            baseline: None,
        }
    }
}

#[async_trait]
impl CrashCapture for CrashSnapshotReporter {
    async fn start_capture(&mut self) -> Result<()> {
        self.baseline = Some(self.source.snapshot().await);
        Ok(())
    }

    async fn end_capture(&mut self, timeout: Duration) -> Result<Vec<LogFile>> {
        let baseline = self.baseline.take().ok_or(AppError::CaptureNotStarted)?;
        let started = Instant::now();

        loop {
            let current = self.source.snapshot().await;
            let mut new_reports: Vec<String> = current.difference(&baseline).cloned().collect();

            // 同一轮里先看有没有新报告，再看是否超时
            if !new_reports.is_empty() {
                new_reports.sort();
                self.log
                    .write_line(format!("Found {} new crash report(s)", new_reports.len()));
                info!("发现 {} 个新的崩溃报告", new_reports.len());

                let reports = self.source.collect(&new_reports).await;
                for report in &reports {
                    self.log.write_line(format!("    {}", report.path().display()));
                }
                return Ok(reports);
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                self.log.write_line("No crash reports found.");
                return Ok(Vec::new());
            }

            let remaining = timeout - elapsed;
            self.log.write_line(format!(
                "No crash reports, waiting a second to see if the crash report service just didn't complete in time ({})",
                remaining.as_secs()
            ));
            tokio::time::sleep(POLL_INTERVAL.min(remaining)).await;
        }
    }
}

/// 崩溃捕获工厂
pub trait CrashReporterFactory: Send + Sync {
    fn create(
        &self,
        log: LogFile,
        logs: Arc<Logs>,
        is_device: bool,
        device_name: Option<String>,
    ) -> Box<dyn CrashCapture>;
}

/// 按真机/模拟器选择快照来源的工厂
pub struct CrashSnapshotReporterFactory {
    control: Arc<DeviceControl>,
    scratch: ScratchProvider,
    diagnostics_directory: PathBuf,
}

impl CrashSnapshotReporterFactory {
    pub fn new(control: Arc<DeviceControl>, scratch: ScratchProvider) -> Self {
        Self {
            control,
            scratch,
            diagnostics_directory: HostSnapshotSource::default_directory(),
        }
    }
}

impl CrashReporterFactory for CrashSnapshotReporterFactory {
    fn create(
        &self,
        log: LogFile,
        logs: Arc<Logs>,
        is_device: bool,
        device_name: Option<String>,
    ) -> Box<dyn CrashCapture> {
        let source: Box<dyn SnapshotSource> = if is_device {
            let symbolicator =
                Symbolicator::new(self.control.process_manager(), self.control.xcode_root());
            Box::new(RemoteSnapshotSource::new(
                Arc::clone(&self.control),
                symbolicator,
                device_name,
                Arc::clone(&self.scratch),
                logs,
                log.clone(),
            ))
        } else {
            Box::new(HostSnapshotSource::with_directory(
                self.diagnostics_directory.clone(),
                logs,
            ))
        };

        Box::new(CrashSnapshotReporter::new(source, log))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessResult;
    use crate::testing::RecordingProcessManager;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// 按顺序返回预设快照，最后一个会一直重复
    struct ScriptedSource {
        snapshots: Mutex<VecDeque<Vec<&'static str>>>,
        calls: Arc<AtomicUsize>,
        logs: Arc<Logs>,
    }

    impl ScriptedSource {
        fn new(snapshots: Vec<Vec<&'static str>>, logs: Arc<Logs>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let source = Self {
                snapshots: Mutex::new(snapshots.into()),
                calls: Arc::clone(&calls),
                logs,
            };
            (source, calls)
        }
    }

    #[async_trait]
    impl SnapshotSource for ScriptedSource {
        async fn snapshot(&self) -> HashSet<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut snapshots = self.snapshots.lock().unwrap();
            let current = if snapshots.len() > 1 {
                snapshots.pop_front().unwrap()
            } else {
                snapshots.front().cloned().unwrap_or_default()
            };
            current.into_iter().map(str::to_string).collect()
        }

        async fn collect(&self, new_reports: &[String]) -> Vec<LogFile> {
            new_reports
                .iter()
                .map(|r| self.logs.add_file(r, &format!("Crash report: {}", r)))
                .collect()
        }
    }

    fn setup() -> (tempfile::TempDir, Arc<Logs>, LogFile) {
        let dir = tempfile::tempdir().unwrap();
        let logs = Arc::new(Logs::new(dir.path().join("logs")));
        let log = logs.create("main.log", "Main log", false).unwrap();
        (dir, logs, log)
    }

    fn names(reports: &[LogFile]) -> Vec<String> {
        reports.iter().map(LogFile::file_name).collect()
    }

    #[tokio::test]
    async fn test_simulator_reports_only_new_files() {
        let (dir, logs, log) = setup();
        let diagnostics = dir.path().join("DiagnosticReports");
        std::fs::create_dir_all(&diagnostics).unwrap();
        std::fs::write(diagnostics.join("a.crash"), "a").unwrap();
        std::fs::write(diagnostics.join("b.crash"), "b").unwrap();

        let source = HostSnapshotSource::with_directory(&diagnostics, Arc::clone(&logs));
        let mut reporter = CrashSnapshotReporter::new(Box::new(source), log);
        reporter.start_capture().await.unwrap();

        std::fs::write(diagnostics.join("c.crash"), "c").unwrap();
        let reports = reporter.end_capture(Duration::from_secs(5)).await.unwrap();

        assert_eq!(names(&reports), vec!["c.crash"]);
        assert_eq!(reports[0].path(), diagnostics.join("c.crash"));
        assert_eq!(reports[0].description(), "Crash report: c.crash");
    }

    #[tokio::test]
    async fn test_reports_in_both_snapshots_are_not_new() {
        let (_dir, logs, log) = setup();
        let (source, _) = ScriptedSource::new(
            vec![vec!["a", "b"], vec!["b", "c", "d"]],
            Arc::clone(&logs),
        );
        let mut reporter = CrashSnapshotReporter::new(Box::new(source), log);

        reporter.start_capture().await.unwrap();
        let reports = reporter.end_capture(Duration::from_secs(5)).await.unwrap();

        assert_eq!(names(&reports), vec!["c", "d"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_bounds_the_wait() {
        let (_dir, logs, log) = setup();
        let (source, calls) = ScriptedSource::new(vec![vec!["a"]], logs);
        let mut reporter = CrashSnapshotReporter::new(Box::new(source), log);

        reporter.start_capture().await.unwrap();
        let started = Instant::now();
        let reports = reporter.end_capture(Duration::from_millis(2500)).await.unwrap();
        let elapsed = started.elapsed();

        assert!(reports.is_empty());
        assert!(elapsed <= Duration::from_millis(2500));
        assert!(elapsed >= Duration::from_secs(2));
        // 基线 + 0s/1s/2s/2.5s 四次检查
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_as_soon_as_a_report_appears() {
        let (_dir, logs, log) = setup();
        let (source, calls) =
            ScriptedSource::new(vec![vec![], vec![], vec!["late.crash"]], Arc::clone(&logs));
        let mut reporter = CrashSnapshotReporter::new(Box::new(source), log);

        reporter.start_capture().await.unwrap();
        let started = Instant::now();
        let reports = reporter.end_capture(Duration::from_secs(60)).await.unwrap();

        assert_eq!(names(&reports), vec!["late.crash"]);
        assert_eq!(started.elapsed(), Duration::from_secs(1));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_found_report_wins_over_elapsed_timeout() {
        let (_dir, logs, log) = setup();
        let (source, _) = ScriptedSource::new(vec![vec![], vec!["x.crash"]], Arc::clone(&logs));
        let mut reporter = CrashSnapshotReporter::new(Box::new(source), log);

        reporter.start_capture().await.unwrap();
        let reports = reporter.end_capture(Duration::ZERO).await.unwrap();

        assert_eq!(names(&reports), vec!["x.crash"]);
    }

    #[tokio::test]
    async fn test_end_without_start_fails_fast() {
        let (_dir, logs, log) = setup();
        let (source, calls) = ScriptedSource::new(vec![vec![]], logs);
        let mut reporter = CrashSnapshotReporter::new(Box::new(source), log);

        let result = reporter.end_capture(Duration::from_secs(5)).await;

        assert!(matches!(result, Err(AppError::CaptureNotStarted)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_device_mode_downloads_new_reports() {
        let (dir, logs, log) = setup();
        let scratch_path = dir.path().join("crash-list.txt");
        let list_calls = Arc::new(AtomicUsize::new(0));

        let pm = {
            let list_calls = Arc::clone(&list_calls);
            Arc::new(RecordingProcessManager::with_responder(move |call| {
                if let Some(path) = call.arg_value("--list-crash-reports=") {
                    let content = match list_calls.fetch_add(1, Ordering::SeqCst) {
                        0 => "old.crash\n",
                        _ => "old.crash\nnew.crash\n",
                    };
                    std::fs::write(path, content).unwrap();
                }
                if let Some(path) = call.arg_value("--download-crash-report-to=") {
                    std::fs::write(path, "Exception Type: EXC_CRASH").unwrap();
                }
                Ok(ProcessResult::exited(Some(0)))
            }))
        };
        // Xcode 根目录下没有 symbolicatecrash
        let control =
            Arc::new(DeviceControl::new(pm.clone(), "/mlaunch", dir.path().join("Xcode.app")).unwrap());
        let factory = CrashSnapshotReporterFactory::new(control, {
            let scratch_path = scratch_path.clone();
            Arc::new(move || scratch_path.clone())
        });

        let mut reporter =
            factory.create(log.clone(), Arc::clone(&logs), true, Some("Lab iPhone".into()));
        reporter.start_capture().await.unwrap();
        let reports = reporter.end_capture(Duration::from_secs(5)).await.unwrap();

        assert_eq!(names(&reports), vec!["new.crash"]);
        assert_eq!(reports[0].description(), "Crash report: new.crash");
        assert_eq!(reports[0].read_to_string().unwrap(), "Exception Type: EXC_CRASH");
        assert!(reports[0].path().starts_with(logs.directory()));
        assert!(!scratch_path.exists());

        let downloads: Vec<_> = pm
            .calls()
            .into_iter()
            .filter(|c| c.arg_value("--download-crash-report=").is_some())
            .collect();
        assert_eq!(downloads.len(), 1);
        assert_eq!(downloads[0].arg_value("--download-crash-report="), Some("new.crash"));
        assert_eq!(downloads[0].arg_after("--devname"), Some("Lab iPhone"));

        let main_log = log.read_to_string().unwrap();
        assert!(main_log.contains("Found 1 new crash report(s)"));
        assert!(main_log.contains("Can't symbolicate"));
    }

    #[tokio::test]
    async fn test_device_mode_listing_failure_still_removes_scratch() {
        let (dir, logs, log) = setup();
        let scratch_path = dir.path().join("crash-list.txt");

        let pm = Arc::new(RecordingProcessManager::with_responder(|call| {
            if let Some(path) = call.arg_value("--list-crash-reports=") {
                std::fs::write(path, "partial\n").unwrap();
            }
            Ok(ProcessResult::exited(Some(1)))
        }));
        let control = Arc::new(DeviceControl::new(pm, "/mlaunch", "/Xcode.app").unwrap());
        let factory = CrashSnapshotReporterFactory::new(control, {
            let scratch_path = scratch_path.clone();
            Arc::new(move || scratch_path.clone())
        });

        let mut reporter = factory.create(log.clone(), logs, true, None);
        reporter.start_capture().await.unwrap();

        assert!(!scratch_path.exists());
        assert!(log.read_to_string().unwrap().contains("Could not list crash reports"));
    }
}
