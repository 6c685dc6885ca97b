use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::cleanup::{uninstall_best_effort, CleanupActions, CleanupGuard};
use super::types::{ExecutionReport, ExecutionSettings, ExecutionState, TestTask};
use crate::crash::CrashReporterFactory;
use crate::device::{target_for, Device, DeviceLoader, DeviceResourcePool};
use crate::logger::{InstallMonitorLog, LogFile, Logs};
use crate::reporting::{FailureReport, ResultReporter};
use crate::runner::{
    guess_failure_reason, AppRunner, AppRunnerConfig, AppRunnerFactory, ExecutionResult,
    RunOutcome,
};

/// 创建日志文件；失败时退回到一个惰性打开的文件，不让日志问题中断执行
fn create_log(logs: &Logs, name: &str, description: &str) -> LogFile {
    match logs.create(name, description, true) {
        Ok(log) => log,
        Err(e) => {
            warn!("创建日志 {} 失败: {}", name, e);
            logs.add_file(logs.directory().join(name), description)
        }
    }
}

/// 扩展运行的日志描述统一加上 `Extension ` 前缀
fn extension_description(description: &str) -> Option<String> {
    if description.starts_with("Extension ") {
        return None;
    }
    let mut chars = description.chars();
    let first = chars.next()?;
    Some(format!(
        "Extension {}{}",
        first.to_lowercase(),
        chars.as_str()
    ))
}

/// 设备上的测试执行编排器
pub struct TestExecutionOrchestrator {
    pool: Arc<DeviceResourcePool>,
    loader: Arc<dyn DeviceLoader>,
    runners: Arc<dyn AppRunnerFactory>,
    crash_reporters: Arc<dyn CrashReporterFactory>,
    result_reporter: Arc<dyn ResultReporter>,
    settings: ExecutionSettings,
    device_load_log: LogFile,
}

impl TestExecutionOrchestrator {
    pub fn new(
        pool: Arc<DeviceResourcePool>,
        loader: Arc<dyn DeviceLoader>,
        runners: Arc<dyn AppRunnerFactory>,
        crash_reporters: Arc<dyn CrashReporterFactory>,
        result_reporter: Arc<dyn ResultReporter>,
        settings: ExecutionSettings,
        device_load_log: LogFile,
    ) -> Self {
        Self {
            pool,
            loader,
            runners,
            crash_reporters,
            result_reporter,
            settings,
            device_load_log,
        }
    }

    /// 执行一个任务
    ///
    /// 任何失败都体现在返回的报告里。拿到设备之后，无论结果如何都会
    /// 运行后卸载、按需清理并释放设备。
    pub async fn run(&self, task: TestTask) -> ExecutionReport {
        let logs = Arc::new(Logs::new(&task.log_directory));
        let mut report = ExecutionReport::new(&task.name, Arc::clone(&logs));
        let main_log = create_log(&logs, "main.log", "Main log");

        let candidate_names: Vec<&str> = task.candidates.iter().map(|d| d.name.as_str()).collect();
        main_log.write_line(format!(
            "Running '{}' on device (candidates: '{}')",
            task.name,
            candidate_names.join("', '")
        ));
        let uninstall_log = create_log(&logs, "uninstall.log", "Uninstall log");

        report.enter(ExecutionState::AcquiringDevice);
        let lease = match self
            .pool
            .acquire_any_timeout(&task.candidates, self.settings.device_wait_timeout)
            .await
        {
            Ok(lease) => lease,
            Err(e) => {
                error!("任务 {} 无法获取设备: {}", task.name, e);
                main_log.write_line(format!("Could not acquire a device: {}", e));
                report.fail(format!("Could not acquire a device: {}", e));
                report.enter(ExecutionState::Done);
                return report;
            }
        };

        let mut guard = CleanupGuard::new(
            lease,
            CleanupActions {
                runner: None,
                cleaner: task.cleaner.clone(),
                uninstall_test_app: self.settings.uninstall_test_app,
                clean_successful_test_runs: self.settings.clean_successful_test_runs,
                in_ci: self.settings.in_ci,
                uninstall_log: uninstall_log.clone(),
                main_log: main_log.clone(),
            },
        );
        report.result = ExecutionResult::Running;

        self.drive(&task, &mut report, &mut guard, &logs, &main_log, &uninstall_log)
            .await;

        // 到这里仍是 Running 说明某个步骤没有给出结论
        if report.result == ExecutionResult::Running {
            report.fail("The execution did not produce a result.");
        }

        guard.finish(&mut report).await;
        report.enter(ExecutionState::Done);

        info!(
            "任务 {} 结束: {}{}",
            task.name,
            report.result,
            report
                .failure_message
                .as_deref()
                .map(|m| format!(" ({})", m))
                .unwrap_or_default()
        );
        report
    }

    async fn drive(
        &self,
        task: &TestTask,
        report: &mut ExecutionReport,
        guard: &mut CleanupGuard,
        logs: &Arc<Logs>,
        main_log: &LogFile,
        uninstall_log: &LogFile,
    ) {
        let udid = guard.device_udid().unwrap_or_default().to_string();
        let Some(device) = task.candidates.iter().find(|d| d.udid == udid).cloned() else {
            report.fail(format!("Acquired device '{}' is not a candidate.", udid));
            return;
        };
        report.device = Some(device.clone());

        if device.requires_companion() {
            match self
                .loader
                .find_companion_device(&self.device_load_log, &device)
                .await
            {
                Ok(companion) => report.companion = Some(companion),
                Err(e) => {
                    main_log.write_line(format!(
                        "Could not find the companion device for '{}': {}",
                        device.name, e
                    ));
                    report.fail(format!("Could not find the companion device: {}", e));
                    return;
                }
            }
        }
        main_log.write_line(format!("Acquired device '{}' for '{}'", device.name, task.name));

        report.enter(ExecutionState::PreUninstall);
        let config = AppRunnerConfig {
            target: target_for(task.platform),
            device_name: device.name.clone(),
            companion_device_name: report.companion.as_ref().map(|c| c.name.clone()),
            app_path: task.app_path.clone(),
            bundle_id: task.bundle_id.clone(),
            app_name: task.app_name.clone(),
            variation: task.variation.clone(),
            timeout_multiplier: task.timeout_multiplier,
        };
        let runner: Arc<dyn AppRunner> = match self.runners.create(config.clone()) {
            Ok(runner) => Arc::from(runner),
            Err(e) => {
                main_log.write_line(format!("Could not create the app runner: {}", e));
                report.fail(format!("Could not create the app runner: {}", e));
                return;
            }
        };
        guard.attach_runner(Arc::clone(&runner));

        // 有些设备无法直接升级，先卸载旧版本
        if self.settings.uninstall_test_app {
            uninstall_best_effort(
                runner.as_ref(),
                uninstall_log,
                main_log,
                "Pre-run",
                "this hopefully won't affect the test result",
            )
            .await;
        } else {
            uninstall_log.write_line("Pre-run uninstall skipped.");
        }

        if !report.result.failed() {
            report.enter(ExecutionState::Installing);
            self.install(task, report, runner.as_ref(), logs, &device).await;
        }

        if !report.result.failed() {
            report.enter(ExecutionState::Running);
            let run_log = create_log(logs, &format!("run-{}.log", device.udid), "Run log");
            let outcome = self
                .run_app(runner.as_ref(), logs, &run_log, config.target_device_name())
                .await;
            if outcome.failure_message.is_some() {
                report.failure_message = outcome.failure_message;
            }

            if outcome.result.succeeded() && task.platform.is_today_extension() {
                report.enter(ExecutionState::ExtensionRunning);
                self.run_extension(task, report, config, &device).await;
            } else {
                report.result = outcome.result;
            }
        }
    }

    async fn install(
        &self,
        task: &TestTask,
        report: &mut ExecutionReport,
        runner: &dyn AppRunner,
        logs: &Logs,
        device: &Device,
    ) {
        let install_log = create_log(logs, "install.log", "Install log");
        let result = {
            // 离开作用域时取消令牌并停止看门狗
            let monitor =
                InstallMonitorLog::new(install_log.clone(), self.settings.install_stall_timeout);
            runner.install(monitor.log(), monitor.cancellation_token()).await
        };

        let (summary, detail) = match result {
            Ok(result) if result.succeeded() => return,
            Ok(result) => {
                let detail = format!("exit code: {}", result.exit_code_text());
                (format!("Install failed, {}.", detail), detail)
            }
            Err(e) => {
                install_log.write_line(format!("Install could not be started: {}", e));
                (format!("Install failed: {}.", e), e.to_string())
            }
        };

        warn!(device = %device.udid, "安装失败: {}", detail);
        report.fail(summary);

        if self.settings.generate_xml_failures {
            let failure = FailureReport {
                step: "install".to_string(),
                app_name: runner.app_name().to_string(),
                variation: task.variation.clone(),
                title: format!("AppInstallation on {}", device.name),
                message: format!("Install failed on {}, {}", device.name, detail),
                log_path: install_log.path().to_path_buf(),
            };
            if let Err(e) = self
                .result_reporter
                .generate_failure(logs, &failure, self.settings.xml_jargon)
            {
                warn!("生成失败报告出错: {}", e);
            }
        }
    }

    /// 在崩溃捕获窗口内运行应用
    async fn run_app(
        &self,
        runner: &dyn AppRunner,
        logs: &Arc<Logs>,
        log: &LogFile,
        device_name: &str,
    ) -> RunOutcome {
        let mut crash_capture = self.crash_reporters.create(
            log.clone(),
            Arc::clone(logs),
            true,
            Some(device_name.to_string()),
        );
        if let Err(e) = crash_capture.start_capture().await {
            log.write_line(format!("Could not start crash capture: {}", e));
        }

        let outcome = match runner.run(log).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log.write_line(format!("Test run could not be started: {}", e));
                RunOutcome::failed(Some(format!("Test run failed: {}", e)))
            }
        };

        // 成功的运行不会再有崩溃报告落地，只取一次快照
        let crash_wait = if outcome.result.succeeded() {
            Duration::ZERO
        } else {
            self.settings.crash_capture_timeout
        };
        match crash_capture.end_capture(crash_wait).await {
            Ok(reports) if !reports.is_empty() => {
                info!("附加了 {} 个崩溃报告", reports.len());
            }
            Ok(_) => {}
            Err(e) => log.write_line(format!("Could not collect crash reports: {}", e)),
        }

        let failure_message = outcome.failure_message.or_else(|| {
            if outcome.result.succeeded() {
                None
            } else {
                guess_failure_reason(log)
            }
        });

        RunOutcome {
            result: outcome.result,
            failure_message,
        }
    }

    /// Today 扩展：主应用只负责唤醒设备，扩展的结果才是任务结果
    async fn run_extension(
        &self,
        task: &TestTask,
        report: &mut ExecutionReport,
        config: AppRunnerConfig,
        device: &Device,
    ) {
        let extension_logs = Arc::new(Logs::new(&task.log_directory));
        report.extension_logs = Some(Arc::clone(&extension_logs));

        let device_name = config.target_device_name().to_string();
        let runner = match self.runners.create(config) {
            Ok(runner) => runner,
            Err(e) => {
                report.fail(format!("Could not create the extension runner: {}", e));
                return;
            }
        };

        let log = create_log(
            &extension_logs,
            &format!("extension-run-{}.log", device.udid),
            "Extension run log",
        );
        let outcome = self
            .run_app(runner.as_ref(), &extension_logs, &log, &device_name)
            .await;

        extension_logs.rewrite_descriptions(extension_description);
        report.result = outcome.result;
        if outcome.failure_message.is_some() {
            report.failure_message = outcome.failure_message;
        }
    }
}
