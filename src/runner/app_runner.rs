use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::types::{AppRunnerConfig, ExecutionResult, RunOutcome};
use crate::config::HarnessConfig;
use crate::error::{AppError, Result};
use crate::logger::LogFile;
use crate::mlaunch::DeviceControl;
use crate::process::ProcessResult;

/// 应用运行器 trait
///
/// 每个方法都把外部进程输出写入调用方给出的日志。
#[async_trait]
pub trait AppRunner: Send + Sync {
    /// 应用显示名
    fn app_name(&self) -> &str;

    /// 安装应用，`cancel` 触发时中止
    async fn install(&self, log: &LogFile, cancel: CancellationToken) -> Result<ProcessResult>;

    /// 卸载应用
    async fn uninstall(&self, log: &LogFile) -> Result<ProcessResult>;

    /// 运行应用直到退出
    async fn run(&self, log: &LogFile) -> Result<RunOutcome>;
}

/// 运行器工厂
pub trait AppRunnerFactory: Send + Sync {
    fn create(&self, config: AppRunnerConfig) -> Result<Box<dyn AppRunner>>;
}

/// 各步骤的期限
#[derive(Debug, Clone, Copy)]
pub struct RunnerTimeouts {
    pub install: Duration,
    pub uninstall: Duration,
    pub run: Duration,
}

impl RunnerTimeouts {
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            install: Duration::from_secs(config.install_timeout_secs),
            uninstall: Duration::from_secs(config.uninstall_timeout_secs),
            run: Duration::from_secs(config.run_timeout_secs),
        }
    }
}

impl Default for RunnerTimeouts {
    fn default() -> Self {
        Self::from_config(&HarnessConfig::default())
    }
}

/// 通过 mlaunch 操作真机的运行器
pub struct MlaunchAppRunner {
    control: Arc<DeviceControl>,
    config: AppRunnerConfig,
    timeouts: RunnerTimeouts,
}

impl MlaunchAppRunner {
    pub fn new(
        control: Arc<DeviceControl>,
        config: AppRunnerConfig,
        timeouts: RunnerTimeouts,
    ) -> Result<Self> {
        if config.target.is_none() {
            return Err(AppError::Config(format!(
                "{} 没有可用的设备运行目标",
                config.app_name
            )));
        }
        if config.bundle_id.is_empty() {
            return Err(AppError::Config(format!("{} 缺少 bundle id", config.app_name)));
        }

        Ok(Self {
            control,
            config,
            timeouts,
        })
    }

    fn run_timeout(&self) -> Duration {
        self.timeouts.run.mul_f64(self.config.timeout_multiplier.max(0.0))
    }
}

#[async_trait]
impl AppRunner for MlaunchAppRunner {
    fn app_name(&self) -> &str {
        &self.config.app_name
    }

    async fn install(&self, log: &LogFile, cancel: CancellationToken) -> Result<ProcessResult> {
        let device = self.config.target_device_name();
        info!(device = %device, "安装 {}", self.config.app_name);
        log.write_line(format!(
            "Installing '{}' on '{}'",
            self.config.app_path.display(),
            device
        ));

        self.control
            .install(
                &self.config.app_path,
                device,
                log,
                self.timeouts.install,
                cancel,
            )
            .await
    }

    async fn uninstall(&self, log: &LogFile) -> Result<ProcessResult> {
        let device = self.config.target_device_name();
        debug!(device = %device, "卸载 {}", self.config.bundle_id);
        log.write_line(format!(
            "Uninstalling '{}' from '{}'",
            self.config.bundle_id, device
        ));

        self.control
            .uninstall(&self.config.bundle_id, device, log, self.timeouts.uninstall)
            .await
    }

    async fn run(&self, log: &LogFile) -> Result<RunOutcome> {
        let device = self.config.target_device_name();
        let timeout = self.run_timeout();
        info!(device = %device, "运行 {}", self.config.app_name);
        log.write_line(format!(
            "Running '{}' ({}) on '{}' (timeout: {} seconds)",
            self.config.app_name,
            self.config.variation,
            device,
            timeout.as_secs()
        ));

        let result = self
            .control
            .run(&self.config.app_path, device, log, timeout)
            .await?;

        let outcome = if result.succeeded() {
            RunOutcome::succeeded()
        } else if result.timed_out {
            warn!(device = %device, "运行超时");
            RunOutcome {
                result: ExecutionResult::TimedOut,
                failure_message: Some(format!(
                    "Test run timed out after {} seconds.",
                    timeout.as_secs()
                )),
            }
        } else if result.cancelled {
            RunOutcome::failed(Some("Test run was cancelled.".to_string()))
        } else {
            // 退出码本身不足以说明原因，交给调用方从日志推断
            RunOutcome::failed(None)
        };

        log.write_line(format!(
            "Run finished: {} (exit code: {})",
            outcome.result,
            result.exit_code_text()
        ));
        Ok(outcome)
    }
}

/// 创建 [`MlaunchAppRunner`] 的工厂
pub struct MlaunchAppRunnerFactory {
    control: Arc<DeviceControl>,
    timeouts: RunnerTimeouts,
}

impl MlaunchAppRunnerFactory {
    pub fn new(control: Arc<DeviceControl>, timeouts: RunnerTimeouts) -> Self {
        Self { control, timeouts }
    }
}

impl AppRunnerFactory for MlaunchAppRunnerFactory {
    fn create(&self, config: AppRunnerConfig) -> Result<Box<dyn AppRunner>> {
        let runner = MlaunchAppRunner::new(Arc::clone(&self.control), config, self.timeouts)?;
        Ok(Box::new(runner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::TestTarget;
    use crate::logger::Logs;
    use crate::testing::RecordingProcessManager;
    use std::path::PathBuf;

    fn config() -> AppRunnerConfig {
        AppRunnerConfig {
            target: Some(TestTarget::DeviceWatchos),
            device_name: "Lab Watch".into(),
            companion_device_name: Some("Lab iPhone".into()),
            app_path: PathBuf::from("/builds/watch.app"),
            bundle_id: "com.example.watch".into(),
            app_name: "watch".into(),
            variation: "Debug".into(),
            timeout_multiplier: 2.0,
        }
    }

    fn control(pm: Arc<RecordingProcessManager>) -> Arc<DeviceControl> {
        Arc::new(DeviceControl::new(pm, "/mlaunch", "/Xcode.app").unwrap())
    }

    #[test]
    fn test_unmapped_target_rejected() {
        let pm = Arc::new(RecordingProcessManager::succeeding());
        let factory = MlaunchAppRunnerFactory::new(control(pm), RunnerTimeouts::default());
        let mut config = config();
        config.target = None;

        assert!(matches!(factory.create(config), Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_commands_use_companion_and_timeouts() {
        let dir = tempfile::tempdir().unwrap();
        let logs = Arc::new(Logs::new(dir.path()));
        let log = logs.create("runner.log", "Runner log", false).unwrap();
        let pm = Arc::new(RecordingProcessManager::succeeding());
        let timeouts = RunnerTimeouts {
            install: Duration::from_secs(100),
            uninstall: Duration::from_secs(10),
            run: Duration::from_secs(30),
        };
        let runner = MlaunchAppRunner::new(control(pm.clone()), config(), timeouts).unwrap();

        runner
            .install(&log, CancellationToken::new())
            .await
            .unwrap();
        runner.uninstall(&log).await.unwrap();
        let outcome = runner.run(&log).await.unwrap();
        assert_eq!(outcome, RunOutcome::succeeded());

        let calls = pm.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].arg_after("--installdev"), Some("/builds/watch.app"));
        assert_eq!(calls[0].timeout, Duration::from_secs(100));
        assert_eq!(
            calls[1].arg_after("--uninstalldevbundleid"),
            Some("com.example.watch")
        );
        assert_eq!(calls[2].arg_after("--launchdev"), Some("/builds/watch.app"));
        assert_eq!(calls[2].timeout, Duration::from_secs(60));
        assert!(calls.iter().all(|c| c.arg_after("--devname") == Some("Lab iPhone")));
    }

    #[tokio::test]
    async fn test_run_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let logs = Arc::new(Logs::new(dir.path()));
        let log = logs.create("run.log", "Run log", false).unwrap();

        let cases = [
            (ProcessResult::exited(Some(1)), ExecutionResult::Failed, false),
            (ProcessResult::timed_out(), ExecutionResult::TimedOut, true),
            (ProcessResult::cancelled(), ExecutionResult::Failed, true),
        ];

        for (process_result, expected, has_message) in cases {
            let pm = Arc::new(RecordingProcessManager::with_responder(move |_| {
                Ok(process_result)
            }));
            let runner = MlaunchAppRunner::new(
                control(pm),
                config(),
                RunnerTimeouts::default(),
            )
            .unwrap();

            let outcome = runner.run(&log).await.unwrap();
            assert_eq!(outcome.result, expected);
            assert_eq!(outcome.failure_message.is_some(), has_message);
        }
    }
}
