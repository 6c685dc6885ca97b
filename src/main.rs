mod build;
mod config;
mod crash;
mod device;
mod error;
mod logger;
mod mlaunch;
mod orchestrator;
mod process;
mod reporting;
mod runner;

#[cfg(test)]
mod testing;

use anyhow::Context;
use futures::future::join_all;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use config::HarnessConfig;
use crash::CrashSnapshotReporterFactory;
use device::{DeviceLoader, DevicePoolEvent, DeviceResourcePool, MlaunchDeviceLoader};
use logger::Logs;
use mlaunch::{default_scratch_provider, DeviceControl};
use orchestrator::{
    ExecutionReport, ExecutionSettings, ExecutionState, TestExecutionOrchestrator, TestTask,
};
use process::{ProcessManager, TokioProcessManager};
use reporting::XmlResultReporter;
use runner::{ExecutionResult, MlaunchAppRunnerFactory, RunnerTimeouts};

/// 默认配置文件
const DEFAULT_CONFIG: &str = "device-runner.toml";

/// 每个任务的结果摘要
#[derive(Serialize)]
struct TaskSummary {
    task: String,
    device: Option<String>,
    companion: Option<String>,
    result: ExecutionResult,
    failure_message: Option<String>,
    states: Vec<ExecutionState>,
    logs: Vec<PathBuf>,
}

impl From<&ExecutionReport> for TaskSummary {
    fn from(report: &ExecutionReport) -> Self {
        let mut logs: Vec<PathBuf> = report
            .logs
            .files()
            .iter()
            .map(|f| f.path().to_path_buf())
            .collect();
        if let Some(extension_logs) = &report.extension_logs {
            logs.extend(extension_logs.files().iter().map(|f| f.path().to_path_buf()));
        }

        Self {
            task: report.task_name.clone(),
            device: report.device.as_ref().map(ToString::to_string),
            companion: report.companion.as_ref().map(ToString::to_string),
            result: report.result,
            failure_message: report.failure_message.clone(),
            states: report.states.clone(),
            logs,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let first = args.next();

    // `--init [path]` 写出默认配置后退出
    if first.as_deref() == Some("--init") {
        let path = args.next().unwrap_or_else(|| DEFAULT_CONFIG.to_string());
        HarnessConfig::default()
            .save_to_file(&path)
            .with_context(|| format!("写入默认配置失败: {}", path))?;
        println!("默认配置已写入 {}", path);
        return Ok(());
    }

    let config_path = first
        .or_else(|| std::env::var("DEVICE_RUNNER_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());

    let config = HarnessConfig::from_file_with_env(&config_path)
        .with_context(|| format!("加载配置失败: {}", config_path))?;

    // 初始化日志系统，guard 需要一直持有
    let _guard = logger::init_tracing(Some(config.log_directory.as_path()));
    info!("启动 device-runner，配置文件: {}", config_path);

    let process_manager: Arc<dyn ProcessManager> = Arc::new(TokioProcessManager::new());
    let control = Arc::new(DeviceControl::new(
        process_manager,
        &config.mlaunch_path,
        &config.xcode_root,
    )?);
    let scratch = default_scratch_provider();

    let harness_logs = Logs::new(&config.log_directory);
    let device_load_log = harness_logs
        .create("device-load.log", "Device load log", true)
        .context("创建设备加载日志失败")?;

    let loader = Arc::new(MlaunchDeviceLoader::new(
        Arc::clone(&control),
        Arc::clone(&scratch),
    ));
    let devices = if config.devices.is_empty() {
        loader
            .load_devices(&device_load_log)
            .await
            .context("列出设备失败")?
    } else {
        config.devices.clone()
    };
    if devices.is_empty() {
        anyhow::bail!("没有可用的设备");
    }
    for device in &devices {
        info!("设备已注册: {}", device);
    }

    let pool = Arc::new(DeviceResourcePool::new(&devices));
    for resource in pool.resources() {
        debug!(
            device = %resource.name,
            max_concurrent_users = resource.max_concurrent_users,
            "设备资源就绪"
        );
    }

    let mut events = pool.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(DevicePoolEvent::LeaseAcquired { device, users }) => {
                    debug!(device = %device, users, "设备池事件: 获取")
                }
                Ok(DevicePoolEvent::LeaseReleased { device, users }) => {
                    debug!(device = %device, users, "设备池事件: 释放")
                }
                Err(RecvError::Lagged(skipped)) => warn!("设备池事件丢失 {} 条", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let orchestrator = TestExecutionOrchestrator::new(
        Arc::clone(&pool),
        loader,
        Arc::new(MlaunchAppRunnerFactory::new(
            Arc::clone(&control),
            RunnerTimeouts::from_config(&config),
        )),
        Arc::new(CrashSnapshotReporterFactory::new(control, scratch)),
        Arc::new(XmlResultReporter::new()),
        ExecutionSettings::from_config(&config),
        device_load_log,
    );

    let tasks: Vec<TestTask> = config
        .tasks
        .iter()
        .map(|task| TestTask::from_config(task, &devices, &config.log_directory))
        .collect();
    info!("共 {} 个任务", tasks.len());

    let reports = join_all(tasks.into_iter().map(|task| orchestrator.run(task))).await;

    info!("设备租约共释放 {} 次", pool.release_count());

    let summaries: Vec<TaskSummary> = reports.iter().map(TaskSummary::from).collect();
    println!("{}", serde_json::to_string_pretty(&summaries)?);

    let failed = reports.iter().filter(|report| !report.succeeded()).count();
    if failed > 0 {
        error!("{} 个任务失败", failed);
        anyhow::bail!("{} of {} tasks failed", failed, reports.len());
    }

    info!("所有任务都已成功");
    Ok(())
}
