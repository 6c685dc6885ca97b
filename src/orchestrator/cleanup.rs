//! 作用域退出时的收尾动作
//!
//! 租约获取后立即创建 [`CleanupGuard`]。正常路径调用 [`CleanupGuard::finish`]；
//! future 被丢弃或步骤 panic 时，`Drop` 在当前运行时上补做卸载和清理，
//! 完成后再释放租约。

use std::sync::Arc;
use tracing::{debug, warn};

use super::types::{ExecutionReport, ExecutionState};
use crate::build::BuildCleaner;
use crate::device::DeviceLease;
use crate::logger::LogFile;
use crate::runner::AppRunner;

/// 尽力卸载，失败只记录
pub(super) async fn uninstall_best_effort(
    runner: &dyn AppRunner,
    uninstall_log: &LogFile,
    main_log: &LogFile,
    phase: &str,
    note: &str,
) {
    match runner.uninstall(uninstall_log).await {
        Ok(result) if result.succeeded() => {}
        Ok(result) => main_log.write_line(format!(
            "{} uninstall failed, exit code: {} ({})",
            phase,
            result.exit_code_text(),
            note
        )),
        Err(e) => main_log.write_line(format!("{} uninstall failed: {} ({})", phase, e, note)),
    }
}

/// 收尾需要的全部协作者
#[derive(Clone)]
pub(super) struct CleanupActions {
    pub runner: Option<Arc<dyn AppRunner>>,
    pub cleaner: Option<Arc<dyn BuildCleaner>>,
    pub uninstall_test_app: bool,
    pub clean_successful_test_runs: bool,
    pub in_ci: bool,
    pub uninstall_log: LogFile,
    pub main_log: LogFile,
}

impl CleanupActions {
    async fn post_uninstall(&self) {
        if !self.uninstall_test_app {
            self.uninstall_log.write_line("Post-run uninstall skipped.");
            return;
        }

        match &self.runner {
            Some(runner) => {
                uninstall_best_effort(
                    runner.as_ref(),
                    &self.uninstall_log,
                    &self.main_log,
                    "Post-run",
                    "this won't affect the test result",
                )
                .await
            }
            // 运行器都没有建立，设备上不会有残留
            None => debug!("没有运行器，跳过运行后卸载"),
        }
    }

    async fn clean(&self, succeeded: bool) {
        if !(self.in_ci || (self.clean_successful_test_runs && succeeded)) {
            return;
        }

        if let Some(cleaner) = &self.cleaner {
            if let Err(e) = cleaner.clean().await {
                self.main_log
                    .write_line(format!("Build cleanup failed: {}", e));
            }
        }
    }
}

/// 持有租约的收尾守卫
pub(super) struct CleanupGuard {
    lease: Option<DeviceLease>,
    actions: CleanupActions,
}

impl CleanupGuard {
    pub fn new(lease: DeviceLease, actions: CleanupActions) -> Self {
        Self {
            lease: Some(lease),
            actions,
        }
    }

    /// 已绑定设备的 UDID
    pub fn device_udid(&self) -> Option<&str> {
        self.lease.as_ref().map(DeviceLease::name)
    }

    pub fn attach_runner(&mut self, runner: Arc<dyn AppRunner>) {
        self.actions.runner = Some(runner);
    }

    /// 运行后卸载、按需清理，最后释放租约
    ///
    /// 租约先从守卫中取出，`Drop` 不会再补做收尾；这个 future 中途被丢弃时
    /// 租约随之释放。
    pub async fn finish(mut self, report: &mut ExecutionReport) {
        let lease = self.lease.take();

        report.enter(ExecutionState::PostUninstall);
        self.actions.post_uninstall().await;

        report.enter(ExecutionState::Cleanup);
        self.actions.clean(report.result.succeeded()).await;

        if let Some(lease) = lease {
            lease.release();
        }
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let Some(lease) = self.lease.take() else {
            return;
        };

        warn!(device = %lease.name(), "执行被中断，后台完成收尾后释放设备");
        let actions = self.actions.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    actions.post_uninstall().await;
                    actions.clean(false).await;
                    drop(lease);
                });
            }
            // 没有运行时只能直接释放
            Err(_) => drop(lease),
        }
    }
}
