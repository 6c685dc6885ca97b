//! 设备列表加载

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::types::Device;
use crate::error::{AppError, Result};
use crate::logger::LogFile;
use crate::mlaunch::{DeviceControl, ScratchFile, ScratchProvider};

/// 设备加载器 trait
#[async_trait]
pub trait DeviceLoader: Send + Sync {
    /// 列出已连接的设备
    async fn load_devices(&self, log: &LogFile) -> Result<Vec<Device>>;

    /// 查找手表类设备配对的手机
    async fn find_companion_device(&self, log: &LogFile, device: &Device) -> Result<Device>;
}

/// 通过 mlaunch 列出设备
pub struct MlaunchDeviceLoader {
    control: Arc<DeviceControl>,
    scratch: ScratchProvider,
    /// 首次加载后的缓存
    devices: RwLock<Option<Vec<Device>>>,
}

impl MlaunchDeviceLoader {
    pub fn new(control: Arc<DeviceControl>, scratch: ScratchProvider) -> Self {
        Self {
            control,
            scratch,
            devices: RwLock::new(None),
        }
    }

    async fn list(&self, log: &LogFile) -> Result<Vec<Device>> {
        let scratch = ScratchFile::new((self.scratch)());
        let result = self.control.list_devices(scratch.path(), log).await?;
        if !result.succeeded() {
            return Err(AppError::Process(format!(
                "列出设备失败，退出码: {}",
                result.exit_code_text()
            )));
        }

        let content = tokio::fs::read_to_string(scratch.path()).await?;
        let devices: Vec<Device> = serde_json::from_str(&content)?;
        info!("发现 {} 台设备", devices.len());
        Ok(devices)
    }
}

#[async_trait]
impl DeviceLoader for MlaunchDeviceLoader {
    async fn load_devices(&self, log: &LogFile) -> Result<Vec<Device>> {
        if let Some(devices) = self.devices.read().await.as_ref() {
            debug!("复用已加载的设备列表");
            return Ok(devices.clone());
        }

        let devices = self.list(log).await?;
        *self.devices.write().await = Some(devices.clone());
        Ok(devices)
    }

    async fn find_companion_device(&self, log: &LogFile, device: &Device) -> Result<Device> {
        let companion_udid = device
            .companion_udid
            .as_deref()
            .ok_or_else(|| AppError::CompanionNotFound(device.udid.clone()))?;

        self.load_devices(log)
            .await?
            .into_iter()
            .find(|candidate| candidate.udid == companion_udid)
            .ok_or_else(|| AppError::CompanionNotFound(device.udid.clone()))
    }
}
