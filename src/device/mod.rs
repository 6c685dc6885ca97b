//! 设备模块
//!
//! 设备类型、带租约的设备资源池以及设备列表加载

mod loader;
mod pool;
mod types;

pub use loader::{DeviceLoader, MlaunchDeviceLoader};
pub use pool::{DeviceLease, DeviceResourcePool};
pub use types::{
    target_for, Device, DevicePlatform, DevicePoolError, DevicePoolEvent, ResourceInfo,
    TestPlatform, TestTarget,
};
