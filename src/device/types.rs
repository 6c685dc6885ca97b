//! 设备相关的类型定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// 设备平台
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePlatform {
    Ios,
    Tvos,
    Watchos,
    #[serde(other)]
    Unknown,
}

/// 一台物理设备
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// 设备 UDID
    pub udid: String,

    /// 显示名称
    pub name: String,

    /// 设备平台
    pub platform: DevicePlatform,

    /// 配套设备（手表配对的手机）的 UDID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub companion_udid: Option<String>,
}

impl Device {
    pub fn new(udid: impl Into<String>, name: impl Into<String>, platform: DevicePlatform) -> Self {
        Self {
            udid: udid.into(),
            name: name.into(),
            platform,
            companion_udid: None,
        }
    }

    /// 手表类设备需要配套设备才能安装和运行
    pub fn requires_companion(&self) -> bool {
        self.platform == DevicePlatform::Watchos
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.udid)
    }
}

/// 测试应用的构建平台
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestPlatform {
    #[serde(rename = "iOS")]
    Ios,
    #[serde(rename = "iOS_Unified")]
    IosUnified,
    #[serde(rename = "iOS_Unified32")]
    IosUnified32,
    #[serde(rename = "iOS_Unified64")]
    IosUnified64,
    #[serde(rename = "iOS_TodayExtension64")]
    IosTodayExtension64,
    #[serde(rename = "tvOS")]
    TvOS,
    #[serde(rename = "watchOS")]
    WatchOS,
    #[serde(rename = "watchOS_32")]
    WatchOS32,
    #[serde(rename = "watchOS_64_32")]
    WatchOS6432,
    #[serde(rename = "Mac")]
    Mac,
    #[serde(rename = "MacCatalyst")]
    MacCatalyst,
}

impl TestPlatform {
    /// Today 扩展需要先运行主应用，再运行扩展
    pub fn is_today_extension(self) -> bool {
        self == TestPlatform::IosTodayExtension64
    }

    /// 该平台对应的设备平台；非设备平台返回 None
    pub fn device_platform(self) -> Option<DevicePlatform> {
        target_for(self).map(TestTarget::device_platform)
    }
}

/// 运行目标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestTarget {
    #[serde(rename = "Device_iOS")]
    DeviceIos,
    #[serde(rename = "Device_tvOS")]
    DeviceTvos,
    #[serde(rename = "Device_watchOS")]
    DeviceWatchos,
}

impl TestTarget {
    pub fn device_platform(self) -> DevicePlatform {
        match self {
            TestTarget::DeviceIos => DevicePlatform::Ios,
            TestTarget::DeviceTvos => DevicePlatform::Tvos,
            TestTarget::DeviceWatchos => DevicePlatform::Watchos,
        }
    }
}

impl fmt::Display for TestTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TestTarget::DeviceIos => "Device_iOS",
            TestTarget::DeviceTvos => "Device_tvOS",
            TestTarget::DeviceWatchos => "Device_watchOS",
        };
        f.write_str(name)
    }
}

/// 平台到运行目标的映射；不在表中的平台没有设备目标
const PLATFORM_TARGETS: &[(TestPlatform, TestTarget)] = &[
    (TestPlatform::Ios, TestTarget::DeviceIos),
    (TestPlatform::IosUnified, TestTarget::DeviceIos),
    (TestPlatform::IosUnified32, TestTarget::DeviceIos),
    (TestPlatform::IosUnified64, TestTarget::DeviceIos),
    (TestPlatform::IosTodayExtension64, TestTarget::DeviceIos),
    (TestPlatform::TvOS, TestTarget::DeviceTvos),
    (TestPlatform::WatchOS, TestTarget::DeviceWatchos),
    (TestPlatform::WatchOS32, TestTarget::DeviceWatchos),
    (TestPlatform::WatchOS6432, TestTarget::DeviceWatchos),
];

/// 查找平台对应的设备运行目标
pub fn target_for(platform: TestPlatform) -> Option<TestTarget> {
    PLATFORM_TARGETS
        .iter()
        .find(|(p, _)| *p == platform)
        .map(|(_, target)| *target)
}

/// 设备池事件
#[derive(Debug, Clone)]
pub enum DevicePoolEvent {
    /// 租约已获取
    LeaseAcquired { device: String, users: usize },

    /// 租约已释放
    LeaseReleased { device: String, users: usize },
}

/// 单个设备资源的当前占用情况
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub name: String,
    pub max_concurrent_users: usize,
    pub users: usize,
}

/// 设备池错误
#[derive(Debug, thiserror::Error)]
pub enum DevicePoolError {
    #[error("没有候选设备")]
    NoCandidates,

    #[error("候选设备都不在设备池中: {0}")]
    NoMatchingDevice(String),

    #[error("等待空闲设备超时 ({0:?})")]
    Timeout(std::time::Duration),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_target_table() {
        assert_eq!(target_for(TestPlatform::Ios), Some(TestTarget::DeviceIos));
        assert_eq!(target_for(TestPlatform::IosUnified32), Some(TestTarget::DeviceIos));
        assert_eq!(
            target_for(TestPlatform::IosTodayExtension64),
            Some(TestTarget::DeviceIos)
        );
        assert_eq!(target_for(TestPlatform::TvOS), Some(TestTarget::DeviceTvos));
        assert_eq!(target_for(TestPlatform::WatchOS6432), Some(TestTarget::DeviceWatchos));
        assert_eq!(target_for(TestPlatform::Mac), None);
        assert_eq!(target_for(TestPlatform::MacCatalyst), None);
    }

    #[test]
    fn test_device_platform_parsing() {
        let json = r#"{"udid":"w1","name":"Watch","platform":"watchos","companion_udid":"p1"}"#;
        let device: Device = serde_json::from_str(json).unwrap();
        assert!(device.requires_companion());
        assert_eq!(device.companion_udid.as_deref(), Some("p1"));

        let json = r#"{"udid":"x","name":"X","platform":"visionos"}"#;
        let device: Device = serde_json::from_str(json).unwrap();
        assert_eq!(device.platform, DevicePlatform::Unknown);
    }
}
