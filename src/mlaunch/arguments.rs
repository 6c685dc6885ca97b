use std::path::PathBuf;

/// mlaunch 命令行参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MlaunchArgument {
    SdkRoot(PathBuf),
    DeviceName(String),
    /// 把设备列表写入指定文件
    ListDevices(PathBuf),
    ListExtraData,
    OutputFormatJson,
    /// 把崩溃报告标识写入指定文件，每行一个
    ListCrashReports(PathBuf),
    DownloadCrashReport(String),
    DownloadCrashReportTo(PathBuf),
    InstallDev(PathBuf),
    UninstallDevBundleId(String),
    LaunchDev(PathBuf),
    WaitForExit,
    Verbose,
}

impl MlaunchArgument {
    fn push_to(&self, args: &mut Vec<String>) {
        match self {
            MlaunchArgument::SdkRoot(path) => {
                args.push("--sdkroot".into());
                args.push(path.display().to_string());
            }
            MlaunchArgument::DeviceName(name) => {
                args.push("--devname".into());
                args.push(name.clone());
            }
            MlaunchArgument::ListDevices(path) => {
                args.push(format!("--listdev={}", path.display()));
            }
            MlaunchArgument::ListExtraData => args.push("--list-extra-data".into()),
            MlaunchArgument::OutputFormatJson => args.push("--output-format=json".into()),
            MlaunchArgument::ListCrashReports(path) => {
                args.push(format!("--list-crash-reports={}", path.display()));
            }
            MlaunchArgument::DownloadCrashReport(id) => {
                args.push(format!("--download-crash-report={}", id));
            }
            MlaunchArgument::DownloadCrashReportTo(path) => {
                args.push(format!("--download-crash-report-to={}", path.display()));
            }
            MlaunchArgument::InstallDev(path) => {
                args.push("--installdev".into());
                args.push(path.display().to_string());
            }
            MlaunchArgument::UninstallDevBundleId(bundle_id) => {
                args.push("--uninstalldevbundleid".into());
                args.push(bundle_id.clone());
            }
            MlaunchArgument::LaunchDev(path) => {
                args.push("--launchdev".into());
                args.push(path.display().to_string());
            }
            MlaunchArgument::WaitForExit => args.push("--wait-for-exit:true".into()),
            MlaunchArgument::Verbose => args.push("-v".into()),
        }
    }
}

/// 有序的 mlaunch 参数列表
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MlaunchArguments(Vec<MlaunchArgument>);

impl MlaunchArguments {
    pub fn new(args: impl IntoIterator<Item = MlaunchArgument>) -> Self {
        Self(args.into_iter().collect())
    }

    pub fn push(&mut self, arg: MlaunchArgument) {
        self.0.push(arg);
    }

    /// 有设备名时追加 `--devname`
    pub fn push_device_name(&mut self, device_name: Option<&str>) {
        if let Some(name) = device_name.filter(|n| !n.is_empty()) {
            self.push(MlaunchArgument::DeviceName(name.to_string()));
        }
    }

    /// 渲染为 argv
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for arg in &self.0 {
            arg.push_to(&mut args);
        }
        args
    }
}
