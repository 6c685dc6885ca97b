use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

/// 日志产物：带描述的日志文件
///
/// 克隆开销很小，所有克隆共享同一个文件句柄。
#[derive(Clone)]
pub struct LogFile {
    path: PathBuf,
    description: String,
    file_handle: Arc<Mutex<Option<File>>>,
}

impl LogFile {
    pub(crate) fn new(path: PathBuf, description: impl Into<String>) -> Self {
        Self {
            path,
            description: description.into(),
            file_handle: Arc::new(Mutex::new(None)),
        }
    }

    /// 文件完整路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 文件名（不含目录）
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// 返回共享同一文件、但描述不同的副本
    pub(crate) fn with_description(&self, description: impl Into<String>) -> Self {
        Self {
            path: self.path.clone(),
            description: description.into(),
            file_handle: Arc::clone(&self.file_handle),
        }
    }

    /// 写入原始字节（不加时间戳），用于保存外部进程输出
    pub fn write_raw(&self, bytes: &[u8]) -> io::Result<()> {
        let mut guard = self
            .file_handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // 如果文件句柄不存在则以追加方式打开
        if guard.is_none() {
            *guard = Some(OpenOptions::new().create(true).append(true).open(&self.path)?);
        }

        match guard.as_mut() {
            Some(file) => {
                file.write_all(bytes)?;
                file.flush()
            }
            None => Ok(()),
        }
    }

    /// 写入一行带时间戳的日志，同时转发到 tracing
    pub fn write_line(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let line = format!("{} {}\n", timestamp, message);

        if let Err(e) = self.write_raw(line.as_bytes()) {
            tracing::warn!(log = %self.path.display(), "写入日志文件失败: {:?}", e);
        }
        tracing::debug!(log = %self.file_name(), "{}", message);
    }

    /// 读取日志全部内容
    pub fn read_to_string(&self) -> io::Result<String> {
        let bytes = std::fs::read(&self.path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl std::fmt::Debug for LogFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogFile")
            .field("path", &self.path)
            .field("description", &self.description)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_line_appends() {
        let dir = tempfile::tempdir().unwrap();
        let log = LogFile::new(dir.path().join("main.log"), "Main log");

        log.write_line("first");
        log.write_line("second");

        let content = log.read_to_string().unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" first"));
        assert!(lines[1].ends_with(" second"));
    }

    #[test]
    fn test_clones_share_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = LogFile::new(dir.path().join("shared.log"), "Shared");
        let renamed = log.with_description("Renamed");

        log.write_raw(b"a").unwrap();
        renamed.write_raw(b"b").unwrap();

        assert_eq!(renamed.description(), "Renamed");
        assert_eq!(log.read_to_string().unwrap(), "ab");
    }
}
