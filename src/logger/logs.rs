use std::{
    io,
    path::{Path, PathBuf},
    sync::Mutex,
};

use super::LogFile;

/// 文件名里使用的时间戳
fn timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// 一次执行拥有的日志集合
pub struct Logs {
    directory: PathBuf,
    files: Mutex<Vec<LogFile>>,
}

impl Logs {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            files: Mutex::new(Vec::new()),
        }
    }

    /// 日志目录
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// 在日志目录中创建新的日志文件并加入集合
    ///
    /// `timestamp` 为 true 时在文件名（扩展名之前）追加时间戳。
    pub fn create(&self, name: &str, description: &str, timestamp: bool) -> io::Result<LogFile> {
        std::fs::create_dir_all(&self.directory)?;

        let file_name = if timestamp {
            timestamped_name(name)
        } else {
            name.to_string()
        };
        let log = LogFile::new(self.directory.join(file_name), description);
        // 立即创建文件，外部进程可以直接写入该路径
        log.write_raw(&[])?;

        self.lock().push(log.clone());
        Ok(log)
    }

    /// 登记一个外部进程已经生成的文件
    pub fn add_file(&self, path: impl Into<PathBuf>, description: &str) -> LogFile {
        let log = LogFile::new(path.into(), description);
        self.lock().push(log.clone());
        log
    }

    /// 当前集合中所有日志的快照
    pub fn files(&self) -> Vec<LogFile> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// 批量改写描述；`rewrite` 返回 None 的条目保持不变
    pub fn rewrite_descriptions(&self, rewrite: impl Fn(&str) -> Option<String>) {
        let mut files = self.lock();
        for file in files.iter_mut() {
            if let Some(description) = rewrite(file.description()) {
                *file = file.with_description(description);
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LogFile>> {
        self.files
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for Logs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logs")
            .field("directory", &self.directory)
            .field("files", &self.len())
            .finish()
    }
}

fn timestamped_name(name: &str) -> String {
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    match path.extension() {
        Some(ext) => format!("{}-{}.{}", stem, timestamp(), ext.to_string_lossy()),
        None => format!("{}-{}", stem, timestamp()),
    }
}
