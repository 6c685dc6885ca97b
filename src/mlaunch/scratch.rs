use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// 生成临时输出文件路径
pub type ScratchProvider = Arc<dyn Fn() -> PathBuf + Send + Sync>;

/// 默认在系统临时目录下生成唯一文件名
pub fn default_scratch_provider() -> ScratchProvider {
    Arc::new(|| std::env::temp_dir().join(format!("mlaunch-{}.tmp", Uuid::new_v4())))
}

/// 临时输出文件，drop 时无条件删除
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        // 列表命令失败时文件可能根本不存在
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.txt");
        std::fs::write(&path, "a\nb\n").unwrap();

        {
            let scratch = ScratchFile::new(path.clone());
            assert!(scratch.path().exists());
        }

        assert!(!path.exists());
    }

    #[test]
    fn test_default_provider_is_unique() {
        let provider = default_scratch_provider();
        assert_ne!(provider(), provider());
    }
}
