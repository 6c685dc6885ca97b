//! 构建产物清理

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::error::Result;

/// 构建清理 trait
#[async_trait]
pub trait BuildCleaner: Send + Sync {
    /// 删除构建产物
    async fn clean(&self) -> Result<()>;
}

/// 删除项目目录下的 `bin` 和 `obj`
#[derive(Debug, Clone)]
pub struct ProjectCleaner {
    project_dir: PathBuf,
}

impl ProjectCleaner {
    const OUTPUT_DIRECTORIES: [&'static str; 2] = ["bin", "obj"];

    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
        }
    }
}

#[async_trait]
impl BuildCleaner for ProjectCleaner {
    async fn clean(&self) -> Result<()> {
        for name in Self::OUTPUT_DIRECTORIES {
            let dir = self.project_dir.join(name);
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => info!("已删除构建目录: {}", dir.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!("构建目录不存在: {}", dir.display());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_removes_bin_and_obj_only() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["bin/Debug", "obj/Debug", "src"] {
            std::fs::create_dir_all(dir.path().join(name)).unwrap();
        }
        std::fs::write(dir.path().join("bin/Debug/app.dll"), "x").unwrap();

        ProjectCleaner::new(dir.path()).clean().await.unwrap();

        assert!(!dir.path().join("bin").exists());
        assert!(!dir.path().join("obj").exists());
        assert!(dir.path().join("src").exists());
    }

    #[tokio::test]
    async fn test_missing_output_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ProjectCleaner::new(dir.path()).clean().await.is_ok());
    }
}
