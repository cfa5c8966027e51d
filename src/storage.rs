//! 结果存储模块
//!
//! 翻译结果通过 `ObjectStorage` 写出，命令行使用本地目录实现。

// 标准库导入
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

// 第三方crate导入
use async_trait::async_trait;
use tracing::info;
use url::Url;

// 本地模块导入
use crate::error::{Result, TranslationError};
use crate::utils::resource_output_path;

/// 对象存储接口
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// 写入对象，返回可访问的位置
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;
}

/// 本地目录存储
pub struct LocalDirectoryStorage {
    root: PathBuf,
}

impl LocalDirectoryStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ObjectStorage for LocalDirectoryStorage {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        let path = resource_output_path(&self.root, key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &bytes).await?;

        let absolute = if path.is_absolute() {
            path
        } else {
            std::env::current_dir()?.join(path)
        };
        let location = Url::from_file_path(&absolute)
            .map(|url| url.to_string())
            .map_err(|_| TranslationError::Storage(format!("无效的存储路径: {}", absolute.display())))?;

        info!("💾 已保存 {} ({} 字节, {})", location, bytes.len(), content_type);
        Ok(location)
    }
}

/// 内存存储，主要用于测试与嵌入式调用
#[derive(Default)]
pub struct InMemoryStorage {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取对象内容与内容类型
    pub fn get(&self, key: &str) -> Option<(Vec<u8>, String)> {
        self.objects.lock().ok()?.get(key).cloned()
    }

    /// 已存储对象数量
    pub fn len(&self) -> usize {
        self.objects.lock().map(|objects| objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStorage for InMemoryStorage {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| TranslationError::Storage("存储锁已损坏".to_string()))?;
        objects.insert(key.to_string(), (bytes, content_type.to_string()));
        Ok(format!("memory://{}", key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_directory_storage_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalDirectoryStorage::new(dir.path());

        let location = storage
            .put("jobs/7/translated-site.zip", b"PK".to_vec(), "application/zip")
            .await
            .unwrap();

        let written = dir.path().join("jobs").join("7").join("translated-site.zip");
        assert_eq!(std::fs::read(&written).unwrap(), b"PK");
        assert!(location.starts_with("file://"));
        assert!(location.ends_with("jobs/7/translated-site.zip"));
    }

    #[tokio::test]
    async fn test_in_memory_storage() {
        let storage = InMemoryStorage::new();
        assert!(storage.is_empty());

        let location = storage.put("a/b.zip", vec![1, 2, 3], "application/zip").await.unwrap();
        assert_eq!(location, "memory://a/b.zip");
        assert_eq!(
            storage.get("a/b.zip"),
            Some((vec![1, 2, 3], "application/zip".to_string()))
        );
        assert_eq!(storage.len(), 1);
    }
}
