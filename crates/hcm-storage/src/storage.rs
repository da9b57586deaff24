//! 文档存储管理
//!
//! 存储路径由内容的SHA-256摘要导出（前两级目录分片 + 完整摘要），
//! 相同内容天然去重，路径本身可作为完整性校验依据。

use async_trait::async_trait;
use hcm_core::{HcmError, Result};
use object_store::{aws::AmazonS3Builder, path::Path as ObjectPath, ObjectStore};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;

/// 由文档内容导出存储路径
pub fn content_address(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let hex: String = digest.iter().map(|byte| format!("{:02x}", byte)).collect();
    format!("{}/{}/{}", &hex[0..2], &hex[2..4], hex)
}

/// 文档存储接口
#[async_trait]
pub trait DocumentStorage: Send + Sync {
    /// 存储文档，返回内容寻址路径
    async fn store(&self, data: &[u8]) -> Result<String>;

    /// 读取文档
    async fn retrieve(&self, path: &str) -> Result<Vec<u8>>;

    /// 删除文档
    async fn delete(&self, path: &str) -> Result<()>;
}

/// 本地文件系统存储
pub struct LocalDocumentStorage {
    base_path: String,
}

impl LocalDocumentStorage {
    pub fn new(base_path: &str) -> Self {
        Self {
            base_path: base_path.to_string(),
        }
    }
}

#[async_trait]
impl DocumentStorage for LocalDocumentStorage {
    async fn store(&self, data: &[u8]) -> Result<String> {
        let relative = content_address(data);
        let full_path = Path::new(&self.base_path).join(&relative);

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full_path, data).await?;

        tracing::debug!("Stored document at {}", relative);
        Ok(relative)
    }

    async fn retrieve(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = Path::new(&self.base_path).join(path);
        let data = tokio::fs::read(full_path).await?;
        Ok(data)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = Path::new(&self.base_path).join(path);
        tokio::fs::remove_file(full_path).await?;
        Ok(())
    }
}

/// S3对象存储
pub struct S3DocumentStorage {
    store: Arc<dyn ObjectStore>,
}

impl S3DocumentStorage {
    pub fn new(bucket: &str, region: &str) -> Result<Self> {
        let store = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .with_region(region)
            .build()
            .map_err(|e| HcmError::Storage(e.to_string()))?;

        Ok(Self {
            store: Arc::new(store),
        })
    }
}

#[async_trait]
impl DocumentStorage for S3DocumentStorage {
    async fn store(&self, data: &[u8]) -> Result<String> {
        let relative = content_address(data);
        let object_path = ObjectPath::from(relative.as_str());

        self.store
            .put(&object_path, data.to_vec().into())
            .await
            .map_err(|e| HcmError::Storage(e.to_string()))?;

        tracing::debug!("Stored document at s3://{}", relative);
        Ok(relative)
    }

    async fn retrieve(&self, path: &str) -> Result<Vec<u8>> {
        let object_path = ObjectPath::from(path);
        let result = self
            .store
            .get(&object_path)
            .await
            .map_err(|e| HcmError::Storage(e.to_string()))?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| HcmError::Storage(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let object_path = ObjectPath::from(path);
        self.store
            .delete(&object_path)
            .await
            .map_err(|e| HcmError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_address_is_stable_and_sharded() {
        let first = content_address(b"lab report");
        let second = content_address(b"lab report");
        let other = content_address(b"different report");

        assert_eq!(first, second);
        assert_ne!(first, other);

        let parts: Vec<&str> = first.split('/').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 2);
        assert_eq!(parts[1].len(), 2);
        assert_eq!(parts[2].len(), 64);
        assert!(parts[2].starts_with(parts[0]));
    }

    #[tokio::test]
    async fn test_local_storage_roundtrip() {
        let suffix = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let base = std::env::temp_dir().join(format!("hcm-storage-{}-{}", std::process::id(), suffix));
        let storage = LocalDocumentStorage::new(base.to_str().unwrap());

        let path = storage.store(b"scan data").await.unwrap();
        assert_eq!(storage.retrieve(&path).await.unwrap(), b"scan data");

        storage.delete(&path).await.unwrap();
        assert!(storage.retrieve(&path).await.is_err());

        tokio::fs::remove_dir_all(base).await.ok();
    }
}
