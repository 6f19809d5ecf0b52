use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Side record written after a contract deployment. Nothing in the voting
/// session reads it; the interaction tooling does.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub address: String,
    pub transaction_hash: String,
    pub network: String,
    #[serde(default)]
    pub chain_id: Option<u64>,
    pub deployed_at_epoch_ms: u128,
    pub candidates: Vec<String>,
}

#[async_trait]
pub trait DeploymentStore: Send + Sync {
    async fn save_deployment(&self, record: &DeploymentRecord) -> Result<()>;
    async fn load_deployment(&self) -> Result<Option<DeploymentRecord>>;
}

#[derive(Default)]
pub struct InMemoryDeploymentStore {
    record: RwLock<Option<DeploymentRecord>>,
}

#[async_trait]
impl DeploymentStore for InMemoryDeploymentStore {
    async fn save_deployment(&self, record: &DeploymentRecord) -> Result<()> {
        let mut guard = self.record.write().await;
        *guard = Some(record.clone());
        Ok(())
    }

    async fn load_deployment(&self) -> Result<Option<DeploymentRecord>> {
        let guard = self.record.read().await;
        Ok(guard.clone())
    }
}

/// Pretty-printed JSON file, `deployment.json` by convention.
pub struct JsonFileDeploymentStore {
    path: PathBuf,
}

impl JsonFileDeploymentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DeploymentStore for JsonFileDeploymentStore {
    async fn save_deployment(&self, record: &DeploymentRecord) -> Result<()> {
        let body = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(&self.path, body)
            .await
            .with_context(|| format!("failed to write deployment record {}", self.path.display()))?;
        Ok(())
    }

    async fn load_deployment(&self) -> Result<Option<DeploymentRecord>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read deployment record {}", self.path.display()));
            }
        };
        let record = serde_json::from_slice::<DeploymentRecord>(&raw)
            .with_context(|| format!("malformed deployment record {}", self.path.display()))?;
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DeploymentRecord {
        DeploymentRecord {
            address: "0xafD7BD6ba24b94bF45d0C09C6D87890F5ad3feBB".to_owned(),
            transaction_hash: "0x01".to_owned(),
            network: "http://127.0.0.1:7545".to_owned(),
            chain_id: Some(1337),
            deployed_at_epoch_ms: 1_700_000_000_000,
            candidates: vec!["Alice Johnson".to_owned(), "Bob Smith".to_owned()],
        }
    }

    #[tokio::test]
    async fn file_store_persists_record() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = JsonFileDeploymentStore::new(dir.path().join("deployment.json"));

        assert!(store.load_deployment().await?.is_none());

        store.save_deployment(&sample()).await?;
        let loaded = store.load_deployment().await?.expect("record should exist");
        assert_eq!(loaded, sample());

        let raw = std::fs::read_to_string(store.path())?;
        assert!(raw.contains("\"transactionHash\""));
        assert!(raw.contains("\"deployedAtEpochMs\""));
        Ok(())
    }

    #[tokio::test]
    async fn malformed_file_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("deployment.json");
        std::fs::write(&path, b"{not json")?;

        let store = JsonFileDeploymentStore::new(path);
        assert!(store.load_deployment().await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn memory_store_overwrites() -> Result<()> {
        let store = InMemoryDeploymentStore::default();
        store.save_deployment(&sample()).await?;

        let mut newer = sample();
        newer.address = "0x2345678901234567890123456789012345678901".to_owned();
        store.save_deployment(&newer).await?;

        assert_eq!(store.load_deployment().await?, Some(newer));
        Ok(())
    }
}
