//! Media Store
//!
//! Almacenamiento direccionado por ruta para blobs de audio, imágenes y
//! documentos. Cada clave se escribe una sola vez y se lee muchas veces.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::document::{DocumentFormat, DocumentType};
use crate::models::media::ArtifactKind;

#[derive(Debug, Error)]
pub enum MediaStoreError {
    #[error("media key '{0}' already exists")]
    AlreadyExists(String),
    #[error("media key '{0}' not found")]
    NotFound(String),
    #[error("invalid media key '{0}'")]
    InvalidKey(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resultado de una escritura
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMedia {
    pub key: String,
    pub digest: String,
    pub size: u64,
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Escribir un blob nuevo. Falla con `AlreadyExists` si la clave existe.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<StoredMedia, MediaStoreError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, MediaStoreError>;

    /// Borrado best-effort usado al eliminar órdenes en cascada
    async fn remove(&self, key: &str) -> Result<(), MediaStoreError>;
}

/// Digest md5 en hexadecimal
pub fn content_digest(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}

/// Extensión de archivo a partir del nombre original
pub fn file_extension(file_name: &str, fallback: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| fallback.to_string())
}

/// Clave de un artefacto de intake: `audio/<order>_<artifact>.<ext>`
pub fn artifact_key(order_id: Uuid, artifact_id: Uuid, kind: ArtifactKind, extension: &str) -> String {
    match kind {
        ArtifactKind::Audio => format!("{}/{}_{}.{}", kind.folder(), order_id, artifact_id, extension),
        ArtifactKind::VinImage => format!("{}/{}_{}_vin.{}", kind.folder(), order_id, artifact_id, extension),
        ArtifactKind::OdometerImage => {
            format!("{}/{}_{}_odometer.{}", kind.folder(), order_id, artifact_id, extension)
        }
    }
}

/// Clave de un documento generado. Incluye el id del documento, así que
/// regenerar nunca pisa un documento anterior.
pub fn document_key(
    order_id: Uuid,
    document_id: Uuid,
    document_type: DocumentType,
    format: DocumentFormat,
) -> String {
    format!(
        "documents/{}/{}_{}.{}",
        order_id,
        document_type.as_str(),
        document_id,
        format.extension()
    )
}

fn check_key(key: &str) -> Result<(), MediaStoreError> {
    let path = Path::new(key);
    let safe = !key.is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)));

    if safe {
        Ok(())
    } else {
        Err(MediaStoreError::InvalidKey(key.to_string()))
    }
}

/// Implementación sobre el sistema de archivos
pub struct FileSystemMediaStore {
    root: PathBuf,
}

impl FileSystemMediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, MediaStoreError> {
        check_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl MediaStore for FileSystemMediaStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<StoredMedia, MediaStoreError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(MediaStoreError::AlreadyExists(key.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        file.write_all(bytes).await?;
        file.flush().await?;

        tracing::debug!("💾 Media guardada: {} ({} bytes)", key, bytes.len());

        Ok(StoredMedia {
            key: key.to_string(),
            digest: content_digest(bytes),
            size: bytes.len() as u64,
        })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, MediaStoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(MediaStoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, key: &str) -> Result<(), MediaStoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Implementación en memoria para desarrollo y tests
#[derive(Default)]
pub struct InMemoryMediaStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }
}

#[async_trait]
impl MediaStore for InMemoryMediaStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<StoredMedia, MediaStoreError> {
        check_key(key)?;
        let mut blobs = self.blobs.write().await;
        if blobs.contains_key(key) {
            return Err(MediaStoreError::AlreadyExists(key.to_string()));
        }
        blobs.insert(key.to_string(), bytes.to_vec());

        Ok(StoredMedia {
            key: key.to_string(),
            digest: content_digest(bytes),
            size: bytes.len() as u64,
        })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, MediaStoreError> {
        self.blobs
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| MediaStoreError::NotFound(key.to_string()))
    }

    async fn remove(&self, key: &str) -> Result<(), MediaStoreError> {
        self.blobs.write().await.remove(key);
        Ok(())
    }
}
