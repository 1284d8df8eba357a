//! Pseudonym stores.
//!
//! [`MemoryStore`] keeps records in process; [`EncryptedFileStore`] writes
//! every record set through to one password-encrypted file.
//!
//! # File format
//! ```text
//! magic "NNYM" || header_len (4 bytes LE) || header_json || salt (32) || nonce (12) || ciphertext + tag
//! ```
//! The header is unencrypted JSON with the format version and Argon2id
//! parameters. The payload is the JSON array of pseudonym records.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::encryption::{self, KdfParams, SALT_LEN};
use crate::error::StoreError;
use crate::traits::PseudonymStore;
use crate::types::Pseudonym;

/// Magic bytes identifying a NanoNym store file.
pub const STORE_MAGIC: &[u8; 4] = b"NNYM";

/// Current store file format version.
pub const STORE_VERSION: u32 = 1;

/// In-process store, mostly for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<u32, Pseudonym>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the record at `index`.
    pub fn get(&self, index: u32) -> Option<Pseudonym> {
        self.records.lock().get(&index).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl PseudonymStore for MemoryStore {
    async fn load_all(&self) -> Result<Vec<Pseudonym>, StoreError> {
        Ok(self.records.lock().values().cloned().collect())
    }

    async fn save(&self, pseudonym: &Pseudonym) -> Result<(), StoreError> {
        self.records.lock().insert(pseudonym.index, pseudonym.clone());
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct StoreFileHeader {
    version: u32,
    kdf: KdfParams,
}

/// Password-encrypted single-file store.
pub struct EncryptedFileStore {
    path: PathBuf,
    key: Zeroizing<[u8; 32]>,
    salt: [u8; SALT_LEN],
    kdf: KdfParams,
    records: Mutex<BTreeMap<u32, Pseudonym>>,
    /// Serializes file writes so an older snapshot never lands last.
    write_lock: tokio::sync::Mutex<()>,
}

impl EncryptedFileStore {
    /// Open `path`, decrypting it if it exists or starting empty if not.
    pub fn open(path: impl AsRef<Path>, password: &[u8]) -> Result<Self, StoreError> {
        Self::open_with_params(path, password, KdfParams::default())
    }

    /// Like [`open`](Self::open), with explicit KDF parameters for new files.
    /// Existing files keep the parameters recorded in their header.
    pub fn open_with_params(
        path: impl AsRef<Path>,
        password: &[u8],
        kdf: KdfParams,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            let salt = encryption::random_salt();
            let key = encryption::derive_key(password, &salt, &kdf)?;
            info!(path = %path.display(), "creating new pseudonym store");
            return Ok(Self {
                path,
                key,
                salt,
                kdf,
                records: Mutex::new(BTreeMap::new()),
                write_lock: tokio::sync::Mutex::new(()),
            });
        }

        let data = std::fs::read(&path).map_err(|e| StoreError::Io(e.to_string()))?;
        let (kdf, salt, sealed) = parse_file(&data)?;
        let key = encryption::derive_key(password, &salt, &kdf)?;
        let plaintext = Zeroizing::new(encryption::open(&key, sealed)?);
        let list: Vec<Pseudonym> = serde_json::from_slice(&plaintext)
            .map_err(|e| StoreError::CorruptedFile(format!("invalid payload: {e}")))?;
        info!(path = %path.display(), pseudonyms = list.len(), "opened pseudonym store");

        Ok(Self {
            path,
            key,
            salt,
            kdf,
            records: Mutex::new(list.into_iter().map(|p| (p.index, p)).collect()),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn encode_file(&self, records: &[Pseudonym]) -> Result<Vec<u8>, StoreError> {
        let header = StoreFileHeader {
            version: STORE_VERSION,
            kdf: self.kdf,
        };
        let header_json =
            serde_json::to_vec(&header).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let payload = Zeroizing::new(
            serde_json::to_vec(records).map_err(|e| StoreError::Serialization(e.to_string()))?,
        );
        let sealed = encryption::seal(&self.key, &payload)?;

        let mut out = Vec::with_capacity(8 + header_json.len() + SALT_LEN + sealed.len());
        out.extend_from_slice(STORE_MAGIC);
        out.extend_from_slice(&(header_json.len() as u32).to_le_bytes());
        out.extend_from_slice(&header_json);
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&sealed);
        Ok(out)
    }
}

fn parse_file(data: &[u8]) -> Result<(KdfParams, [u8; SALT_LEN], &[u8]), StoreError> {
    let rest = data
        .strip_prefix(STORE_MAGIC.as_slice())
        .ok_or_else(|| StoreError::CorruptedFile("invalid magic bytes".into()))?;
    if rest.len() < 4 {
        return Err(StoreError::CorruptedFile("file too short".into()));
    }
    let (len_bytes, rest) = rest.split_at(4);
    let mut len = [0u8; 4];
    len.copy_from_slice(len_bytes);
    let header_len = u32::from_le_bytes(len) as usize;
    if rest.len() < header_len + SALT_LEN {
        return Err(StoreError::CorruptedFile("header truncated".into()));
    }
    let (header_json, rest) = rest.split_at(header_len);
    let header: StoreFileHeader = serde_json::from_slice(header_json)
        .map_err(|e| StoreError::CorruptedFile(format!("invalid header: {e}")))?;
    if header.version != STORE_VERSION {
        return Err(StoreError::CorruptedFile(format!(
            "unsupported version: {}",
            header.version
        )));
    }
    let (salt_bytes, sealed) = rest.split_at(SALT_LEN);
    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(salt_bytes);
    Ok((header.kdf, salt, sealed))
}

#[async_trait]
impl PseudonymStore for EncryptedFileStore {
    async fn load_all(&self) -> Result<Vec<Pseudonym>, StoreError> {
        Ok(self.records.lock().values().cloned().collect())
    }

    async fn save(&self, pseudonym: &Pseudonym) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let snapshot: Vec<Pseudonym> = {
            let mut records = self.records.lock();
            records.insert(pseudonym.index, pseudonym.clone());
            records.values().cloned().collect()
        };
        let data = self.encode_file(&snapshot)?;

        // Replace atomically through a sibling temp file.
        let tmp = self.path.with_extension("tmp");
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&tmp, &data)?;
            std::fs::rename(&tmp, &path)
        })
        .await
        .map_err(|e| StoreError::Io(e.to_string()))?
        .map_err(|e| StoreError::Io(e.to_string()))?;

        debug!(index = pseudonym.index, "pseudonym saved");
        Ok(())
    }
}
