//! Compressed on-disk bucket store.
//!
//! Each key owns one bucket file under a sandboxed directory:
//!
//! ```text
//! {base_dir}/{sub_dir}/{key}
//! ```
//!
//! A bucket is gzip-compressed UTF-8 JSON whose top-level value is always an
//! array. `set` appends a value unless a structurally equal element is already
//! present, so a bucket accumulates the distinct values written for its key.
//! A missing bucket is never an error.

use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use metrics::counter;
use serde::Serialize;
use serde_json::Value;
use tokio::fs;
use tracing::{debug, warn};

use super::error::CacheError;
use super::lock::KeyLocks;

const METRIC_DISK_WRITE: &str = "tiercache_disk_write_total";

/// Sub-directory prefixes that would leave the base directory.
const FORBIDDEN_PREFIXES: [&str; 4] = ["./", "../", "~/", "/"];

/// In-flight writes use `.{key}.tmp`; hidden names are never buckets.
const HIDDEN_PREFIX: char = '.';
const TMP_SUFFIX: &str = ".tmp";

/// One bucket as returned by [`DiskStore::get_all`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskEntry {
    pub key: String,
    pub value: Vec<Value>,
}

/// Durable, directory-sandboxed bucket store.
#[derive(Debug)]
pub struct DiskStore {
    root: PathBuf,
    ttl: Option<Duration>,
    locks: KeyLocks,
}

/// Reject sub-directories that could escape the base directory.
///
/// Runs before anything touches the filesystem.
pub fn validate_sub_dir(sub_dir: &str) -> Result<(), CacheError> {
    let reject = |reason| {
        Err(CacheError::Sandbox {
            dir: sub_dir.to_string(),
            reason,
        })
    };

    if sub_dir.is_empty() {
        return reject("directory name must not be empty");
    }
    if FORBIDDEN_PREFIXES
        .iter()
        .any(|prefix| sub_dir.starts_with(prefix))
    {
        return reject("directory must be relative to the cache root");
    }
    if sub_dir.split(['/', '\\']).any(|part| part == "..") {
        return reject("directory must not contain `..` components");
    }
    Ok(())
}

impl DiskStore {
    /// Open (creating if needed) the store at `base_dir/sub_dir`.
    ///
    /// `ttl` bounds how long a bucket stays readable after its last rewrite;
    /// `None` keeps buckets until deleted.
    pub async fn open(
        base_dir: impl AsRef<Path>,
        sub_dir: &str,
        ttl: Option<Duration>,
    ) -> Result<Self, CacheError> {
        validate_sub_dir(sub_dir)?;

        let root = base_dir.as_ref().join(sub_dir);
        fs::create_dir_all(&root)
            .await
            .map_err(|err| CacheError::io(&root, err))?;

        debug!(root = %root.display(), ?ttl, "Opened disk cache store");

        Ok(Self {
            root,
            ttl,
            locks: KeyLocks::new(),
        })
    }

    /// Directory holding the buckets.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Append `value` to the bucket for `key` unless already present.
    pub async fn set(&self, key: &str, value: Value) -> Result<(), CacheError> {
        let path = self.bucket_path(key)?;
        let _guard = self.locks.acquire(key).await;

        let mut bucket = self.load_for_write(&path).await?;
        if bucket.contains(&value) {
            counter!(METRIC_DISK_WRITE, "result" => "duplicate").increment(1);
            return Ok(());
        }

        bucket.push(value);
        self.write_bucket(key, &path, &bucket).await?;
        counter!(METRIC_DISK_WRITE, "result" => "appended").increment(1);
        Ok(())
    }

    /// Make `value` the last element of the bucket for `key`.
    ///
    /// A structurally equal element already in the bucket is moved to the end
    /// instead of being duplicated, so the last element is always the most
    /// recent write.
    pub async fn set_latest(&self, key: &str, value: Value) -> Result<(), CacheError> {
        let path = self.bucket_path(key)?;
        let _guard = self.locks.acquire(key).await;

        let mut bucket = self.load_for_write(&path).await?;
        match bucket.iter().position(|existing| *existing == value) {
            Some(index) if index + 1 == bucket.len() => {
                counter!(METRIC_DISK_WRITE, "result" => "duplicate").increment(1);
                return Ok(());
            }
            Some(index) => {
                let existing = bucket.remove(index);
                bucket.push(existing);
                self.write_bucket(key, &path, &bucket).await?;
                counter!(METRIC_DISK_WRITE, "result" => "reordered").increment(1);
            }
            None => {
                bucket.push(value);
                self.write_bucket(key, &path, &bucket).await?;
                counter!(METRIC_DISK_WRITE, "result" => "appended").increment(1);
            }
        }
        Ok(())
    }

    /// Read the bucket for `key`; `None` when it does not exist or has expired.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<Value>>, CacheError> {
        let path = self.bucket_path(key)?;

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(CacheError::io(&path, err)),
        };

        if self.is_expired(&path).await? {
            let _guard = self.locks.acquire(key).await;
            // A writer may have replaced the bucket while we waited.
            if self.is_expired(&path).await? {
                remove_if_present(&path).await?;
                debug!(key, "Dropped expired cache bucket");
            }
            return Ok(None);
        }

        decode_bucket(&path, &bytes).map(Some)
    }

    /// Read every live bucket. Any unreadable bucket fails the whole call.
    pub async fn get_all(&self) -> Result<Vec<DiskEntry>, CacheError> {
        let mut entries = Vec::new();
        for key in self.bucket_names().await? {
            let path = self.root.join(&key);
            let Some(bytes) = self.read_live(&path).await? else {
                continue;
            };
            let value = decode_bucket(&path, &bytes)?;
            entries.push(DiskEntry { key, value });
        }
        entries.sort_by(|left, right| left.key.cmp(&right.key));
        Ok(entries)
    }

    /// Remove the bucket for `key`. A missing bucket counts as deleted.
    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let path = self.bucket_path(key)?;
        let _guard = self.locks.acquire(key).await;
        remove_if_present(&path).await
    }

    /// Remove every bucket in the store.
    pub async fn clear(&self) -> Result<(), CacheError> {
        for key in self.bucket_names().await? {
            let _guard = self.locks.acquire(&key).await;
            remove_if_present(&self.root.join(&key)).await?;
        }
        Ok(())
    }

    /// Number of bucket files currently present.
    pub async fn count_keys(&self) -> Result<usize, CacheError> {
        Ok(self.bucket_names().await?.len())
    }

    fn bucket_path(&self, key: &str) -> Result<PathBuf, CacheError> {
        let unsafe_key = key.is_empty()
            || key.starts_with(HIDDEN_PREFIX)
            || key.contains(['/', '\\'])
            || key.contains('\0');
        if unsafe_key {
            return Err(CacheError::Sandbox {
                dir: key.to_string(),
                reason: "bucket key must be a plain file name",
            });
        }
        Ok(self.root.join(key))
    }

    async fn bucket_names(&self) -> Result<Vec<String>, CacheError> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(CacheError::io(&self.root, err)),
        };

        let mut names = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|err| CacheError::io(&self.root, err))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|err| CacheError::io(entry.path(), err))?;
            if !file_type.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if !name.starts_with(HIDDEN_PREFIX) {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Bucket bytes, or `None` when missing or expired.
    async fn read_live(&self, path: &Path) -> Result<Option<Vec<u8>>, CacheError> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(CacheError::io(path, err)),
        };
        if self.is_expired(path).await? {
            return Ok(None);
        }
        Ok(Some(bytes))
    }

    async fn is_expired(&self, path: &Path) -> Result<bool, CacheError> {
        let Some(ttl) = self.ttl else {
            return Ok(false);
        };

        let metadata = match fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(CacheError::io(path, err)),
        };
        let modified = metadata
            .modified()
            .map_err(|err| CacheError::io(path, err))?;

        // A clock that moved backwards leaves the bucket live.
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        Ok(age >= ttl)
    }

    /// Current bucket contents for a rewrite; a malformed bucket starts over.
    async fn load_for_write(&self, path: &Path) -> Result<Vec<Value>, CacheError> {
        let Some(bytes) = self.read_live(path).await? else {
            return Ok(Vec::new());
        };
        match decode_bucket(path, &bytes) {
            Ok(bucket) => Ok(bucket),
            Err(CacheError::Malformed { source, .. }) => {
                warn!(
                    path = %path.display(),
                    error = %source,
                    "Replacing malformed cache bucket"
                );
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    async fn write_bucket(
        &self,
        key: &str,
        path: &Path,
        bucket: &[Value],
    ) -> Result<(), CacheError> {
        let compressed = encode_bucket(path, bucket)?;
        let tmp_path = self.root.join(format!("{HIDDEN_PREFIX}{key}{TMP_SUFFIX}"));

        fs::write(&tmp_path, &compressed)
            .await
            .map_err(|err| CacheError::io(&tmp_path, err))?;
        if let Err(err) = fs::rename(&tmp_path, path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(CacheError::io(path, err));
        }
        Ok(())
    }
}

async fn remove_if_present(path: &Path) -> Result<(), CacheError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(CacheError::io(path, err)),
    }
}

fn encode_bucket(path: &Path, bucket: &[Value]) -> Result<Vec<u8>, CacheError> {
    let json = serde_json::to_vec(bucket)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(&json)
        .map_err(|err| CacheError::compression(path, err))?;
    encoder
        .finish()
        .map_err(|err| CacheError::compression(path, err))
}

fn decode_bucket(path: &Path, compressed: &[u8]) -> Result<Vec<Value>, CacheError> {
    let mut json = Vec::new();
    GzDecoder::new(compressed)
        .read_to_end(&mut json)
        .map_err(|err| CacheError::compression(path, err))?;
    serde_json::from_slice(&json).map_err(|err| CacheError::malformed(path, err))
}
