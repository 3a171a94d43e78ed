//! Content-addressed HTTP and LLM caches.
//!
//! Two buckets live under a single root: `http/` for fetched responses
//! (body plus a small JSON sidecar with status, content type, and fetch
//! time) and `llm/` for chat completions stored as JSON. Keys are the hex
//! SHA-256 of a canonical key string. Writes are atomic (temp file, fsync,
//! rename) so concurrent runs sharing a cache directory never observe a
//! torn entry.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CacheError;

/// Logical cache bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    /// Fetched HTTP responses.
    Http,
    /// LLM chat completions.
    Llm,
}

impl Bucket {
    const fn dir_name(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Llm => "llm",
        }
    }
}

/// Sidecar metadata stored next to a cached HTTP body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSidecar {
    /// HTTP status of the cached response.
    pub status: u16,
    /// Content-Type header value.
    pub content_type: String,
    /// When the response was fetched.
    pub fetched_at: DateTime<Utc>,
}

/// A cached HTTP response: body bytes plus sidecar metadata.
#[derive(Debug, Clone)]
pub struct CachedHttpResponse {
    /// Response body.
    pub body: Vec<u8>,
    /// Sidecar metadata.
    pub meta: HttpSidecar,
}

/// Aggregate cache statistics per bucket.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    /// Entry count in `http/` (sidecars not counted).
    pub http_entries: usize,
    /// Total bytes under `http/`.
    pub http_bytes: u64,
    /// Entry count in `llm/`.
    pub llm_entries: usize,
    /// Total bytes under `llm/`.
    pub llm_bytes: u64,
}

/// Content-addressed cache rooted at a single directory.
#[derive(Debug, Clone)]
pub struct Cache {
    root: PathBuf,
    strict_perms: bool,
}

impl Cache {
    /// Opens (and creates) a cache under `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        Self::open_inner(root.into(), false)
    }

    /// Opens a cache with strict permissions: 0700 directories and 0600
    /// entries. Useful when the cache may hold licensed or paywalled text.
    pub fn open_strict(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        Self::open_inner(root.into(), true)
    }

    fn open_inner(root: PathBuf, strict_perms: bool) -> Result<Self, CacheError> {
        for bucket in [Bucket::Http, Bucket::Llm] {
            let dir = root.join(bucket.dir_name());
            fs::create_dir_all(&dir).map_err(|e| io_error(&dir, &e))?;
            if strict_perms {
                restrict_dir(&dir)?;
            }
        }
        if strict_perms {
            restrict_dir(&root)?;
        }
        Ok(Self { root, strict_perms })
    }

    /// Cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Hex SHA-256 of a canonical key string.
    #[must_use]
    pub fn hash_key(canonical: &str) -> String {
        hex::encode(Sha256::digest(canonical.as_bytes()))
    }

    /// Key for an HTTP request: method, URL, and accept header.
    #[must_use]
    pub fn http_key(method: &str, url: &str, accept: &str) -> String {
        Self::hash_key(&format!("{method}\n{url}\n{accept}"))
    }

    /// Key for an LLM call: model plus the system and user prompts.
    #[must_use]
    pub fn llm_key(model: &str, system: &str, user: &str) -> String {
        Self::hash_key(&format!("{model}\n{system}\n\n{user}"))
    }

    fn entry_path(&self, bucket: Bucket, key: &str) -> PathBuf {
        self.root.join(bucket.dir_name()).join(key)
    }

    /// Reads raw bytes for a key, or `None` on miss.
    pub fn get(&self, bucket: Bucket, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.entry_path(bucket, key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, &e)),
        }
    }

    /// Writes raw bytes for a key atomically.
    pub fn put(&self, bucket: Bucket, key: &str, bytes: &[u8]) -> Result<(), CacheError> {
        let path = self.entry_path(bucket, key);
        self.write_atomic(&path, bytes)
    }

    /// Reads a cached HTTP response (body + sidecar), or `None` when either
    /// part is missing.
    pub fn get_http(&self, key: &str) -> Result<Option<CachedHttpResponse>, CacheError> {
        let Some(body) = self.get(Bucket::Http, key)? else {
            return Ok(None);
        };
        let meta_path = self.entry_path(Bucket::Http, &sidecar_name(key));
        let meta_bytes = match fs::read(&meta_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&meta_path, &e)),
        };
        let meta: HttpSidecar = serde_json::from_slice(&meta_bytes).map_err(|_| {
            CacheError::Corrupt {
                key: key.to_string(),
            }
        })?;
        Ok(Some(CachedHttpResponse { body, meta }))
    }

    /// Stores an HTTP response body and its sidecar atomically.
    pub fn put_http(&self, key: &str, response: &CachedHttpResponse) -> Result<(), CacheError> {
        let meta = serde_json::to_vec(&response.meta).map_err(|_| CacheError::Corrupt {
            key: key.to_string(),
        })?;
        // Sidecar first so a reader never sees a body without metadata.
        self.write_atomic(&self.entry_path(Bucket::Http, &sidecar_name(key)), &meta)?;
        self.write_atomic(&self.entry_path(Bucket::Http, key), &response.body)
    }

    /// Reads and deserializes a JSON entry.
    pub fn get_json<T: DeserializeOwned>(
        &self,
        bucket: Bucket,
        key: &str,
    ) -> Result<Option<T>, CacheError> {
        let Some(bytes) = self.get(bucket, key)? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|_| CacheError::Corrupt {
                key: key.to_string(),
            })
    }

    /// Serializes and stores a JSON entry atomically.
    pub fn put_json<T: Serialize>(
        &self,
        bucket: Bucket,
        key: &str,
        value: &T,
    ) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(value).map_err(|_| CacheError::Corrupt {
            key: key.to_string(),
        })?;
        self.put(bucket, key, &bytes)
    }

    /// Removes entries whose mtime is older than `now - age`.
    /// Returns the number of files removed.
    pub fn purge_older_than(&self, age: Duration) -> Result<usize, CacheError> {
        let cutoff = SystemTime::now()
            .checked_sub(age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut removed = 0;
        for bucket in [Bucket::Http, Bucket::Llm] {
            let dir = self.root.join(bucket.dir_name());
            for entry in fs::read_dir(&dir).map_err(|e| io_error(&dir, &e))? {
                let entry = entry.map_err(|e| io_error(&dir, &e))?;
                let path = entry.path();
                let Ok(meta) = entry.metadata() else { continue };
                if !meta.is_file() {
                    continue;
                }
                let Ok(mtime) = meta.modified() else { continue };
                if mtime < cutoff {
                    fs::remove_file(&path).map_err(|e| io_error(&path, &e))?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    /// Removes every entry from both buckets.
    pub fn clear(&self) -> Result<(), CacheError> {
        for bucket in [Bucket::Http, Bucket::Llm] {
            let dir = self.root.join(bucket.dir_name());
            for entry in fs::read_dir(&dir).map_err(|e| io_error(&dir, &e))? {
                let entry = entry.map_err(|e| io_error(&dir, &e))?;
                let path = entry.path();
                if path.is_file() {
                    fs::remove_file(&path).map_err(|e| io_error(&path, &e))?;
                }
            }
        }
        Ok(())
    }

    /// Per-bucket entry counts and sizes.
    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let mut stats = CacheStats::default();
        for bucket in [Bucket::Http, Bucket::Llm] {
            let dir = self.root.join(bucket.dir_name());
            for entry in fs::read_dir(&dir).map_err(|e| io_error(&dir, &e))? {
                let entry = entry.map_err(|e| io_error(&dir, &e))?;
                let Ok(meta) = entry.metadata() else { continue };
                if !meta.is_file() {
                    continue;
                }
                let is_sidecar = entry.path().extension().is_some_and(|ext| ext == "meta");
                match bucket {
                    Bucket::Http => {
                        stats.http_bytes += meta.len();
                        if !is_sidecar {
                            stats.http_entries += 1;
                        }
                    }
                    Bucket::Llm => {
                        stats.llm_bytes += meta.len();
                        stats.llm_entries += 1;
                    }
                }
            }
        }
        Ok(stats)
    }

    /// Writes bytes to `path` via a temp file in the same directory,
    /// fsyncs, then renames into place.
    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
        let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
        let mut file = fs::File::create(&tmp).map_err(|e| io_error(&tmp, &e))?;
        file.write_all(bytes).map_err(|e| io_error(&tmp, &e))?;
        file.sync_all().map_err(|e| io_error(&tmp, &e))?;
        drop(file);
        if self.strict_perms {
            restrict_file(&tmp)?;
        }
        fs::rename(&tmp, path).map_err(|e| io_error(path, &e))
    }
}

fn sidecar_name(key: &str) -> String {
    format!("{key}.meta")
}

fn io_error(path: &Path, err: &std::io::Error) -> CacheError {
    CacheError::Io {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

#[cfg(unix)]
fn restrict_dir(path: &Path) -> Result<(), CacheError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o700)).map_err(|e| io_error(path, &e))
}

#[cfg(unix)]
fn restrict_file(path: &Path) -> Result<(), CacheError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_error(path, &e))
}

#[cfg(not(unix))]
fn restrict_dir(_path: &Path) -> Result<(), CacheError> {
    Ok(())
}

#[cfg(not(unix))]
fn restrict_file(_path: &Path) -> Result<(), CacheError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_cache() -> (Cache, TempDir) {
        let temp = TempDir::new().unwrap_or_else(|_| unreachable!());
        let cache = Cache::open(temp.path().join("cache")).unwrap_or_else(|_| unreachable!());
        (cache, temp)
    }

    #[test]
    fn test_put_get_round_trip_is_byte_identical() {
        let (cache, _temp) = open_cache();
        let key = Cache::hash_key("some canonical key");
        let payload = vec![0u8, 1, 2, 255, 254, 10, 13];
        cache
            .put(Bucket::Http, &key, &payload)
            .unwrap_or_else(|_| unreachable!());
        let back = cache
            .get(Bucket::Http, &key)
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(back.as_deref(), Some(payload.as_slice()));
    }

    #[test]
    fn test_get_miss_returns_none() {
        let (cache, _temp) = open_cache();
        let missing = cache
            .get(Bucket::Llm, &Cache::hash_key("never stored"))
            .unwrap_or_else(|_| unreachable!());
        assert!(missing.is_none());
    }

    #[test]
    fn test_http_round_trip_with_sidecar() {
        let (cache, _temp) = open_cache();
        let key = Cache::http_key("GET", "https://example.com/a", "text/html");
        let response = CachedHttpResponse {
            body: b"<html>hello</html>".to_vec(),
            meta: HttpSidecar {
                status: 200,
                content_type: "text/html; charset=utf-8".to_string(),
                fetched_at: Utc::now(),
            },
        };
        cache
            .put_http(&key, &response)
            .unwrap_or_else(|_| unreachable!());
        let back = cache
            .get_http(&key)
            .unwrap_or_else(|_| unreachable!())
            .unwrap_or_else(|| unreachable!());
        assert_eq!(back.body, response.body);
        assert_eq!(back.meta.status, 200);
        assert_eq!(back.meta.content_type, "text/html; charset=utf-8");
    }

    #[test]
    fn test_distinct_keys_for_distinct_requests() {
        assert_ne!(
            Cache::http_key("GET", "https://a.example", "text/html"),
            Cache::http_key("GET", "https://b.example", "text/html")
        );
        assert_ne!(
            Cache::llm_key("m1", "sys", "user"),
            Cache::llm_key("m2", "sys", "user")
        );
    }

    #[test]
    fn test_purge_respects_age() {
        let (cache, _temp) = open_cache();
        cache
            .put(Bucket::Http, &Cache::hash_key("k1"), b"v1")
            .unwrap_or_else(|_| unreachable!());
        cache
            .put(Bucket::Llm, &Cache::hash_key("k2"), b"v2")
            .unwrap_or_else(|_| unreachable!());

        // Entries are newer than one hour: nothing to purge.
        let removed = cache
            .purge_older_than(Duration::from_secs(3_600))
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(removed, 0);

        // Zero age: everything is older than "now".
        std::thread::sleep(Duration::from_millis(20));
        let removed = cache
            .purge_older_than(Duration::ZERO)
            .unwrap_or_else(|_| unreachable!());
        assert!(removed >= 2);
    }

    #[test]
    fn test_clear_empties_both_buckets() {
        let (cache, _temp) = open_cache();
        cache
            .put(Bucket::Http, &Cache::hash_key("a"), b"1")
            .unwrap_or_else(|_| unreachable!());
        cache
            .put(Bucket::Llm, &Cache::hash_key("b"), b"2")
            .unwrap_or_else(|_| unreachable!());
        cache.clear().unwrap_or_else(|_| unreachable!());
        let stats = cache.stats().unwrap_or_else(|_| unreachable!());
        assert_eq!(stats.http_entries, 0);
        assert_eq!(stats.llm_entries, 0);
    }

    #[test]
    fn test_json_round_trip() {
        let (cache, _temp) = open_cache();
        let key = Cache::llm_key("test-model", "system", "user");
        cache
            .put_json(Bucket::Llm, &key, &serde_json::json!({"markdown": "# Hi"}))
            .unwrap_or_else(|_| unreachable!());
        let back: Option<serde_json::Value> = cache
            .get_json(Bucket::Llm, &key)
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(
            back.and_then(|v| v.get("markdown").cloned()),
            Some(serde_json::Value::String("# Hi".to_string()))
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_strict_perms_mode() {
        use std::os::unix::fs::PermissionsExt;
        let temp = TempDir::new().unwrap_or_else(|_| unreachable!());
        let cache =
            Cache::open_strict(temp.path().join("cache")).unwrap_or_else(|_| unreachable!());
        let key = Cache::hash_key("secret");
        cache
            .put(Bucket::Http, &key, b"licensed text")
            .unwrap_or_else(|_| unreachable!());

        let dir_mode = std::fs::metadata(temp.path().join("cache/http"))
            .unwrap_or_else(|_| unreachable!())
            .permissions()
            .mode();
        assert_eq!(dir_mode & 0o777, 0o700);

        let file_mode = std::fs::metadata(temp.path().join("cache/http").join(&key))
            .unwrap_or_else(|_| unreachable!())
            .permissions()
            .mode();
        assert_eq!(file_mode & 0o777, 0o600);
    }
}
