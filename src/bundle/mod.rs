//! Artifact bundling.
//!
//! Each run persists its inspectable state under
//! `{reports_dir}/{slug(topic)}/`: planner, selection, and extract JSON,
//! the report and evidence Markdown, the manifest, a `SHA256SUMS` digest
//! file, and optionally a deterministic `.tar.gz` next to the directory.
//! Writes are atomic (temp file + rename) so concurrent runs and
//! cancellation never leave torn files.

pub mod manifest;

pub use manifest::{Manifest, ManifestEntry, ManifestMeta};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Maximum slug length.
const SLUG_MAX_LEN: usize = 60;

/// Turns a topic into a filesystem-safe slug.
#[must_use]
pub fn slugify(topic: &str) -> String {
    let mut slug = String::new();
    let mut last_dash = true;
    for c in topic.to_lowercase().chars() {
        if c.is_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
        if slug.len() >= SLUG_MAX_LEN {
            break;
        }
    }
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "report".to_string()
    } else {
        slug
    }
}

/// First 12 hex characters of the topic's SHA-256, for collision-safe
/// default output names.
#[must_use]
pub fn hash12(topic: &str) -> String {
    let digest = hex::encode(Sha256::digest(topic.as_bytes()));
    digest[..12].to_string()
}

/// Default report path mapping: `{reports_dir}/{slug}-{hash12}.md`.
#[must_use]
pub fn default_report_path(reports_dir: &Path, topic: &str) -> PathBuf {
    reports_dir.join(format!("{}-{}.md", slugify(topic), hash12(topic)))
}

/// A per-run artifact directory.
#[derive(Debug, Clone)]
pub struct Bundle {
    dir: PathBuf,
    slug: String,
}

impl Bundle {
    /// Creates (or reuses) the bundle directory for a topic.
    pub fn create(reports_dir: &Path, topic: &str) -> std::io::Result<Self> {
        let slug = slugify(topic);
        let dir = reports_dir.join(&slug);
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, slug })
    }

    /// Bundle directory path.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Topic slug this bundle was created for.
    #[must_use]
    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Serializes a value as pretty JSON into the bundle.
    pub fn write_json<T: Serialize>(&self, name: &str, value: &T) -> std::io::Result<PathBuf> {
        let mut bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        bytes.push(b'\n');
        self.write_bytes(name, &bytes)
    }

    /// Writes a text file into the bundle.
    pub fn write_text(&self, name: &str, text: &str) -> std::io::Result<PathBuf> {
        self.write_bytes(name, text.as_bytes())
    }

    fn write_bytes(&self, name: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
        let path = self.dir.join(name);
        write_atomic(&path, bytes)?;
        Ok(path)
    }

    /// Computes `SHA256SUMS` over every regular file in the bundle
    /// (tarballs and the digest file itself excluded), sorted by name.
    pub fn write_checksums(&self) -> std::io::Result<PathBuf> {
        let mut names: Vec<String> = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.metadata()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == "SHA256SUMS" || name.ends_with(".tar.gz") {
                continue;
            }
            names.push(name);
        }
        names.sort();

        let mut sums = String::new();
        for name in &names {
            let bytes = fs::read(self.dir.join(name))?;
            sums.push_str(&format!("{}  {name}\n", hex::encode(Sha256::digest(&bytes))));
        }
        self.write_bytes("SHA256SUMS", sums.as_bytes())
    }

    /// Packs the bundle into a deterministic `{slug}.tar.gz` next to the
    /// directory: sorted entries, zeroed timestamps and ownership.
    pub fn pack_tarball(&self) -> std::io::Result<PathBuf> {
        let tar_path = self
            .dir
            .parent()
            .unwrap_or(Path::new("."))
            .join(format!("{}.tar.gz", self.slug));

        let mut names: Vec<String> = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.metadata()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();

        let mut buffer = Vec::new();
        {
            let encoder = GzEncoder::new(&mut buffer, Compression::default());
            let mut archive = tar::Builder::new(encoder);
            for name in &names {
                let bytes = fs::read(self.dir.join(name))?;
                let mut header = tar::Header::new_gnu();
                header.set_size(bytes.len() as u64);
                header.set_mode(0o644);
                header.set_mtime(0);
                header.set_uid(0);
                header.set_gid(0);
                header.set_cksum();
                archive.append_data(
                    &mut header,
                    format!("{}/{name}", self.slug),
                    bytes.as_slice(),
                )?;
            }
            let encoder = archive.into_inner()?;
            encoder.finish()?;
        }

        write_atomic(&tar_path, &buffer)?;
        Ok(tar_path)
    }
}

/// Writes bytes via a temp file in the same directory, fsyncs, then
/// renames into place.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Rust Async Runtimes"), "rust-async-runtimes");
        assert_eq!(slugify("  what?!  about -- punctuation  "), "what-about-punctuation");
        assert_eq!(slugify(""), "report");
        assert_eq!(slugify("???"), "report");
    }

    #[test]
    fn test_slug_length_capped() {
        let long = "word ".repeat(50);
        assert!(slugify(&long).len() <= SLUG_MAX_LEN);
    }

    #[test]
    fn test_hash12_stable() {
        assert_eq!(hash12("topic"), hash12("topic"));
        assert_ne!(hash12("topic"), hash12("other"));
        assert_eq!(hash12("topic").len(), 12);
    }

    #[test]
    fn test_default_report_path_shape() {
        let path = default_report_path(Path::new("/reports"), "My Topic");
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        let name = name.unwrap_or_default();
        assert!(name.starts_with("my-topic-"));
        assert!(name.ends_with(".md"));
    }

    #[test]
    fn test_bundle_writes_and_checksums() {
        let temp = TempDir::new().unwrap_or_else(|_| unreachable!());
        let bundle = Bundle::create(temp.path(), "Test Topic").unwrap_or_else(|_| unreachable!());
        bundle
            .write_text("report.md", "# Report\n")
            .unwrap_or_else(|_| unreachable!());
        bundle
            .write_json("planner.json", &serde_json::json!({"queries": ["q"]}))
            .unwrap_or_else(|_| unreachable!());
        let sums_path = bundle.write_checksums().unwrap_or_else(|_| unreachable!());

        let sums = fs::read_to_string(&sums_path).unwrap_or_default();
        assert!(sums.contains("  report.md"));
        assert!(sums.contains("  planner.json"));
        assert!(!sums.contains("SHA256SUMS"));

        // Every recorded digest matches a recomputation.
        for line in sums.lines() {
            let Some((digest, name)) = line.split_once("  ") else {
                continue;
            };
            let bytes = fs::read(bundle.dir().join(name)).unwrap_or_default();
            assert_eq!(digest, hex::encode(Sha256::digest(&bytes)));
        }
    }

    #[test]
    fn test_tarball_is_deterministic() {
        let temp = TempDir::new().unwrap_or_else(|_| unreachable!());
        let bundle = Bundle::create(temp.path(), "Det Topic").unwrap_or_else(|_| unreachable!());
        bundle
            .write_text("report.md", "# Report\n")
            .unwrap_or_else(|_| unreachable!());
        bundle
            .write_text("evidence.md", "## Evidence\n")
            .unwrap_or_else(|_| unreachable!());

        let first = bundle.pack_tarball().unwrap_or_else(|_| unreachable!());
        let first_bytes = fs::read(&first).unwrap_or_default();
        let second = bundle.pack_tarball().unwrap_or_else(|_| unreachable!());
        let second_bytes = fs::read(&second).unwrap_or_default();
        assert_eq!(first_bytes, second_bytes);
        assert!(!first_bytes.is_empty());
    }

    #[test]
    fn test_tarball_excluded_from_checksums() {
        let temp = TempDir::new().unwrap_or_else(|_| unreachable!());
        let bundle = Bundle::create(temp.path(), "T").unwrap_or_else(|_| unreachable!());
        bundle
            .write_text("report.md", "# R\n")
            .unwrap_or_else(|_| unreachable!());
        bundle.pack_tarball().unwrap_or_else(|_| unreachable!());
        let sums_path = bundle.write_checksums().unwrap_or_else(|_| unreachable!());
        let sums = fs::read_to_string(sums_path).unwrap_or_default();
        assert!(!sums.contains(".tar.gz"));
    }
}
