//! Flat index document - primary backend / 平面索引文档（主后端）
//!
//! One serialized JSON `IndexDocument` file. Always maintained regardless
//! of the configured backend: it is the durability floor and the fallback
//! of record when the SQLite index is unavailable.
//!
//! All writes are whole-document replaces via tmp+rename, so a reader sees
//! either the old document or the new one, never a torn mix.

use std::path::{Path, PathBuf};

use super::backend::BackendInfo;
use super::schema::{IndexDocument, IndexEntry};

/// Flat index document manager / 平面索引管理器
#[derive(Debug, Clone)]
pub struct FlatIndex {
    path: PathBuf,
}

impl FlatIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read and defensively re-normalize the document / 读取并防御性规范化
    ///
    /// A missing file is `None`; a corrupt file is logged and treated as
    /// missing so the consistency checker forces a rebuild instead of the
    /// whole subsystem failing.
    pub fn read_document(&self) -> Result<Option<IndexDocument>, String> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path).map_err(|e| e.to_string())?;
        match serde_json::from_str::<IndexDocument>(&content) {
            Ok(mut doc) => {
                doc.normalize();
                Ok(Some(doc))
            }
            Err(e) => {
                tracing::warn!("Flat index {:?} is corrupt, treating as missing: {}", self.path, e);
                Ok(None)
            }
        }
    }

    /// Whole-document replace / 整文档替换写入
    pub fn write_document(&self, doc: &mut IndexDocument) -> Result<(), String> {
        doc.touch();
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
            }
        }
        let body = serde_json::to_string(doc).map_err(|e| e.to_string())?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, body).map_err(|e| e.to_string())?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Merge one entry into the document / 合并单个条目
    pub fn upsert_entry(&self, entry: IndexEntry) -> Result<(), String> {
        let mut doc = self.read_document()?.unwrap_or_default();
        doc.upsert(entry);
        self.write_document(&mut doc)
    }

    /// Filter one slug out of the document / 过滤掉单个 slug
    ///
    /// Returns false (and performs no write) when the document doesn't
    /// exist or the slug isn't present.
    pub fn remove_entry(&self, slug: &str) -> Result<bool, String> {
        let Some(mut doc) = self.read_document()? else {
            return Ok(false);
        };
        if !doc.remove(slug) {
            return Ok(false);
        }
        self.write_document(&mut doc)?;
        Ok(true)
    }

    pub fn size_bytes(&self) -> u64 {
        std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    pub fn info(&self) -> BackendInfo {
        match self.read_document() {
            Ok(Some(doc)) => BackendInfo {
                exists: true,
                version: doc.version,
                total_entries: doc.total_pages as u64,
                generated_at: doc.generated_at,
                size_bytes: self.size_bytes(),
            },
            _ => BackendInfo::default(),
        }
    }
}
