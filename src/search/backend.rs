//! Index backend abstraction / 索引后端抽象
//!
//! Both durable stores speak the same narrow contract so the read paths
//! (consistency checker, query engine) don't care which one is active.
//! Failures degrade to falsy returns - "treat as unavailable, fall back to
//! the flat document" - rather than surfacing errors.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use super::db_index::DbIndex;
use super::flat_index::FlatIndex;
use super::schema::IndexEntry;

/// Which backend configuration selects / 配置选择的后端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Flat,
    Sqlite,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::Sqlite => "sqlite",
        }
    }

    /// Parse from config, clamping unknown values to flat / 解析配置值
    pub fn from_config(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Self::Sqlite,
            _ => Self::Flat,
        }
    }
}

/// Backend storage info / 后端存储信息
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackendInfo {
    pub exists: bool,
    pub version: u32,
    pub total_entries: u64,
    pub generated_at: String,
    pub size_bytes: u64,
}

/// Result of a single-slug removal / 单条删除结果
#[derive(Debug, Clone, Copy)]
pub struct RemoveOne {
    pub available: bool,
    pub updated: bool,
}

/// Narrow backend contract / 后端窄契约
#[async_trait]
pub trait IndexBackend: Send + Sync {
    /// Storage location label, e.g. `flat:data/search_index.json`
    fn label(&self) -> String;
    async fn is_available(&self) -> bool;
    async fn info(&self) -> BackendInfo;
    /// All entries, optionally scoped to one category; None = unavailable
    async fn read_all(&self, category: Option<&str>) -> Option<Vec<IndexEntry>>;
    async fn upsert_one(&self, entry: &IndexEntry) -> bool;
    async fn remove_one(&self, slug: &str) -> RemoveOne;
    async fn replace_all(&self, entries: &[IndexEntry], generated_at: &str) -> bool;
}

/// Flat-document backend / 平面文档后端
pub struct FlatBackend {
    index: FlatIndex,
}

impl FlatBackend {
    pub fn new(index: FlatIndex) -> Self {
        Self { index }
    }
}

#[async_trait]
impl IndexBackend for FlatBackend {
    fn label(&self) -> String {
        format!("flat:{}", self.index.path().display())
    }

    async fn is_available(&self) -> bool {
        // The flat document is always writable as far as this layer knows
        true
    }

    async fn info(&self) -> BackendInfo {
        self.index.info()
    }

    async fn read_all(&self, category: Option<&str>) -> Option<Vec<IndexEntry>> {
        let doc = self.index.read_document().ok().flatten()?;
        let mut pages = doc.pages;
        if let Some(category) = category {
            pages.retain(|p| p.category_id == category);
        }
        Some(pages)
    }

    async fn upsert_one(&self, entry: &IndexEntry) -> bool {
        self.index.upsert_entry(entry.clone()).is_ok()
    }

    async fn remove_one(&self, slug: &str) -> RemoveOne {
        match self.index.remove_entry(slug) {
            Ok(updated) => RemoveOne { available: true, updated },
            Err(_) => RemoveOne { available: false, updated: false },
        }
    }

    async fn replace_all(&self, entries: &[IndexEntry], _generated_at: &str) -> bool {
        let mut doc = super::schema::IndexDocument::from_pages(entries.to_vec());
        self.index.write_document(&mut doc).is_ok()
    }
}

/// SQLite backend / SQLite 后端
pub struct SqliteBackend {
    db: Arc<DbIndex>,
}

impl SqliteBackend {
    pub fn new(db: Arc<DbIndex>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl IndexBackend for SqliteBackend {
    fn label(&self) -> String {
        format!("sqlite:{}", self.db.path().display())
    }

    async fn is_available(&self) -> bool {
        self.db.is_available().await
    }

    async fn info(&self) -> BackendInfo {
        self.db.info().await
    }

    async fn read_all(&self, category: Option<&str>) -> Option<Vec<IndexEntry>> {
        self.db.read_all(category).await
    }

    async fn upsert_one(&self, entry: &IndexEntry) -> bool {
        self.db.upsert_one(entry).await
    }

    async fn remove_one(&self, slug: &str) -> RemoveOne {
        self.db.remove_one(slug).await
    }

    async fn replace_all(&self, entries: &[IndexEntry], generated_at: &str) -> bool {
        self.db.replace_all(entries, generated_at).await
    }
}
