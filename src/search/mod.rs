//! Search index synchronization engine / 搜索索引同步引擎
//!
//! Keeps a denormalized, query-optimized index of every article's metadata
//! and searchable text in sync with the article store, across two
//! interchangeable backends:
//! - Flat document: always maintained, default backend and resilience
//!   fallback / 平面文档：始终维护的兜底后端
//! - SQLite: selected by configuration, treated as optionally available
//!   / SQLite：按配置启用，视为可选可用
//!
//! Call direction: articles → search (unidirectional). Article mutations
//! feed the incremental synchronizer; drift or admin action triggers a
//! full rebuild; reads go through the query engine.

pub mod backend;
pub mod builder;
pub mod consistency;
pub mod db_index;
pub mod engine;
pub mod flat_index;
pub mod schema;
pub mod sync;

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::articles::ArticleStore;
pub use backend::{BackendInfo, BackendKind, FlatBackend, IndexBackend, RemoveOne, SqliteBackend};
pub use builder::{BuildPhase, BuildState, BuildStatus, RebuildStart};
pub use consistency::{ConsistencyReason, ConsistencyResult};
pub use db_index::DbIndex;
pub use engine::{SearchFilters, SearchMatch, SuggestCache};
pub use flat_index::FlatIndex;
pub use schema::{IndexDocument, IndexEntry, INDEX_SCHEMA_VERSION};
pub use sync::SyncOutcome;

/// Construction options / 构造参数
#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub index_file: PathBuf,
    pub db_file: PathBuf,
    pub backend: BackendKind,
    pub suggest_ttl: Duration,
}

/// Aggregated index info for the admin surface / 管理端聚合信息
#[derive(Debug, Clone, Serialize)]
pub struct IndexInfo {
    pub backend: String,
    pub flat: BackendInfo,
    pub sqlite: Option<BackendInfo>,
    pub status: BuildStatus,
    /// Millis timestamp of the last incremental mutation, 0 if none yet
    pub last_mutation_ms: i64,
}

/// The search index engine / 搜索索引引擎
///
/// Cheap to clone: all state is shared. One instance per process is the
/// intended usage; the single-flight rebuild guard lives in `BuildState`.
#[derive(Clone)]
pub struct SearchIndex {
    store: Arc<ArticleStore>,
    flat: FlatIndex,
    backend_kind: BackendKind,
    db_path: PathBuf,
    sqlite: Arc<tokio::sync::RwLock<Option<Arc<DbIndex>>>>,
    pub(crate) build: Arc<BuildState>,
    pub(crate) cache: Arc<SuggestCache>,
    /// Serializes read-modify-write cycles on the flat document
    pub(crate) flat_write: Arc<tokio::sync::Mutex<()>>,
}

impl SearchIndex {
    pub fn new(store: Arc<ArticleStore>, options: IndexOptions) -> Self {
        Self {
            store,
            flat: FlatIndex::new(options.index_file),
            backend_kind: options.backend,
            db_path: options.db_file,
            sqlite: Arc::new(tokio::sync::RwLock::new(None)),
            build: Arc::new(BuildState::new()),
            cache: Arc::new(SuggestCache::new(options.suggest_ttl)),
            flat_write: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn store(&self) -> &Arc<ArticleStore> {
        &self.store
    }

    pub(crate) fn flat(&self) -> &FlatIndex {
        &self.flat
    }

    pub fn sqlite_selected(&self) -> bool {
        self.backend_kind == BackendKind::Sqlite
    }

    /// Label of the active backend's storage location / 当前后端位置标签
    pub fn active_label(&self) -> String {
        match self.backend_kind {
            BackendKind::Sqlite => format!("sqlite:{}", self.db_path.display()),
            BackendKind::Flat => format!("flat:{}", self.flat.path().display()),
        }
    }

    /// Lazily opened SQLite pool; None when not selected or unreachable
    /// 懒加载 SQLite 连接池
    pub(crate) async fn sqlite_backend(&self) -> Option<Arc<DbIndex>> {
        if !self.sqlite_selected() {
            return None;
        }

        {
            let guard = self.sqlite.read().await;
            if let Some(db) = guard.as_ref() {
                return Some(db.clone());
            }
        }

        let mut guard = self.sqlite.write().await;
        // 双重检查 / double check
        if let Some(db) = guard.as_ref() {
            return Some(db.clone());
        }
        match DbIndex::open(&self.db_path).await {
            Ok(db) => {
                let db = Arc::new(db);
                *guard = Some(db.clone());
                Some(db)
            }
            Err(e) => {
                tracing::warn!("Sqlite index unavailable, falling back to flat document: {}", e);
                None
            }
        }
    }

    /// Backend used by read paths: sqlite when selected and reachable,
    /// otherwise the flat document / 读路径使用的后端
    pub(crate) async fn read_backend(&self) -> Arc<dyn IndexBackend> {
        if self.sqlite_selected() {
            if let Some(db) = self.sqlite_backend().await {
                if db.is_available().await {
                    return Arc::new(SqliteBackend::new(db));
                }
                tracing::warn!("Sqlite index not responding, reading flat document instead");
            }
        }
        Arc::new(FlatBackend::new(self.flat.clone()))
    }

    /// Snapshot of the rebuild status / 构建状态快照
    pub fn status(&self) -> BuildStatus {
        self.build.status()
    }

    /// Aggregated storage + status info / 聚合信息
    pub async fn info(&self) -> IndexInfo {
        let sqlite = match self.sqlite_backend().await {
            Some(db) => Some(db.info().await),
            None => None,
        };
        IndexInfo {
            backend: self.active_label(),
            flat: self.flat.info(),
            sqlite,
            status: self.status(),
            last_mutation_ms: self.cache.last_mutation_ms(),
        }
    }
}
