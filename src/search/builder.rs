//! Full rebuild orchestration / 全量重建编排
//!
//! Drives the scan → build → write state machine and guarantees at most
//! one rebuild in flight. The in-flight handle is a compare-and-set flag
//! taken synchronously before any await point, so two near-simultaneous
//! `start_rebuild` calls can never both win; the `running` status field is
//! presentation only and never consulted for the guard.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

use super::schema::{IndexDocument, IndexEntry};
use super::SearchIndex;

/// Rebuild phase / 重建阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BuildPhase {
    #[default]
    Idle,
    Scanning,
    Building,
    Writing,
    Done,
    Error,
}

/// Rebuild progress snapshot / 重建进度快照
#[derive(Debug, Clone, Serialize, Default)]
pub struct BuildStatus {
    pub running: bool,
    pub phase: BuildPhase,
    pub message: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub total: u64,
    pub processed: u64,
    /// Derived, 0-100
    pub percent: u8,
    pub error: Option<String>,
    /// Storage location label of the active backend
    pub index_file: String,
}

/// Rebuild lifecycle state / 重建生命周期状态
///
/// Created once per engine at startup, reset (never replaced) at the start
/// of each rebuild. Only the orchestrator mutates it; the synchronizer and
/// the consistency checker only read `is_in_flight`.
pub struct BuildState {
    in_flight: AtomicBool,
    status: parking_lot::RwLock<BuildStatus>,
    settled: tokio::sync::Notify,
}

impl BuildState {
    pub fn new() -> Self {
        Self {
            in_flight: AtomicBool::new(false),
            status: parking_lot::RwLock::new(BuildStatus::default()),
            settled: tokio::sync::Notify::new(),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Claim the single-flight handle / 抢占单飞句柄
    ///
    /// Returns false if a rebuild already holds it. On success the status
    /// is reset into `scanning` before the caller does any async work.
    pub(crate) fn try_begin(&self, index_file: &str) -> bool {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        let mut status = self.status.write();
        *status = BuildStatus {
            running: true,
            phase: BuildPhase::Scanning,
            message: "scanning articles".to_string(),
            started_at: Some(chrono::Utc::now().to_rfc3339()),
            finished_at: None,
            total: 0,
            processed: 0,
            percent: 0,
            error: None,
            index_file: index_file.to_string(),
        };
        true
    }

    pub(crate) fn set_phase(&self, phase: BuildPhase, message: &str) {
        let mut status = self.status.write();
        status.phase = phase;
        status.message = message.to_string();
    }

    pub(crate) fn set_total(&self, total: u64) {
        let mut status = self.status.write();
        status.total = total;
    }

    pub(crate) fn inc_processed(&self) {
        let mut status = self.status.write();
        status.processed += 1;
        if status.total > 0 {
            status.percent = ((status.processed * 100) / status.total).min(100) as u8;
        }
    }

    fn settle(&self, phase: BuildPhase, message: String, error: Option<String>) {
        {
            let mut status = self.status.write();
            status.running = false;
            status.phase = phase;
            status.message = message;
            status.error = error;
            status.finished_at = Some(chrono::Utc::now().to_rfc3339());
            if phase == BuildPhase::Done {
                status.percent = 100;
            }
        }
        // 状态写完后再释放句柄 / release the handle only after the status settles
        self.in_flight.store(false, Ordering::SeqCst);
        self.settled.notify_waiters();
    }

    pub(crate) fn finish_ok(&self, message: String) {
        self.settle(BuildPhase::Done, message, None);
    }

    /// Keeps partial progress counters already recorded / 保留已记录的进度
    pub(crate) fn finish_err(&self, error: String) {
        self.settle(BuildPhase::Error, "index rebuild failed".to_string(), Some(error));
    }

    pub fn status(&self) -> BuildStatus {
        self.status.read().clone()
    }

    /// Wait until no rebuild is in flight / 等待重建落定
    pub async fn wait_until_settled(&self) {
        loop {
            let notified = self.settled.notified();
            if !self.is_in_flight() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for BuildState {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a start request / 启动请求结果
#[derive(Debug, Clone, Serialize)]
pub struct RebuildStart {
    pub started: bool,
    pub status: BuildStatus,
}

impl SearchIndex {
    /// Start a full rebuild unless one is already in flight / 启动全量重建
    ///
    /// The rebuild runs on a spawned task and always settles on its own;
    /// abandoning the returned value does not cancel it.
    pub fn start_rebuild(&self) -> RebuildStart {
        if !self.build.try_begin(&self.active_label()) {
            return RebuildStart {
                started: false,
                status: self.build.status(),
            };
        }

        let index = self.clone();
        tokio::spawn(async move {
            if let Err(e) = index.run_rebuild().await {
                tracing::error!("Index rebuild failed: {}", e);
                index.build.finish_err(e);
            }
        });

        RebuildStart {
            started: true,
            status: self.build.status(),
        }
    }

    async fn run_rebuild(&self) -> Result<(), String> {
        // scanning: 强制扫描，不信任任何缓存 / forced scan, no cache
        let summaries = self.store().list_all(true).await?;
        self.build.set_total(summaries.len() as u64);

        self.build.set_phase(BuildPhase::Building, "deriving index entries");
        let mut pages = Vec::with_capacity(summaries.len());
        for summary in &summaries {
            let entry = match self.store().get(&summary.slug).await {
                Ok(Some(article)) => IndexEntry::from_article(&article),
                Ok(None) => {
                    // 构建期间文章消失，按摘要降级 / vanished mid-build
                    IndexEntry::from_summary(summary)
                }
                Err(e) => {
                    // 单篇失败不阻塞整个重建 / one bad article must not abort
                    tracing::warn!("Article {} failed to load during rebuild: {}", summary.slug, e);
                    IndexEntry::from_summary(summary)
                }
            };
            pages.push(entry);
            self.build.inc_processed();
        }

        self.build.set_phase(BuildPhase::Writing, "persisting index");
        let mut doc = IndexDocument::from_pages(pages);
        let generated_at = chrono::Utc::now().to_rfc3339();

        let mut persisted = vec!["flat"];
        if self.sqlite_selected() {
            let ok = match self.sqlite_backend().await {
                Some(db) => db.replace_all(&doc.pages, &generated_at).await,
                None => false,
            };
            if ok {
                persisted.push("sqlite");
            } else {
                tracing::warn!("Sqlite index write failed during rebuild, flat document only");
            }
        }

        // 平面文档无条件写入，作为持久化兜底 / unconditional durability floor
        {
            let _guard = self.flat_write.lock().await;
            self.flat().write_document(&mut doc)?;
        }
        self.cache.mark_dirty();

        let message = format!("indexed {} pages ({})", doc.total_pages, persisted.join("+"));
        tracing::info!("Index rebuild completed: {}", message);
        self.build.finish_ok(message);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::articles::ArticleStore;
    use crate::models::{ArticleDraft, SecurityProfile, Visibility};
    use crate::search::{BackendKind, IndexOptions};
    use std::sync::Arc;
    use std::time::Duration;

    pub(crate) fn draft(slug: &str, title: &str, content: &str) -> ArticleDraft {
        ArticleDraft {
            slug: slug.to_string(),
            title: title.to_string(),
            category_id: "general".to_string(),
            category_name: "General".to_string(),
            security_profile: SecurityProfile::Standard,
            sensitive: false,
            visibility: Visibility::All,
            allowed_users: Vec::new(),
            allowed_groups: Vec::new(),
            encrypted: false,
            tags: Vec::new(),
            content: content.to_string(),
            updated_by: "tester".to_string(),
        }
    }

    pub(crate) async fn test_index(dir: &std::path::Path, backend: BackendKind) -> SearchIndex {
        let store =
            Arc::new(ArticleStore::new(dir.join("articles"), Duration::from_secs(30)).unwrap());
        SearchIndex::new(
            store,
            IndexOptions {
                index_file: dir.join("search_index.json"),
                db_file: dir.join("search_index.db"),
                backend,
                suggest_ttl: Duration::from_secs(30),
            },
        )
    }

    #[tokio::test]
    async fn test_rebuild_indexes_all_articles() {
        let dir = tempfile::tempdir().unwrap();
        let index = test_index(dir.path(), BackendKind::Flat).await;
        for slug in ["a", "b", "c"] {
            index.store().save(draft(slug, slug, "body text")).await.unwrap();
        }

        let start = index.start_rebuild();
        assert!(start.started);
        index.build.wait_until_settled().await;

        let status = index.status();
        assert_eq!(status.phase, BuildPhase::Done);
        assert_eq!(status.total, 3);
        assert_eq!(status.processed, 3);
        assert_eq!(status.percent, 100);
        assert!(status.error.is_none());

        let doc = index.flat().read_document().unwrap().unwrap();
        assert_eq!(doc.total_pages, 3);
    }

    #[tokio::test]
    async fn test_rebuild_single_flight() {
        let dir = tempfile::tempdir().unwrap();
        let index = test_index(dir.path(), BackendKind::Flat).await;
        for i in 0..20 {
            index
                .store()
                .save(draft(&format!("page-{}", i), "Page", "body"))
                .await
                .unwrap();
        }

        let first = index.start_rebuild();
        let second = index.start_rebuild();
        let started: Vec<bool> = vec![first.started, second.started];
        assert_eq!(started.iter().filter(|s| **s).count(), 1);
        assert!(first.started);
        assert!(second.status.running);

        index.build.wait_until_settled().await;
        let doc = index.flat().read_document().unwrap().unwrap();
        assert_eq!(doc.total_pages, 20);

        // 落定后可以再次启动 / can start again once settled
        assert!(index.start_rebuild().started);
        index.build.wait_until_settled().await;
    }

    #[tokio::test]
    async fn test_rebuild_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let index = test_index(dir.path(), BackendKind::Flat).await;
        index.store().save(draft("alpha", "Alpha", "first body")).await.unwrap();
        index.store().save(draft("beta", "Beta", "second body")).await.unwrap();

        assert!(index.start_rebuild().started);
        index.build.wait_until_settled().await;
        let first = index.flat().read_document().unwrap().unwrap();

        assert!(index.start_rebuild().started);
        index.build.wait_until_settled().await;
        let second = index.flat().read_document().unwrap().unwrap();

        // 只有 generated_at 不同 / identical apart from generated_at
        let strip = |doc: &IndexDocument| {
            let mut d = doc.clone();
            d.generated_at = String::new();
            serde_json::to_string(&d).unwrap()
        };
        assert_eq!(strip(&first), strip(&second));
    }

    #[tokio::test]
    async fn test_rebuild_mirrors_to_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let index = test_index(dir.path(), BackendKind::Sqlite).await;
        index.store().save(draft("alpha", "Alpha", "body")).await.unwrap();

        assert!(index.start_rebuild().started);
        index.build.wait_until_settled().await;

        let db = index.sqlite_backend().await.unwrap();
        let entries = db.read_all(None).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].slug, "alpha");

        // 平面文档仍然写入 / flat document still written
        assert_eq!(index.flat().read_document().unwrap().unwrap().total_pages, 1);
        assert!(index.status().message.contains("flat+sqlite"));
    }

    #[tokio::test]
    async fn test_rebuild_survives_unreachable_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let index = test_index(dir.path(), BackendKind::Sqlite).await;
        // 数据库路径被目录占用，无法打开 / db path blocked by a directory
        std::fs::create_dir_all(dir.path().join("search_index.db")).unwrap();

        index.store().save(draft("alpha", "Alpha", "body")).await.unwrap();
        assert!(index.start_rebuild().started);
        index.build.wait_until_settled().await;

        let status = index.status();
        assert_eq!(status.phase, BuildPhase::Done);
        assert!(status.message.contains("(flat)"));
        assert_eq!(index.flat().read_document().unwrap().unwrap().total_pages, 1);
    }
}
