//! Consistency checking and self-healing / 一致性检查与自愈
//!
//! Articles are edited directly as files by other code paths (imports,
//! restores), so the persisted index can silently drift from the store.
//! This module compares the live article set against the active backend
//! and triggers a full rebuild when they disagree. Meant to be called
//! opportunistically - at startup, before serving search, or when the
//! backend configuration changes - not on a schedule.

use serde::Serialize;
use std::collections::HashMap;

use super::schema::{entry_signature, IndexEntry, INDEX_SCHEMA_VERSION};
use super::SearchIndex;
use crate::models::ArticleSummary;

/// Why the index was (or wasn't) rebuilt / 重建原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyReason {
    UpToDate,
    IndexMissing,
    VersionMismatch,
    PageCountMismatch,
    MissingPage,
    ChangedPageMetadata,
    SqliteUnavailable,
    RebuildAlreadyRunning,
}

impl ConsistencyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UpToDate => "up_to_date",
            Self::IndexMissing => "index_missing",
            Self::VersionMismatch => "version_mismatch",
            Self::PageCountMismatch => "page_count_mismatch",
            Self::MissingPage => "missing_page",
            Self::ChangedPageMetadata => "changed_page_metadata",
            Self::SqliteUnavailable => "sqlite_unavailable",
            Self::RebuildAlreadyRunning => "rebuild_already_running",
        }
    }
}

/// Consistency check verdict / 一致性检查结果
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ConsistencyResult {
    pub rebuilt: bool,
    pub reason: ConsistencyReason,
}

impl SearchIndex {
    /// Detect drift and rebuild when needed / 检测漂移并按需重建
    ///
    /// If a rebuild is already in flight the call waits for it to settle
    /// and reports that, without starting another one. Otherwise any
    /// non-up-to-date verdict starts a rebuild and waits for it to settle
    /// before returning.
    pub async fn ensure_consistency(&self) -> Result<ConsistencyResult, String> {
        if self.build.is_in_flight() {
            self.build.wait_until_settled().await;
            return Ok(ConsistencyResult {
                rebuilt: false,
                reason: ConsistencyReason::RebuildAlreadyRunning,
            });
        }

        // 强制扫描，与缓存无关 / forced scan
        let live = self.store().list_all(true).await?;
        let reason = self.detect_drift(&live).await;

        if reason == ConsistencyReason::UpToDate {
            return Ok(ConsistencyResult {
                rebuilt: false,
                reason,
            });
        }

        tracing::info!("Index inconsistent ({}), rebuilding", reason.as_str());
        self.start_rebuild();
        self.build.wait_until_settled().await;
        Ok(ConsistencyResult {
            rebuilt: true,
            reason,
        })
    }

    /// The ordered drift ladder of reasons / 按序判定漂移原因
    async fn detect_drift(&self, live: &[ArticleSummary]) -> ConsistencyReason {
        let backend: std::sync::Arc<dyn super::IndexBackend> = if self.sqlite_selected() {
            match self.sqlite_backend().await {
                Some(db) if db.is_available().await => {
                    std::sync::Arc::new(super::SqliteBackend::new(db))
                }
                _ => return ConsistencyReason::SqliteUnavailable,
            }
        } else {
            std::sync::Arc::new(super::FlatBackend::new(self.flat().clone()))
        };

        let info = backend.info().await;
        if !info.exists {
            return ConsistencyReason::IndexMissing;
        }
        // 版本不匹配等同缺失，绝不做部分迁移 / mismatch == missing, never migrate
        if info.version != INDEX_SCHEMA_VERSION {
            return ConsistencyReason::VersionMismatch;
        }

        let Some(entries) = backend.read_all(None).await else {
            return if self.sqlite_selected() {
                ConsistencyReason::SqliteUnavailable
            } else {
                ConsistencyReason::IndexMissing
            };
        };

        compare_sets(live, &entries)
    }
}

fn compare_sets(live: &[ArticleSummary], indexed: &[IndexEntry]) -> ConsistencyReason {
    if indexed.len() != live.len() {
        return ConsistencyReason::PageCountMismatch;
    }

    let by_slug: HashMap<&str, &IndexEntry> =
        indexed.iter().map(|e| (e.slug.as_str(), e)).collect();

    for summary in live {
        let Some(entry) = by_slug.get(summary.slug.as_str()) else {
            return ConsistencyReason::MissingPage;
        };
        let expected = IndexEntry::from_summary(summary);
        if entry_signature(entry) != entry_signature(&expected) {
            return ConsistencyReason::ChangedPageMetadata;
        }
    }

    ConsistencyReason::UpToDate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::builder::tests::{draft, test_index};
    use crate::search::BackendKind;

    #[tokio::test]
    async fn test_missing_index_triggers_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let index = test_index(dir.path(), BackendKind::Flat).await;
        index.store().save(draft("a", "A", "body")).await.unwrap();

        let result = index.ensure_consistency().await.unwrap();
        assert!(result.rebuilt);
        assert_eq!(result.reason, ConsistencyReason::IndexMissing);

        let result = index.ensure_consistency().await.unwrap();
        assert!(!result.rebuilt);
        assert_eq!(result.reason, ConsistencyReason::UpToDate);
    }

    #[tokio::test]
    async fn test_page_count_mismatch_detected_and_healed() {
        let dir = tempfile::tempdir().unwrap();
        let index = test_index(dir.path(), BackendKind::Flat).await;
        // 先索引 a、b / index a and b
        for slug in ["a", "b"] {
            index.store().save(draft(slug, slug, "body")).await.unwrap();
        }
        assert!(index.start_rebuild().started);
        index.build.wait_until_settled().await;

        // 第三篇绕过同步直接落盘 / third article lands without a sync call
        index.store().save(draft("c", "c", "body")).await.unwrap();

        let result = index.ensure_consistency().await.unwrap();
        assert!(result.rebuilt);
        assert_eq!(result.reason, ConsistencyReason::PageCountMismatch);
        assert_eq!(index.flat().read_document().unwrap().unwrap().total_pages, 3);

        let result = index.ensure_consistency().await.unwrap();
        assert!(!result.rebuilt);
        assert_eq!(result.reason, ConsistencyReason::UpToDate);
    }

    #[tokio::test]
    async fn test_missing_page_detected() {
        let dir = tempfile::tempdir().unwrap();
        let index = test_index(dir.path(), BackendKind::Flat).await;
        for slug in ["a", "b"] {
            index.store().save(draft(slug, slug, "body")).await.unwrap();
        }
        assert!(index.start_rebuild().started);
        index.build.wait_until_settled().await;

        // 同数量但 slug 不同 / same count, different slug
        index.store().delete("b").await.unwrap();
        index.store().save(draft("z", "z", "body")).await.unwrap();

        let result = index.ensure_consistency().await.unwrap();
        assert!(result.rebuilt);
        assert_eq!(result.reason, ConsistencyReason::MissingPage);
    }

    #[tokio::test]
    async fn test_changed_metadata_detected() {
        let dir = tempfile::tempdir().unwrap();
        let index = test_index(dir.path(), BackendKind::Flat).await;
        index.store().save(draft("a", "Old Title", "body")).await.unwrap();
        assert!(index.start_rebuild().started);
        index.build.wait_until_settled().await;

        index.store().save(draft("a", "New Title", "body")).await.unwrap();

        let result = index.ensure_consistency().await.unwrap();
        assert!(result.rebuilt);
        assert_eq!(result.reason, ConsistencyReason::ChangedPageMetadata);
    }

    #[tokio::test]
    async fn test_version_mismatch_forces_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let index = test_index(dir.path(), BackendKind::Flat).await;
        index.store().save(draft("a", "A", "body")).await.unwrap();
        assert!(index.start_rebuild().started);
        index.build.wait_until_settled().await;

        // 手工篡改版本号 / hand-edit the version tag
        let path = dir.path().join("search_index.json");
        let doc = std::fs::read_to_string(&path).unwrap();
        let doc = doc.replace(
            &format!("\"version\":{}", INDEX_SCHEMA_VERSION),
            "\"version\":1",
        );
        std::fs::write(&path, doc).unwrap();

        let result = index.ensure_consistency().await.unwrap();
        assert!(result.rebuilt);
        assert_eq!(result.reason, ConsistencyReason::VersionMismatch);
    }

    #[tokio::test]
    async fn test_sqlite_unavailable_reason() {
        let dir = tempfile::tempdir().unwrap();
        let index = test_index(dir.path(), BackendKind::Sqlite).await;
        std::fs::create_dir_all(dir.path().join("search_index.db")).unwrap();
        index.store().save(draft("a", "A", "body")).await.unwrap();

        let result = index.ensure_consistency().await.unwrap();
        assert!(result.rebuilt);
        assert_eq!(result.reason, ConsistencyReason::SqliteUnavailable);
        // 重建仍把平面文档写全 / the rebuild still fills the flat document
        assert_eq!(index.flat().read_document().unwrap().unwrap().total_pages, 1);
    }
}
