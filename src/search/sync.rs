//! Incremental index synchronization / 增量索引同步
//!
//! Applies single-article upserts/removals without a full rebuild. Writes
//! always land in the flat document; when the SQLite backend is selected
//! the same operation is mirrored there, degrading to the flat document
//! with an explicit reason when SQLite is unavailable.
//!
//! Calls arriving while a full rebuild is in flight are rejected rather
//! than interleaved: a stale single-entry write must never clobber a
//! whole-document replace.

use super::schema::IndexEntry;
use super::SearchIndex;
use crate::utils;

/// Outcome of an incremental sync call / 增量同步结果
///
/// Closed set so callers pattern-match instead of string-comparing; the
/// HTTP layer serializes `reason()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Entry written to every configured backend
    Updated,
    /// Entry written, but only the flat document - sqlite was unavailable
    UpdatedFlatFallback,
    /// Entry removed from every configured backend
    Removed,
    /// Entry removed, but only from the flat document
    RemovedFlatFallback,
    /// Nothing to do: the slug wasn't indexed
    NotIndexed,
    /// Sqlite unavailable and the flat document had nothing to do either
    SqliteUnavailable,
    /// A full rebuild is in flight; retry later
    RebuildRunning,
    /// Empty/invalid slug, storage untouched
    InvalidSlug,
}

impl SyncOutcome {
    /// Whether the call changed any backend / 是否发生了写入
    pub fn updated(&self) -> bool {
        matches!(
            self,
            Self::Updated | Self::UpdatedFlatFallback | Self::Removed | Self::RemovedFlatFallback
        )
    }

    /// Machine-readable reason, None for a plain success / 原因码
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Self::Updated | Self::Removed => None,
            Self::UpdatedFlatFallback | Self::RemovedFlatFallback => {
                Some("sqlite_unavailable_flat_fallback")
            }
            Self::NotIndexed => Some("not_indexed"),
            Self::SqliteUnavailable => Some("sqlite_unavailable"),
            Self::RebuildRunning => Some("rebuild_running"),
            Self::InvalidSlug => Some("invalid_slug"),
        }
    }
}

impl SearchIndex {
    /// Re-derive and merge one article's entry / 重新派生并合并单篇条目
    ///
    /// If the article no longer exists the call delegates to
    /// `remove_by_slug`, so callers can fire-and-forget after any mutation.
    pub async fn upsert_by_slug(&self, slug: &str) -> Result<SyncOutcome, String> {
        let slug = utils::normalize_slug(slug);
        if slug.is_empty() {
            return Ok(SyncOutcome::InvalidSlug);
        }
        if self.build.is_in_flight() {
            return Ok(SyncOutcome::RebuildRunning);
        }

        let Some(article) = self.store().get(&slug).await? else {
            return self.remove_by_slug(&slug).await;
        };
        let entry = IndexEntry::from_article(&article);

        {
            let _guard = self.flat_write.lock().await;
            self.flat().upsert_entry(entry.clone())?;
        }

        let outcome = if self.sqlite_selected() {
            let mirrored = match self.sqlite_backend().await {
                Some(db) => db.upsert_one(&entry).await,
                None => false,
            };
            if mirrored {
                SyncOutcome::Updated
            } else {
                tracing::warn!("Sqlite upsert unavailable for {}, flat document updated", slug);
                SyncOutcome::UpdatedFlatFallback
            }
        } else {
            SyncOutcome::Updated
        };

        self.cache.mark_dirty();
        Ok(outcome)
    }

    /// Filter one slug out of the index / 从索引中移除单个 slug
    pub async fn remove_by_slug(&self, slug: &str) -> Result<SyncOutcome, String> {
        let slug = utils::normalize_slug(slug);
        if slug.is_empty() {
            return Ok(SyncOutcome::InvalidSlug);
        }
        if self.build.is_in_flight() {
            return Ok(SyncOutcome::RebuildRunning);
        }

        let flat_removed = {
            let _guard = self.flat_write.lock().await;
            self.flat().remove_entry(&slug)?
        };

        let outcome = if self.sqlite_selected() {
            let mirror = match self.sqlite_backend().await {
                Some(db) => db.remove_one(&slug).await,
                None => super::backend::RemoveOne {
                    available: false,
                    updated: false,
                },
            };
            if mirror.available {
                if flat_removed || mirror.updated {
                    SyncOutcome::Removed
                } else {
                    SyncOutcome::NotIndexed
                }
            } else if flat_removed {
                SyncOutcome::RemovedFlatFallback
            } else {
                SyncOutcome::SqliteUnavailable
            }
        } else if flat_removed {
            SyncOutcome::Removed
        } else {
            SyncOutcome::NotIndexed
        };

        if outcome.updated() {
            self.cache.mark_dirty();
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::builder::tests::{draft, test_index};
    use crate::search::BackendKind;

    #[tokio::test]
    async fn test_invalid_slug_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let index = test_index(dir.path(), BackendKind::Flat).await;

        assert_eq!(index.upsert_by_slug("  ").await.unwrap(), SyncOutcome::InvalidSlug);
        assert_eq!(index.remove_by_slug("").await.unwrap(), SyncOutcome::InvalidSlug);
        // 未触达存储 / storage untouched
        assert!(!index.flat().exists());
    }

    #[tokio::test]
    async fn test_upsert_remove_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let index = test_index(dir.path(), BackendKind::Flat).await;
        index.store().save(draft("alpha", "Alpha", "alpha body")).await.unwrap();

        assert_eq!(index.upsert_by_slug("alpha").await.unwrap(), SyncOutcome::Updated);
        let doc = index.flat().read_document().unwrap().unwrap();
        assert_eq!(doc.total_pages, 1);

        assert_eq!(index.remove_by_slug("alpha").await.unwrap(), SyncOutcome::Removed);
        let doc = index.flat().read_document().unwrap().unwrap();
        assert_eq!(doc.total_pages, 0);
        assert!(index.search("alpha", &Default::default()).await.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_vanished_article_removes() {
        let dir = tempfile::tempdir().unwrap();
        let index = test_index(dir.path(), BackendKind::Flat).await;
        index.store().save(draft("ghost", "Ghost", "boo")).await.unwrap();
        assert_eq!(index.upsert_by_slug("ghost").await.unwrap(), SyncOutcome::Updated);

        index.store().delete("ghost").await.unwrap();
        assert_eq!(index.upsert_by_slug("ghost").await.unwrap(), SyncOutcome::Removed);
        assert_eq!(index.flat().read_document().unwrap().unwrap().total_pages, 0);
    }

    #[tokio::test]
    async fn test_remove_missing_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let index = test_index(dir.path(), BackendKind::Flat).await;

        let outcome = index.remove_by_slug("never-indexed").await.unwrap();
        assert_eq!(outcome, SyncOutcome::NotIndexed);
        assert!(!outcome.updated());
        assert_eq!(outcome.reason(), Some("not_indexed"));
    }

    #[tokio::test]
    async fn test_rejected_while_rebuild_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        let index = test_index(dir.path(), BackendKind::Flat).await;
        index.store().save(draft("a", "A", "body")).await.unwrap();

        // 手动占用单飞句柄模拟构建中 / hold the single-flight handle
        assert!(index.build.try_begin("flat:test"));
        assert_eq!(index.upsert_by_slug("a").await.unwrap(), SyncOutcome::RebuildRunning);
        assert_eq!(index.remove_by_slug("a").await.unwrap(), SyncOutcome::RebuildRunning);
        index.build.finish_ok("test".to_string());

        assert_eq!(index.upsert_by_slug("a").await.unwrap(), SyncOutcome::Updated);
    }

    #[tokio::test]
    async fn test_sqlite_mirroring() {
        let dir = tempfile::tempdir().unwrap();
        let index = test_index(dir.path(), BackendKind::Sqlite).await;
        index.store().save(draft("beta", "Beta", "beta body")).await.unwrap();

        assert_eq!(index.upsert_by_slug("beta").await.unwrap(), SyncOutcome::Updated);
        let db = index.sqlite_backend().await.unwrap();
        assert_eq!(db.read_all(None).await.unwrap().len(), 1);

        assert_eq!(index.remove_by_slug("beta").await.unwrap(), SyncOutcome::Removed);
        assert!(db.read_all(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_unavailable_falls_back_to_flat() {
        let dir = tempfile::tempdir().unwrap();
        let index = test_index(dir.path(), BackendKind::Sqlite).await;
        // 数据库路径被目录占用，无法打开 / db path blocked by a directory
        std::fs::create_dir_all(dir.path().join("search_index.db")).unwrap();
        index.store().save(draft("beta", "Beta", "beta body")).await.unwrap();

        let outcome = index.upsert_by_slug("beta").await.unwrap();
        assert_eq!(outcome, SyncOutcome::UpdatedFlatFallback);
        assert!(outcome.updated());
        assert_eq!(outcome.reason(), Some("sqlite_unavailable_flat_fallback"));

        // 平面文档包含新条目 / flat document holds the entry
        let doc = index.flat().read_document().unwrap().unwrap();
        assert_eq!(doc.pages[0].slug, "beta");

        // 删除同样降级 / removal degrades the same way
        assert_eq!(
            index.remove_by_slug("beta").await.unwrap(),
            SyncOutcome::RemovedFlatFallback
        );
        // 两边都没有可删的 / nothing left to do anywhere
        assert_eq!(
            index.remove_by_slug("beta").await.unwrap(),
            SyncOutcome::SqliteUnavailable
        );
    }
}
