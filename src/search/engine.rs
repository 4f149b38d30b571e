//! Query engine - search and suggestions / 查询引擎
//!
//! Read-only scoring over a lazily built in-memory projection of the
//! persisted index. The projection is rebuilt from a single backend read
//! when it has never been built, is past its TTL, or was marked dirty by
//! an incremental mutation; category-scoped projections are built on
//! demand and never cached. Neither operation ever returns an error to the
//! caller: a broken or missing persisted index degrades to a direct,
//! uncached scan of the live article set.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::schema::IndexEntry;
use super::SearchIndex;
use crate::utils;

/// Scoring weights, strictly ordered so a title-prefix hit always outranks
/// everything below it / 分层权重，严格有序
const WEIGHT_TITLE_PREFIX: i64 = 1000;
const WEIGHT_TITLE_CONTAINS: i64 = 400;
const WEIGHT_TAG_PREFIX: i64 = 150;
const WEIGHT_TAG_CONTAINS: i64 = 60;
const WEIGHT_TEXT_CONTAINS: i64 = 25;
const WEIGHT_FILTER_MATCH: i64 = 10;

/// Suggestion limit bounds / 联想数量上下界
const SUGGEST_MIN: usize = 1;
const SUGGEST_MAX: usize = 15;

/// Structured search filters / 结构化过滤条件
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchFilters {
    /// Scope to one category (projection built uncached) / 按分类过滤
    pub category: Option<String>,
    /// Require a tag / 按标签过滤
    pub tag: Option<String>,
    /// Require the last editor / 按作者过滤
    pub author: Option<String>,
}

impl SearchFilters {
    fn normalized(&self) -> Self {
        let clean = |v: &Option<String>| {
            v.as_deref()
                .map(utils::normalize_term)
                .filter(|s| !s.is_empty())
        };
        Self {
            category: clean(&self.category),
            tag: clean(&self.tag),
            author: clean(&self.author),
        }
    }

    fn gates(&self) -> bool {
        self.category.is_some() || self.tag.is_some() || self.author.is_some()
    }
}

/// One ranked hit / 单条命中
#[derive(Debug, Clone, Serialize)]
pub struct SearchMatch {
    #[serde(flatten)]
    pub entry: IndexEntry,
    pub score: i64,
}

/// Entry with precomputed lowercase projections / 预小写的投影条目
pub struct ProjectedEntry {
    pub(crate) entry: IndexEntry,
    title_lower: String,
    tags_lower: Vec<String>,
    text_lower: String,
}

impl ProjectedEntry {
    fn new(entry: IndexEntry) -> Self {
        Self {
            title_lower: entry.title.to_lowercase(),
            tags_lower: entry.tags.clone(),
            text_lower: entry.searchable_text.clone(),
            entry,
        }
    }
}

struct CacheSlot {
    entries: Arc<Vec<ProjectedEntry>>,
    built_at: Instant,
}

/// Time-bounded projection cache / 有时限的投影缓存
///
/// Explicit `{entries, built_at}` slot plus a dirty flag the incremental
/// synchronizer sets through `mark_dirty`. A projection that finishes
/// building while a mutation lands is accepted as-is; the dirty flag
/// forces the next access to rebuild.
pub struct SuggestCache {
    slot: parking_lot::RwLock<Option<CacheSlot>>,
    dirty: AtomicBool,
    last_mutation_ms: AtomicI64,
    ttl: Duration,
}

impl SuggestCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slot: parking_lot::RwLock::new(None),
            dirty: AtomicBool::new(false),
            last_mutation_ms: AtomicI64::new(0),
            ttl,
        }
    }

    /// Invalidate after a mutation / 变更后标脏
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
        self.last_mutation_ms
            .store(chrono::Utc::now().timestamp_millis(), Ordering::SeqCst);
    }

    pub fn last_mutation_ms(&self) -> i64 {
        self.last_mutation_ms.load(Ordering::SeqCst)
    }

    fn fresh(&self) -> Option<Arc<Vec<ProjectedEntry>>> {
        if self.dirty.load(Ordering::SeqCst) {
            return None;
        }
        let guard = self.slot.read();
        let slot = guard.as_ref()?;
        if slot.built_at.elapsed() > self.ttl {
            return None;
        }
        Some(slot.entries.clone())
    }

    /// Clear the dirty flag before reading the backend, so a mutation that
    /// lands mid-build re-dirties the cache for the next access
    fn begin_build(&self) {
        self.dirty.store(false, Ordering::SeqCst);
    }

    fn store_entries(&self, entries: Arc<Vec<ProjectedEntry>>) {
        *self.slot.write() = Some(CacheSlot {
            entries,
            built_at: Instant::now(),
        });
    }
}

impl SearchIndex {
    /// Rank all matching entries / 对全部命中排序
    ///
    /// Score descending, ties broken by recency. Never errors: a broken
    /// index degrades to a live scan, an empty query with no filters
    /// yields nothing.
    pub async fn search(&self, query: &str, filters: &SearchFilters) -> Vec<SearchMatch> {
        let term = utils::normalize_term(query);
        let filters = filters.normalized();
        if term.is_empty() && !filters.gates() {
            return Vec::new();
        }

        let projection = self.projection_for(&filters).await;
        let mut matches: Vec<SearchMatch> = projection
            .iter()
            .filter_map(|p| {
                score_entry(p, &term, &filters).map(|score| SearchMatch {
                    entry: p.entry.clone(),
                    score,
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| b.entry.updated_at_ms.cmp(&a.entry.updated_at_ms))
                .then_with(|| a.entry.slug.cmp(&b.entry.slug))
        });
        matches
    }

    /// Typeahead: top-`limit` matches / 联想补全
    pub async fn suggest(&self, prefix: &str, limit: usize, filters: &SearchFilters) -> Vec<SearchMatch> {
        let limit = limit.clamp(SUGGEST_MIN, SUGGEST_MAX);
        let mut matches = self.search(prefix, filters).await;
        matches.truncate(limit);
        matches
    }

    async fn projection_for(&self, filters: &SearchFilters) -> Arc<Vec<ProjectedEntry>> {
        // 分类投影不缓存，避免无限多的缓存变体 / category projections are uncached
        if let Some(category) = filters.category.as_deref() {
            return self.build_projection(Some(category)).await;
        }

        if let Some(entries) = self.cache.fresh() {
            return entries;
        }

        self.cache.begin_build();
        let entries = self.build_projection(None).await;
        self.cache.store_entries(entries.clone());
        entries
    }

    /// One consistent read of the persisted index, with a live-scan
    /// fallback when it cannot satisfy the query / 单次一致读取＋兜底扫描
    ///
    /// The fallback fires only when the persisted index is missing or
    /// unreadable - a legitimately empty index stays empty, it does not
    /// resurrect removed entries from the live store.
    async fn build_projection(&self, category: Option<&str>) -> Arc<Vec<ProjectedEntry>> {
        let backend = self.read_backend().await;
        let entries = match backend.read_all(category).await {
            Some(entries) => entries,
            None => self.live_scan(category).await,
        };

        Arc::new(entries.into_iter().map(ProjectedEntry::new).collect())
    }

    /// Correct but slow last resort / 正确但缓慢的兜底
    async fn live_scan(&self, category: Option<&str>) -> Vec<IndexEntry> {
        match self.store().list_all(false).await {
            Ok(summaries) => summaries
                .iter()
                .filter(|s| category.map_or(true, |c| s.category_id.to_lowercase() == c))
                .map(IndexEntry::from_summary)
                .collect(),
            Err(e) => {
                tracing::warn!("Live article scan failed during search fallback: {}", e);
                Vec::new()
            }
        }
    }
}

/// Score one entry; None = not eligible / 打分，None 表示不命中
fn score_entry(p: &ProjectedEntry, term: &str, filters: &SearchFilters) -> Option<i64> {
    let mut boost = 0i64;
    if let Some(tag) = filters.tag.as_deref() {
        if !p.tags_lower.iter().any(|t| t == tag) {
            return None;
        }
        boost += WEIGHT_FILTER_MATCH;
    }
    if let Some(author) = filters.author.as_deref() {
        if p.entry.updated_by != author {
            return None;
        }
        boost += WEIGHT_FILTER_MATCH;
    }

    let mut score = 0i64;
    if !term.is_empty() {
        if p.title_lower.starts_with(term) {
            score += WEIGHT_TITLE_PREFIX;
        } else if p.title_lower.contains(term) {
            score += WEIGHT_TITLE_CONTAINS;
        }

        if p.tags_lower.iter().any(|t| t.starts_with(term)) {
            score += WEIGHT_TAG_PREFIX;
        } else if p.tags_lower.iter().any(|t| t.contains(term)) {
            score += WEIGHT_TAG_CONTAINS;
        }

        if p.text_lower.contains(term) {
            score += WEIGHT_TEXT_CONTAINS;
        }

        // 零分条目仅在满足过滤条件时保留 / zero-score entries survive only
        // when a required filter matched
        if score == 0 && !filters.gates() {
            return None;
        }
    }

    Some(score + boost)
}
