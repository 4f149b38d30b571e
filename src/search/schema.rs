//! Index entry model and normalization / 索引条目模型与规范化
//!
//! The persisted index is a cache of untrusted provenance: it may have been
//! hand-edited, restored from a backup, or written by an older schema.
//! Every read therefore re-normalizes entries back into the canonical
//! shape instead of trusting the document.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::{Article, ArticleSummary, SecurityProfile, Visibility, PROTECTED_EXCERPT};
use crate::utils;

/// Schema version of the persisted index / 索引文档版本号
///
/// Bumped whenever the entry shape changes incompatibly; a mismatch always
/// forces a full rebuild, never a partial migration.
pub const INDEX_SCHEMA_VERSION: u32 = 3;

/// Cap on tags kept per entry / 每条目最多保留的标签数
pub const MAX_TAGS: usize = 24;

/// Max excerpt chars kept in the index / 索引内摘要最大字符数
pub const EXCERPT_MAX_CHARS: usize = 240;

/// One article's searchable metadata / 单篇文章的可搜索元数据
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct IndexEntry {
    pub slug: String,
    pub title: String,
    pub category_id: String,
    pub category_name: String,
    pub security_profile: SecurityProfile,
    #[serde(deserialize_with = "crate::models::de_strict_bool")]
    pub sensitive: bool,
    pub visibility: Visibility,
    pub allowed_users: Vec<String>,
    pub allowed_groups: Vec<String>,
    #[serde(deserialize_with = "crate::models::de_strict_bool")]
    pub encrypted: bool,
    pub tags: Vec<String>,
    pub excerpt: String,
    pub updated_at: String,
    pub updated_by: String,
    /// Lowercased, whitespace-normalized text blob for substring search;
    /// empty when the content must not be exposed
    pub searchable_text: String,
    /// Derived sort key, 0 when `updated_at` is unparsable
    pub updated_at_ms: i64,
}

impl IndexEntry {
    /// Bring a persisted/untrusted entry back to canonical shape
    /// 防御性规范化
    pub fn normalize(&mut self) {
        self.slug = utils::normalize_slug(&self.slug);
        self.title = self.title.trim().to_string();
        self.category_id = self.category_id.trim().to_lowercase();
        self.category_name = self.category_name.trim().to_string();

        self.allowed_users = normalize_set(&self.allowed_users, true);
        self.allowed_groups = normalize_set(&self.allowed_groups, false);

        self.tags = normalize_set(&self.tags, true);
        self.tags.truncate(MAX_TAGS);

        self.excerpt = utils::truncate_chars(self.excerpt.trim(), EXCERPT_MAX_CHARS);
        self.updated_by = self.updated_by.trim().to_lowercase();
        self.searchable_text = utils::normalize_text(&self.searchable_text);
        self.updated_at_ms = parse_updated_ms(&self.updated_at);
    }

    /// Derive an entry from a fully loaded article / 由完整文章派生条目
    pub fn from_article(article: &Article) -> Self {
        let mut entry = Self::from_summary(&article.summary);
        if article.content_safe {
            entry.excerpt = utils::derive_excerpt(&article.content, EXCERPT_MAX_CHARS);
            entry.searchable_text = utils::normalize_text(&format!(
                "{} {} {} {}",
                article.summary.title,
                article.summary.tags.join(" "),
                entry.excerpt,
                utils::strip_markdown(&article.content),
            ));
        }
        entry.normalize();
        entry
    }

    /// Minimal entry from a summary alone / 仅由摘要派生的最小条目
    ///
    /// Used when the article body fails to load during a rebuild and for
    /// the live-scan fallback: metadata is indexed, the body is not.
    pub fn from_summary(summary: &ArticleSummary) -> Self {
        let protected = summary.encrypted
            || summary.security_profile == SecurityProfile::Confidential;
        let mut entry = Self {
            slug: summary.slug.clone(),
            title: summary.title.clone(),
            category_id: summary.category_id.clone(),
            category_name: summary.category_name.clone(),
            security_profile: summary.security_profile,
            sensitive: summary.sensitive,
            visibility: summary.visibility,
            allowed_users: summary.allowed_users.clone(),
            allowed_groups: summary.allowed_groups.clone(),
            encrypted: summary.encrypted,
            tags: summary.tags.clone(),
            excerpt: if protected {
                PROTECTED_EXCERPT.to_string()
            } else {
                summary.excerpt.clone()
            },
            updated_at: summary.updated_at.clone(),
            updated_by: summary.updated_by.clone(),
            searchable_text: String::new(),
            updated_at_ms: 0,
        };
        entry.normalize();
        entry
    }
}

fn normalize_set(values: &[String], lowercase: bool) -> Vec<String> {
    let mut out: Vec<String> = values
        .iter()
        .map(|v| {
            if lowercase {
                v.trim().to_lowercase()
            } else {
                v.trim().to_string()
            }
        })
        .filter(|v| !v.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

/// RFC3339 timestamp to millis, falling back to 0 / 时间戳解析，失败回落 0
pub fn parse_updated_ms(updated_at: &str) -> i64 {
    chrono::DateTime::parse_from_rfc3339(updated_at)
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(0)
}

/// Stable drift-detection signature / 漂移检测签名
///
/// Order-independent digest over the comparison-relevant fields. Only the
/// consistency checker uses it; it is never stored.
pub fn entry_signature(entry: &IndexEntry) -> String {
    let mut users = entry.allowed_users.clone();
    users.sort();
    let mut groups = entry.allowed_groups.clone();
    groups.sort();
    let mut tags = entry.tags.clone();
    tags.sort();

    let mut hasher = Sha256::new();
    for part in [
        entry.slug.as_str(),
        entry.title.as_str(),
        entry.category_id.as_str(),
        entry.category_name.as_str(),
        entry.visibility.as_str(),
        if entry.encrypted { "1" } else { "0" },
        &users.join(","),
        &groups.join(","),
        &tags.join(","),
        entry.excerpt.as_str(),
        entry.updated_at.as_str(),
    ] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// The persisted flat document / 持久化的平面索引文档
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexDocument {
    pub version: u32,
    pub generated_at: String,
    pub total_pages: usize,
    pub pages: Vec<IndexEntry>,
}

impl Default for IndexDocument {
    fn default() -> Self {
        Self {
            version: INDEX_SCHEMA_VERSION,
            generated_at: String::new(),
            total_pages: 0,
            pages: Vec::new(),
        }
    }
}

impl IndexDocument {
    /// Build a document from freshly derived pages / 由新派生的条目构建文档
    pub fn from_pages(pages: Vec<IndexEntry>) -> Self {
        let mut doc = Self {
            version: INDEX_SCHEMA_VERSION,
            generated_at: String::new(),
            total_pages: 0,
            pages,
        };
        doc.normalize();
        doc
    }

    /// Normalize every page, drop duplicate slugs, restore recency order
    /// 规范化全部条目并去重
    pub fn normalize(&mut self) {
        for page in &mut self.pages {
            page.normalize();
        }
        self.pages.retain(|p| !p.slug.is_empty());

        let mut seen = std::collections::HashSet::new();
        self.pages.retain(|p| seen.insert(p.slug.clone()));

        self.sort_pages();
        self.total_pages = self.pages.len();
    }

    fn sort_pages(&mut self) {
        self.pages
            .sort_by(|a, b| b.updated_at_ms.cmp(&a.updated_at_ms).then_with(|| a.slug.cmp(&b.slug)));
    }

    /// Replace-if-present-else-append by slug / 按 slug 覆盖或追加
    pub fn upsert(&mut self, entry: IndexEntry) {
        self.pages.retain(|p| p.slug != entry.slug);
        self.pages.push(entry);
        self.sort_pages();
        self.total_pages = self.pages.len();
    }

    /// Remove by slug, reporting whether anything was dropped / 按 slug 删除
    pub fn remove(&mut self, slug: &str) -> bool {
        let before = self.pages.len();
        self.pages.retain(|p| p.slug != slug);
        self.total_pages = self.pages.len();
        before != self.pages.len()
    }

    /// Stamp generation time and derived count before persisting / 持久化前打点
    pub fn touch(&mut self) {
        self.generated_at = chrono::Utc::now().to_rfc3339();
        self.total_pages = self.pages.len();
    }
}
