//! Article store - file-backed authoritative source / 文章存储
//!
//! One JSON document per article at `<articles_dir>/<slug>.json`, holding
//! metadata, markdown content and a sha256 content checksum. Other code
//! paths (imports, restores) may write these files directly, so the store
//! makes no freshness promises beyond what a forced scan observes.
//!
//! Redaction happens here: summaries and articles for encrypted,
//! confidential or checksum-failed content never expose a plaintext
//! preview, and `content_safe` tells the index whether the body may be
//! searched at all.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::models::{
    Article, ArticleDraft, ArticleSummary, SecurityProfile, PROTECTED_EXCERPT,
};
use crate::utils;

/// Max chars kept in a derived excerpt / 摘要最大字符数
pub const EXCERPT_MAX_CHARS: usize = 240;

/// On-disk article document / 磁盘上的文章文档
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
struct ArticleFile {
    slug: String,
    title: String,
    category_id: String,
    category_name: String,
    security_profile: SecurityProfile,
    #[serde(deserialize_with = "crate::models::de_strict_bool")]
    sensitive: bool,
    visibility: crate::models::Visibility,
    allowed_users: Vec<String>,
    allowed_groups: Vec<String>,
    #[serde(deserialize_with = "crate::models::de_strict_bool")]
    encrypted: bool,
    tags: Vec<String>,
    content: String,
    checksum: String,
    updated_at: String,
    updated_by: String,
}

struct SummaryCache {
    summaries: Vec<ArticleSummary>,
    fetched_at: Instant,
}

/// File-backed article store / 文件文章存储
pub struct ArticleStore {
    dir: PathBuf,
    cache: RwLock<Option<SummaryCache>>,
    cache_ttl: Duration,
}

impl ArticleStore {
    pub fn new(dir: impl Into<PathBuf>, cache_ttl: Duration) -> Result<Self, String> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| e.to_string())?;
        Ok(Self {
            dir,
            cache: RwLock::new(None),
            cache_ttl,
        })
    }

    fn article_path(&self, slug: &str) -> PathBuf {
        self.dir.join(format!("{}.json", slug))
    }

    /// Enumerate all articles / 枚举全部文章
    ///
    /// `force` bypasses the summary cache and always scans the directory;
    /// index rebuilds and consistency checks must use it.
    pub async fn list_all(&self, force: bool) -> Result<Vec<ArticleSummary>, String> {
        if !force {
            let guard = self.cache.read();
            if let Some(cache) = guard.as_ref() {
                if cache.fetched_at.elapsed() < self.cache_ttl {
                    return Ok(cache.summaries.clone());
                }
            }
        }

        let summaries = self.scan()?;
        *self.cache.write() = Some(SummaryCache {
            summaries: summaries.clone(),
            fetched_at: Instant::now(),
        });
        Ok(summaries)
    }

    fn scan(&self) -> Result<Vec<ArticleSummary>, String> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| e.to_string())?;
        let mut summaries = Vec::new();

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            // 单个损坏文件不阻塞枚举 / one broken file must not block the scan
            match self.read_file(&path) {
                Ok(file) => {
                    let verified = verify_checksum(&file);
                    summaries.push(summarize(&file, verified));
                }
                Err(e) => {
                    tracing::warn!("Skipping unreadable article file {:?}: {}", path, e);
                }
            }
        }

        summaries.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(summaries)
    }

    fn read_file(&self, path: &Path) -> Result<ArticleFile, String> {
        let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        let mut file: ArticleFile = serde_json::from_str(&content).map_err(|e| e.to_string())?;
        file.slug = utils::normalize_slug(&file.slug);
        Ok(file)
    }

    /// Full read with checksum verification / 完整读取并校验
    pub async fn get(&self, slug: &str) -> Result<Option<Article>, String> {
        let slug = utils::normalize_slug(slug);
        if slug.is_empty() {
            return Ok(None);
        }
        let path = self.article_path(&slug);
        if !path.exists() {
            return Ok(None);
        }

        let file = self.read_file(&path)?;
        let verified = verify_checksum(&file);
        if !verified {
            tracing::warn!("Article {} failed checksum verification", slug);
        }
        let content_safe =
            verified && !file.encrypted && file.security_profile != SecurityProfile::Confidential;

        Ok(Some(Article {
            summary: summarize(&file, verified),
            content: file.content,
            content_safe,
        }))
    }

    /// Whole-file replace via tmp+rename / 整文件替换写入
    pub async fn save(&self, draft: ArticleDraft) -> Result<ArticleSummary, String> {
        let slug = utils::normalize_slug(&draft.slug);
        if slug.is_empty() {
            return Err("invalid slug".to_string());
        }

        let file = ArticleFile {
            slug: slug.clone(),
            title: draft.title,
            category_id: draft.category_id,
            category_name: draft.category_name,
            security_profile: draft.security_profile,
            sensitive: draft.sensitive,
            visibility: draft.visibility,
            allowed_users: draft.allowed_users,
            allowed_groups: draft.allowed_groups,
            encrypted: draft.encrypted,
            tags: draft.tags,
            checksum: content_checksum(&draft.content),
            content: draft.content,
            updated_at: chrono::Utc::now().to_rfc3339(),
            updated_by: draft.updated_by,
        };

        let path = self.article_path(&slug);
        let tmp_path = path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(&file).map_err(|e| e.to_string())?;
        std::fs::write(&tmp_path, body).map_err(|e| e.to_string())?;
        std::fs::rename(&tmp_path, &path).map_err(|e| e.to_string())?;

        self.invalidate_cache();
        Ok(summarize(&file, true))
    }

    /// Delete an article file / 删除文章文件
    pub async fn delete(&self, slug: &str) -> Result<bool, String> {
        let slug = utils::normalize_slug(slug);
        let path = self.article_path(&slug);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path).map_err(|e| e.to_string())?;
        self.invalidate_cache();
        Ok(true)
    }

    pub fn invalidate_cache(&self) {
        *self.cache.write() = None;
    }
}

/// sha256 over the raw content / 内容校验和
pub fn content_checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

fn verify_checksum(file: &ArticleFile) -> bool {
    // Legacy files without a checksum are taken at face value
    file.checksum.is_empty() || file.checksum == content_checksum(&file.content)
}

fn summarize(file: &ArticleFile, verified: bool) -> ArticleSummary {
    let protected = file.encrypted
        || file.security_profile == SecurityProfile::Confidential
        || !verified;
    let excerpt = if protected {
        PROTECTED_EXCERPT.to_string()
    } else {
        utils::derive_excerpt(&file.content, EXCERPT_MAX_CHARS)
    };

    ArticleSummary {
        slug: utils::normalize_slug(&file.slug),
        title: file.title.trim().to_string(),
        category_id: file.category_id.trim().to_lowercase(),
        category_name: file.category_name.trim().to_string(),
        security_profile: file.security_profile,
        sensitive: file.sensitive,
        visibility: file.visibility,
        allowed_users: file.allowed_users.iter().map(|u| u.trim().to_lowercase()).collect(),
        allowed_groups: file.allowed_groups.iter().map(|g| g.trim().to_string()).collect(),
        encrypted: file.encrypted,
        tags: file.tags.iter().map(|t| t.trim().to_lowercase()).collect(),
        excerpt,
        updated_at: file.updated_at.clone(),
        updated_by: file.updated_by.trim().to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Visibility;

    fn draft(slug: &str, content: &str) -> ArticleDraft {
        ArticleDraft {
            slug: slug.to_string(),
            title: format!("Title {}", slug),
            category_id: "general".to_string(),
            category_name: "General".to_string(),
            security_profile: SecurityProfile::Standard,
            sensitive: false,
            visibility: Visibility::All,
            allowed_users: Vec::new(),
            allowed_groups: Vec::new(),
            encrypted: false,
            tags: vec!["Guide".to_string()],
            content: content.to_string(),
            updated_by: "Admin".to_string(),
        }
    }

    #[tokio::test]
    async fn test_save_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArticleStore::new(dir.path(), Duration::from_secs(30)).unwrap();

        store.save(draft("Alpha", "# Alpha\n\nHello world.")).await.unwrap();
        let article = store.get("alpha").await.unwrap().unwrap();
        assert_eq!(article.summary.slug, "alpha");
        assert!(article.content_safe);
        assert_eq!(article.summary.tags, vec!["guide"]);
        assert_eq!(article.summary.updated_by, "admin");
        assert!(article.summary.excerpt.contains("Hello world"));

        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_forced_scan_sees_direct_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArticleStore::new(dir.path(), Duration::from_secs(600)).unwrap();

        store.save(draft("a", "one")).await.unwrap();
        assert_eq!(store.list_all(false).await.unwrap().len(), 1);

        // 模拟其他进程直接写文件 / simulate a direct file write by another code path
        let other = ArticleStore::new(dir.path(), Duration::from_secs(600)).unwrap();
        other.save(draft("b", "two")).await.unwrap();

        // cached listing is stale, forced scan is not
        assert_eq!(store.list_all(false).await.unwrap().len(), 1);
        assert_eq!(store.list_all(true).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_tampered_content_is_redacted() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArticleStore::new(dir.path(), Duration::from_secs(30)).unwrap();
        store.save(draft("secret", "the secret plaintext")).await.unwrap();

        // Corrupt the content without fixing the checksum
        let path = dir.path().join("secret.json");
        let raw = std::fs::read_to_string(&path).unwrap();
        let tampered = raw.replace("the secret plaintext", "tampered secret plaintext");
        std::fs::write(&path, tampered).unwrap();

        let article = store.get("secret").await.unwrap().unwrap();
        assert!(!article.content_safe);
        assert_eq!(article.summary.excerpt, PROTECTED_EXCERPT);
    }

    #[tokio::test]
    async fn test_encrypted_never_exposes_preview() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArticleStore::new(dir.path(), Duration::from_secs(30)).unwrap();
        let mut d = draft("vault", "ciphertextblob");
        d.encrypted = true;
        store.save(d).await.unwrap();

        let article = store.get("vault").await.unwrap().unwrap();
        assert!(!article.content_safe);
        assert_eq!(article.summary.excerpt, PROTECTED_EXCERPT);
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArticleStore::new(dir.path(), Duration::from_secs(30)).unwrap();
        store.save(draft("gone", "x")).await.unwrap();
        assert!(store.delete("gone").await.unwrap());
        assert!(!store.delete("gone").await.unwrap());
        assert!(store.get("gone").await.unwrap().is_none());
    }
}
