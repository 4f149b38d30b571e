//! SQLite search index - secondary backend / SQLite 搜索索引（副后端）
//!
//! Alternate index store selected by configuration. Treated as optionally
//! available: every operation that can fail reports a falsy result instead
//! of an error, and callers fall back to the flat document.
//!
//! 特性 / characteristics:
//! - 独立数据库文件 + WAL 模式 / standalone database file, WAL mode
//! - 整行替换写入，无部分更新 / whole-row replaces, no partial patches
//! - replace_all 在单个事务内完成 / replace_all runs in one transaction

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::path::{Path, PathBuf};

use super::backend::{BackendInfo, RemoveOne};
use super::schema::{IndexEntry, INDEX_SCHEMA_VERSION};

/// SQLite index database / SQLite 索引数据库
pub struct DbIndex {
    db: Pool<Sqlite>,
    db_path: PathBuf,
}

impl DbIndex {
    /// Open (creating if needed) the index database / 打开索引数据库
    pub async fn open(db_path: impl Into<PathBuf>) -> Result<Self, String> {
        let db_path = db_path.into();

        // 确保目录存在 / ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
            }
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.to_string_lossy());
        let db = SqlitePoolOptions::new()
            .max_connections(2)
            .connect(&db_url)
            .await
            .map_err(|e| e.to_string())?;

        // 启用WAL模式，提高并发性能 / WAL mode for concurrent reads
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&db)
            .await
            .map_err(|e| e.to_string())?;

        sqlx::query("PRAGMA busy_timeout=5000")
            .execute(&db)
            .await
            .map_err(|e| e.to_string())?;

        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&db)
            .await
            .map_err(|e| e.to_string())?;

        let index = Self { db, db_path };
        index.init().await?;

        tracing::info!("Search index database opened: {:?} (WAL mode)", index.db_path);
        Ok(index)
    }

    /// 初始化表结构，只在表不存在时创建 / create tables if missing
    async fn init(&self) -> Result<(), String> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS index_pages (
                slug TEXT PRIMARY KEY,
                title TEXT NOT NULL DEFAULT '',
                category_id TEXT NOT NULL DEFAULT '',
                category_name TEXT NOT NULL DEFAULT '',
                security_profile TEXT NOT NULL DEFAULT 'standard',
                sensitive INTEGER NOT NULL DEFAULT 0,
                visibility TEXT NOT NULL DEFAULT 'all',
                allowed_users TEXT NOT NULL DEFAULT '[]',
                allowed_groups TEXT NOT NULL DEFAULT '[]',
                encrypted INTEGER NOT NULL DEFAULT 0,
                tags TEXT NOT NULL DEFAULT '[]',
                excerpt TEXT NOT NULL DEFAULT '',
                updated_at TEXT NOT NULL DEFAULT '',
                updated_by TEXT NOT NULL DEFAULT '',
                searchable_text TEXT NOT NULL DEFAULT '',
                updated_at_ms INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.db)
        .await
        .map_err(|e| e.to_string())?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_pages_category ON index_pages(category_id)")
            .execute(&self.db)
            .await
            .map_err(|e| e.to_string())?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await
        .map_err(|e| e.to_string())?;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Cheap liveness probe / 可用性探测
    pub async fn is_available(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.db).await.is_ok()
    }

    /// Storage info / 存储信息
    pub async fn info(&self) -> BackendInfo {
        let version: Option<u32> = sqlx::query_as::<_, (String,)>(
            "SELECT value FROM index_meta WHERE key = 'version'",
        )
        .fetch_optional(&self.db)
        .await
        .ok()
        .flatten()
        .and_then(|(v,)| v.parse().ok());

        let generated_at: String = sqlx::query_as::<_, (String,)>(
            "SELECT value FROM index_meta WHERE key = 'generated_at'",
        )
        .fetch_optional(&self.db)
        .await
        .ok()
        .flatten()
        .map(|(v,)| v)
        .unwrap_or_default();

        let total_entries: u64 = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM index_pages")
            .fetch_one(&self.db)
            .await
            .map(|(n,)| n as u64)
            .unwrap_or(0);

        BackendInfo {
            exists: version.is_some(),
            version: version.unwrap_or(0),
            total_entries,
            generated_at,
            size_bytes: self.size_bytes(),
        }
    }

    /// Database file size including WAL/SHM / 数据库文件大小
    pub fn size_bytes(&self) -> u64 {
        let db_shm = self.db_path.with_extension("db-shm");
        let db_wal = self.db_path.with_extension("db-wal");
        [&self.db_path, &db_shm, &db_wal]
            .iter()
            .map(|p| std::fs::metadata(p).map(|m| m.len()).unwrap_or(0))
            .sum()
    }

    /// All entries, newest first; None = unavailable or never built
    /// 读取全部条目
    pub async fn read_all(&self, category: Option<&str>) -> Option<Vec<IndexEntry>> {
        // 从未构建过的索引视为无法满足查询 / a never-built index cannot
        // satisfy queries, callers fall back
        let built = sqlx::query_as::<_, (String,)>(
            "SELECT value FROM index_meta WHERE key = 'version'",
        )
        .fetch_optional(&self.db)
        .await
        .ok()?;
        built?;

        let rows = if let Some(category) = category {
            sqlx::query("SELECT * FROM index_pages WHERE category_id = ? ORDER BY updated_at_ms DESC")
                .bind(category)
                .fetch_all(&self.db)
                .await
        } else {
            sqlx::query("SELECT * FROM index_pages ORDER BY updated_at_ms DESC")
                .fetch_all(&self.db)
                .await
        };

        match rows {
            Ok(rows) => Some(rows.iter().map(row_to_entry).collect()),
            Err(e) => {
                tracing::warn!("Failed to read sqlite index: {}", e);
                None
            }
        }
    }

    /// Insert-or-replace one entry / 覆盖写入单条
    pub async fn upsert_one(&self, entry: &IndexEntry) -> bool {
        // 增量写入的索引同样带版本标记 / incrementally-built indexes carry
        // the schema version too
        let stamped = sqlx::query(
            "INSERT OR IGNORE INTO index_meta (key, value) VALUES ('version', ?)",
        )
        .bind(INDEX_SCHEMA_VERSION.to_string())
        .execute(&self.db)
        .await;
        if let Err(e) = stamped {
            tracing::warn!("Sqlite meta stamp failed: {}", e);
            return false;
        }

        match self.bind_upsert(entry, &self.db).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Sqlite upsert failed for {}: {}", entry.slug, e);
                false
            }
        }
    }

    async fn bind_upsert<'e, E>(&self, entry: &IndexEntry, executor: E) -> Result<(), String>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO index_pages (
                slug, title, category_id, category_name, security_profile,
                sensitive, visibility, allowed_users, allowed_groups, encrypted,
                tags, excerpt, updated_at, updated_by, searchable_text, updated_at_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.slug)
        .bind(&entry.title)
        .bind(&entry.category_id)
        .bind(&entry.category_name)
        .bind(entry.security_profile.as_str())
        .bind(entry.sensitive as i32)
        .bind(entry.visibility.as_str())
        .bind(serde_json::to_string(&entry.allowed_users).unwrap_or_else(|_| "[]".to_string()))
        .bind(serde_json::to_string(&entry.allowed_groups).unwrap_or_else(|_| "[]".to_string()))
        .bind(entry.encrypted as i32)
        .bind(serde_json::to_string(&entry.tags).unwrap_or_else(|_| "[]".to_string()))
        .bind(&entry.excerpt)
        .bind(&entry.updated_at)
        .bind(&entry.updated_by)
        .bind(&entry.searchable_text)
        .bind(entry.updated_at_ms)
        .execute(executor)
        .await
        .map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Remove one slug / 删除单条
    pub async fn remove_one(&self, slug: &str) -> RemoveOne {
        match sqlx::query("DELETE FROM index_pages WHERE slug = ?")
            .bind(slug)
            .execute(&self.db)
            .await
        {
            Ok(result) => RemoveOne {
                available: true,
                updated: result.rows_affected() > 0,
            },
            Err(e) => {
                tracing::warn!("Sqlite remove failed for {}: {}", slug, e);
                RemoveOne {
                    available: false,
                    updated: false,
                }
            }
        }
    }

    /// Atomically replace the full entry set / 原子替换全部条目
    pub async fn replace_all(&self, entries: &[IndexEntry], generated_at: &str) -> bool {
        match self.do_replace_all(entries, generated_at).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Sqlite replace_all failed: {}", e);
                false
            }
        }
    }

    async fn do_replace_all(&self, entries: &[IndexEntry], generated_at: &str) -> Result<(), String> {
        let mut tx = self.db.begin().await.map_err(|e| e.to_string())?;

        sqlx::query("DELETE FROM index_pages")
            .execute(&mut *tx)
            .await
            .map_err(|e| e.to_string())?;

        for entry in entries {
            self.bind_upsert(entry, &mut *tx).await?;
        }

        sqlx::query("INSERT OR REPLACE INTO index_meta (key, value) VALUES ('version', ?)")
            .bind(INDEX_SCHEMA_VERSION.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| e.to_string())?;
        sqlx::query("INSERT OR REPLACE INTO index_meta (key, value) VALUES ('generated_at', ?)")
            .bind(generated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.to_string())?;

        tx.commit().await.map_err(|e| e.to_string())?;
        Ok(())
    }

    /// 关闭数据库连接池 / Close database connection pool
    pub async fn close(&self) {
        self.db.close().await;
    }
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> IndexEntry {
    let mut entry = IndexEntry {
        slug: row.get("slug"),
        title: row.get("title"),
        category_id: row.get("category_id"),
        category_name: row.get("category_name"),
        security_profile: crate::models::SecurityProfile::from_str_loose(
            row.get::<String, _>("security_profile").as_str(),
        ),
        sensitive: row.get::<i32, _>("sensitive") == 1,
        visibility: crate::models::Visibility::from_str_loose(
            row.get::<String, _>("visibility").as_str(),
        ),
        allowed_users: serde_json::from_str(row.get::<String, _>("allowed_users").as_str())
            .unwrap_or_default(),
        allowed_groups: serde_json::from_str(row.get::<String, _>("allowed_groups").as_str())
            .unwrap_or_default(),
        encrypted: row.get::<i32, _>("encrypted") == 1,
        tags: serde_json::from_str(row.get::<String, _>("tags").as_str()).unwrap_or_default(),
        excerpt: row.get("excerpt"),
        updated_at: row.get("updated_at"),
        updated_by: row.get("updated_by"),
        searchable_text: row.get("searchable_text"),
        updated_at_ms: row.get("updated_at_ms"),
    };
    entry.normalize();
    entry
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(slug: &str) -> IndexEntry {
        IndexEntry {
            slug: slug.to_string(),
            title: format!("Title {}", slug),
            tags: vec!["wiki".to_string()],
            allowed_users: vec!["alice".to_string()],
            updated_at: "2026-05-01T10:00:00Z".to_string(),
            searchable_text: format!("title {} wiki", slug),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_open_and_probe() {
        let dir = tempfile::tempdir().unwrap();
        let db = DbIndex::open(dir.path().join("index.db")).await.unwrap();
        assert!(db.is_available().await);
        assert!(!db.info().await.exists);
        db.close().await;
    }

    #[tokio::test]
    async fn test_replace_all_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let db = DbIndex::open(dir.path().join("index.db")).await.unwrap();

        assert!(db.replace_all(&[entry("a"), entry("b")], "2026-05-01T12:00:00Z").await);
        let info = db.info().await;
        assert!(info.exists);
        assert_eq!(info.version, INDEX_SCHEMA_VERSION);
        assert_eq!(info.total_entries, 2);
        assert_eq!(info.generated_at, "2026-05-01T12:00:00Z");

        let entries = db.read_all(None).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].allowed_users, vec!["alice"]);

        // 再次替换覆盖旧集 / second replace supersedes the first
        assert!(db.replace_all(&[entry("c")], "2026-05-02T12:00:00Z").await);
        let entries = db.read_all(None).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].slug, "c");
        db.close().await;
    }

    #[tokio::test]
    async fn test_upsert_and_remove_one() {
        let dir = tempfile::tempdir().unwrap();
        let db = DbIndex::open(dir.path().join("index.db")).await.unwrap();

        assert!(db.upsert_one(&entry("solo")).await);
        assert!(db.upsert_one(&entry("solo")).await);
        assert_eq!(db.read_all(None).await.unwrap().len(), 1);

        let removed = db.remove_one("solo").await;
        assert!(removed.available);
        assert!(removed.updated);

        let removed = db.remove_one("solo").await;
        assert!(removed.available);
        assert!(!removed.updated);
        db.close().await;
    }

    #[tokio::test]
    async fn test_category_filter() {
        let dir = tempfile::tempdir().unwrap();
        let db = DbIndex::open(dir.path().join("index.db")).await.unwrap();

        let mut a = entry("a");
        a.category_id = "ops".to_string();
        let mut b = entry("b");
        b.category_id = "dev".to_string();
        assert!(db.replace_all(&[a, b], "2026-05-01T12:00:00Z").await);

        let ops = db.read_all(Some("ops")).await.unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].slug, "a");
        db.close().await;
    }
}
