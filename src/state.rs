use leafwiki_backend::articles::ArticleStore;
use leafwiki_backend::config::AppConfig;
use leafwiki_backend::search::{BackendKind, IndexOptions, SearchIndex};
use std::sync::Arc;
use std::time::Duration;

/// Shared application state / 共享应用状态
pub struct AppState {
    pub articles: Arc<ArticleStore>,
    pub index: SearchIndex,
}

impl AppState {
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let articles = Arc::new(
            ArticleStore::new(
                cfg.get_articles_dir(),
                Duration::from_secs(cfg.wiki.summary_cache_secs),
            )
            .map_err(|e| anyhow::anyhow!("failed to open article store: {}", e))?,
        );

        let index = SearchIndex::new(
            articles.clone(),
            IndexOptions {
                index_file: cfg.get_index_file_path(),
                db_file: cfg.get_search_db_path(),
                backend: BackendKind::from_config(&cfg.search.backend),
                suggest_ttl: Duration::from_secs(cfg.search.suggest_ttl_secs),
            },
        );

        Ok(Self { articles, index })
    }
}
