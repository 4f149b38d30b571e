//! Article CRUD endpoints / 文章增删改查接口
//!
//! Every successful mutation calls the incremental synchronizer right
//! after the authoritative write, and reports the sync outcome alongside
//! the article so operators can observe degraded (flat-fallback) mode.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use leafwiki_backend::models::{Article, ArticleDraft, ArticleSummary};
use leafwiki_backend::search::SyncOutcome;

use crate::api::ApiResponse;
use crate::state::AppState;

/// Index sync outcome attached to mutations / 附带的索引同步结果
#[derive(Debug, Serialize)]
pub struct SyncReport {
    pub updated: bool,
    pub reason: Option<&'static str>,
}

impl From<SyncOutcome> for SyncReport {
    fn from(outcome: SyncOutcome) -> Self {
        Self {
            updated: outcome.updated(),
            reason: outcome.reason(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MutationResponse {
    pub article: ArticleSummary,
    pub sync: SyncReport,
}

pub async fn list_articles(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<Vec<ArticleSummary>>> {
    match state.articles.list_all(false).await {
        Ok(summaries) => Json(ApiResponse::success(summaries)),
        Err(e) => {
            tracing::error!("Failed to list articles: {}", e);
            Json(ApiResponse::error(&format!("获取文章列表失败: {}", e)))
        }
    }
}

pub async fn get_article(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Json<ApiResponse<Article>> {
    match state.articles.get(&slug).await {
        Ok(Some(article)) => Json(ApiResponse::success(article)),
        Ok(None) => Json(ApiResponse::error("文章不存在")),
        Err(e) => {
            tracing::error!("Failed to read article {}: {}", slug, e);
            Json(ApiResponse::error(&format!("读取文章失败: {}", e)))
        }
    }
}

pub async fn create_article(
    State(state): State<Arc<AppState>>,
    Json(draft): Json<ArticleDraft>,
) -> Json<ApiResponse<MutationResponse>> {
    save_and_sync(&state, draft).await
}

pub async fn update_article(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Json(mut draft): Json<ArticleDraft>,
) -> Json<ApiResponse<MutationResponse>> {
    // 路径里的 slug 为准 / the path owns the slug
    draft.slug = slug;
    save_and_sync(&state, draft).await
}

async fn save_and_sync(
    state: &Arc<AppState>,
    draft: ArticleDraft,
) -> Json<ApiResponse<MutationResponse>> {
    let summary = match state.articles.save(draft).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!("Failed to save article: {}", e);
            return Json(ApiResponse::error(&format!("保存文章失败: {}", e)));
        }
    };

    // 权威写入成功后立即同步索引 / sync the index right after the write
    let sync = match state.index.upsert_by_slug(&summary.slug).await {
        Ok(outcome) => SyncReport::from(outcome),
        Err(e) => {
            tracing::warn!("Index sync failed for {}: {}", summary.slug, e);
            SyncReport {
                updated: false,
                reason: Some("sync_failed"),
            }
        }
    };

    Json(ApiResponse::success(MutationResponse { article: summary, sync }))
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
    pub sync: SyncReport,
}

pub async fn delete_article(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Json<ApiResponse<DeleteResponse>> {
    let deleted = match state.articles.delete(&slug).await {
        Ok(deleted) => deleted,
        Err(e) => {
            tracing::error!("Failed to delete article {}: {}", slug, e);
            return Json(ApiResponse::error(&format!("删除文章失败: {}", e)));
        }
    };

    let sync = match state.index.remove_by_slug(&slug).await {
        Ok(outcome) => SyncReport::from(outcome),
        Err(e) => {
            tracing::warn!("Index removal failed for {}: {}", slug, e);
            SyncReport {
                updated: false,
                reason: Some("sync_failed"),
            }
        }
    };

    Json(ApiResponse::success(DeleteResponse { deleted, sync }))
}
