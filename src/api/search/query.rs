use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use leafwiki_backend::search::{SearchFilters, SearchMatch};

use crate::api::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(flatten)]
    pub filters: SearchFilters,
}

fn default_limit() -> usize {
    50
}
fn default_page() -> usize {
    1
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchMatch>,
    pub total: usize,
    /// 过滤前的总命中数 / matches before pagination
    pub total_matched: usize,
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SearchRequest>,
) -> Json<ApiResponse<SearchResponse>> {
    let query = req.query.trim();
    if query.is_empty()
        && req.filters.category.is_none()
        && req.filters.tag.is_none()
        && req.filters.author.is_none()
    {
        return Json(ApiResponse::error("搜索关键词不能为空"));
    }

    let hits = state.index.search(query, &req.filters).await;
    let total_matched = hits.len();

    // 分页 / pagination
    let skip = req.page.saturating_sub(1) * req.limit;
    let results: Vec<SearchMatch> = hits.into_iter().skip(skip).take(req.limit).collect();
    let total = results.len();

    Json(ApiResponse::success(SearchResponse {
        results,
        total,
        total_matched,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SuggestParams {
    #[serde(default)]
    pub q: String,
    #[serde(default = "default_suggest_limit")]
    pub limit: usize,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
}

fn default_suggest_limit() -> usize {
    8
}

pub async fn suggest(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SuggestParams>,
) -> Json<ApiResponse<Vec<SearchMatch>>> {
    let filters = SearchFilters {
        category: params.category,
        tag: params.tag,
        author: params.author,
    };
    let hits = state.index.suggest(&params.q, params.limit, &filters).await;
    Json(ApiResponse::success(hits))
}
