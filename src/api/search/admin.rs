use axum::extract::State;
use axum::Json;
use std::sync::Arc;

use leafwiki_backend::search::{BuildStatus, ConsistencyResult, IndexInfo, RebuildStart};

use crate::api::ApiResponse;
use crate::state::AppState;

/// 触发全量重建 / Start a full index rebuild
///
/// `started=false` with the current status when one is already in flight;
/// that is contention, not an error.
pub async fn rebuild_index(State(state): State<Arc<AppState>>) -> Json<ApiResponse<RebuildStart>> {
    let start = state.index.start_rebuild();
    if !start.started {
        tracing::debug!("Rebuild requested while one is already running");
    }
    Json(ApiResponse::success(start))
}

/// 查询构建状态 / Current rebuild status snapshot
pub async fn index_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<BuildStatus>> {
    Json(ApiResponse::success(state.index.status()))
}

/// 查询索引存储信息 / Aggregated backend storage info
pub async fn index_info(State(state): State<Arc<AppState>>) -> Json<ApiResponse<IndexInfo>> {
    Json(ApiResponse::success(state.index.info().await))
}

/// 一致性检查，必要时重建 / Consistency check, rebuilding when needed
pub async fn check_consistency(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<ConsistencyResult>> {
    match state.index.ensure_consistency().await {
        Ok(result) => Json(ApiResponse::success(result)),
        Err(e) => {
            tracing::error!("Consistency check failed: {}", e);
            Json(ApiResponse::error(&format!("一致性检查失败: {}", e)))
        }
    }
}
