//! Application configuration module / 应用配置模块
//!
//! Manages application configuration loaded from config.json
//! Creates default config file on first run / 首次运行时创建默认配置文件

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Global configuration instance / 全局配置实例
static CONFIG: OnceCell<Arc<RwLock<AppConfig>>> = OnceCell::new();

/// Application configuration / 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration / 服务器配置
    pub server: ServerConfig,
    /// Wiki storage configuration / Wiki 存储配置
    pub wiki: WikiConfig,
    /// Search index configuration / 搜索索引配置
    pub search: SearchConfig,
}

/// Server configuration / 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address / 服务器监听地址
    pub host: String,
    /// Server port / 服务器端口
    pub port: u16,
}

/// Wiki storage configuration / Wiki 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WikiConfig {
    /// Data directory path / 数据目录路径
    pub data_dir: String,
    /// Articles directory (relative to data_dir) / 文章目录
    pub articles_dir: String,
    /// Article summary cache TTL in seconds / 摘要缓存有效期（秒）
    pub summary_cache_secs: u64,
}

/// Search index configuration / 搜索索引配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Active backend: "flat" or "sqlite" / 当前后端
    ///
    /// The flat document is always maintained either way; "sqlite" mirrors
    /// writes into the SQLite index as well.
    pub backend: String,
    /// Flat index document file (relative to data_dir) / 平面索引文件
    pub index_file: String,
    /// SQLite index database file (relative to data_dir) / SQLite 索引文件
    pub db_file: String,
    /// Suggestion cache TTL in seconds / 联想缓存有效期（秒）
    pub suggest_ttl_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            wiki: WikiConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8190,
        }
    }
}

impl Default for WikiConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            articles_dir: "articles".to_string(),
            summary_cache_secs: 30,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backend: "flat".to_string(),
            index_file: "search_index.json".to_string(),
            db_file: "search_index.db".to_string(),
            suggest_ttl_secs: 30,
        }
    }
}

impl AppConfig {
    /// Directory holding the article files / 文章文件目录
    pub fn get_articles_dir(&self) -> PathBuf {
        Path::new(&self.wiki.data_dir).join(&self.wiki.articles_dir)
    }

    /// Flat index document path / 平面索引文件路径
    pub fn get_index_file_path(&self) -> PathBuf {
        Path::new(&self.wiki.data_dir).join(&self.search.index_file)
    }

    /// SQLite index database path / SQLite 索引数据库路径
    pub fn get_search_db_path(&self) -> PathBuf {
        Path::new(&self.wiki.data_dir).join(&self.search.db_file)
    }
}

/// Initialize global config from file, writing defaults on first run
/// 初始化全局配置，首次运行时写出默认配置
pub fn init_config(path: &str) -> anyhow::Result<()> {
    let config = if Path::new(path).exists() {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)?
    } else {
        let config = AppConfig::default();
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(&config)?)?;
        tracing::info!("Default config written to {}", path);
        config
    };

    CONFIG.get_or_init(|| Arc::new(RwLock::new(config)));
    Ok(())
}

/// Get a snapshot of the current configuration / 获取当前配置快照
pub fn config() -> AppConfig {
    CONFIG
        .get_or_init(|| Arc::new(RwLock::new(AppConfig::default())))
        .read()
        .clone()
}
