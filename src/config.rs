use serde::{Deserialize, Serialize};

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub matching: MatchingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// 匹配阈值配置 - 默认值可由环境变量覆盖, 不写死在引擎里
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// 自动链接置信度阈值
    pub auto_link_threshold: f64,
    /// 歧义保护: 第一名与第二名的最小置信度差
    pub ambiguity_gap: f64,
    /// 模糊标题匹配下限 (低于此值噪声占主导)
    pub fuzzy_floor: f64,
    /// 建议记录最多保留的候选数
    pub max_suggestions: usize,
    /// 页内并发评估的工作任务数上限
    pub worker_concurrency: usize,
    /// 单项存储操作的最大尝试次数
    pub store_attempts: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            auto_link_threshold: 0.85,
            ambiguity_gap: 0.1,
            fuzzy_floor: 0.55,
            max_suggestions: 5,
            worker_concurrency: 8,
            store_attempts: 2,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "postgres://localhost/product_link".to_string()),
            },
            matching: MatchingConfig::default(),
        }
    }
}

impl AppConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Self {
        let defaults = MatchingConfig::default();
        Self {
            server: ServerConfig {
                host: std::env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: std::env::var("SERVER_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(8080),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "postgres://localhost/product_link".to_string()),
            },
            matching: MatchingConfig {
                auto_link_threshold: env_f64("MATCH_AUTO_LINK_THRESHOLD")
                    .unwrap_or(defaults.auto_link_threshold),
                ambiguity_gap: env_f64("MATCH_AMBIGUITY_GAP").unwrap_or(defaults.ambiguity_gap),
                fuzzy_floor: env_f64("MATCH_FUZZY_FLOOR").unwrap_or(defaults.fuzzy_floor),
                max_suggestions: env_usize("MATCH_MAX_SUGGESTIONS")
                    .unwrap_or(defaults.max_suggestions),
                worker_concurrency: env_usize("MATCH_WORKER_CONCURRENCY")
                    .unwrap_or(defaults.worker_concurrency),
                store_attempts: env_usize("MATCH_STORE_ATTEMPTS").unwrap_or(defaults.store_attempts),
            },
        }
    }
}

fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
