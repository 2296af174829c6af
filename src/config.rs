use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub claim: ClaimConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// 领取相关配置，全部带默认值
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimConfig {
    /// 单个红包最小金额（分）
    pub minimum_unit_cents: i64,
    /// 乐观锁冲突后的基础退避（毫秒）
    pub backoff_ms: u64,
    /// 退避抖动上限（毫秒），实际等待为 backoff_ms + [0, jitter_ms]
    pub jitter_ms: u64,
    /// 最大提交尝试次数；None 表示不设上限，由调用方取消信号兜底
    pub max_attempts: Option<u32>,
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            minimum_unit_cents: 1,
            backoff_ms: 50,
            jitter_ms: 25,
            max_attempts: None,
        }
    }
}

impl Config {
    pub fn from_toml() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        // 尝试读取配置文件，如果不存在则完全依赖环境变量
        let mut config: Config = match std::fs::read_to_string(&config_path) {
            Ok(config_str) => {
                toml::from_str(&config_str).map_err(|e| format!("解析配置文件失败: {e}"))?
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // 数据库 URL 在无配置文件时必须提供
                let database_url = env::var("DATABASE_URL")
                    .map_err(|_| "缺少 DATABASE_URL 环境变量，且未找到配置文件 config.toml")?;

                Config {
                    database: DatabaseConfig {
                        url: database_url,
                        max_connections: env::var("DB_MAX_CONNECTIONS")
                            .ok()
                            .and_then(|v| v.parse().ok())
                            .unwrap_or(10),
                    },
                    claim: ClaimConfig::default(),
                }
            }
            Err(e) => {
                return Err(format!("无法读取配置文件 {config_path}: {e}").into());
            }
        };

        // 环境变量覆盖（即便文件存在时也覆盖）
        if let Ok(v) = env::var("DATABASE_URL") {
            config.database.url = v;
        }
        if let Ok(v) = env::var("DB_MAX_CONNECTIONS")
            && let Ok(mc) = v.parse()
        {
            config.database.max_connections = mc;
        }
        if let Ok(v) = env::var("CLAIM_MINIMUM_UNIT_CENTS")
            && let Ok(n) = v.parse()
        {
            config.claim.minimum_unit_cents = n;
        }
        if let Ok(v) = env::var("CLAIM_BACKOFF_MS")
            && let Ok(n) = v.parse()
        {
            config.claim.backoff_ms = n;
        }
        if let Ok(v) = env::var("CLAIM_JITTER_MS")
            && let Ok(n) = v.parse()
        {
            config.claim.jitter_ms = n;
        }
        if let Ok(v) = env::var("CLAIM_MAX_ATTEMPTS")
            && let Ok(n) = v.parse()
        {
            config.claim.max_attempts = Some(n);
        }

        Ok(config)
    }
}
