use crate::config::toml_config::{self, TomlConfig};
use crate::utils::error::Result;
use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "chamahub")]
#[command(about = "ChamaHub group savings API server")]
pub struct CliConfig {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Override [server] bind
    #[arg(long)]
    pub bind: Option<String>,

    /// Override [storage] data_dir
    #[arg(long)]
    pub data_dir: Option<String>,

    /// Keep all data in memory (no snapshot on disk)
    #[arg(long)]
    pub in_memory: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Report process memory and CPU in the health endpoint")]
    pub monitor: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub json_logs: bool,
}

impl CliConfig {
    /// 載入 TOML 配置並套用命令列覆蓋設定
    pub fn resolve(&self) -> Result<TomlConfig> {
        let mut config = match &self.config {
            Some(path) => TomlConfig::from_file(path)?,
            None => TomlConfig::from_toml_str(DEFAULT_CONFIG)?,
        };

        if let Some(bind) = &self.bind {
            config.server.bind = bind.clone();
        }
        if let Some(data_dir) = &self.data_dir {
            config.storage.data_dir = data_dir.clone();
        }
        if self.in_memory {
            config.storage.persist = false;
        }
        if self.monitor {
            let monitoring = config.monitoring.get_or_insert(toml_config::MonitoringConfig {
                enabled: true,
                log_format: None,
            });
            monitoring.enabled = true;
        }
        if self.json_logs {
            let monitoring = config.monitoring.get_or_insert(toml_config::MonitoringConfig {
                enabled: false,
                log_format: None,
            });
            monitoring.log_format = Some("json".to_string());
        }

        Ok(config)
    }
}

/// 沒有指定設定檔時使用，密鑰由環境變數提供
const DEFAULT_CONFIG: &str = r#"
[auth]
jwt_secret = "${CHAMAHUB_JWT_SECRET}"
"#;
