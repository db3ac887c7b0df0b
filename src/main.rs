use chamahub::domain::ports::ConfigProvider;
use chamahub::utils::error::{ChamaError, ErrorSeverity};
use chamahub::utils::monitor::SystemMonitor;
use chamahub::utils::{logger, validation::Validate};
use chamahub::{build_app, serve, AppState, CliConfig, LocalStorage, MemoryStorage, Store};
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    let config = match cli.resolve() {
        Ok(config) => config,
        Err(e) => {
            // 日誌尚未初始化
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());
            std::process::exit(1);
        }
    };

    // 初始化日誌
    if config.json_logs() {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting chamahub {}", env!("CARGO_PKG_VERSION"));
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    if let Err(e) = run(config).await {
        tracing::error!(
            "❌ Server stopped: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 建議: {}", e.recovery_suggestion());
        std::process::exit(exit_code(&e));
    }
}

async fn run(config: chamahub::TomlConfig) -> chamahub::Result<()> {
    let monitor = SystemMonitor::new(config.monitoring_enabled());
    if config.monitoring_enabled() {
        tracing::info!("🔍 System monitoring enabled");
    }

    let store = if config.storage.persist {
        tracing::info!("📁 Data directory: {}", config.data_dir());
        let storage = Arc::new(LocalStorage::new(config.data_dir().to_string()));
        Store::open(storage, config.storage.snapshot_file.clone(), true).await?
    } else {
        tracing::info!("📁 Running with in-memory storage, nothing is saved");
        Store::open(Arc::new(MemoryStorage::new()), "", false).await?
    };

    let state = AppState::from_config(&config, Arc::new(store), monitor)?;
    let monitor = state.monitor.clone();
    monitor.log_stats("Startup");
    let app = build_app(state, &config.server);

    let listener = TcpListener::bind(config.bind_addr()).await?;
    tracing::info!("🚀 Listening on http://{}", listener.local_addr()?);

    serve(listener, app, shutdown_signal()).await?;
    monitor.log_stats("Shutdown");
    tracing::info!("✅ Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("❌ Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

// 根據錯誤嚴重程度決定退出碼
fn exit_code(e: &ChamaError) -> i32 {
    match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    }
}
