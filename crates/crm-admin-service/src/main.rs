//! CRM 管理后台服务
//!
//! 提供自动化规则配置、试运行与手动执行的 REST API。

use std::sync::Arc;
use std::time::Duration;

use axum::{Json, Router, http::HeaderValue, middleware, routing::get};
use crm_admin_service::{
    activity::{ActivityLogSink, MemoryActivityLog},
    repository::{
        AutomationRuleRepositoryTrait, MemoryAutomationRuleRepository, PgAutomationRuleRepository,
    },
    routes,
    service::AutomationRuleService,
    state::AppState,
};
use crm_shared::{
    config::{AppConfig, StorageBackend},
    database::Database,
    observability::{self, middleware as obs_middleware},
};
use rule_engine::{LoggingDispatcher, RuleEventSink};
use tokio::net::TcpListener;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};
use tracing::{error, info, warn};

const SERVICE_NAME: &str = "crm-admin-service";
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 统一加载配置：default.toml -> {env}.toml -> {service_name}.toml -> 环境变量
    let config = AppConfig::load(SERVICE_NAME).unwrap_or_default();

    let obs_config = config.observability.clone().with_service_name(SERVICE_NAME);
    let _guard = observability::init(&obs_config).await?;

    info!("Starting {} on {}", SERVICE_NAME, config.server_addr());

    let (repo, events, db): (
        Arc<dyn AutomationRuleRepositoryTrait>,
        Arc<dyn RuleEventSink>,
        Option<Database>,
    ) = match config.storage.backend {
        StorageBackend::Postgres => {
            let db = Database::connect(&config.database).await?;
            if config.storage.run_migrations {
                sqlx::migrate!("./migrations").run(db.pool()).await?;
                info!("Database migrations applied");
            }
            (
                Arc::new(PgAutomationRuleRepository::new(db.pool().clone())),
                Arc::new(ActivityLogSink::new(db.pool().clone())),
                Some(db),
            )
        }
        StorageBackend::Memory => {
            warn!("Using in-memory rule storage; data is lost on restart");
            (
                Arc::new(MemoryAutomationRuleRepository::new()),
                Arc::new(MemoryActivityLog::new()),
                None,
            )
        }
    };

    let mut service = AutomationRuleService::new(repo, events, Arc::new(LoggingDispatcher));
    if matches!(obs_config.log_level.as_str(), "debug" | "trace") {
        service = service.with_trace();
    }
    let state = AppState::new(Arc::new(service));

    let cors = build_cors(&config.server.cors_origins, config.is_production());

    let app = Router::new()
        .nest("/api", routes::api_routes())
        .route("/health", get(health_check))
        .route(
            "/ready",
            get(move || readiness_check(db.clone())),
        )
        .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
        .layer(CompressionLayer::new())
        .layer(cors)
        // 可观测性中间件：请求追踪和指标收集
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id))
        .with_state(state);

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");

    Ok(())
}

/// 根据逗号分隔的来源列表构建 CORS 层，"*" 表示允许全部来源
fn build_cors(allowed_origins: &str, production: bool) -> CorsLayer {
    if allowed_origins.trim() == "*" {
        if production {
            warn!("cors_origins=\"*\" 在生产环境中不安全，请设置为具体域名");
        }
        info!("CORS allowed_origins: * (all origins)");
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    info!("CORS allowed_origins: {}", allowed_origins);
    let origins: Vec<HeaderValue> = allowed_origins
        .split(',')
        .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// 监听关闭信号
///
/// 收到 SIGTERM 或 Ctrl+C 后返回，触发 axum 的优雅关闭流程。
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("注册 Ctrl+C 处理器失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("注册 SIGTERM 处理器失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}

/// 存活探针
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": SERVICE_NAME
    }))
}

/// 就绪探针：使用 PostgreSQL 存储时检查数据库连接
async fn readiness_check(db: Option<Database>) -> Json<serde_json::Value> {
    let database = match db {
        Some(db) => {
            if db.health_check().await.is_ok() {
                "ok"
            } else {
                "fail"
            }
        }
        None => "skipped",
    };

    Json(serde_json::json!({
        "status": if database == "fail" { "degraded" } else { "ok" },
        "service": SERVICE_NAME,
        "checks": {
            "database": database
        }
    }))
}
