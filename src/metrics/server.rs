use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;

use crate::health::{HealthStatus, StatusRegistry};

struct ServerState {
    registry: Registry,
    status: Arc<StatusRegistry>,
}

/// Start the metrics HTTP server
/// This should be called in a separate thread/runtime to avoid conflicts
pub async fn start_metrics_server(
    registry: Registry,
    status: Arc<StatusRegistry>,
    port: u16,
) -> std::io::Result<()> {
    tracing::info!("📊 Starting metrics server on http://0.0.0.0:{}/metrics", port);

    let state = web::Data::new(ServerState { registry, status });

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/metrics", web::get().to(metrics_handler))
            .route("/health", web::get().to(health_handler))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

async fn metrics_handler(state: web::Data<ServerState>) -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = state.registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

async fn health_handler(state: web::Data<ServerState>) -> impl Responder {
    let health = state.status.snapshot().await;

    let components: serde_json::Map<String, serde_json::Value> = health
        .components
        .values()
        .map(|c| (c.name.clone(), status_json(&c.status, Some(c.last_transition))))
        .collect();

    let body = serde_json::json!({
        "status": status_json(&health.overall_status, None),
        "components": components,
        "checked_at": health.check_time,
        "service": "ca-bundle-injector"
    });

    if health.overall_status.is_healthy() {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

fn status_json(
    status: &HealthStatus,
    since: Option<chrono::DateTime<chrono::Utc>>,
) -> serde_json::Value {
    match status {
        HealthStatus::Healthy => serde_json::json!({ "state": "healthy", "since": since }),
        HealthStatus::Degraded { reason, message } => serde_json::json!({
            "state": "degraded",
            "reason": reason,
            "message": message,
            "since": since,
        }),
    }
}
