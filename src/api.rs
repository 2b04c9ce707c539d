//! HTTP facade consumed by the dashboard collaborator.
//!
//! Retrieval runs on the blocking pool under the configured timeout; a
//! timeout degrades that one request to rule-only scoring instead of
//! failing it, exactly as if no index were loaded.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use metrics::counter;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::degrade::Mode;
use crate::engine::{anon_hash, RiskEngine};
use crate::explain::DecisionRecord;
use crate::tiering::Tier;

#[derive(Clone)]
pub struct AppState {
    engine: Arc<RiskEngine>,
}

pub fn router(engine: Arc<RiskEngine>) -> Router {
    let state = AppState { engine };
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/decide", post(decide))
        .route("/admin/reload-rules", post(reload_rules))
        .route("/debug/mode", get(debug_mode))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Deserialize)]
struct DecideReq {
    text: String,
    #[serde(default)]
    force_minimal: bool,
}

async fn decide(
    State(state): State<AppState>,
    Json(body): Json<DecideReq>,
) -> Json<DecisionRecord> {
    let engine = state.engine.clone();
    let budget = Duration::from_millis(engine.config().retrieval_timeout_ms);

    let retrieval = tokio::task::spawn_blocking({
        let engine = engine.clone();
        let text = body.text.clone();
        let force = body.force_minimal;
        move || engine.retrieve(&text, force)
    });

    let mut notes = Vec::new();
    if body.force_minimal {
        notes.push("degradation forced to minimal for this request".to_string());
    }

    let (mode, evidence) = match tokio::time::timeout(budget, retrieval).await {
        Ok(Ok(evidence)) => {
            let mode = if body.force_minimal {
                Mode::Minimal
            } else {
                engine.mode()
            };
            (mode, evidence)
        }
        Ok(Err(join_err)) => {
            warn!(error = %join_err, "neighbor retrieval task failed; rule-only fallback");
            counter!("risk_retrieval_fallback_total").increment(1);
            notes.push("neighbor retrieval failed; rule-only scoring".to_string());
            (Mode::Minimal, None)
        }
        Err(_) => {
            warn!(budget_ms = budget.as_millis() as u64, "neighbor retrieval timed out; rule-only fallback");
            counter!("risk_retrieval_fallback_total").increment(1);
            notes.push("neighbor retrieval timed out; rule-only scoring".to_string());
            (Mode::Minimal, None)
        }
    };

    let record = engine.decide(&body.text, mode, evidence.as_ref(), notes);

    counter!("risk_decisions_total", "tier" => tier_label(record.tier)).increment(1);
    if record.hitl {
        counter!("risk_hitl_total").increment(1);
    }
    // Never log raw text; only the hashed reference.
    info!(
        id = record.decision_id,
        input = %anon_hash(&body.text),
        tier = tier_label(record.tier),
        flag = record.flag,
        mode = ?record.mode,
        "decision"
    );

    Json(record)
}

fn tier_label(tier: Tier) -> &'static str {
    match tier {
        Tier::Low => "low",
        Tier::Medium => "medium",
        Tier::High => "high",
    }
}

async fn reload_rules(State(state): State<AppState>) -> (StatusCode, String) {
    match state.engine.rules().reload() {
        Ok(n) => (StatusCode::OK, format!("reloaded {n} rules")),
        Err(e) => {
            warn!(error = %format!("{e:#}"), "rule reload rejected; previous set keeps serving");
            (StatusCode::UNPROCESSABLE_ENTITY, format!("{e:#}"))
        }
    }
}

async fn debug_mode(State(state): State<AppState>) -> Json<Mode> {
    Json(state.engine.mode())
}
