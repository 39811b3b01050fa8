//! API route handlers.

use axum::extract::{Path, Query, State};
use axum::Json;
use tracing::{debug, info, warn};

use palisade_core::firewall::{FirewallRequest, Verdict};

use crate::error::{ApiError, Result};
use crate::models::{
    BatchEntry, BatchResponse, CheckRequest, CheckResponse, HealthResponse, LoadRulesResponse,
    RuleRemovedResponse, RulesResponse, StatsResponse, ThreatsQuery, ThreatsResponse,
};
use crate::state::AppState;

/// GET /health - liveness probe.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

/// POST /check - run one prompt through the firewall.
pub async fn check_prompt(
    State(state): State<AppState>,
    Json(req): Json<CheckRequest>,
) -> Result<Json<CheckResponse>> {
    debug!(prompt_len = req.prompt.len(), "checking prompt");

    let firewall = state.firewall.clone();
    let verdict = tokio::task::spawn_blocking(move || {
        let mut request = FirewallRequest::new(req.prompt);
        if let Some(user_id) = req.user_id {
            request = request.with_user(user_id);
        }
        if let Some(session_id) = req.session_id {
            request = request.with_session(session_id);
        }
        firewall.check(request)
    })
    .await
    .map_err(|err| ApiError::Internal(err.to_string()))??;

    info!(
        action = verdict.action.as_str(),
        score = verdict.threat_score,
        latency_us = verdict.duration_us,
        "prompt check complete"
    );

    Ok(Json(CheckResponse::from(verdict)))
}

/// POST /batch - run several prompts through the firewall.
pub async fn batch_check(
    State(state): State<AppState>,
    Json(prompts): Json<Vec<String>>,
) -> Result<Json<BatchResponse>> {
    let firewall = state.firewall.clone();
    let verdicts = tokio::task::spawn_blocking(move || {
        prompts
            .iter()
            .map(|prompt| firewall.check_prompt(prompt))
            .collect::<std::result::Result<Vec<Verdict>, _>>()
    })
    .await
    .map_err(|err| ApiError::Internal(err.to_string()))??;

    let results: Vec<BatchEntry> = verdicts
        .into_iter()
        .map(|verdict| BatchEntry {
            prompt: verdict.original_prompt.clone(),
            action: verdict.action,
            allowed: verdict.allowed,
            threat_score: verdict.threat_score,
            threat_level: verdict.threat_level,
        })
        .collect();

    let allowed = results.iter().filter(|r| r.allowed).count();
    let blocked = results.len() - allowed;

    Ok(Json(BatchResponse {
        total: results.len(),
        allowed,
        blocked,
        results,
    }))
}

/// GET /stats - aggregate counters with derived rates.
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    Ok(Json(StatsResponse::from(state.ledger.stats())))
}

/// GET /threats - recent high/critical audit records.
pub async fn get_threats(
    State(state): State<AppState>,
    Query(query): Query<ThreatsQuery>,
) -> Result<Json<ThreatsResponse>> {
    let threats = state.ledger.recent_flagged(query.limit);
    let count = threats.len();
    Ok(Json(ThreatsResponse { threats, count }))
}

/// GET /rules - the active rule set in evaluation order.
pub async fn get_rules(State(state): State<AppState>) -> Result<Json<RulesResponse>> {
    let engine = state
        .policy
        .read()
        .map_err(|_| ApiError::Internal("policy lock poisoned".to_string()))?;

    let rules = engine.rules().to_vec();
    let count = rules.len();
    Ok(Json(RulesResponse { rules, count }))
}

/// POST /rules - append one rule to the active set.
pub async fn add_rule(
    State(state): State<AppState>,
    Json(rule): Json<palisade_core::policy::RuleDefinition>,
) -> Result<Json<RulesResponse>> {
    let mut engine = state
        .policy
        .write()
        .map_err(|_| ApiError::Internal("policy lock poisoned".to_string()))?;

    let name = rule.name.clone();
    engine
        .add_rule(rule)
        .map_err(|err| ApiError::BadRequest(err.to_string()))?;

    info!(rule = %name, "rule added");

    let rules = engine.rules().to_vec();
    let count = rules.len();
    Ok(Json(RulesResponse { rules, count }))
}

/// PUT /rules - replace the active rule set wholesale.
///
/// On a malformed document the previous set stays active and the caller
/// gets the validation error.
pub async fn load_rules(
    State(state): State<AppState>,
    Json(document): Json<serde_json::Value>,
) -> Result<Json<LoadRulesResponse>> {
    let mut engine = state
        .policy
        .write()
        .map_err(|_| ApiError::Internal("policy lock poisoned".to_string()))?;

    match engine.load_value(document) {
        Ok(loaded) => {
            info!(loaded, "policy rules replaced");
            Ok(Json(LoadRulesResponse { loaded }))
        }
        Err(err) => {
            warn!(error = %err, "policy load rejected, previous rules retained");
            Err(ApiError::BadRequest(err.to_string()))
        }
    }
}

/// DELETE /rules/{name} - remove one rule by name.
pub async fn remove_rule(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<RuleRemovedResponse>> {
    let mut engine = state
        .policy
        .write()
        .map_err(|_| ApiError::Internal("policy lock poisoned".to_string()))?;

    if !engine.remove_rule(&name) {
        return Err(ApiError::NotFound(format!("rule '{}'", name)));
    }

    info!(rule = %name, "rule removed");
    Ok(Json(RuleRemovedResponse { removed: name }))
}
