//! HTTP routes over a shared [`Session`]: ledger views, tamper simulation,
//! consensus, audit log and gated decryption.
//!
//! Ledger, replicas and audit log are shared by every caller. Access state is
//! not: `/admin/login` and `/access/key` hand out an opaque token, and later
//! requests name their caller with the `x-session-token` header.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::access::{generate_session_key, AccessError, AccessGateway, GatewayState};
use crate::audit::TamperRecord;
use crate::consensus::ConsensusReport;
use crate::error::GeneBlockError;
use crate::ledger::{LedgerError, ValidationResult};
use crate::model::{Block, BlockEdits, Metadata, Record};
use crate::replica::{ReplicaError, ReplicaSet};
use crate::session::{DecryptedBlock, Session};
use crate::tamper::{Propagation, TamperError, TamperOptions};

/// Header carrying the caller token returned by login and key redemption.
pub const SESSION_TOKEN_HEADER: &str = "x-session-token";

/// Shared application state passed to Axum handlers.
///
/// Lock order: `session` before `callers`.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Mutex<Session>>,
    /// Per-caller gateways keyed by session token.
    pub callers: Arc<Mutex<HashMap<String, AccessGateway>>>,
}

impl AppState {
    pub fn new(session: Session) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            callers: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

type ApiError = (StatusCode, String);

fn caller_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SESSION_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
}

/// The caller named by the request, if its token is known.
fn known_caller<'a>(
    callers: &'a HashMap<String, AccessGateway>,
    headers: &HeaderMap,
) -> Option<&'a AccessGateway> {
    caller_token(headers).and_then(|t| callers.get(t))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ledger", get(get_ledger).post(build_ledger))
        .route("/ledger/validate", get(validate_ledger))
        .route("/ledger/decrypted", get(decrypt_ledger))
        .route("/replicas", get(list_replicas))
        .route("/replicas/:id/validate", get(validate_replica))
        .route("/replicas/:id/decrypted", get(decrypt_replica))
        .route("/replicas/:id/blocks/:index/editable", get(edit_allowed))
        .route("/replicas/:id/blocks/:index", delete(remove_block))
        .route("/replicas/:id/blocks/:index/tamper", post(tamper_block))
        .route("/consensus", get(consensus))
        .route("/audit", get(audit_log))
        .route("/admin/login", post(admin_login))
        .route("/admin/key", post(issue_key))
        .route("/admin/logout", post(admin_logout))
        .route("/access/key", post(authorize_key))
        .route("/health", get(health))
        .route("/version", get(version))
        .with_state(state)
}

fn replica_error(e: ReplicaError) -> ApiError {
    let code = match e {
        ReplicaError::UnknownReplica(_) => StatusCode::NOT_FOUND,
        ReplicaError::NoReplicas | ReplicaError::DuplicateReplica(_) => StatusCode::BAD_REQUEST,
    };
    (code, e.to_string())
}

fn ledger_error(e: LedgerError) -> ApiError {
    let code = match e {
        LedgerError::Empty => StatusCode::BAD_REQUEST,
        LedgerError::NonContiguousIndex { .. } | LedgerError::Clock(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (code, e.to_string())
}

fn access_error(e: AccessError) -> ApiError {
    let code = match e {
        AccessError::AuthenticationFailure => StatusCode::UNAUTHORIZED,
        AccessError::AuthorizationFailure => StatusCode::FORBIDDEN,
    };
    (code, e.to_string())
}

fn tamper_error(e: TamperError) -> ApiError {
    match e {
        TamperError::InvalidEditTarget { .. } => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
        TamperError::EditGuardViolation { .. } => (StatusCode::CONFLICT, e.to_string()),
        TamperError::LastBlock { .. } => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
        TamperError::EmptyEdit => (StatusCode::BAD_REQUEST, e.to_string()),
        TamperError::Replica(r) => replica_error(r),
        TamperError::Ledger(l) => ledger_error(l),
    }
}

fn session_error(e: GeneBlockError) -> ApiError {
    match e {
        GeneBlockError::Ledger(l) => ledger_error(l),
        GeneBlockError::Replica(r) => replica_error(r),
        GeneBlockError::Tamper(t) => tamper_error(t),
        GeneBlockError::Access(a) => access_error(a),
        GeneBlockError::Decode(d) => (StatusCode::UNPROCESSABLE_ENTITY, d.to_string()),
    }
}

/// GET /ledger
pub async fn get_ledger(State(state): State<AppState>) -> Json<Vec<Block>> {
    let guard = state.session.lock();
    Json(guard.canonical().blocks().to_vec())
}

#[derive(Deserialize)]
pub struct BuildInput {
    pub records: Vec<Record>,
}

/// POST /ledger — rebuild from records and re-fork the replicas.
pub async fn build_ledger(
    State(state): State<AppState>,
    Json(payload): Json<BuildInput>,
) -> Result<Json<Vec<Block>>, ApiError> {
    let mut guard = state.session.lock();
    let ledger = guard.rebuild(&payload.records).map_err(session_error)?;
    Ok(Json(ledger.blocks().to_vec()))
}

/// GET /ledger/validate
pub async fn validate_ledger(State(state): State<AppState>) -> Json<ValidationResult> {
    Json(state.session.lock().validate_canonical())
}

/// GET /ledger/decrypted
pub async fn decrypt_ledger(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<DecryptedBlock>>, ApiError> {
    let guard = state.session.lock();
    let callers = state.callers.lock();
    let caller = known_caller(&callers, &headers)
        .ok_or_else(|| access_error(AccessError::AuthorizationFailure))?;
    let canonical = guard.canonical();
    let view = guard
        .decrypt_ledger_for(caller, &canonical)
        .map_err(access_error)?;
    Ok(Json(view))
}

/// GET /replicas
pub async fn list_replicas(State(state): State<AppState>) -> Json<ReplicaSet> {
    Json(state.session.lock().replicas().clone())
}

/// GET /replicas/:id/validate
pub async fn validate_replica(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ValidationResult>, ApiError> {
    let guard = state.session.lock();
    guard.validate_replica(&id).map(Json).map_err(replica_error)
}

/// GET /replicas/:id/decrypted
pub async fn decrypt_replica(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<DecryptedBlock>>, ApiError> {
    let guard = state.session.lock();
    let callers = state.callers.lock();
    let caller = known_caller(&callers, &headers)
        .ok_or_else(|| access_error(AccessError::AuthorizationFailure))?;
    let replica = guard.replicas().get(&id).map_err(replica_error)?;
    let view = guard
        .decrypt_ledger_for(caller, replica)
        .map_err(access_error)?;
    Ok(Json(view))
}

#[derive(Serialize)]
pub struct EditableResp {
    pub allowed: bool,
}

/// GET /replicas/:id/blocks/:index/editable
pub async fn edit_allowed(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, u64)>,
) -> Result<Json<EditableResp>, ApiError> {
    let guard = state.session.lock();
    let allowed = guard.is_edit_allowed(&id, index).map_err(replica_error)?;
    Ok(Json(EditableResp { allowed }))
}

/// Metadata entries and/or a new plaintext payload, plus how to apply them.
#[derive(Deserialize)]
pub struct TamperInput {
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub payload: Option<String>,
    #[serde(default)]
    pub propagation: Propagation,
    #[serde(default)]
    pub enforce_edit_guard: bool,
}

/// POST /replicas/:id/blocks/:index/tamper
pub async fn tamper_block(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, u64)>,
    Json(input): Json<TamperInput>,
) -> Result<Json<TamperRecord>, ApiError> {
    let edits = BlockEdits {
        metadata: input.metadata,
        payload: input.payload,
    };
    let options = TamperOptions {
        propagation: input.propagation,
        enforce_edit_guard: input.enforce_edit_guard,
    };
    let mut guard = state.session.lock();
    guard
        .tamper(&id, index, &edits, options)
        .map(Json)
        .map_err(tamper_error)
}

/// DELETE /replicas/:id/blocks/:index?propagation=..&enforce_edit_guard=..
pub async fn remove_block(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, u64)>,
    Query(options): Query<TamperOptions>,
) -> Result<Json<TamperRecord>, ApiError> {
    let mut guard = state.session.lock();
    guard
        .remove_block(&id, index, options)
        .map(Json)
        .map_err(tamper_error)
}

/// GET /consensus
pub async fn consensus(State(state): State<AppState>) -> Json<ConsensusReport> {
    Json(state.session.lock().evaluate_consensus())
}

/// GET /audit
pub async fn audit_log(State(state): State<AppState>) -> Json<Vec<TamperRecord>> {
    Json(state.session.lock().audit_log().to_vec())
}

#[derive(Deserialize)]
pub struct LoginInput {
    pub credential: String,
}

#[derive(Serialize)]
pub struct GatewayResp {
    pub state: GatewayState,
}

#[derive(Serialize)]
pub struct LoginResp {
    pub state: GatewayState,
    /// Send back as `x-session-token` on later requests.
    pub token: String,
}

/// Take the caller named by `headers` out of the map, or start a new one.
/// The flag is set when the caller already existed.
fn checkout(
    session: &Session,
    callers: &mut HashMap<String, AccessGateway>,
    headers: &HeaderMap,
) -> (String, AccessGateway, bool) {
    match caller_token(headers).and_then(|t| callers.remove_entry(t)) {
        Some((token, gateway)) => (token, gateway, true),
        None => (generate_session_key(), session.caller(), false),
    }
}

/// POST /admin/login
pub async fn admin_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<LoginInput>,
) -> Result<Json<LoginResp>, ApiError> {
    let guard = state.session.lock();
    let mut callers = state.callers.lock();
    let (token, mut gateway, known) = checkout(&guard, &mut callers, &headers);
    let ok = gateway.authenticate_admin(&input.credential);
    let gateway_state = gateway.state();
    if ok || known {
        callers.insert(token.clone(), gateway);
    }
    if !ok {
        return Err(access_error(AccessError::AuthenticationFailure));
    }
    Ok(Json(LoginResp {
        state: gateway_state,
        token,
    }))
}

#[derive(Serialize)]
pub struct KeyResp {
    pub key: String,
}

/// POST /admin/key
pub async fn issue_key(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<KeyResp>, ApiError> {
    let mut callers = state.callers.lock();
    let gateway = caller_token(&headers)
        .and_then(|t| callers.get_mut(t))
        .ok_or_else(|| access_error(AccessError::AuthorizationFailure))?;
    let key = gateway.issue_key().map_err(access_error)?;
    Ok(Json(KeyResp { key }))
}

/// POST /admin/logout
pub async fn admin_logout(State(state): State<AppState>, headers: HeaderMap) -> Json<GatewayResp> {
    let mut callers = state.callers.lock();
    if let Some(mut gateway) = caller_token(&headers).and_then(|t| callers.remove(t)) {
        gateway.sign_out();
    }
    Json(GatewayResp {
        state: GatewayState::Unauthenticated,
    })
}

#[derive(Deserialize)]
pub struct KeyInput {
    pub key: String,
}

#[derive(Serialize)]
pub struct AuthorizedResp {
    pub authorized: bool,
    /// Send back as `x-session-token` on later requests.
    pub token: String,
}

/// POST /access/key
pub async fn authorize_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<KeyInput>,
) -> Result<Json<AuthorizedResp>, ApiError> {
    let guard = state.session.lock();
    let mut callers = state.callers.lock();
    let (token, mut gateway, known) = checkout(&guard, &mut callers, &headers);
    let ok = gateway.authorize_with_key(&input.key);
    if ok || known {
        callers.insert(token.clone(), gateway);
    }
    if !ok {
        return Err((StatusCode::UNAUTHORIZED, "invalid or missing key".into()));
    }
    Ok(Json(AuthorizedResp {
        authorized: true,
        token,
    }))
}

/// GET /health
#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
}
pub async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

/// GET /version
#[derive(Serialize)]
pub struct Version {
    pub version: &'static str,
    pub git_sha: Option<&'static str>,
}
pub async fn version() -> Json<Version> {
    Json(Version {
        version: env!("CARGO_PKG_VERSION"),
        git_sha: option_env!("GIT_SHA"),
    })
}
