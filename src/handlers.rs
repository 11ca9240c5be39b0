use crate::config::Config;
use crate::errors::AppError;
use crate::gateway_client::{FilePart, Gateway, GatewayEvent};
use crate::models::*;
use crate::services::{AuthService, DashboardService, DistrictService, LeadService, UserService};
use crate::store::SessionStore;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state injected into handlers.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// The one gateway instance for the process.
    pub gateway: Arc<Gateway>,
    pub auth: AuthService,
    pub leads: LeadService,
    pub users: UserService,
    pub districts: DistrictService,
    pub dashboard: DashboardService,
    /// Leads from the latest listing; input to the statistics fallback.
    pub resident_leads: RwLock<Vec<CanonicalLead>>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn SessionStore>) -> Result<Self, AppError> {
        let gateway = Arc::new(Gateway::new(config.clone(), store)?);
        Ok(Self {
            config,
            auth: AuthService::new(gateway.clone()),
            leads: LeadService::new(gateway.clone()),
            users: UserService::new(gateway.clone()),
            districts: DistrictService::new(gateway.clone()),
            dashboard: DashboardService::new(gateway.clone()),
            gateway,
            resident_leads: RwLock::new(Vec::new()),
        })
    }
}

/// Logs gateway events until the gateway is dropped.
///
/// This is where a UI collaborator subscribes to session invalidation and
/// address changes.
pub async fn watch_gateway_events(gateway: Arc<Gateway>) {
    let mut events = gateway.subscribe();
    drop(gateway);
    loop {
        match events.recv().await {
            Ok(GatewayEvent::SessionInvalidated { redirect_to }) => {
                tracing::warn!("Session invalidated, UI should navigate to {}", redirect_to);
            }
            Ok(GatewayEvent::Failover { from, to }) => {
                tracing::warn!("API address switched from {} to {}", from, to);
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Missed {} gateway events", skipped);
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rust-leads-gateway",
            "version": env!("CARGO_PKG_VERSION"),
            "api_address": state.gateway.address().to_string(),
            "signed_in": state.gateway.store().token().is_some(),
        })),
    )
}

// ============ Session ============

/// POST /session/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    if body.email.trim().is_empty() || body.password.is_empty() {
        return Err(AppError::InvalidRequest(
            "Email and password are required".to_string(),
        ));
    }
    Ok(Json(state.auth.login(&body.email, &body.password).await?))
}

/// POST /session/logout
pub async fn logout(State(state): State<Arc<AppState>>) -> Result<StatusCode, AppError> {
    state.auth.logout()?;
    state.resident_leads.write().await.clear();
    Ok(StatusCode::NO_CONTENT)
}

/// GET /session/me
pub async fn me(State(state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    Ok(Json(state.auth.me().await?))
}

// ============ Leads ============

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    #[serde(rename = "assignToUserId")]
    pub assign_to_user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub file_name: String,
}

/// GET /leads
///
/// The listing becomes the resident set used by the statistics fallback.
pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<Vec<CanonicalLead>>, AppError> {
    let leads = state.leads.list(&ListFilters::from_pairs(params)).await?;
    *state.resident_leads.write().await = leads.clone();
    Ok(Json(leads))
}

pub async fn get_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CanonicalLead>, AppError> {
    Ok(Json(state.leads.get(&id).await?))
}

pub async fn create_lead(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    Ok((StatusCode::CREATED, Json(state.leads.create(&body).await?)))
}

pub async fn update_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(state.leads.update(&id, &body).await?))
}

pub async fn update_lead_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<StatusUpdate>,
) -> Result<Json<Value>, AppError> {
    let status = body.status.trim().to_lowercase();
    if !LEAD_STATUSES.contains(&status.as_str()) {
        tracing::warn!("Forwarding unknown lead status '{}'", status);
    }
    Ok(Json(
        state
            .leads
            .update_status(&id, &status, body.notes.as_deref())
            .await?,
    ))
}

pub async fn assign_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<AssignRequest>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(
        state.leads.assign(&id, &body.assign_to_user_id).await?,
    ))
}

pub async fn delete_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let result = state.leads.delete(&id).await?;
    state.resident_leads.write().await.retain(|lead| lead.id != id);
    Ok(Json(result))
}

/// POST /leads/upload?file_name=leads.csv with the raw file as body.
pub async fn upload_leads(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    if body.is_empty() {
        return Err(AppError::InvalidRequest("Upload body is empty".to_string()));
    }
    let file = FilePart::new(params.file_name, body.to_vec());
    Ok(Json(state.leads.upload(file).await?))
}

/// GET /leads/export: the backend's file, passed through.
pub async fn export_leads(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Response, AppError> {
    let export = state.leads.export(&ListFilters::from_pairs(params)).await?;
    let content_type = export
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"leads_export.xlsx\"".to_string(),
            ),
        ],
        export.body,
    )
        .into_response())
}

// ============ Users ============

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<Vec<CanonicalUser>>, AppError> {
    Ok(Json(
        state.users.list(&ListFilters::from_pairs(params)).await?,
    ))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CanonicalUser>, AppError> {
    Ok(Json(state.users.get(&id).await?))
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    Ok((StatusCode::CREATED, Json(state.users.create(&body).await?)))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(state.users.update(&id, &body).await?))
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(state.users.delete(&id).await?))
}

// ============ Districts ============

pub async fn list_districts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<Vec<CanonicalDistrict>>, AppError> {
    Ok(Json(
        state
            .districts
            .list(&ListFilters::from_pairs(params))
            .await?,
    ))
}

pub async fn get_district(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CanonicalDistrict>, AppError> {
    Ok(Json(state.districts.get(&id).await?))
}

pub async fn create_district(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    Ok((StatusCode::CREATED, Json(state.districts.create(&body).await?)))
}

pub async fn update_district(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(state.districts.update(&id, &body).await?))
}

pub async fn delete_district(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(state.districts.delete(&id).await?))
}

// ============ Dashboard ============

/// GET /dashboard/stats
///
/// Never fails: falls back to statistics derived from the resident leads.
pub async fn dashboard_stats(State(state): State<Arc<AppState>>) -> Json<AggregateStatistics> {
    let resident = state.resident_leads.read().await.clone();
    Json(state.dashboard.stats(&resident).await)
}
