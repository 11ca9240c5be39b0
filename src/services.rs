use crate::analytics::derive_stats;
use crate::errors::{AppError, ResultExt};
use crate::gateway_client::{FilePart, Gateway, GatewayResponse, RequestBody, RequestOptions};
use crate::models::*;
use crate::normalizers::{
    pick, text, unwrap_envelope, DistrictNormalizer, LeadNormalizer, Normalizer, UserNormalizer,
};
use crate::store::SessionStore;
use chrono::Utc;
use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Tries `routes` in order and returns the first successful payload.
///
/// Unauthorized and forbidden responses stop the chain: the gateway has
/// already applied the session policy once.
async fn get_first_available(
    gateway: &Gateway,
    routes: &[&str],
    query: Vec<(String, String)>,
) -> Result<Value, AppError> {
    let mut last_err = None;
    for route in routes {
        match gateway.get(route, query.clone()).await {
            Ok(payload) => return Ok(payload),
            Err(e) if e.is_auth_failure() => return Err(e),
            Err(e) => {
                tracing::debug!("Route {} failed ({}), trying next variant", route, e);
                last_err = Some(e);
            }
        }
    }
    Err(last_err
        .unwrap_or_else(|| AppError::InvalidRequest("No list route configured".to_string())))
}

fn to_body<T: Serialize + ?Sized>(record: &T) -> Result<Value, AppError> {
    serde_json::to_value(record)
        .map_err(|e| AppError::InvalidRequest(format!("Failed to serialize record: {}", e)))
}

// ============ Auth ============

pub struct AuthService {
    gateway: Arc<Gateway>,
}

impl AuthService {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    /// Logs in and stores the credential and profile together.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, AppError> {
        tracing::info!("Logging in as {}", email);

        let payload = self
            .gateway
            .post("/auth/login", json!({ "email": email, "password": password }))
            .await
            .context("Login failed")?;
        let data = unwrap_envelope(payload);

        let token = text(&data, &["token", "access_token", "accessToken"]);
        if token.is_empty() {
            tracing::warn!("Unexpected login response format: {:?}", data);
            return Err(AppError::InvalidResponse(
                "Login response missing 'token' field".to_string(),
            ));
        }

        // Some revisions nest the profile under `user`.
        let profile_source = pick(&data, &["user"]).unwrap_or(&data);
        let optional = |keys: &[&str]| {
            let value = match text(profile_source, keys) {
                v if v.is_empty() => text(&data, keys),
                v => v,
            };
            (!value.is_empty()).then_some(value)
        };
        let user = Profile {
            user_id: text(profile_source, &["userId", "id"]),
            employee_code: text(profile_source, &["employeeCode"]),
            employee_name: text(profile_source, &["employeeName", "fullName", "full_name", "name"]),
            email: text(profile_source, &["email"]),
            role: text(profile_source, &["role", "userRole"]),
            token_expiry: optional(&["tokenExpiry"]),
            refresh_token: optional(&["refreshToken"]),
            saved_at: Some(Utc::now().to_rfc3339()),
        };

        let store = self.gateway.store();
        store.save_session(&token, &user)?;
        let address = self.gateway.address();
        if !address.is_relative() {
            store.persist_base_override(address.origin())?;
        }

        tracing::info!("✓ Logged in as {} ({})", user.email, user.role);
        Ok(LoginResponse {
            access_token: token,
            user,
        })
    }

    pub async fn me(&self) -> Result<Value, AppError> {
        Ok(unwrap_envelope(self.gateway.get("/auth/me", Vec::new()).await?))
    }

    pub fn logout(&self) -> Result<(), AppError> {
        tracing::info!("Signing out, clearing stored session");
        self.gateway.store().clear_session()
    }

    pub fn current_profile(&self) -> Option<Profile> {
        self.gateway.store().profile()
    }
}

// ============ Leads ============

pub struct LeadService {
    gateway: Arc<Gateway>,
}

impl LeadService {
    /// List routes, action-style variants first.
    pub const LIST_ROUTES: [&'static str; 3] = ["/leads/GetLeads", "/Leads/GetLeads", "/leads"];

    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    pub async fn list(&self, filters: &ListFilters) -> Result<Vec<CanonicalLead>, AppError> {
        let payload = get_first_available(&self.gateway, &Self::LIST_ROUTES, filters.to_query())
            .await
            .context("Listing leads")?;
        let leads = LeadNormalizer::normalize_list(&payload);
        tracing::info!("Fetched {} leads", leads.len());
        Ok(leads)
    }

    pub async fn get(&self, id: &str) -> Result<CanonicalLead, AppError> {
        let payload = self
            .gateway
            .get(&format!("/leads/{}", id), Vec::new())
            .await
            .with_context(|| format!("Fetching lead {}", id))?;
        Ok(LeadNormalizer::normalize_one(&payload))
    }

    pub async fn create<T: Serialize + ?Sized>(&self, lead: &T) -> Result<Value, AppError> {
        let payload = self.gateway.post("/leads", to_body(lead)?).await?;
        tracing::info!("✓ Lead created");
        Ok(unwrap_envelope(payload))
    }

    pub async fn update<T: Serialize + ?Sized>(&self, id: &str, lead: &T) -> Result<Value, AppError> {
        let payload = self
            .gateway
            .put(&format!("/leads/{}", id), to_body(lead)?)
            .await?;
        Ok(unwrap_envelope(payload))
    }

    pub async fn update_status(
        &self,
        id: &str,
        status: &str,
        notes: Option<&str>,
    ) -> Result<Value, AppError> {
        let payload = self
            .gateway
            .put(
                &format!("/leads/{}/status", id),
                json!({ "status": status, "notes": notes }),
            )
            .await?;
        Ok(unwrap_envelope(payload))
    }

    pub async fn assign(&self, id: &str, user_id: &str) -> Result<Value, AppError> {
        let payload = self
            .gateway
            .post(
                &format!("/leads/{}/assign", id),
                json!({ "assignToUserId": user_id }),
            )
            .await?;
        Ok(unwrap_envelope(payload))
    }

    pub async fn delete(&self, id: &str) -> Result<Value, AppError> {
        let payload = self.gateway.delete(&format!("/leads/{}", id)).await?;
        Ok(unwrap_envelope(payload))
    }

    /// Forwards a CSV/Excel file; returns the backend envelope untouched.
    pub async fn upload(&self, file: FilePart) -> Result<Value, AppError> {
        tracing::info!("Uploading leads file {} ({} bytes)", file.file_name, file.bytes.len());
        let options = RequestOptions {
            query: Vec::new(),
            body: RequestBody::File(file),
        };
        self.gateway
            .request(Method::POST, "/leads/upload", options)
            .await?
            .json()
    }

    /// Raw export file as returned by the backend.
    pub async fn export(&self, filters: &ListFilters) -> Result<GatewayResponse, AppError> {
        self.gateway
            .request(
                Method::GET,
                "/leads/export",
                RequestOptions::query(filters.to_raw_query()),
            )
            .await
    }
}

// ============ Users ============

pub struct UserService {
    gateway: Arc<Gateway>,
}

impl UserService {
    pub const LIST_ROUTES: [&'static str; 3] = ["/users/GetUsers", "/Users/GetUsers", "/users"];

    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    pub async fn list(&self, filters: &ListFilters) -> Result<Vec<CanonicalUser>, AppError> {
        let payload = get_first_available(&self.gateway, &Self::LIST_ROUTES, filters.to_query())
            .await
            .context("Listing users")?;
        Ok(UserNormalizer::normalize_list(&payload))
    }

    pub async fn get(&self, id: &str) -> Result<CanonicalUser, AppError> {
        let payload = self
            .gateway
            .get(&format!("/users/{}", id), Vec::new())
            .await?;
        Ok(UserNormalizer::normalize_one(&payload))
    }

    pub async fn create<T: Serialize + ?Sized>(&self, user: &T) -> Result<Value, AppError> {
        Ok(unwrap_envelope(
            self.gateway.post("/users", to_body(user)?).await?,
        ))
    }

    pub async fn update<T: Serialize + ?Sized>(&self, id: &str, user: &T) -> Result<Value, AppError> {
        Ok(unwrap_envelope(
            self.gateway
                .put(&format!("/users/{}", id), to_body(user)?)
                .await?,
        ))
    }

    pub async fn delete(&self, id: &str) -> Result<Value, AppError> {
        Ok(unwrap_envelope(
            self.gateway.delete(&format!("/users/{}", id)).await?,
        ))
    }
}

// ============ Districts ============

pub struct DistrictService {
    gateway: Arc<Gateway>,
}

impl DistrictService {
    pub const LIST_ROUTES: [&'static str; 3] = [
        "/Districts/GetDistricts",
        "/districts/GetDistricts",
        "/districts",
    ];

    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    pub async fn list(&self, filters: &ListFilters) -> Result<Vec<CanonicalDistrict>, AppError> {
        let payload = get_first_available(&self.gateway, &Self::LIST_ROUTES, filters.to_query())
            .await
            .context("Listing districts")?;
        Ok(DistrictNormalizer::normalize_list(&payload))
    }

    pub async fn get(&self, id: &str) -> Result<CanonicalDistrict, AppError> {
        let payload = self
            .gateway
            .get(&format!("/districts/{}", id), Vec::new())
            .await?;
        Ok(DistrictNormalizer::normalize_one(&payload))
    }

    pub async fn create<T: Serialize + ?Sized>(&self, district: &T) -> Result<Value, AppError> {
        Ok(unwrap_envelope(
            self.gateway.post("/districts", to_body(district)?).await?,
        ))
    }

    pub async fn update<T: Serialize + ?Sized>(
        &self,
        id: &str,
        district: &T,
    ) -> Result<Value, AppError> {
        Ok(unwrap_envelope(
            self.gateway
                .put(&format!("/districts/{}", id), to_body(district)?)
                .await?,
        ))
    }

    pub async fn delete(&self, id: &str) -> Result<Value, AppError> {
        Ok(unwrap_envelope(
            self.gateway.delete(&format!("/districts/{}", id)).await?,
        ))
    }
}

// ============ Dashboard ============

pub struct DashboardService {
    gateway: Arc<Gateway>,
}

impl DashboardService {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    async fn fetch(&self) -> Result<AggregateStatistics, AppError> {
        let payload = unwrap_envelope(self.gateway.get("/dashboard/stats", Vec::new()).await?);
        if payload.get("total_leads").is_none() {
            return Err(AppError::InvalidResponse(
                "Statistics payload missing 'total_leads'".to_string(),
            ));
        }
        Ok(serde_json::from_value(payload)?)
    }

    /// Server-side statistics, or statistics derived from `resident_leads`
    /// when the aggregation call fails for any reason.
    pub async fn stats(&self, resident_leads: &[CanonicalLead]) -> AggregateStatistics {
        match self.fetch().await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!(
                    "Dashboard stats unavailable ({}), deriving from {} local leads",
                    e,
                    resident_leads.len()
                );
                derive_stats(resident_leads)
            }
        }
    }
}
