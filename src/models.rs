use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ============ Vocabularies ============

pub const STATUS_NEW: &str = "new";
pub const STATUS_CONTACTED: &str = "contacted";
pub const STATUS_QUALIFIED: &str = "qualified";
pub const STATUS_PROPOSAL: &str = "proposal";
pub const STATUS_NEGOTIATION: &str = "negotiation";
pub const STATUS_WON: &str = "won";
pub const STATUS_LOST: &str = "lost";

/// Lead pipeline stages, in funnel order.
pub const LEAD_STATUSES: [&str; 7] = [
    STATUS_NEW,
    STATUS_CONTACTED,
    STATUS_QUALIFIED,
    STATUS_PROPOSAL,
    STATUS_NEGOTIATION,
    STATUS_WON,
    STATUS_LOST,
];

pub const SOURCE_MANUAL: &str = "manual";

/// Bucket for leads without a district.
pub const UNASSIGNED_DISTRICT: &str = "unassigned";

// ============ Canonical Records ============

/// The one lead shape the rest of the application is written against.
///
/// Produced only by `LeadNormalizer`. `status` and `source` are lowercase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalLead {
    pub id: String,
    pub name: String,
    pub company: String,
    pub phone: String,
    pub email: String,
    /// Free-text location.
    pub location: String,
    pub district: String,
    pub state: String,
    pub status: String,
    pub source: String,
    /// Secondary tag set once a lead is closed.
    pub final_status: String,
    pub assigned_to: String,
    pub created_by: String,
    pub created_at: String,
    pub last_contact_date: String,
    pub next_follow_up_date: String,
    pub notes: String,
    pub budget: Option<f64>,
    pub is_active: bool,
}

/// Canonical user record. `role` is lowercase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalUser {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub role: String,
    pub is_active: bool,
}

/// Canonical district record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalDistrict {
    pub id: String,
    pub name: String,
    pub code: String,
    pub state: String,
    pub region: String,
    pub is_active: bool,
}

// ============ Aggregate Statistics ============

/// Dashboard statistics.
///
/// Field names follow the backend's `/dashboard/stats` payload so that
/// server-supplied and locally derived statistics share this one type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateStatistics {
    #[serde(deserialize_with = "null_as_default")]
    pub total_leads: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub new_leads: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub contacted_leads: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub qualified_leads: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub won_leads: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub lost_leads: u64,
    /// Percentage of won leads, rounded to two decimals.
    #[serde(deserialize_with = "null_as_default")]
    pub conversion_rate: f64,
    /// Sum of budgets of won leads.
    #[serde(deserialize_with = "null_as_default")]
    pub total_revenue: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub leads_by_status: BTreeMap<String, u64>,
    #[serde(deserialize_with = "null_as_default")]
    pub leads_by_district: BTreeMap<String, u64>,
    #[serde(deserialize_with = "null_as_default")]
    pub leads_by_source: BTreeMap<String, u64>,
    /// Most recent first, at most ten entries.
    #[serde(deserialize_with = "null_as_default")]
    pub recent_activities: Vec<RecentActivity>,
}

/// Entry of the recent-activity feed. Backends send ids as numbers and may
/// send `null` timestamps; both decode to strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecentActivity {
    #[serde(deserialize_with = "lenient_string")]
    pub lead_id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub lead_name: String,
    #[serde(deserialize_with = "lenient_string")]
    pub status: String,
    #[serde(deserialize_with = "lenient_string")]
    pub updated_at: String,
}

/// `null` decodes to the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Strings pass through, numbers and booleans are stringified, anything
/// else is `""`.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

// ============ Session ============

/// Profile blob cached next to the credential at login.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    pub user_id: String,
    pub employee_code: String,
    pub employee_name: String,
    pub email: String,
    pub role: String,
    pub token_expiry: Option<String>,
    pub refresh_token: Option<String>,
    /// When the session was stored (RFC 3339).
    pub saved_at: Option<String>,
}

/// Result of a successful login.
#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub user: Profile,
}

/// Credentials posted to the login endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

// ============ Listing ============

/// Query parameters for list calls.
///
/// Defaults are `page=1`, `pageSize=10`, `searchText=""`; empty values are
/// omitted from the query string entirely rather than sent blank.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilters {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub search_text: Option<String>,
    /// Resource-specific filters (status, source, districtId, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl ListFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search_text = Some(text.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Builds filters from raw query-string pairs. Unparseable paging values
    /// fall back to the defaults.
    pub fn from_pairs(pairs: BTreeMap<String, String>) -> Self {
        let mut filters = Self::new();
        for (key, value) in pairs {
            match key.as_str() {
                "page" => filters.page = value.trim().parse().ok(),
                "pageSize" => filters.page_size = value.trim().parse().ok(),
                "searchText" => filters.search_text = Some(value),
                _ => {
                    filters.extra.insert(key, value);
                }
            }
        }
        filters
    }

    /// Query pairs with defaults merged in and blank values dropped.
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = vec![
            ("page".to_string(), self.page.unwrap_or(1).to_string()),
            (
                "pageSize".to_string(),
                self.page_size.unwrap_or(10).to_string(),
            ),
            (
                "searchText".to_string(),
                self.search_text.clone().unwrap_or_default(),
            ),
        ];
        query.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        query.retain(|(_, v)| !v.trim().is_empty());
        query
    }

    /// Only the caller-supplied values, blank ones dropped. Export calls
    /// forward filters without list defaults.
    pub fn to_raw_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        if let Some(page) = self.page {
            query.push(("page".to_string(), page.to_string()));
        }
        if let Some(size) = self.page_size {
            query.push(("pageSize".to_string(), size.to_string()));
        }
        if let Some(ref text) = self.search_text {
            query.push(("searchText".to_string(), text.clone()));
        }
        query.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        query.retain(|(_, v)| !v.trim().is_empty());
        query
    }
}
