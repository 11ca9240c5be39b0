//! Translate variable upstream JSON into the canonical records.
//!
//! Backend revisions disagree on field names (`leadId` vs `id`,
//! `customerName` vs `name`) and on how deep collections are wrapped
//! (`data.items`, `data.data.items`, a bare array). Every field is read from
//! an ordered list of candidate keys and falls back to a fixed default;
//! every collection is looked up along an ordered list of nesting paths.
//! Nothing in here fails: malformed input degrades to defaults or an empty
//! list plus a warning.

use crate::models::{CanonicalDistrict, CanonicalLead, CanonicalUser};
use serde_json::Value;

/// Ordered nesting paths; the empty path is the payload itself.
pub type NestingPaths = &'static [&'static [&'static str]];

/// Follows `path` through nested objects.
pub fn at_path<'a>(payload: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(payload, |value, key| value.get(key))
}

/// First present value among `keys`; `null` and `""` fall through to the
/// next candidate.
pub fn pick<'a>(record: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| record.get(key))
        .find(|value| !value.is_null() && value.as_str() != Some(""))
}

/// String field; numbers and booleans are stringified, anything else is `""`.
pub fn text(record: &Value, keys: &[&str]) -> String {
    match pick(record, keys) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Lowercased string field.
pub fn code(record: &Value, keys: &[&str]) -> String {
    text(record, keys).to_lowercase()
}

/// Boolean field; accepts `true`/`false`, `1`/`0` and their string forms.
pub fn flag(record: &Value, keys: &[&str], default: bool) -> bool {
    match pick(record, keys) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|n| n != 0.0).unwrap_or(default),
        Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            _ => default,
        },
        _ => default,
    }
}

/// Numeric field; numeric strings are parsed, blanks are `None`.
pub fn number(record: &Value, keys: &[&str]) -> Option<f64> {
    match pick(record, keys)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `payload.data` when present and non-null, else the payload.
pub fn unwrap_envelope(mut payload: Value) -> Value {
    if payload.get("data").is_some_and(|data| !data.is_null()) {
        payload["data"].take()
    } else {
        payload
    }
}

pub trait Normalizer {
    type Record;

    /// Name used in shape-mismatch diagnostics.
    const RESOURCE: &'static str;

    /// Where the collection may live, most specific first.
    const LIST_PATHS: NestingPaths;

    fn normalize_record(raw: &Value) -> Self::Record;

    fn normalize_list(payload: &Value) -> Vec<Self::Record> {
        let found = Self::LIST_PATHS
            .iter()
            .filter_map(|path| at_path(payload, path))
            .find_map(Value::as_array);

        match found {
            Some(items) => items.iter().map(Self::normalize_record).collect(),
            None => {
                tracing::warn!(
                    resource = Self::RESOURCE,
                    "Unexpected {} payload shape, returning no records",
                    Self::RESOURCE
                );
                Vec::new()
            }
        }
    }

    /// Single record, unwrapped from `data.data`, `data` or the payload itself.
    fn normalize_one(payload: &Value) -> Self::Record {
        const ONE_PATHS: NestingPaths = &[&["data", "data"], &["data"], &[]];
        let record = ONE_PATHS
            .iter()
            .filter_map(|path| at_path(payload, path))
            .find(|value| value.is_object());

        match record {
            Some(record) => Self::normalize_record(record),
            None => {
                tracing::warn!(
                    resource = Self::RESOURCE,
                    "Unexpected {} record shape, using defaults",
                    Self::RESOURCE
                );
                Self::normalize_record(&Value::Null)
            }
        }
    }
}

pub struct LeadNormalizer;

impl Normalizer for LeadNormalizer {
    type Record = CanonicalLead;

    const RESOURCE: &'static str = "lead";

    const LIST_PATHS: NestingPaths = &[
        &["data", "data", "items"],
        &["data", "items"],
        &["data", "leads"],
        &["data"],
        &["items"],
        &["leads"],
        &[],
    ];

    fn normalize_record(raw: &Value) -> CanonicalLead {
        CanonicalLead {
            id: text(raw, &["leadId", "id"]),
            name: text(raw, &["customerName", "name"]),
            company: text(raw, &["customerCompany", "company"]),
            phone: text(raw, &["mobileNumber", "phone"]),
            email: text(raw, &["email"]),
            location: text(raw, &["location"]),
            district: text(raw, &["district", "districtName", "district_id", "districtId"]),
            state: text(raw, &["state"]),
            status: code(raw, &["leadStage", "status"]),
            source: code(raw, &["leadSource", "source"]),
            final_status: text(raw, &["finalStatus", "final_status"]),
            assigned_to: text(raw, &["assignedTo", "assigned_to"]),
            created_by: text(raw, &["createdBy", "created_by"]),
            created_at: text(raw, &["createdDate", "created_at", "createdAt"]),
            last_contact_date: text(raw, &["lastContactDate", "last_contact_date"]),
            next_follow_up_date: text(raw, &["nextFollowUpDate", "next_follow_up_date"]),
            notes: text(raw, &["remarks", "notes"]),
            budget: number(raw, &["orderValue", "budget"]),
            is_active: flag(raw, &["isActive", "is_active"], true),
        }
    }
}

pub struct UserNormalizer;

impl Normalizer for UserNormalizer {
    type Record = CanonicalUser;

    const RESOURCE: &'static str = "user";

    const LIST_PATHS: NestingPaths = &[
        &["data", "items"],
        &["data", "data", "items"],
        &["data", "users"],
        &["data"],
        &["items"],
        &["users"],
        &[],
    ];

    fn normalize_record(raw: &Value) -> CanonicalUser {
        CanonicalUser {
            id: text(raw, &["userId", "id"]),
            full_name: text(raw, &["employeeName", "fullName", "full_name"]),
            email: text(raw, &["email"]),
            phone: text(raw, &["phoneNumber", "phone"]),
            role: code(raw, &["role", "userRole"]),
            is_active: flag(raw, &["isActive", "is_active"], true),
        }
    }
}

pub struct DistrictNormalizer;

impl Normalizer for DistrictNormalizer {
    type Record = CanonicalDistrict;

    const RESOURCE: &'static str = "district";

    const LIST_PATHS: NestingPaths = &[
        &["data", "items"],
        &["data", "districts"],
        &["data", "data", "items"],
        &["data"],
        &["items"],
        &["districts"],
        &[],
    ];

    fn normalize_record(raw: &Value) -> CanonicalDistrict {
        CanonicalDistrict {
            id: text(raw, &["districtId", "id"]),
            name: text(raw, &["name", "districtName"]),
            code: text(raw, &["code", "districtCode"]),
            state: text(raw, &["state", "stateName"]),
            region: text(raw, &["region", "regionName"]),
            is_active: flag(raw, &["isActive", "is_active"], true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn backend_lead() -> Value {
        json!({
            "leadId": 42,
            "customerName": "Ravi Kumar",
            "customerCompany": "Kumar Traders",
            "mobileNumber": "+919800000001",
            "email": "ravi@example.com",
            "location": "MG Road",
            "district": "Pune",
            "state": "MH",
            "leadSource": "WEBSITE",
            "leadStage": "Qualified",
            "finalStatus": "Hot",
            "assignedTo": "u-7",
            "createdBy": "u-1",
            "createdDate": "2025-03-01T10:00:00Z",
            "lastContactDate": "2025-03-04T09:00:00Z",
            "nextFollowUpDate": "2025-03-10T09:00:00Z",
            "remarks": "Call after lunch",
            "orderValue": "125000.50",
            "isActive": false
        })
    }

    #[test]
    fn test_lead_from_backend_shape() {
        let lead = LeadNormalizer::normalize_record(&backend_lead());
        assert_eq!(lead.id, "42");
        assert_eq!(lead.name, "Ravi Kumar");
        assert_eq!(lead.company, "Kumar Traders");
        assert_eq!(lead.status, "qualified");
        assert_eq!(lead.source, "website");
        assert_eq!(lead.final_status, "Hot");
        assert_eq!(lead.notes, "Call after lunch");
        assert_eq!(lead.budget, Some(125000.50));
        assert!(!lead.is_active);
    }

    #[test]
    fn test_lead_from_legacy_shape() {
        let lead = LeadNormalizer::normalize_record(&json!({
            "id": "abc",
            "name": "Jane Smith",
            "company": "Business Inc",
            "phone": "+1234567894",
            "status": "WON",
            "source": "Referral",
            "district_id": "d-9",
            "notes": "signed",
            "budget": 75000
        }));
        assert_eq!(lead.id, "abc");
        assert_eq!(lead.status, "won");
        assert_eq!(lead.source, "referral");
        assert_eq!(lead.district, "d-9");
        assert_eq!(lead.budget, Some(75000.0));
        assert!(lead.is_active);
    }

    #[test]
    fn test_lead_defaults_for_missing_fields() {
        let lead = LeadNormalizer::normalize_record(&json!({}));
        assert_eq!(lead, CanonicalLead { is_active: true, ..CanonicalLead::default() });

        let lead = LeadNormalizer::normalize_record(&json!({"customerName": null, "orderValue": ""}));
        assert_eq!(lead.name, "");
        assert_eq!(lead.budget, None);
    }

    #[test]
    fn test_non_object_record_yields_defaults() {
        let lead = LeadNormalizer::normalize_record(&json!("garbage"));
        assert_eq!(lead.id, "");
        assert!(lead.is_active);
    }

    #[test]
    fn test_list_nesting_depths_are_equivalent() {
        let items = json!([backend_lead(), {"id": "2", "name": "Other", "status": "NEW"}]);
        let bare = LeadNormalizer::normalize_list(&items);
        assert_eq!(bare.len(), 2);

        for wrapped in [
            json!({"data": items.clone()}),
            json!({"data": {"items": items.clone()}}),
            json!({"success": true, "data": {"data": {"items": items.clone(), "totalCount": 2}}}),
            json!({"items": items.clone()}),
        ] {
            assert_eq!(LeadNormalizer::normalize_list(&wrapped), bare);
        }
    }

    #[test]
    fn test_unknown_shape_is_empty() {
        assert!(LeadNormalizer::normalize_list(&json!({"data": {"total": 3}})).is_empty());
        assert!(LeadNormalizer::normalize_list(&Value::Null).is_empty());
        assert!(UserNormalizer::normalize_list(&json!("oops")).is_empty());
    }

    #[test]
    fn test_normalize_one_unwraps() {
        let direct = LeadNormalizer::normalize_one(&backend_lead());
        let wrapped = LeadNormalizer::normalize_one(&json!({"success": true, "data": backend_lead()}));
        let double = LeadNormalizer::normalize_one(&json!({"data": {"data": backend_lead()}}));
        assert_eq!(direct, wrapped);
        assert_eq!(direct, double);
        assert_eq!(LeadNormalizer::normalize_one(&json!([1, 2])).id, "");
    }

    #[test]
    fn test_user_fields() {
        let users = UserNormalizer::normalize_list(&json!({"data": {"users": [
            {"userId": "u1", "employeeName": "Meera", "phoneNumber": "555", "role": "ADMIN"},
            {"id": 7, "full_name": "Sam", "userRole": "Sales", "isActive": false}
        ]}}));
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].id, "u1");
        assert_eq!(users[0].full_name, "Meera");
        assert_eq!(users[0].role, "admin");
        assert!(users[0].is_active);
        assert_eq!(users[1].id, "7");
        assert_eq!(users[1].role, "sales");
        assert!(!users[1].is_active);
    }

    #[test]
    fn test_district_fields() {
        let districts = DistrictNormalizer::normalize_list(&json!({"data": {"districts": [
            {"districtId": "d1", "districtName": "Nashik", "districtCode": "NSK", "stateName": "MH", "regionName": "West"}
        ]}}));
        assert_eq!(
            districts,
            vec![CanonicalDistrict {
                id: "d1".into(),
                name: "Nashik".into(),
                code: "NSK".into(),
                state: "MH".into(),
                region: "West".into(),
                is_active: true,
            }]
        );
    }

    #[test]
    fn test_unwrap_envelope() {
        assert_eq!(unwrap_envelope(json!({"data": {"id": 1}})), json!({"id": 1}));
        assert_eq!(unwrap_envelope(json!({"id": 1})), json!({"id": 1}));
        assert_eq!(
            unwrap_envelope(json!({"data": null, "message": "ok"})),
            json!({"data": null, "message": "ok"})
        );
        assert_eq!(unwrap_envelope(json!(true)), json!(true));
    }

    #[test]
    fn test_flag_variants() {
        assert!(flag(&json!({"isActive": "TRUE"}), &["isActive"], false));
        assert!(!flag(&json!({"isActive": 0}), &["isActive"], true));
        assert!(flag(&json!({"isActive": "maybe"}), &["isActive"], true));
    }

    #[test]
    fn test_blank_values_fall_through_to_next_key() {
        let district = DistrictNormalizer::normalize_record(&json!({
            "districtId": "",
            "id": "d7",
            "name": "",
            "districtName": "Nashik"
        }));
        assert_eq!(district.id, "d7");
        assert_eq!(district.name, "Nashik");

        let user = UserNormalizer::normalize_record(&json!({"userId": "", "id": 9, "userRole": "Manager", "role": ""}));
        assert_eq!(user.id, "9");
        assert_eq!(user.role, "manager");

        // a blank value with no alternative still yields the default
        let lead = LeadNormalizer::normalize_record(&json!({"customerName": "", "orderValue": ""}));
        assert_eq!(lead.name, "");
        assert_eq!(lead.budget, None);
    }
}
