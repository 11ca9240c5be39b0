//! Derived-Analytics Fallback.
//!
//! Computes dashboard statistics from leads already held in memory when the
//! aggregation endpoint is unavailable. Pure: no I/O.

use crate::models::{
    AggregateStatistics, CanonicalLead, RecentActivity, SOURCE_MANUAL, STATUS_CONTACTED,
    STATUS_LOST, STATUS_NEW, STATUS_QUALIFIED, STATUS_WON, UNASSIGNED_DISTRICT,
};
use std::collections::BTreeMap;

/// Entries kept in `recent_activities`.
pub const RECENT_ACTIVITY_LIMIT: usize = 10;

fn bucket<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

/// Rounds to two decimals.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Aggregates `leads` in a single pass.
///
/// `recent_activities` keeps the first ten leads in their given order.
pub fn derive_stats(leads: &[CanonicalLead]) -> AggregateStatistics {
    let mut by_status: BTreeMap<String, u64> = BTreeMap::new();
    let mut by_district: BTreeMap<String, u64> = BTreeMap::new();
    let mut by_source: BTreeMap<String, u64> = BTreeMap::new();
    let mut total_revenue = 0.0;
    let mut recent_activities = Vec::with_capacity(leads.len().min(RECENT_ACTIVITY_LIMIT));

    for (index, lead) in leads.iter().enumerate() {
        let status = bucket(&lead.status, STATUS_NEW);
        *by_status.entry(status.to_string()).or_default() += 1;
        *by_district
            .entry(bucket(&lead.district, UNASSIGNED_DISTRICT).to_string())
            .or_default() += 1;
        *by_source
            .entry(bucket(&lead.source, SOURCE_MANUAL).to_string())
            .or_default() += 1;

        if status == STATUS_WON {
            total_revenue += lead.budget.unwrap_or(0.0);
        }

        if index < RECENT_ACTIVITY_LIMIT {
            recent_activities.push(RecentActivity {
                lead_id: lead.id.clone(),
                lead_name: lead.name.clone(),
                status: lead.status.clone(),
                updated_at: bucket(&lead.last_contact_date, &lead.created_at).to_string(),
            });
        }
    }

    let count = |status: &str| by_status.get(status).copied().unwrap_or(0);
    let new_leads = count(STATUS_NEW);
    let contacted_leads = count(STATUS_CONTACTED);
    let qualified_leads = count(STATUS_QUALIFIED);
    let won_leads = count(STATUS_WON);
    let lost_leads = count(STATUS_LOST);

    let total_leads = leads.len() as u64;
    let conversion_rate = if total_leads == 0 {
        0.0
    } else {
        round2(won_leads as f64 / total_leads as f64 * 100.0)
    };

    AggregateStatistics {
        total_leads,
        new_leads,
        contacted_leads,
        qualified_leads,
        won_leads,
        lost_leads,
        conversion_rate,
        total_revenue,
        leads_by_status: by_status,
        leads_by_district: by_district,
        leads_by_source: by_source,
        recent_activities,
    }
}
