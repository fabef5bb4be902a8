use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    pub user_id: u64,
    #[serde(default)]
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_username: Option<String>,
    pub item: String,
    pub qty: u32,
    #[serde(default)]
    pub qty_display: String,
    #[serde(default = "not_available")]
    pub size: String,
    #[serde(default = "not_available")]
    pub expiry: String,
    #[serde(default = "not_available")]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_id: Option<String>,
    pub created_at: i64,
    pub status: ListingStatus,
    pub remaining: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_message_id: Option<i32>,
    #[serde(
        default,
        deserialize_with = "claims_compat",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub claims: BTreeMap<String, Claim>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Available,
    Claimed,
    Expired,
    #[serde(other)]
    Unknown,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Available => "available",
            ListingStatus::Claimed => "claimed",
            ListingStatus::Expired => "expired",
            ListingStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claim {
    pub user_id: u64,
    #[serde(default)]
    pub username: String,
    pub qty: u32,
    pub pickup_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_time: Option<String>,
    pub status: ClaimStatus,
    /// RFC 3339; older records carry a naive ISO timestamp.
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Pending,
    Approved,
    Rejected,
    RescheduleProposed,
    ApprovedRescheduled,
    RescheduleDeclined,
    #[serde(other)]
    Unknown,
}

impl ClaimStatus {
    pub fn is_approved(&self) -> bool {
        matches!(self, ClaimStatus::Approved | ClaimStatus::ApprovedRescheduled)
    }
}

fn not_available() -> String {
    "N/A".to_string()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ClaimsRepr {
    Map(BTreeMap<String, Claim>),
    List(Vec<Option<Claim>>),
}

/// Claims used to be stored as a JSON array; those are keyed `c1`, `c2`, ...
fn claims_compat<'de, D>(deserializer: D) -> Result<BTreeMap<String, Claim>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<ClaimsRepr>::deserialize(deserializer)? {
        None => BTreeMap::new(),
        Some(ClaimsRepr::Map(map)) => map,
        Some(ClaimsRepr::List(list)) => list
            .into_iter()
            .enumerate()
            .filter_map(|(i, claim)| claim.map(|c| (format!("c{}", i + 1), c)))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_legacy_record_with_claim_list() {
        let raw = json!({
            "user_id": 111,
            "user_name": "Dr Tan",
            "item": "Gloves",
            "qty": 10,
            "qty_display": "10 boxes",
            "created_at": 1_700_000_000,
            "status": "available",
            "remaining": 6,
            "claims": [
                {"user_id": 222, "qty": 4, "pickup_time": "Tomorrow 3pm",
                 "status": "approved", "timestamp": "2023-11-14T22:13:20.000001"},
                null,
                {"user_id": 333, "qty": 1, "pickup_time": "Fri",
                 "status": "approved_rescheduled", "timestamp": "2023-11-15T09:00:00"}
            ]
        });

        let listing: Listing = serde_json::from_value(raw).unwrap();
        assert_eq!(listing.size, "N/A");
        assert_eq!(listing.photo_id, None);
        assert_eq!(listing.claims.len(), 2);
        assert_eq!(listing.claims["c1"].user_id, 222);
        assert_eq!(listing.claims["c3"].status, ClaimStatus::ApprovedRescheduled);
        assert!(listing.claims["c3"].status.is_approved());
    }

    #[test]
    fn test_unknown_statuses_are_tolerated() {
        let raw = json!({
            "user_id": 1, "item": "Masks", "qty": 1, "created_at": 0,
            "status": "archived", "remaining": 1,
            "claims": {"c1": {"user_id": 2, "qty": 1, "pickup_time": "now", "status": "weird"}}
        });

        let listing: Listing = serde_json::from_value(raw).unwrap();
        assert_eq!(listing.status, ListingStatus::Unknown);
        assert_eq!(listing.claims["c1"].status, ClaimStatus::Unknown);
    }

    #[test]
    fn test_empty_optionals_are_not_written() {
        let raw = json!({
            "user_id": 1, "item": "Masks", "qty": 1, "created_at": 0,
            "status": "available", "remaining": 1
        });
        let listing: Listing = serde_json::from_value(raw).unwrap();

        let written = serde_json::to_value(&listing).unwrap();
        assert!(written.get("claims").is_none());
        assert!(written.get("photo_id").is_none());
        assert_eq!(written["status"], "available");
    }
}
