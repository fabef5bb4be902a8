//! Yearly CSV export of listings for sustainability reporting.

use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use std::io::Write;
use std::path::Path;
use tracing::info;

use crate::error::Result;
use crate::storage::{Listing, ListingStore};
use crate::utils;

pub const HEADER: [&str; 11] = [
    "listing_id",
    "item_name",
    "status",
    "poster_id",
    "claimed_by",
    "created_at",
    "claimed_at",
    "quantity",
    "remaining",
    "location",
    "expiry",
];

pub fn default_filename(year: i32) -> String {
    format!("redistribution_{}.csv", year)
}

fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// One CSV row, or `None` when the listing wasn't created in `year`.
pub fn listing_row(listing_id: &str, listing: &Listing, year: i32) -> Option<Vec<String>> {
    let created = utils::from_unix(listing.created_at)?;
    if created.year() != year {
        return None;
    }

    let approved: Vec<_> = listing
        .claims
        .values()
        .filter(|claim| claim.status.is_approved())
        .collect();
    let claimed_by = approved
        .iter()
        .map(|claim| claim.user_id.to_string())
        .collect::<Vec<_>>()
        .join(";");
    let claimed_at = approved
        .iter()
        .filter_map(|claim| {
            claim
                .decided_at
                .as_deref()
                .or(Some(claim.timestamp.as_str()))
                .and_then(utils::parse_timestamp)
        })
        .max()
        .map(iso)
        .unwrap_or_default();

    Some(vec![
        listing_id.to_string(),
        listing.item.clone(),
        listing.status.to_string(),
        listing.user_id.to_string(),
        claimed_by,
        iso(created),
        claimed_at,
        listing.qty.to_string(),
        listing.remaining.to_string(),
        listing.location.clone(),
        listing.expiry.clone(),
    ])
}

/// Writes the header and every listing from `year`. Returns the number of rows.
pub fn write_csv<W: Write>(out: &mut W, listings: &[(String, Listing)], year: i32) -> Result<usize> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(HEADER)?;

    let mut rows = 0;
    for (listing_id, listing) in listings {
        if let Some(row) = listing_row(listing_id, listing, year) {
            writer.write_record(&row)?;
            rows += 1;
        }
    }
    writer.flush()?;
    Ok(rows)
}

pub async fn export_year(store: &dyn ListingStore, year: i32, path: &Path) -> Result<usize> {
    let listings = store.all().await?;
    let mut file = std::fs::File::create(path)?;
    let rows = write_csv(&mut file, &listings, year)?;
    info!("Exported {} listing(s) from {} to {}", rows, year, path.display());
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Claim, ClaimStatus, ListingStatus, SqliteStore};
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn created(year: i32) -> i64 {
        Utc.with_ymd_and_hms(year, 5, 1, 9, 0, 0).unwrap().timestamp()
    }

    fn claim(user_id: u64, status: ClaimStatus, decided_at: Option<&str>) -> Claim {
        Claim {
            user_id,
            username: format!("user{}", user_id),
            qty: 1,
            pickup_time: "Monday".to_string(),
            proposed_time: None,
            status,
            timestamp: "2025-05-01T10:00:00+00:00".to_string(),
            decided_at: decided_at.map(str::to_string),
        }
    }

    fn listing(year: i32) -> Listing {
        Listing {
            user_id: 42,
            user_name: "Nurse Tan".to_string(),
            user_username: None,
            item: "Gloves, nitrile".to_string(),
            qty: 5,
            qty_display: "5 boxes".to_string(),
            size: "M".to_string(),
            expiry: "N/A".to_string(),
            location: "Level 3 \"Store\"".to_string(),
            photo_id: None,
            created_at: created(year),
            status: ListingStatus::Available,
            remaining: 3,
            channel_message_id: Some(7),
            claims: BTreeMap::new(),
        }
    }

    #[test]
    fn test_row_joins_approved_claimers() {
        let mut l = listing(2025);
        l.claims.insert("c1".into(), claim(7, ClaimStatus::Approved, Some("2025-05-02T08:00:00+00:00")));
        l.claims.insert("c2".into(), claim(8, ClaimStatus::Rejected, Some("2025-05-03T08:00:00+00:00")));
        l.claims.insert(
            "c3".into(),
            claim(9, ClaimStatus::ApprovedRescheduled, Some("2025-05-04T08:00:00+00:00")),
        );

        let row = listing_row("-Nx1", &l, 2025).unwrap();
        assert_eq!(row[0], "-Nx1");
        assert_eq!(row[2], "available");
        assert_eq!(row[4], "7;9");
        assert_eq!(row[5], "2025-05-01T09:00:00Z");
        assert_eq!(row[6], "2025-05-04T08:00:00Z");
        assert_eq!(row[7], "5");
        assert_eq!(row[8], "3");
    }

    #[test]
    fn test_row_skips_other_years() {
        assert!(listing_row("1", &listing(2024), 2025).is_none());
        let row = listing_row("1", &listing(2024), 2024).unwrap();
        assert_eq!(row[4], "");
        assert_eq!(row[6], "");
    }

    #[test]
    fn test_write_csv() {
        let listings = vec![
            ("1".to_string(), listing(2025)),
            ("2".to_string(), listing(2023)),
        ];
        let mut out = Vec::new();
        let rows = write_csv(&mut out, &listings, 2025).unwrap();
        assert_eq!(rows, 1);

        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), HEADER.join(","));
        let row = lines.next().unwrap();
        // commas and quotes force quoting, empty fields stay bare
        assert!(row.starts_with("1,\"Gloves, nitrile\",available,42,,"));
        assert!(row.ends_with(",\"Level 3 \"\"Store\"\"\",N/A"));
        assert!(lines.next().is_none());
    }

    #[tokio::test]
    async fn test_export_year_to_file() {
        let store = SqliteStore::in_memory().unwrap();
        store.insert(&listing(2025)).await.unwrap();
        store.insert(&listing(2025)).await.unwrap();
        store.insert(&listing(2022)).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(default_filename(2025));
        let rows = export_year(&store, 2025, &path).await.unwrap();
        assert_eq!(rows, 2);

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.lines().count(), 3);
    }
}
