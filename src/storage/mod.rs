pub mod db;
pub mod firebase;
pub mod models;

pub use db::SqliteStore;
pub use firebase::FirebaseStore;
pub use models::{Claim, ClaimStatus, Listing, ListingStatus};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{Config, StorageBackend};
use crate::error::{RedistError, Result};

/// A stored value together with the opaque version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub version: String,
    pub value: T,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ListingStore: Send + Sync {
    /// Stores a new listing and returns its id.
    async fn insert(&self, listing: &Listing) -> Result<String>;

    async fn fetch(&self, id: &str) -> Result<Option<Versioned<Listing>>>;

    /// Compare-and-swap: writes only if the listing is still at `version`.
    /// Returns `false` when someone else got there first.
    async fn replace(&self, id: &str, version: &str, listing: &Listing) -> Result<bool>;

    async fn all(&self) -> Result<Vec<(String, Listing)>>;
}

pub fn open_store(config: &Config) -> Result<Arc<dyn ListingStore>> {
    match config.storage.backend {
        StorageBackend::Firebase => {
            info!("Using Firebase store at {}", config.storage.firebase_url);
            Ok(Arc::new(FirebaseStore::new(
                &config.storage.firebase_url,
                config.storage.firebase_auth.clone(),
            )?))
        }
        StorageBackend::Sqlite => {
            info!("Using SQLite store at {}", config.storage.sqlite_path);
            Ok(Arc::new(SqliteStore::new(&config.storage.sqlite_path)?))
        }
    }
}

/// Read-modify-write of one listing, retried while other writers win the race.
pub async fn update_listing<T, F>(
    store: &dyn ListingStore,
    id: &str,
    retries: u32,
    mut apply: F,
) -> Result<(Listing, T)>
where
    F: FnMut(&mut Listing) -> Result<T>,
{
    for attempt in 1..=retries.max(1) {
        let Versioned { version, value: mut listing } = store
            .fetch(id)
            .await?
            .ok_or_else(|| RedistError::ListingNotFound(id.to_string()))?;

        let out = apply(&mut listing)?;
        if store.replace(id, &version, &listing).await? {
            return Ok((listing, out));
        }
        warn!("Listing {} changed during update (attempt {}), retrying", id, attempt);
    }
    Err(RedistError::Conflict(id.to_string()))
}

/// Expires every available listing older than `max_age`. Returns the listings
/// that changed, as written.
pub async fn expire_stale(
    store: &dyn ListingStore,
    now: DateTime<Utc>,
    max_age: Duration,
    retries: u32,
) -> Result<Vec<(String, Listing)>> {
    let mut expired = Vec::new();

    for (id, listing) in store.all().await? {
        if listing.status != ListingStatus::Available || !listing.is_stale(now, max_age) {
            continue;
        }

        match update_listing(store, &id, retries, |l| Ok(l.is_stale(now, max_age) && l.expire())).await {
            Ok((updated, true)) => expired.push((id, updated)),
            Ok((_, false)) => {}
            Err(e) => warn!("Could not expire listing {}: {}", id, e),
        }
    }

    Ok(expired)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ListingStats {
    pub total_listings: usize,
    pub available: usize,
    pub claimed: usize,
    pub expired: usize,
    pub total_claims: usize,
    pub pending_claims: usize,
    pub approved_claims: usize,
    pub units_listed: u64,
    pub units_redistributed: u64,
}

pub fn compute_stats(listings: &[(String, Listing)]) -> ListingStats {
    let mut stats = ListingStats {
        total_listings: listings.len(),
        ..Default::default()
    };

    for (_, listing) in listings {
        match listing.status {
            ListingStatus::Available => stats.available += 1,
            ListingStatus::Claimed => stats.claimed += 1,
            ListingStatus::Expired => stats.expired += 1,
            ListingStatus::Unknown => {}
        }
        stats.units_listed += u64::from(listing.qty);

        for claim in listing.claims.values() {
            stats.total_claims += 1;
            if claim.status == ClaimStatus::Pending {
                stats.pending_claims += 1;
            }
            if claim.status.is_approved() {
                stats.approved_claims += 1;
                stats.units_redistributed += u64::from(claim.qty);
            }
        }
    }

    stats
}
