use async_trait::async_trait;
use reqwest::{header::ETAG, Client, Response, StatusCode};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};
use url::Url;

use crate::{
    error::{RedistError, Result},
    storage::{models::Listing, ListingStore, Versioned},
};

const LISTINGS: &str = "listings";

/// Firebase Realtime Database over its REST API.
///
/// Conditional writes use the database's ETag support: reads ask for the
/// ETag of the listing node and writes send it back in `if-match`, so a
/// concurrent change turns the write into `412 Precondition Failed`.
pub struct FirebaseStore {
    client: Client,
    base: Url,
    auth: Option<String>,
}

#[derive(Deserialize)]
struct PushResponse {
    name: String,
}

impl FirebaseStore {
    pub fn new(database_url: &str, auth: Option<String>) -> Result<Self> {
        let mut raw = database_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base = Url::parse(&raw)
            .map_err(|e| RedistError::Config(format!("Invalid Firebase URL {}: {}", database_url, e)))?;

        Ok(Self {
            client: Client::new(),
            base,
            auth: auth.filter(|a| !a.trim().is_empty()),
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        let mut url = self
            .base
            .join(&format!("{}.json", path))
            .map_err(|e| RedistError::Config(format!("Invalid database path {}: {}", path, e)))?;
        if let Some(auth) = &self.auth {
            url.query_pairs_mut().append_pair("auth", auth);
        }
        Ok(url)
    }

    fn listing_url(&self, id: &str) -> Result<Url> {
        self.url(&format!("{}/{}", LISTINGS, id))
    }
}

/// Database keys may not contain these, and ids arrive from user-typed deep links.
pub fn is_valid_key(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 768
        && !id.chars().any(|c| matches!(c, '.' | '$' | '#' | '[' | ']' | '/') || c.is_control())
}

async fn ensure_success(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(RedistError::RemoteStatus {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ListingStore for FirebaseStore {
    async fn insert(&self, listing: &Listing) -> Result<String> {
        let resp = self
            .client
            .post(self.url(LISTINGS)?)
            .json(listing)
            .send()
            .await?;
        let pushed: PushResponse = ensure_success(resp).await?.json().await?;
        debug!("Created listing {}", pushed.name);
        Ok(pushed.name)
    }

    async fn fetch(&self, id: &str) -> Result<Option<Versioned<Listing>>> {
        if !is_valid_key(id) {
            return Ok(None);
        }

        let resp = self
            .client
            .get(self.listing_url(id)?)
            .header("X-Firebase-ETag", "true")
            .send()
            .await?;
        let resp = ensure_success(resp).await?;

        let version = resp
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Firebase response for listing {} carried no ETag", id))?;

        let listing: Option<Listing> = resp.json().await?;
        Ok(listing.map(|value| Versioned { version, value }))
    }

    async fn replace(&self, id: &str, version: &str, listing: &Listing) -> Result<bool> {
        if !is_valid_key(id) {
            return Ok(false);
        }

        let resp = self
            .client
            .put(self.listing_url(id)?)
            .header("if-match", version)
            .json(listing)
            .send()
            .await?;

        if resp.status() == StatusCode::PRECONDITION_FAILED {
            return Ok(false);
        }
        ensure_success(resp).await?;
        Ok(true)
    }

    async fn all(&self) -> Result<Vec<(String, Listing)>> {
        let resp = self.client.get(self.url(LISTINGS)?).send().await?;
        let raw: Option<BTreeMap<String, serde_json::Value>> = ensure_success(resp).await?.json().await?;

        let mut listings = Vec::new();
        for (id, value) in raw.unwrap_or_default() {
            match serde_json::from_value::<Listing>(value) {
                Ok(listing) => listings.push((id, listing)),
                Err(e) => warn!("Skipping malformed listing {}: {}", id, e),
            }
        }
        Ok(listings)
    }
}
