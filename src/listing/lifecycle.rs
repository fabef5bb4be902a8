use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::storage::models::{Claim, ClaimStatus, Listing, ListingStatus};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClaimError {
    #[error("This listing has been fully claimed.")]
    FullyClaimed,

    #[error("This listing has expired.")]
    Expired,

    #[error("Only {remaining} units are available.")]
    InsufficientStock { requested: u32, remaining: u32 },

    #[error("Quantity must be at least 1.")]
    ZeroQuantity,

    #[error("Claim {0} no longer exists.")]
    UnknownClaim(String),

    #[error("This request has already been handled.")]
    AlreadyDecided(String),

    #[error("Only the {0} can do that.")]
    NotPermitted(&'static str),
}

impl Listing {
    /// Age check against `created_at`.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now.timestamp() - self.created_at > max_age.num_seconds()
    }

    pub fn is_open(&self) -> bool {
        self.status == ListingStatus::Available && self.remaining > 0
    }

    /// Units still claimable, or why none are.
    pub fn open_for_claims(&self, now: DateTime<Utc>, max_age: Duration) -> Result<u32, ClaimError> {
        match self.status {
            ListingStatus::Expired => return Err(ClaimError::Expired),
            ListingStatus::Available => {}
            _ => return Err(ClaimError::FullyClaimed),
        }
        if self.remaining == 0 {
            return Err(ClaimError::FullyClaimed);
        }
        if self.is_stale(now, max_age) {
            return Err(ClaimError::Expired);
        }
        Ok(self.remaining)
    }

    fn next_claim_id(&self) -> String {
        let mut n = self.claims.len() + 1;
        loop {
            let id = format!("c{}", n);
            if !self.claims.contains_key(&id) {
                return id;
            }
            n += 1;
        }
    }

    pub fn submit_claim(
        &mut self,
        requester: u64,
        username: &str,
        qty: u32,
        pickup_time: &str,
        now: DateTime<Utc>,
        max_age: Duration,
    ) -> Result<String, ClaimError> {
        if qty == 0 {
            return Err(ClaimError::ZeroQuantity);
        }
        let remaining = self.open_for_claims(now, max_age)?;
        if qty > remaining {
            return Err(ClaimError::InsufficientStock { requested: qty, remaining });
        }

        let id = self.next_claim_id();
        self.claims.insert(
            id.clone(),
            Claim {
                user_id: requester,
                username: username.to_string(),
                qty,
                pickup_time: pickup_time.to_string(),
                proposed_time: None,
                status: ClaimStatus::Pending,
                timestamp: now.to_rfc3339(),
                decided_at: None,
            },
        );
        Ok(id)
    }

    fn claim_in(&mut self, claim_id: &str, expected: ClaimStatus) -> Result<&mut Claim, ClaimError> {
        let claim = self
            .claims
            .get_mut(claim_id)
            .ok_or_else(|| ClaimError::UnknownClaim(claim_id.to_string()))?;
        if claim.status != expected {
            return Err(ClaimError::AlreadyDecided(claim_id.to_string()));
        }
        Ok(claim)
    }

    fn ensure_donor(&self, actor: u64) -> Result<(), ClaimError> {
        if actor != self.user_id {
            return Err(ClaimError::NotPermitted("donor"));
        }
        Ok(())
    }

    fn ensure_requester(&self, claim_id: &str, actor: u64) -> Result<(), ClaimError> {
        match self.claims.get(claim_id) {
            Some(claim) if claim.user_id == actor => Ok(()),
            Some(_) => Err(ClaimError::NotPermitted("requester")),
            None => Err(ClaimError::UnknownClaim(claim_id.to_string())),
        }
    }

    /// The conditional decrement shared by both approval paths.
    fn take_units(&mut self, qty: u32) -> Result<(), ClaimError> {
        if self.status == ListingStatus::Expired {
            return Err(ClaimError::Expired);
        }
        if self.remaining < qty {
            return Err(ClaimError::InsufficientStock {
                requested: qty,
                remaining: self.remaining,
            });
        }
        self.remaining -= qty;
        self.status = if self.remaining > 0 {
            ListingStatus::Available
        } else {
            ListingStatus::Claimed
        };
        Ok(())
    }

    pub fn approve_claim(&mut self, claim_id: &str, actor: u64, now: DateTime<Utc>) -> Result<Claim, ClaimError> {
        self.ensure_donor(actor)?;
        let qty = self.claim_in(claim_id, ClaimStatus::Pending)?.qty;
        self.take_units(qty)?;

        let claim = self.claim_in(claim_id, ClaimStatus::Pending)?;
        claim.status = ClaimStatus::Approved;
        claim.decided_at = Some(now.to_rfc3339());
        Ok(claim.clone())
    }

    pub fn reject_claim(&mut self, claim_id: &str, actor: u64, now: DateTime<Utc>) -> Result<Claim, ClaimError> {
        self.ensure_donor(actor)?;
        let claim = self.claim_in(claim_id, ClaimStatus::Pending)?;
        claim.status = ClaimStatus::Rejected;
        claim.decided_at = Some(now.to_rfc3339());
        Ok(claim.clone())
    }

    /// A claim the donor can still act on.
    pub fn pending_claim(&self, claim_id: &str, actor: u64) -> Result<&Claim, ClaimError> {
        self.ensure_donor(actor)?;
        match self.claims.get(claim_id) {
            Some(claim) if claim.status == ClaimStatus::Pending => Ok(claim),
            Some(_) => Err(ClaimError::AlreadyDecided(claim_id.to_string())),
            None => Err(ClaimError::UnknownClaim(claim_id.to_string())),
        }
    }

    pub fn propose_time(&mut self, claim_id: &str, actor: u64, new_time: &str) -> Result<Claim, ClaimError> {
        self.ensure_donor(actor)?;
        let claim = self.claim_in(claim_id, ClaimStatus::Pending)?;
        claim.status = ClaimStatus::RescheduleProposed;
        claim.proposed_time = Some(new_time.to_string());
        Ok(claim.clone())
    }

    pub fn accept_proposed_time(
        &mut self,
        claim_id: &str,
        actor: u64,
        now: DateTime<Utc>,
    ) -> Result<Claim, ClaimError> {
        self.ensure_requester(claim_id, actor)?;
        let qty = self.claim_in(claim_id, ClaimStatus::RescheduleProposed)?.qty;
        self.take_units(qty)?;

        let claim = self.claim_in(claim_id, ClaimStatus::RescheduleProposed)?;
        if let Some(new_time) = claim.proposed_time.take() {
            claim.pickup_time = new_time;
        }
        claim.status = ClaimStatus::ApprovedRescheduled;
        claim.decided_at = Some(now.to_rfc3339());
        Ok(claim.clone())
    }

    pub fn decline_proposed_time(
        &mut self,
        claim_id: &str,
        actor: u64,
        now: DateTime<Utc>,
    ) -> Result<Claim, ClaimError> {
        self.ensure_requester(claim_id, actor)?;
        let claim = self.claim_in(claim_id, ClaimStatus::RescheduleProposed)?;
        claim.status = ClaimStatus::RescheduleDeclined;
        claim.decided_at = Some(now.to_rfc3339());
        Ok(claim.clone())
    }

    /// Returns whether anything changed.
    pub fn expire(&mut self) -> bool {
        if self.status != ListingStatus::Available {
            return false;
        }
        self.status = ListingStatus::Expired;
        true
    }

    /// Display handle of the donor, `@username` when known.
    pub fn donor_handle(&self) -> String {
        match &self.user_username {
            Some(username) if !username.is_empty() => format!("@{}", username),
            _ if !self.user_name.is_empty() => self.user_name.clone(),
            _ => "Donor".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    const DONOR: u64 = 100;
    const ALICE: u64 = 200;
    const BOB: u64 = 300;

    fn listing(qty: u32) -> Listing {
        Listing {
            user_id: DONOR,
            user_name: "Nurse Lim".to_string(),
            user_username: Some("nurselim".to_string()),
            item: "Hand Sanitiser".to_string(),
            qty,
            qty_display: format!("{} bottles", qty),
            size: "500ml".to_string(),
            expiry: "31/12/26".to_string(),
            location: "Ward 5".to_string(),
            photo_id: None,
            created_at: now().timestamp(),
            status: ListingStatus::Available,
            remaining: qty,
            channel_message_id: Some(7),
            claims: BTreeMap::new(),
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn max_age() -> Duration {
        Duration::days(14)
    }

    #[test]
    fn test_submit_and_approve_decrements() {
        let mut l = listing(10);
        let id = l.submit_claim(ALICE, "alice", 4, "Tomorrow 3pm", now(), max_age()).unwrap();
        assert_eq!(l.remaining, 10, "pending claims do not reserve stock");

        let claim = l.approve_claim(&id, DONOR, now()).unwrap();
        assert_eq!(claim.status, ClaimStatus::Approved);
        assert_eq!(l.remaining, 6);
        assert_eq!(l.status, ListingStatus::Available);
    }

    #[test]
    fn test_last_units_mark_listing_claimed() {
        let mut l = listing(3);
        let id = l.submit_claim(ALICE, "alice", 3, "now", now(), max_age()).unwrap();
        l.approve_claim(&id, DONOR, now()).unwrap();

        assert_eq!(l.remaining, 0);
        assert_eq!(l.status, ListingStatus::Claimed);
        assert!(!l.is_open());
        assert_eq!(
            l.submit_claim(BOB, "bob", 1, "later", now(), max_age()),
            Err(ClaimError::FullyClaimed)
        );
    }

    #[test]
    fn test_approve_twice_does_not_double_decrement() {
        let mut l = listing(10);
        let id = l.submit_claim(ALICE, "alice", 2, "now", now(), max_age()).unwrap();
        l.approve_claim(&id, DONOR, now()).unwrap();

        assert_eq!(
            l.approve_claim(&id, DONOR, now()),
            Err(ClaimError::AlreadyDecided(id.clone()))
        );
        assert_eq!(l.remaining, 8);
    }

    #[test]
    fn test_competing_claims_respect_remaining() {
        let mut l = listing(5);
        let first = l.submit_claim(ALICE, "alice", 4, "now", now(), max_age()).unwrap();
        let second = l.submit_claim(BOB, "bob", 3, "now", now(), max_age()).unwrap();

        l.approve_claim(&first, DONOR, now()).unwrap();
        assert_eq!(
            l.approve_claim(&second, DONOR, now()),
            Err(ClaimError::InsufficientStock { requested: 3, remaining: 1 })
        );
        assert_eq!(l.claims[&second].status, ClaimStatus::Pending);
        assert_eq!(l.remaining, 1);
    }

    #[test]
    fn test_submit_validates_quantity() {
        let mut l = listing(5);
        assert_eq!(
            l.submit_claim(ALICE, "alice", 0, "now", now(), max_age()),
            Err(ClaimError::ZeroQuantity)
        );
        assert_eq!(
            l.submit_claim(ALICE, "alice", 6, "now", now(), max_age()),
            Err(ClaimError::InsufficientStock { requested: 6, remaining: 5 })
        );
        assert!(l.claims.is_empty());
    }

    #[test]
    fn test_only_donor_decides() {
        let mut l = listing(5);
        let id = l.submit_claim(ALICE, "alice", 1, "now", now(), max_age()).unwrap();

        assert_eq!(l.approve_claim(&id, BOB, now()), Err(ClaimError::NotPermitted("donor")));
        assert_eq!(l.reject_claim(&id, ALICE, now()), Err(ClaimError::NotPermitted("donor")));
        assert_eq!(l.remaining, 5);
    }

    #[test]
    fn test_reject_leaves_stock() {
        let mut l = listing(5);
        let id = l.submit_claim(ALICE, "alice", 2, "now", now(), max_age()).unwrap();
        let claim = l.reject_claim(&id, DONOR, now()).unwrap();

        assert_eq!(claim.status, ClaimStatus::Rejected);
        assert_eq!(l.remaining, 5);
        assert!(l.approve_claim(&id, DONOR, now()).is_err());
    }

    #[test]
    fn test_reschedule_accepted() {
        let mut l = listing(5);
        let id = l.submit_claim(ALICE, "alice", 2, "Mon 9am", now(), max_age()).unwrap();
        assert!(l.pending_claim(&id, DONOR).is_ok());
        assert_eq!(l.pending_claim(&id, ALICE).unwrap_err(), ClaimError::NotPermitted("donor"));

        l.propose_time(&id, DONOR, "Tue 2pm").unwrap();
        assert_eq!(l.claims[&id].status, ClaimStatus::RescheduleProposed);
        assert!(matches!(l.pending_claim(&id, DONOR), Err(ClaimError::AlreadyDecided(_))));

        assert_eq!(
            l.accept_proposed_time(&id, BOB, now()),
            Err(ClaimError::NotPermitted("requester"))
        );

        let claim = l.accept_proposed_time(&id, ALICE, now()).unwrap();
        assert_eq!(claim.pickup_time, "Tue 2pm");
        assert_eq!(claim.proposed_time, None);
        assert_eq!(claim.status, ClaimStatus::ApprovedRescheduled);
        assert_eq!(l.remaining, 3);
    }

    #[test]
    fn test_reschedule_declined() {
        let mut l = listing(5);
        let id = l.submit_claim(ALICE, "alice", 2, "Mon 9am", now(), max_age()).unwrap();
        l.propose_time(&id, DONOR, "Tue 2pm").unwrap();

        let claim = l.decline_proposed_time(&id, ALICE, now()).unwrap();
        assert_eq!(claim.status, ClaimStatus::RescheduleDeclined);
        assert_eq!(l.remaining, 5);
        assert!(l.accept_proposed_time(&id, ALICE, now()).is_err());
    }

    #[test]
    fn test_stale_listing_is_closed() {
        let mut l = listing(5);
        l.created_at = (now() - Duration::days(15)).timestamp();

        assert!(l.is_stale(now(), max_age()));
        assert_eq!(l.open_for_claims(now(), max_age()), Err(ClaimError::Expired));

        assert!(l.expire());
        assert!(!l.expire());
        assert_eq!(l.status, ListingStatus::Expired);
    }

    #[test]
    fn test_claim_ids_skip_taken_keys() {
        let mut l = listing(5);
        let first = l.submit_claim(ALICE, "alice", 1, "now", now(), max_age()).unwrap();
        let claim = l.claims.remove(&first).unwrap();
        l.claims.insert("c2".to_string(), claim);

        let next = l.submit_claim(BOB, "bob", 1, "now", now(), max_age()).unwrap();
        assert_eq!(next, "c3");
    }

    #[test]
    fn test_donor_handle() {
        let mut l = listing(1);
        assert_eq!(l.donor_handle(), "@nurselim");
        l.user_username = None;
        assert_eq!(l.donor_handle(), "Nurse Lim");
    }
}
