//! Book-keeping for requests awaiting a gateway reply.

use std::collections::HashMap;

use comfoq_core::protocol::{Body, OperationType};
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::application::error::SessionError;

/// Where the outcome of a request is delivered.
pub type ReplySender = oneshot::Sender<Result<(), SessionError>>;

/// One in-flight request.
#[derive(Debug)]
pub struct PendingRequest {
    pub reference: u32,
    pub kind: OperationType,
    /// Kept so the request can be re-sent under a fresh reference.
    pub body: Body,
    pub attempts_left: u32,
    pub deadline: Instant,
    pub reply: Option<ReplySender>,
}

impl PendingRequest {
    /// Delivers `outcome` to whoever is waiting.  A dropped receiver is fine.
    pub fn resolve(mut self, outcome: Result<(), SessionError>) {
        if let Some(tx) = self.reply.take() {
            let _ = tx.send(outcome);
        }
    }
}

/// In-flight requests keyed by reference.
#[derive(Debug, Default)]
pub struct PendingRequests {
    by_reference: HashMap<u32, PendingRequest>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, request: PendingRequest) {
        self.by_reference.insert(request.reference, request);
    }

    /// Removes and returns the request matching `reference`, if any.
    pub fn complete(&mut self, reference: u32) -> Option<PendingRequest> {
        self.by_reference.remove(&reference)
    }

    /// Removes and returns every request whose deadline is at or before `now`.
    pub fn expired(&mut self, now: Instant) -> Vec<PendingRequest> {
        let refs: Vec<u32> = self
            .by_reference
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(r, _)| *r)
            .collect();
        let mut out: Vec<PendingRequest> = refs
            .into_iter()
            .filter_map(|r| self.by_reference.remove(&r))
            .collect();
        out.sort_by_key(|p| p.deadline);
        out
    }

    /// Earliest deadline among in-flight requests.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.by_reference.values().map(|p| p.deadline).min()
    }

    /// Removes every request.
    pub fn drain(&mut self) -> Vec<PendingRequest> {
        self.by_reference.drain().map(|(_, p)| p).collect()
    }

    pub fn len(&self) -> usize {
        self.by_reference.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_reference.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn request(reference: u32, deadline: Instant) -> PendingRequest {
        PendingRequest {
            reference,
            kind: OperationType::VersionRequest,
            body: Body::VersionRequest,
            attempts_left: 1,
            deadline,
            reply: None,
        }
    }

    #[test]
    fn test_complete_matches_reference() {
        // Arrange
        let now = Instant::now();
        let mut pending = PendingRequests::new();
        pending.insert(request(1, now));
        pending.insert(request(2, now));

        // Act
        let hit = pending.complete(2);
        let miss = pending.complete(7);

        // Assert
        assert_eq!(hit.map(|p| p.reference), Some(2));
        assert!(miss.is_none());
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_expired_returns_only_overdue_requests() {
        let now = Instant::now();
        let mut pending = PendingRequests::new();
        pending.insert(request(1, now));
        pending.insert(request(2, now + Duration::from_secs(5)));

        let expired = pending.expired(now);

        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].reference, 1);
        assert_eq!(pending.next_deadline(), Some(now + Duration::from_secs(5)));
    }

    #[test]
    fn test_resolve_delivers_outcome() {
        let (tx, mut rx) = oneshot::channel();
        let mut req = request(3, Instant::now());
        req.reply = Some(tx);

        req.resolve(Err(SessionError::Closed));

        assert_eq!(rx.try_recv().unwrap(), Err(SessionError::Closed));
    }

    #[test]
    fn test_drain_empties_table() {
        let mut pending = PendingRequests::new();
        pending.insert(request(1, Instant::now()));
        assert_eq!(pending.drain().len(), 1);
        assert!(pending.is_empty());
        assert_eq!(pending.next_deadline(), None);
    }
}
