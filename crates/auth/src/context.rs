use std::time::{Duration, Instant};

use uuid::Uuid;

use factgate_core::{EntityRef, UserId};

/// Context of one logical operation (one inbound request).
///
/// Carries who is asking, how long the operation may take, and a request id
/// for log correlation. It is passed explicitly into every resolver and
/// synchronizer call and lives no longer than the operation itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    subject: EntityRef,
    deadline: Option<Instant>,
    request_id: Uuid,
}

impl RequestContext {
    pub fn new(subject: UserId) -> Self {
        Self::for_subject(EntityRef::user(subject))
    }

    pub fn for_subject(subject: EntityRef) -> Self {
        Self {
            subject,
            deadline: None,
            request_id: Uuid::now_v7(),
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn subject(&self) -> &EntityRef {
        &self.subject
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}
