//! Per-request state threaded through the middleware chain.
//!
//! A [`RequestContext`] is created when the request enters the server and
//! dropped with the request. Every field is write-once: the trace id and
//! route signature are set by the trace step, the identity by the
//! authentication gate. Later writes are refused, never applied.

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::logging::ContextLogger;

/// An authenticated user, as returned by the user-lookup collaborator.
///
/// `id == 0` is the "unset" sentinel: the credential parsed but no longer
/// maps to a live session.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct User {
    pub id: u64,
    /// External-provider primary id (e.g. an OpenID).
    pub primary_id: String,
    /// External-provider secondary id (e.g. a UnionID).
    pub secondary_id: String,
}

/// Shared handle to a request's trace id.
///
/// The recovery guard holds one of these so that a panic log can carry the
/// id even though the guard sits outside the step that assigns it.
#[derive(Clone, Debug, Default)]
pub struct TraceSlot(Arc<OnceLock<String>>);

impl TraceSlot {
    pub fn get(&self) -> Option<&str> {
        self.0.get().map(String::as_str)
    }
}

/// Shared handle to a request's authenticated user, for the same reason as
/// [`TraceSlot`]: the gate runs inside the recovery guard.
#[derive(Clone, Debug, Default)]
pub struct IdentitySlot(Arc<OnceLock<Arc<User>>>);

impl IdentitySlot {
    pub fn get(&self) -> Option<&Arc<User>> {
        self.0.get()
    }

    /// The user's primary id, as used to key log lines.
    pub fn primary_id(&self) -> Option<&str> {
        self.get().map(|u| u.primary_id.as_str())
    }
}

#[derive(Debug, Default)]
pub struct RequestContext {
    trace_id: TraceSlot,
    route: Option<String>,
    identity: IdentitySlot,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.get()
    }

    /// Sets the trace id. Returns `false` and keeps the old id if one was
    /// already assigned.
    pub fn set_trace_id(&mut self, id: impl Into<String>) -> bool {
        self.trace_id.0.set(id.into()).is_ok()
    }

    pub fn trace_slot(&self) -> TraceSlot {
        self.trace_id.clone()
    }

    /// Method and path, e.g. `GET/users/42`.
    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    pub fn set_route(&mut self, route: impl Into<String>) -> bool {
        if self.route.is_some() {
            return false;
        }
        self.route = Some(route.into());
        true
    }

    pub fn identity(&self) -> Option<&Arc<User>> {
        self.identity.get()
    }

    pub fn primary_id(&self) -> Option<&str> {
        self.identity.primary_id()
    }

    pub fn secondary_id(&self) -> Option<&str> {
        self.identity().map(|u| u.secondary_id.as_str())
    }

    /// Attaches the authenticated user and its two external ids.
    /// Returns `false` if an identity is already present.
    pub fn set_identity(&mut self, user: Arc<User>) -> bool {
        self.identity.0.set(user).is_ok()
    }

    pub fn identity_slot(&self) -> IdentitySlot {
        self.identity.clone()
    }

    /// Logger keyed by this request's trace id, route and user.
    pub fn logger(&self) -> ContextLogger<'_> {
        ContextLogger::new(self.trace_id(), self.route(), self.primary_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_id_is_write_once() {
        let mut ctx = RequestContext::new();
        assert_eq!(ctx.trace_id(), None);
        assert!(ctx.set_trace_id("first"));
        assert!(!ctx.set_trace_id("second"));
        assert_eq!(ctx.trace_id(), Some("first"));
    }

    #[test]
    fn trace_slot_observes_later_assignment() {
        let mut ctx = RequestContext::new();
        let slot = ctx.trace_slot();
        assert_eq!(slot.get(), None);
        ctx.set_trace_id("abc");
        assert_eq!(slot.get(), Some("abc"));
    }

    #[test]
    fn identity_is_never_overwritten() {
        let mut ctx = RequestContext::new();
        let first = Arc::new(User { id: 7, primary_id: "p".into(), secondary_id: "s".into() });
        let second = Arc::new(User { id: 8, ..User::default() });

        assert!(ctx.set_identity(Arc::clone(&first)));
        assert!(!ctx.set_identity(second));

        assert_eq!(ctx.identity().map(|u| u.id), Some(7));
        assert_eq!(ctx.primary_id(), Some("p"));
        assert_eq!(ctx.secondary_id(), Some("s"));
        assert!(Arc::ptr_eq(ctx.identity().unwrap(), &first));
    }

    #[test]
    fn identity_slot_observes_later_attachment() {
        let mut ctx = RequestContext::new();
        let slot = ctx.identity_slot();
        assert_eq!(slot.primary_id(), None);
        ctx.set_identity(Arc::new(User { id: 3, primary_id: "open-3".into(), secondary_id: String::new() }));
        assert_eq!(slot.primary_id(), Some("open-3"));
        assert_eq!(slot.get().map(|u| u.id), Some(3));
    }

    #[test]
    fn route_is_write_once() {
        let mut ctx = RequestContext::new();
        assert!(ctx.set_route("GET/a"));
        assert!(!ctx.set_route("GET/b"));
        assert_eq!(ctx.route(), Some("GET/a"));
    }
}
