//! Request/response filter chains.
//!
//! Filters are the client's extension points: a request filter may rewrite
//! headers or veto the call before it is sent, a response filter may veto a
//! response after it arrived (before status classification). Any veto fails the
//! call with [`ApiError::Filter`](super::ApiError::Filter).

use std::sync::Arc;

use reqwest::{header::HeaderMap, Method};

/// Mutable view of an outgoing request.
pub struct OutgoingRequest<'a> {
    pub method: &'a Method,
    pub url: &'a str,
    pub headers: &'a mut HeaderMap,
    pub body: Option<&'a serde_json::Value>,
}

/// Read-only view of a received response.
pub struct IncomingResponse<'a> {
    pub method: &'a Method,
    pub url: &'a str,
    pub status: u16,
    pub headers: &'a HeaderMap,
}

pub trait RequestFilter: Send + Sync {
    fn before_send(&self, req: &mut OutgoingRequest<'_>) -> Result<(), String>;
}

pub trait ResponseFilter: Send + Sync {
    fn after_receive(&self, resp: &IncomingResponse<'_>) -> Result<(), String>;
}

#[derive(Clone, Default)]
pub struct FilterChain {
    request: Vec<Arc<dyn RequestFilter>>,
    response: Vec<Arc<dyn ResponseFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_filter(mut self, filter: impl RequestFilter + 'static) -> Self {
        self.request.push(Arc::new(filter));
        self
    }

    pub fn with_response_filter(mut self, filter: impl ResponseFilter + 'static) -> Self {
        self.response.push(Arc::new(filter));
        self
    }

    /// Runs request filters in registration order; stops at the first veto.
    pub fn run_request(&self, req: &mut OutgoingRequest<'_>) -> Result<(), String> {
        for f in &self.request {
            f.before_send(req)?;
        }
        Ok(())
    }

    pub fn run_response(&self, resp: &IncomingResponse<'_>) -> Result<(), String> {
        for f in &self.response {
            f.after_receive(resp)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.request.is_empty() && self.response.is_empty()
    }
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterChain")
            .field("request", &self.request.len())
            .field("response", &self.response.len())
            .finish()
    }
}
