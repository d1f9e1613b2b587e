//! Core domain + application logic for the QQ bot backend.
//!
//! This crate is intentionally transport-agnostic. The concrete OpenAPI client
//! (reqwest, v1 endpoints, token endpoint) lives in `qbot-openapi` behind the
//! [`openapi::OpenApi`] and [`token::TokenFetcher`] traits.

pub mod commands;
pub mod config;
pub mod domain;
pub mod errors;
pub mod limiter;
pub mod logging;
pub mod messaging;
pub mod openapi;
pub mod processor;
pub mod router;
pub mod token;

pub use errors::{Error, Result};
