//! reqwest adapter for the platform OpenAPI (v1 endpoints, token endpoint).

use qbot_core::openapi::{ApiRegistry, ApiVersion};

pub mod token;
pub mod v1;

pub use token::AppAccessTokenFetcher;
pub use v1::OpenApiV1;

/// Installs every API version this crate implements.
pub fn register_all(registry: &mut ApiRegistry) {
    registry.register(ApiVersion::V1, OpenApiV1::constructor);
}
