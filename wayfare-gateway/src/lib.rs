//! Outbound HTTP to the flight-shopping vendor: a rate-limited JSON client,
//! the OAuth2 token lifecycle, and translation between the vendor wire format
//! and the canonical offer model.

pub mod client;
pub mod error;
pub mod http;
pub mod limiter;
pub mod token;
pub mod translator;
pub mod wire;

pub use client::{VendorClient, VendorConfig};
pub use error::GatewayError;
pub use http::{HttpClient, HttpClientConfig, HttpRequest, HttpResponse};
pub use limiter::TokenBucket;
pub use token::TokenManager;
