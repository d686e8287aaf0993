pub mod cache;
pub mod rate_limit;
pub mod recovery;
pub mod request_id;

pub use cache::http_cache_middleware;
pub use rate_limit::rate_limit_middleware;
pub use recovery::handle_panic;
pub use request_id::{request_id_middleware, RequestId};
