//! Request Cache
//!
//! Cache-aside and invalidate-on-mutation for opaque network requests.

pub mod hash;
pub mod transport;
pub mod wrapper;

pub use hash::body_hash;
pub use transport::{ApiRequest, HttpMethod, HttpTransport, Transport, TransportResponse};
pub use wrapper::{ApiResponse, RequestCache, RequestCacheConfig, RequestOptions, REQUEST_NAMESPACE};
