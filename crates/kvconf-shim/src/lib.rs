//! Serves a dashboard's config file from the kvconf service instead of a static file.
//!
//! [`ConfigShim::new`] captures the original transport once at startup. The application
//! then issues its requests through [`ConfigShim::fetch_client`] (promise-style) or
//! [`ConfigShim::xhr`] (event-style). Requests for the config file are redirected to the
//! service; everything else reaches the original transport untouched.

pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod matcher;
pub mod shim;
pub mod transport;
pub mod xhr;

pub use config::ShimConfig;
pub use error::ShimError;
pub use fetch::InterceptingFetch;
pub use shim::ConfigShim;
pub use transport::{Fetch, FetchRequest, FetchResponse, ReqwestFetch, BYPASS_HEADER};
pub use xhr::{ReadyState, XhrSnapshot, XmlHttpRequest};

#[cfg(test)]
pub(crate) mod test_util;
