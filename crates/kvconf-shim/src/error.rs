use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShimError {
    #[error("Request failed: {0}")]
    Transport(String),
    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("Invalid header value for {0}")]
    InvalidHeader(&'static str),
    #[error("authentication failed: check that the API token is correct")]
    Unauthorized,
    #[error("{message}")]
    Status { status: u16, message: String },
    #[error("Could not load the fallback config: {0}")]
    Fallback(String),
    #[error("Response body could not be decoded: {0}")]
    Decode(String),
    #[error("send() called before open()")]
    NotOpened,
}
