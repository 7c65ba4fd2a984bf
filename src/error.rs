#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("keep-alive is enabled but no credentials are configured")]
    MissingCredentials,
    #[error("invalid replay payload: {0}")]
    InvalidReplay(String),
    #[error("session store error: {0}")]
    Store(String),
}
