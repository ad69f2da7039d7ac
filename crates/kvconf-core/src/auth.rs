use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AuthError {
    #[error("The API token must not be empty")]
    EmptyToken,
    #[error("No API token was provided")]
    MissingToken,
    #[error("The API token is not valid")]
    InvalidToken,
}

/// Guards write operations with a single shared secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticator {
    api_token: String,
}

impl Authenticator {
    pub fn new(api_token: &str) -> Result<Self, AuthError> {
        if api_token.is_empty() {
            return Err(AuthError::EmptyToken);
        }
        Ok(Self {
            api_token: api_token.to_string(),
        })
    }

    pub fn verify_token(&self, token: Option<&str>) -> Result<(), AuthError> {
        match token {
            None => Err(AuthError::MissingToken),
            Some(token) if token == self.api_token => Ok(()),
            Some(_) => Err(AuthError::InvalidToken),
        }
    }
}

/// Pick the presented token: the custom header wins over a bearer `Authorization` header.
pub fn presented_token<'a>(api_token_header: Option<&'a str>, bearer: Option<&'a str>) -> Option<&'a str> {
    api_token_header.filter(|t| !t.is_empty()).or(bearer)
}
