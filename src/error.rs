use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    FreshBooks,
    Toggl,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::FreshBooks => write!(f, "FreshBooks"),
            Platform::Toggl => write!(f, "Toggl"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} rejected the supplied credentials")]
    Unauthorized(Platform),

    #[error("{0} rate limit exceeded")]
    RateLimited(Platform),

    #[error("{platform} server error: {message}")]
    Server { platform: Platform, message: String },

    #[error("{platform} API error: {message}")]
    Remote { platform: Platform, message: String },

    #[error("Could not decode {platform} response: {message}")]
    Parse { platform: Platform, message: String },

    #[error("Could not encode {platform} request: {message}")]
    Encode { platform: Platform, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid arguments: {0}")]
    Usage(String),

    #[error("Output error: {0}")]
    Output(String),
}

impl Error {
    pub fn remote(platform: Platform, message: impl Into<String>) -> Self {
        Error::Remote {
            platform,
            message: message.into(),
        }
    }

    pub fn parse(platform: Platform, message: impl Into<String>) -> Self {
        Error::Parse {
            platform,
            message: message.into(),
        }
    }

    pub fn encode(platform: Platform, message: impl Into<String>) -> Self {
        Error::Encode {
            platform,
            message: message.into(),
        }
    }

    /// Failures that may succeed when the same request is sent again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::RateLimited(_) | Error::Server { .. } | Error::Network(_)
        )
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Unauthorized(_))
    }

    /// Maps a non-success HTTP status to the matching variant.
    pub fn from_status(platform: Platform, status: reqwest::StatusCode) -> Self {
        if status == 401 || status == 403 {
            return Error::Unauthorized(platform);
        }

        if status == 429 {
            return Error::RateLimited(platform);
        }

        if status.is_server_error() {
            return Error::Server {
                platform,
                message: format!("HTTP {status}"),
            };
        }

        Error::remote(platform, format!("HTTP {status}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn status_mapping() {
        assert!(Error::from_status(Platform::Toggl, StatusCode::UNAUTHORIZED).is_auth());
        assert!(Error::from_status(Platform::Toggl, StatusCode::FORBIDDEN).is_auth());
        assert!(matches!(
            Error::from_status(Platform::Toggl, StatusCode::TOO_MANY_REQUESTS),
            Error::RateLimited(Platform::Toggl)
        ));
        assert!(matches!(
            Error::from_status(Platform::FreshBooks, StatusCode::BAD_GATEWAY),
            Error::Server { .. }
        ));
        assert!(matches!(
            Error::from_status(Platform::FreshBooks, StatusCode::NOT_FOUND),
            Error::Remote { .. }
        ));
    }

    #[test]
    fn retryable_classification() {
        assert!(Error::Network("connection reset".to_string()).is_retryable());
        assert!(Error::RateLimited(Platform::Toggl).is_retryable());
        assert!(!Error::Unauthorized(Platform::Toggl).is_retryable());
        assert!(!Error::parse(Platform::FreshBooks, "bad xml").is_retryable());
        assert!(!Error::Config("missing token".to_string()).is_retryable());
        assert!(!Error::encode(Platform::FreshBooks, "bad utf-8").is_retryable());
        assert!(!Error::Usage("reversed dates".to_string()).is_retryable());
    }

    #[test]
    fn display_names_platform() {
        let err = Error::remote(Platform::FreshBooks, "Project not found");
        assert_eq!(err.to_string(), "FreshBooks API error: Project not found");
    }

    #[test]
    fn encode_and_usage_errors_have_their_own_messages() {
        let err = Error::encode(Platform::Toggl, "key must be a string");
        assert_eq!(err.to_string(), "Could not encode Toggl request: key must be a string");
        let err = Error::Usage("Start date cannot be after end date.".to_string());
        assert_eq!(err.to_string(), "Invalid arguments: Start date cannot be after end date.");
    }
}
