use thiserror::Error;

/// Failures while assembling the SDK runtime: configuration, bridges,
/// logging bootstrap.
#[derive(Error, Debug)]
pub enum Error {
    /// A tunable is out of range or a filter does not parse.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A required bridge was neither supplied nor available as a default.
    #[error("Missing {capability} bridge: {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failing_piece() {
        assert_eq!(
            Error::Config("retry multiplier must be at least 1".to_string()).to_string(),
            "Invalid configuration: retry multiplier must be at least 1"
        );
        assert_eq!(
            Error::CapabilityMissing {
                capability: "HttpClient".to_string(),
                message: "no default transport".to_string(),
            }
            .to_string(),
            "Missing HttpClient bridge: no default transport"
        );
        assert_eq!(
            Error::Logging("global subscriber already set".to_string()).to_string(),
            "Logging setup failed: global subscriber already set"
        );
    }
}
