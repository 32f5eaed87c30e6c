use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Network or TLS failure talking to the SDN.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// The SDN answered with a body the operation could not decode.
    #[error("failed to decode SDN response: {0}")]
    Decode(#[from] serde_json::Error),

    /// A filtered lookup matched nothing.
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    /// A filtered lookup matched a record with the wrong natural key.
    #[error("looked up {entity} {expected:?} but found {found:?}")]
    Mismatch {
        entity: &'static str,
        expected: String,
        found: String,
    },

    /// The SDN returned a status the operation did not anticipate.
    #[error("unexpected status {status} from the SDN: {message}")]
    UnexpectedStatus {
        status: reqwest::StatusCode,
        message: String,
    },
}
