use crate::settings::TransportKind;

/// Errors returned while opening a transport, before any delivery happens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The connection could not be established (DNS, TCP, TLS, handshake).
    #[error("connect error ({transport}): {message}")]
    Connect { transport: String, message: String },
    /// The remote answered with a non-success HTTP status.
    #[error("http error ({transport}): status {status}: {message}")]
    Http {
        transport: String,
        status: u16,
        message: String,
    },
    /// The remote answered with a shape this client does not understand.
    #[error("protocol error ({transport}): {message}")]
    Protocol { transport: String, message: String },
}

impl TransportError {
    /// Creates a connect-level error.
    pub fn connect(transport: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connect {
            transport: transport.into(),
            message: message.into(),
        }
    }

    /// Creates an HTTP status error.
    pub fn http(transport: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            transport: transport.into(),
            status,
            message: message.into(),
        }
    }

    /// Creates a protocol-level error.
    pub fn protocol(transport: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol {
            transport: transport.into(),
            message: message.into(),
        }
    }

    /// Returns the human-readable message for this error.
    pub fn message(&self) -> &str {
        match self {
            Self::Connect { message, .. }
            | Self::Http { message, .. }
            | Self::Protocol { message, .. } => message,
        }
    }
}

/// In-band failure delivered by a live transport (socket error, stream read
/// error, undecodable frame).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize)]
#[error("stream failure ({transport}): {message}")]
pub struct TransportFailure {
    pub transport: String,
    pub message: String,
}

impl TransportFailure {
    pub fn new(transport: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            transport: transport.into(),
            message: message.into(),
        }
    }
}

/// Errors raised by the history store.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("history io error ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("history file is corrupt ({path}): {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("history store lock poisoned")]
    Poisoned,
}

/// Invalid or unreadable client configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Top-level error type for the session controller API.
///
/// Transport failures never surface here: they are recorded as `error`
/// events on the session timeline instead.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// `start` was called with an empty or blank question.
    #[error("question must not be empty")]
    EmptyQuestion,
    /// An outbound message needs a live push channel.
    #[error("no live push channel (active transport: {active:?})")]
    NotConnected { active: Option<TransportKind> },
    /// The push channel closed before the outbound message could be queued.
    #[error("push channel closed while sending {what}")]
    ChannelClosed { what: &'static str },
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_message_is_exposed_for_every_variant() {
        assert_eq!(TransportError::connect("ws", "refused").message(), "refused");
        assert_eq!(TransportError::http("langgraph", 502, "bad").message(), "bad");
        assert_eq!(TransportError::protocol("ws", "odd").message(), "odd");
    }

    #[test]
    fn http_error_display_includes_status() {
        let err = TransportError::http("langgraph", 404, "no assistant");
        assert_eq!(
            err.to_string(),
            "http error (langgraph): status 404: no assistant"
        );
    }
}
