use thiserror::Error;

/// How a broker error should be handled by the receive loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerErrorKind {
    /// Worth retrying; the pump keeps receiving.
    Transient,
    /// Not recoverable; the pump stops with `EventHubException`.
    Fatal,
    /// Another reader took the partition; the pump stops with
    /// `OwnershipLost`.
    ReceiverDisconnected,
}

impl BrokerErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrokerErrorKind::Transient => "transient",
            BrokerErrorKind::Fatal => "fatal",
            BrokerErrorKind::ReceiverDisconnected => "receiver_disconnected",
        }
    }
}

/// An error surfaced by the broker session or a partition reader.
#[derive(Debug, Clone, Error)]
#[error("broker error ({}): {message}", kind.as_str())]
pub struct BrokerError {
    pub kind: BrokerErrorKind,
    pub message: String,
}

impl BrokerError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: BrokerErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: BrokerErrorKind::Fatal,
            message: message.into(),
        }
    }

    pub fn receiver_disconnected(message: impl Into<String>) -> Self {
        Self {
            kind: BrokerErrorKind::ReceiverDisconnected,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == BrokerErrorKind::Transient
    }
}
