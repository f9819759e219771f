/// Typed error hierarchy for the push channel.
/// Transport errors drive reconnection and are surfaced to callers only on
/// the initial handshake; decode errors are logged and dropped at the frame
/// boundary and never reach callers.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ChannelError {
    // Transport
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("connection refused: {0}")]
    Refused(String),
    #[error("channel closed")]
    Closed,

    // Local
    #[error("invalid endpoint: {0}")]
    Endpoint(String),
    #[error("malformed frame: {0}")]
    Decode(String),
}

impl ChannelError {
    /// Whether the retry loop may recover from this error.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Handshake(_) | Self::Refused(_))
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Handshake(_) => "handshake",
            Self::Refused(_) => "refused",
            Self::Closed => "closed",
            Self::Endpoint(_) => "endpoint",
            Self::Decode(_) => "decode",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_classification() {
        assert!(ChannelError::Handshake("tcp reset".into()).is_transport());
        assert!(ChannelError::Refused("no listener".into()).is_transport());
        assert!(!ChannelError::Closed.is_transport());
        assert!(!ChannelError::Endpoint("not a url".into()).is_transport());
        assert!(!ChannelError::Decode("bad json".into()).is_transport());
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(ChannelError::Closed.error_kind(), "closed");
        assert_eq!(ChannelError::Handshake(String::new()).error_kind(), "handshake");
        assert_eq!(ChannelError::Decode(String::new()).error_kind(), "decode");
    }

    #[test]
    fn display_includes_detail() {
        let err = ChannelError::Handshake("401 unauthorized".into());
        assert_eq!(err.to_string(), "handshake failed: 401 unauthorized");
    }
}
