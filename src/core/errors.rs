use thiserror::Error;

/// Error taxonomy for wallet operations.
///
/// The signing/sending path propagates these untransformed; only the
/// balance aggregator and the vault's retrieve path deliberately absorb
/// failures (see their module docs).
#[derive(Debug, Error)]
pub enum WalletError {
    /// Mnemonic failed checksum or word-count validation.
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),
    /// Address does not match the network's syntactic rules.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    /// Available inputs/balance cannot cover amount + fee.
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),
    /// Provider unreachable or timed out.
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),
    /// The network rejected a signed transaction.
    #[error("broadcast failed: {0}")]
    BroadcastFailed(String),
    /// A vault blob could not be decrypted.
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    /// Unknown network symbol.
    #[error("unsupported network: {0}")]
    UnsupportedNetwork(String),
    /// Key derivation / signing / cipher failures.
    #[error("crypto error: {0}")]
    Crypto(String),
    /// Persistent store failures.
    #[error("storage error: {0}")]
    Storage(String),
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Everything that should not happen.
    #[error("internal error: {0}")]
    Internal(String),
}

impl WalletError {
    /// Map an HTTP client error onto the taxonomy. A stalled or unreachable
    /// provider must surface as `NetworkUnavailable` so callers never retry
    /// blindly or hang a user-facing action.
    pub fn from_http(context: &str, err: reqwest::Error) -> Self {
        WalletError::NetworkUnavailable(format!("{context}: {err}"))
    }

    /// Errors worth retrying at a higher layer.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WalletError::NetworkUnavailable(_))
    }
}

impl From<sqlx::Error> for WalletError {
    fn from(err: sqlx::Error) -> Self {
        WalletError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for WalletError {
    fn from(err: std::io::Error) -> Self {
        WalletError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(err: serde_json::Error) -> Self {
        WalletError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_context() {
        let err = WalletError::InsufficientFunds("need 1000 sat, have 500 sat".to_string());
        assert_eq!(format!("{}", err), "insufficient funds: need 1000 sat, have 500 sat");
    }

    #[test]
    fn network_unavailable_is_retryable() {
        assert!(WalletError::NetworkUnavailable("rpc down".into()).is_retryable());
        assert!(!WalletError::BroadcastFailed("rejected".into()).is_retryable());
    }

    #[test]
    fn io_error_maps_to_storage() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        match WalletError::from(io) {
            WalletError::Storage(msg) => assert!(msg.contains("denied")),
            other => panic!("expected Storage, got {other:?}"),
        }
    }
}
