/// The wallet backend could not be reached: the extension is not installed,
/// is disabled, or has not injected its helper into the page yet.
///
/// This is terminal for the call that raised it but recoverable overall,
/// the caller may retry once the extension had a chance to load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, thiserror::Error)]
#[error("Connector not found. Is the wallet extension installed and enabled?")]
pub struct ConnectorNotFoundError;

/// The observation API was used before a [`Client`] was installed.
///
/// [`Client`]: crate::Client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, thiserror::Error)]
#[error("Client not found. Install a `Client` in the `ClientSlot` before using it.")]
pub struct ClientNotFoundError;

/// A failure reported by the wallet backend itself, for example the user
/// denied the connection request or refused to sign.
///
/// There is no dedicated kind per rejection reason: the provider's own
/// message is carried as-is.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, thiserror::Error)]
#[error("{info}")]
pub struct ProviderError {
    pub info: String,
}

/// Error type of every fallible [`Connector`] operation.
///
/// [`Connector`]: crate::Connector
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, thiserror::Error)]
pub enum ConnectorError {
    #[error(transparent)]
    NotFound(#[from] ConnectorNotFoundError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl ConnectorError {
    /// `true` when the backend was unreachable, as opposed to reachable but
    /// refusing the operation.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connector_error_from_parts() {
        let error = ConnectorError::from(ConnectorNotFoundError);
        assert!(error.is_not_found());
        assert_eq!(
            error.to_string(),
            "Connector not found. Is the wallet extension installed and enabled?"
        );

        let error = ConnectorError::from(ProviderError {
            info: "User Cancelled Signing".to_owned(),
        });
        assert!(!error.is_not_found());
        assert_eq!(error.to_string(), "User Cancelled Signing");
    }
}
