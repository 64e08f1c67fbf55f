/// Crate-wide error type.
///
/// Variants follow the failure taxonomy of the wallet backend integration:
/// connectivity absence is detected before a request leaves the device,
/// server rejections carry the backend's `errorCode` when one was present,
/// and durable-storage failures are reported separately so stores can treat
/// them as non-fatal.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The device reports no usable network; nothing was sent.
    #[error("no network connectivity")]
    Offline,
    /// Transport-level failure from the HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// Non-2xx response from the wallet backend.
    #[error("API error during {operation}: status {status}, code {code:?}")]
    Api {
        operation: &'static str,
        status: u16,
        /// Server-defined error code (e.g. `AUTH_02`, `NOTIFICATION_003`).
        code: Option<String>,
        /// Server-supplied message, empty when the body had none.
        message: String,
    },
    /// Durable key-value storage read or write failed.
    #[error("storage error: {0}")]
    Storage(String),
    /// Access token could not be decoded.
    #[error("token error: {0}")]
    Token(String),
    /// Expiry-notification interval marker outside the allowed set.
    #[error("invalid expiry interval marker: {0}")]
    InvalidInterval(u32),
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Message suitable for a user-facing alert dialog.
    ///
    /// Server-supplied messages win; otherwise known server error codes map
    /// to a local string, with a generic fallback for everything else.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Offline => "Please check your network connection.".into(),
            Self::Api { code, message, .. } => {
                if !message.is_empty() {
                    return message.clone();
                }
                code.as_deref()
                    .and_then(message_for_code)
                    .unwrap_or("Something went wrong. Please try again.")
                    .into()
            }
            _ => "Something went wrong. Please try again.".into(),
        }
    }
}

/// Locally mapped display messages for known backend error codes.
#[must_use]
pub fn message_for_code(code: &str) -> Option<&'static str> {
    Some(match code {
        "AUTH_01" => "Invalid token.",
        "AUTH_02" => "Your session has expired.",
        "AUTH_03" => "User not found.",
        "AUTH_04" => "Kakao sign-in failed.",
        "AUTH_05" => "Token mismatch.",
        "AUTH_06" => "Invalid refresh token.",
        "AUTH_08" => "You do not have access to this account.",
        "NOTIFICATION_001" => "Unknown notification type.",
        "NOTIFICATION_002" => "Notification setting not found.",
        "NOTIFICATION_003" => "Enable this notification before changing its schedule.",
        "X002" => "Invalid request parameters.",
        "X003" => "A server error occurred.",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_code_maps_to_local_message() {
        assert_eq!(
            message_for_code("NOTIFICATION_003"),
            Some("Enable this notification before changing its schedule.")
        );
        assert!(message_for_code("NOPE_999").is_none());
    }

    #[test]
    fn server_message_wins_over_code_mapping() {
        let err = Error::Api {
            operation: "toggle",
            status: 409,
            code: Some("NOTIFICATION_003".into()),
            message: "Custom server text".into(),
        };
        assert_eq!(err.user_message(), "Custom server text");
    }

    #[test]
    fn empty_server_message_falls_back_to_code() {
        let err = Error::Api {
            operation: "toggle",
            status: 401,
            code: Some("AUTH_02".into()),
            message: String::new(),
        };
        assert_eq!(err.user_message(), "Your session has expired.");
    }

    #[test]
    fn unknown_code_falls_back_to_generic() {
        let err = Error::Api {
            operation: "toggle",
            status: 500,
            code: None,
            message: String::new(),
        };
        assert_eq!(
            err.user_message(),
            "Something went wrong. Please try again."
        );
    }
}
