use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Channel not connected")]
    Disconnected,

    #[error("Publish failed: {0}")]
    Publish(#[from] rumqttc::ClientError),

    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        assert_eq!(BridgeError::Disconnected.to_string(), "Channel not connected");

        let json_err = serde_json::from_str::<u32>("nope").unwrap_err();
        let err: BridgeError = json_err.into();
        assert!(err.to_string().starts_with("Serialization failed:"));
    }
}
