//! MQTT adapter error types.

use rvc_domain::error::RvcError;

/// Errors specific to the MQTT adapter.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    /// The client request queue refused a publish or subscribe.
    #[error("MQTT client error")]
    Client(#[source] rumqttc::ClientError),

    /// The event loop lost or could not establish the connection.
    #[error("MQTT connection error")]
    Connection(#[source] rumqttc::ConnectionError),
}

impl MqttError {
    /// Convert into a [`RvcError::Transport`] for propagation across port
    /// boundaries.
    #[must_use]
    pub fn into_domain(self) -> RvcError {
        RvcError::Transport(Box::new(self))
    }
}

impl From<MqttError> for RvcError {
    fn from(err: MqttError) -> Self {
        err.into_domain()
    }
}
