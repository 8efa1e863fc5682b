//! Message trait for consumed payloads.

use serde::{de::DeserializeOwned, Serialize};

/// A payload that travels through a broker.
///
/// Implementors are decoded from the delivery body (JSON) before they reach a
/// [`Processor`](crate::Processor), and encoded the same way by publishers.
pub trait Message: Serialize + DeserializeOwned + Send + Sync + Clone + 'static {
    /// Stable identifier used as the broker-level message id and in logs.
    ///
    /// Must not change across redeliveries.
    fn message_id(&self) -> String;

    /// Type name for logging and metrics labels.
    fn message_type(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Clone, Serialize, Deserialize)]
    struct Ping {
        id: String,
    }

    impl Message for Ping {
        fn message_id(&self) -> String {
            self.id.clone()
        }

        fn message_type(&self) -> &'static str {
            "ping"
        }
    }

    #[test]
    fn test_message_id_is_stable() {
        let ping = Ping {
            id: "m-1".to_string(),
        };
        let decoded: Ping = serde_json::from_str(&serde_json::to_string(&ping).unwrap()).unwrap();

        assert_eq!(decoded.message_id(), "m-1");
        assert_eq!(decoded.message_type(), "ping");
    }
}
