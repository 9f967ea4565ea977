//! Provider data structure passed to resources and data sources

use crate::api::Client;
use std::any::Any;
use std::sync::Arc;

#[derive(Clone)]
pub struct AwxProviderData {
    pub client: Arc<Client>,
}

impl AwxProviderData {
    pub fn new(client: Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    /// Recovers the provider data handed out by configure
    pub fn from_any(data: Option<Arc<dyn Any + Send + Sync>>) -> Option<Self> {
        data.and_then(|data| data.downcast_ref::<AwxProviderData>().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Auth;

    #[test]
    fn provider_data_round_trips_through_any() {
        let client = Client::new(
            "https://awx.example.com",
            Auth::Token("t".to_string()),
            false,
        )
        .unwrap();
        let shared: Arc<dyn Any + Send + Sync> = Arc::new(AwxProviderData::new(client));

        let data = AwxProviderData::from_any(Some(shared)).unwrap();
        assert_eq!(data.client.base_url(), "https://awx.example.com");
        assert!(AwxProviderData::from_any(Some(Arc::new(5_u8))).is_none());
        assert!(AwxProviderData::from_any(None).is_none());
    }
}
