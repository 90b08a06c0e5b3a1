use crate::errors::OAuthError;
use crate::models::OAuthClient;
use crate::store::{ClientLookup, ClientQuery};
use log::debug;
use subtle::ConstantTimeEq;

const BAD_CREDENTIALS: &str = "client authentication failed";

/// Authenticates a client by id and secret. Unknown ids, wrong secrets and
/// disabled clients all fail with `InvalidClient`.
pub async fn authenticate_client(
    clients: &dyn ClientLookup,
    client_id: &str,
    client_secret: &str,
) -> Result<OAuthClient, OAuthError> {
    if client_id.is_empty() {
        return Err(OAuthError::InvalidClient(
            "client credentials are required".to_string(),
        ));
    }

    let Some(client) = clients.find_client(&ClientQuery::by_id(client_id)).await? else {
        debug!("Unknown client {}", client_id);
        return Err(OAuthError::InvalidClient(BAD_CREDENTIALS.to_string()));
    };

    if client
        .secret
        .as_bytes()
        .ct_eq(client_secret.as_bytes())
        .unwrap_u8()
        == 0
    {
        debug!("Bad secret for client {}", client_id);
        return Err(OAuthError::InvalidClient(BAD_CREDENTIALS.to_string()));
    }

    if !client.is_active() {
        return Err(OAuthError::InvalidClient("client is disabled".to_string()));
    }

    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClientStatus;
    use crate::store::StoreError;
    use crate::store::clients::tests::sample_client;

    struct StaticClients(Vec<OAuthClient>);

    #[async_trait::async_trait]
    impl ClientLookup for StaticClients {
        async fn find_client(
            &self,
            query: &ClientQuery,
        ) -> Result<Option<OAuthClient>, StoreError> {
            Ok(self
                .0
                .iter()
                .find(|c| Some(&c.id) == query.id.as_ref())
                .cloned())
        }
    }

    struct BrokenClients;

    #[async_trait::async_trait]
    impl ClientLookup for BrokenClients {
        async fn find_client(&self, _: &ClientQuery) -> Result<Option<OAuthClient>, StoreError> {
            Err(StoreError::EmptyQuery("oauth_clients"))
        }
    }

    #[tokio::test]
    async fn test_valid_credentials() {
        let clients = StaticClients(vec![sample_client("c1")]);
        let client = authenticate_client(&clients, "c1", "c1-secret").await.unwrap();
        assert_eq!(client.id, "c1");
    }

    #[tokio::test]
    async fn test_wrong_secret_and_unknown_client_look_the_same() {
        let clients = StaticClients(vec![sample_client("c1")]);
        let wrong_secret = authenticate_client(&clients, "c1", "nope").await.unwrap_err();
        let unknown = authenticate_client(&clients, "c9", "c1-secret").await.unwrap_err();
        assert_eq!(wrong_secret, unknown);
        assert!(matches!(wrong_secret, OAuthError::InvalidClient(_)));
    }

    #[tokio::test]
    async fn test_disabled_client_is_rejected() {
        let mut client = sample_client("c1");
        client.status = ClientStatus::Disabled;
        let clients = StaticClients(vec![client]);
        assert!(matches!(
            authenticate_client(&clients, "c1", "c1-secret").await,
            Err(OAuthError::InvalidClient(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_client_id() {
        let clients = StaticClients(vec![]);
        assert!(matches!(
            authenticate_client(&clients, "", "").await,
            Err(OAuthError::InvalidClient(_))
        ));
    }

    #[tokio::test]
    async fn test_lookup_failure_is_system_busy() {
        assert!(matches!(
            authenticate_client(&BrokenClients, "c1", "c1-secret").await,
            Err(OAuthError::SystemBusy(_))
        ));
    }
}
