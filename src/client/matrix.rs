use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::{ChatClient, SendError};

const SEND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct NoticeContent<'a> {
    msgtype: &'static str,
    body: &'a str,
}

/// Minimal Matrix client-server API client: enough to put `m.notice`
/// events into rooms.
///
/// The HTTP client, homeserver, and token are injected at construction so
/// tests can point the bot at a mock server and run in parallel.
pub struct MatrixClient {
    http: reqwest::Client,
    homeserver: String,
    access_token: SecretString,
    txn_counter: AtomicU64,
}

impl MatrixClient {
    pub fn new(http: reqwest::Client, homeserver: &str, access_token: SecretString) -> Self {
        Self {
            http,
            homeserver: homeserver.trim_end_matches('/').to_string(),
            access_token,
            txn_counter: AtomicU64::new(1),
        }
    }

    // Transaction ids must be unique per access token for the homeserver's
    // idempotency handling; a process-local counter is enough for a
    // single-instance bot.
    fn next_txn_id(&self) -> u64 {
        self.txn_counter.fetch_add(1, Ordering::Relaxed)
    }
}

#[async_trait]
impl ChatClient for MatrixClient {
    async fn send_notice(&self, room_id: &str, body: &str) -> Result<(), SendError> {
        let url = format!(
            "{}/_matrix/client/r0/rooms/{}/send/m.room.message/{}",
            self.homeserver,
            urlencoding::encode(room_id),
            self.next_txn_id(),
        );

        let response = tokio::time::timeout(
            SEND_TIMEOUT,
            self.http
                .put(&url)
                .bearer_auth(self.access_token.expose_secret())
                .json(&NoticeContent {
                    msgtype: "m.notice",
                    body,
                })
                .send(),
        )
        .await
        .map_err(|_| SendError::Timeout)??;

        if !response.status().is_success() {
            return Err(SendError::Status(response.status().as_u16()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> MatrixClient {
        MatrixClient::new(
            reqwest::Client::new(),
            &server.uri(),
            SecretString::from("its_a_secret".to_string()),
        )
    }

    #[tokio::test]
    async fn test_send_notice_hits_room_send_endpoint() {
        let mock_server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path_regex(
                r"^/_matrix/client/r0/rooms/%21linksroom%3Ahyrule/send/m\.room\.message/\d+$",
            ))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"event_id":"$123456:hyrule"}"#),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        client(&mock_server)
            .send_notice("!linksroom:hyrule", "hello")
            .await
            .unwrap();

        let requests = mock_server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["msgtype"], "m.notice");
        assert_eq!(body["body"], "hello");
    }

    #[tokio::test]
    async fn test_non_2xx_is_status_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&mock_server)
            .await;

        let err = client(&mock_server)
            .send_notice("!room:example.org", "hello")
            .await
            .unwrap_err();
        match err {
            SendError::Status(403) => {}
            e => panic!("Expected Status(403), got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_txn_ids_are_unique_per_send() {
        let mock_server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&mock_server)
            .await;

        let client = client(&mock_server);
        client.send_notice("!room:example.org", "one").await.unwrap();
        client.send_notice("!room:example.org", "two").await.unwrap();

        let requests = mock_server.received_requests().await.unwrap();
        let paths: Vec<&str> = requests.iter().map(|r| r.url.path()).collect();
        assert_eq!(paths.len(), 2);
        assert_ne!(paths[0], paths[1]);
    }
}
