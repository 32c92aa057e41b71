//! Gmail REST API client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::auth::AccessTokenSource;
use super::{Label, MailSource, MessageHandle};
use crate::error::MailError;

pub const DEFAULT_GMAIL_ENDPOINT: &str = "https://gmail.googleapis.com/gmail/v1";

/// Largest page the list endpoint returns.
const PAGE_SIZE: &str = "500";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const INBOX: &str = "INBOX";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListMessagesResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageRef {
    id: String,
    #[serde(default)]
    thread_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    raw: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListLabelsResponse {
    #[serde(default)]
    labels: Vec<GmailLabel>,
}

#[derive(Debug, Deserialize)]
struct GmailLabel {
    id: String,
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLabelRequest<'a> {
    name: &'a str,
    label_list_visibility: &'a str,
    message_list_visibility: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModifyRequest<'a> {
    #[serde(skip_serializing_if = "no_ids")]
    add_label_ids: &'a [&'a str],
    #[serde(skip_serializing_if = "no_ids")]
    remove_label_ids: &'a [&'a str],
}

fn no_ids(ids: &&[&str]) -> bool {
    ids.is_empty()
}

#[derive(Debug, Deserialize)]
struct Ignored {}

/// Gmail client for the authenticated user (`users/me`).
pub struct GmailClient {
    http: reqwest::Client,
    base_url: String,
    auth: Arc<dyn AccessTokenSource>,
}

impl GmailClient {
    pub fn new(base_url: &str, auth: Arc<dyn AccessTokenSource>) -> Result<Self, MailError> {
        Self::with_timeout(base_url, auth, REQUEST_TIMEOUT)
    }

    /// Like [`GmailClient::new`] with a custom per-request timeout.
    pub fn with_timeout(
        base_url: &str,
        auth: Arc<dyn AccessTokenSource>,
        timeout: Duration,
    ) -> Result<Self, MailError> {
        let trimmed = base_url.trim();
        if trimmed.is_empty() {
            return Err(MailError::InvalidResponse(
                "Gmail endpoint must not be empty".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MailError::Http(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: trimmed.trim_end_matches('/').to_string(),
            auth,
        })
    }

    fn build_url(&self, segments: &[&str]) -> Result<reqwest::Url, MailError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| MailError::InvalidResponse(format!("bad Gmail endpoint: {e}")))?;
        {
            let mut path = url.path_segments_mut().map_err(|()| {
                MailError::InvalidResponse("Gmail endpoint must be an absolute URL".to_string())
            })?;
            path.push("users").push("me");
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<T, MailError> {
        let url = self.build_url(segments)?;
        let token = self.auth.access_token().await?;
        let response = self
            .http
            .get(url)
            .query(query)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        handle_response(response).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T, MailError> {
        let url = self.build_url(segments)?;
        let token = self.auth.access_token().await?;
        let response = self
            .http
            .post(url)
            .json(body)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        handle_response(response).await
    }

    /// Walk every page of `messages.list` with the given filter.
    async fn list_all(&self, filter: (&str, &str)) -> Result<Vec<MessageHandle>, MailError> {
        let mut handles = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![
                filter,
                ("maxResults", PAGE_SIZE),
                ("includeSpamTrash", "false"),
            ];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }
            let page: ListMessagesResponse = self.get_json(&["messages"], &query).await?;
            debug!(count = page.messages.len(), "Fetched message page");
            handles.extend(page.messages.into_iter().map(|m| MessageHandle {
                id: m.id,
                thread_id: m.thread_id,
            }));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(handles)
    }

    async fn modify(
        &self,
        message_id: &str,
        add: &[&str],
        remove: &[&str],
    ) -> Result<(), MailError> {
        let body = ModifyRequest {
            add_label_ids: add,
            remove_label_ids: remove,
        };
        let _: Ignored = self
            .post_json(&["messages", message_id, "modify"], &body)
            .await?;
        Ok(())
    }
}

async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, MailError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| MailError::InvalidResponse(e.to_string()));
    }
    let body = response.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(MailError::AuthFailed(body));
    }
    Err(MailError::Api {
        status: status.as_u16(),
        body,
    })
}

/// Decode Gmail's `raw` field (URL-safe base64, padding optional).
fn decode_raw(message_id: &str, raw: &str) -> Result<Vec<u8>, MailError> {
    URL_SAFE_NO_PAD
        .decode(raw.trim().trim_end_matches('='))
        .map_err(|e| MailError::Decode {
            id: message_id.to_string(),
            reason: e.to_string(),
        })
}

#[async_trait]
impl MailSource for GmailClient {
    async fn list_by_label(&self, label_name: &str) -> Result<Vec<MessageHandle>, MailError> {
        let label_id = self.get_or_create_label(label_name).await?;
        self.list_all(("labelIds", label_id.as_str())).await
    }

    async fn list_by_query(&self, query: &str) -> Result<Vec<MessageHandle>, MailError> {
        self.list_all(("q", query)).await
    }

    async fn fetch_raw(&self, message_id: &str) -> Result<Vec<u8>, MailError> {
        let message: RawMessage = self
            .get_json(&["messages", message_id], &[("format", "raw")])
            .await?;
        let raw = message.raw.ok_or_else(|| MailError::MissingContent {
            id: message_id.to_string(),
        })?;
        decode_raw(message_id, &raw)
    }

    async fn list_labels(&self) -> Result<Vec<Label>, MailError> {
        let response: ListLabelsResponse = self.get_json(&["labels"], &[]).await?;
        Ok(response
            .labels
            .into_iter()
            .map(|l| Label {
                id: l.id,
                name: l.name,
            })
            .collect())
    }

    async fn get_or_create_label(&self, name: &str) -> Result<String, MailError> {
        if let Some(label) = self.list_labels().await?.into_iter().find(|l| l.name == name) {
            return Ok(label.id);
        }
        let body = CreateLabelRequest {
            name,
            label_list_visibility: "labelShow",
            message_list_visibility: "show",
        };
        let created: GmailLabel = self.post_json(&["labels"], &body).await?;
        info!(label = %name, id = %created.id, "Created Gmail label");
        Ok(created.id)
    }

    async fn apply_label(&self, message_id: &str, label_id: &str) -> Result<(), MailError> {
        self.modify(message_id, &[label_id], &[]).await
    }

    async fn remove_label(&self, message_id: &str, label_id: &str) -> Result<(), MailError> {
        self.modify(message_id, &[], &[label_id]).await
    }

    async fn archive(&self, message_id: &str) -> Result<(), MailError> {
        self.modify(message_id, &[], &[INBOX]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::StaticToken;
    use wiremock::matchers::{body_json, header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GmailClient {
        GmailClient::new(
            &format!("{}/gmail/v1", server.uri()),
            Arc::new(StaticToken::new("tok")),
        )
        .unwrap()
    }

    #[test]
    fn empty_endpoint_is_rejected() {
        assert!(GmailClient::new("  ", Arc::new(StaticToken::new("t"))).is_err());
    }

    #[test]
    fn decode_raw_accepts_padding() {
        let encoded = URL_SAFE_NO_PAD.encode(b"Subject: hi\r\n\r\nbody?>");
        assert_eq!(decode_raw("m", &encoded).unwrap(), b"Subject: hi\r\n\r\nbody?>");
        assert_eq!(decode_raw("m", "aGk=").unwrap(), b"hi");
        assert!(matches!(
            decode_raw("m", "***"),
            Err(MailError::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn list_by_query_follows_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages"))
            .and(query_param("q", "from:news@example.com is:unread"))
            .and(query_param("maxResults", "500"))
            .and(query_param_is_missing("pageToken"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "messages": [{"id": "m1", "threadId": "t1"}, {"id": "m2", "threadId": "t2"}],
                "nextPageToken": "p2"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages"))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "messages": [{"id": "m3", "threadId": "t3"}]
            })))
            .mount(&server)
            .await;

        let handles = client(&server)
            .list_by_query("from:news@example.com is:unread")
            .await
            .unwrap();
        let ids: Vec<&str> = handles.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
        assert_eq!(handles[0].thread_id.as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn empty_listing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "resultSizeEstimate": 0
            })))
            .mount(&server)
            .await;

        let handles = client(&server).list_by_query("is:unread").await.unwrap();
        assert!(handles.is_empty());
    }

    #[tokio::test]
    async fn list_by_label_resolves_label_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/labels"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "labels": [{"id": "Label_7", "name": "Newsletters"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages"))
            .and(query_param("labelIds", "Label_7"))
            .and(query_param("includeSpamTrash", "false"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "messages": [{"id": "m1"}]
            })))
            .mount(&server)
            .await;

        let handles = client(&server).list_by_label("Newsletters").await.unwrap();
        assert_eq!(handles, vec![MessageHandle::new("m1")]);
    }

    #[tokio::test]
    async fn creates_missing_label() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/labels"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "labels": [{"id": "INBOX", "name": "INBOX"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/gmail/v1/users/me/labels"))
            .and(body_json(serde_json::json!({
                "name": "Digested",
                "labelListVisibility": "labelShow",
                "messageListVisibility": "show"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "Label_9", "name": "Digested"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let id = client(&server).get_or_create_label("Digested").await.unwrap();
        assert_eq!(id, "Label_9");
    }

    #[tokio::test]
    async fn fetch_raw_decodes_body() {
        let server = MockServer::start().await;
        let raw = URL_SAFE_NO_PAD.encode(b"Subject: Hi\r\n\r\nHello");
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages/m1"))
            .and(query_param("format", "raw"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": "m1", "raw": raw})),
            )
            .mount(&server)
            .await;

        let bytes = client(&server).fetch_raw("m1").await.unwrap();
        assert_eq!(bytes, b"Subject: Hi\r\n\r\nHello");
    }

    #[tokio::test]
    async fn fetch_raw_without_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages/m1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "m1"})))
            .mount(&server)
            .await;

        let err = client(&server).fetch_raw("m1").await.unwrap_err();
        assert!(matches!(err, MailError::MissingContent { ref id } if id == "m1"));
    }

    #[tokio::test]
    async fn archive_removes_inbox() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gmail/v1/users/me/messages/m1/modify"))
            .and(body_json(serde_json::json!({"removeLabelIds": ["INBOX"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "m1"})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).archive("m1").await.unwrap();
    }

    #[tokio::test]
    async fn apply_label_adds_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gmail/v1/users/me/messages/m1/modify"))
            .and(body_json(serde_json::json!({"addLabelIds": ["Label_9"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "m1"})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).apply_label("m1", "Label_9").await.unwrap();
    }

    #[tokio::test]
    async fn remove_label_drops_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gmail/v1/users/me/messages/m1/modify"))
            .and(body_json(serde_json::json!({"removeLabelIds": ["Label_9"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "m1"})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).remove_label("m1", "Label_9").await.unwrap();
    }

    #[tokio::test]
    async fn stalled_request_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/labels"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"labels": []}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let gmail = GmailClient::with_timeout(
            &format!("{}/gmail/v1", server.uri()),
            Arc::new(StaticToken::new("tok")),
            Duration::from_millis(200),
        )
        .unwrap();
        let err = gmail.list_labels().await.unwrap_err();
        assert!(matches!(err, MailError::Http(_)));
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/labels"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid credentials"))
            .mount(&server)
            .await;

        let err = client(&server).list_labels().await.unwrap_err();
        assert!(matches!(err, MailError::AuthFailed(_)));
    }

    #[tokio::test]
    async fn api_error_keeps_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages"))
            .respond_with(ResponseTemplate::new(500).set_body_string("backend error"))
            .mount(&server)
            .await;

        let err = client(&server).list_by_query("x").await.unwrap_err();
        assert!(matches!(err, MailError::Api { status: 500, .. }));
    }
}
