//! Firestore REST client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::wire::{encode_fields, structured_query, WireDocument};
use super::{FirebaseConfig, TokenSource};
use crate::store::{
    auto_id, DocumentStore, Fields, Query, Snapshot, StoreError, Subscription, WriteResult,
};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitResponse {
    #[serde(default)]
    write_results: Vec<WriteResultBody>,
    commit_time: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WriteResultBody {
    #[serde(default)]
    transform_results: Vec<TransformResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransformResult {
    timestamp_value: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct RunQueryItem {
    document: Option<WireDocument>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    status: String,
    message: String,
}

fn map_error(http_status: reqwest::StatusCode, body: Option<ErrorBody>) -> StoreError {
    let Some(body) = body else {
        return match http_status {
            reqwest::StatusCode::UNAUTHORIZED => StoreError::Unauthenticated,
            reqwest::StatusCode::FORBIDDEN => StoreError::PermissionDenied,
            status => StoreError::Backend {
                status: status.as_u16().to_string(),
                message: status.to_string(),
            },
        };
    };

    match body.status.as_str() {
        "PERMISSION_DENIED" => StoreError::PermissionDenied,
        "UNAUTHENTICATED" => StoreError::Unauthenticated,
        "INVALID_ARGUMENT" => StoreError::InvalidArgument(body.message),
        _ => StoreError::Backend {
            status: body.status,
            message: body.message,
        },
    }
}

/// Document store backed by Cloud Firestore.
///
/// Requests carry the signed-in user's ID token so that security rules see
/// the caller. Live queries re-run the query every poll interval and emit a
/// snapshot only when the result set changed.
#[derive(Clone)]
pub struct Firestore {
    http: reqwest::Client,
    config: Arc<FirebaseConfig>,
    tokens: Arc<dyn TokenSource>,
    poll_interval: Duration,
}

impl Firestore {
    pub fn new(config: FirebaseConfig, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            http: reqwest::Client::new(),
            config: Arc::new(config),
            tokens,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets how often live queries re-run; at least one millisecond.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
        self
    }

    fn documents_url(&self) -> String {
        format!(
            "{}/{}",
            self.config.endpoints.firestore,
            self.config.documents_path()
        )
    }

    async fn send<T>(&self, request: reqwest::RequestBuilder) -> Result<T, StoreError>
    where
        T: serde::de::DeserializeOwned,
    {
        let request = match self.tokens.id_token().await? {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.json::<ErrorEnvelope>().await.ok().map(|e| e.error);
            let err = map_error(status, body);
            debug!(status = %status, error = %err, "Firestore request failed");
            return Err(err);
        }

        response
            .json::<T>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    /// Runs `query` once.
    pub async fn run_query(&self, query: &Query) -> Result<Snapshot, StoreError> {
        let body = json!({ "structuredQuery": structured_query(query)? });
        let url = format!("{}:runQuery", self.documents_url());
        let items: Vec<RunQueryItem> = self.send(self.http.post(&url).json(&body)).await?;

        let documents = items
            .into_iter()
            .filter_map(|item| item.document)
            .map(WireDocument::into_document)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Snapshot { documents })
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!(
            "{}/{}/{}",
            self.documents_url(),
            urlencoding::encode(collection),
            urlencoding::encode(id)
        )
    }
}

#[async_trait]
impl DocumentStore for Firestore {
    async fn add(&self, collection: &str, fields: Fields) -> Result<WriteResult, StoreError> {
        let id = auto_id();
        let (values, server_timestamps) = encode_fields(&fields);

        let transforms: Vec<_> = server_timestamps
            .iter()
            .map(|path| json!({ "fieldPath": path, "setToServerValue": "REQUEST_TIME" }))
            .collect();

        let mut write = json!({
            "update": {
                "name": format!("{}/{}/{}", self.config.documents_path(), collection, id),
                "fields": values,
            },
            "currentDocument": { "exists": false },
        });
        if !transforms.is_empty() {
            write["updateTransforms"] = json!(transforms);
        }

        let url = format!("{}:commit", self.documents_url());
        let body = json!({ "writes": [write] });
        let response: CommitResponse = self.send(self.http.post(&url).json(&body)).await?;

        let server_time = response
            .write_results
            .first()
            .and_then(|r| r.transform_results.first())
            .and_then(|t| t.timestamp_value)
            .or(response.commit_time)
            .ok_or_else(|| StoreError::Decode("commit response without a time".into()))?;

        debug!(collection, id = %id, "Committed document");
        Ok(WriteResult { id, server_time })
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let url = self.document_url(collection, id);
        let _: serde_json::Value = self.send(self.http.delete(&url)).await?;
        debug!(collection, id, "Deleted document");
        Ok(())
    }

    async fn subscribe(&self, query: Query) -> Result<Subscription, StoreError> {
        // Reject queries that cannot be encoded before starting to poll.
        structured_query(&query)?;

        let store = self.clone();
        Ok(Subscription::spawn(move |tx| async move {
            let mut ticker = tokio::time::interval(store.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last: Option<Result<Snapshot, StoreError>> = None;

            loop {
                ticker.tick().await;
                let result = store.run_query(&query).await;
                if last.as_ref() == Some(&result) {
                    continue;
                }
                if let Err(e) = &result {
                    warn!(collection = %query.collection, error = %e, "Live query failed");
                }
                last = Some(result.clone());
                if tx.send(result).await.is_err() {
                    return;
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firebase::mock::{self, Handler, Recorded};
    use crate::firebase::Endpoints;
    use crate::store::Value;
    use axum::http::{Method, StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FixedToken(Option<&'static str>);

    #[async_trait]
    impl TokenSource for FixedToken {
        async fn id_token(&self) -> Result<Option<String>, StoreError> {
            Ok(self.0.map(str::to_string))
        }
    }

    async fn client(handler: Handler) -> (Firestore, Arc<Mutex<Vec<Recorded>>>) {
        let (base, requests) = mock::serve(handler).await;
        let config = FirebaseConfig::new("k", "demo").with_endpoints(Endpoints::at(&base));
        let store = Firestore::new(config, Arc::new(FixedToken(Some("id-token"))))
            .with_poll_interval(Duration::from_millis(10));
        (store, requests)
    }

    fn document(id: &str, date: &str) -> serde_json::Value {
        json!({
            "document": {
                "name": format!("projects/demo/databases/(default)/documents/reservations/{}", id),
                "fields": {
                    "userId": { "stringValue": "u1" },
                    "date": { "stringValue": date }
                }
            },
            "readTime": "2024-03-01T00:00:00Z"
        })
    }

    #[tokio::test]
    async fn test_add_commits_with_server_timestamp() {
        let handler: Handler = Arc::new(|_req: &Recorded| {
            (
                StatusCode::OK,
                json!({
                    "writeResults": [{
                        "updateTime": "2024-03-01T09:00:00.5Z",
                        "transformResults": [{ "timestampValue": "2024-03-01T09:00:00.5Z" }]
                    }],
                    "commitTime": "2024-03-01T09:00:00.5Z"
                }),
            )
        });
        let (store, requests) = client(handler).await;
        let mut fields = Fields::new();
        fields.insert("userId".into(), "u1".into());
        fields.insert("createdAt".into(), Value::ServerTimestamp);

        let write = store.add("reservations", fields).await.unwrap();

        assert_eq!(write.id.len(), 20);
        assert_eq!(write.server_time.to_rfc3339(), "2024-03-01T09:00:00.500+00:00");

        let requests = requests.lock().unwrap();
        let req = &requests[0];
        assert_eq!(req.method, Method::POST);
        assert_eq!(req.path, "/v1/projects/demo/databases/(default)/documents:commit");
        assert_eq!(req.authorization.as_deref(), Some("Bearer id-token"));

        let w = &req.body["writes"][0];
        assert_eq!(
            w["update"]["name"],
            format!("projects/demo/databases/(default)/documents/reservations/{}", write.id)
        );
        assert_eq!(w["update"]["fields"]["userId"]["stringValue"], "u1");
        assert!(w["update"]["fields"].get("createdAt").is_none());
        assert_eq!(w["currentDocument"]["exists"], false);
        assert_eq!(w["updateTransforms"][0]["fieldPath"], "createdAt");
        assert_eq!(w["updateTransforms"][0]["setToServerValue"], "REQUEST_TIME");
    }

    #[tokio::test]
    async fn test_delete_path() {
        let handler: Handler = Arc::new(|_req: &Recorded| (StatusCode::OK, json!({})));
        let (store, requests) = client(handler).await;

        store.delete("reservations", "abc123").await.unwrap();

        let requests = requests.lock().unwrap();
        assert_eq!(requests[0].method, Method::DELETE);
        assert_eq!(
            requests[0].path,
            "/v1/projects/demo/databases/(default)/documents/reservations/abc123"
        );
    }

    #[tokio::test]
    async fn test_run_query_skips_read_time_only_items() {
        let handler: Handler = Arc::new(|_req: &Recorded| {
            (
                StatusCode::OK,
                json!([document("a", "2024-01-01"), document("b", "2024-03-15")]),
            )
        });
        let (store, requests) = client(handler).await;

        let snapshot = store
            .run_query(&Query::new("reservations").where_eq("userId", "u1"))
            .await
            .unwrap();
        assert_eq!(snapshot.documents.len(), 2);
        assert_eq!(snapshot.documents[1].id, "b");
        assert_eq!(
            requests.lock().unwrap()[0].body["structuredQuery"]["from"][0]["collectionId"],
            "reservations"
        );

        let empty: Handler =
            Arc::new(|_req: &Recorded| (StatusCode::OK, json!([{ "readTime": "2024-03-01T00:00:00Z" }])));
        let (store, _) = client(empty).await;
        let snapshot = store.run_query(&Query::new("reservations")).await.unwrap();
        assert!(snapshot.documents.is_empty());
    }

    #[tokio::test]
    async fn test_permission_denied_mapped() {
        let handler: Handler = Arc::new(|_req: &Recorded| {
            (
                StatusCode::FORBIDDEN,
                json!({ "error": {
                    "code": 403,
                    "message": "Missing or insufficient permissions.",
                    "status": "PERMISSION_DENIED"
                }}),
            )
        });
        let (store, _) = client(handler).await;

        let err = store.delete("reservations", "x").await.unwrap_err();

        assert_eq!(err, StoreError::PermissionDenied);
    }

    #[tokio::test]
    async fn test_poll_emits_only_changes() {
        let version = Arc::new(AtomicUsize::new(0));
        let v = version.clone();
        let handler: Handler = Arc::new(move |_req: &Recorded| {
            let body = match v.load(Ordering::SeqCst) {
                0 => json!([document("a", "2024-01-01")]),
                _ => json!([document("a", "2024-01-01"), document("b", "2024-03-15")]),
            };
            (StatusCode::OK, body)
        });
        let (store, requests) = client(handler).await;
        let mut sub = store
            .subscribe(Query::new("reservations").where_eq("userId", "u1"))
            .await
            .unwrap();

        let first = sub.next_snapshot().await.unwrap().unwrap();
        assert_eq!(first.documents.len(), 1);

        // Unchanged results are not re-emitted.
        let quiet = tokio::time::timeout(Duration::from_millis(80), sub.next_snapshot()).await;
        assert!(quiet.is_err());
        assert!(requests.lock().unwrap().len() > 1);

        version.store(1, Ordering::SeqCst);
        let second = sub.next_snapshot().await.unwrap().unwrap();
        assert_eq!(second.documents.len(), 2);
    }

    #[tokio::test]
    async fn test_repeated_error_reported_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let handler: Handler = Arc::new(move |_req: &Recorded| {
            c.fetch_add(1, Ordering::SeqCst);
            mock::error(StatusCode::INTERNAL_SERVER_ERROR, "backend unavailable")
        });
        let (store, _) = client(handler).await;
        let mut sub = store.subscribe(Query::new("reservations")).await.unwrap();

        let err = sub.next_snapshot().await.unwrap().unwrap_err();
        assert!(matches!(err, StoreError::Backend { .. }));

        let quiet = tokio::time::timeout(Duration::from_millis(80), sub.next_snapshot()).await;
        assert!(quiet.is_err());
        assert!(calls.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn test_zero_poll_interval_still_delivers_snapshots() {
        let handler: Handler =
            Arc::new(|_req: &Recorded| (StatusCode::OK, json!([document("a", "2024-01-01")])));
        let (base, _) = mock::serve(handler).await;
        let config = FirebaseConfig::new("k", "demo").with_endpoints(Endpoints::at(&base));
        let store = Firestore::new(config, Arc::new(FixedToken(Some("id-token"))))
            .with_poll_interval(Duration::ZERO);
        assert_eq!(store.poll_interval, MIN_POLL_INTERVAL);

        let mut sub = store.subscribe(Query::new("reservations")).await.unwrap();

        let first = sub.next_snapshot().await.unwrap().unwrap();
        assert_eq!(first.documents.len(), 1);
        assert!(sub.is_active());
    }
}
