// Local crates
use crate::cloudwatch::auth::RequestSigner;
use crate::cloudwatch::creds::Credentials;
use crate::cloudwatch::models::Event;

// External crates
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

/// Failure of a remote call, by cause. None of these are retried here;
/// every sub-kind is fatal to the operation that raised it.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("AWS credentials not found; pass them explicitly or configure the environment")]
    CredentialsMissing,
    #[error("AWS credentials are incomplete: missing {0}")]
    CredentialsPartial(&'static str),
    #[error("AWS profile '{0}' not found")]
    ProfileNotFound(String),
    #[error("unable to reach endpoint {endpoint}: {reason}")]
    EndpointUnreachable { endpoint: String, reason: String },
    #[error("remote service error{}: {message}", code.as_deref().map(|c| format!(" [{c}]")).unwrap_or_default())]
    Client {
        code: Option<String>,
        message: String,
    },
}

/// Outcome of a remote create call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateResult {
    Created,
    AlreadyExists,
}

/// Acknowledgment returned by the remote append call. Opaque to the
/// pipeline; carried through for the caller's benefit.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutEventsAck {
    #[serde(default)]
    pub next_sequence_token: Option<String>,
    #[serde(default)]
    pub rejected_log_events_info: Option<Value>,
}

/// The remote log-aggregation surface the pipeline consumes. Injected into
/// the shipper so tests can substitute a recording double.
#[async_trait]
pub trait LogsApi: Send + Sync {
    /// Number of groups whose name starts with `prefix`.
    async fn count_groups_with_prefix(&self, prefix: &str) -> Result<usize, RemoteError>;

    async fn create_group(&self, name: &str) -> Result<CreateResult, RemoteError>;

    /// Number of streams under `group` whose name starts with `prefix`.
    async fn count_streams_with_prefix(
        &self,
        group: &str,
        prefix: &str,
    ) -> Result<usize, RemoteError>;

    async fn create_stream(&self, group: &str, name: &str) -> Result<CreateResult, RemoteError>;

    /// Appends `events` in the given order. Order must be preserved exactly;
    /// the remote service expects submission order, not re-sorted batches.
    async fn put_events(
        &self,
        group: &str,
        stream: &str,
        events: &[Event],
    ) -> Result<PutEventsAck, RemoteError>;

    /// Events as reported by the remote service, in remote-reported order.
    async fn get_events(&self, group: &str, stream: &str) -> Result<Vec<Event>, RemoteError>;
}

const CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const TARGET_PREFIX: &str = "Logs_20140328";
const ALREADY_EXISTS: &str = "ResourceAlreadyExistsException";

/// CloudWatch Logs client speaking the JSON-1.1 protocol: every operation
/// is a POST to the endpoint root with an `X-Amz-Target` action header and
/// a SigV4-signed JSON body.
#[derive(Debug, Clone)]
pub struct CloudWatchLogs {
    http: reqwest::Client,
    endpoint: Url,
    signer: RequestSigner,
}

impl CloudWatchLogs {
    pub fn new(
        region: &str,
        endpoint: Option<&str>,
        creds: Credentials,
    ) -> Result<Self, RemoteError> {
        let endpoint_url = match endpoint {
            Some(url) => url.to_string(),
            None => format!("https://logs.{region}.amazonaws.com"),
        };
        let endpoint = Url::parse(&endpoint_url).map_err(|e| RemoteError::EndpointUnreachable {
            endpoint: endpoint_url.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            http: reqwest::Client::new(),
            endpoint,
            signer: RequestSigner::new("logs", region, creds),
        })
    }

    async fn call(&self, action: &str, payload: Value) -> Result<Value, RemoteError> {
        let target = format!("{TARGET_PREFIX}.{action}");
        let body = payload.to_string().into_bytes();

        let signed = self.signer.sign(
            "POST",
            &self.endpoint,
            &[("content-type", CONTENT_TYPE), ("x-amz-target", &target)],
            &body,
        );

        let mut request = self
            .http
            .post(self.endpoint.clone())
            .header("content-type", CONTENT_TYPE)
            .header("x-amz-target", &target)
            .body(body);
        for (name, value) in &signed {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                RemoteError::EndpointUnreachable {
                    endpoint: self.endpoint.to_string(),
                    reason: e.to_string(),
                }
            } else {
                RemoteError::Client {
                    code: None,
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| RemoteError::Client {
            code: None,
            message: e.to_string(),
        })?;

        // Successful calls may return an empty body (the create operations do).
        if status.is_success() {
            if bytes.is_empty() {
                return Ok(json!({}));
            }
            return serde_json::from_slice(&bytes).map_err(|e| RemoteError::Client {
                code: None,
                message: format!("malformed response body: {e}"),
            });
        }

        // Error bodies carry the exception name in "__type".
        let (code, message) = match serde_json::from_slice::<Value>(&bytes) {
            Ok(body) => (
                body.get("__type")
                    .and_then(Value::as_str)
                    .map(|t| t.rsplit('#').next().unwrap_or(t).to_string()),
                body.get("message")
                    .or_else(|| body.get("Message"))
                    .and_then(Value::as_str)
                    .unwrap_or("request rejected")
                    .to_string(),
            ),
            Err(_) => (None, format!("HTTP {status}")),
        };
        Err(RemoteError::Client { code, message })
    }

    fn create_outcome(result: Result<Value, RemoteError>) -> Result<CreateResult, RemoteError> {
        match result {
            Ok(_) => Ok(CreateResult::Created),
            Err(RemoteError::Client {
                code: Some(code), ..
            }) if code == ALREADY_EXISTS => Ok(CreateResult::AlreadyExists),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl LogsApi for CloudWatchLogs {
    async fn count_groups_with_prefix(&self, prefix: &str) -> Result<usize, RemoteError> {
        let response = self
            .call("DescribeLogGroups", json!({ "logGroupNamePrefix": prefix }))
            .await?;
        Ok(response
            .get("logGroups")
            .and_then(Value::as_array)
            .map_or(0, Vec::len))
    }

    async fn create_group(&self, name: &str) -> Result<CreateResult, RemoteError> {
        Self::create_outcome(
            self.call("CreateLogGroup", json!({ "logGroupName": name }))
                .await,
        )
    }

    async fn count_streams_with_prefix(
        &self,
        group: &str,
        prefix: &str,
    ) -> Result<usize, RemoteError> {
        let response = self
            .call(
                "DescribeLogStreams",
                json!({ "logGroupName": group, "logStreamNamePrefix": prefix }),
            )
            .await?;
        Ok(response
            .get("logStreams")
            .and_then(Value::as_array)
            .map_or(0, Vec::len))
    }

    async fn create_stream(&self, group: &str, name: &str) -> Result<CreateResult, RemoteError> {
        Self::create_outcome(
            self.call(
                "CreateLogStream",
                json!({ "logGroupName": group, "logStreamName": name }),
            )
            .await,
        )
    }

    async fn put_events(
        &self,
        group: &str,
        stream: &str,
        events: &[Event],
    ) -> Result<PutEventsAck, RemoteError> {
        // Events go out in the order given; CloudWatch expects submission
        // order within a batch.
        let response = self
            .call(
                "PutLogEvents",
                json!({
                    "logGroupName": group,
                    "logStreamName": stream,
                    "logEvents": events,
                }),
            )
            .await?;
        serde_json::from_value(response).map_err(|e| RemoteError::Client {
            code: None,
            message: format!("malformed PutLogEvents response: {e}"),
        })
    }

    async fn get_events(&self, group: &str, stream: &str) -> Result<Vec<Event>, RemoteError> {
        let response = self
            .call(
                "GetLogEvents",
                json!({
                    "logGroupName": group,
                    "logStreamName": stream,
                    "startFromHead": true,
                }),
            )
            .await?;
        let events = response.get("events").cloned().unwrap_or_else(|| json!([]));
        serde_json::from_value(events).map_err(|e| RemoteError::Client {
            code: None,
            message: format!("malformed GetLogEvents response: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_outcome_maps_already_exists() {
        let outcome = CloudWatchLogs::create_outcome(Err(RemoteError::Client {
            code: Some(ALREADY_EXISTS.to_string()),
            message: "The specified log group already exists".to_string(),
        }));
        assert_eq!(outcome.unwrap(), CreateResult::AlreadyExists);
    }

    #[test]
    fn create_outcome_passes_other_errors_through() {
        let outcome = CloudWatchLogs::create_outcome(Err(RemoteError::Client {
            code: Some("AccessDeniedException".to_string()),
            message: "denied".to_string(),
        }));
        assert!(matches!(outcome, Err(RemoteError::Client { .. })));
    }

    #[test]
    fn create_outcome_success_is_created() {
        let outcome = CloudWatchLogs::create_outcome(Ok(json!({})));
        assert_eq!(outcome.unwrap(), CreateResult::Created);
    }

    #[test]
    fn default_endpoint_follows_region() {
        let client = CloudWatchLogs::new(
            "eu-west-1",
            None,
            Credentials::new("AKID".to_string(), "SECRET".to_string(), None),
        )
        .unwrap();
        assert_eq!(
            client.endpoint.as_str(),
            "https://logs.eu-west-1.amazonaws.com/"
        );
    }

    #[test]
    fn ack_deserializes_with_missing_fields() {
        let ack: PutEventsAck = serde_json::from_value(json!({})).unwrap();
        assert!(ack.next_sequence_token.is_none());
        assert!(ack.rejected_log_events_info.is_none());

        let ack: PutEventsAck =
            serde_json::from_value(json!({ "nextSequenceToken": "49590" })).unwrap();
        assert_eq!(ack.next_sequence_token.as_deref(), Some("49590"));
    }
}
