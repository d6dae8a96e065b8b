//! Submission of validated claims to the prediction service.
//!
//! The request wraps the record under `Claim` next to the rules document path.
//! The response is decoded in two steps: the outer envelope carries
//! `claim_response.body`, which is itself a JSON document holding the
//! `prediction`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::SubmissionError;
use crate::schema::ClaimRecord;

/// Rules document consulted by the prediction service unless configured otherwise
pub const DEFAULT_DOC_S3_PATH: &str = "s3://buckett0/Auto Claim Acceptance Rules.pdf";

/// Verdict returned for a claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub verdict: String,
    /// Rule references the service reports having applied
    #[serde(default)]
    pub rules_used: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredictionOutcome {
    Predicted(Prediction),
    /// The service answered but gave no usable verdict
    Unavailable,
}

impl PredictionOutcome {
    pub fn predicted(verdict: impl Into<String>) -> Self {
        PredictionOutcome::Predicted(Prediction {
            verdict: verdict.into(),
            rules_used: Vec::new(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct PredictionRequest<'a> {
    pub doc_s3_path: &'a str,
    #[serde(rename = "Claim")]
    pub claim: &'a ClaimRecord,
}

#[derive(Deserialize)]
struct ResponseEnvelope {
    claim_response: Option<ClaimResponse>,
}

#[derive(Deserialize)]
struct ClaimResponse {
    body: Option<String>,
}

#[derive(Deserialize)]
struct PredictionBody {
    prediction: Option<Value>,
    rules_used: Option<Value>,
}

/// Request/response channel to the prediction service
#[async_trait]
pub trait PredictionChannel: Send + Sync {
    /// Sends one JSON request body and returns the raw response body
    async fn send(&self, body: String) -> Result<String, SubmissionError>;
}

/// Turns claim records into prediction requests and decodes the answers
#[derive(Clone)]
pub struct SubmissionService {
    channel: Arc<dyn PredictionChannel>,
    doc_s3_path: String,
}

impl SubmissionService {
    pub fn new(channel: Arc<dyn PredictionChannel>, doc_s3_path: impl Into<String>) -> Self {
        Self {
            channel,
            doc_s3_path: doc_s3_path.into(),
        }
    }

    pub fn with_default_document(channel: Arc<dyn PredictionChannel>) -> Self {
        Self::new(channel, DEFAULT_DOC_S3_PATH)
    }

    pub fn doc_s3_path(&self) -> &str {
        &self.doc_s3_path
    }

    pub fn build_request<'a>(&'a self, record: &'a ClaimRecord) -> PredictionRequest<'a> {
        PredictionRequest {
            doc_s3_path: &self.doc_s3_path,
            claim: record,
        }
    }

    /// Sends the claim and waits for the service's answer.
    ///
    /// Only a failing channel is an error; a response without a verdict is
    /// [`PredictionOutcome::Unavailable`].
    pub async fn submit(&self, record: &ClaimRecord) -> Result<PredictionOutcome, SubmissionError> {
        let body = serde_json::to_string(&self.build_request(record))
            .map_err(|e| SubmissionError::Encode(e.to_string()))?;

        info!(
            claim_id = %record.claim_id(),
            doc_s3_path = %self.doc_s3_path,
            "Submitting claim for prediction"
        );

        let response = self.channel.send(body).await?;
        let outcome = decode_response(&response);

        match &outcome {
            PredictionOutcome::Predicted(prediction) => info!(
                claim_id = %record.claim_id(),
                verdict = %prediction.verdict,
                rules_used = prediction.rules_used.len(),
                "Prediction received"
            ),
            PredictionOutcome::Unavailable => warn!(
                claim_id = %record.claim_id(),
                "Prediction service response carried no prediction"
            ),
        }

        Ok(outcome)
    }
}

/// Decodes the envelope and the JSON document nested in `claim_response.body`.
pub fn decode_response(raw: &str) -> PredictionOutcome {
    let Ok(envelope) = serde_json::from_str::<ResponseEnvelope>(raw) else {
        debug!("Response is not a prediction envelope");
        return PredictionOutcome::Unavailable;
    };

    let Some(body) = envelope.claim_response.and_then(|r| r.body) else {
        debug!("Response has no claim_response.body");
        return PredictionOutcome::Unavailable;
    };

    let Ok(inner) = serde_json::from_str::<PredictionBody>(&body) else {
        debug!("claim_response.body is not a JSON object");
        return PredictionOutcome::Unavailable;
    };

    match inner.prediction {
        Some(Value::String(verdict)) if !verdict.is_empty() => {
            let rules_used = match inner.rules_used {
                Some(Value::Array(rules)) => rules,
                _ => Vec::new(),
            };
            PredictionOutcome::Predicted(Prediction {
                verdict,
                rules_used,
            })
        }
        _ => PredictionOutcome::Unavailable,
    }
}

/// Posts requests to the prediction service endpoint over HTTP
#[cfg(feature = "http")]
pub struct HttpPredictionChannel {
    client: reqwest::Client,
    endpoint: String,
}

#[cfg(feature = "http")]
impl HttpPredictionChannel {
    pub fn new(
        endpoint: impl Into<String>,
        timeout: Option<std::time::Duration>,
    ) -> Result<Self, SubmissionError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| SubmissionError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl PredictionChannel for HttpPredictionChannel {
    async fn send(&self, body: String) -> Result<String, SubmissionError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| SubmissionError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            // the body is still decoded; error payloads simply carry no prediction
            warn!(status = %status, endpoint = %self.endpoint, "Prediction service returned an error status");
        }

        response
            .text()
            .await
            .map_err(|e| SubmissionError::Transport(e.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::schema::tests::complete_record;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Channel that answers with a canned response and remembers what it was sent
    pub(crate) struct StubChannel {
        response: Result<String, SubmissionError>,
        delay: Option<Duration>,
        pub(crate) sent: Mutex<Vec<String>>,
    }

    impl StubChannel {
        pub(crate) fn responding(body: impl Into<String>) -> Self {
            Self {
                response: Ok(body.into()),
                delay: None,
                sent: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                response: Err(SubmissionError::Transport("connection refused".to_string())),
                delay: None,
                sent: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn predicting(verdict: &str) -> Self {
            let body = serde_json::json!({ "prediction": verdict }).to_string();
            Self::responding(serde_json::json!({ "claim_response": { "body": body } }).to_string())
        }

        /// Holds every answer back for `delay`
        pub(crate) fn delayed(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    #[async_trait]
    impl PredictionChannel for StubChannel {
        async fn send(&self, body: String) -> Result<String, SubmissionError> {
            self.sent.lock().unwrap().push(body);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.response.clone()
        }
    }

    #[test]
    fn test_decode_prediction() {
        let raw = r#"{"claim_response":{"body":"{\"prediction\":\"Approve\"}"}}"#;
        assert_eq!(decode_response(raw), PredictionOutcome::predicted("Approve"));
    }

    #[test]
    fn test_decode_keeps_rules_used() {
        let body = serde_json::json!({
            "prediction": "Reject",
            "rules_used": ["R1", "R7"],
            "Claim": { "ClaimID": "3" }
        })
        .to_string();
        let raw = serde_json::json!({ "claim_response": { "statusCode": 200, "body": body } });

        match decode_response(&raw.to_string()) {
            PredictionOutcome::Predicted(prediction) => {
                assert_eq!(prediction.verdict, "Reject");
                assert_eq!(prediction.rules_used, vec![Value::from("R1"), Value::from("R7")]);
            }
            other => panic!("expected prediction, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_without_prediction_is_unavailable() {
        let cases = [
            r#"{"claim_response":{"body":"{\"rules_used\":[]}"}}"#,
            r#"{"claim_response":{"body":"{\"prediction\":null}"}}"#,
            r#"{"claim_response":{"body":"{\"prediction\":\"\"}"}}"#,
            r#"{"claim_response":{"body":"not json"}}"#,
            r#"{"claim_response":{}}"#,
            r#"{"error":"Invalid payload"}"#,
            r#"{}"#,
            "<html>bad gateway</html>",
            "",
        ];
        for raw in cases {
            assert_eq!(decode_response(raw), PredictionOutcome::Unavailable, "{raw}");
        }
    }

    #[tokio::test]
    async fn test_submit_wraps_claim_with_document_path() {
        let channel = Arc::new(StubChannel::predicting("Approve"));
        let service = SubmissionService::new(channel.clone(), "s3://rules/doc.pdf");

        let outcome = service.submit(&complete_record()).await.unwrap();
        assert_eq!(outcome, PredictionOutcome::predicted("Approve"));

        let sent = channel.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let request: Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(request["doc_s3_path"], "s3://rules/doc.pdf");
        assert_eq!(request["Claim"]["PolicyNumber"], "POL-1001");
        assert_eq!(request["Claim"].as_object().unwrap().len(), 22);
    }

    #[tokio::test]
    async fn test_submit_propagates_transport_failure() {
        let service = SubmissionService::with_default_document(Arc::new(StubChannel::failing()));
        assert_eq!(service.doc_s3_path(), DEFAULT_DOC_S3_PATH);

        let err = service.submit(&complete_record()).await.unwrap_err();
        assert!(matches!(err, SubmissionError::Transport(_)));
    }

    #[cfg(feature = "http")]
    mod http {
        use super::*;
        use axum::{Json, Router, routing::post};

        async fn spawn_stub_service() -> String {
            let app = Router::new().route(
                "/predict",
                post(|Json(request): Json<Value>| async move {
                    let body = serde_json::json!({
                        "prediction": format!("Approve {}", request["Claim"]["ClaimID"].as_str().unwrap_or("?")),
                        "rules_used": [request["doc_s3_path"].clone()],
                    });
                    Json(serde_json::json!({ "claim_response": { "body": body.to_string() } }))
                }),
            );
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });
            format!("http://{addr}/predict")
        }

        #[tokio::test]
        async fn test_http_channel_round_trip() {
            let endpoint = spawn_stub_service().await;
            let channel = HttpPredictionChannel::new(endpoint, Some(std::time::Duration::from_secs(5))).unwrap();
            let service = SubmissionService::with_default_document(Arc::new(channel));

            let mut record = complete_record();
            record.assign_claim_id(crate::schema::ClaimId(4));

            match service.submit(&record).await.unwrap() {
                PredictionOutcome::Predicted(prediction) => {
                    assert_eq!(prediction.verdict, "Approve 4");
                    assert_eq!(prediction.rules_used, vec![Value::from(DEFAULT_DOC_S3_PATH)]);
                }
                other => panic!("expected prediction, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_http_channel_unreachable_endpoint() {
            let channel = HttpPredictionChannel::new("http://127.0.0.1:1/predict", None).unwrap();
            let err = channel.send("{}".to_string()).await.unwrap_err();
            assert!(matches!(err, SubmissionError::Transport(_)));
        }
    }
}
