//! AWS SQS provider implementation using the SQS query API over HTTP.
//!
//! Requests are plain HTTP calls signed with AWS Signature Version 4, and the
//! XML responses are parsed with `quick-xml`. Going through HTTP directly
//! keeps the provider small and lets unit tests run against a mock server.
//!
//! ## Supported actions
//!
//! - `ReceiveMessage`: up to 10 messages per call, optional long polling
//! - `DeleteMessage`: acknowledge by receipt handle
//! - `SendMessage`: with a per-message `DelaySeconds` (SQS maximum: 900)
//! - `GetQueueUrl`: resolves a queue name when no URL was configured
//!
//! FIFO queues are rejected at construction: SQS does not accept per-message
//! delays on them, and every reschedule relies on one.
//!
//! ## Credentials
//!
//! Keys set in [`AwsSqsConfig`] are used as-is. Without them,
//! [`SqsQueue::connect`] resolves the AWS default credential chain
//! (environment, shared profile, web identity, container and EC2 instance
//! roles) and refreshes those credentials ahead of their expiry. A client is
//! never built without credentials.
//!
//! ## Example
//!
//! ```no_run
//! use exp_backoff_runtime::{AwsSqsConfig, QueueClient, SqsQueue};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AwsSqsConfig::from_env(
//!     "https://sqs.us-east-1.amazonaws.com/123456789012/orders",
//! );
//! let queue = SqsQueue::connect(config).await?;
//! let batch = queue.receive_messages(10).await?;
//! # Ok(())
//! # }
//! ```

use crate::client::QueueClient;
use crate::error::{ConfigurationError, QueueError, SerializationError};
use crate::message::{MessageId, QueueMessage, QueueName, ReceiptHandle};
use crate::provider::{AwsSqsConfig, ProviderType};
use async_trait::async_trait;
use aws_config::default_provider::credentials::DefaultCredentialsChain;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_credential_types::Credentials;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client as HttpClient;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;
use tracing::{debug, info};

#[cfg(test)]
#[path = "sqs_tests.rs"]
mod tests;

const API_VERSION: &str = "2012-11-05";

/// Chain credentials are replaced once they are this close to expiring
const CREDENTIAL_REFRESH_WINDOW: Duration = Duration::from_secs(300);

// ============================================================================
// Errors
// ============================================================================

/// Failure of a single SQS query-API call
///
/// Converted to [`QueueError`] at the [`QueueClient`] boundary.
#[derive(Debug, thiserror::Error)]
pub enum SqsError {
    #[error("SQS rejected the request signature or credentials: {0}")]
    Authentication(String),

    #[error("SQS endpoint unreachable: {0}")]
    NetworkError(String),

    #[error("SQS call exceeded {0:?}")]
    Timeout(Duration),

    #[error("SQS returned {code}: {message}")]
    ServiceError { code: String, message: String },

    #[error("SQS queue does not exist: {0}")]
    QueueNotFound(String),

    #[error("SQS no longer accepts receipt: {0}")]
    InvalidReceipt(String),

    #[error("SQS body limit is {max_size} bytes, got {size}")]
    MessageTooLarge { size: usize, max_size: usize },

    #[error("Delay of {delay_seconds}s exceeds the SQS maximum of {max_seconds}s")]
    DelayOutOfRange { delay_seconds: u64, max_seconds: u64 },

    #[error("SQS client misconfigured: {0}")]
    ConfigurationError(String),

    #[error("SQS response unreadable: {0}")]
    SerializationError(String),
}

impl SqsError {
    /// Same classification as [`QueueError::is_transient`]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NetworkError(_) | Self::Timeout(_) | Self::ServiceError { .. }
        )
    }

    pub fn to_queue_error(self) -> QueueError {
        match self {
            Self::Authentication(message) => QueueError::AuthenticationFailed { message },
            Self::NetworkError(message) => QueueError::ConnectionFailed { message },
            Self::Timeout(duration) => QueueError::Timeout { duration },
            Self::ServiceError { code, message } => QueueError::ProviderError {
                provider: ProviderType::AwsSqs.to_string(),
                code,
                message,
            },
            Self::QueueNotFound(queue_name) => QueueError::QueueNotFound { queue_name },
            Self::InvalidReceipt(receipt) => QueueError::MessageNotFound { receipt },
            Self::MessageTooLarge { size, max_size } => QueueError::MessageTooLarge { size, max_size },
            Self::DelayOutOfRange {
                delay_seconds,
                max_seconds,
            } => QueueError::DelayOutOfRange {
                delay_seconds,
                max_seconds,
            },
            Self::ConfigurationError(message) => {
                QueueError::ConfigurationError(ConfigurationError::Invalid { message })
            }
            Self::SerializationError(message) => {
                QueueError::SerializationError(SerializationError::Xml { message })
            }
        }
    }
}

impl From<ConfigurationError> for SqsError {
    fn from(error: ConfigurationError) -> Self {
        Self::ConfigurationError(error.to_string())
    }
}

// ============================================================================
// Request signing
// ============================================================================

type HmacSha256 = Hmac<Sha256>;

const SIGNING_ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// SigV4 signer scoped to one region and the `sqs` service
///
/// Signs `host`, `x-amz-date` and, for temporary credentials,
/// `x-amz-security-token`. Request bodies are always empty.
#[derive(Clone)]
struct AwsV4Signer {
    access_key: String,
    secret_key: String,
    session_token: Option<String>,
    region: String,
    service: String,
}

impl AwsV4Signer {
    fn new(
        access_key: String,
        secret_key: String,
        session_token: Option<String>,
        region: String,
    ) -> Self {
        Self {
            access_key,
            secret_key,
            session_token,
            region,
            service: "sqs".to_string(),
        }
    }

    /// Sign an HTTP request, returning the headers to attach to it
    fn sign_request(
        &self,
        method: &str,
        host: &str,
        path: &str,
        query_params: &BTreeMap<String, String>,
        body: &str,
        timestamp: &DateTime<Utc>,
    ) -> Result<Vec<(String, String)>, SqsError> {
        let date_stamp = timestamp.format("%Y%m%d").to_string();
        let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();

        // Query parameters are sorted by encoded key; BTreeMap order matches
        // for the ASCII keys SQS uses.
        let canonical_query_string = encode_query(query_params);

        // Header names in lexical order.
        let mut canonical_headers = format!("host:{}\nx-amz-date:{}\n", host, amz_date);
        let mut signed_headers = "host;x-amz-date".to_string();
        if let Some(token) = &self.session_token {
            canonical_headers.push_str(&format!("x-amz-security-token:{}\n", token));
            signed_headers.push_str(";x-amz-security-token");
        }

        let payload_hash = hex::encode(Sha256::digest(body.as_bytes()));

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method, path, canonical_query_string, canonical_headers, signed_headers, payload_hash
        );

        let scope = [
            date_stamp.as_str(),
            self.region.as_str(),
            self.service.as_str(),
            "aws4_request",
        ]
        .join("/");
        let string_to_sign = [
            SIGNING_ALGORITHM.to_string(),
            amz_date.clone(),
            scope.clone(),
            hex::encode(Sha256::digest(canonical_request.as_bytes())),
        ]
        .join("\n");

        let signature = self.calculate_signature(&string_to_sign, &date_stamp)?;

        let authorization = format!(
            "{SIGNING_ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            self.access_key
        );

        let mut headers = vec![
            ("Authorization".to_string(), authorization),
            ("x-amz-date".to_string(), amz_date),
        ];
        if let Some(token) = &self.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }

        Ok(headers)
    }

    /// Derive the signing key and sign `string_to_sign`
    ///
    /// kSecret = "AWS4" + secret, then HMAC over date, region, service and
    /// "aws4_request" in turn; the final key signs the string.
    fn calculate_signature(&self, string_to_sign: &str, date_stamp: &str) -> Result<String, SqsError> {
        let k_secret = format!("AWS4{}", self.secret_key);
        let k_date = hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes())?;
        let k_region = hmac_sha256(&k_date, self.region.as_bytes())?;
        let k_service = hmac_sha256(&k_region, self.service.as_bytes())?;
        let k_signing = hmac_sha256(&k_service, b"aws4_request")?;
        let signature = hmac_sha256(&k_signing, string_to_sign.as_bytes())?;

        Ok(hex::encode(signature))
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, SqsError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| SqsError::Authentication(format!("Invalid signing key: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn encode_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

// ============================================================================
// Credentials
// ============================================================================

/// Signer built from one set of provider-issued credentials
#[derive(Clone)]
struct IssuedSigner {
    signer: AwsV4Signer,
    expires_at: Option<SystemTime>,
}

impl IssuedSigner {
    fn from_credentials(credentials: &Credentials, region: &str) -> Self {
        Self {
            signer: AwsV4Signer::new(
                credentials.access_key_id().to_string(),
                credentials.secret_access_key().to_string(),
                credentials.session_token().map(str::to_string),
                region.to_string(),
            ),
            expires_at: credentials.expiry(),
        }
    }
}

fn needs_refresh(expires_at: Option<SystemTime>, now: SystemTime) -> bool {
    match expires_at {
        Some(expiry) => now + CREDENTIAL_REFRESH_WINDOW >= expiry,
        None => false,
    }
}

enum CredentialSource {
    /// Keys taken from configuration
    Static(AwsV4Signer),
    /// Credentials issued by a provider, refreshed ahead of expiry
    Provided {
        provider: SharedCredentialsProvider,
        current: RwLock<IssuedSigner>,
    },
}

impl CredentialSource {
    fn from_config(config: &AwsSqsConfig) -> Option<Self> {
        match (&config.access_key_id, &config.secret_access_key) {
            (Some(access_key), Some(secret_key)) => Some(Self::Static(AwsV4Signer::new(
                access_key.clone(),
                secret_key.clone(),
                config.session_token.clone(),
                config.region.clone(),
            ))),
            _ => None,
        }
    }

    async fn from_provider(
        provider: SharedCredentialsProvider,
        region: &str,
    ) -> Result<Self, SqsError> {
        let credentials = provider.provide_credentials().await.map_err(|e| {
            SqsError::Authentication(format!("No AWS credentials available: {}", e))
        })?;

        Ok(Self::Provided {
            current: RwLock::new(IssuedSigner::from_credentials(&credentials, region)),
            provider,
        })
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Static(_) => "static",
            Self::Provided { .. } => "provider",
        }
    }

    /// Signer for the next request
    async fn signer(&self) -> Result<AwsV4Signer, SqsError> {
        let (provider, current) = match self {
            Self::Static(signer) => return Ok(signer.clone()),
            Self::Provided { provider, current } => (provider, current),
        };

        {
            let issued = current.read().await;
            if !needs_refresh(issued.expires_at, SystemTime::now()) {
                return Ok(issued.signer.clone());
            }
        }

        let mut issued = current.write().await;
        if needs_refresh(issued.expires_at, SystemTime::now()) {
            let credentials = provider.provide_credentials().await.map_err(|e| {
                SqsError::Authentication(format!("Unable to refresh AWS credentials: {}", e))
            })?;
            let region = issued.signer.region.clone();
            *issued = IssuedSigner::from_credentials(&credentials, &region);
            debug!(expires_at = ?issued.expires_at, "Refreshed AWS credentials");
        }

        Ok(issued.signer.clone())
    }
}

// ============================================================================
// Response Parsing
// ============================================================================

/// Fields collected for one `<Message>` element
#[derive(Default)]
struct PartialMessage {
    message_id: Option<String>,
    receipt_handle: Option<String>,
    body: Option<String>,
    receive_count: Option<u32>,
    attribute_name: Option<String>,
}

/// Text content of the first element named `tag`
fn first_element_text(xml: &str, tag: &[u8]) -> Result<Option<String>, SqsError> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut inside = false;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == tag => {
                inside = true;
                text.clear();
            }
            Ok(Event::Text(e)) if inside => {
                let unescaped = e.unescape().map_err(|e| {
                    SqsError::SerializationError(format!("Failed to parse XML: {}", e))
                })?;
                text.push_str(&unescaped);
            }
            Ok(Event::End(ref e)) if inside && e.local_name().as_ref() == tag => {
                return Ok(Some(text));
            }
            Ok(Event::Eof) => return Ok(None),
            Err(e) => {
                return Err(SqsError::SerializationError(format!(
                    "XML parsing error: {}",
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }
}

fn parse_queue_url_response(xml: &str) -> Result<String, SqsError> {
    first_element_text(xml, b"QueueUrl")?
        .map(|url| url.trim().to_string())
        .ok_or_else(|| SqsError::SerializationError("QueueUrl not found in response".to_string()))
}

fn parse_send_message_response(xml: &str) -> Result<MessageId, SqsError> {
    let raw = first_element_text(xml, b"MessageId")?.ok_or_else(|| {
        SqsError::SerializationError("MessageId not found in response".to_string())
    })?;

    raw.trim()
        .parse::<MessageId>()
        .map_err(|e| SqsError::SerializationError(e.to_string()))
}

fn parse_receive_message_response(xml: &str) -> Result<Vec<QueueMessage>, SqsError> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut text = String::new();
    let mut current: Option<PartialMessage> = None;
    let mut messages = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = e.local_name().as_ref().to_vec();
                if name == b"Message" {
                    current = Some(PartialMessage::default());
                }
                path.push(name);
                text.clear();
            }
            Ok(Event::Empty(ref e)) => {
                // <Body/> is an empty message body
                if let (Some(message), b"Body") = (current.as_mut(), e.local_name().as_ref()) {
                    message.body = Some(String::new());
                }
            }
            Ok(Event::Text(e)) => {
                let unescaped = e.unescape().map_err(|e| {
                    SqsError::SerializationError(format!("Failed to parse XML: {}", e))
                })?;
                text.push_str(&unescaped);
            }
            Ok(Event::End(_)) => {
                let name = path.pop().unwrap_or_default();
                let parent = path.last().map(Vec::as_slice);
                let value = std::mem::take(&mut text);

                if name == b"Message" {
                    if let Some(partial) = current.take() {
                        messages.push(build_message(partial)?);
                    }
                } else if let Some(message) = current.as_mut() {
                    match (name.as_slice(), parent) {
                        (b"MessageId", Some(b"Message")) => message.message_id = Some(value),
                        (b"ReceiptHandle", Some(b"Message")) => {
                            message.receipt_handle = Some(value)
                        }
                        (b"Body", Some(b"Message")) => message.body = Some(value),
                        (b"Name", Some(b"Attribute")) => message.attribute_name = Some(value),
                        (b"Value", Some(b"Attribute")) => {
                            if message.attribute_name.as_deref() == Some("ApproximateReceiveCount")
                            {
                                message.receive_count = value.trim().parse().ok();
                            }
                            message.attribute_name = None;
                        }
                        _ => {}
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SqsError::SerializationError(format!(
                    "XML parsing error: {}",
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(messages)
}

fn build_message(partial: PartialMessage) -> Result<QueueMessage, SqsError> {
    let receipt = partial.receipt_handle.ok_or_else(|| {
        SqsError::SerializationError("ReceiptHandle missing from received message".to_string())
    })?;

    let message_id = partial
        .message_id
        .and_then(|id| id.parse::<MessageId>().ok())
        .unwrap_or_default();

    Ok(QueueMessage::new(
        message_id,
        partial.body.unwrap_or_default(),
        ReceiptHandle::new(receipt),
    )
    .with_receive_count(partial.receive_count.unwrap_or(1)))
}

fn parse_error_response(xml: &str, status_code: u16) -> SqsError {
    let code = first_element_text(xml, b"Code")
        .ok()
        .flatten()
        .unwrap_or_else(|| "Unknown".to_string());
    let message = first_element_text(xml, b"Message")
        .ok()
        .flatten()
        .unwrap_or_else(|| "Unknown error".to_string());

    match code.as_str() {
        "AWS.SimpleQueueService.NonExistentQueue" | "QueueDoesNotExist" => {
            SqsError::QueueNotFound(message)
        }
        "InvalidClientTokenId"
        | "UnrecognizedClientException"
        | "SignatureDoesNotMatch"
        | "InvalidSecurity"
        | "ExpiredToken"
        | "AccessDenied" => SqsError::Authentication(format!("{}: {}", code, message)),
        "ReceiptHandleIsInvalid" | "InvalidReceiptHandle" => SqsError::InvalidReceipt(message),
        _ if status_code == 401 || status_code == 403 => {
            SqsError::Authentication(format!("{}: {}", code, message))
        }
        _ => SqsError::ServiceError { code, message },
    }
}

// ============================================================================
// SqsQueue
// ============================================================================

/// A single SQS queue implementing [`QueueClient`]
///
/// Cheap to share behind an `Arc`; the resolved queue URL is cached.
pub struct SqsQueue {
    http_client: HttpClient,
    credentials: CredentialSource,
    config: AwsSqsConfig,
    endpoint: String,
    host: String,
    queue_label: String,
    queue_url: RwLock<Option<String>>,
}

impl SqsQueue {
    /// Create a client that signs with the keys in `config`
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid, names a FIFO queue,
    /// carries no access keys, or the HTTP client cannot be built. Use
    /// [`SqsQueue::connect`] to fall back to the AWS default credential chain.
    pub fn new(config: AwsSqsConfig) -> Result<Self, SqsError> {
        config.validate()?;
        let credentials = CredentialSource::from_config(&config).ok_or_else(|| {
            SqsError::ConfigurationError(
                "access_key_id and secret_access_key are required; \
                 use SqsQueue::connect to resolve the default credential chain"
                    .to_string(),
            )
        })?;

        Self::build(config, credentials)
    }

    /// Create a client, resolving credentials from the AWS default chain
    /// when `config` carries no access keys
    ///
    /// # Errors
    ///
    /// Fails when the configuration is invalid or no credentials can be found.
    pub async fn connect(config: AwsSqsConfig) -> Result<Self, SqsError> {
        config.validate()?;
        if let Some(credentials) = CredentialSource::from_config(&config) {
            return Self::build(config, credentials);
        }

        let chain = DefaultCredentialsChain::builder()
            .region(aws_config::Region::new(config.region.clone()))
            .build()
            .await;
        let client =
            Self::with_credentials_provider(config, SharedCredentialsProvider::new(chain)).await?;

        info!(queue = %client.queue_label, "Using credentials from the AWS default chain");
        Ok(client)
    }

    /// Create a client that signs with credentials from `provider`
    ///
    /// The provider is asked once up front, so a client is never returned
    /// without credentials.
    pub async fn with_credentials_provider(
        config: AwsSqsConfig,
        provider: SharedCredentialsProvider,
    ) -> Result<Self, SqsError> {
        config.validate()?;
        let credentials = CredentialSource::from_provider(provider, &config.region).await?;
        Self::build(config, credentials)
    }

    fn build(config: AwsSqsConfig, credentials: CredentialSource) -> Result<Self, SqsError> {
        let queue_label = match (&config.queue_name, &config.queue_url) {
            (Some(name), _) => QueueName::new(name.clone())
                .map_err(|e| SqsError::ConfigurationError(e.to_string()))?,
            (None, Some(url)) => QueueName::from_queue_url(url)
                .map_err(|e| SqsError::ConfigurationError(e.to_string()))?,
            (None, None) => {
                return Err(SqsError::ConfigurationError(
                    "queue_url or queue_name is required".to_string(),
                ))
            }
        };

        if queue_label.is_fifo() {
            return Err(SqsError::ConfigurationError(format!(
                "FIFO queue '{}' is not supported: SQS rejects per-message delays on FIFO queues",
                queue_label
            )));
        }

        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://sqs.{}.amazonaws.com", config.region))
            .trim_end_matches('/')
            .to_string();

        let parsed = url::Url::parse(&endpoint)
            .map_err(|e| SqsError::ConfigurationError(format!("Invalid endpoint: {}", e)))?;
        let host = match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(SqsError::ConfigurationError(format!(
                    "Endpoint '{}' has no host",
                    endpoint
                )))
            }
        };

        let http_client = reqwest::ClientBuilder::new()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| SqsError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            credentials,
            queue_url: RwLock::new(config.queue_url.clone()),
            config,
            endpoint,
            host,
            queue_label: queue_label.as_str().to_string(),
        })
    }

    /// Get the queue URL, resolving it by name on first use
    async fn resolve_queue_url(&self) -> Result<String, SqsError> {
        {
            let cached = self.queue_url.read().await;
            if let Some(url) = cached.as_ref() {
                return Ok(url.clone());
            }
        }

        let mut params = self.base_params("GetQueueUrl");
        params.insert("QueueName".to_string(), self.queue_label.clone());

        let response = self.make_request(&params).await?;
        let queue_url = parse_queue_url_response(&response)?;

        debug!(queue = %self.queue_label, queue_url = %queue_url, "Resolved SQS queue URL");
        *self.queue_url.write().await = Some(queue_url.clone());

        Ok(queue_url)
    }

    fn base_params(&self, action: &str) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert("Action".to_string(), action.to_string());
        params.insert("Version".to_string(), API_VERSION.to_string());
        params
    }

    /// POST a signed query-API request and return the response body
    async fn make_request(&self, query_params: &BTreeMap<String, String>) -> Result<String, SqsError> {
        let signer = self.credentials.signer().await?;

        let path = "/";
        let body = "";
        let auth_headers =
            signer.sign_request("POST", &self.host, path, query_params, body, &Utc::now())?;

        let url = format!("{}{}?{}", self.endpoint, path, encode_query(query_params));

        let request = auth_headers
            .into_iter()
            .fold(self.http_client.post(&url), |request, (name, value)| {
                request.header(name, value)
            });

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SqsError::Timeout(Duration::from_secs(self.config.request_timeout_seconds))
            } else if e.is_connect() {
                SqsError::NetworkError(format!("Connection failed: {}", e))
            } else {
                SqsError::NetworkError(format!("HTTP request failed: {}", e))
            }
        })?;

        let status = response.status();
        let response_body = response
            .text()
            .await
            .map_err(|e| SqsError::NetworkError(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(parse_error_response(&response_body, status.as_u16()));
        }

        Ok(response_body)
    }
}

impl fmt::Debug for SqsQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqsQueue")
            .field("queue", &self.queue_label)
            .field("endpoint", &self.endpoint)
            .field("credentials", &self.credentials.kind())
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl QueueClient for SqsQueue {
    async fn receive_messages(&self, max_messages: u32) -> Result<Vec<QueueMessage>, QueueError> {
        let queue_url = self
            .resolve_queue_url()
            .await
            .map_err(SqsError::to_queue_error)?;

        let batch_size = max_messages.clamp(1, ProviderType::AwsSqs.max_batch_size());

        let mut params = self.base_params("ReceiveMessage");
        params.insert("QueueUrl".to_string(), queue_url);
        params.insert("MaxNumberOfMessages".to_string(), batch_size.to_string());
        params.insert(
            "WaitTimeSeconds".to_string(),
            self.config.wait_time_seconds.to_string(),
        );
        params.insert(
            "AttributeName.1".to_string(),
            "ApproximateReceiveCount".to_string(),
        );

        let response = self
            .make_request(&params)
            .await
            .map_err(SqsError::to_queue_error)?;
        let messages = parse_receive_message_response(&response).map_err(SqsError::to_queue_error)?;

        debug!(queue = %self.queue_label, count = messages.len(), "Received SQS messages");
        Ok(messages)
    }

    async fn delete_message(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        let queue_url = self
            .resolve_queue_url()
            .await
            .map_err(SqsError::to_queue_error)?;

        let mut params = self.base_params("DeleteMessage");
        params.insert("QueueUrl".to_string(), queue_url);
        params.insert("ReceiptHandle".to_string(), receipt.as_str().to_string());

        self.make_request(&params)
            .await
            .map_err(SqsError::to_queue_error)?;

        debug!(queue = %self.queue_label, receipt = ?receipt, "Deleted SQS message");
        Ok(())
    }

    async fn send_message(&self, body: &str, delay_seconds: u64) -> Result<MessageId, QueueError> {
        if let Some(max_seconds) = ProviderType::AwsSqs.max_delay_seconds() {
            if delay_seconds > max_seconds {
                return Err(SqsError::DelayOutOfRange {
                    delay_seconds,
                    max_seconds,
                }
                .to_queue_error());
            }
        }

        let max_size = ProviderType::AwsSqs.max_message_size();
        if body.len() > max_size {
            return Err(SqsError::MessageTooLarge {
                size: body.len(),
                max_size,
            }
            .to_queue_error());
        }

        let queue_url = self
            .resolve_queue_url()
            .await
            .map_err(SqsError::to_queue_error)?;

        let mut params = self.base_params("SendMessage");
        params.insert("QueueUrl".to_string(), queue_url);
        params.insert("MessageBody".to_string(), body.to_string());
        params.insert("DelaySeconds".to_string(), delay_seconds.to_string());

        let response = self
            .make_request(&params)
            .await
            .map_err(SqsError::to_queue_error)?;
        let message_id = parse_send_message_response(&response).map_err(SqsError::to_queue_error)?;

        debug!(
            queue = %self.queue_label,
            message_id = %message_id,
            delay_seconds,
            "Sent SQS message"
        );
        Ok(message_id)
    }

    fn queue_name(&self) -> &str {
        &self.queue_label
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::AwsSqs
    }
}
