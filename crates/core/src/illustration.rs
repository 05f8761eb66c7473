//! Illustration Service Adapter
//!
//! [`ImageGenerator`] is the fallible remote capability; [`IllustrationAdapter`]
//! wraps one and always yields an image, substituting a locally rendered
//! placeholder whenever the remote side fails.

use crate::{
    credential::Credential,
    fetch::{FetchError, RequestDescriptor, RetryingClient},
    placeholder::render_placeholder,
};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use tracing::{info, warn};

const SERVICE_NAME: &str = "imagen";
const ASPECT_RATIO: &str = "4:3";
pub const PNG_MIME_TYPE: &str = "image/png";

/// An encoded image and its MIME type.
#[derive(Clone, PartialEq, Eq)]
pub struct Illustration {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl Illustration {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn png(data: Vec<u8>) -> Self {
        Self::new(PNG_MIME_TYPE, data)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// `data:<mime>;base64,<payload>`
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.data))
    }

    /// Parses a base64 data URL; anything else yields `None`.
    pub fn from_data_url(url: &str) -> Option<Self> {
        let rest = url.strip_prefix("data:")?;
        let (mime_type, payload) = rest.split_once(";base64,")?;
        let data = STANDARD.decode(payload).ok()?;
        Some(Self::new(mime_type, data))
    }
}

impl fmt::Debug for Illustration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Illustration")
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// A remote image-generation capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generates exactly one image for a fully substituted prompt.
    async fn generate(&self, prompt: &str) -> Result<Illustration, FetchError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictRequest<'a> {
    instances: PredictInstance<'a>,
    parameters: PredictParameters,
}

#[derive(Serialize)]
struct PredictInstance<'a> {
    prompt: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictParameters {
    sample_count: u32,
    aspect_ratio: &'static str,
}

#[derive(Deserialize, Default)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: Option<String>,
    mime_type: Option<String>,
}

/// `ImageGenerator` for the Imagen `:predict` endpoint.
pub struct ImagenGenerator {
    client: RetryingClient,
    api_base: String,
    model: String,
    credential: Credential,
}

impl ImagenGenerator {
    pub fn new(
        client: RetryingClient,
        api_base: impl Into<String>,
        model: impl Into<String>,
        credential: Credential,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into(),
            model: model.into(),
            credential,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:predict",
            self.api_base.trim_end_matches('/'),
            self.model
        )
    }

    fn malformed(reason: impl Into<String>) -> FetchError {
        FetchError::Malformed {
            service: SERVICE_NAME.to_string(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ImageGenerator for ImagenGenerator {
    async fn generate(&self, prompt: &str) -> Result<Illustration, FetchError> {
        let api_key = self.credential.resolve()?;
        let body = PredictRequest {
            instances: PredictInstance { prompt },
            parameters: PredictParameters {
                sample_count: 1,
                aspect_ratio: ASPECT_RATIO,
            },
        };
        let request = RequestDescriptor::post_json(self.endpoint(), &body)?
            .header("x-goog-api-key", api_key);

        let response: PredictResponse = self.client.call(SERVICE_NAME, &request).await?;
        let prediction = response
            .predictions
            .into_iter()
            .next()
            .ok_or_else(|| Self::malformed("no predictions in response"))?;
        let encoded = prediction
            .bytes_base64_encoded
            .filter(|b| !b.is_empty())
            .ok_or_else(|| Self::malformed("missing image data in successful response"))?;
        let data = STANDARD
            .decode(encoded)
            .map_err(|e| Self::malformed(format!("image data is not valid base64: {}", e)))?;

        Ok(Illustration::new(image_mime_type(prediction.mime_type), data))
    }
}

/// Keeps a reported type only when it is a plain `image/<subtype>` token.
fn image_mime_type(reported: Option<String>) -> String {
    reported
        .map(|mime| mime.trim().to_ascii_lowercase())
        .filter(|mime| {
            mime.strip_prefix("image/").is_some_and(|subtype| {
                !subtype.is_empty()
                    && subtype
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '-'))
            })
        })
        .unwrap_or_else(|| PNG_MIME_TYPE.to_string())
}

/// Turns any `ImageGenerator` into an infallible illustration source.
#[derive(Clone)]
pub struct IllustrationAdapter {
    generator: Arc<dyn ImageGenerator>,
}

impl IllustrationAdapter {
    pub fn new(generator: Arc<dyn ImageGenerator>) -> Self {
        Self { generator }
    }

    /// Requests an illustration, falling back to a placeholder on any failure.
    pub async fn illustrate(&self, prompt: &str) -> Illustration {
        match self.generator.generate(prompt).await {
            Ok(image) if !image.is_empty() => {
                info!(
                    bytes = image.data.len(),
                    mime_type = %image.mime_type,
                    "Illustration generated"
                );
                image
            }
            Ok(_) => {
                warn!("Image service returned an empty image; using placeholder");
                render_placeholder(prompt)
            }
            Err(e) => {
                warn!(error = %e, "Image generation failed; using placeholder");
                render_placeholder(prompt)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fetch::{MockTransport, RawResponse, RetryPolicy, TransportError},
        placeholder::SVG_MIME_TYPE,
    };
    use reqwest::StatusCode;
    use std::time::Duration;

    fn generator(transport: MockTransport) -> ImagenGenerator {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        };
        ImagenGenerator::new(
            RetryingClient::new(Arc::new(transport), policy),
            "https://generativelanguage.test/v1beta/",
            "imagen-3.0-generate-002",
            Credential::Static("test-key".to_string()),
        )
    }

    #[test]
    fn test_data_url_round_trip() {
        let image = Illustration::png(vec![137, 80, 78, 71]);
        let url = image.to_data_url();
        assert!(url.starts_with("data:image/png;base64,"));
        assert_eq!(Illustration::from_data_url(&url), Some(image));
        assert_eq!(Illustration::from_data_url("https://example.com/a.png"), None);
    }

    #[tokio::test]
    async fn test_imagen_request_shape_and_decoding() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .withf(|req| {
                req.endpoint
                    == "https://generativelanguage.test/v1beta/models/imagen-3.0-generate-002:predict"
                    && req.header_value("x-goog-api-key") == Some("test-key")
                    && req.payload["instances"]["prompt"] == "A blue bird."
                    && req.payload["parameters"]["sampleCount"] == 1
                    && req.payload["parameters"]["aspectRatio"] == "4:3"
            })
            .times(1)
            .returning(|_| {
                Ok(RawResponse::new(
                    StatusCode::OK,
                    r#"{"predictions":[{"bytesBase64Encoded":"AQID","mimeType":"image/png"}]}"#,
                ))
            });

        let image = generator(transport).generate("A blue bird.").await.unwrap();
        assert_eq!(image, Illustration::png(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_imagen_reported_type_must_be_an_image_token() {
        let mut transport = MockTransport::new();
        transport.expect_send().returning(|_| {
            Ok(RawResponse::new(
                StatusCode::OK,
                r#"{"predictions":[{"bytesBase64Encoded":"AQID","mimeType":"image/png\" onerror=\"alert(1)"}]}"#,
            ))
        });

        let image = generator(transport).generate("A blue bird.").await.unwrap();
        assert_eq!(image.mime_type, PNG_MIME_TYPE);
    }

    #[test]
    fn test_image_mime_type_filter() {
        assert_eq!(image_mime_type(Some("image/jpeg".to_string())), "image/jpeg");
        assert_eq!(image_mime_type(Some("image/svg+xml".to_string())), "image/svg+xml");
        assert_eq!(image_mime_type(Some("text/html".to_string())), PNG_MIME_TYPE);
        assert_eq!(image_mime_type(Some("image/".to_string())), PNG_MIME_TYPE);
        assert_eq!(image_mime_type(None), PNG_MIME_TYPE);
    }

    #[tokio::test]
    async fn test_imagen_missing_image_field_is_malformed() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .returning(|_| Ok(RawResponse::new(StatusCode::OK, r#"{"predictions":[{}]}"#)));

        let err = generator(transport).generate("A blue bird.").await.unwrap_err();
        assert!(matches!(err, FetchError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_imagen_without_credential_makes_no_call() {
        let mut transport = MockTransport::new();
        transport.expect_send().never();

        let generator = ImagenGenerator::new(
            RetryingClient::new(Arc::new(transport), RetryPolicy::default()),
            "https://generativelanguage.test/v1beta",
            "imagen-3.0-generate-002",
            Credential::Env("STORYBOOK_TEST_UNSET_KEY_1C7D".to_string()),
        );
        let err = generator.generate("A blue bird.").await.unwrap_err();
        assert!(matches!(err, FetchError::MissingCredential(_)));
    }

    #[tokio::test]
    async fn test_adapter_falls_back_when_image_field_is_missing() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .returning(|_| Ok(RawResponse::new(StatusCode::OK, r#"{"predictions":[]}"#)));

        let adapter = IllustrationAdapter::new(Arc::new(generator(transport)));
        let image = adapter.illustrate("A blue bird.").await;
        assert!(!image.is_empty());
        assert_eq!(image.mime_type, SVG_MIME_TYPE);
    }

    #[tokio::test]
    async fn test_adapter_falls_back_after_exhausted_retries() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .times(3)
            .returning(|_| Err(TransportError("connection reset".to_string())));

        let adapter = IllustrationAdapter::new(Arc::new(generator(transport)));
        let image = adapter.illustrate("A blue bird.").await;
        assert_eq!(image.mime_type, SVG_MIME_TYPE);
        assert!(String::from_utf8(image.data).unwrap().contains("A blue bird."));
    }

    #[tokio::test]
    async fn test_adapter_passes_generated_image_through() {
        let mut generator = MockImageGenerator::new();
        generator
            .expect_generate()
            .returning(|_| Ok(Illustration::png(vec![9, 9, 9])));

        let adapter = IllustrationAdapter::new(Arc::new(generator));
        assert_eq!(
            adapter.illustrate("anything").await,
            Illustration::png(vec![9, 9, 9])
        );
    }

    #[tokio::test]
    async fn test_adapter_replaces_empty_image() {
        let mut generator = MockImageGenerator::new();
        generator
            .expect_generate()
            .returning(|_| Ok(Illustration::png(Vec::new())));

        let adapter = IllustrationAdapter::new(Arc::new(generator));
        assert_eq!(adapter.illustrate("anything").await.mime_type, SVG_MIME_TYPE);
    }
}
