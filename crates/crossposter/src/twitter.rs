//! Twitter posting client.
//!
//! Posts tweets over API v1.1 or v2 depending on the user's credential
//! configuration, and uploads media over the v1.1 upload endpoint. A
//! transient failure (503) gets exactly one immediate retry; everything
//! else is classified by [`TwitterError::classify`] and left to the
//! handler's recovery paths.

use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::config::TwitterEndpoints;
use crate::error::{TwitterError, TwitterResult};
use crate::oauth::OauthSigner;

/// Which Twitter API a credential configuration targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiVersion {
    #[serde(rename = "v1")]
    V1,
    #[serde(rename = "v2")]
    V2,
}

/// OAuth 1.0a token pair, in the field names profiles are stored with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwitterTokens {
    pub app_key: String,
    pub app_secret: String,
    pub access_token: String,
    pub access_secret: String,
}

/// Optional parts of a tweet.
#[derive(Debug, Clone, Default)]
pub struct TweetOptions {
    /// Tweet id to thread under.
    pub reply_to: Option<String>,

    /// Uploaded media ids, in selection order.
    pub media_ids: Vec<String>,
}

/// Twitter REST client bound to one user's credentials.
#[derive(Debug, Clone)]
pub struct TwitterClient {
    client: reqwest::Client,
    api_url: String,
    upload_url: String,
    version: ApiVersion,
    signer: OauthSigner,
}

impl TwitterClient {
    /// Create a client for one credential configuration.
    pub fn new(
        version: ApiVersion,
        tokens: TwitterTokens,
        endpoints: &TwitterEndpoints,
    ) -> TwitterResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("crossposter/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_url: endpoints.api_url.trim_end_matches('/').to_owned(),
            upload_url: endpoints.upload_url.trim_end_matches('/').to_owned(),
            version,
            signer: OauthSigner::new(tokens),
        })
    }

    /// Post a tweet, retrying once immediately on a transient failure.
    #[instrument(skip(self, text), fields(version = ?self.version))]
    pub async fn post_tweet(&self, text: &str, options: &TweetOptions) -> TwitterResult<String> {
        match self.post_tweet_once(text, options).await {
            Err(err) if err.is_transient() => {
                warn!(%err, "transient failure, retrying once");
                self.post_tweet_once(text, options).await
            }
            result => result,
        }
    }

    async fn post_tweet_once(&self, text: &str, options: &TweetOptions) -> TwitterResult<String> {
        match self.version {
            ApiVersion::V1 => self.tweet_v1(text, options).await,
            ApiVersion::V2 => self.tweet_v2(text, options).await,
        }
    }

    async fn tweet_v1(&self, text: &str, options: &TweetOptions) -> TwitterResult<String> {
        let url = format!("{}/1.1/statuses/update.json", self.api_url);

        let media_ids = options.media_ids.join(",");
        let mut params: Vec<(&str, &str)> = vec![("status", text)];
        if let Some(reply_to) = &options.reply_to {
            params.push(("in_reply_to_status_id", reply_to));
        }
        if !media_ids.is_empty() {
            params.push(("media_ids", &media_ids));
        }

        // Form parameters participate in the OAuth signature.
        let authorization = self.signer.authorization("POST", &url, &params)?;

        let response = self
            .client
            .post(&url)
            .header("Authorization", authorization)
            .form(&params)
            .send()
            .await?;

        #[derive(Deserialize)]
        struct StatusResponse {
            id_str: String,
        }

        let status: StatusResponse = self.parse_response(response).await?;
        debug!(tweet_id = %status.id_str, "posted via v1.1");
        Ok(status.id_str)
    }

    async fn tweet_v2(&self, text: &str, options: &TweetOptions) -> TwitterResult<String> {
        let url = format!("{}/2/tweets", self.api_url);
        let authorization = self.signer.authorization("POST", &url, &[])?;

        #[derive(Serialize)]
        struct CreateTweetRequest<'a> {
            text: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            reply: Option<Reply<'a>>,
            #[serde(skip_serializing_if = "Option::is_none")]
            media: Option<MediaIds<'a>>,
        }

        #[derive(Serialize)]
        struct Reply<'a> {
            in_reply_to_tweet_id: &'a str,
        }

        #[derive(Serialize)]
        struct MediaIds<'a> {
            media_ids: &'a [String],
        }

        let request = CreateTweetRequest {
            text,
            reply: options.reply_to.as_deref().map(|id| Reply {
                in_reply_to_tweet_id: id,
            }),
            media: (!options.media_ids.is_empty()).then(|| MediaIds {
                media_ids: &options.media_ids,
            }),
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", authorization)
            .json(&request)
            .send()
            .await?;

        #[derive(Deserialize)]
        struct CreateTweetResponse {
            data: CreatedTweet,
        }

        #[derive(Deserialize)]
        struct CreatedTweet {
            id: String,
        }

        let created: CreateTweetResponse = self.parse_response(response).await?;
        debug!(tweet_id = %created.data.id, "posted via v2");
        Ok(created.data.id)
    }

    /// Upload one media file; returns the media id to attach to a tweet.
    /// Always uses the v1.1 upload endpoint, whichever version posts the
    /// tweet.
    #[instrument(skip(self, bytes), fields(size = bytes.len(), mime_type))]
    pub async fn upload_media(&self, bytes: Bytes, mime_type: &str) -> TwitterResult<String> {
        let url = format!("{}/1.1/media/upload.json", self.upload_url);
        // Multipart bodies are not part of the signature base string.
        let authorization = self.signer.authorization("POST", &url, &[])?;

        let part = reqwest::multipart::Part::bytes(bytes.to_vec())
            .file_name("media")
            .mime_str(mime_type)
            .map_err(|_| TwitterError::Media(format!("invalid MIME type: {mime_type}")))?;
        let form = reqwest::multipart::Form::new().part("media", part);

        let response = self
            .client
            .post(&url)
            .header("Authorization", authorization)
            .multipart(form)
            .send()
            .await?;

        #[derive(Deserialize)]
        struct UploadResponse {
            media_id_string: String,
        }

        let upload: UploadResponse = self.parse_response(response).await?;
        Ok(upload.media_id_string)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> TwitterResult<T> {
        let status = response.status();
        let body = response.bytes().await?;

        if status.is_success() {
            return Ok(serde_json::from_slice(&body)?);
        }

        Err(parse_api_error(status.as_u16(), &body))
    }
}

/// Decode an error body in either API's shape into [`TwitterError::Api`].
fn parse_api_error(status: u16, body: &[u8]) -> TwitterError {
    #[derive(Deserialize, Default)]
    struct ErrorBody {
        // v1.1: {"errors": [{"code": 187, "message": "..."}]}
        #[serde(default)]
        errors: Vec<V1Error>,
        // v2: {"title": "...", "detail": "...", "status": 403}
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        detail: Option<String>,
    }

    #[derive(Deserialize)]
    struct V1Error {
        #[serde(default)]
        code: Option<i32>,
        #[serde(default)]
        message: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_slice(body).unwrap_or_default();
    let first = parsed.errors.first();

    let message = parsed
        .detail
        .clone()
        .or_else(|| first.and_then(|e| e.message.clone()))
        .or(parsed.title)
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());

    TwitterError::Api {
        status,
        message,
        error_code: first.and_then(|e| e.code),
        detail: parsed.detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PostFailure;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tokens() -> TwitterTokens {
        TwitterTokens {
            app_key: "k".into(),
            app_secret: "s".into(),
            access_token: "t".into(),
            access_secret: "ts".into(),
        }
    }

    fn client(server: &MockServer, version: ApiVersion) -> TwitterClient {
        TwitterClient::new(
            version,
            tokens(),
            &TwitterEndpoints {
                api_url: server.uri(),
                upload_url: server.uri(),
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn v2_tweet_posts_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/tweets"))
            .and(header_exists("Authorization"))
            .and(body_string_contains("\"text\":\"hello\""))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "data": { "id": "1234", "text": "hello" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let id = client(&server, ApiVersion::V2)
            .post_tweet("hello", &TweetOptions::default())
            .await
            .unwrap();
        assert_eq!(id, "1234");
    }

    #[tokio::test]
    async fn v2_tweet_threads_and_attaches_media() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/tweets"))
            .and(body_string_contains("\"in_reply_to_tweet_id\":\"99\""))
            .and(body_string_contains("\"media_ids\":[\"m1\",\"m2\"]"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "data": { "id": "1235" }
            })))
            .mount(&server)
            .await;

        let options = TweetOptions {
            reply_to: Some("99".into()),
            media_ids: vec!["m1".into(), "m2".into()],
        };
        let id = client(&server, ApiVersion::V2)
            .post_tweet("hello", &options)
            .await
            .unwrap();
        assert_eq!(id, "1235");
    }

    #[tokio::test]
    async fn v1_tweet_posts_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1.1/statuses/update.json"))
            .and(header_exists("Authorization"))
            .and(body_string_contains("status=hello+world"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id_str": "5678"
            })))
            .mount(&server)
            .await;

        let id = client(&server, ApiVersion::V1)
            .post_tweet("hello world", &TweetOptions::default())
            .await
            .unwrap();
        assert_eq!(id, "5678");
    }

    #[tokio::test]
    async fn duplicate_content_classifies_duplicate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/tweets"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "title": "Forbidden",
                "detail": "You are not allowed to create a Tweet with duplicate content.",
                "status": 403
            })))
            .mount(&server)
            .await;

        let err = client(&server, ApiVersion::V2)
            .post_tweet("hello", &TweetOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.classify(), PostFailure::Duplicate);
    }

    #[tokio::test]
    async fn v1_duplicate_code_classifies_duplicate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1.1/statuses/update.json"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "errors": [{ "code": 187, "message": "Status is a duplicate." }]
            })))
            .mount(&server)
            .await;

        let err = client(&server, ApiVersion::V1)
            .post_tweet("hello", &TweetOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.classify(), PostFailure::Duplicate);
    }

    #[tokio::test]
    async fn transient_failure_retried_exactly_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/tweets"))
            .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
                "title": "Service Unavailable",
                "detail": "Service Unavailable",
                "status": 503
            })))
            .expect(2)
            .mount(&server)
            .await;

        let err = client(&server, ApiVersion::V2)
            .post_tweet("hello", &TweetOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.classify(), PostFailure::Transient);
    }

    #[tokio::test]
    async fn transient_then_success_recovers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/tweets"))
            .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
                "status": 503
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/2/tweets"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "data": { "id": "1236" }
            })))
            .mount(&server)
            .await;

        let id = client(&server, ApiVersion::V2)
            .post_tweet("hello", &TweetOptions::default())
            .await
            .unwrap();
        assert_eq!(id, "1236");
    }

    #[tokio::test]
    async fn upload_media_returns_media_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1.1/media/upload.json"))
            .and(header_exists("Authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "media_id": 710511363345354753_i64,
                "media_id_string": "710511363345354753"
            })))
            .mount(&server)
            .await;

        let id = client(&server, ApiVersion::V2)
            .upload_media(Bytes::from_static(b"\x89PNG"), "image/png")
            .await
            .unwrap();
        assert_eq!(id, "710511363345354753");
    }

    #[tokio::test]
    async fn auth_failure_classifies_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/tweets"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "title": "Unauthorized",
                "detail": "Unauthorized",
                "status": 401
            })))
            .mount(&server)
            .await;

        let err = client(&server, ApiVersion::V2)
            .post_tweet("hello", &TweetOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.classify(), PostFailure::Auth);
    }
}
