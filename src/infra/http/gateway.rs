//! `PostsGateway` over the REST/JSON posts API.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use postdesk_api_types::ApiErrorBody;

use crate::application::gateway::{GatewayError, PostsGateway};
use crate::config::ApiSettings;
use crate::domain::posts::{NewPost, Post, PostPage, PostPatch};
use crate::infra::error::InfraError;

/// HTTP client for the posts API.
///
/// Endpoints are resolved relative to the configured base URL:
/// `GET posts?page=N`, `GET posts/{id}`, `PATCH posts/{id}`, `POST posts`.
#[derive(Clone, Debug)]
pub struct HttpPostsGateway {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl HttpPostsGateway {
    pub fn new(settings: &ApiSettings) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(settings.timeout)
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;
        Ok(Self {
            client,
            base: with_trailing_slash(settings.base_url.clone()),
            token: settings.token.clone(),
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("postdesk/", env!("CARGO_PKG_VERSION"))
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> Result<Url, GatewayError> {
        self.base
            .join(path)
            .map_err(|err| GatewayError::network(format!("invalid request url `{path}`: {err}")))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let req = self.client.request(method, url);
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        post_id: Option<i64>,
    ) -> Result<T, GatewayError> {
        let resp = req.send().await.map_err(transport_error)?;
        Self::handle(resp, post_id).await
    }

    async fn handle<T: DeserializeOwned>(
        resp: Response,
        post_id: Option<i64>,
    ) -> Result<T, GatewayError> {
        let status = resp.status();
        let bytes = resp.bytes().await.map_err(transport_error)?;
        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            return Err(status_error(status, &text, post_id));
        }
        serde_json::from_slice(&bytes)
            .map_err(|err| GatewayError::network(format!("failed to parse body: {err}")))
    }
}

#[async_trait]
impl PostsGateway for HttpPostsGateway {
    #[instrument(skip(self), level = "debug")]
    async fn load_posts(&self, page: u32) -> Result<PostPage, GatewayError> {
        let mut url = self.url("posts")?;
        url.query_pairs_mut().append_pair("page", &page.to_string());
        debug!(%url, "Loading posts page");
        self.send(self.request(Method::GET, url), None).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn load_post(&self, id: i64) -> Result<Post, GatewayError> {
        let url = self.url(&format!("posts/{id}"))?;
        self.send(self.request(Method::GET, url), Some(id)).await
    }

    #[instrument(skip(self, patch), level = "debug")]
    async fn update_post(&self, id: i64, patch: &PostPatch) -> Result<Post, GatewayError> {
        let url = self.url(&format!("posts/{id}"))?;
        // NotFound is reserved for lookups; a failed update is a network error
        self.send(self.request(Method::PATCH, url).json(patch), None)
            .await
    }

    #[instrument(skip(self, fields), level = "debug")]
    async fn create_post(&self, fields: &NewPost) -> Result<Post, GatewayError> {
        let url = self.url("posts")?;
        self.send(self.request(Method::POST, url).json(fields), None)
            .await
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::network(err.to_string())
    }
}

fn status_error(status: StatusCode, body: &str, post_id: Option<i64>) -> GatewayError {
    match (status, post_id) {
        (StatusCode::NOT_FOUND, Some(id)) => GatewayError::NotFound { id },
        (StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY, _) => {
            let message = serde_json::from_str::<ApiErrorBody>(body)
                .map(|parsed| parsed.message)
                .unwrap_or_else(|_| body.trim().to_string());
            GatewayError::validation(message)
        }
        (StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT, _) => GatewayError::Timeout,
        _ => GatewayError::network(format!("status {status} body {body}")),
    }
}
