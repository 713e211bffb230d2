use super::{HttpRequest, HttpResponse};
use crate::Result;
use core::time::Duration;
use futures::future::BoxFuture;
use ohno::IntoAppError;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};

/// Sends a single request and buffers the response.
pub trait Transport: Send + Sync {
    fn send<'a>(&'a self, request: &'a HttpRequest) -> BoxFuture<'a, Result<HttpResponse>>;
}

/// [`Transport`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport that sends `authorization` (if any) with every request.
    pub fn new(authorization: Option<&str>, timeout: Duration) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("criticality/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout);

        if let Some(auth) = authorization {
            let mut auth_val = HeaderValue::from_str(auth).into_app_err("invalid authorization header value")?;
            auth_val.set_sensitive(true);

            let mut headers = HeaderMap::new();
            let _ = headers.insert(AUTHORIZATION, auth_val);

            builder = builder.default_headers(headers);
        }

        Ok(Self {
            client: builder.build().into_app_err("building HTTP client")?,
        })
    }
}

impl Transport for ReqwestTransport {
    fn send<'a>(&'a self, request: &'a HttpRequest) -> BoxFuture<'a, Result<HttpResponse>> {
        Box::pin(async move {
            let mut builder = self
                .client
                .request(request.method.clone(), request.url.clone())
                .headers(request.headers.clone());
            if let Some(body) = &request.body {
                builder = builder.body(body.clone());
            }

            let resp = builder
                .send()
                .await
                .into_app_err_with(|| format!("sending {} request to '{}'", request.method, request.url))?;

            let status = resp.status();
            let headers = resp.headers().clone();
            let body = resp
                .bytes()
                .await
                .into_app_err_with(|| format!("reading response body from '{}'", request.url))?;

            Ok(HttpResponse {
                status,
                headers,
                body,
                url: request.url.clone(),
            })
        })
    }
}
