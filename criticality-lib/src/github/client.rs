//! Minimal GitHub API client for the REST and GraphQL endpoints.

use crate::Result;
use crate::http::{HttpRequest, HttpResponse, RetryTransport};
use crate::pagination::Variables;
use core::fmt::{Display, Formatter, Write};
use ohno::{IntoAppError, app_err, bail};
use regex::Regex;
use reqwest::Method;
use reqwest::header::{ACCEPT, HeaderValue, LINK};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::HashMap;
use std::sync::LazyLock;
use url::Url;

const LOG_TARGET: &str = "    github";

/// Default REST endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Default GraphQL endpoint.
pub const DEFAULT_GRAPHQL_URL: &str = "https://api.github.com/graphql";

const NOT_FOUND_TYPE: &str = "NOT_FOUND";
const FORBIDDEN_TYPE: &str = "FORBIDDEN";

static LINK_ENTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<([^>]+)>\s*;\s*rel="([^"]+)""#).expect("valid link pattern"));

/// One entry of a GraphQL `errors` array.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GraphQlError {
    pub message: String,

    /// GitHub-specific error classification, e.g. `NOT_FOUND`.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// The outcome of a GraphQL query that reached the server.
#[derive(Debug, Clone)]
pub enum GraphQlResult<T> {
    Data(T),
    Errors(Vec<GraphQlError>),
}

impl<T> GraphQlResult<T> {
    fn single_error_of_kind(&self, kind: &str) -> bool {
        match self {
            Self::Errors(errors) => matches!(errors.as_slice(), [single] if single.kind.as_deref() == Some(kind)),
            Self::Data(_) => false,
        }
    }

    /// The query failed only because the resource does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.single_error_of_kind(NOT_FOUND_TYPE)
    }

    /// The query failed only because the credentials may not read the resource.
    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        self.single_error_of_kind(FORBIDDEN_TYPE)
    }

    /// Convert query errors into an application error.
    pub fn into_data(self) -> Result<T> {
        match self {
            Self::Data(data) => Ok(data),
            Self::Errors(errors) => Err(app_err!("{}", ErrorList(&errors))),
        }
    }
}

struct ErrorList<'a>(&'a [GraphQlError]);

impl Display for ErrorList<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self.0 {
            [single] => write!(f, "GraphQL error: {} (type: {})", single.message, single.kind.as_deref().unwrap_or("unknown")),
            errors => write!(f, "{} GraphQL errors", errors.len()),
        }
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct RestError {
    #[serde(default)]
    message: String,
}

/// Company details of a GitHub user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserCompany {
    pub company: Option<String>,
}

/// Client for the GitHub REST and GraphQL APIs. Every request goes through a [`RetryTransport`].
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: RetryTransport,
    api_url: Url,
    graphql_url: Url,
}

impl GitHubClient {
    #[must_use]
    pub const fn new(http: RetryTransport, api_url: Url, graphql_url: Url) -> Self {
        Self {
            http,
            api_url,
            graphql_url,
        }
    }

    /// Build the URL of a REST endpoint below the API root.
    pub fn rest_url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let base = self.api_url.as_str().trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}/{}", path.trim_start_matches('/')))
            .into_app_err_with(|| format!("invalid REST path '{path}'"))?;
        if !query.is_empty() {
            let _ = url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Issue a REST `GET`. The response is returned whatever its status.
    pub async fn rest_get(&self, path: &str, query: &[(&str, &str)]) -> Result<HttpResponse> {
        let mut request = HttpRequest::get(self.rest_url(path, query)?);
        let _ = request
            .headers
            .insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));

        log::trace!(target: LOG_TARGET, "GET {}", request.url);
        self.http.send(&request).await
    }

    /// Run a GraphQL query.
    ///
    /// Transport failures and non-success statuses are errors; errors reported in the response
    /// body come back as [`GraphQlResult::Errors`].
    pub async fn graphql<T: DeserializeOwned>(&self, query: &str, variables: &Variables) -> Result<GraphQlResult<T>> {
        let body = json!({ "query": query, "variables": variables });
        let request = HttpRequest::json(Method::POST, self.graphql_url.clone(), &body)?;

        let response = self.http.send(&request).await?.error_for_status()?;
        let envelope: Envelope<T> = response.json()?;

        if !envelope.errors.is_empty() {
            log::debug!(target: LOG_TARGET, "GraphQL query returned {} errors", envelope.errors.len());
            return Ok(GraphQlResult::Errors(envelope.errors));
        }

        envelope
            .data
            .map(GraphQlResult::Data)
            .into_app_err("GraphQL response had neither data nor errors")
    }

    /// Run a GraphQL query, treating reported errors as failures.
    pub async fn graphql_data<T: DeserializeOwned>(&self, query: &str, variables: &Variables) -> Result<T> {
        self.graphql(query, variables).await?.into_data()
    }

    /// Look up the company of many users with a single aliased GraphQL query.
    ///
    /// Users that do not exist are omitted from the result.
    pub async fn batch_user_companies(&self, logins: &[&str]) -> Result<Vec<UserCompany>> {
        if logins.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = String::from("query {");
        for (index, login) in logins.iter().enumerate() {
            let login = serde_json::to_string(login).into_app_err("encoding login")?;
            let _ = write!(query, " u{index}: user(login: {login}) {{ company }}");
        }
        query.push_str(" }");

        // Missing users yield a null entry alongside a NOT_FOUND error; only the data matters.
        let request = HttpRequest::json(Method::POST, self.graphql_url.clone(), &json!({ "query": query }))?;
        let response = self.http.send(&request).await?.error_for_status()?;
        let envelope: Envelope<HashMap<String, Option<UserCompany>>> = response.json()?;

        let Some(data) = envelope.data else {
            bail!("{}", ErrorList(&envelope.errors));
        };

        let mut users: Vec<(usize, UserCompany)> = data
            .into_iter()
            .filter_map(|(alias, user)| Some((alias.strip_prefix('u')?.parse().ok()?, user?)))
            .collect();
        users.sort_unstable_by_key(|(index, _)| *index);
        Ok(users.into_iter().map(|(_, user)| user).collect())
    }
}

/// The `rel="last"` page number of a paginated REST response.
#[must_use]
pub fn last_page(response: &HttpResponse) -> Option<u64> {
    link_page(response, "last")
}

/// Whether a paginated REST response has a `rel="next"` link.
#[must_use]
pub fn has_next_page(response: &HttpResponse) -> bool {
    link_page(response, "next").is_some()
}

fn link_page(response: &HttpResponse, rel: &str) -> Option<u64> {
    let header = response.headers.get(LINK)?.to_str().ok()?;
    let entry = LINK_ENTRY.captures_iter(header).find(|c| &c[2] == rel)?;
    let url = Url::parse(&entry[1]).ok()?;
    let (_, page) = url.query_pairs().find(|(k, _)| k == "page")?;
    page.parse().ok()
}

/// The `message` of a REST error response body, if any.
#[must_use]
pub fn rest_error_message(response: &HttpResponse) -> String {
    serde_json::from_slice::<RestError>(&response.body)
        .map(|e| e.message)
        .unwrap_or_default()
}
