//! Purpose: Blocking HTTP client for the catalog REST endpoints.
//! Exports: `CatalogClient`, `SearchOptions`, `View`.
//! Role: Builds request URLs, encodes bodies and decodes responses through `Codec`.
//! Invariants: Endpoint URLs are `{base}/{endpoint}.json{target}` with `;v=`/`;s=` view decorations.
//! Invariants: Non-2xx responses become `Error`s whose kind follows the HTTP status.
//! Invariants: No retries; every failure is returned to the caller.
#![allow(clippy::result_large_err)]

use super::config::ClientConfig;
use crate::core::codec::Codec;
use crate::core::error::{Error, ErrorKind};
use crate::core::model::{CatalogNode, Container, ContainerKind, Dataset, Entity};
use crate::core::tags::EntityKind;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

type ApiResult<T> = Result<T, Error>;

#[derive(Clone)]
pub struct CatalogClient {
    inner: Arc<CatalogClientInner>,
}

struct CatalogClientInner {
    config: ClientConfig,
    codec: Codec<'static>,
    agent: ureq::Agent,
}

/// Dataset view selection appended to a target path.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct View {
    pub version: Option<String>,
    pub site: Option<String>,
}

impl View {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self
    }

    fn decorate(&self, target: &str) -> String {
        let mut out = normalize_target(target);
        if let Some(version) = self.version.as_deref().filter(|v| !v.is_empty()) {
            out.push_str(";v=");
            out.push_str(version);
        }
        if let Some(site) = self.site.as_deref().filter(|s| !s.is_empty()) {
            out.push_str(";s=");
            out.push_str(site);
        }
        out
    }
}

#[derive(Clone, Debug, Default)]
pub struct SearchOptions {
    /// Filter expression in the service's query language, e.g. `nRun gt 6200`.
    pub filter: Option<String>,
    /// Sort keys; a trailing `-` sorts descending.
    pub sort: Vec<String>,
    /// Extra metadata fields to retrieve.
    pub show: Vec<String>,
    pub offset: Option<u64>,
    pub max: Option<u64>,
    pub view: View,
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_sort(mut self, key: impl Into<String>) -> Self {
        self.sort.push(key.into());
        self
    }

    pub fn with_show(mut self, key: impl Into<String>) -> Self {
        self.show.push(key.into());
        self
    }
}

#[derive(Deserialize)]
struct RemoteError {
    message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    cause: Option<String>,
}

impl CatalogClient {
    pub fn new(config: ClientConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Self {
            inner: Arc::new(CatalogClientInner {
                config,
                codec: Codec::new(),
                agent,
            }),
        }
    }

    pub fn from_url(base_url: impl AsRef<str>) -> ApiResult<Self> {
        Ok(Self::new(ClientConfig::new(base_url)?))
    }

    pub fn with_codec(mut self, codec: Codec<'static>) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.codec = codec;
        } else {
            self.inner = Arc::new(CatalogClientInner {
                config: self.inner.config.clone(),
                codec,
                agent: self.inner.agent.clone(),
            });
        }
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.config.base_url
    }

    pub fn search(&self, target: &str, options: &SearchOptions) -> ApiResult<Vec<Entity>> {
        let url = self.search_url(target, options)?;
        let body = self
            .request_json("GET", &url, None)
            .map_err(|err| err.with_path(target))?;
        self.inner.codec.decode(body)?.into_entities()
    }

    /// Look up a single entry by path.
    pub fn path(&self, path: &str, view: &View) -> ApiResult<Entity> {
        let url = self.endpoint_url("path", &view.decorate(path))?;
        let body = self
            .request_json("GET", &url, None)
            .map_err(|err| err.with_path(path))?;
        self.inner.codec.decode(body)?.into_entity()
    }

    pub fn mkdir(
        &self,
        parent: &str,
        container: &Container,
        kind: ContainerKind,
    ) -> ApiResult<Entity> {
        require_name(container.name(), parent)?;
        let url = self.endpoint_url(container_endpoint(kind), &normalize_target(parent))?;
        let body = self.inner.codec.encode(container)?;
        let created = self
            .request_json("POST", &url, Some(&body))
            .map_err(|err| err.with_path(parent))?;
        self.decode_created(created, kind.entity_kind())
    }

    pub fn mkds(&self, parent: &str, dataset: &Dataset) -> ApiResult<Entity> {
        require_name(dataset.name(), parent)?;
        let body = dataset.create_request(&self.inner.codec)?;
        let url = self.endpoint_url("datasets", &normalize_target(parent))?;
        let created = self
            .request_json("POST", &url, Some(&body))
            .map_err(|err| err.with_path(parent))?;
        self.decode_created(created, EntityKind::Dataset)
    }

    pub fn rmdir(&self, path: &str, kind: ContainerKind) -> ApiResult<()> {
        let url = self.endpoint_url(container_endpoint(kind), &normalize_target(path))?;
        self.request_json("DELETE", &url, None)
            .map_err(|err| err.with_path(path))?;
        Ok(())
    }

    pub fn rmds(&self, path: &str) -> ApiResult<()> {
        let url = self.endpoint_url("datasets", &normalize_target(path))?;
        self.request_json("DELETE", &url, None)
            .map_err(|err| err.with_path(path))?;
        Ok(())
    }

    fn decode_created(&self, body: Value, kind: EntityKind) -> ApiResult<Entity> {
        self.inner
            .codec
            .with_default_kind(Some(kind))
            .decode(body)?
            .into_entity()
    }

    fn search_url(&self, target: &str, options: &SearchOptions) -> ApiResult<Url> {
        let mut url = self.endpoint_url("search", &options.view.decorate(target))?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(filter) = options.filter.as_deref().filter(|f| !f.is_empty()) {
                pairs.append_pair("filter", filter);
            }
            for key in &options.sort {
                pairs.append_pair("sort", key);
            }
            for key in &options.show {
                pairs.append_pair("show", key);
            }
            if let Some(offset) = options.offset {
                pairs.append_pair("offset", &offset.to_string());
            }
            if let Some(max) = options.max {
                pairs.append_pair("max", &max.to_string());
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }

    fn endpoint_url(&self, endpoint: &str, target: &str) -> ApiResult<Url> {
        build_endpoint_url(&self.inner.config.base_url, endpoint, target)
    }

    fn request_json(&self, method: &str, url: &Url, body: Option<&Value>) -> ApiResult<Value> {
        tracing::debug!(method, url = %url, "catalog request");
        let request = self
            .inner
            .agent
            .request(method, url.as_str())
            .set("Accept", "application/json");
        let response = match body {
            None => request.call(),
            Some(body) => {
                let payload = serde_json::to_string(body).map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to encode request json")
                        .with_source(err)
                })?;
                request
                    .set("Content-Type", "application/json")
                    .send_string(&payload)
            }
        };

        match response {
            Ok(resp) => {
                tracing::debug!(status = resp.status(), "catalog response");
                read_json_response(resp)
            }
            Err(ureq::Error::Status(code, resp)) => {
                tracing::warn!(status = code, url = %url, "catalog request rejected");
                Err(parse_error_response(code, resp))
            }
            Err(ureq::Error::Transport(err)) => {
                tracing::warn!(url = %url, error = %err, "catalog transport failure");
                Err(Error::new(ErrorKind::Io)
                    .with_message("request failed")
                    .with_source(err))
            }
        }
    }
}

fn container_endpoint(kind: ContainerKind) -> &'static str {
    match kind {
        ContainerKind::Folder => "folders",
        ContainerKind::Group => "groups",
    }
}

fn require_name(name: Option<&str>, parent: &str) -> ApiResult<()> {
    if name.is_none() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("a name is required to create an entry")
            .with_field("name")
            .with_path(parent));
    }
    Ok(())
}

fn normalize_target(target: &str) -> String {
    let trimmed = target.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Target segments are percent-encoded, so `?` and `#` in a catalog path stay in the path.
fn build_endpoint_url(base_url: &Url, endpoint: &str, target: &str) -> ApiResult<Url> {
    let mut url = base_url.clone();
    url.path_segments_mut()
        .map_err(|()| {
            Error::new(ErrorKind::Usage)
                .with_message("catalog base url cannot be a base")
                .with_path(target)
        })?
        .pop_if_empty()
        .push(&format!("{endpoint}.json"))
        .extend(target.trim_start_matches('/').split('/'));
    Ok(url)
}

fn read_json_response(response: ureq::Response) -> ApiResult<Value> {
    let body = response.into_string().map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read response body")
            .with_source(err)
    })?;
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).map_err(|err| {
        Error::new(ErrorKind::Malformed)
            .with_message("invalid response json")
            .with_source(err)
    })
}

fn parse_error_response(status: u16, response: ureq::Response) -> Error {
    let body = response.into_string().unwrap_or_default();
    let mut err = Error::new(error_kind_from_status(status));
    match serde_json::from_str::<RemoteError>(&body) {
        Ok(remote) => {
            let message = match (remote.kind, remote.message) {
                (Some(kind), Some(message)) => format!("{kind}: {message}"),
                (None, Some(message)) => message,
                (Some(kind), None) => kind,
                (None, None) => format!("catalog error status {status}"),
            };
            err = err.with_message(message);
            if let Some(cause) = remote.cause {
                err = err.with_hint(cause);
            }
        }
        Err(_) => err = err.with_message(format!("catalog error status {status}")),
    }
    err
}

fn error_kind_from_status(status: u16) -> ErrorKind {
    match status {
        400 | 413 | 422 => ErrorKind::Usage,
        401 | 403 => ErrorKind::Permission,
        404 => ErrorKind::NotFound,
        409 => ErrorKind::AlreadyExists,
        500..=599 => ErrorKind::Internal,
        _ => ErrorKind::Io,
    }
}
