//! OCI distribution API registry backend

use anyhow::{Context, Result};
use regex::Regex;
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, WWW_AUTHENTICATE};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};
use std::time::Duration;

use crate::deploy::{ImageRegistry, RegistryError};

const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.index.v1+json, \
     application/vnd.oci.image.manifest.v1+json, \
     application/vnd.docker.distribution.manifest.list.v2+json, \
     application/vnd.docker.distribution.manifest.v2+json";

/// Whether `tag` is a syntactically valid OCI tag.
///
/// Raw branch names such as `feature/x` are not; those cannot exist.
pub fn is_valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() || c == '_' => {}
        _ => return false,
    }
    tag.len() <= 128
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Parameters of a `WWW-Authenticate: Bearer ...` challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerChallenge {
    pub realm: String,
    pub service: Option<String>,
    pub scope: Option<String>,
}

static CHALLENGE_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(\w+)="([^"]*)""#).expect("challenge param pattern is valid")
});

pub fn parse_challenge(header: &str) -> Option<BearerChallenge> {
    let rest = header.trim().strip_prefix("Bearer ")?;
    let mut params: HashMap<String, String> = CHALLENGE_PARAM
        .captures_iter(rest)
        .map(|c| (c[1].to_lowercase(), c[2].to_string()))
        .collect();

    Some(BearerChallenge {
        realm: params.remove("realm")?,
        service: params.remove("service"),
        scope: params.remove("scope"),
    })
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

/// Registry reached through the distribution HTTP API with anonymous pull tokens
pub struct HttpRegistry {
    host: String,
    client: Client,
    // Pull tokens keyed by repository
    tokens: Mutex<HashMap<String, String>>,
}

impl HttpRegistry {
    pub fn new(host: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("helm-deployer/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create registry HTTP client")?;

        Ok(Self {
            host: host.into(),
            client,
            tokens: Mutex::new(HashMap::new()),
        })
    }

    pub fn manifest_url(&self, repository: &str, tag: &str) -> String {
        format!("https://{}/v2/{}/manifests/{}", self.host, repository, tag)
    }

    fn request_error(&self, image: &str, err: reqwest::Error) -> RegistryError {
        if err.is_timeout() {
            RegistryError::Timeout {
                image: image.to_string(),
            }
        } else {
            RegistryError::Request {
                image: image.to_string(),
                message: err.to_string(),
            }
        }
    }

    fn cached_token(&self, repository: &str) -> Option<String> {
        self.tokens
            .lock()
            .ok()
            .and_then(|tokens| tokens.get(repository).cloned())
    }

    fn head_manifest(
        &self,
        image: &str,
        url: &str,
        token: Option<&str>,
    ) -> Result<Response, RegistryError> {
        let mut request = self.client.head(url).header(ACCEPT, MANIFEST_ACCEPT);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        request.send().map_err(|e| self.request_error(image, e))
    }

    fn fetch_token(
        &self,
        image: &str,
        challenge: &BearerChallenge,
    ) -> Result<String, RegistryError> {
        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(service) = &challenge.service {
            query.push(("service", service));
        }
        if let Some(scope) = &challenge.scope {
            query.push(("scope", scope));
        }

        let response = self
            .client
            .get(&challenge.realm)
            .query(&query)
            .send()
            .and_then(Response::error_for_status)
            .map_err(|e| self.request_error(image, e))?;

        let body: TokenResponse = response.json().map_err(|e| self.request_error(image, e))?;
        body.token
            .or(body.access_token)
            .ok_or_else(|| RegistryError::Request {
                image: image.to_string(),
                message: "token endpoint returned no token".to_string(),
            })
    }
}

impl ImageRegistry for HttpRegistry {
    fn host(&self) -> &str {
        &self.host
    }

    fn tag_exists(&self, repository: &str, tag: &str) -> Result<bool, RegistryError> {
        if !is_valid_tag(tag) {
            tracing::debug!(tag, "not a valid OCI tag, skipping lookup");
            return Ok(false);
        }

        let image = format!("{}/{}:{}", self.host, repository, tag);
        let url = self.manifest_url(repository, tag);

        let mut response = self.head_manifest(&image, &url, self.cached_token(repository).as_deref())?;

        if response.status() == StatusCode::UNAUTHORIZED {
            let challenge = response
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|h| h.to_str().ok())
                .and_then(parse_challenge)
                .ok_or_else(|| RegistryError::Request {
                    image: image.clone(),
                    message: "registry requires authentication but sent no bearer challenge"
                        .to_string(),
                })?;

            let token = self.fetch_token(&image, &challenge)?;
            if let Ok(mut tokens) = self.tokens.lock() {
                tokens.insert(repository.to_string(), token.clone());
            }
            response = self.head_manifest(&image, &url, Some(&token))?;
        }

        let status = response.status();
        tracing::debug!(image = %image, status = status.as_u16(), "manifest lookup");

        match status {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(RegistryError::Request {
                image,
                message: format!("registry returned HTTP {}", s),
            }),
        }
    }
}
