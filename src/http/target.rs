//! The single upstream service requests are forwarded to.

use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::Uri;
use url::Url;

use crate::config::BackendConfig;
use crate::error::ProxyError;

/// Immutable scheme + host + port of the backend, fixed at construction.
#[derive(Debug, Clone)]
pub struct BackendTarget {
    url: Url,
    scheme: Scheme,
    authority: Authority,
}

impl BackendTarget {
    pub fn from_config(config: &BackendConfig) -> Result<Self, ProxyError> {
        if config.host.is_empty() {
            return Err(ProxyError::InvalidTarget("target host is required".into()));
        }
        if config.port == 0 {
            return Err(ProxyError::InvalidTarget("target port must be positive".into()));
        }

        let raw = format!("{}://{}:{}", config.scheme, config.host, config.port);
        let url = Url::parse(&raw).map_err(|e| ProxyError::InvalidTarget(format!("{}: {}", raw, e)))?;
        let scheme = Scheme::try_from(url.scheme())
            .map_err(|e| ProxyError::InvalidTarget(e.to_string()))?;
        let authority = Authority::try_from(format!("{}:{}", config.host, config.port).as_str())
            .map_err(|e| ProxyError::InvalidTarget(e.to_string()))?;

        Ok(Self {
            url,
            scheme,
            authority,
        })
    }

    /// Base URL of the backend, for diagnostics and metric labels.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Label used on every metric.
    pub fn label(&self) -> String {
        self.url.as_str().trim_end_matches('/').to_string()
    }

    /// Rebase the inbound path and query onto the backend.
    pub fn rewrite(&self, inbound: &Uri) -> Result<Uri, ProxyError> {
        let path_and_query = inbound
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));
        Ok(Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()?)
    }

    /// URI of a fixed path on the backend.
    pub fn uri_for(&self, path: &'static str) -> Result<Uri, ProxyError> {
        Ok(Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path)
            .build()?)
    }
}
