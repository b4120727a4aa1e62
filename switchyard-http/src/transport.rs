//! `reqwest`-backed transport.

use async_trait::async_trait;
use http::header::{CONTENT_TYPE, HeaderValue, USER_AGENT};
use parking_lot::Mutex;
use reqwest::{Client, Method};
use std::collections::HashMap;
use std::time::Duration;
use switchyard_core::{
    AttemptConfig, CallMethod, CallRequest, RawResponse, Target, Transport, TransportError,
};
use tracing::{debug, trace};

use crate::{HttpTransportConfig, Result};

/// Connect and read timeouts a client was built with.
type ClientKey = (Option<Duration>, Option<Duration>);

/// Performs attempts over HTTP.
///
/// reqwest sets connect and read timeouts per client, so one client is kept
/// per distinct pair seen in attempt configurations. The total timeout is
/// applied per request.
pub struct HttpTransport {
    config: HttpTransportConfig,
    clients: Mutex<HashMap<ClientKey, Client>>,
}

impl HttpTransport {
    /// Create a transport with the given configuration.
    pub fn new(config: HttpTransportConfig) -> Result<Self> {
        let key = (config.connect_timeout, None);
        let default_client = build_client(&config, key)?;
        let mut clients = HashMap::new();
        clients.insert(key, default_client);

        Ok(Self {
            config,
            clients: Mutex::new(clients),
        })
    }

    /// Create a transport with default configuration.
    pub fn default_transport() -> Result<Self> {
        Self::new(HttpTransportConfig::default())
    }

    /// Get the transport configuration.
    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }

    fn client_for(
        &self,
        connect_timeout: Option<Duration>,
        read_timeout: Option<Duration>,
    ) -> std::result::Result<Client, TransportError> {
        let key = (connect_timeout.or(self.config.connect_timeout), read_timeout);
        let mut clients = self.clients.lock();
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        debug!(
            connect_timeout_ms = ?key.0.map(|d| d.as_millis()),
            read_timeout_ms = ?key.1.map(|d| d.as_millis()),
            "Building HTTP client"
        );
        let client = build_client(&self.config, key)
            .map_err(|e| TransportError::other(e.to_string()).untimed())?;
        clients.insert(key, client.clone());
        Ok(client)
    }
}

fn build_client(config: &HttpTransportConfig, (connect_timeout, read_timeout): ClientKey) -> Result<Client> {
    let mut builder = Client::builder()
        .pool_idle_timeout(config.pool_idle_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .user_agent(&config.user_agent)
        .gzip(config.gzip)
        .brotli(config.brotli);

    if let Some(timeout) = connect_timeout {
        builder = builder.connect_timeout(timeout);
    }
    if let Some(timeout) = read_timeout {
        builder = builder.read_timeout(timeout);
    }
    if config.follow_redirects {
        builder = builder.redirect(reqwest::redirect::Policy::limited(config.max_redirects));
    } else {
        builder = builder.redirect(reqwest::redirect::Policy::none());
    }

    Ok(builder.build()?)
}

/// Map a call method onto its HTTP verb.
pub fn http_method(method: CallMethod) -> Method {
    match method {
        CallMethod::Get => Method::GET,
        CallMethod::Head => Method::HEAD,
        CallMethod::Post => Method::POST,
        CallMethod::Put => Method::PUT,
        CallMethod::Patch => Method::PATCH,
        CallMethod::Delete => Method::DELETE,
        CallMethod::Options => Method::OPTIONS,
    }
}

/// Classify a reqwest failure.
///
/// A timeout while connecting means the request was never written, so it is
/// not possibly processed; any other timeout is.
pub fn classify(err: &reqwest::Error) -> TransportError {
    let message = err.to_string();
    if err.is_builder() {
        TransportError::other(message).untimed()
    } else if err.is_connect() && err.is_timeout() {
        TransportError::timed_out(message).not_processed()
    } else if err.is_connect() {
        TransportError::connection_refused(message)
    } else if err.is_timeout() {
        TransportError::timed_out(message)
    } else {
        TransportError::other(message)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn perform(
        &self,
        target: &Target,
        config: &AttemptConfig,
        request: &CallRequest,
    ) -> std::result::Result<RawResponse, TransportError> {
        let url = match request.path() {
            Some(path) => target
                .url()
                .join(path)
                .map_err(|e| TransportError::other(format!("invalid path '{}': {}", path, e)).untimed())?,
            None => target.url().clone(),
        };

        let client = self.client_for(config.connect_timeout, config.read_timeout)?;
        let mut builder = client
            .request(http_method(config.method), url)
            .headers(config.headers.clone());

        if let Some(agent) = &config.user_agent {
            let value = HeaderValue::from_str(agent)
                .map_err(|e| TransportError::other(format!("invalid user agent: {}", e)).untimed())?;
            builder = builder.header(USER_AGENT, value);
        }
        if let Some(content_type) = request.content_type() {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        if !request.body().is_empty() {
            builder = builder.body(request.body().clone());
        }
        if let Some(timeout) = config.total_timeout {
            builder = builder.timeout(timeout);
        }

        trace!(endpoint = %target, method = %config.method, "Sending HTTP request");
        let response = builder.send().await.map_err(|e| classify(&e))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| {
            // Headers already arrived, so the remote side has seen the request.
            classify(&e).maybe_processed()
        })?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_mapping() {
        assert_eq!(http_method(CallMethod::Get), Method::GET);
        assert_eq!(http_method(CallMethod::Post), Method::POST);
        assert_eq!(http_method(CallMethod::Options), Method::OPTIONS);
    }

    #[test]
    fn test_client_per_timeout_pair() {
        let transport = HttpTransport::default_transport().unwrap();
        let short = Some(Duration::from_millis(250));

        transport.client_for(None, None).unwrap();
        transport.client_for(short, None).unwrap();
        transport.client_for(short, None).unwrap();
        transport.client_for(short, short).unwrap();
        transport.client_for(None, short).unwrap();

        assert_eq!(transport.clients.lock().len(), 4);
    }
}
