//! Call configuration.

use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::time::Duration;

use crate::descriptor::Target;
use crate::error::{DispatchError, Result};

/// Request method. A closed set; new methods are added as variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CallMethod {
    #[default]
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl CallMethod {
    /// Whether repeating the request has no additional effect.
    pub fn is_idempotent(&self) -> bool {
        !matches!(self, Self::Post | Self::Patch)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for CallMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options applied uniformly to every attempt of a call.
///
/// Built once through [`CallConfigBuilder`] and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct CallConfig {
    method: CallMethod,
    user_agent: Option<String>,
    headers: HeaderMap,
    total_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    accept_status: RangeInclusive<u16>,
    abort_on_possibly_processed: bool,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            method: CallMethod::Get,
            user_agent: None,
            headers: HeaderMap::new(),
            total_timeout: None,
            connect_timeout: None,
            read_timeout: None,
            accept_status: 200..=299,
            abort_on_possibly_processed: false,
        }
    }
}

impl CallConfig {
    /// Create a new configuration builder.
    pub fn builder() -> CallConfigBuilder {
        CallConfigBuilder::default()
    }

    /// Shorthand for a configuration that only sets the method.
    pub fn for_method(method: CallMethod) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }

    pub fn method(&self) -> CallMethod {
        self.method
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn total_timeout(&self) -> Option<Duration> {
        self.total_timeout
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    pub fn accept_status(&self) -> &RangeInclusive<u16> {
        &self.accept_status
    }

    /// Check a response status against the acceptable range.
    pub fn accepts(&self, status: u16) -> bool {
        self.accept_status.contains(&status)
    }

    /// Whether failover stops at a possibly-processed failure of a
    /// non-idempotent method.
    pub fn abort_on_possibly_processed(&self) -> bool {
        self.abort_on_possibly_processed
    }

    /// Merge this configuration with a target's own timeouts.
    ///
    /// A target's timeout wins; unset ones fall back to this configuration.
    pub fn merged_for(&self, target: &Target) -> AttemptConfig {
        AttemptConfig {
            method: self.method,
            user_agent: self.user_agent.clone(),
            headers: self.headers.clone(),
            total_timeout: target.total_timeout().or(self.total_timeout),
            connect_timeout: target.connect_timeout().or(self.connect_timeout),
            read_timeout: target.read_timeout().or(self.read_timeout),
        }
    }
}

/// Builder for [`CallConfig`].
#[derive(Debug, Default)]
pub struct CallConfigBuilder {
    config: CallConfig,
    invalid_header: Option<String>,
}

impl CallConfigBuilder {
    /// Set the request method.
    pub fn method(mut self, method: CallMethod) -> Self {
        self.config.method = method;
        self
    }

    /// Set the user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(user_agent.into());
        self
    }

    /// Set a header, replacing any earlier value for the same name.
    ///
    /// Names compare case-insensitively.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        let name = name.as_ref();
        match (
            HeaderName::try_from(name),
            HeaderValue::try_from(value.as_ref()),
        ) {
            (Ok(name), Ok(value)) => {
                self.config.headers.insert(name, value);
            }
            _ => {
                self.invalid_header.get_or_insert_with(|| name.to_string());
            }
        }
        self
    }

    /// Set the default total timeout for targets that leave theirs unset.
    pub fn total_timeout(mut self, timeout: Duration) -> Self {
        self.config.total_timeout = Some(timeout);
        self
    }

    /// Set the default connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Set the default read timeout.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = Some(timeout);
        self
    }

    /// Set the range of status codes counted as success.
    pub fn accept_status(mut self, range: RangeInclusive<u16>) -> Self {
        self.config.accept_status = range;
        self
    }

    /// Stop failover at the first possibly-processed failure of a
    /// non-idempotent call.
    pub fn abort_on_possibly_processed(mut self, enable: bool) -> Self {
        self.config.abort_on_possibly_processed = enable;
        self
    }

    /// Freeze the configuration.
    pub fn build(self) -> Result<CallConfig> {
        if let Some(name) = self.invalid_header {
            return Err(DispatchError::InvalidHeader(name));
        }
        Ok(self.config)
    }
}

/// Configuration for one attempt against one target.
///
/// The timeouts are independent. `total_timeout` bounds the whole exchange.
/// `read_timeout` bounds each wait for data, so it never caps the total.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptConfig {
    pub method: CallMethod,
    pub user_agent: Option<String>,
    pub headers: HeaderMap,
    pub total_timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
}
