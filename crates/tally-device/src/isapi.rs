//! ISAPI HTTP client.
//!
//! Password is passed in by the caller (resolved once from the environment);
//! never log it. Requests go out unauthenticated and answer the device's
//! `401` challenge once: HTTP digest, or basic when that is all it offers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use reqwest::{Method, Response, StatusCode};
use tally_schemas::DeviceIdentity;
use tracing::{info, warn};
use uuid::Uuid;

use crate::payload::{AcsEventCond, AcsEventQuery, AcsEventRecord, AcsEventResponse};
use crate::transport::{DeviceTransport, EventClass, TransportError};

/// Per-operation client settings.
#[derive(Debug, Clone, Copy)]
pub struct IsapiOptions {
    pub timeout: Duration,
    pub page_size: u32,
    /// Zone the device clock runs in; query bounds are rendered in it.
    pub device_tz: Tz,
}

impl Default for IsapiOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            page_size: 30,
            device_tz: Tz::UTC,
        }
    }
}

#[derive(Clone)]
pub struct IsapiClient {
    base_url: String,
    username: String,
    password: String,
    http: reqwest::Client,
    options: IsapiOptions,
}

impl std::fmt::Debug for IsapiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsapiClient")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("options", &self.options)
            .finish()
    }
}

impl IsapiClient {
    /// Client for `device` reached at `http://{address}:{port}`.
    pub fn for_device(
        device: &DeviceIdentity,
        password: &str,
        options: IsapiOptions,
    ) -> Result<Self, TransportError> {
        if device.address.trim().is_empty() || device.port == 0 {
            return Err(TransportError::Config(format!(
                "device '{}' has no address/port",
                device.name
            )));
        }
        if device.username.trim().is_empty() {
            return Err(TransportError::Config(format!(
                "device '{}' has no username",
                device.name
            )));
        }
        let base_url = format!("http://{}:{}", device.address.trim(), device.port);
        Self::new_with_base_url(base_url, &device.username, password, options)
    }

    pub fn new_with_base_url(
        base_url: String,
        username: &str,
        password: &str,
        options: IsapiOptions,
    ) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| TransportError::Config(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            http,
            options,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/ISAPI/{}", self.base_url, path)
    }

    /// Device-local rendering of a query bound.
    pub fn device_time(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.options.device_tz)
            .format("%Y-%m-%dT%H:%M:%S%:z")
            .to_string()
    }

    async fn fetch_page(
        &self,
        cond: AcsEventCond,
    ) -> Result<Vec<AcsEventRecord>, TransportError> {
        let body = serde_json::to_vec(&AcsEventQuery { cond })
            .map_err(|e| TransportError::Config(e.to_string()))?;
        let resp = self
            .send(Method::POST, "AccessControl/AcsEvent?format=json", Some(body))
            .await
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }
        let body: AcsEventResponse = resp
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        Ok(body.into_records())
    }

    /// Send `path`, answering one `401` challenge.
    ///
    /// Any other response, including a `401` with no usable challenge, is
    /// returned as is.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Response, reqwest::Error> {
        let url = self.url(path);
        let first = self.request(method.clone(), &url, body.as_deref()).send().await?;
        if first.status() != StatusCode::UNAUTHORIZED {
            return Ok(first);
        }
        let Some(challenge) = first
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
        else {
            return Ok(first);
        };

        let retry = self.request(method.clone(), &url, body.as_deref());
        let retry = match scheme(&challenge) {
            Some(Scheme::Digest) => {
                let target = &url[self.base_url.len()..];
                match self.digest_authorization(&challenge, &method, target, body.as_deref()) {
                    Ok(header) => retry.header(AUTHORIZATION, header),
                    Err(e) => {
                        warn!(base_url = %self.base_url, error = %e, "digest challenge rejected");
                        return Ok(first);
                    }
                }
            }
            Some(Scheme::Basic) => retry.basic_auth(&self.username, Some(&self.password)),
            None => return Ok(first),
        };
        retry.send().await
    }

    fn request(&self, method: Method, url: &str, body: Option<&[u8]>) -> reqwest::RequestBuilder {
        let req = self.http.request(method, url);
        match body {
            Some(b) => req.header(CONTENT_TYPE, "application/json").body(b.to_vec()),
            None => req,
        }
    }

    /// `Authorization` value answering a digest `challenge` for `target`
    /// (path and query).
    pub fn digest_authorization(
        &self,
        challenge: &str,
        method: &Method,
        target: &str,
        body: Option<&[u8]>,
    ) -> Result<String, digest_auth::Error> {
        let mut prompt = digest_auth::parse(challenge)?;
        let http_method = if *method == Method::POST {
            digest_auth::HttpMethod::POST
        } else {
            digest_auth::HttpMethod::GET
        };
        let context = digest_auth::AuthContext::new_with_method(
            self.username.as_str(),
            self.password.as_str(),
            target,
            body,
            http_method,
        );
        Ok(prompt.respond(&context)?.to_header_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scheme {
    Digest,
    Basic,
}

fn scheme(challenge: &str) -> Option<Scheme> {
    let name = challenge.trim_start().split_whitespace().next()?;
    if name.eq_ignore_ascii_case("digest") {
        Some(Scheme::Digest)
    } else if name.eq_ignore_ascii_case("basic") {
        Some(Scheme::Basic)
    } else {
        None
    }
}

#[async_trait::async_trait]
impl DeviceTransport for IsapiClient {
    async fn connect(&self) -> bool {
        let result = self.send(Method::GET, "System/deviceInfo", None).await;
        match result {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(base_url = %self.base_url, status = resp.status().as_u16(), "device connect refused");
                false
            }
            Err(e) => {
                warn!(base_url = %self.base_url, error = %e, "device connect failed");
                false
            }
        }
    }

    /// Pages by the fixed page size until an empty or short page. A failed
    /// first page is an error; a later failure keeps what was already read.
    async fn fetch_events(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        class: EventClass,
    ) -> Result<Vec<AcsEventRecord>, TransportError> {
        let limit = self.options.page_size.max(1);
        let search_id = Uuid::new_v4().simple().to_string();
        let start_time = self.device_time(from);
        let end_time = self.device_time(to);

        let mut position = 0u32;
        let mut events = Vec::new();
        loop {
            let cond = AcsEventCond {
                search_id: search_id.clone(),
                search_result_position: position,
                max_results: limit,
                major: class.major(),
                minor: class.minor(),
                start_time: start_time.clone(),
                end_time: end_time.clone(),
            };
            let page = match self.fetch_page(cond).await {
                Ok(page) => page,
                Err(e) if position == 0 => return Err(e),
                Err(e) => {
                    warn!(class = class.as_str(), position, error = %e, "event page failed; keeping earlier pages");
                    break;
                }
            };
            info!(class = class.as_str(), position, received = page.len(), "event page");

            let received = page.len();
            events.extend(page);
            if received < limit as usize {
                break;
            }
            position += limit;
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHALLENGE: &str = r#"Digest realm="IP Camera(C1234)", qop="auth", nonce="4e6a4d344e6a67784f6a41354f545535", opaque="", algorithm=MD5"#;

    fn client() -> IsapiClient {
        IsapiClient::new_with_base_url(
            "http://10.0.0.5:80".to_string(),
            "admin",
            "pw",
            IsapiOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn challenge_scheme_is_case_insensitive() {
        assert_eq!(scheme(CHALLENGE), Some(Scheme::Digest));
        assert_eq!(scheme("basic realm=\"x\""), Some(Scheme::Basic));
        assert_eq!(scheme("Bearer"), None);
        assert_eq!(scheme(""), None);
    }

    #[test]
    fn digest_answer_names_user_realm_and_target() {
        let header = client()
            .digest_authorization(CHALLENGE, &Method::GET, "/ISAPI/System/deviceInfo", None)
            .unwrap();
        assert!(header.starts_with("Digest "));
        assert!(header.contains(r#"username="admin""#));
        assert!(header.contains(r#"realm="IP Camera(C1234)""#));
        assert!(header.contains(r#"uri="/ISAPI/System/deviceInfo""#));
        assert!(header.contains("response="));
        assert!(!header.contains("pw"));
    }

    #[test]
    fn malformed_digest_challenge_is_an_error() {
        assert!(client()
            .digest_authorization("Digest", &Method::GET, "/ISAPI/System/deviceInfo", None)
            .is_err());
    }
}
