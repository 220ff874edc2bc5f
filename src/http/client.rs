// src/http/client.rs

//! reqwest-backed portal sessions.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{RequestBuilder, Response, StatusCode, redirect};
use url::{Origin, Url};

use super::ntlm;
use super::{Method, PortalRequest, PortalResponse, PortalSession, SessionProvider};
use crate::error::{AppError, Result};
use crate::models::{AuthScheme, Credentials, HttpConfig};

/// Create a configured asynchronous HTTP client.
///
/// Redirects are not followed by the client so that every hop can be
/// inspected for login pages.
pub fn create_async_client(config: &HttpConfig) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9"),
    );

    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .default_headers(headers)
        .timeout(config.timeout())
        .cookie_store(true)
        .redirect(redirect::Policy::none())
        .build()?;
    Ok(client)
}

/// One cookie-carrying conversation with the portal for a single user.
pub struct HttpSession {
    client: reqwest::Client,
    username: String,
    password: String,
    auth: AuthScheme,
    max_redirects: usize,
}

impl HttpSession {
    pub fn new(config: &HttpConfig, username: String, password: String) -> Result<Self> {
        Ok(Self {
            client: create_async_client(config)?,
            username,
            password,
            auth: config.auth_scheme,
            max_redirects: config.max_redirects,
        })
    }

    fn request(&self, method: Method, url: &Url, request: &PortalRequest) -> RequestBuilder {
        let builder = match method {
            Method::Get => self.client.get(url.clone()),
            Method::Post => self.client.post(url.clone()).form(&request.form),
        };
        builder.timeout(request.timeout)
    }

    /// Sends one hop, authenticating it when it stays on the original origin.
    async fn send_hop(
        &self,
        method: Method,
        url: &Url,
        origin: &Origin,
        request: &PortalRequest,
    ) -> Result<Response> {
        if !carries_credentials(origin, url) {
            log::debug!("Withholding credentials from foreign origin {}", url);
            return Ok(self.request(method, url, request).send().await?);
        }

        match self.auth {
            AuthScheme::Basic => Ok(self
                .request(method, url, request)
                .basic_auth(&self.username, Some(&self.password))
                .send()
                .await?),
            AuthScheme::Ntlm => {
                let response = self.request(method, url, request).send().await?;
                if response.status() != StatusCode::UNAUTHORIZED
                    || !header_values(&response).any(ntlm::offers_ntlm)
                {
                    return Ok(response);
                }
                response.bytes().await?;
                self.ntlm_handshake(method, url, request).await
            }
        }
    }

    /// Negotiate, read the server challenge, then replay the request with
    /// the authenticate message. The exchange relies on the pooled
    /// connection staying open between the two legs.
    async fn ntlm_handshake(
        &self,
        method: Method,
        url: &Url,
        request: &PortalRequest,
    ) -> Result<Response> {
        log::debug!("NTLM handshake with {}", url);
        let negotiated = self
            .request(method, url, request)
            .header(header::AUTHORIZATION, ntlm::authorization(&ntlm::negotiate_message()))
            .send()
            .await?;

        let token = header_values(&negotiated)
            .find_map(ntlm::challenge_token)
            .ok_or_else(|| AppError::auth("server did not answer the NTLM negotiate message"))?;
        negotiated.bytes().await?;

        let challenge = ntlm::Challenge::parse(&token)?;
        let account = ntlm::Account::from_qualified(&self.username, &self.password);
        let message = ntlm::authenticate_message(
            &account,
            &challenge,
            rand::random(),
            challenge.timestamp().unwrap_or_else(ntlm::now_filetime),
        )?;

        Ok(self
            .request(method, url, request)
            .header(header::AUTHORIZATION, ntlm::authorization(&message))
            .send()
            .await?)
    }
}

fn header_values(response: &Response) -> impl Iterator<Item = &str> + '_ {
    response
        .headers()
        .get_all(header::WWW_AUTHENTICATE)
        .iter()
        .filter_map(|value| value.to_str().ok())
}

/// Credentials only go to the origin the request was addressed to.
fn carries_credentials(origin: &Origin, hop: &Url) -> bool {
    hop.origin() == *origin
}

fn is_downgrade(from: &Url, to: &Url) -> bool {
    from.scheme() == "https" && to.scheme() != "https"
}

#[async_trait]
impl PortalSession for HttpSession {
    async fn perform(&self, request: PortalRequest) -> Result<PortalResponse> {
        let mut history = Vec::new();
        let mut url = Url::parse(&request.url)?;
        let origin = url.origin();
        let mut method = request.method;

        loop {
            let response = self.send_hop(method, &url, &origin, &request).await?;

            let status = response.status();
            let location = response
                .headers()
                .get(header::LOCATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);

            if let (true, Some(location)) = (status.is_redirection(), location) {
                if history.len() >= self.max_redirects {
                    return Err(AppError::fetch(
                        url.to_string(),
                        format!("more than {} redirects", self.max_redirects),
                    ));
                }
                let next = url.join(&location)?;
                if is_downgrade(&url, &next) {
                    return Err(AppError::fetch(
                        url.to_string(),
                        format!("refusing redirect to insecure {next}"),
                    ));
                }
                log::debug!("Redirect {} -> {}", url, next);
                history.push(std::mem::replace(&mut url, next).to_string());

                if status != StatusCode::TEMPORARY_REDIRECT
                    && status != StatusCode::PERMANENT_REDIRECT
                {
                    method = Method::Get;
                }
                continue;
            }

            let final_url = response.url().to_string();
            let body = response.text().await?;
            return Ok(PortalResponse {
                status: status.as_u16(),
                body,
                final_url,
                history,
            });
        }
    }
}

/// Builds [`HttpSession`]s from the HTTP and portal settings.
pub struct HttpSessionProvider {
    http: HttpConfig,
    auth_domain: String,
}

impl HttpSessionProvider {
    pub fn new(http: HttpConfig, auth_domain: impl Into<String>) -> Self {
        Self {
            http,
            auth_domain: auth_domain.into(),
        }
    }
}

impl SessionProvider for HttpSessionProvider {
    fn create_session(&self, credentials: &Credentials) -> Result<Arc<dyn PortalSession>> {
        let username = credentials.qualified_username(&self.auth_domain);
        let session: Arc<dyn PortalSession> = Arc::new(HttpSession::new(
            &self.http,
            username,
            credentials.password.clone(),
        )?);
        Ok(session)
    }
}
