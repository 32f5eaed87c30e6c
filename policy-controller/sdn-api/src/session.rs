use crate::{
    types::{AuthToken, RestError},
    Error,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::{header, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, trace};

/// Identity used to open a session against the SDN.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub organization: String,
}

/// An HTTP session against the SDN's JSON API.
///
/// Requests carry the organization and an `XREST` credential header; after
/// `authenticate` the password in the credential is replaced by the API key
/// the SDN hands back. Certificate verification is disabled by construction:
/// private-cluster management planes routinely present self-signed
/// certificates, and deployments opt into this tradeoff knowingly.
#[derive(Debug)]
pub(crate) struct Session {
    http: reqwest::Client,
    base: String,
    username: String,
    password: String,
    organization: String,
    authorization: String,
}

/// A decoded SDN response: the status, the (possibly empty) resource list,
/// and the error payload for non-2xx statuses.
#[derive(Debug)]
pub(crate) struct Reply<T> {
    pub status: StatusCode,
    body: Vec<T>,
    error: RestError,
}

// === impl Session ===

impl Session {
    pub fn new(url: &str, version: &str, creds: Credentials) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()?;
        let base = format!("{}/nuage/api/{}/", url.trim_end_matches('/'), version);
        let mut session = Self {
            http,
            base,
            username: creds.username,
            password: creds.password,
            organization: creds.organization,
            authorization: String::new(),
        };
        session.authorization = session.password_token();
        Ok(session)
    }

    fn password_token(&self) -> String {
        let token = BASE64.encode(format!("{}:{}", self.username, self.password));
        format!("XREST {}", token)
    }

    /// Exchanges the configured password for an API key.
    pub async fn authenticate(&mut self) -> Result<(), Error> {
        self.authorization = self.password_token();
        let reply = self.get::<AuthToken>("me", None).await?;
        if reply.status != StatusCode::OK {
            return Err(reply.unexpected());
        }
        let key = reply
            .first()
            .filter(|t| !t.api_key.is_empty())
            .ok_or(Error::NotFound { entity: "API key" })?;
        let token = BASE64.encode(format!("{}:{}", self.username, key.api_key));
        self.authorization = format!("XREST {}", token);
        debug!(username = %self.username, organization = %self.organization, "authenticated");
        Ok(())
    }

    /// Replaces the session identity and re-authenticates.
    pub async fn login(
        &mut self,
        username: &str,
        password: &str,
        organization: &str,
    ) -> Result<(), Error> {
        self.username = username.to_string();
        self.password = password.to_string();
        self.organization = organization.to_string();
        self.authenticate().await
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        filter: Option<&str>,
    ) -> Result<Reply<T>, Error> {
        let mut req = self.request(self.http.get(self.url(path)));
        if let Some(filter) = filter {
            trace!(%path, %filter, "filtered list");
            req = req.header("X-Nuage-Filter", filter);
        }
        Self::reply(req.send().await?).await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Reply<T>, Error> {
        let req = self.request(self.http.post(self.url(path))).json(body);
        Self::reply(req.send().await?).await
    }

    pub async fn put<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Reply<serde_json::Value>, Error> {
        let req = self.request(self.http.put(self.url(path))).json(body);
        Self::reply(req.send().await?).await
    }

    pub async fn delete(&self, path: &str) -> Result<Reply<serde_json::Value>, Error> {
        let req = self.request(self.http.delete(self.url(path)));
        Self::reply(req.send().await?).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn request(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header(header::CONTENT_TYPE, "application/json")
            .header("X-Nuage-Organization", self.organization.as_str())
            .header(header::AUTHORIZATION, self.authorization.as_str())
    }

    async fn reply<T: DeserializeOwned>(rsp: reqwest::Response) -> Result<Reply<T>, Error> {
        let status = rsp.status();
        let text = rsp.text().await?;
        if status.is_success() {
            let body = if text.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&text)?
            };
            return Ok(Reply {
                status,
                body,
                error: RestError::default(),
            });
        }

        trace!(%status, body = %text, "SDN error payload");
        let error = serde_json::from_str(&text).unwrap_or_default();
        Ok(Reply {
            status,
            body: Vec::new(),
            error,
        })
    }
}

// === impl Reply ===

impl<T> Reply<T> {
    /// The first record of a list response, if any.
    pub fn first(self) -> Option<T> {
        self.body.into_iter().next()
    }

    /// Converts a status the operation did not anticipate into an error.
    pub fn unexpected(self) -> Error {
        Error::UnexpectedStatus {
            status: self.status,
            message: self.error.summary(),
        }
    }
}
