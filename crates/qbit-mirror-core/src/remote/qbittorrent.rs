//! Blocking client for the qBittorrent WebUI API (v2).
//!
//! The session cookie (`SID`) handed out by `/auth/login` is kept in the
//! client's cookie store, so every later call is authenticated.

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, Response};
use reqwest::header::REFERER;
use reqwest::StatusCode;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, trace};

use super::{AddOptions, AddStatus, Category, Item, RemoteEndpoint, StateFilter};
use crate::config::EndpointConfig;
use crate::error::RemoteError;

const OK_BODY: &str = "Ok.";

pub struct QbitClient {
    label: String,
    base_url: String,
    client: Client,
}

impl std::fmt::Debug for QbitClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QbitClient")
            .field("label", &self.label)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl QbitClient {
    pub fn new(
        label: &str,
        endpoint: &EndpointConfig,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let mut builder = Client::builder().cookie_store(true).timeout(timeout);
        if !endpoint.verify_ssl {
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            label: label.to_string(),
            base_url: endpoint.base_url(),
            client: builder.build()?,
        })
    }

    /// Build a client and authenticate with the endpoint's credentials.
    pub fn connect(
        label: &str,
        endpoint: &EndpointConfig,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let client = Self::new(label, endpoint, timeout)?;
        client.login(&endpoint.username, &endpoint.password)?;
        Ok(client)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn login(&self, username: &str, password: &str) -> Result<(), RemoteError> {
        let response = self
            .client
            .post(self.url("/api/v2/auth/login"))
            .header(REFERER, &self.base_url)
            .form(&[("username", username), ("password", password)])
            .send()?;

        if response.status() == StatusCode::FORBIDDEN {
            return Err(RemoteError::AuthRejected(self.label.clone()));
        }
        let response = self.check("/api/v2/auth/login", response)?;
        if response.text()?.trim() != OK_BODY {
            return Err(RemoteError::AuthRejected(self.label.clone()));
        }

        debug!("Authenticated against {} ({})", self.label, self.base_url);
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn check(&self, path: &str, response: Response) -> Result<Response, RemoteError> {
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status {
                endpoint: self.label.clone(),
                path: path.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Response, RemoteError> {
        trace!("GET {} {}{}", self.label, path, describe_query(query));
        let response = self.client.get(self.url(path)).query(query).send()?;
        self.check(path, response)
    }

    fn post_form(&self, path: &str, form: &[(&str, String)]) -> Result<Response, RemoteError> {
        trace!("POST {} {}", self.label, path);
        let response = self.client.post(self.url(path)).form(form).send()?;
        self.check(path, response)
    }

    fn fetch_items(&self, query: &[(&str, String)]) -> Result<Vec<Item>, RemoteError> {
        let body = self.get("/api/v2/torrents/info", query)?.text()?;
        Ok(serde_json::from_str(&body)?)
    }
}

fn join_ids(ids: &[&str]) -> String {
    ids.join("|")
}

fn flag(value: bool) -> String {
    value.to_string()
}

fn describe_query(query: &[(&str, String)]) -> String {
    if query.is_empty() {
        return String::new();
    }
    let pairs: Vec<String> = query.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("?{}", pairs.join("&"))
}

impl RemoteEndpoint for QbitClient {
    fn label(&self) -> &str {
        &self.label
    }

    fn version(&self) -> Result<String, RemoteError> {
        Ok(self.get("/api/v2/app/version", &[])?.text()?.trim().to_string())
    }

    fn list(&self, filter: Option<StateFilter>) -> Result<Vec<Item>, RemoteError> {
        let query: Vec<(&str, String)> = filter
            .map(|f| vec![("filter", f.as_query().to_string())])
            .unwrap_or_default();
        self.fetch_items(&query)
    }

    fn list_by_ids(&self, ids: &[&str]) -> Result<Vec<Item>, RemoteError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.fetch_items(&[("hashes", join_ids(ids))])
    }

    fn export(&self, id: &str) -> Result<Vec<u8>, RemoteError> {
        let response = self.get("/api/v2/torrents/export", &[("hash", id.to_string())])?;
        Ok(response.bytes()?.to_vec())
    }

    fn add(&self, blob: &[u8], options: &AddOptions) -> Result<AddStatus, RemoteError> {
        let part = Part::bytes(blob.to_vec())
            .file_name("item.torrent")
            .mime_str("application/x-bittorrent")?;

        // qBittorrent 5 renamed `paused` to `stopped`; older servers ignore the unknown field.
        let form = Form::new()
            .part("torrents", part)
            .text("savepath", options.save_path.clone())
            .text("category", options.category.clone())
            .text("tags", options.tags.clone())
            .text("skip_checking", flag(options.skip_checking))
            .text("paused", flag(options.paused))
            .text("stopped", flag(options.paused))
            .text("autoTMM", flag(options.auto_managed));

        let path = "/api/v2/torrents/add";
        trace!("POST {} {}", self.label, path);
        let response = self.client.post(self.url(path)).multipart(form).send()?;

        if response.status() == StatusCode::UNSUPPORTED_MEDIA_TYPE {
            return Ok(AddStatus::Rejected("torrent file is not valid".to_string()));
        }
        let body = self.check(path, response)?.text()?;
        let body = body.trim();
        if body == OK_BODY {
            Ok(AddStatus::Accepted)
        } else {
            Ok(AddStatus::Rejected(body.to_string()))
        }
    }

    fn delete(&self, ids: &[&str], delete_files: bool) -> Result<(), RemoteError> {
        self.post_form(
            "/api/v2/torrents/delete",
            &[("hashes", join_ids(ids)), ("deleteFiles", flag(delete_files))],
        )?;
        Ok(())
    }

    fn set_force_active(&self, ids: &[&str], enable: bool) -> Result<(), RemoteError> {
        self.post_form(
            "/api/v2/torrents/setForceStart",
            &[("hashes", join_ids(ids)), ("value", flag(enable))],
        )?;
        Ok(())
    }

    fn list_categories(&self) -> Result<BTreeMap<String, Category>, RemoteError> {
        let body = self.get("/api/v2/torrents/categories", &[])?.text()?;
        Ok(serde_json::from_str(&body)?)
    }

    fn create_category(&self, name: &str, save_path: &str) -> Result<(), RemoteError> {
        self.post_form(
            "/api/v2/torrents/createCategory",
            &[("category", name.to_string()), ("savePath", save_path.to_string())],
        )?;
        Ok(())
    }
}
