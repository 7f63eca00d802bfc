//! Blocking HTTP client for a remote agent

use super::protocol::{
    GetRequest, GetResponse, ScanRequest, ScanResponse, TeardownRequest, TeardownResponse,
    GET_PATH, SCAN_PATH, TEARDOWN_PATH,
};
use crate::types::{FileRecord, SyncError};
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

pub struct RemoteClient {
    http: Client,
    server: String,
}

impl RemoteClient {
    /// `server` is `host[:port]`
    pub fn new(server: &str, timeout: Duration) -> Result<Self, SyncError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            server: server.to_string(),
        })
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    fn post<Req, Resp>(&self, phase: &'static str, path: &str, body: &Req) -> Result<Resp, SyncError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let url = format!("http://{}{}", self.server, path);
        debug!(server = %self.server, phase, "Calling remote agent");

        let response = self.http.post(&url).json(body).send()?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(SyncError::Remote {
                server: self.server.clone(),
                phase,
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json()?)
    }

    pub fn scan(&self, request: &ScanRequest) -> Result<ScanResponse, SyncError> {
        self.post("scan", SCAN_PATH, request)
    }

    pub fn get(&self, request: &GetRequest) -> Result<Vec<FileRecord>, SyncError> {
        let response: GetResponse = self.post("get", GET_PATH, request)?;
        Ok(response.files)
    }

    pub fn teardown(&self, request: &TeardownRequest) -> Result<TeardownResponse, SyncError> {
        self.post("teardown", TEARDOWN_PATH, request)
    }
}
