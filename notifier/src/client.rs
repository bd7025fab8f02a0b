use crate::archive_stream::ArchiveStream;
use crate::config::Instance;
use crate::errors::DispatchError;
use crate::metadata::CategoryMetadata;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;

pub const API_KEY_HEADER: &str = "themis-api-key";

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("could not encode metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

impl From<ClientError> for DispatchError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::ReqwestError(e) => DispatchError::Transport(e),
            ClientError::Metadata(e) => DispatchError::Task(e.to_string()),
        }
    }
}

/// Raw outcome of a request that reached the service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceResponse {
    pub status: u16,
    pub body: String,
}

impl ServiceResponse {
    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::OK.as_u16()
    }

    /// The `dataDisplayed` summary of a successful response, when present.
    pub fn data_displayed(&self) -> Option<String> {
        #[derive(Deserialize)]
        struct Summary {
            #[serde(rename = "dataDisplayed")]
            data_displayed: serde_json::Value,
        }

        let summary: Summary = serde_json::from_str(&self.body).ok()?;
        match summary.data_displayed {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

/// Outcome of probing an instance's connection endpoint.
#[derive(Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    Ok,
    AuthenticationError,
    UnexpectedStatus(u16),
    NoConnection,
    Error(String),
}

/// HTTP client bound to one service instance.
#[derive(Clone)]
pub struct ServiceClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ServiceClient {
    pub fn new(instance: &Instance, timeout: Option<Duration>) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(ServiceClient {
            client: builder.build()?,
            base_url: instance.url.as_str().trim_end_matches('/').to_string(),
            api_key: instance.api_key.clone(),
        })
    }

    fn endpoint(&self, path: &str, key: &str) -> String {
        format!("{}/api/{}/{}", self.base_url, path, key)
    }

    /// Stream one category's archive to the service as a multipart upload.
    ///
    /// `archive` is consumed as the body of the `archive` part; the request
    /// fails if the stream yields an error.
    pub async fn upload_report(
        &self,
        source_key: &str,
        metadata: &CategoryMetadata,
        archive: ArchiveStream,
    ) -> Result<ServiceResponse, ClientError> {
        let archive_part = Part::stream(reqwest::Body::wrap_stream(archive))
            .file_name("archive.zip")
            .mime_str("application/zip")?;
        let metadata_part = Part::text(metadata.to_json()?).mime_str("application/json")?;
        let form = Form::new()
            .part("archive", archive_part)
            .part("metadata", metadata_part);

        let response = self
            .client
            .post(self.endpoint("reportFiles", source_key))
            .header(API_KEY_HEADER, &self.api_key)
            .multipart(form)
            .send()
            .await?;

        collect(response).await
    }

    pub async fn refresh_project(&self, project_key: &str) -> Result<ServiceResponse, ClientError> {
        let response = self
            .client
            .get(self.endpoint("refreshProject", project_key))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;

        collect(response).await
    }

    pub async fn test_connection(&self) -> ConnectionStatus {
        let result = self
            .client
            .get(format!("{}/api/testConnection", self.base_url))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await;

        match result {
            // Older services have no test endpoint and answer 404.
            Ok(response) => match response.status() {
                StatusCode::OK | StatusCode::NOT_FOUND => ConnectionStatus::Ok,
                StatusCode::UNAUTHORIZED
                | StatusCode::FORBIDDEN
                | StatusCode::INTERNAL_SERVER_ERROR => ConnectionStatus::AuthenticationError,
                status => ConnectionStatus::UnexpectedStatus(status.as_u16()),
            },
            Err(e) if e.is_connect() => ConnectionStatus::NoConnection,
            Err(e) => ConnectionStatus::Error(e.to_string()),
        }
    }
}

async fn collect(response: reqwest::Response) -> Result<ServiceResponse, ClientError> {
    let status = response.status().as_u16();
    let body = response.text().await?;
    Ok(ServiceResponse { status, body })
}
