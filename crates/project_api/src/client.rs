use futures_util::future::{BoxFuture, FutureExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use workspace_protocol::{FileTree, ProjectRecord, ProjectStore, StoreError, UserId, UserRef};

use crate::config::ProjectApiConfig;
use crate::error::{parse_error_message, ProjectApiError};
use crate::headers::build_headers;
use crate::url::{endpoint, ADD_USER_PATH, ALL_USERS_PATH, GET_PROJECT_PATH, UPDATE_FILE_TREE_PATH};

#[derive(Debug, Clone)]
pub struct ProjectApiClient {
    http: Client,
    config: ProjectApiConfig,
}

#[derive(Debug, Deserialize)]
struct ProjectEnvelope {
    project: ProjectRecord,
}

#[derive(Debug, Deserialize)]
struct UsersEnvelope {
    #[serde(default)]
    users: Vec<UserRef>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateFileTreeBody<'a> {
    project_id: &'a str,
    file_tree: &'a FileTree,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AddUsersBody<'a> {
    project_id: &'a str,
    users: &'a [UserId],
}

impl ProjectApiClient {
    /// Builds a client. The base URL is validated up front so every later
    /// request builder only fails on per-request input.
    pub fn new(config: ProjectApiConfig) -> Result<Self, ProjectApiError> {
        endpoint::<&str>(&config.base_url, &[])?;

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(ProjectApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ProjectApiConfig {
        &self.config
    }

    pub fn build_headers(&self) -> Result<HeaderMap, ProjectApiError> {
        let mut out = HeaderMap::new();
        for (key, value) in build_headers(&self.config) {
            out.insert(
                HeaderName::from_bytes(key.as_bytes())
                    .map_err(|_| ProjectApiError::InvalidHeader(format!("invalid header key: {key}")))?,
                HeaderValue::from_str(&value)
                    .map_err(|_| ProjectApiError::InvalidHeader(format!("invalid header value for {key}")))?,
            );
        }
        Ok(out)
    }

    pub fn get_project_request(&self, project_id: &str) -> Result<RequestBuilder, ProjectApiError> {
        let mut segments: Vec<&str> = GET_PROJECT_PATH.to_vec();
        segments.push(project_id);
        let url = endpoint(&self.config.base_url, &segments)?;
        Ok(self.http.get(url).headers(self.build_headers()?))
    }

    pub fn update_file_tree_request(
        &self,
        project_id: &str,
        file_tree: &FileTree,
    ) -> Result<RequestBuilder, ProjectApiError> {
        let url = endpoint(&self.config.base_url, UPDATE_FILE_TREE_PATH)?;
        Ok(self
            .http
            .put(url)
            .headers(self.build_headers()?)
            .json(&UpdateFileTreeBody {
                project_id,
                file_tree,
            }))
    }

    pub fn add_users_request(
        &self,
        project_id: &str,
        users: &[UserId],
    ) -> Result<RequestBuilder, ProjectApiError> {
        let url = endpoint(&self.config.base_url, ADD_USER_PATH)?;
        Ok(self
            .http
            .put(url)
            .headers(self.build_headers()?)
            .json(&AddUsersBody { project_id, users }))
    }

    pub fn list_users_request(&self) -> Result<RequestBuilder, ProjectApiError> {
        let url = endpoint(&self.config.base_url, ALL_USERS_PATH)?;
        Ok(self.http.get(url).headers(self.build_headers()?))
    }

    pub async fn fetch_project(&self, project_id: &str) -> Result<ProjectRecord, ProjectApiError> {
        let response = send(self.get_project_request(project_id)?).await?;
        let envelope: ProjectEnvelope = decode(response).await?;
        Ok(envelope.project)
    }

    pub async fn put_file_tree(
        &self,
        project_id: &str,
        file_tree: &FileTree,
    ) -> Result<(), ProjectApiError> {
        send(self.update_file_tree_request(project_id, file_tree)?).await?;
        tracing::debug!(project_id, files = file_tree.len(), "file tree persisted");
        Ok(())
    }

    pub async fn put_users(&self, project_id: &str, users: &[UserId]) -> Result<(), ProjectApiError> {
        send(self.add_users_request(project_id, users)?).await?;
        tracing::debug!(project_id, added = users.len(), "collaborators added");
        Ok(())
    }

    pub async fn fetch_users(&self) -> Result<Vec<UserRef>, ProjectApiError> {
        let response = send(self.list_users_request()?).await?;
        let envelope: UsersEnvelope = decode(response).await?;
        Ok(envelope.users)
    }
}

async fn send(request: RequestBuilder) -> Result<Response, ProjectApiError> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = parse_error_message(status, &body);
    tracing::warn!(status = status.as_u16(), message = %message, "project API request failed");
    Err(ProjectApiError::Status(status, message))
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ProjectApiError> {
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

impl ProjectStore for ProjectApiClient {
    fn get_project(&self, project_id: &str) -> BoxFuture<'static, Result<ProjectRecord, StoreError>> {
        let client = self.clone();
        let project_id = project_id.to_string();
        async move { client.fetch_project(&project_id).await.map_err(StoreError::from) }.boxed()
    }

    fn update_file_tree(
        &self,
        project_id: &str,
        file_tree: FileTree,
    ) -> BoxFuture<'static, Result<(), StoreError>> {
        let client = self.clone();
        let project_id = project_id.to_string();
        async move {
            client
                .put_file_tree(&project_id, &file_tree)
                .await
                .map_err(StoreError::from)
        }
        .boxed()
    }

    fn add_users(
        &self,
        project_id: &str,
        users: Vec<UserId>,
    ) -> BoxFuture<'static, Result<(), StoreError>> {
        let client = self.clone();
        let project_id = project_id.to_string();
        async move { client.put_users(&project_id, &users).await.map_err(StoreError::from) }.boxed()
    }

    fn list_users(&self) -> BoxFuture<'static, Result<Vec<UserRef>, StoreError>> {
        let client = self.clone();
        async move { client.fetch_users().await.map_err(StoreError::from) }.boxed()
    }
}
