use std::path::Path;

use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;

use crate::model::{Channel, Guild, Member, Message, Role, User};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected status: {0}")]
    Status(u16),
    #[error("api error: {message} (code {code})")]
    Api { code: i64, message: String },
}

/// REST client for the chat platform. Every request carries the session
/// token once one is set.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    http: Client,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: Client::new(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub async fn login(&self, login: &str, password: &str) -> Result<LoginResult, ApiError> {
        let payload = json!({ "login": login, "password": password });
        self.send(self.request(Method::POST, "/auth/login").json(&payload))
            .await
    }

    pub async fn current_user(&self) -> Result<User, ApiError> {
        self.send(self.request(Method::GET, "/users/@me")).await
    }

    pub async fn guilds(&self) -> Result<Vec<Guild>, ApiError> {
        self.send(self.request(Method::GET, "/users/@me/guilds")).await
    }

    pub async fn guild(&self, guild_id: &str) -> Result<Guild, ApiError> {
        self.send(self.request(Method::GET, &format!("/guilds/{guild_id}")))
            .await
    }

    pub async fn guild_channels(&self, guild_id: &str) -> Result<Vec<Channel>, ApiError> {
        self.send(self.request(Method::GET, &format!("/guilds/{guild_id}/channels")))
            .await
    }

    pub async fn guild_roles(&self, guild_id: &str) -> Result<Vec<Role>, ApiError> {
        self.send(self.request(Method::GET, &format!("/guilds/{guild_id}/roles")))
            .await
    }

    pub async fn channel(&self, channel_id: &str) -> Result<Channel, ApiError> {
        self.send(self.request(Method::GET, &format!("/channels/{channel_id}")))
            .await
    }

    /// Newest first, as the platform returns them.
    pub async fn channel_messages(
        &self,
        channel_id: &str,
        limit: u32,
    ) -> Result<Vec<Message>, ApiError> {
        let request = self
            .request(Method::GET, &format!("/channels/{channel_id}/messages"))
            .query(&[("limit", limit.to_string())]);
        self.send(request).await
    }

    pub async fn send_message(&self, channel_id: &str, content: &str) -> Result<Message, ApiError> {
        let nonce = rand::random::<u64>().to_string();
        let payload = json!({ "content": content, "nonce": nonce });
        let request = self
            .request(Method::POST, &format!("/channels/{channel_id}/messages"))
            .json(&payload);
        self.send(request).await
    }

    pub async fn upload_file(&self, channel_id: &str, path: &Path) -> Result<Message, ApiError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let mut part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        if let Some(mime) = mime_guess::from_path(path).first() {
            part = part.mime_str(mime.essence_str())?;
        }
        let form = reqwest::multipart::Form::new().part("files[0]", part);
        let request = self
            .request(Method::POST, &format!("/channels/{channel_id}/messages"))
            .multipart(form);
        self.send(request).await
    }

    pub async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<Message, ApiError> {
        let payload = json!({ "content": content });
        let request = self
            .request(
                Method::PATCH,
                &format!("/channels/{channel_id}/messages/{message_id}"),
            )
            .json(&payload);
        self.send(request).await
    }

    pub async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), ApiError> {
        let request = self.request(
            Method::DELETE,
            &format!("/channels/{channel_id}/messages/{message_id}"),
        );
        self.send_empty(request).await
    }

    pub async fn guild_members(
        &self,
        guild_id: &str,
        after: &str,
        limit: u32,
    ) -> Result<Vec<Member>, ApiError> {
        let mut query = vec![("limit", limit.to_string())];
        if !after.is_empty() {
            query.push(("after", after.to_string()));
        }
        let request = self
            .request(Method::GET, &format!("/guilds/{guild_id}/members"))
            .query(&query);
        self.send(request).await
    }

    pub async fn guild_member(&self, guild_id: &str, user_id: &str) -> Result<Member, ApiError> {
        self.send(self.request(Method::GET, &format!("/guilds/{guild_id}/members/{user_id}")))
            .await
    }

    pub async fn add_member_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> Result<(), ApiError> {
        let path = format!("/guilds/{guild_id}/members/{user_id}/roles/{role_id}");
        self.send_empty(self.request(Method::PUT, &path)).await
    }

    pub async fn remove_member_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> Result<(), ApiError> {
        let path = format!("/guilds/{guild_id}/members/{user_id}/roles/{role_id}");
        self.send_empty(self.request(Method::DELETE, &path)).await
    }

    /// `user_id` may be `@me`. An empty nickname resets it.
    pub async fn set_member_nickname(
        &self,
        guild_id: &str,
        user_id: &str,
        nick: &str,
    ) -> Result<(), ApiError> {
        let nick = if nick.is_empty() { json!(null) } else { json!(nick) };
        let request = self
            .request(Method::PATCH, &format!("/guilds/{guild_id}/members/{user_id}"))
            .json(&json!({ "nick": nick }));
        self.send_empty(request).await
    }

    pub async fn update_username(&self, username: &str) -> Result<User, ApiError> {
        let request = self
            .request(Method::PATCH, "/users/@me")
            .json(&json!({ "username": username }));
        self.send(request).await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let request = self.http.request(method, url);
        match self.token.as_deref() {
            Some(token) => request.header(reqwest::header::AUTHORIZATION, token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = check_status(request.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn send_empty(&self, request: RequestBuilder) -> Result<(), ApiError> {
        check_status(request.send().await?).await?;
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(ErrorBody { code, message }) => Err(ApiError::Api { code, message }),
        Err(_) => Err(ApiError::Status(status.as_u16())),
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginResult {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub mfa: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: i64,
    message: String,
}
