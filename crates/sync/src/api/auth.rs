use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;

use super::{ApiClient, AuthBackend};
use crate::error::Result;
use crate::models::{AuthResponse, User, UserSettings};

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    email: &'a str,
    name: &'a str,
    password: &'a str,
}

#[async_trait]
impl AuthBackend for ApiClient {
    async fn use_token(&self, token: Option<&str>) {
        match token {
            Some(token) => self.set_token(token).await,
            None => self.clear_token().await,
        }
    }

    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse> {
        self.send_json(Method::POST, "/api/auth/login", &LoginRequest { email, password })
            .await
    }

    async fn register(&self, email: &str, name: &str, password: &str) -> Result<AuthResponse> {
        self.send_json(
            Method::POST,
            "/api/auth/register",
            &RegisterRequest {
                email,
                name,
                password,
            },
        )
        .await
    }

    async fn me(&self) -> Result<User> {
        self.get("/api/auth/me").await
    }

    async fn settings(&self) -> Result<UserSettings> {
        self.get("/api/auth/settings").await
    }

    async fn update_settings(&self, settings: &UserSettings) -> Result<UserSettings> {
        self.send_json(Method::PUT, "/api/auth/settings", settings)
            .await
    }
}
