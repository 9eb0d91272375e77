use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::api::AuthBackend;
use crate::db::{Cache, SETTINGS_KEY, TOKEN_KEY};
use crate::error::{ApiError, ErrorKind, Result};
use crate::models::{AuthResponse, User, UserSettings};
use crate::notify::Notifier;

/// Claims carried by the session token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    pub exp: usize,
}

impl Claims {
    pub fn is_expired(&self) -> bool {
        (self.exp as i64) <= Utc::now().timestamp()
    }
}

/// Reads the claims of a session token without checking its signature.
/// Only the server can verify the token; the client needs the user id and
/// expiry.
pub fn decode_claims(token: &str) -> Result<Claims> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;

    decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| ApiError::Unauthorized(format!("Invalid session token: {e}")))
}

#[derive(Debug, Clone)]
struct Session {
    claims: Claims,
    user: User,
}

pub struct AuthStore {
    backend: Arc<dyn AuthBackend>,
    cache: Option<Cache>,
    notifier: Notifier,
    session: RwLock<Option<Session>>,
    settings: RwLock<UserSettings>,
}

impl AuthStore {
    pub fn new(backend: Arc<dyn AuthBackend>, cache: Option<Cache>, notifier: Notifier) -> Self {
        Self {
            backend,
            cache,
            notifier,
            session: RwLock::new(None),
            settings: RwLock::new(UserSettings::default()),
        }
    }

    pub async fn current_user(&self) -> Option<User> {
        self.session.read().await.as_ref().map(|s| s.user.clone())
    }

    pub async fn claims(&self) -> Option<Claims> {
        self.session.read().await.as_ref().map(|s| s.claims.clone())
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session.read().await.is_some()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        if email.trim().is_empty() || password.is_empty() {
            let err = ApiError::Validation("Email and password are required".to_string());
            self.notifier.error("sign in", &err);
            return Err(err);
        }
        let response = match self.backend.login(email.trim(), password).await {
            Ok(response) => response,
            Err(err) => {
                self.notifier.error("sign in", &err);
                return Err(err);
            }
        };
        self.establish(response).await
    }

    pub async fn register(&self, email: &str, name: &str, password: &str) -> Result<User> {
        let problem = if email.is_empty() || !email.contains('@') {
            Some("Invalid email address")
        } else if name.trim().is_empty() {
            Some("Name is required")
        } else if password.len() < 8 {
            Some("Password must be at least 8 characters")
        } else {
            None
        };
        if let Some(problem) = problem {
            let err = ApiError::Validation(problem.to_string());
            self.notifier.error("register", &err);
            return Err(err);
        }

        let response = match self.backend.register(email, name.trim(), password).await {
            Ok(response) => response,
            Err(err) => {
                self.notifier.error("register", &err);
                return Err(err);
            }
        };
        self.establish(response).await
    }

    async fn establish(&self, response: AuthResponse) -> Result<User> {
        let claims = decode_claims(&response.token)?;
        self.backend.use_token(Some(&response.token)).await;
        if let Some(cache) = &self.cache {
            if let Err(err) = cache.put(TOKEN_KEY, &response.token).await {
                tracing::warn!(error = %err, "failed to cache session token");
            }
        }
        tracing::info!(user_id = %response.user.id, "signed in");
        *self.session.write().await = Some(Session {
            claims,
            user: response.user.clone(),
        });
        Ok(response.user)
    }

    /// Adopts an externally supplied token (e.g. from the environment).
    pub async fn adopt_token(&self, token: &str) -> Result<User> {
        let claims = decode_claims(token)?;
        if claims.is_expired() {
            return Err(ApiError::Unauthorized("Session token has expired".to_string()));
        }
        self.backend.use_token(Some(token)).await;
        let user = match self.backend.me().await {
            Ok(user) => user,
            Err(err) => {
                self.backend.use_token(None).await;
                return Err(err);
            }
        };
        if let Some(cache) = &self.cache {
            if let Err(err) = cache.put(TOKEN_KEY, token).await {
                tracing::warn!(error = %err, "failed to cache session token");
            }
        }
        *self.session.write().await = Some(Session {
            claims,
            user: user.clone(),
        });
        Ok(user)
    }

    /// Resumes the cached session, if there is one that has not expired and
    /// the server still accepts.
    pub async fn restore(&self) -> Result<Option<User>> {
        let Some(cache) = &self.cache else {
            return Ok(None);
        };
        let token = match cache.get(TOKEN_KEY).await {
            Ok(Some(token)) => token,
            Ok(None) => return Ok(None),
            Err(err) => {
                tracing::warn!(error = %err, "failed to read cached token");
                return Ok(None);
            }
        };

        match self.adopt_token(&token).await {
            Ok(user) => Ok(Some(user)),
            Err(err) if err.kind() == ErrorKind::Unauthorized => {
                tracing::info!("cached session is no longer valid");
                self.logout().await;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Ends the session and forgets every piece of session state.
    pub async fn logout(&self) {
        self.backend.use_token(None).await;
        if let Some(cache) = &self.cache {
            if let Err(err) = cache.delete(TOKEN_KEY).await {
                tracing::warn!(error = %err, "failed to clear cached token");
            }
        }
        *self.session.write().await = None;
        *self.settings.write().await = UserSettings::default();
    }

    pub async fn settings(&self) -> UserSettings {
        self.settings.read().await.clone()
    }

    /// Fetches the user's settings. When the API is unreachable the last
    /// cached copy is used instead; other failures keep the current value.
    pub async fn load_settings(&self) -> UserSettings {
        match self.backend.settings().await {
            Ok(settings) => {
                if let Some(cache) = &self.cache {
                    cache.put_json(SETTINGS_KEY, &settings).await;
                }
                *self.settings.write().await = settings.clone();
                settings
            }
            Err(err) if err.is_transient() => {
                tracing::warn!(error = %err, "settings unavailable, using cached copy");
                let cached = match &self.cache {
                    Some(cache) => cache.get_json::<UserSettings>(SETTINGS_KEY).await,
                    None => None,
                };
                let mut settings = self.settings.write().await;
                if let Some(cached) = cached {
                    *settings = cached;
                }
                settings.clone()
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to fetch settings");
                self.settings.read().await.clone()
            }
        }
    }

    pub async fn update_settings(&self, next: UserSettings) -> Result<UserSettings> {
        let previous = std::mem::replace(&mut *self.settings.write().await, next.clone());

        match self.backend.update_settings(&next).await {
            Ok(saved) => {
                if let Some(cache) = &self.cache {
                    cache.put_json(SETTINGS_KEY, &saved).await;
                }
                *self.settings.write().await = saved.clone();
                Ok(saved)
            }
            Err(err) => {
                *self.settings.write().await = previous;
                self.notifier.error("save settings", &err);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Column, UserSettings};
    use crate::store::testing::{token_for, MockAuth};

    fn settings_with(column: &str) -> UserSettings {
        UserSettings {
            custom_columns: vec![Column {
                id: column.into(),
                title: column.into(),
                color: None,
                order: 0,
            }],
            categories: vec![],
        }
    }

    #[test]
    fn claims_decode_without_the_secret() {
        let token = token_for("u1", 3600);
        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims.sub, "u1");
        assert!(!claims.is_expired());

        assert!(decode_claims(&token_for("u1", -60)).unwrap().is_expired());
        assert_eq!(
            decode_claims("garbage").unwrap_err().kind(),
            ErrorKind::Unauthorized
        );
    }

    #[test]
    fn claims_with_an_audience_still_decode() {
        use jsonwebtoken::{encode, EncodingKey, Header};

        let claims = serde_json::json!({
            "sub": "u1",
            "aud": "taskdeck",
            "exp": Utc::now().timestamp() + 3600,
        });
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"k")).unwrap();
        assert_eq!(decode_claims(&token).unwrap().sub, "u1");
    }

    #[tokio::test]
    async fn login_installs_token_and_caches_it() {
        let cache = Cache::open("sqlite::memory:").await.unwrap();
        let mock = Arc::new(MockAuth::new("u1"));
        let auth = AuthStore::new(mock.clone(), Some(cache.clone()), Notifier::new());

        let user = auth.login("u1@example.com", "secret").await.unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(auth.claims().await.unwrap().sub, "u1");
        assert!(mock.token().is_some());
        assert_eq!(cache.get(TOKEN_KEY).await.unwrap(), mock.token());

        auth.logout().await;
        assert!(mock.token().is_none());
        assert!(!auth.is_authenticated().await);
        assert_eq!(cache.get(TOKEN_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn register_validates_locally() {
        let mock = Arc::new(MockAuth::new("u1"));
        let auth = AuthStore::new(mock.clone(), None, Notifier::new());
        let err = auth.register("nope", "Name", "longenough").await.unwrap_err();
        assert_eq!(err.message(), "Invalid email address");
        let err = auth.register("a@b.c", "Name", "short").await.unwrap_err();
        assert_eq!(err.message(), "Password must be at least 8 characters");
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn expired_cached_token_is_discarded() {
        let cache = Cache::open("sqlite::memory:").await.unwrap();
        cache.put(TOKEN_KEY, &token_for("u1", -60)).await.unwrap();
        let auth = AuthStore::new(Arc::new(MockAuth::new("u1")), Some(cache.clone()), Notifier::new());

        assert_eq!(auth.restore().await.unwrap(), None);
        assert_eq!(cache.get(TOKEN_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn valid_cached_token_restores_session() {
        let cache = Cache::open("sqlite::memory:").await.unwrap();
        cache.put(TOKEN_KEY, &token_for("u1", 3600)).await.unwrap();
        let auth = AuthStore::new(Arc::new(MockAuth::new("u1")), Some(cache), Notifier::new());

        let user = auth.restore().await.unwrap().unwrap();
        assert_eq!(user.id, "u1");
        assert!(auth.is_authenticated().await);
    }

    #[tokio::test]
    async fn settings_fall_back_to_cache_when_offline() {
        let cache = Cache::open("sqlite::memory:").await.unwrap();
        let mock = Arc::new(MockAuth::new("u1"));
        mock.set_settings(settings_with("blocked"));
        let auth = AuthStore::new(mock.clone(), Some(cache), Notifier::new());

        assert_eq!(auth.load_settings().await, settings_with("blocked"));

        mock.set_settings(settings_with("other"));
        mock.fail_next(ApiError::Network("offline".into()));
        let fresh = AuthStore::new(mock.clone(), auth.cache.clone(), Notifier::new());
        assert_eq!(fresh.load_settings().await, settings_with("blocked"));
    }

    #[tokio::test]
    async fn failed_settings_update_rolls_back() {
        let mock = Arc::new(MockAuth::new("u1"));
        mock.set_settings(settings_with("a"));
        let auth = AuthStore::new(mock.clone(), None, Notifier::new());
        auth.load_settings().await;

        mock.fail_next(ApiError::Forbidden("no".into()));
        assert!(auth.update_settings(settings_with("b")).await.is_err());
        assert_eq!(auth.settings().await, settings_with("a"));
    }
}
