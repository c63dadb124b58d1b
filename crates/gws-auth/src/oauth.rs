//! Token endpoint client

use reqwest::Url;
use serde::Deserialize;

use gws_core::config::OAuthSettings;
use gws_core::{AuthError, Credential};

use crate::pkce::{Pkce, CHALLENGE_METHOD};

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// OAuth2 installed-application client
#[derive(Debug, Clone)]
pub struct OAuthClient {
    settings: OAuthSettings,
    http: reqwest::Client,
}

impl OAuthClient {
    /// Create a client; the client id must be configured
    pub fn new(settings: OAuthSettings) -> Result<Self, AuthError> {
        if settings.client_id.is_empty() {
            return Err(AuthError::NotConfigured(
                "oauth.client_id is empty".to_string(),
            ));
        }
        Ok(Self {
            settings,
            http: reqwest::Client::new(),
        })
    }

    /// Build the authorization URL the operator opens in the browser
    pub fn authorize_url(
        &self,
        redirect_uri: &str,
        pkce: &Pkce,
        state: &str,
    ) -> Result<Url, AuthError> {
        let scope = self.settings.scopes.join(" ");
        Url::parse_with_params(
            &self.settings.auth_url,
            &[
                ("client_id", self.settings.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("state", state),
                ("access_type", "offline"),
                ("code_challenge", pkce.challenge()),
                ("code_challenge_method", CHALLENGE_METHOD),
            ],
        )
        .map_err(|e| AuthError::NotConfigured(format!("invalid oauth.auth_url: {}", e)))
    }

    /// Exchange an authorization code plus the PKCE verifier for a credential
    pub async fn exchange_code(
        &self,
        code: &str,
        pkce: &Pkce,
        redirect_uri: &str,
    ) -> Result<Credential, AuthError> {
        let response = self
            .token_request(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("code_verifier", pkce.verifier()),
                ("redirect_uri", redirect_uri),
            ])
            .await?;

        Ok(Credential::new(
            response.access_token,
            response.refresh_token,
            response.expires_in,
        ))
    }

    /// Use the refresh grant.
    ///
    /// Keeps `refresh_token` when the response does not rotate it.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Credential, AuthError> {
        let response = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .await?;

        Ok(Credential::new(
            response.access_token,
            response
                .refresh_token
                .or_else(|| Some(refresh_token.to_string())),
            response.expires_in,
        ))
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenResponse, AuthError> {
        let mut form: Vec<(&str, &str)> = params.to_vec();
        form.push(("client_id", self.settings.client_id.as_str()));
        if !self.settings.client_secret.is_empty() {
            form.push(("client_secret", self.settings.client_secret.as_str()));
        }

        let response = self
            .http
            .post(&self.settings.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| AuthError::Http(format!("invalid token response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn client() -> OAuthClient {
        OAuthClient::new(OAuthSettings {
            client_id: "client-123".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_requires_client_id() {
        assert!(matches!(
            OAuthClient::new(OAuthSettings::default()),
            Err(AuthError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_authorize_url_carries_pkce() {
        let pkce = Pkce::generate();
        let url = client()
            .authorize_url("http://localhost:5000/callback", &pkce, "xyz")
            .unwrap();

        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(query["code_challenge"], pkce.challenge());
        assert_eq!(query["code_challenge_method"], "S256");
        assert_eq!(query["redirect_uri"], "http://localhost:5000/callback");
        assert_eq!(query["state"], "xyz");
        assert_eq!(query["access_type"], "offline");
        assert!(query["scope"].contains("cloud-platform"));
    }
}
