//! gws-auth: OAuth2 credential acquisition for gws
//!
//! [`CredentialBroker`] logs in with the Authorization Code + PKCE grant,
//! hands out access tokens that are refreshed transparently before they
//! expire, and persists every material change to a [`gws_core::TokenStore`].

mod broker;
mod callback;
mod oauth;
pub mod pkce;

pub use broker::{Browser, CredentialBroker, SystemBrowser, TokenSource, TOKEN_CHECK_INTERVAL};
pub use callback::CallbackServer;
pub use oauth::OAuthClient;
pub use pkce::Pkce;
