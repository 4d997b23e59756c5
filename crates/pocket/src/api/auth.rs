//! Pocket OAuth handshake
//!
//! Pocket's flow has two calls: obtain a request token, send the user to the
//! authorize page, then exchange the request token for an access token.

use anyhow::{Context, Result};

use super::api::{AuthorizeResponse, RequestTokenResponse};

/// Access token and account name returned by a completed handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrant {
    pub access_token: String,
    pub username: String,
}

/// Request-token / authorize handshake for a consumer key
pub struct PocketAuth {
    consumer_key: String,
}

impl PocketAuth {
    const REQUEST_URL: &'static str = "https://getpocket.com/v3/oauth/request";
    const AUTHORIZE_URL: &'static str = "https://getpocket.com/v3/oauth/authorize";
    const USER_AUTHORIZE_URL: &'static str = "https://getpocket.com/auth/authorize";

    /// Consumer key registered for this application
    pub const DEFAULT_CONSUMER_KEY: &'static str = "87988-a6fd295a556dbdb47960ec60";

    /// Where Pocket sends the user after they approve the application
    pub const REDIRECT_URI: &'static str = "https://getpocket.com/connected_applications";

    pub fn new(consumer_key: impl Into<String>) -> Self {
        Self {
            consumer_key: consumer_key.into(),
        }
    }

    pub fn consumer_key(&self) -> &str {
        &self.consumer_key
    }

    /// Obtain a request token to be approved by the user
    pub fn request_token(&self) -> Result<String> {
        let mut response = ureq::post(Self::REQUEST_URL)
            .header("X-Accept", "application/json")
            .send_form([
                ("consumer_key", self.consumer_key.as_str()),
                ("redirect_uri", Self::REDIRECT_URI),
            ])
            .context("Failed to request a Pocket request token")?;

        let token: RequestTokenResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse request token response")?;

        Ok(token.code)
    }

    /// Page the user visits to approve `request_token`
    pub fn authorize_url(&self, request_token: &str) -> String {
        format!(
            "{}?request_token={}&redirect_uri={}",
            Self::USER_AUTHORIZE_URL,
            urlencoding::encode(request_token),
            urlencoding::encode(Self::REDIRECT_URI),
        )
    }

    /// Open the authorize page in the default browser
    ///
    /// Failure is not an error; the caller prints the URL either way.
    pub fn open_in_browser(&self, request_token: &str) -> bool {
        open::that(self.authorize_url(request_token)).is_ok()
    }

    /// Exchange an approved request token for an access token
    pub fn authorize(&self, request_token: &str) -> Result<AccessGrant> {
        let mut response = ureq::post(Self::AUTHORIZE_URL)
            .header("X-Accept", "application/json")
            .send_form([
                ("consumer_key", self.consumer_key.as_str()),
                ("code", request_token),
            ])
            .context("Failed to exchange request token")?;

        let grant: AuthorizeResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse authorize response")?;

        Ok(AccessGrant {
            access_token: grant.access_token,
            username: grant.username,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorize_url_encodes_parameters() {
        let auth = PocketAuth::new("1234-abcd");
        let url = auth.authorize_url("dcba4321-dcba-4321");

        assert!(url.starts_with("https://getpocket.com/auth/authorize?request_token=dcba4321-dcba-4321"));
        assert!(url.ends_with("redirect_uri=https%3A%2F%2Fgetpocket.com%2Fconnected_applications"));
    }
}
