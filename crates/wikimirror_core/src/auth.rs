use serde::Deserialize;
use tracing::info;

use crate::client::ApiTransport;
use crate::config::Credentials;
use crate::error::{MirrorError, Result};

/// An authenticated connection to one wiki. The transport carries the
/// session cookies, so every request made through it is made as the
/// logged-in user. There is no refresh: if the wiki drops the session
/// mid-run, later requests fail.
#[derive(Debug)]
pub struct Session<T> {
    transport: T,
    username: String,
}

impl<T: ApiTransport> Session<T> {
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

/// Fetch a login token, then submit it with the credentials. Only a
/// `Success` result yields a session.
pub fn authenticate<T: ApiTransport>(transport: T, credentials: &Credentials) -> Result<Session<T>> {
    info!(username = %credentials.username, "logging in to MediaWiki");
    let token_response = transport.get(&[
        ("action", "query".to_string()),
        ("meta", "tokens".to_string()),
        ("type", "login".to_string()),
    ])?;
    let token_payload: TokenQueryResponse =
        serde_json::from_value(token_response).map_err(|source| MirrorError::Decode {
            what: "login token",
            source,
        })?;
    let login_token = token_payload
        .query
        .tokens
        .and_then(|tokens| tokens.logintoken)
        .ok_or_else(|| MirrorError::Auth {
            reason: "wiki did not return a login token".to_string(),
        })?;

    let login_response = transport.post(&[
        ("action", "login".to_string()),
        ("lgname", credentials.username.clone()),
        ("lgpassword", credentials.password.clone()),
        ("lgtoken", login_token),
    ])?;
    let login_payload: LoginResponse =
        serde_json::from_value(login_response).map_err(|source| MirrorError::Decode {
            what: "login",
            source,
        })?;

    match login_payload.login.result.as_deref() {
        Some("Success") => {
            info!(username = %credentials.username, "login successful");
            Ok(Session {
                transport,
                username: credentials.username.clone(),
            })
        }
        other => Err(MirrorError::Auth {
            reason: login_payload
                .login
                .reason
                .or_else(|| other.map(ToString::to_string))
                .unwrap_or_else(|| "unknown error".to_string()),
        }),
    }
}

#[derive(Debug, Deserialize, Default)]
struct TokenQueryResponse {
    #[serde(default)]
    query: TokenQueryPayload,
}

#[derive(Debug, Deserialize, Default)]
struct TokenQueryPayload {
    tokens: Option<TokenPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct TokenPayload {
    logintoken: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct LoginResponse {
    #[serde(default)]
    login: LoginPayload,
}

#[derive(Debug, Deserialize, Default)]
struct LoginPayload {
    result: Option<String>,
    reason: Option<String>,
}
