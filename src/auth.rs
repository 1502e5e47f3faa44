use dialoguer::{Input, Password, Select};
use thiserror::Error;
use tracing::debug;

use crate::api::{ApiClient, ApiError};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("prompt failed: {0}")]
    Prompt(#[from] dialoguer::Error),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("this account requires multi-factor login, use a token instead")]
    MfaRequired,
    #[error("login succeeded but no token was returned")]
    MissingToken,
}

#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// User token, or a bot token with its `Bot ` prefix.
    Token(String),
    Password { login: String, password: String },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Token(_) => f.write_str("Token(..)"),
            Credentials::Password { login, .. } => {
                f.debug_struct("Password").field("login", login).finish_non_exhaustive()
            }
        }
    }
}

/// Picks credentials from the command line, then the environment.
/// `None` means the user has to be asked.
pub fn resolve_credentials(
    username: Option<String>,
    password: Option<String>,
    token: Option<String>,
    args: &[String],
    env_token: Option<String>,
) -> Option<Credentials> {
    if let Some(token) = non_empty(token) {
        return Some(Credentials::Token(token));
    }
    if let (Some(login), Some(password)) = (non_empty(username), non_empty(password)) {
        return Some(Credentials::Password { login, password });
    }
    match args {
        [login, password] => {
            return Some(Credentials::Password {
                login: login.clone(),
                password: password.clone(),
            });
        }
        [token] => return Some(Credentials::Token(token.clone())),
        _ => {}
    }
    non_empty(env_token).map(Credentials::Token)
}

pub fn prompt_credentials() -> Result<Credentials, AuthError> {
    let options = ["Token", "Username and password"];
    let selection = Select::new()
        .with_prompt("Log in with")
        .items(&options)
        .default(0)
        .interact()?;

    if selection == 0 {
        let token: String = Password::new().with_prompt("Token").interact()?;
        return Ok(Credentials::Token(token.trim().to_string()));
    }
    let login: String = Input::new().with_prompt("Username").interact_text()?;
    let password: String = Password::new().with_prompt("Password").interact()?;
    Ok(Credentials::Password {
        login: login.trim().to_string(),
        password,
    })
}

/// Turns credentials into a token, exchanging a password when needed.
pub async fn login(api: &ApiClient, credentials: Credentials) -> Result<String, AuthError> {
    match credentials {
        Credentials::Token(token) => Ok(token),
        Credentials::Password { login, password } => {
            debug!(%login, "exchanging password for token");
            let result = api.login(&login, &password).await?;
            if result.mfa {
                return Err(AuthError::MfaRequired);
            }
            result
                .token
                .filter(|token| !token.is_empty())
                .ok_or(AuthError::MissingToken)
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
