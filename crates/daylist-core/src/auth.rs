use tracing::{debug, info, warn};

use crate::storage::KeyValueStore;

pub const PASSWORD_KEY: &str = "password";
pub const SESSION_KEY: &str = "isLoggedIn";
pub const DEFAULT_PASSWORD: &str = "password123";
pub const MIN_PASSWORD_LENGTH: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("wrong password")]
    WrongPassword,
    #[error("new password must be at least {min} characters")]
    TooShort { min: usize },
    #[error("password confirmation does not match")]
    ConfirmationMismatch,
    #[error("not logged in")]
    NotAuthenticated,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPolicy {
    pub default_password: String,
    pub min_length: usize,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            default_password: DEFAULT_PASSWORD.to_string(),
            min_length: MIN_PASSWORD_LENGTH,
        }
    }
}

/// Shared-password gate. The credential lives in the persistent store, the
/// logged-in flag in a session store that is dropped with the session.
///
/// Plain string comparison only; this gates the UI, it does not protect data.
#[derive(Debug)]
pub struct AuthGate<P, S> {
    credentials: P,
    session: S,
    policy: AuthPolicy,
}

impl<P: KeyValueStore, S: KeyValueStore> AuthGate<P, S> {
    pub fn new(credentials: P, session: S, policy: AuthPolicy) -> Self {
        Self {
            credentials,
            session,
            policy,
        }
    }

    #[tracing::instrument(skip_all)]
    pub fn login(&mut self, input: &str) -> Result<(), AuthError> {
        if input != self.credential()? {
            warn!("login rejected");
            return Err(AuthError::WrongPassword);
        }
        self.session.set_item(SESSION_KEY, "true")?;
        info!("logged in");
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub fn logout(&mut self) -> Result<(), AuthError> {
        self.session.remove_item(SESSION_KEY)?;
        info!("logged out");
        Ok(())
    }

    pub fn is_authenticated(&self) -> Result<bool, AuthError> {
        Ok(self.session.get_item(SESSION_KEY)?.as_deref() == Some("true"))
    }

    pub fn require(&self) -> Result<(), AuthError> {
        if self.is_authenticated()? {
            Ok(())
        } else {
            Err(AuthError::NotAuthenticated)
        }
    }

    /// Replaces the stored credential. Checks run in order: current
    /// password, minimum length, confirmation.
    #[tracing::instrument(skip_all)]
    pub fn change_password(
        &mut self,
        current: &str,
        new: &str,
        confirm: &str,
    ) -> Result<(), AuthError> {
        if current != self.credential()? {
            warn!("password change rejected: wrong current password");
            return Err(AuthError::WrongPassword);
        }
        if new.chars().count() < self.policy.min_length {
            return Err(AuthError::TooShort {
                min: self.policy.min_length,
            });
        }
        if new != confirm {
            return Err(AuthError::ConfirmationMismatch);
        }

        self.credentials.set_item(PASSWORD_KEY, new)?;
        info!("password changed");
        Ok(())
    }

    fn credential(&self) -> Result<String, AuthError> {
        match self.credentials.get_item(PASSWORD_KEY)? {
            Some(stored) => Ok(stored),
            None => {
                debug!("no stored password, using default");
                Ok(self.policy.default_password.clone())
            }
        }
    }
}
