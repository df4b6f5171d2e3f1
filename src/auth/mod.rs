//! Identity & Access.
//!
//! The reading workflow only needs the signed-in operator's display name and
//! whether they may record readings.

pub mod session;

use anyhow::{bail, Result};
use async_trait::async_trait;
use log::warn;

use crate::db::{AccessFlags, CurrentUser, Database, Profile, Role, SignInMethod};

pub use session::{SessionEstablisher, SessionState};

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `Ok(None)` when nobody is signed in.
    async fn current_user(&self) -> Result<Option<CurrentUser>>;
}

/// A user resolved once, e.g. after an access-token login.
pub struct StaticIdentity {
    user: Option<CurrentUser>,
}

impl StaticIdentity {
    pub fn new(user: Option<CurrentUser>) -> Self {
        Self { user }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_user(&self) -> Result<Option<CurrentUser>> {
        Ok(self.user.clone())
    }
}

/// Password-authenticated account whose role and flags live in `profiles`.
pub struct ProfileIdentity {
    db: Database,
    user_id: String,
    email: Option<String>,
}

impl ProfileIdentity {
    pub fn new(db: Database, user_id: String, email: Option<String>) -> Self {
        Self { db, user_id, email }
    }
}

#[async_trait]
impl IdentityProvider for ProfileIdentity {
    async fn current_user(&self) -> Result<Option<CurrentUser>> {
        let profile = match self.db.get_profile(&self.user_id).await {
            Ok(profile) => profile,
            Err(err) => {
                // A broken profile lookup still yields a basic account.
                warn!("Failed to load profile {}: {err:#}", self.user_id);
                None
            }
        };
        Ok(Some(user_from_profile(
            &self.user_id,
            self.email.as_deref(),
            profile.as_ref(),
        )))
    }
}

pub fn user_from_profile(user_id: &str, email: Option<&str>, profile: Option<&Profile>) -> CurrentUser {
    let defaults = AccessFlags::default();
    let email = profile
        .and_then(|p| p.email.clone())
        .or_else(|| email.map(str::to_string));
    let display_name = profile
        .and_then(|p| p.name.clone())
        .filter(|name| !name.trim().is_empty())
        .or_else(|| email.clone())
        .unwrap_or_else(|| user_id.to_string());

    CurrentUser {
        id: user_id.to_string(),
        display_name,
        email,
        role: Role::from_column(profile.and_then(|p| p.role.as_deref())),
        access: AccessFlags {
            readings: profile.and_then(|p| p.access_readings).unwrap_or(defaults.readings),
            hr: profile.and_then(|p| p.access_hr).unwrap_or(defaults.hr),
            export: profile.and_then(|p| p.export).unwrap_or(defaults.export),
            view: profile.and_then(|p| p.view).unwrap_or(defaults.view),
        },
        method: SignInMethod::Password,
    }
}

/// Sign in a field operator with a physical access token.
pub async fn login_with_access_token(db: &Database, token: &str) -> Result<CurrentUser> {
    let token = token.trim();
    if token.is_empty() {
        bail!("access token is empty");
    }
    let Some(found) = db.find_active_access_token(token).await? else {
        bail!("access token is invalid or inactive");
    };

    Ok(CurrentUser {
        id: found.id,
        display_name: found.description,
        email: None,
        role: Role::N1,
        access: AccessFlags::default(),
        method: SignInMethod::AccessToken,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_profile_yields_basic_user() {
        let user = user_from_profile("u1", Some("ana@example.com"), None);
        assert_eq!(user.display_name, "ana@example.com");
        assert_eq!(user.role, Role::User);
        assert!(user.access.readings);
        assert!(!user.access.hr);
    }

    #[test]
    fn profile_fields_override_defaults() {
        let profile = Profile {
            id: "u1".into(),
            name: Some("Ana Souza".into()),
            email: Some("ana@corp.example".into()),
            role: Some("admin".into()),
            access_readings: Some(false),
            access_hr: Some(true),
            export: None,
            view: Some(true),
        };
        let user = user_from_profile("u1", Some("old@example.com"), Some(&profile));
        assert_eq!(user.display_name, "Ana Souza");
        assert_eq!(user.email.as_deref(), Some("ana@corp.example"));
        assert_eq!(user.role, Role::Admin);
        assert!(!user.access.readings);
        assert!(user.access.hr);
        assert!(!user.access.export);
        assert!(user.access.view);
    }
}
