//! Operator identity models.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
    /// Field operator signed in through a physical access token.
    N1,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
            Role::N1 => "n1",
        }
    }

    /// Unknown roles degrade to the least privileged account kind.
    pub fn from_column(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("admin") => Role::Admin,
            Some("n1") => Role::N1,
            _ => Role::User,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccessFlags {
    pub readings: bool,
    pub hr: bool,
    pub export: bool,
    pub view: bool,
}

impl Default for AccessFlags {
    fn default() -> Self {
        Self {
            readings: true,
            hr: false,
            export: false,
            view: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SignInMethod {
    Password,
    AccessToken,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub role: Role,
    pub access: AccessFlags,
    pub method: SignInMethod,
}

impl CurrentUser {
    pub fn can_record_readings(&self) -> bool {
        match self.role {
            Role::Admin | Role::N1 => true,
            Role::User => self.access.readings,
        }
    }
}

/// Row of the `profiles` table. Flags are nullable in storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub access_readings: Option<bool>,
    pub access_hr: Option<bool>,
    pub export: Option<bool>,
    pub view: Option<bool>,
}

/// Row of the `access_tokens` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    pub id: String,
    pub token: String,
    pub description: String,
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_role_falls_back_to_user() {
        assert_eq!(Role::from_column(Some("admin")), Role::Admin);
        assert_eq!(Role::from_column(Some("superuser")), Role::User);
        assert_eq!(Role::from_column(None), Role::User);
    }

    #[test]
    fn plain_user_needs_readings_flag() {
        let mut user = CurrentUser {
            id: "u1".into(),
            display_name: "Ana".into(),
            email: None,
            role: Role::User,
            access: AccessFlags::default(),
            method: SignInMethod::Password,
        };
        assert!(user.can_record_readings());
        user.access.readings = false;
        assert!(!user.can_record_readings());
        user.role = Role::Admin;
        assert!(user.can_record_readings());
    }
}
