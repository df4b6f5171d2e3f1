use std::{sync::RwLock, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use log::{info, warn};
use serde::Serialize;

use crate::db::CurrentUser;

use super::IdentityProvider;

pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(5);

/// Establishment runs once. `Established`, `Anonymous` and `Failed` are
/// terminal; a failed session is never retried behind the caller's back.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", tag = "state", content = "detail")]
pub enum SessionState {
    Establishing,
    Established(CurrentUser),
    Anonymous,
    Failed(String),
}

pub struct SessionEstablisher {
    state: RwLock<SessionState>,
    timeout: Duration,
}

impl SessionEstablisher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: RwLock::new(SessionState::Establishing),
            timeout,
        }
    }

    pub fn state(&self) -> SessionState {
        match self.state.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn user(&self) -> Option<CurrentUser> {
        match self.state() {
            SessionState::Established(user) => Some(user),
            _ => None,
        }
    }

    pub async fn establish(&self, provider: &dyn IdentityProvider) -> SessionState {
        let current = self.state();
        if current != SessionState::Establishing {
            return current;
        }

        let next = match tokio::time::timeout(self.timeout, provider.current_user()).await {
            Ok(Ok(Some(user))) => {
                info!("Session established for {}", user.display_name);
                SessionState::Established(user)
            }
            Ok(Ok(None)) => SessionState::Anonymous,
            Ok(Err(err)) => {
                warn!("Session establishment failed: {err:#}");
                SessionState::Failed(format!("{err:#}"))
            }
            Err(_) => {
                warn!("Session establishment timed out after {:?}", self.timeout);
                SessionState::Failed(format!("timed out after {} ms", self.timeout.as_millis()))
            }
        };

        let mut guard = match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Another caller may have finished first; keep its result.
        if *guard == SessionState::Establishing {
            *guard = next;
        }
        guard.clone()
    }
}

/// Only an established session has an operator; anything else reads as
/// signed out.
#[async_trait]
impl IdentityProvider for SessionEstablisher {
    async fn current_user(&self) -> Result<Option<CurrentUser>> {
        Ok(self.user())
    }
}

impl Default for SessionEstablisher {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TIMEOUT)
    }
}
