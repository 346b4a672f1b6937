//! Credential availability checks.

use crate::config::{api_key_from_env, API_KEY_ENV_VARS};
use crate::error::{CoverGenError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

/// Answers whether a usable API credential is currently selected.
#[async_trait]
pub trait CredentialGate: Send + Sync {
    /// Returns true if a credential is available for generation.
    async fn has_credential(&self) -> bool;

    /// Asks the user to select or provision a credential.
    async fn select_credential(&self) -> Result<()>;
}

/// Treats any configured API key environment variable as a selected credential.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentialGate;

#[async_trait]
impl CredentialGate for EnvCredentialGate {
    async fn has_credential(&self) -> bool {
        api_key_from_env().is_some()
    }

    async fn select_credential(&self) -> Result<()> {
        if api_key_from_env().is_some() {
            return Ok(());
        }
        Err(CoverGenError::Auth(format!(
            "no API key found; set one of {}",
            API_KEY_ENV_VARS.join(", ")
        )))
    }
}

/// A gate whose answer is set by the embedding application.
#[derive(Debug, Default)]
pub struct StaticCredentialGate {
    available: AtomicBool,
}

impl StaticCredentialGate {
    /// Creates a gate with a fixed initial answer.
    pub fn new(available: bool) -> Self {
        Self {
            available: AtomicBool::new(available),
        }
    }

    /// Changes the answer returned by later checks.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

#[async_trait]
impl CredentialGate for StaticCredentialGate {
    async fn has_credential(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn select_credential(&self) -> Result<()> {
        self.available.store(true, Ordering::SeqCst);
        Ok(())
    }
}
