//! Admin-gated decryption: static credential plus delegated session keys.
//!
//! The credential and the issued key live in one shared key ring; each
//! caller holds its own [`AccessGateway`] over it.

use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{info, warn};

use crate::codec::{Codec, DecodeError};
use crate::model::Block;

/// Admin credential used when none is configured.
pub const DEFAULT_ADMIN_CREDENTIAL: &str = "ADMIN123";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GatewayState {
    Unauthenticated,
    AdminAuthenticated,
    KeyIssued,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("admin credential rejected")]
    AuthenticationFailure,
    #[error("not authorized to decrypt")]
    AuthorizationFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecryptError {
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Deployment-wide secrets: the admin credential and the one live session
/// key. Every caller gateway forked from the same root shares it.
struct KeyRing {
    admin_credential: String,
    session_key: Option<String>,
}

impl KeyRing {
    fn is_current(&self, candidate: &str) -> bool {
        self.session_key
            .as_deref()
            .is_some_and(|key| ct_eq_str(candidate, key))
    }
}

/// One caller's position in the access state machine. Admin state and key
/// authorization belong to the caller; the credential and the issued key
/// are shared through the key ring.
pub struct AccessGateway {
    keys: Arc<Mutex<KeyRing>>,
    state: GatewayState,
    /// The key this caller presented; only honored while it is still current.
    authorized_key: Option<String>,
}

impl std::fmt::Debug for AccessGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let key_issued = self.keys.lock().session_key.is_some();
        f.debug_struct("AccessGateway")
            .field("state", &self.state)
            .field("key_issued", &key_issued)
            .field("key_authorized", &self.key_authorized())
            .finish_non_exhaustive()
    }
}

impl AccessGateway {
    pub fn new(admin_credential: impl Into<String>) -> Self {
        Self {
            keys: Arc::new(Mutex::new(KeyRing {
                admin_credential: admin_credential.into(),
                session_key: None,
            })),
            state: GatewayState::Unauthenticated,
            authorized_key: None,
        }
    }

    /// A fresh, unauthenticated caller sharing this gateway's credential and
    /// issued key.
    pub fn caller(&self) -> AccessGateway {
        AccessGateway {
            keys: Arc::clone(&self.keys),
            state: GatewayState::Unauthenticated,
            authorized_key: None,
        }
    }

    pub fn state(&self) -> GatewayState {
        self.state
    }

    fn key_authorized(&self) -> bool {
        self.authorized_key
            .as_deref()
            .is_some_and(|key| self.keys.lock().is_current(key))
    }

    /// Admin authenticated, or the current session key was presented.
    pub fn can_decrypt(&self) -> bool {
        self.state != GatewayState::Unauthenticated || self.key_authorized()
    }

    pub fn authenticate_admin(&mut self, credential: &str) -> bool {
        if !ct_eq_str(credential, &self.keys.lock().admin_credential) {
            warn!("admin authentication failed");
            return false;
        }
        if self.state == GatewayState::Unauthenticated {
            self.state = GatewayState::AdminAuthenticated;
        }
        info!("admin authenticated");
        true
    }

    /// Generate a fresh key, replacing and invalidating any previous one.
    pub fn issue_key(&mut self) -> Result<String, AccessError> {
        if self.state == GatewayState::Unauthenticated {
            warn!("session key requested without admin authentication");
            return Err(AccessError::AuthorizationFailure);
        }
        let key = generate_session_key();
        self.keys.lock().session_key = Some(key.clone());
        self.authorized_key = None;
        self.state = GatewayState::KeyIssued;
        info!("session key issued");
        Ok(key)
    }

    pub fn authorize_with_key(&mut self, candidate: &str) -> bool {
        let ok = self.keys.lock().is_current(candidate);
        if ok {
            self.authorized_key = Some(candidate.to_string());
            info!("session key accepted");
        } else {
            warn!("session key rejected");
        }
        ok
    }

    pub fn decrypt_payload(&self, block: &Block, codec: &Codec) -> Result<String, DecryptError> {
        if !self.can_decrypt() {
            return Err(AccessError::AuthorizationFailure.into());
        }
        Ok(codec.decode(block.payload())?)
    }

    /// Back to `Unauthenticated`. An admin signing out also revokes the
    /// issued key for every caller.
    pub fn sign_out(&mut self) {
        if self.state != GatewayState::Unauthenticated {
            self.keys.lock().session_key = None;
        }
        self.state = GatewayState::Unauthenticated;
        self.authorized_key = None;
    }
}

/// 32 bytes from the OS RNG, hex encoded.
pub fn generate_session_key() -> String {
    let mut raw = [0u8; 32];
    OsRng.fill_bytes(&mut raw);
    hex::encode(raw)
}

fn ct_eq_str(a: &str, b: &str) -> bool {
    bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}
