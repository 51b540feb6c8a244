//! The operator service: identity minting and refresh handling.
//!
//! Mirrors the client's lifecycle from the server side. `generate_identity`
//! establishes a pseudonymous identity and mints the token triple;
//! `refresh_identity` validates a presented refresh credential against the
//! opt-out store and re-mints; `invalidate_tokens` records an opt-out.

use std::sync::Arc;

use subtle::ConstantTimeEq;
use tracing::{debug, info};
use uuid::Uuid;

use adnym_codec::{
    AdvertisingToken, KeyStore, RefreshToken, TokenCodec, UserIdentity, UserToken,
};

use crate::identity::{advertising_id, first_level_key, IdentityRequest, MappedIdentity};
use crate::optout::OptOutStore;
use crate::response::{generate_response_key, RefreshEnvelope};
use crate::salt::{SaltEntry, SaltProvider};
use crate::Result;

/// Default advertising-token lifetime (4 hours).
pub const DEFAULT_TOKEN_EXPIRY_MS: u64 = 4 * 60 * 60 * 1_000;

/// Default interval before a refresh becomes due (1 hour).
pub const DEFAULT_REFRESH_FROM_MS: u64 = 60 * 60 * 1_000;

/// Default refresh-credential lifetime (30 days).
pub const DEFAULT_REFRESH_VALID_MS: u64 = 30 * 24 * 60 * 60 * 1_000;

/// Secondary privacy bits stamped into user tokens.
const USER_TOKEN_PRIVACY_BITS2: u32 = 2;

/// Timing policy for minted identities.
#[derive(Clone, Debug)]
pub struct OperatorConfig {
    /// Advertising-token lifetime.
    pub token_expiry_ms: u64,
    /// Interval before a refresh becomes due.
    pub refresh_from_interval_ms: u64,
    /// Refresh-credential lifetime.
    pub refresh_valid_ms: u64,
    /// Identities established before this instant are refused refresh as
    /// deprecated (a migration cutoff).
    pub refresh_cutoff_ms: Option<u64>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            token_expiry_ms: DEFAULT_TOKEN_EXPIRY_MS,
            refresh_from_interval_ms: DEFAULT_REFRESH_FROM_MS,
            refresh_valid_ms: DEFAULT_REFRESH_VALID_MS,
            refresh_cutoff_ms: None,
        }
    }
}

/// The encoded token triple minted for one identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityBundle {
    /// Base64 advertising token.
    pub advertising_token: String,
    /// Base64 user token.
    pub user_token: String,
    /// Base64 refresh token.
    pub refresh_token: String,
    /// Opaque per-issuance identifier.
    pub identity_guid: String,
}

/// Outcome of one refresh call.
#[derive(Clone, Debug)]
pub enum RefreshResult {
    /// A new identity was minted.
    Refreshed {
        /// The re-minted token triple.
        bundle: IdentityBundle,
        /// The envelope the client persists.
        envelope: RefreshEnvelope,
    },
    /// The presented credential could not be decoded.
    Invalid,
    /// The user opted out at or after the credential was minted.
    OptOut,
    /// The refresh credential is past its validity window.
    ExpiredToken,
    /// The identity predates the migration cutoff.
    Deprecated,
}

/// Server-side identity service.
pub struct OperatorService {
    codec: TokenCodec,
    salts: Arc<dyn SaltProvider>,
    optout: Arc<dyn OptOutStore>,
    config: OperatorConfig,
}

impl OperatorService {
    /// Create a service with the default timing policy.
    pub fn new(
        keys: Arc<dyn KeyStore>,
        salts: Arc<dyn SaltProvider>,
        optout: Arc<dyn OptOutStore>,
    ) -> Self {
        Self::with_config(keys, salts, optout, OperatorConfig::default())
    }

    /// Create a service with an explicit timing policy.
    pub fn with_config(
        keys: Arc<dyn KeyStore>,
        salts: Arc<dyn SaltProvider>,
        optout: Arc<dyn OptOutStore>,
        config: OperatorConfig,
    ) -> Self {
        Self {
            codec: TokenCodec::new(keys),
            salts,
            optout,
            config,
        }
    }

    /// Derive the pseudonymous identity for an email hash without minting
    /// tokens.
    pub fn map_identity(&self, email_hash: &str) -> Result<MappedIdentity> {
        let flk = first_level_key(email_hash, &self.salts.first_level_salt()?);
        self.map_first_level_key(&flk)
    }

    fn map_first_level_key(&self, flk: &str) -> Result<MappedIdentity> {
        let rotating = self.salts.rotating_salt(flk)?;
        Ok(MappedIdentity {
            advertising_id: advertising_id(flk, &rotating.salt),
            bucket_id: rotating.bucket_id,
        })
    }

    /// Establish an identity and mint its token triple.
    pub fn generate_identity(
        &self,
        request: &IdentityRequest,
        now_ms: u64,
    ) -> Result<(IdentityBundle, RefreshEnvelope)> {
        let flk = first_level_key(&request.email_hash, &self.salts.first_level_salt()?);
        info!(site_id = request.site_id, "establishing identity");
        self.generate_for_key(&flk, request.site_id, request.privacy_bits, now_ms, now_ms)
    }

    /// Mint the token triple for a first-level key, preserving the original
    /// establishment instant across refreshes.
    fn generate_for_key(
        &self,
        flk: &str,
        site_id: u32,
        privacy_bits: u32,
        established_at: u64,
        now_ms: u64,
    ) -> Result<(IdentityBundle, RefreshEnvelope)> {
        let mapped = self.map_first_level_key(flk)?;

        let refresh_identity = UserIdentity::new(flk, site_id, privacy_bits, established_at);
        let ad_identity =
            UserIdentity::new(mapped.advertising_id, site_id, privacy_bits, established_at);

        let identity_expires = now_ms + self.config.token_expiry_ms;
        let refresh_expires = now_ms + self.config.refresh_valid_ms;

        let advertising = AdvertisingToken::new(now_ms, identity_expires, ad_identity.clone());
        let user = UserToken::new(now_ms, identity_expires, ad_identity, USER_TOKEN_PRIVACY_BITS2);
        let refresh = RefreshToken::new(now_ms, identity_expires, refresh_expires, refresh_identity);

        let bundle = IdentityBundle {
            advertising_token: self.codec.encode_advertising_token(&advertising, now_ms)?,
            user_token: self.codec.encode_user_token(&user, now_ms)?,
            refresh_token: self.codec.encode_refresh_token(&refresh)?,
            identity_guid: Uuid::new_v4().to_string(),
        };
        let envelope = RefreshEnvelope {
            advertising_token: bundle.advertising_token.clone(),
            refresh_token: bundle.refresh_token.clone(),
            identity_expires,
            refresh_from: now_ms + self.config.refresh_from_interval_ms,
            refresh_expires,
            refresh_response_key: generate_response_key(),
        };
        Ok((bundle, envelope))
    }

    /// Answer a refresh call.
    ///
    /// Decode failure is `Invalid`, a spent validity window is
    /// `ExpiredToken`, an identity established before the migration cutoff
    /// is `Deprecated`, and an opt-out entry at or after the credential's
    /// mint instant is `OptOut`; otherwise the identity is re-minted with
    /// its establishment instant preserved.
    pub async fn refresh_identity(&self, refresh_token: &str, now_ms: u64) -> Result<RefreshResult> {
        let token = match self.codec.decode_refresh_token(refresh_token) {
            Ok(token) => token,
            Err(err) => {
                debug!(%err, "presented refresh token did not decode");
                return Ok(RefreshResult::Invalid);
            }
        };

        if now_ms >= token.valid_till {
            return Ok(RefreshResult::ExpiredToken);
        }
        if let Some(cutoff) = self.config.refresh_cutoff_ms {
            if token.identity.established_at < cutoff {
                return Ok(RefreshResult::Deprecated);
            }
        }

        match self.optout.latest_entry(&token.identity.id).await? {
            Some(entry) if token.created_at <= entry => {
                info!("refresh refused: user opted out");
                Ok(RefreshResult::OptOut)
            }
            _ => {
                let (bundle, envelope) = self.generate_for_key(
                    &token.identity.id,
                    token.identity.site_id,
                    token.identity.privacy_bits,
                    token.identity.established_at,
                    now_ms,
                )?;
                Ok(RefreshResult::Refreshed { bundle, envelope })
            }
        }
    }

    /// Whether an advertising token embeds the id derived from this email
    /// hash. Comparison is constant-time.
    pub fn does_match(
        &self,
        advertising_token: &str,
        email_hash: &str,
        now_ms: u64,
    ) -> Result<bool> {
        let token = self.codec.decode_advertising_token(advertising_token, now_ms)?;
        let mapped = self.map_identity(email_hash)?;
        Ok(bool::from(
            token
                .identity
                .id
                .as_bytes()
                .ct_eq(mapped.advertising_id.as_bytes()),
        ))
    }

    /// Record an opt-out for this user; returns the recorded instant.
    ///
    /// Tokens minted at or before the entry are refused refresh afterwards.
    pub async fn invalidate_tokens(&self, email_hash: &str, now_ms: u64) -> Result<u64> {
        let flk = first_level_key(email_hash, &self.salts.first_level_salt()?);
        let mapped = self.map_first_level_key(&flk)?;
        self.optout
            .add_entry(&flk, &mapped.advertising_id, now_ms)
            .await
    }

    /// Salt buckets rotated at or after `since_ms`.
    pub fn modified_buckets(&self, since_ms: u64) -> Result<Vec<SaltEntry>> {
        self.salts.modified_since(since_ms)
    }
}

impl std::fmt::Debug for OperatorService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
