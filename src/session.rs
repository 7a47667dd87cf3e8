//! Guest session negotiation: reuse a persisted session id or mint one.
//!
//! One session id is active at a time per client. Reloads reuse the
//! persisted id after a lightweight existence probe; a failed probe
//! discards the stale id locally and mints a fresh session, so callers
//! never see the recovery.

use crate::error::ClientError;
use crate::gateway::CommerceApi;
use crate::identity::{IdentityKey, IdentityStore};

/// Channel tag reported when minting sessions from this client.
const SESSION_CHANNEL: &str = "cli";

/// Ensure a valid session id exists, minting one if needed.
///
/// Idempotent: calling twice without intervening invalidation returns the
/// same id and performs no second mint.
pub async fn ensure_session(
    store: &dyn IdentityStore,
    api: &dyn CommerceApi,
) -> Result<String, ClientError> {
    if let Some(existing) = store.get(IdentityKey::SessionId) {
        match api.probe_session(&existing).await {
            Ok(()) => return Ok(existing),
            Err(err) => {
                tracing::debug!(session_id = %existing, %err, "stale session discarded");
                store.set(IdentityKey::SessionId, None)?;
            }
        }
    }

    let created = api.create_session(SESSION_CHANNEL).await?;
    store.set(IdentityKey::SessionId, Some(&created.session_id))?;
    tracing::info!(session_id = %created.session_id, "minted new session");
    Ok(created.session_id)
}
