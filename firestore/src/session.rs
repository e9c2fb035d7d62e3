//! Session establishment and refresh.

use crate::backend::DocumentBackend;
use crate::error::BackendError;
use async_trait::async_trait;
use tracing::debug;

/// Establishes new sessions from ambient configuration.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Session type produced.
    type Session: DocumentBackend;

    /// Open a new session.
    async fn connect(&self) -> Result<Self::Session, BackendError>;
}

/// Replace `session` with a freshly connected one, closing the old session.
///
/// On failure `session` is left untouched.
///
/// # Errors
///
/// Returns the connector error.
pub async fn refresh<C>(connector: &C, session: &mut C::Session) -> Result<(), BackendError>
where
    C: Connector + ?Sized,
{
    let fresh = connector.connect().await?;
    let stale = std::mem::replace(session, fresh);
    stale.close().await;
    debug!("Replaced firestore session");
    Ok(())
}
