//! Signed-in session
//!
//! The current user and bearer token live in one `Session` container. State
//! changes only through [`SessionAction`]s applied by a pure reducer;
//! screens hold a read-only [`SessionView`] and query it through selectors
//! instead of reaching into shared globals.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::credentials::{CredentialError, CredentialStore};
use crate::record::EntityId;

/// The signed-in user as returned by the API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Me {
    pub id: EntityId,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionState {
    pub me: Option<Me>,
    pub token: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionAction {
    SetMe(Me),
    RemoveMe,
    SetToken(String),
    RemoveToken,
}

impl SessionState {
    /// Apply one action.
    pub fn reduce(mut self, action: SessionAction) -> Self {
        match action {
            SessionAction::SetMe(me) => self.me = Some(me),
            SessionAction::RemoveMe => self.me = None,
            SessionAction::SetToken(token) => self.token = Some(token),
            SessionAction::RemoveToken => self.token = None,
        }
        self
    }
}

/// Owner of the session state.
pub struct Session {
    state_tx: watch::Sender<SessionState>,
    store: Arc<dyn CredentialStore>,
    token_key: String,
}

impl Session {
    pub fn new(store: Arc<dyn CredentialStore>, token_key: impl Into<String>) -> Self {
        let (state_tx, _) = watch::channel(SessionState::default());
        Self {
            state_tx,
            store,
            token_key: token_key.into(),
        }
    }

    pub fn dispatch(&self, action: SessionAction) {
        self.state_tx
            .send_modify(|state| *state = std::mem::take(state).reduce(action));
    }

    pub fn state(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    /// A read-only handle for consumers.
    pub fn view(&self) -> SessionView {
        SessionView {
            rx: self.state_tx.subscribe(),
        }
    }

    /// Load a token persisted by an earlier run. The user record is not
    /// persisted and has to be fetched again.
    pub async fn restore(&self) -> Result<bool, CredentialError> {
        match self.store.get_item(&self.token_key).await? {
            Some(token) if !token.is_empty() => {
                self.dispatch(SessionAction::SetToken(token));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Persist the token, then publish user and token.
    pub async fn sign_in(&self, me: Me, token: String) -> Result<(), CredentialError> {
        self.store.set_item(&self.token_key, &token).await?;
        self.dispatch(SessionAction::SetToken(token));
        self.dispatch(SessionAction::SetMe(me));
        log::info!("Signed in");
        Ok(())
    }

    pub async fn sign_out(&self) -> Result<(), CredentialError> {
        self.store.remove_item(&self.token_key).await?;
        self.dispatch(SessionAction::RemoveToken);
        self.dispatch(SessionAction::RemoveMe);
        log::info!("Signed out");
        Ok(())
    }
}

/// Read-only session selectors.
#[derive(Clone)]
pub struct SessionView {
    rx: watch::Receiver<SessionState>,
}

impl SessionView {
    pub fn me(&self) -> Option<Me> {
        self.rx.borrow().me.clone()
    }

    pub fn is_signed_in(&self) -> bool {
        let state = self.rx.borrow();
        state.token.is_some() && state.me.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.rx.borrow().me.as_ref().is_some_and(|me| me.is_admin)
    }

    /// Admins edit books; everyone else can only order them.
    pub fn can_edit(&self) -> bool {
        self.is_admin()
    }

    /// Wait for the next session change.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;

    fn admin() -> Me {
        Me {
            id: "1".into(),
            email: "admin@example.com".into(),
            name: "Admin".into(),
            phone: None,
            is_admin: true,
        }
    }

    #[test]
    fn test_reducer() {
        let state = SessionState::default()
            .reduce(SessionAction::SetToken("t".into()))
            .reduce(SessionAction::SetMe(admin()));
        assert_eq!(state.token.as_deref(), Some("t"));
        assert!(state.me.is_some());

        let state = state.reduce(SessionAction::RemoveMe);
        assert!(state.me.is_none());
        assert_eq!(state.token.as_deref(), Some("t"));
        assert_eq!(state.reduce(SessionAction::RemoveToken), SessionState::default());
    }

    #[tokio::test]
    async fn test_sign_in_and_out() {
        let store = Arc::new(MemoryCredentialStore::new());
        let session = Session::new(store.clone(), "bookmart/token");
        let mut view = session.view();
        assert!(!view.is_signed_in());
        assert!(!view.can_edit());

        session.sign_in(admin(), "tok".into()).await.unwrap();
        assert!(view.changed().await);
        assert!(view.is_signed_in());
        assert!(view.is_admin());
        assert_eq!(store.get_item("bookmart/token").await.unwrap(), Some("tok".into()));

        session.sign_out().await.unwrap();
        assert!(!view.is_signed_in());
        assert_eq!(view.me(), None);
        assert_eq!(store.get_item("bookmart/token").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_restore_reads_persisted_token() {
        let store = Arc::new(MemoryCredentialStore::new());
        let session = Session::new(store.clone(), "bookmart/token");
        assert!(!session.restore().await.unwrap());

        store.set_item("bookmart/token", "persisted").await.unwrap();
        assert!(session.restore().await.unwrap());
        assert_eq!(session.state().token.as_deref(), Some("persisted"));
        assert!(!session.view().is_signed_in());
    }
}
