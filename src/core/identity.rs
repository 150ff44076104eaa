use std::sync::{PoisonError, RwLock};

use super::model::Identity;

/// Read-only view of the signed-in user
pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<Identity>;
}

/// In-memory identity updated by the shell on sign-in and sign-out
#[derive(Debug, Default)]
pub struct SessionIdentity {
    user: RwLock<Option<Identity>>,
}

impl SessionIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, email: impl Into<String>) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = Some(Identity::new(email));
    }

    pub fn sign_out(&self) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl IdentityProvider for SessionIdentity {
    /// A user without an email counts as absent
    fn current_user(&self) -> Option<Identity> {
        self.user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .filter(Identity::has_email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_in_and_out() {
        let identity = SessionIdentity::new();
        assert!(identity.current_user().is_none());

        identity.sign_in("a@b.com");
        assert_eq!(identity.current_user(), Some(Identity::new("a@b.com")));

        identity.sign_out();
        assert!(identity.current_user().is_none());
    }

    #[test]
    fn test_blank_email_is_absent() {
        let identity = SessionIdentity::new();
        identity.sign_in("   ");
        assert!(identity.current_user().is_none());
    }
}
