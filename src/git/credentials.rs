use std::cell::Cell;
use std::fmt;

use git2::{Cred, CredentialType};

/// Username presented to the git remote. The platform ignores it but
/// libgit2 refuses an empty one.
pub const TRANSPORT_USERNAME: &str = "section-token";

/// API token, sent as the basic-auth password.
#[derive(Clone)]
pub struct Credential {
    token: String,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Tracks credential requests for one transport call.
///
/// libgit2 asks again every time the server answers 401, so a second
/// request means the token was rejected. Answering it with an error ends
/// the loop and lets us report an auth failure instead of a generic one.
#[derive(Debug, Default)]
pub struct AuthState {
    requests: Cell<u32>,
    rejected: Cell<bool>,
}

impl AuthState {
    pub fn provide(
        &self,
        credential: &Credential,
        allowed: CredentialType,
    ) -> Result<Cred, git2::Error> {
        let n = self.requests.get();
        self.requests.set(n + 1);
        if n > 0 {
            self.rejected.set(true);
            return Err(git2::Error::from_str("credentials rejected by remote"));
        }
        if !allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
            return Err(git2::Error::from_str(
                "remote does not accept username/password credentials",
            ));
        }
        Cred::userpass_plaintext(TRANSPORT_USERNAME, credential.token())
    }

    pub fn rejected(&self) -> bool {
        self.rejected.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_token() {
        let c = Credential::new("s3cret");
        let shown = format!("{:?}", c);
        assert!(!shown.contains("s3cret"));
        assert!(shown.contains("redacted"));
    }

    #[test]
    fn second_credential_request_is_a_rejection() {
        let auth = AuthState::default();
        let c = Credential::new("tok");
        assert!(auth.provide(&c, CredentialType::USER_PASS_PLAINTEXT).is_ok());
        assert!(!auth.rejected());
        assert!(auth.provide(&c, CredentialType::USER_PASS_PLAINTEXT).is_err());
        assert!(auth.rejected());
    }

    #[test]
    fn ssh_only_remotes_are_refused() {
        let auth = AuthState::default();
        let res = auth.provide(&Credential::new("tok"), CredentialType::SSH_KEY);
        assert!(res.is_err());
        assert!(!auth.rejected());
    }
}
