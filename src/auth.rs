//! Read/write capability derived from the shared household token.
//!
//! This is not a credential system: the token is a plaintext shared secret. Reads are open to
//! anyone and writes are allowed only for the two household members' tokens.

/// Tokens that may write. One per household member.
pub const WRITE_TOKENS: [&str; 2] = ["hodol", "doldol"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthGate {
    token: String,
}

impl AuthGate {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into().trim().to_string(),
        }
    }

    /// A gate with no token at all.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn is_authenticated(&self) -> bool {
        !self.token.is_empty()
    }

    pub fn can_write(&self) -> bool {
        WRITE_TOKENS.contains(&self.token.as_str())
    }

    /// The token to place in an `Authorization` header, if it can be represented there. Tokens
    /// containing anything other than visible ASCII are left out of the header.
    pub fn header_token(&self) -> Option<&str> {
        let header_safe = self.token.bytes().all(|b| b.is_ascii_graphic());
        (self.is_authenticated() && header_safe).then_some(self.token.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous() {
        let gate = AuthGate::anonymous();
        assert!(!gate.is_authenticated());
        assert!(!gate.can_write());
        assert_eq!(gate.header_token(), None);
    }

    #[test]
    fn test_members_can_write() {
        for token in WRITE_TOKENS {
            let gate = AuthGate::new(token);
            assert!(gate.is_authenticated());
            assert!(gate.can_write());
            assert_eq!(gate.header_token(), Some(token));
        }
    }

    #[test]
    fn test_unknown_token_reads_only() {
        let gate = AuthGate::new("guest");
        assert!(gate.is_authenticated());
        assert!(!gate.can_write());
        assert_eq!(gate.header_token(), Some("guest"));
    }

    #[test]
    fn test_non_ascii_token_is_not_sent() {
        let gate = AuthGate::new("호돌이");
        assert!(gate.is_authenticated());
        assert!(!gate.can_write());
        assert_eq!(gate.header_token(), None);
    }
}
