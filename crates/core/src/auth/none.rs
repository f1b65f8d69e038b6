use async_trait::async_trait;

use super::{AuthError, AuthRequest, Authenticator, Identity};

/// Authenticator that accepts all requests as anonymous, non-admin callers.
/// Must be explicitly configured - the system won't default to this
#[derive(Default)]
pub struct NoneAuthenticator;

impl NoneAuthenticator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Authenticator for NoneAuthenticator {
    async fn authenticate(&self, _request: &AuthRequest) -> Result<Identity, AuthError> {
        Ok(Identity::anonymous())
    }

    fn method_name(&self) -> &'static str {
        "none"
    }

    fn requires_credentials(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::IpAddr;

    #[tokio::test]
    async fn test_none_authenticator_is_never_admin() {
        let auth = NoneAuthenticator::new();
        let request = AuthRequest {
            headers: HashMap::from([("x-api-key".to_string(), "anything".to_string())]),
            source_ip: "127.0.0.1".parse::<IpAddr>().unwrap(),
        };

        let identity = auth.authenticate(&request).await.unwrap();

        assert_eq!(identity.user_id, "anonymous");
        assert!(!identity.is_admin());
    }

    #[test]
    fn test_none_authenticator_method_name() {
        assert_eq!(NoneAuthenticator.method_name(), "none");
    }
}
