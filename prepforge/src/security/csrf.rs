//! HMAC-signed CSRF tokens for HTML forms
//!
//! A token is `random_hex.signature`, where the signature is
//! HMAC-SHA256(secret, random_hex) in hex.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct CsrfConfig {
    secret: Vec<u8>,
    /// Reject form posts that carry no token at all
    required: bool,
}

impl CsrfConfig {
    pub fn new(secret: &[u8], required: bool) -> Self {
        Self {
            secret: secret.to_vec(),
            required,
        }
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size")
    }

    pub fn generate(&self) -> String {
        let random_bytes: [u8; 16] = rand::random();
        let random_hex = hex::encode(random_bytes);

        let mut mac = self.mac();
        mac.update(random_hex.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        format!("{}.{}", random_hex, signature)
    }

    pub fn verify(&self, token: &str) -> bool {
        let Some((random_hex, signature)) = token.split_once('.') else {
            return false;
        };
        let Ok(signature) = hex::decode(signature) else {
            return false;
        };

        let mut mac = self.mac();
        mac.update(random_hex.as_bytes());
        mac.verify_slice(&signature).is_ok()
    }

    /// Check the token submitted with a form
    ///
    /// A missing or empty token passes unless tokens are required.
    pub fn check_submitted(&self, token: Option<&str>) -> bool {
        match token.map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => self.verify(token),
            None => !self.required,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_and_verify() {
        let csrf = CsrfConfig::new(b"form-secret", false);
        let token = csrf.generate();

        assert!(csrf.verify(&token));
        assert!(!csrf.verify("invalid.token"));
        assert!(!csrf.verify("no-dot"));
        assert!(!CsrfConfig::new(b"other-secret", false).verify(&token));
    }

    #[test]
    fn test_tampered_token() {
        let csrf = CsrfConfig::new(b"form-secret", false);
        let token = csrf.generate();
        let (random, signature) = token.split_once('.').unwrap();
        let forged = format!("{}0.{}", random, signature);
        assert!(!csrf.verify(&forged));
    }

    #[test]
    fn test_missing_token_policy() {
        let lenient = CsrfConfig::new(b"form-secret", false);
        assert!(lenient.check_submitted(None));
        assert!(lenient.check_submitted(Some("")));
        assert!(!lenient.check_submitted(Some("bad.token")));

        let strict = CsrfConfig::new(b"form-secret", true);
        assert!(!strict.check_submitted(None));
        let token = strict.generate();
        assert!(strict.check_submitted(Some(&token)));
    }
}
