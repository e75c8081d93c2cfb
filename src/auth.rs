//! Credential encryption and the login state machine.

use std::fmt;

use base64::prelude::*;
use rsa::{BigUint, Pkcs1v15Encrypt, RsaPublicKey};
use serde::{Deserialize, Serialize};

use crate::errors::SteamError;

/// Where a login attempt currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AuthState {
    /// Nothing has happened yet, or the last key fetch failed.
    #[default]
    KeyFetch,
    /// A public key is held and the password can be encrypted.
    Encrypt,
    /// Credentials are on their way to the service.
    Submit,
    /// The service asked for a Steam Guard code.
    GuardChallenge,
    /// The service asked for a captcha answer.
    CaptchaChallenge,
    /// The last submission was rejected.
    Failed,
    /// Credentials accepted, reading the OAuth document.
    OAuthExchange,
    /// Forwarding the OAuth document to obtain web cookies.
    SessionRedirect,
    /// Reading the session cookie set by the redirect.
    CookieExtract,
    /// Token, cookie and steam id are in place.
    Ready,
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// RSA key material and challenge state of an ongoing login.
///
/// Survives failed submissions so a retry can carry the captcha and
/// Steam Guard identifiers the service handed out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    /// Hex encoded RSA modulus.
    pub modulus: Option<String>,
    /// Hex encoded RSA exponent.
    pub exponent: Option<String>,
    /// Key timestamp, echoed back when submitting.
    pub timestamp: Option<String>,
    /// Captcha the service wants answered.
    pub captcha_gid: Option<String>,
    /// Steam id the Steam Guard mail was sent for.
    pub email_steamid: Option<String>,
}

impl AuthContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the modulus if it is valid hex.
    pub fn set_modulus(&mut self, modulus: &str) -> bool {
        if decode_hex(modulus).is_none() {
            return false;
        }

        self.modulus = Some(modulus.to_string());
        true
    }

    /// Stores the exponent if it is valid hex.
    pub fn set_exponent(&mut self, exponent: &str) -> bool {
        if decode_hex(exponent).is_none() {
            return false;
        }

        self.exponent = Some(exponent.to_string());
        true
    }

    /// Encrypts the password with the held key (PKCS#1 v1.5) and base64-encodes it.
    pub fn encrypt(&self, password: &str) -> Result<String, SteamError> {
        let (Some(modulus), Some(exponent)) = (&self.modulus, &self.exponent) else {
            return Err(SteamError::Encrypt("No authentication key".to_string()));
        };

        let (Some(n), Some(e)) = (decode_hex(modulus), decode_hex(exponent)) else {
            return Err(SteamError::Encrypt("Invalid authentication key".to_string()));
        };

        let key = RsaPublicKey::new(BigUint::from_bytes_be(&n), BigUint::from_bytes_be(&e))
            .map_err(|err| SteamError::Encrypt(format!("Invalid authentication key: {err}")))?;

        let mut rng = rand::thread_rng();
        let encrypted = key
            .encrypt(&mut rng, Pkcs1v15Encrypt, password.as_bytes())
            .map_err(|err| SteamError::Encrypt(format!("Failed to encrypt password: {err}")))?;

        Ok(BASE64_STANDARD.encode(encrypted))
    }
}

// The service sends odd-length hex from time to time.
fn decode_hex(input: &str) -> Option<Vec<u8>> {
    if input.is_empty() {
        return None;
    }

    if input.len() % 2 == 1 {
        hex::decode(format!("0{input}")).ok()
    } else {
        hex::decode(input).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::traits::PublicKeyParts;
    use rsa::RsaPrivateKey;

    fn context_for(key: &RsaPrivateKey) -> AuthContext {
        let mut auth = AuthContext::new();
        assert!(auth.set_modulus(&hex::encode(key.n().to_bytes_be())));
        assert!(auth.set_exponent(&hex::encode(key.e().to_bytes_be())));
        auth
    }

    #[test]
    fn encrypted_password_decrypts() {
        let mut rng = rand::thread_rng();
        let key = RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let auth = context_for(&key);

        let encrypted = auth.encrypt("hunter2").unwrap();
        let raw = BASE64_STANDARD.decode(encrypted).unwrap();
        let decrypted = key.decrypt(Pkcs1v15Encrypt, &raw).unwrap();

        assert_eq!(decrypted, b"hunter2");
    }

    #[test]
    fn encrypt_without_key_fails() {
        let auth = AuthContext::new();
        assert!(matches!(auth.encrypt("pw"), Err(SteamError::Encrypt(_))));
    }

    #[test]
    fn rejects_non_hex_key() {
        let mut auth = AuthContext::new();
        assert!(!auth.set_modulus("zz"));
        assert!(!auth.set_exponent(""));
        assert!(auth.set_exponent("10001"));
        assert_eq!(auth.modulus, None);
    }
}
