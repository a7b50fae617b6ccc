use jsonwebtoken::{encode, get_current_timestamp, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ALGORITHM: Algorithm = Algorithm::HS256;
pub const JWT_SECRET_LENGTH: usize = 32;

#[derive(Debug)]
pub enum Error {
    InvalidKey(String),
    InvalidToken,
    JWTError(jsonwebtoken::errors::Error),
}

impl From<jsonwebtoken::errors::Error> for Error {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        Error::JWTError(e)
    }
}

/// The shared secret for the engine API. Always exactly 32 bytes; an
/// injected configuration value, never compiled in.
#[derive(Clone, PartialEq)]
pub struct JwtKey([u8; JWT_SECRET_LENGTH]);

impl JwtKey {
    /// Wrap given slice in `Self`. Returns an error if slice.len() != `JWT_SECRET_LENGTH`.
    pub fn from_slice(key: &[u8]) -> Result<Self, Error> {
        if key.len() == JWT_SECRET_LENGTH {
            let mut res = [0; JWT_SECRET_LENGTH];
            res.copy_from_slice(key);
            Ok(Self(res))
        } else {
            Err(Error::InvalidKey(format!(
                "Invalid key length. Expected {} got {}",
                JWT_SECRET_LENGTH,
                key.len()
            )))
        }
    }

    /// Decode a 0x-prefixed or bare hex string into a key.
    pub fn from_hex(hex_key: &str) -> Result<Self, Error> {
        let bytes = hex::decode(hex_key.trim_start_matches("0x"))
            .map_err(|e| Error::InvalidKey(format!("Invalid hex: {}", e)))?;
        Self::from_slice(&bytes)
    }

    /// Returns the secret key in its raw form.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Claims struct as defined in <https://github.com/ethereum/execution-apis/blob/main/src/engine/authentication.md#jwt-claims>
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// issued-at claim. Represented as seconds passed since UNIX_EPOCH.
    iat: u64,
    /// Optional unique identifier for the CL node.
    id: Option<String>,
    /// Optional client version for the CL node.
    clv: Option<String>,
}

#[derive(Clone)]
pub struct Auth {
    secret: EncodingKey,
    id: Option<String>,
    clv: Option<String>,
}

impl Auth {
    pub fn new(jwt_key: JwtKey, id: Option<String>, clv: Option<String>) -> Self {
        Self {
            secret: EncodingKey::from_secret(jwt_key.as_bytes()),
            id,
            clv,
        }
    }

    /// Generate a JWT token with iat set to current time.
    pub fn generate_token(&self) -> Result<String, Error> {
        let header = Header::new(DEFAULT_ALGORITHM);
        let claims = Claims {
            iat: get_current_timestamp(),
            id: self.id.clone(),
            clv: self.clv.clone(),
        };
        Ok(encode(&header, &claims, &self.secret)?)
    }
}
