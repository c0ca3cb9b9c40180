//! On-disk token persistence across process restarts.
use crate::mesh::{Token, TokenParseError};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("token store unreadable: {0}")]
    Io(#[from] std::io::Error),
    #[error("token store corrupt: {0}")]
    Json(#[from] serde_json::Error),
    #[error("token store holds an invalid token: {0}")]
    Token(#[from] TokenParseError),
}

#[derive(serde::Serialize, serde::Deserialize)]
struct TokenRecord {
    token: Token,
}

/// Stores the node token as a small JSON file so a restarted process can
/// attach without re-joining.
pub struct TokenStore {
    path: PathBuf,
}
impl TokenStore {
    #[must_use]
    pub fn new(path: PathBuf) -> TokenStore {
        TokenStore { path }
    }
    /// Loads the stored token. A missing file is `Ok(None)`, not an error.
    pub fn load(&self) -> Result<Option<Token>, StorageError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let record: TokenRecord = serde_json::from_str(&text)?;
        Ok(Some(record.token))
    }
    pub fn store(&self, token: Token) -> Result<(), StorageError> {
        let text = serde_json::to_string(&TokenRecord { token })?;
        fs::write(&self.path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));
        let token = Token::new(0x1122_3344_5566_7788);
        store.store(token).unwrap();
        assert_eq!(store.load().unwrap(), Some(token));
    }

    #[test]
    fn test_corrupt_store_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, "{\"token\":\"not-a-token!!\"}").unwrap();
        let store = TokenStore::new(path);
        assert!(store.load().is_err());
    }
}
