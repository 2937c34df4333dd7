use super::error::Result;

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Where the pairing token lives between connections
///
/// Cloning shares the same storage.
#[derive(Debug, Clone)]
pub enum TokenStore {
    Memory(Arc<Mutex<Option<String>>>),
    /// First line of a file
    File(PathBuf),
}

impl TokenStore {
    pub fn memory(token: Option<String>) -> TokenStore {
        TokenStore::Memory(Arc::new(Mutex::new(token)))
    }

    pub fn file<P: Into<PathBuf>>(path: P) -> TokenStore {
        TokenStore::File(path.into())
    }

    /// Current token. A missing or empty file reads as `None`.
    pub fn get(&self) -> Result<Option<String>> {
        match self {
            TokenStore::Memory(token) => Ok(lock(token).clone()),
            TokenStore::File(path) => match fs::read_to_string(path) {
                Ok(contents) => Ok(contents
                    .lines()
                    .next()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(String::from)),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            },
        }
    }

    pub fn set(&self, token: &str) -> Result<()> {
        match self {
            TokenStore::Memory(current) => {
                *lock(current) = Some(token.to_string());
                Ok(())
            }
            TokenStore::File(path) => {
                log::debug!("Saving token to {}", path.display());
                fs::write(path, token)?;
                Ok(())
            }
        }
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        TokenStore::memory(None)
    }
}

fn lock(token: &Mutex<Option<String>>) -> std::sync::MutexGuard<'_, Option<String>> {
    token.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_is_shared() {
        let store = TokenStore::memory(None);
        let clone = store.clone();
        assert_eq!(store.get().unwrap(), None);
        clone.set("abc").unwrap();
        assert_eq!(store.get().unwrap().as_deref(), Some("abc"));
    }

    #[test]
    fn file_round_trip() {
        let path = std::env::temp_dir().join(format!("samsung-frame-token-{}", std::process::id()));
        let _ = fs::remove_file(&path);

        let store = TokenStore::file(&path);
        assert_eq!(store.get().unwrap(), None);

        store.set("12345678").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "12345678");
        assert_eq!(store.get().unwrap().as_deref(), Some("12345678"));

        fs::write(&path, "87654321\nextra\n").unwrap();
        assert_eq!(store.get().unwrap().as_deref(), Some("87654321"));

        fs::remove_file(&path).unwrap();
    }
}
