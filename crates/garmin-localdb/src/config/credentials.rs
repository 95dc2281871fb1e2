use crate::client::OAuth2Token;
use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};

const OAUTH2_FILENAME: &str = "oauth2_token.json";

/// File-backed store for the OAuth2 token of one profile.
///
/// Tokens live at `<data_dir>/garmin/<profile>/oauth2_token.json`.
pub struct CredentialStore {
    profile: String,
    base_dir: PathBuf,
}

impl CredentialStore {
    /// Create a new credential store for the given profile
    pub fn new(profile: Option<String>) -> Result<Self> {
        Self::with_dir(profile.unwrap_or_else(|| "default".to_string()), super::data_dir()?)
    }

    /// Create a credential store with a custom base directory (for testing)
    pub fn with_dir(profile: impl Into<String>, base_dir: impl AsRef<Path>) -> Result<Self> {
        let profile = profile.into();
        let dir = base_dir.as_ref().join(&profile);
        super::ensure_dir(&dir)?;

        Ok(Self {
            profile,
            base_dir: dir,
        })
    }

    /// Get the profile name
    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn token_path(&self) -> PathBuf {
        self.base_dir.join(OAUTH2_FILENAME)
    }

    /// Save OAuth2 token to storage
    pub fn save_oauth2(&self, token: &OAuth2Token) -> Result<()> {
        let path = self.token_path();
        fs::write(&path, serde_json::to_string_pretty(token)?)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    /// Load OAuth2 token from storage
    pub fn load_oauth2(&self) -> Result<Option<OAuth2Token>> {
        let path = self.token_path();
        if !path.exists() {
            return Ok(None);
        }

        let token: OAuth2Token = serde_json::from_str(&fs::read_to_string(&path)?)?;
        Ok(Some(token))
    }

    pub fn has_credentials(&self) -> bool {
        self.token_path().exists()
    }
}
