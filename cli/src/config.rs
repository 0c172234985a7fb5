use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

use gastos_core::models::UserId;

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "gastos").context("Could not determine home directory")?;
        Self::from_data_dir(proj_dirs.data_dir().to_path_buf())
    }

    pub fn from_data_dir(data_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let db_path = data_dir.join("gastos.db");

        Ok(Config { db_path, data_dir })
    }

    /// Point at `--db` instead of the data directory's database.
    #[must_use]
    pub fn with_db_override(mut self, db: Option<PathBuf>) -> Self {
        if let Some(db) = db {
            self.db_path = db;
        }
        self
    }

    fn session_path(&self) -> PathBuf {
        self.data_dir.join("session")
    }

    /// The signed-in user, if any.
    pub fn load_session(&self) -> Result<Option<UserId>> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path).context("Failed to read session file")?;
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        UserId::parse(raw)
            .map(Some)
            .with_context(|| format!("Corrupt session file: {}", path.display()))
    }

    pub fn save_session(&self, user: &UserId) -> Result<()> {
        let path = self.session_path();
        std::fs::write(&path, user.as_str()).context("Failed to write session file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set session file permissions")?;
        }
        Ok(())
    }

    /// Returns true when a session was actually removed.
    pub fn clear_session(&self) -> Result<bool> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path).context("Failed to remove session file")?;
        Ok(true)
    }

    /// `--user` wins over the saved session.
    pub fn resolve_user(&self, explicit: Option<&str>) -> Result<Option<UserId>> {
        match explicit {
            Some(raw) => UserId::parse(raw).map(Some),
            None => self.load_session(),
        }
    }
}
