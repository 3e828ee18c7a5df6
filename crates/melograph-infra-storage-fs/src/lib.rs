use log::{debug, info, warn};
use melograph_ports::notes::NoteList;
use melograph_ports::storage::{SettingsDto, StorageError, StoragePort};
use std::fs;
use std::path::{Path, PathBuf};

pub const NOTES_SUFFIX: &str = "_notes.json";

pub struct FsStorage {
    base_dir: PathBuf,
}

impl FsStorage {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn default_base_dir() -> Result<PathBuf, StorageError> {
        let base = dirs_next::config_dir()
            .ok_or_else(|| StorageError::Io("config dir not found".to_string()))?;
        Ok(base.join("melograph"))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn settings_path(&self) -> PathBuf {
        self.base_dir.join("settings.json")
    }

    fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
        let data = fs::read(path).map_err(|e| StorageError::Io(format!("{}: {e}", path.display())))?;
        serde_json::from_slice(&data)
            .map_err(|e| StorageError::Serde(format!("{}: {e}", path.display())))
    }

    fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| StorageError::Io(e.to_string()))?;
            }
        }
        let data =
            serde_json::to_vec_pretty(value).map_err(|e| StorageError::Serde(e.to_string()))?;
        fs::write(path, data).map_err(|e| StorageError::Io(format!("{}: {e}", path.display())))
    }
}

impl Default for FsStorage {
    fn default() -> Self {
        Self {
            base_dir: base_dir_or_cwd(Self::default_base_dir()),
        }
    }
}

fn base_dir_or_cwd(found: Result<PathBuf, StorageError>) -> PathBuf {
    found.unwrap_or_else(|e| {
        warn!("{e}; reading settings from the working directory");
        PathBuf::from(".")
    })
}

/// `song.wav` -> `song_notes.json`, next to the input.
pub fn default_notes_path(audio_path: &Path) -> PathBuf {
    let stem = audio_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    audio_path.with_file_name(format!("{stem}{NOTES_SUFFIX}"))
}

impl StoragePort for FsStorage {
    fn load_settings(&self) -> Result<SettingsDto, StorageError> {
        let path = self.settings_path();
        if !path.exists() {
            debug!("no settings at {}, using defaults", path.display());
            return Ok(SettingsDto::default());
        }
        Self::read_json(&path)
    }

    fn save_settings(&self, s: &SettingsDto) -> Result<(), StorageError> {
        let path = self.settings_path();
        Self::write_json(&path, s)
    }

    fn load_notes(&self, path: &Path) -> Result<NoteList, StorageError> {
        let notes: NoteList = Self::read_json(path)?;
        info!("loaded {} notes from {}", notes.len(), path.display());
        Ok(notes)
    }

    fn save_notes(&self, path: &Path, notes: &NoteList) -> Result<(), StorageError> {
        Self::write_json(path, notes)?;
        info!("saved {} notes to {}", notes.len(), path.display());
        Ok(())
    }
}
