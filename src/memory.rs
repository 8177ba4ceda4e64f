use std::path::PathBuf;
use std::sync::Mutex;

use crate::ServiceError;

/// Single-slot note store; each `remember` replaces the previous note.
#[derive(Debug)]
pub(crate) struct MemorySlot {
    path: PathBuf,
    lock: Mutex<()>,
}

impl MemorySlot {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub(crate) fn remember(&self, text: &str) -> Result<String, ServiceError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ServiceError::InvalidInput(
                "There was nothing to remember.".to_string(),
            ));
        }
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, &self.path)?;
        tracing::debug!(path = %self.path.display(), "memory slot updated");
        Ok(format!("Okay, I will remember that: {text}"))
    }

    pub(crate) fn recall(&self) -> Result<String, ServiceError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let stored = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(err.into()),
        };
        let stored = stored.trim();
        if stored.is_empty() {
            return Ok("Sorry, I don't remember anything.".to_string());
        }
        Ok(format!("You told me to remember that: {stored}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recall_without_note() {
        let dir = tempfile::tempdir().unwrap();
        let slot = MemorySlot::new(dir.path().join("data.txt"));
        assert_eq!(slot.recall().unwrap(), "Sorry, I don't remember anything.");
    }

    #[test]
    fn remember_overwrites_previous_note() {
        let dir = tempfile::tempdir().unwrap();
        let slot = MemorySlot::new(dir.path().join("data.txt"));
        slot.remember("buy milk").unwrap();
        let reply = slot.remember("call mom").unwrap();
        assert_eq!(reply, "Okay, I will remember that: call mom");
        assert_eq!(slot.recall().unwrap(), "You told me to remember that: call mom");
    }

    #[test]
    fn blank_note_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let slot = MemorySlot::new(dir.path().join("data.txt"));
        assert!(slot.remember("   ").is_err());
    }
}
