//! Local session persistence.
//!
//! Keeps the signed-in session alive across restarts. Writes only inside
//! `data_local_dir()/cereal-client/`, never to arbitrary paths, and always
//! atomically.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::auth::AuthSession;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionFile {
    version: u32,
    session: AuthSession,
}

fn app_data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("cereal-client"))
}

fn session_path() -> Option<PathBuf> {
    app_data_dir().map(|d| d.join("session.json"))
}

fn atomic_write(path: &Path, content: &str) -> io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir)?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content)?;
    // Windows: rename over an existing file can fail, remove the old one first.
    if path.exists() {
        let _ = fs::remove_file(path);
    }
    fs::rename(tmp, path)?;
    Ok(())
}

fn load_session_from(path: &Path) -> io::Result<Option<AuthSession>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read_to_string(path)?;
    let parsed: SessionFile =
        serde_json::from_str(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Some(parsed.session))
}

fn save_session_to(path: &Path, session: &AuthSession) -> io::Result<()> {
    let file = SessionFile {
        version: 1,
        session: session.clone(),
    };
    let json = serde_json::to_string(&file)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    atomic_write(path, &json)
}

pub fn load_session() -> io::Result<Option<AuthSession>> {
    let Some(path) = session_path() else {
        return Ok(None);
    };
    load_session_from(&path)
}

pub fn save_session(session: &AuthSession) -> io::Result<()> {
    let Some(path) = session_path() else {
        return Ok(());
    };
    save_session_to(&path, session)
}

pub fn clear_session() -> io::Result<()> {
    if let Some(path) = session_path() {
        if path.exists() {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_session() -> AuthSession {
        AuthSession {
            access_token: "at".into(),
            refresh_token: "rt".into(),
            expires_at: Utc::now(),
            user_id: Some("uid".into()),
            user_email: Some("user@example.com".into()),
        }
    }

    #[test]
    fn session_round_trips_through_the_file() {
        let path = std::env::temp_dir().join(format!(
            "cereal-client-session-{}.json",
            std::process::id()
        ));

        save_session_to(&path, &sample_session()).unwrap();
        let loaded = load_session_from(&path).unwrap().unwrap();
        assert_eq!(loaded.access_token, "at");
        assert_eq!(loaded.refresh_token, "rt");
        assert_eq!(loaded.user_email.as_deref(), Some("user@example.com"));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn missing_file_is_simply_no_session() {
        let path = std::env::temp_dir().join("cereal-client-session-does-not-exist.json");
        assert!(load_session_from(&path).unwrap().is_none());
    }

    #[test]
    fn corrupt_file_is_an_error_not_a_panic() {
        let path = std::env::temp_dir().join(format!(
            "cereal-client-session-corrupt-{}.json",
            std::process::id()
        ));
        fs::write(&path, "not json").unwrap();
        assert!(load_session_from(&path).is_err());
        let _ = fs::remove_file(&path);
    }
}
