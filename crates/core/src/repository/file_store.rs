//! JSON file backend for [`CredentialStore`].

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use protocol::{descramble, scramble};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use super::credentials::{AuthInfo, CredentialStore};
use crate::error::CredentialStoreError;

const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Default, Deserialize, Serialize)]
struct Document {
    version: u32,
    #[serde(default)]
    entries: Vec<Entry>,
}

#[derive(Debug, Deserialize, Serialize)]
struct Entry {
    realm: String,
    location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    password: Option<String>,
}

/// Credential store persisted as a JSON document.
///
/// Passwords are kept in the pserver scrambled form, the same obfuscation
/// `~/.cvspass` uses. Every change rewrites the whole file through a
/// temporary file in the same directory, so readers never observe a partial
/// document. On Unix the file is created with mode `0600`.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileCredentialStore {
    /// Uses the document at `path`, which need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Document, CredentialStoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Ok(Document {
                    version: DOCUMENT_VERSION,
                    entries: Vec::new(),
                });
            }
            Err(error) => return Err(self.io_error("read", error)),
        };
        let document: Document =
            serde_json::from_str(&text).map_err(|error| self.format_error(error.to_string()))?;
        if document.version != DOCUMENT_VERSION {
            return Err(self.format_error(format!(
                "unsupported document version {}",
                document.version
            )));
        }
        Ok(document)
    }

    fn save(&self, document: &Document) -> Result<(), CredentialStoreError> {
        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(directory).map_err(|error| self.io_error("create directory for", error))?;

        let json = serde_json::to_vec_pretty(document)
            .map_err(|error| self.format_error(error.to_string()))?;
        let mut file =
            NamedTempFile::new_in(directory).map_err(|error| self.io_error("stage", error))?;
        restrict_permissions(file.as_file()).map_err(|error| self.io_error("protect", error))?;
        file.write_all(&json)
            .and_then(|()| file.write_all(b"\n"))
            .and_then(|()| file.as_file().sync_all())
            .map_err(|error| self.io_error("write", error))?;
        file.persist(&self.path)
            .map_err(|error| self.io_error("replace", error.error))?;
        debug!(
            target: "cvs::auth",
            path = %self.path.display(),
            entries = document.entries.len(),
            "credential store saved"
        );
        Ok(())
    }

    fn io_error(&self, action: &'static str, source: io::Error) -> CredentialStoreError {
        CredentialStoreError::Io {
            action,
            path: self.path.display().to_string(),
            source,
        }
    }

    fn format_error(&self, detail: String) -> CredentialStoreError {
        CredentialStoreError::Format {
            path: self.path.display().to_string(),
            detail,
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(file: &fs::File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_: &fs::File) -> io::Result<()> {
    Ok(())
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, key: &str, realm: &str) -> Result<Option<AuthInfo>, CredentialStoreError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let document = self.load()?;
        let Some(entry) = document
            .entries
            .into_iter()
            .find(|entry| entry.realm == realm && entry.location == key)
        else {
            return Ok(None);
        };
        let password = entry
            .password
            .map(|scrambled| {
                descramble(&scrambled).map_err(|error| {
                    self.format_error(format!("password for {key} is unreadable: {error}"))
                })
            })
            .transpose()?;
        Ok(Some(AuthInfo::new(entry.username, password)))
    }

    fn put(&self, key: &str, realm: &str, info: &AuthInfo) -> Result<(), CredentialStoreError> {
        let password = info
            .password()
            .map(|password| {
                scramble(password).map_err(|error| {
                    CredentialStoreError::Backend(format!("cannot store password: {error}"))
                })
            })
            .transpose()?;

        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let mut document = self.load()?;
        match document
            .entries
            .iter_mut()
            .find(|entry| entry.realm == realm && entry.location == key)
        {
            Some(entry) => {
                if let Some(username) = info.username() {
                    entry.username = Some(username.to_owned());
                }
                if password.is_some() {
                    entry.password = password;
                }
            }
            None => document.entries.push(Entry {
                realm: realm.to_owned(),
                location: key.to_owned(),
                username: info.username().map(str::to_owned),
                password,
            }),
        }
        self.save(&document)
    }

    fn forget(&self, key: &str, realm: &str) -> Result<(), CredentialStoreError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let mut document = self.load()?;
        let before = document.entries.len();
        document
            .entries
            .retain(|entry| !(entry.realm == realm && entry.location == key));
        if document.entries.len() == before {
            return Ok(());
        }
        self.save(&document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::CREDENTIAL_REALM;

    const KEY: &str = ":pserver:bob@cvs.example.org:/cvsroot";

    fn info(username: &str, password: &str) -> AuthInfo {
        AuthInfo::new(Some(username.to_owned()), Some(password.to_owned()))
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileCredentialStore::new(dir.path().join("credentials.json"));
        assert!(store.get(KEY, CREDENTIAL_REALM).expect("get").is_none());
        store.forget(KEY, CREDENTIAL_REALM).expect("forget on missing file");
        assert!(!store.path().exists());
    }

    #[test]
    fn entries_survive_reopening_and_passwords_are_scrambled() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("credentials.json");
        FileCredentialStore::new(&path)
            .put(KEY, CREDENTIAL_REALM, &info("bob", "secret"))
            .expect("put");

        let text = fs::read_to_string(&path).expect("read document");
        assert!(!text.contains("secret"), "{text}");
        assert!(text.contains(&scramble("secret").expect("scramble")));

        let reopened = FileCredentialStore::new(&path);
        let stored = reopened
            .get(KEY, CREDENTIAL_REALM)
            .expect("get")
            .expect("entry");
        assert_eq!(stored.username(), Some("bob"));
        assert_eq!(stored.password(), Some("secret"));
    }

    #[test]
    fn put_merges_and_forget_removes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileCredentialStore::new(dir.path().join("credentials.json"));
        store.put(KEY, CREDENTIAL_REALM, &info("bob", "one")).expect("put");
        store
            .put(KEY, CREDENTIAL_REALM, &AuthInfo::new(None, Some("two".to_owned())))
            .expect("put password");
        store
            .put(":ext:cvs.example.org:/other", CREDENTIAL_REALM, &info("carol", "x"))
            .expect("put second");

        let stored = store.get(KEY, CREDENTIAL_REALM).expect("get").expect("entry");
        assert_eq!(stored.username(), Some("bob"));
        assert_eq!(stored.password(), Some("two"));

        store.forget(KEY, CREDENTIAL_REALM).expect("forget");
        assert!(store.get(KEY, CREDENTIAL_REALM).expect("get").is_none());
        assert!(
            store
                .get(":ext:cvs.example.org:/other", CREDENTIAL_REALM)
                .expect("get")
                .is_some()
        );
    }

    #[test]
    fn corrupt_documents_are_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("credentials.json");
        fs::write(&path, "{ not json").expect("write garbage");
        let error = FileCredentialStore::new(&path)
            .get(KEY, CREDENTIAL_REALM)
            .unwrap_err();
        assert!(matches!(error, CredentialStoreError::Format { .. }));

        fs::write(&path, r#"{"version": 7, "entries": []}"#).expect("write future version");
        let error = FileCredentialStore::new(&path)
            .get(KEY, CREDENTIAL_REALM)
            .unwrap_err();
        assert!(error.to_string().contains("unsupported document version 7"));
    }

    #[test]
    fn wide_passwords_are_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileCredentialStore::new(dir.path().join("credentials.json"));
        let error = store
            .put(KEY, CREDENTIAL_REALM, &info("bob", "p\u{12c}ss"))
            .unwrap_err();
        assert!(matches!(error, CredentialStoreError::Backend(_)));
        assert!(!store.path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileCredentialStore::new(dir.path().join("credentials.json"));
        store.put(KEY, CREDENTIAL_REALM, &info("bob", "secret")).expect("put");
        let mode = fs::metadata(store.path()).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
