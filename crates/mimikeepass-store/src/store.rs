//! Staleness-aware KeePass store wrapper

use keepass::db::{Entry as KpEntry, Group};
use keepass::error::DatabaseOpenError;
use keepass::{Database, DatabaseKey};
use mimikeepass_api::{Entry, EntryQuery};
use regex::Regex;
use std::fs::File;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::{StoreError, StoreResult};

/// File identity snapshot used for staleness detection.
///
/// A database is considered edited when any of device, inode or modification
/// time changes; an editor that replaces the file (new inode) and one that
/// rewrites it in place (new mtime) are both caught.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity {
    dev: u64,
    ino: u64,
    mtime: i64,
    mtime_nsec: i64,
}

impl FileIdentity {
    fn of(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        Ok(Self {
            dev: meta.dev(),
            ino: meta.ino(),
            mtime: meta.mtime(),
            mtime_nsec: meta.mtime_nsec(),
        })
    }
}

/// One decrypted KeePass database plus its staleness metadata.
///
/// The handle is either `None` or was produced by successfully decrypting
/// the file whose identity matches `identity`. A failed reopen nulls both
/// until a later `refresh()` succeeds, so a store can silently go dark and
/// recover without a daemon restart.
pub struct KeepassStore {
    path: PathBuf,
    password: String,
    handle: Option<Database>,
    identity: Option<FileIdentity>,
}

// Hand-written so the master password and decrypted contents never end up
// in logs or test failure output.
impl std::fmt::Debug for KeepassStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeepassStore")
            .field("path", &self.path)
            .field("unlocked", &self.handle.is_some())
            .finish_non_exhaustive()
    }
}

impl KeepassStore {
    /// Decrypt `path` with `password` and record the file identity.
    pub fn open(path: impl Into<PathBuf>, password: impl Into<String>) -> StoreResult<Self> {
        let path = path.into();
        let password = password.into();
        let handle = decrypt(&path, &password)?;
        let identity = FileIdentity::of(&path)?;
        Ok(Self {
            path,
            password,
            handle: Some(handle),
            identity: Some(identity),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-stat the file and reopen the database if it changed.
    ///
    /// Returns true when a re-decrypt was attempted. On any failure (file
    /// unreadable, password no longer matches) the handle is dropped and
    /// lookups return no match until a later refresh succeeds.
    pub fn refresh(&mut self) -> bool {
        let current = FileIdentity::of(&self.path).ok();
        if self.handle.is_some() && self.identity.is_some() && current == self.identity {
            return false;
        }

        match decrypt(&self.path, &self.password) {
            Ok(handle) => {
                debug!(path = %self.path.display(), "reopened database");
                self.handle = Some(handle);
                // Stat again only if the pre-decrypt stat failed
                self.identity = current.or_else(|| FileIdentity::of(&self.path).ok());
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to reopen database");
                self.handle = None;
                self.identity = None;
            }
        }
        true
    }

    /// First entry matching every present filter field, in document order.
    ///
    /// A dark store (no handle) yields no match without error.
    pub fn lookup(&self, query: &EntryQuery) -> Option<Entry> {
        let db = self.handle.as_ref()?;
        find_first(&db.root, query).map(|entry| to_entry(db, entry))
    }
}

fn decrypt(path: &Path, password: &str) -> StoreResult<Database> {
    let mut file = File::open(path)?;
    let key = DatabaseKey::new().with_password(password);
    Database::open(&mut file, key).map_err(|e| match e {
        DatabaseOpenError::Io(source) => StoreError::Io(source),
        DatabaseOpenError::Key(_) => StoreError::BadCredentials {
            path: path.to_path_buf(),
        },
        source => StoreError::Open {
            path: path.to_path_buf(),
            source,
        },
    })
}

fn find_first<'a>(group: &'a Group, query: &EntryQuery) -> Option<&'a KpEntry> {
    for entry in &group.entries {
        if matches(entry, query) {
            return Some(entry);
        }
    }
    for child in &group.groups {
        if let Some(entry) = find_first(child, query) {
            return Some(entry);
        }
    }
    None
}

fn find_by_uuid<'a>(group: &'a Group, uuid: uuid::Uuid) -> Option<&'a KpEntry> {
    for entry in &group.entries {
        if entry.uuid == uuid {
            return Some(entry);
        }
    }
    for child in &group.groups {
        if let Some(entry) = find_by_uuid(child, uuid) {
            return Some(entry);
        }
    }
    None
}

fn matches(entry: &KpEntry, query: &EntryQuery) -> bool {
    if let Some(username) = &query.username {
        if entry.get_username() != Some(username.as_str()) {
            return false;
        }
    }
    if let Some(url) = &query.url {
        if entry.get("URL") != Some(url.as_str()) {
            return false;
        }
    }
    if let Some(title) = &query.title {
        if entry.get_title() != Some(title.as_str()) {
            return false;
        }
    }
    if let Some(uuid) = &query.uuid {
        match uuid::Uuid::parse_str(uuid) {
            Ok(uuid) => {
                if entry.uuid != uuid {
                    return false;
                }
            }
            Err(_) => return false,
        }
    }
    true
}

/// Maximum levels of `{REF:...}` indirection honored before a reference is
/// left as written; bounds reference cycles.
const MAX_REF_DEPTH: usize = 10;

/// Substitute `{REF:<field>@I:<uuid>}` references with the referenced
/// entry's field, recursively up to [`MAX_REF_DEPTH`] levels. References
/// that do not resolve (unknown uuid, absent field) stay literal.
fn resolve_refs(db: &Database, value: &str, depth: usize) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\{REF:([TUPAN])@I:([0-9A-Fa-f-]+)\}").unwrap());

    if depth == 0 || !value.contains("{REF:") {
        return value.to_string();
    }

    re.replace_all(value, |caps: &regex::Captures<'_>| {
        let referenced = uuid::Uuid::parse_str(&caps[2])
            .ok()
            .and_then(|uuid| find_by_uuid(&db.root, uuid))
            .and_then(|entry| ref_field(entry, &caps[1]));
        match referenced {
            Some(text) => resolve_refs(db, text, depth - 1),
            None => caps[0].to_string(),
        }
    })
    .into_owned()
}

/// KeePass single-letter field codes used inside references.
fn ref_field<'a>(entry: &'a KpEntry, code: &str) -> Option<&'a str> {
    match code {
        "T" => entry.get_title(),
        "U" => entry.get_username(),
        "P" => entry.get_password(),
        "A" => entry.get("URL"),
        "N" => entry.get("Notes"),
        _ => None,
    }
}

fn to_entry(db: &Database, entry: &KpEntry) -> Entry {
    let deref = |value: Option<&str>| value.map(|text| resolve_refs(db, text, MAX_REF_DEPTH));
    let tags = if entry.tags.is_empty() {
        None
    } else {
        Some(entry.tags.clone())
    };
    Entry {
        title: deref(entry.get_title()),
        url: deref(entry.get("URL")),
        username: deref(entry.get_username()),
        password: deref(entry.get_password()),
        tags,
    }
}

/// The ordered list of stores a daemon serves.
///
/// `get_entry` is the one operation the dispatcher calls; the daemon holds
/// the whole set behind a single lock so a refresh-and-lookup pass is atomic
/// with respect to concurrent requests.
pub struct StoreSet {
    stores: Vec<KeepassStore>,
}

impl StoreSet {
    pub fn new(stores: Vec<KeepassStore>) -> Self {
        Self { stores }
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Refresh then look up in each store in declared order; first match wins.
    pub fn get_entry(&mut self, query: &EntryQuery) -> Option<Entry> {
        for store in &mut self.stores {
            store.refresh();
            if let Some(entry) = store.lookup(query) {
                return Some(entry);
            }
        }
        None
    }
}
