//! Fixture helpers for store tests: author small KDBX databases on disk.

use keepass::config::DatabaseConfig;
use keepass::db::{Entry, Group, Value};
use keepass::{Database, DatabaseKey};
use std::fs::File;
use std::path::Path;

pub struct TestEntry {
    pub title: &'static str,
    pub url: &'static str,
    pub username: &'static str,
    pub password: &'static str,
    pub tags: &'static [&'static str],
}

fn build_entry(record: &TestEntry) -> Entry {
    let mut entry = Entry::new();
    entry
        .fields
        .insert("Title".to_string(), Value::Unprotected(record.title.into()));
    entry
        .fields
        .insert("URL".to_string(), Value::Unprotected(record.url.into()));
    entry.fields.insert(
        "UserName".to_string(),
        Value::Unprotected(record.username.into()),
    );
    entry.fields.insert(
        "Password".to_string(),
        Value::Unprotected(record.password.into()),
    );
    entry.tags = record.tags.iter().map(|t| t.to_string()).collect();
    entry
}

pub fn save_database(db: Database, path: &Path, password: &str) {
    let key = DatabaseKey::new().with_password(password);
    let mut file = File::create(path).unwrap();
    db.save(&mut file, key).unwrap();
}

pub fn write_database(path: &Path, password: &str, entries: &[TestEntry]) {
    let mut db = Database::new(DatabaseConfig::default());
    for record in entries {
        db.root.entries.push(build_entry(record));
    }
    save_database(db, path, password);
}

/// Like [`write_database`], but the entries live in a subgroup of the root.
pub fn write_database_in_subgroup(path: &Path, password: &str, entries: &[TestEntry]) {
    let mut db = Database::new(DatabaseConfig::default());
    let mut group = Group::new("Nested");
    for record in entries {
        group.entries.push(build_entry(record));
    }
    db.root.groups.push(group);
    save_database(db, path, password);
}

/// Bump the file's mtime without changing its contents.
pub fn touch(path: &Path) {
    let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
    let bumped = std::time::SystemTime::now() + std::time::Duration::from_secs(1);
    file.set_modified(bumped).unwrap();
}
