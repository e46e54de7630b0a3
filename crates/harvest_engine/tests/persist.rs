use std::fs;

use harvest_engine::{append_line, ensure_dir, read_optional, write_atomic, AtomicFileWriter};
use tempfile::TempDir;

#[test]
fn creates_missing_state_dir() {
    let temp = TempDir::new().unwrap();
    let new_dir = temp.path().join("state").join("nested");
    assert!(!new_dir.exists());
    ensure_dir(&new_dir).unwrap();
    assert!(new_dir.is_dir());
}

#[test]
fn atomic_write_replaces_existing_content() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().to_path_buf());

    let first = writer.write("email_index.txt", "7\n").unwrap();
    assert_eq!(first.file_name().unwrap(), "email_index.txt");
    assert_eq!(fs::read_to_string(&first).unwrap(), "7\n");

    let second = writer.write("email_index.txt", "8\n").unwrap();
    assert_eq!(first, second);
    assert_eq!(fs::read_to_string(&second).unwrap(), "8\n");

    // Only the target remains; the temp file was renamed away.
    let entries = fs::read_dir(temp.path()).unwrap().count();
    assert_eq!(entries, 1);
}

#[test]
fn no_partial_file_on_error() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("not_a_dir");
    fs::write(&file_path, "x").unwrap();

    let result = write_atomic(&file_path.join("results.csv"), "EMAIL,COUPON\n");
    assert!(result.is_err());
    assert_eq!(fs::read_to_string(&file_path).unwrap(), "x");
}

#[test]
fn append_line_accumulates_and_missing_reads_as_none() {
    let temp = TempDir::new().unwrap();
    let ledger = temp.path().join("used_emails.txt");
    assert_eq!(read_optional(&ledger).unwrap(), None);

    append_line(&ledger, "a-000000@example.com").unwrap();
    append_line(&ledger, "a-000001@example.com").unwrap();
    assert_eq!(
        read_optional(&ledger).unwrap().as_deref(),
        Some("a-000000@example.com\na-000001@example.com\n")
    );
}
