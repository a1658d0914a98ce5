#![cfg(feature = "storage-rocksdb")]

use assert_cmd::cargo_bin;
use std::io::Write;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn test_rocksdb_persistence_recovery() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    // First run: sell a weekly pass and open a session
    let mut csv1 = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv1, "command,at,token,guest,service,service_type,amount").unwrap();
    writeln!(csv1, "purchase,1000,W1,g1,Weekly pass,weekly,7000").unwrap();
    writeln!(csv1, "redeem,2000,W1").unwrap();

    let mut cmd1 = Command::new(cargo_bin!("cafeos"));
    cmd1.arg(csv1.path()).arg("--db-path").arg(&db_path);

    let output1 = cmd1.output().expect("Failed to execute command");
    assert!(output1.status.success());
    let stdout1 = String::from_utf8_lossy(&output1.stdout);
    assert!(stdout1.contains("W1,g1,Weekly pass,weekly,7000,paid,0,7,"));

    // Second run: close the session opened by the first run
    let mut csv2 = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv2, "command,at,token").unwrap();
    writeln!(csv2, "checkout,62000,W1").unwrap();

    let mut cmd2 = Command::new(cargo_bin!("cafeos"));
    cmd2.arg(csv2.path()).arg("--db-path").arg(&db_path);

    let output2 = cmd2.output().expect("Failed to execute command");
    assert!(output2.status.success());
    let stdout2 = String::from_utf8_lossy(&output2.stdout);

    // The recovered session was closed and counted against the pass
    assert!(stdout2.contains("W1,g1,Weekly pass,weekly,7000,paid,1,7,"));
}
