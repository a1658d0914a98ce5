use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

const HEADER: &str = "command,at,token,guest,service,service_type,amount,valid_until,name,email";

fn replay_file(rows: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{HEADER}").unwrap();
    for row in rows {
        writeln!(file, "{row}").unwrap();
    }
    file
}

#[test]
fn test_malformed_rows_are_skipped() {
    let input = replay_file(&[
        "purchase, 1000, T1, g1, Coffee, one-off, 300",
        // Unknown command
        "refund, 2000, T1",
        // Unknown service type
        "purchase, 3000, T2, g1, Coffee, espresso, 300",
        // Missing timestamp
        "redeem, , T1",
        "purchase, 4000, T3, g1, Tea, one-off, 200",
    ]);

    let mut cmd = Command::new(cargo_bin!());
    cmd.arg(input.path());

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Error reading command"))
        .stdout(predicate::str::contains("T1,g1,Coffee,one-off,300,paid"))
        .stdout(predicate::str::contains("T3,g1,Tea,one-off,200,paid"))
        .stdout(predicate::str::contains("T2,").not());
}

#[test]
fn test_rejected_commands_do_not_stop_replay() {
    let input = replay_file(&[
        "purchase, 1000, T1, g1, Coffee, one-off, 300",
        "redeem, 2000, T1",
        // Second redemption of a consumed voucher
        "redeem, 3000, T1",
        // Unknown voucher
        "redeem, 3500, NOPE",
        // Duplicate voucher code
        "purchase, 4000, T1, g2, Tea, one-off, 200",
        "reserve, 5000, T2, g2, Tea, one-off, 200",
        // Payment not settled yet
        "redeem, 6000, T2",
        "confirm, 7000, T2",
        "redeem, 8000, T2",
    ]);

    let mut cmd = Command::new(cargo_bin!());
    cmd.arg(input.path());

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Error processing command"))
        .stdout(predicate::str::contains("T1,g1,Coffee,one-off,300,consumed,0,1,2000"))
        .stdout(predicate::str::contains("T2,g2,Tea,one-off,200,consumed,0,1,8000"))
        .stdout(predicate::str::contains("T1,g2").not());
}

#[test]
fn test_session_commands_without_active_session() {
    let input = replay_file(&[
        "purchase, 1000, T1, g1, Day pass, daily, 1500",
        "pause, 2000, T1",
        "redeem, 3000, T1",
        "checkout, 4000, T1",
        "resume, 5000, T1",
    ]);

    let mut cmd = Command::new(cargo_bin!());
    cmd.arg(input.path()).arg("--report").arg("check-ins");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("active session"))
        .stdout(predicate::str::contains("T1,g1,closed,3000,4000,0,00:00:01"));
}

#[test]
fn test_empty_input_prints_header_only() {
    let input = replay_file(&[]);

    let mut cmd = Command::new(cargo_bin!());
    cmd.arg(input.path());

    cmd.assert().success().stdout(predicate::eq(
        "token,guest,service,service_type,amount,status,progress_used,progress_total,consumed_at\n",
    ));
}
