use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

#[test]
fn test_cli_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!("automarket"));
    cmd.arg("tests/fixtures/commands.jsonl")
        .arg("--seed")
        .arg("tests/fixtures/users.json");

    let output = cmd.output()?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;

    // One envelope per command line; comments and blank lines produce none.
    assert_eq!(lines.len(), 8);
    assert_eq!(lines[0]["data"]["status"], "open");
    assert_eq!(lines[2]["data"]["contract"]["agreed_price"], "500.00");
    assert_eq!(lines[3]["data"]["commission"], "50.00");
    assert_eq!(lines[3]["data"]["expert_amount"], "950.00");
    assert_eq!(lines[4]["data"]["status"], "paid");
    assert_eq!(lines[5]["success"], false);
    assert_eq!(lines[5]["error"]["code"], "BAD_REQUEST");
    assert_eq!(lines[6]["error"]["code"], "CONFLICT");
    assert_eq!(lines[7]["error"]["code"], "UNAUTHENTICATED");
    Ok(())
}

#[test]
fn test_cli_exports_payments() {
    let export = tempfile::NamedTempFile::new().unwrap();

    let mut cmd = Command::new(cargo_bin!("automarket"));
    cmd.arg("tests/fixtures/commands.jsonl")
        .arg("--seed")
        .arg("tests/fixtures/users.json")
        .arg("--export-payments")
        .arg(export.path());

    cmd.assert().success();
    let csv = std::fs::read_to_string(export.path()).unwrap();
    assert!(csv.starts_with("id,project_id,client_id,expert_id,amount,commission,expert_amount"));
    assert!(csv.contains(concat!(
        "cccccccc-cccc-4ccc-8ccc-cccccccccccc,aaaaaaaa-aaaa-4aaa-8aaa-aaaaaaaaaaaa,",
        "11111111-1111-4111-8111-111111111111,22222222-2222-4222-8222-222222222222,",
        "1000.00,50.00,950.00,eur,paid,"
    )));
}

#[test]
fn test_cli_commission_rate_from_environment() {
    let mut cmd = Command::new(cargo_bin!("automarket"));
    cmd.arg("tests/fixtures/commands.jsonl")
        .arg("--seed")
        .arg("tests/fixtures/users.json")
        .env("AUTOMARKET_COMMISSION_RATE", "0.10");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"commission\":\"100.00\""))
        .stdout(predicate::str::contains("\"expert_amount\":\"900.00\""));
}

#[test]
fn test_cli_rejects_invalid_configuration() {
    let mut cmd = Command::new(cargo_bin!("automarket"));
    cmd.arg("tests/fixtures/commands.jsonl")
        .arg("--commission-rate")
        .arg("1.5");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("invalid commission rate"));
}

#[test]
fn test_cli_without_seed_rejects_every_command() {
    let mut commands = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        commands,
        r#"{{"op":"list_invoices","actor":"11111111-1111-4111-8111-111111111111"}}"#
    )
    .unwrap();

    let mut cmd = Command::new(cargo_bin!("automarket"));
    cmd.arg(commands.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"code\":\"UNAUTHENTICATED\""));
}

#[test]
fn test_cli_survives_an_amount_beyond_decimal_range() -> Result<(), Box<dyn std::error::Error>> {
    let mut commands = tempfile::NamedTempFile::new()?;
    writeln!(
        commands,
        concat!(
            r#"{{"op":"authorize_payment","actor":"11111111-1111-4111-8111-111111111111","#,
            r#""project_id":"aaaaaaaa-aaaa-4aaa-8aaa-aaaaaaaaaaaa","#,
            r#""expert_id":"22222222-2222-4222-8222-222222222222","#,
            r#""amount":"79228162514264337593543950335"}}"#
        )
    )?;
    writeln!(
        commands,
        r#"{{"op":"list_invoices","actor":"11111111-1111-4111-8111-111111111111"}}"#
    )?;

    let output = Command::new(cargo_bin!("automarket"))
        .arg(commands.path())
        .arg("--seed")
        .arg("tests/fixtures/users.json")
        .output()?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;

    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["error"]["code"], "BAD_REQUEST");
    assert_eq!(lines[1]["success"], true);
    Ok(())
}
