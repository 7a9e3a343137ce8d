mod raw_helpers;

use assert_cmd::{cargo, prelude::*};
use predicates::prelude::*;
use std::process::Command;
use tempfile::TempDir;

fn setup_temp_home() -> TempDir {
    TempDir::new().expect("failed to create temp home")
}

/// Binary isolated from the user's config and cache
fn isolated_cmd(home: &TempDir) -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("fundamentals"));
    cmd.env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join(".config"))
        .env("XDG_CACHE_HOME", home.path().join(".cache"))
        .env_remove("FUNDAMENTALS_CONFIG")
        .env_remove("RUST_LOG")
        .env_remove("NO_COLOR");
    cmd
}

fn base_cmd(home: &TempDir) -> Command {
    let mut cmd = isolated_cmd(home);
    cmd.arg("--no-color");
    cmd
}

#[test]
fn process_writes_every_table() {
    let home = setup_temp_home();
    let raw = home.path().join("raw");
    let processed = home.path().join("processed");
    raw_helpers::write_acme_2023(&raw);

    base_cmd(&home)
        .arg("process")
        .args(["--start-year", "2023", "--end-year", "2023"])
        .arg("--raw-dir")
        .arg(&raw)
        .arg("--processed-dir")
        .arg(&processed)
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ Saved:").count(7))
        .stdout(predicate::str::contains("liquidity.csv"))
        .stdout(predicate::str::contains("profitability.csv"))
        .stdout(predicate::str::contains("\u{001b}[").not());

    for name in [
        "balance_sheet.csv",
        "income_statement.csv",
        "cash_flow.csv",
        "liquidity.csv",
        "debt.csv",
        "efficiency.csv",
        "profitability.csv",
    ] {
        assert!(processed.join(name).exists(), "{} was not written", name);
    }
}

#[test]
fn dashboard_lists_and_shows_processed_company() {
    let home = setup_temp_home();
    let raw = home.path().join("raw");
    let processed = home.path().join("processed");
    raw_helpers::write_acme_2023(&raw);

    base_cmd(&home)
        .arg("process")
        .args(["--start-year", "2023", "--end-year", "2023"])
        .arg("--raw-dir")
        .arg(&raw)
        .arg("--processed-dir")
        .arg(&processed)
        .assert()
        .success();

    base_cmd(&home)
        .args(["dashboard", "--list", "--processed-dir"])
        .arg(&processed)
        .assert()
        .success()
        .stdout(predicate::str::contains("ACME S.A."));

    base_cmd(&home)
        .args(["dashboard", "acme s.a.", "--processed-dir"])
        .arg(&processed)
        .assert()
        .success()
        .stdout(predicate::str::contains("liquidez_corrente"))
        .stdout(predicate::str::contains("2,00"))
        .stdout(predicate::str::contains("\u{001b}[").not());

    base_cmd(&home)
        .args(["dashboard", "ACM", "--processed-dir"])
        .arg(&processed)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("unknown company"))
        .stderr(predicate::str::contains("ACME S.A."));
}

#[test]
fn inverted_year_range_exits_with_error() {
    let home = setup_temp_home();

    base_cmd(&home)
        .arg("process")
        .args(["--start-year", "2025", "--end-year", "2020"])
        .arg("--raw-dir")
        .arg(home.path().join("raw"))
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("invalid year range"));
}

#[test]
fn process_without_universe_points_to_collect() {
    let home = setup_temp_home();

    base_cmd(&home)
        .arg("process")
        .arg("--raw-dir")
        .arg(home.path().join("empty"))
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("fundamentals collect"));
}

#[test]
fn unknown_config_key_is_rejected() {
    let home = setup_temp_home();
    let config = home.path().join("config.toml");
    std::fs::write(&config, "raw_dirr = \"typo\"\n").unwrap();

    base_cmd(&home)
        .arg("--config")
        .arg(&config)
        .args(["dashboard", "--list"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Invalid config file"));
}

#[test]
fn config_file_supplies_directories() {
    let home = setup_temp_home();
    let raw = home.path().join("raw");
    let processed = home.path().join("out");
    raw_helpers::write_acme_2023(&raw);

    let config = home.path().join("config.toml");
    std::fs::write(
        &config,
        format!(
            "raw_dir = {:?}\nprocessed_dir = {:?}\nstart_year = 2023\nend_year = 2023\n",
            raw.display().to_string(),
            processed.display().to_string()
        ),
    )
    .unwrap();

    base_cmd(&home)
        .arg("--config")
        .arg(&config)
        .arg("process")
        .assert()
        .success();

    assert!(processed.join("liquidity.csv").exists());
}

#[test]
fn no_color_env_also_plain_logs() {
    let home = setup_temp_home();
    let raw = home.path().join("raw");
    let processed = home.path().join("processed");
    raw_helpers::write_acme_2023(&raw);

    // 2022 has no files, so the run logs a warning per statement kind
    isolated_cmd(&home)
        .env("NO_COLOR", "1")
        .arg("process")
        .args(["--start-year", "2022", "--end-year", "2023"])
        .arg("--raw-dir")
        .arg(&raw)
        .arg("--processed-dir")
        .arg(&processed)
        .assert()
        .success()
        .stderr(predicate::str::contains("skipping"))
        .stderr(predicate::str::contains("\u{001b}[").not())
        .stdout(predicate::str::contains("\u{001b}[").not());
}
