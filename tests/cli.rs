use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use video_mindmap::config::Config;

/// Binary isolated from any user configuration
fn video_mindmap(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("video-mindmap").unwrap();
    cmd.current_dir(home.path())
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join(".config"))
        .env_remove("RUST_LOG")
        .env_remove("MINDMAP_MAX_RETRIES")
        .env_remove("MINDMAP_STAGE_TIMEOUT")
        .env_remove("MINDMAP_MAX_DEPTH");
    cmd
}

#[test]
fn test_platforms_lists_supported_sites() {
    let home = TempDir::new().unwrap();

    video_mindmap(&home)
        .arg("platforms")
        .assert()
        .success()
        .stdout(predicate::str::contains("YouTube"))
        .stdout(predicate::str::contains("Bilibili"))
        .stdout(predicate::str::contains("Xiaoyuzhou"));
}

#[test]
fn test_invalid_url_fails_in_acquisition() {
    let home = TempDir::new().unwrap();
    let out = home.path().join("out");

    video_mindmap(&home)
        .args(["--quiet", "convert", "not-a-url", "-o"])
        .arg(&out)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("not-a-url"));

    assert!(!out.exists() || out.read_dir().unwrap().next().is_none());
}

#[test]
fn test_out_of_range_depth_is_a_configuration_error() {
    let home = TempDir::new().unwrap();

    video_mindmap(&home)
        .args(["convert", "https://youtu.be/abc", "--max-depth", "9"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("max_outline_depth"));
}

#[test]
fn test_max_retries_from_environment_is_validated() {
    let home = TempDir::new().unwrap();

    video_mindmap(&home)
        .env("MINDMAP_MAX_RETRIES", "0")
        .args(["convert", "https://youtu.be/abc"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("max_retries"));
}

#[test]
fn test_usage_errors_exit_with_one() {
    let home = TempDir::new().unwrap();

    video_mindmap(&home).arg("convert").assert().code(1);
    video_mindmap(&home)
        .args(["convert", "https://youtu.be/abc", "-f", "pdf"])
        .assert()
        .code(1);
}

#[test]
fn test_config_init_writes_loadable_defaults() {
    let home = TempDir::new().unwrap();

    let output = video_mindmap(&home)
        .args(["config", "--init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration written to"))
        .get_output()
        .stdout
        .clone();

    let stdout = String::from_utf8(output).unwrap();
    let path = stdout
        .lines()
        .find_map(|line| line.strip_prefix("Configuration written to "))
        .unwrap()
        .trim()
        .to_string();

    let content = tokio_test::block_on(tokio::fs::read_to_string(&path)).unwrap();
    let config: Config = serde_yaml::from_str(&content).unwrap();
    config.validate().unwrap();
    assert_eq!(config.pipeline.target_language, "zh");
    assert_eq!(config.pipeline.max_retries, 3);

    // A second init must not overwrite the file
    video_mindmap(&home)
        .args(["config", "--init"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("already exists"));
}
