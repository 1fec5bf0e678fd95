// CLI integration tests
// These run the compiled binary against an isolated config file

use hx3::mock;
use serde_json::json;
use std::process::Command;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CLI_BINARY: &str = env!("CARGO_BIN_EXE_hx3");

fn cli(config_dir: &TempDir) -> Command {
    let mut command = Command::new(CLI_BINARY);
    command
        .env("HX3_CONFIG", config_dir.path().join("hx3.yml"))
        .env("HOME", config_dir.path())
        .env_remove("HX3_EMAIL")
        .env_remove("HX3_API_URL");
    command
}

#[test]
fn test_cli_status_command_not_logged_in() {
    let dir = TempDir::new().unwrap();
    let output = cli(&dir)
        .arg("status")
        .output()
        .expect("Failed to execute CLI");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Not logged in"));
}

#[test]
fn test_cli_mode_command_not_logged_in() {
    let dir = TempDir::new().unwrap();
    let output = cli(&dir)
        .args(["mode", "cool"])
        .output()
        .expect("Failed to execute CLI");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Not logged in"));
}

#[test]
fn test_cli_help_command() {
    let output = Command::new(CLI_BINARY)
        .arg("--help")
        .output()
        .expect("Failed to execute CLI");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("A CLI for controlling Johnson Controls Hx 3 thermostats"));
    for command in [
        "login", "logout", "status", "mode", "fan", "away", "setpoint", "humidity", "watch",
    ] {
        assert!(stdout.contains(command), "missing {}", command);
    }
}

#[test]
fn test_cli_version_command() {
    let output = Command::new(CLI_BINARY)
        .arg("--version")
        .output()
        .expect("Failed to execute CLI");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("hx3"));
}

#[test]
fn test_cli_invalid_command() {
    let output = Command::new(CLI_BINARY)
        .arg("invalid-command")
        .output()
        .expect("Failed to execute CLI");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error:") || stderr.contains("unrecognized"));
}

#[test]
fn test_cli_invalid_mode_value() {
    let dir = TempDir::new().unwrap();
    let output = cli(&dir)
        .args(["mode", "warp"])
        .output()
        .expect("Failed to execute CLI");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown Mode"));
}

#[test]
fn test_cli_login_command_help() {
    let output = Command::new(CLI_BINARY)
        .args(["login", "--help"])
        .output()
        .expect("Failed to execute CLI");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Login and store credentials for future use"));
    assert!(stdout.contains("--email"));
    assert!(stdout.contains("--token"));
    assert!(stdout.contains("optional, will prompt if not provided"));
}

#[test]
fn test_cli_logout_command() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("hx3.yml");
    std::fs::write(&config_path, "email: test@example.com\ntoken: T\n").unwrap();

    let output = cli(&dir)
        .arg("logout")
        .output()
        .expect("Failed to execute CLI");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Logged out successfully"));
    assert!(!config_path.exists());
}

#[tokio::test]
async fn test_cli_login_and_status_with_mock_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "operationName": "signIn" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": mock::sign_in_success("A", "R", 3600) })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "operationName": "refreshToken" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": mock::refresh_success("A2", "R2", 3600) })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "operationName": "me" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "data": mock::me_response("F") })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "operationName": "locations" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": mock::locations_response(vec![mock::location_document(
                "loc1",
                "Home",
                vec![mock::controller_document("c1", "Hallway")],
            )])
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let api_url = server.uri();

    let login = tokio::task::spawn_blocking({
        let mut command = cli(&dir);
        command
            .env("HX3_API_URL", &api_url)
            .args(["login", "--email", "test@example.com", "--token", "T"]);
        move || command.output()
    })
    .await
    .unwrap()
    .expect("Failed to execute CLI");

    assert!(login.status.success(), "{}", String::from_utf8_lossy(&login.stderr));
    assert!(String::from_utf8_lossy(&login.stdout).contains("Logged in as test@example.com"));
    let saved = std::fs::read_to_string(dir.path().join("hx3.yml")).unwrap();
    assert!(saved.contains("access_token: A"));

    let status = tokio::task::spawn_blocking({
        let mut command = cli(&dir);
        command.env("HX3_API_URL", &api_url).arg("status");
        move || command.output()
    })
    .await
    .unwrap()
    .expect("Failed to execute CLI");

    assert!(status.status.success(), "{}", String::from_utf8_lossy(&status.stderr));
    let stdout = String::from_utf8_lossy(&status.stdout);
    assert!(stdout.contains("Hallway"));
    assert!(stdout.contains("HEAT"));

    // Tokens refreshed while connecting are written back.
    let saved = std::fs::read_to_string(dir.path().join("hx3.yml")).unwrap();
    assert!(saved.contains("access_token: A2"));
}
