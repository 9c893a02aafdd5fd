use serde_json::{json, Value};
use std::process::{Command, Output};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn haunted_command() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_haunted"));
    cmd.env_remove("RUST_LOG")
        .env_remove("HAUNTED_SERVER_URL")
        .env("HAUNTED_LOGGING__JSON_FORMAT", "false");
    cmd
}

fn run_haunted(args: &[&str]) -> Output {
    haunted_command()
        .args(args)
        .output()
        .expect("Failed to execute haunted command")
}

fn run_haunted_with_env(args: &[&str], env_vars: Vec<(String, String)>) -> Output {
    let mut cmd = haunted_command();
    cmd.args(args);
    for (key, value) in env_vars {
        cmd.env(key, value);
    }
    cmd.output().expect("Failed to execute haunted command")
}

fn output_to_string(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr_to_string(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

mod version_command_tests {
    use super::*;

    #[test]
    fn test_version_command_basic() {
        let output = run_haunted(&["version"]);
        let stdout = output_to_string(&output);

        assert!(output.status.success(), "version command should succeed");
        assert!(stdout.contains("haunted"), "output should contain 'haunted'");
        assert!(
            stdout.contains(env!("CARGO_PKG_VERSION")),
            "output should contain version number"
        );
    }

    #[test]
    fn test_version_command_detailed() {
        let output = run_haunted(&["version", "--detailed"]);
        let stdout = output_to_string(&output);

        assert!(output.status.success(), "version --detailed should succeed");
        assert!(stdout.contains("Version"));
        for stage in ["story", "asset", "code", "deploy"] {
            assert!(stdout.contains(stage), "pipeline should list {}", stage);
        }
    }
}

mod help_tests {
    use super::*;

    #[test]
    fn test_help_lists_commands() {
        let output = run_haunted(&["--help"]);
        let stdout = output_to_string(&output);

        assert!(output.status.success());
        for command in ["init", "serve", "run", "rooms", "logs", "version"] {
            assert!(stdout.contains(command), "help should mention '{}'", command);
        }
    }

    #[test]
    fn test_rooms_help_lists_actions() {
        let output = run_haunted(&["rooms", "--help"]);
        let stdout = output_to_string(&output);

        assert!(output.status.success());
        for action in ["create", "show", "list", "start", "cancel"] {
            assert!(stdout.contains(action), "rooms help should mention '{}'", action);
        }
    }

    #[test]
    fn test_unknown_command_fails() {
        let output = run_haunted(&["summon"]);
        assert!(!output.status.success());
    }

    #[test]
    fn test_run_requires_input() {
        let output = run_haunted(&["run", "--owner", "0xghost"]);
        assert!(!output.status.success());
        assert!(stderr_to_string(&output).contains("--input"));
    }
}

mod server_command_tests {
    use super::*;

    #[test]
    fn test_rooms_list_against_unreachable_server() {
        let output = run_haunted(&[
            "rooms",
            "list",
            "--owner",
            "0xghost",
            "--server",
            "http://127.0.0.1:9",
        ]);

        assert!(!output.status.success());
        assert!(stderr_to_string(&output).contains("Could not reach"));
    }

    #[test]
    fn test_logs_against_unreachable_server() {
        let output = run_haunted_with_env(
            &["logs", "7f1c6bd8-4a57-4b5e-9f43-1f1f0a9c2a10"],
            vec![("HAUNTED_SERVER_URL".to_string(), "http://127.0.0.1:9".to_string())],
        );

        assert!(!output.status.success());
    }
}

mod run_command_tests {
    use super::*;

    async fn agent_server(code: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        let routes = [
            (
                "/story",
                ResponseTemplate::new(200).set_body_json(json!({
                    "text": "The lighthouse keeper never came back down the stairs."
                })),
            ),
            (
                "/asset",
                ResponseTemplate::new(200).set_body_json(json!({
                    "imageUrl": "https://images.example/lighthouse.png"
                })),
            ),
            ("/code", code),
            (
                "/deploy",
                ResponseTemplate::new(200).set_body_json(json!({
                    "deployedUrl": "https://lighthouse.example"
                })),
            ),
        ];
        for (route, template) in routes {
            Mock::given(method("POST"))
                .and(path(route))
                .respond_with(template)
                .mount(&server)
                .await;
        }
        server
    }

    fn agent_env(server: &MockServer) -> Vec<(String, String)> {
        ["story", "asset", "code", "deploy"]
            .iter()
            .map(|stage| {
                (
                    format!("HAUNTED_AGENTS__{}__URL", stage.to_uppercase()),
                    format!("{}/{}", server.uri(), stage),
                )
            })
            .collect()
    }

    async fn run_pipeline(server: &MockServer, format: &str) -> Output {
        let env = agent_env(server);
        let format = format.to_string();
        tokio::task::spawn_blocking(move || {
            run_haunted_with_env(
                &[
                    "run",
                    "--owner",
                    "0xghost",
                    "--input",
                    "A haunted lighthouse",
                    "--format",
                    &format,
                ],
                env,
            )
        })
        .await
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_completes_pipeline() {
        let server = agent_server(ResponseTemplate::new(200).set_body_json(json!({
            "code": "export const game = () => 'boo';",
            "tested": true
        })))
        .await;

        let output = run_pipeline(&server, "text").await;
        let stdout = output_to_string(&output);

        assert!(
            output.status.success(),
            "run should succeed: {}",
            stderr_to_string(&output)
        );
        assert!(stdout.contains("All stages complete"));
        assert!(stdout.contains("done"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_json_prints_snapshot() {
        let server = agent_server(ResponseTemplate::new(200).set_body_json(json!({
            "code": "export const game = () => 'boo';",
            "tested": true
        })))
        .await;

        let output = run_pipeline(&server, "json").await;
        assert!(output.status.success());

        let snapshot: Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(snapshot["results"].as_array().unwrap().len(), 4);
        assert_eq!(snapshot["room"]["owner_id"], "0xghost");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_exits_non_zero_when_room_fails() {
        let server = agent_server(
            ResponseTemplate::new(400).set_body_json(json!({ "error": "story too spooky" })),
        )
        .await;

        let output = run_pipeline(&server, "text").await;

        assert!(!output.status.success());
        assert!(stderr_to_string(&output).contains("failed"));
    }
}
