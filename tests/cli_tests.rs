//! CLI tests for the `taskboard` binary.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// A taskboard command isolated from the caller's environment and config.
fn taskboard(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("taskboard");
    cmd.current_dir(dir.path())
        .env_remove("TASKBOARD_BACKEND_URL")
        .env_remove("TASKBOARD_TOKEN")
        .env_remove("TASKBOARD_LOG")
        .env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("taskboard.toml");
    fs::write(&path, content).unwrap();
    path
}

mod cli_basics {
    use super::*;

    #[test]
    fn test_help_lists_commands() {
        let dir = TempDir::new().unwrap();
        taskboard(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("move-task"))
            .stdout(predicate::str::contains("serve"));
    }

    #[test]
    fn test_version() {
        let dir = TempDir::new().unwrap();
        taskboard(&dir).arg("--version").assert().success();
    }

    #[test]
    fn test_move_task_requires_index() {
        let dir = TempDir::new().unwrap();
        taskboard(&dir)
            .args(["move-task", "--workspace", "w1", "--task", "t1", "--to-list", "l1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--index"));
    }
}

mod config_commands {
    use super::*;

    #[test]
    fn test_config_init_writes_defaults() {
        let dir = TempDir::new().unwrap();
        taskboard(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created"));

        let content = fs::read_to_string(dir.path().join("taskboard.toml")).unwrap();
        assert!(content.contains("[backend]"));
        assert!(content.contains("reorder_attempts = 3"));
    }

    #[test]
    fn test_config_init_keeps_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[backend]\nurl = \"http://example.test\"\n");
        taskboard(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
        assert!(fs::read_to_string(path).unwrap().contains("example.test"));
    }

    #[test]
    fn test_config_show_redacts_token() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "[auth]\ntoken = \"super-secret\"\n");
        taskboard(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("<redacted>"))
            .stdout(predicate::str::contains("super-secret").not());
    }

    #[test]
    fn test_config_show_applies_flag_overrides() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "[backend]\nurl = \"http://from-file:1\"\n");
        taskboard(&dir)
            .args(["--backend-url", "http://from-flag:2", "config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("http://from-flag:2"));
    }

    #[test]
    fn test_config_show_applies_env_overrides() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "[backend]\nurl = \"http://from-file:1\"\n");
        taskboard(&dir)
            .env("TASKBOARD_BACKEND_URL", "http://from-env:3")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("http://from-env:3"));
    }

    #[test]
    fn test_config_validate_reports_problems() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "[backend]\nurl = \"ftp://nope\"\n[sync]\nreorder_attempts = 0\n");
        taskboard(&dir)
            .args(["config", "validate"])
            .assert()
            .failure()
            .stdout(predicate::str::contains("backend.url must use http or https"))
            .stdout(predicate::str::contains("sync.reorder_attempts"));
    }

    #[test]
    fn test_config_validate_defaults_are_valid() {
        let dir = TempDir::new().unwrap();
        taskboard(&dir)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration is valid."));
    }

    #[test]
    fn test_explicit_missing_config_fails() {
        let dir = TempDir::new().unwrap();
        taskboard(&dir)
            .args(["--config", "missing.toml", "config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to read config file"));
    }
}

mod board_commands {
    use super::*;
    use std::net::TcpListener as StdListener;
    use taskboard::server::{self, ServerConfig};

    /// A reference backend on its own runtime, alive for the test's duration.
    struct Backend {
        url: String,
        _runtime: tokio::runtime::Runtime,
    }

    fn start_backend() -> Backend {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let listener = StdListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let state = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            accepted_tokens: vec!["cli-token".to_string()],
            channel_capacity: 16,
        }
        .into_state();
        runtime.spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            let _ = server::serve(listener, state, std::future::pending()).await;
        });
        Backend {
            url,
            _runtime: runtime,
        }
    }

    fn board_cmd(dir: &TempDir, backend: &Backend) -> Command {
        let mut cmd = taskboard(dir);
        cmd.args(["--backend-url", &backend.url, "--token", "cli-token"]);
        cmd
    }

    fn show_json(dir: &TempDir, backend: &Backend) -> serde_json::Value {
        let output = board_cmd(dir, backend)
            .args(["show", "--workspace", "w1", "--json"])
            .output()
            .unwrap();
        assert!(output.status.success());
        serde_json::from_slice(&output.stdout).unwrap()
    }

    fn task_titles(board: &serde_json::Value, list: usize) -> Vec<String> {
        board["lists"][list]["tasks"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["title"].as_str().unwrap().to_string())
            .collect()
    }

    fn id_of(value: &serde_json::Value) -> String {
        value["id"].as_str().unwrap().to_string()
    }

    fn empty_dir() -> TempDir {
        TempDir::new().unwrap()
    }

    #[test]
    fn test_show_empty_board() {
        let backend = start_backend();
        let dir = empty_dir();
        board_cmd(&dir, &backend)
            .args(["show", "--workspace", "w1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("(empty board)"));
    }

    #[test]
    fn test_add_list_and_tasks_then_move() {
        let backend = start_backend();
        let dir = empty_dir();

        board_cmd(&dir, &backend)
            .args(["add-list", "--workspace", "w1", "Todo"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created list Todo"));
        let board = show_json(&dir, &backend);
        let list_id = id_of(&board["lists"][0]);

        for title in ["A", "B", "C"] {
            board_cmd(&dir, &backend)
                .args(["add-task", "--workspace", "w1", "--list", &list_id, title])
                .assert()
                .success();
        }
        let board = show_json(&dir, &backend);
        assert_eq!(task_titles(&board, 0), ["A", "B", "C"]);
        let a = id_of(&board["lists"][0]["tasks"][0]);

        board_cmd(&dir, &backend)
            .args(["move-task", "--workspace", "w1", "--task", &a, "--to-list", &list_id, "--index", "9"])
            .assert()
            .success()
            .stdout(predicate::str::contains("at position 2"));
        assert_eq!(task_titles(&show_json(&dir, &backend), 0), ["B", "C", "A"]);

        board_cmd(&dir, &backend)
            .args(["move-task", "--workspace", "w1", "--task", &a, "--to-list", &list_id, "--index", "2"])
            .assert()
            .success()
            .stdout(predicate::str::contains("nothing to do"));

        board_cmd(&dir, &backend)
            .args(["delete-task", "--workspace", "w1", &a])
            .assert()
            .success();
        assert_eq!(task_titles(&show_json(&dir, &backend), 0), ["B", "C"]);

        board_cmd(&dir, &backend)
            .args(["delete-list", "--workspace", "w1", &list_id])
            .assert()
            .success();
        let board = show_json(&dir, &backend);
        assert!(board["lists"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_watch_prints_changes_made_by_another_client() {
        use std::io::{BufRead, BufReader};
        use std::process::{Command as StdCommand, Stdio};
        use std::time::{Duration, Instant};

        let backend = start_backend();
        let dir = empty_dir();
        let mut child = StdCommand::new(env!("CARGO_BIN_EXE_taskboard"))
            .current_dir(dir.path())
            .env_remove("TASKBOARD_BACKEND_URL")
            .env_remove("TASKBOARD_TOKEN")
            .env_remove("RUST_LOG")
            .args(["--backend-url", &backend.url, "--token", "cli-token"])
            .args(["watch", "--workspace", "w1", "--updates", "1"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();

        // The banner is printed once the room is joined and the board loaded.
        let mut stdout = BufReader::new(child.stdout.take().unwrap());
        let mut line = String::new();
        stdout.read_line(&mut line).unwrap();
        assert!(line.contains("Watching"), "unexpected first line: {}", line);

        board_cmd(&dir, &backend)
            .args(["add-list", "--workspace", "w1", "Live"])
            .assert()
            .success();

        let deadline = Instant::now() + Duration::from_secs(10);
        let status = loop {
            if let Some(status) = child.try_wait().unwrap() {
                break status;
            }
            if Instant::now() > deadline {
                let _ = child.kill();
                panic!("watch did not exit after the update");
            }
            std::thread::sleep(Duration::from_millis(20));
        };
        assert!(status.success());

        let mut rest = String::new();
        std::io::Read::read_to_string(&mut stdout, &mut rest).unwrap();
        assert!(rest.contains("board updated"));
        assert!(rest.contains("Live"));
    }

    #[test]
    fn test_watch_without_backend_fails() {
        let dir = empty_dir();
        taskboard(&dir)
            .args(["--backend-url", "http://127.0.0.1:9", "--token", "t"])
            .args(["watch", "--workspace", "w1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to connect"));
    }

    #[test]
    fn test_blank_title_is_rejected() {
        let backend = start_backend();
        let dir = empty_dir();
        board_cmd(&dir, &backend)
            .args(["add-list", "--workspace", "w1", "   "])
            .assert()
            .failure()
            .stderr(predicate::str::contains("title must not be empty"));
    }

    #[test]
    fn test_wrong_token_fails() {
        let backend = start_backend();
        let dir = empty_dir();
        taskboard(&dir)
            .args(["--backend-url", &backend.url, "--token", "nope"])
            .args(["show", "--workspace", "w1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unauthorized"));
    }

    #[test]
    fn test_missing_token_fails() {
        let backend = start_backend();
        let dir = empty_dir();
        taskboard(&dir)
            .args(["--backend-url", &backend.url])
            .args(["show", "--workspace", "w1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to fetch board"));
    }

    #[test]
    fn test_deleting_unknown_task_fails() {
        let backend = start_backend();
        let dir = empty_dir();
        board_cmd(&dir, &backend)
            .args(["delete-task", "--workspace", "w1", "ghost"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Not found"));
    }

    #[test]
    fn test_moving_unknown_task_fails() {
        let backend = start_backend();
        let dir = empty_dir();
        board_cmd(&dir, &backend)
            .args(["move-task", "--workspace", "w1", "--task", "ghost", "--to-list", "l1", "--index", "0"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not on this board"));
    }
}
