use std::fs;
use std::process::{Command, Output};
use std::str;
use tempfile::TempDir;

/// CLI interface tests
#[cfg(test)]
mod cli_tests {
    use super::*;

    fn irbridge(args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_irbridge"))
            .args(args)
            .output()
            .expect("Failed to execute command")
    }

    fn fast_config(dir: &TempDir) -> String {
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[global]\nreceive_timeout_ms = 2000\npoll_interval_ms = 10\nsettle_delay_ms = 0\n",
        )
        .unwrap();
        path.display().to_string()
    }

    #[test]
    fn test_cli_help() {
        let output = irbridge(&["--help"]);
        let stdout = str::from_utf8(&output.stdout).expect("Invalid UTF-8");

        assert!(output.status.success());
        assert!(stdout.contains("Usage:"));
        assert!(stdout.contains("Commands:"));
        for command in ["list", "receive", "send", "relay", "config", "version"] {
            assert!(stdout.contains(command), "help is missing {}", command);
        }
    }

    #[test]
    fn test_cli_version() {
        let output = irbridge(&["version"]);
        let stdout = str::from_utf8(&output.stdout).expect("Invalid UTF-8");
        assert!(output.status.success());
        assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_cli_invalid_command() {
        let output = irbridge(&["invalid-command"]);
        assert!(!output.status.success());
    }

    #[test]
    fn test_cli_invalid_output_format() {
        let output = irbridge(&["--output", "xml", "version"]);
        let stderr = str::from_utf8(&output.stderr).expect("Invalid UTF-8");
        assert!(!output.status.success());
        assert!(stderr.contains("invalid value 'xml'"));
    }

    #[test]
    fn test_simulated_list_as_json() {
        let output = irbridge(&["--simulate", "-q", "-o", "json", "list"]);
        let stdout = str::from_utf8(&output.stdout).expect("Invalid UTF-8");

        assert!(output.status.success());
        let devices: serde_json::Value = serde_json::from_str(stdout).expect("Invalid JSON");
        assert_eq!(devices[0]["port_name"], "/dev/ttySIM0");
    }

    #[test]
    fn test_simulated_receive() {
        let dir = TempDir::new().unwrap();
        let config = fast_config(&dir);
        let output = irbridge(&["--simulate", "-q", "-c", &config, "receive"]);
        let stdout = str::from_utf8(&output.stdout).expect("Invalid UTF-8");

        assert!(output.status.success());
        assert!(stdout.contains("Received: IR_RAW:9000,4500,560,560,560,1690"));
    }

    #[test]
    fn test_simulated_relay_as_json() {
        let dir = TempDir::new().unwrap();
        let config = fast_config(&dir);
        let output = irbridge(&["--simulate", "-q", "-c", &config, "-o", "json", "relay"]);
        let stdout = str::from_utf8(&output.stdout).expect("Invalid UTF-8");

        assert!(output.status.success());
        let report: serde_json::Value = serde_json::from_str(stdout).expect("Invalid JSON");
        assert_eq!(report["command"], "relay");
        assert_eq!(report["status"], "sent");
    }

    #[test]
    fn test_send_rejects_empty_payload() {
        let dir = TempDir::new().unwrap();
        let config = fast_config(&dir);
        let output = irbridge(&["--simulate", "-q", "-c", &config, "send", ""]);
        let stderr = str::from_utf8(&output.stderr).expect("Invalid UTF-8");

        assert!(!output.status.success());
        assert!(stderr.contains("Invalid input"));
    }

    #[test]
    fn test_config_init_and_path() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().display().to_string();

        let output = irbridge(&["-q", "config", "init", &target]);
        assert!(output.status.success());
        assert!(dir.path().join(".irbridge").join("config.toml").exists());

        // A second init refuses to overwrite
        let output = irbridge(&["-q", "config", "init", &target]);
        assert!(!output.status.success());
    }

    #[test]
    fn test_config_show_explicit_file() {
        let dir = TempDir::new().unwrap();
        let config = fast_config(&dir);
        let output = irbridge(&["-q", "-c", &config, "config", "show"]);
        let stdout = str::from_utf8(&output.stdout).expect("Invalid UTF-8");

        assert!(output.status.success());
        assert!(stdout.contains("receive_timeout_ms = 2000"));
        assert!(stdout.contains(&config));
    }

    #[test]
    fn test_missing_config_file_fails() {
        let output = irbridge(&["-c", "/nonexistent/irbridge.toml", "version"]);
        let stderr = str::from_utf8(&output.stderr).expect("Invalid UTF-8");
        assert!(!output.status.success());
        assert!(stderr.contains("Configuration error"));
    }
}
