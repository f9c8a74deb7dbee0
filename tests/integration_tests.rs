use irbridge::infrastructure::config::ConfigManager;
use irbridge::{
    BridgeConfig, ConnectionState, ExchangeStatus, LineSettings, SerialSession, SessionSettings,
    SimulatedTransport, Transport,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::timeout;

/// Integration tests for the irbridge library
#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn test_config_serialization() {
        let config = BridgeConfig::default();
        let toml_str = toml::to_string(&config).expect("Failed to serialize config");
        let deserialized: BridgeConfig =
            toml::from_str(&toml_str).expect("Failed to deserialize config");

        assert_eq!(config.global.log_level, deserialized.global.log_level);
        assert_eq!(config.global.receive_timeout_ms, deserialized.global.receive_timeout_ms);
    }

    #[test]
    fn test_session_settings_from_config() {
        let config: BridgeConfig = toml::from_str(
            "[global]\nreceive_timeout_ms = 1200\npoll_interval_ms = 0\n",
        )
        .unwrap();
        let settings = SessionSettings::from(&config.global);

        assert_eq!(settings.receive_timeout, Duration::from_millis(1200));
        assert_eq!(settings.poll_interval, Duration::from_millis(1));
        assert_eq!(settings.write_timeout, Duration::from_millis(1000));
    }

    #[test]
    fn test_config_file_round_trip_through_manager() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_paths(None, None);
        let path = manager.init_project_config(dir.path()).unwrap();

        let project = ConfigManager::with_paths(None, Some(path.clone()));
        assert_eq!(project.active_config_path(), Some(path.as_path()));
        assert_eq!(project.load_config().unwrap().global.permission_timeout_ms, 30_000);
    }

    #[test]
    fn test_line_settings_are_fixed() {
        let settings = LineSettings::default();
        assert_eq!(settings.baud_rate, 115_200);
        assert_eq!(settings.to_string(), "115200 8N1");
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Disconnected.to_string(), "Disconnected");
        assert_eq!(ConnectionState::AwaitingPermission.to_string(), "Awaiting permission");
        assert_eq!(ExchangeStatus::Idle.to_string(), "No signal received yet");
        assert_eq!(
            ExchangeStatus::Received("IR_RAW:1".to_string()).to_string(),
            "Received: IR_RAW:1"
        );
    }

    #[tokio::test]
    async fn test_session_lifecycle_with_default_settings() {
        let transport = SimulatedTransport::ir_device("560,560", Duration::from_millis(20));
        let shared: Arc<dyn Transport> = Arc::new(transport.clone());
        let session = SerialSession::new(shared, SessionSettings::default());

        assert_eq!(session.status(), ExchangeStatus::Idle);
        session.connect().await.expect("connect failed");
        assert!(session.is_connected());

        let payload = timeout(Duration::from_secs(5), session.receive())
            .await
            .expect("receive hung")
            .expect("receive failed");
        assert_eq!(payload, "IR_RAW:560,560");
        assert_eq!(session.status().payload(), Some("IR_RAW:560,560"));

        session.close().await;
        assert!(!session.is_connected());
        assert_eq!(transport.close_count(), 1);
    }

    #[tokio::test]
    async fn test_dropping_last_handle_releases_link() {
        let transport = SimulatedTransport::new();
        {
            let session = SerialSession::new(Arc::new(transport.clone()), SessionSettings::default());
            session.connect().await.unwrap();
            let clone = session.clone();
            drop(session);
            assert!(clone.is_connected());
        }
        assert_eq!(transport.close_count(), 1);
    }

    #[test]
    fn test_simulated_enumeration() {
        let transport = SimulatedTransport::new();
        let devices = transport.enumerate().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].port_name, SimulatedTransport::DEFAULT_PORT);
    }
}
