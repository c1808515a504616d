//! Configuration loading and validation tests
//!
//! Tests focus on how a config file on disk shapes the `conn` command.

use mqttsh::command::ConnCommand;
use mqttsh::config::{ConfigError, ShellConfig};
use mqttsh::session::SessionContext;
use mqttsh::{OutputFormat, ShellError};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    write!(temp_file, "{content}").unwrap();
    temp_file
}

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let temp_file = write_config(
        r#"
[broker]
network = "tcp6"
address = "[::1]:1883"
connack_timeout_secs = 5

[session]
client_id = "bench-7"
clean_session = false
keep_alive_secs = 15

[output]
format = "json"
"#,
    );

    let config = ShellConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.broker.network, "tcp6");
    assert_eq!(config.broker.address, "[::1]:1883");
    assert_eq!(config.broker.connack_timeout_secs, Some(5));
    assert_eq!(config.session.client_id.as_deref(), Some("bench-7"));
    assert!(!config.session.clean_session);
    assert_eq!(config.session.keep_alive_secs, Some(15));
    assert_eq!(config.output.format, OutputFormat::Json);
}

#[test]
fn test_missing_file_is_a_read_error() {
    let result = ShellConfig::load(Some(Path::new("/nonexistent/mqttsh.toml")));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_malformed_toml_is_a_parse_error() {
    let temp_file = write_config("[broker\naddress = ");
    let result = ShellConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_invalid_values_fail_validation() {
    let temp_file = write_config("[broker]\nnetwork = \"udp\"\n");
    let err = ShellConfig::load_from_file(temp_file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidConfig(_)));
    assert!(err.to_string().contains("udp"));
}

#[test]
fn test_config_values_become_conn_defaults() {
    let config = ShellConfig::from_toml(
        r#"
[broker]
address = "10.0.0.5:1883"
connack_timeout_secs = 3

[session]
client_id = "from-file"
keep_alive_secs = 0
"#,
    )
    .unwrap();

    let ctx = Arc::new(SessionContext::new());
    let cmd = ConnCommand::with_defaults(Vec::<String>::new(), ctx, &config).unwrap();

    assert_eq!(cmd.network, "tcp");
    assert_eq!(cmd.address, "10.0.0.5:1883");
    assert_eq!(cmd.handshake_timeout, Some(Duration::from_secs(3)));
    assert_eq!(cmd.connect_options.client_id, "from-file");
    assert_eq!(cmd.connect_options.keep_alive, Some(0));
    assert!(cmd.connect_options.clean_session);
}

#[test]
fn test_flags_override_config_values() {
    let config = ShellConfig::from_toml(
        r#"
[broker]
address = "10.0.0.5:1883"

[session]
client_id = "from-file"
clean_session = true
"#,
    )
    .unwrap();

    let ctx = Arc::new(SessionContext::new());
    let cmd = ConnCommand::with_defaults(
        ["-a", "127.0.0.1:2883", "-i", "from-flag", "--clean-session", "false"],
        ctx,
        &config,
    )
    .unwrap();

    assert_eq!(cmd.address, "127.0.0.1:2883");
    assert_eq!(cmd.connect_options.client_id, "from-flag");
    assert!(!cmd.connect_options.clean_session);
}

#[test]
fn test_unset_password_variable_fails_conn() {
    let config = ShellConfig::from_toml(
        r#"
[session]
username_env = "MQTTSH_TEST_UNSET_USER_VAR"
password_env = "MQTTSH_TEST_UNSET_PASSWORD_VAR"
"#,
    )
    .unwrap();

    let ctx = Arc::new(SessionContext::new());
    let result = ConnCommand::with_defaults(Vec::<String>::new(), ctx, &config);
    assert!(matches!(
        result,
        Err(ShellError::Config(ConfigError::EnvVarNotFound(name))) if name == "MQTTSH_TEST_UNSET_PASSWORD_VAR"
    ));
}

#[test]
fn test_config_round_trips_through_toml() {
    let config = ShellConfig::default();
    let rendered = toml::to_string_pretty(&config).unwrap();
    assert_eq!(ShellConfig::from_toml(&rendered).unwrap(), config);
}
