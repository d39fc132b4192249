use super::*;

const SAMPLE: &str = r##"
server:
  host: irc.example.net
  tls: true
identity:
  nick: voidbot
  user: void
  realname: Void Bot
channels: ["#voidptr"]
plugins: [urls]
plugin-config:
  urls:
    database: ./history.db
    max-age: 30
"##;

#[test]
fn parses_kebab_case_sections_with_defaults() {
    let config = Config::parse(SAMPLE).unwrap();
    assert_eq!(config.server.port, 6667);
    assert!(config.server.tls);
    assert_eq!(config.identity.realname, "Void Bot");
    assert_eq!(config.plugins.as_deref(), Some(&["urls".to_string()][..]));
    assert_eq!(config.reconnect_delay_secs, 10);

    let urls = config.plugin_settings("urls");
    assert_eq!(urls.get_str("database"), Some("./history.db"));
    assert_eq!(urls.get::<u32>("max-age").unwrap(), Some(30));
    assert!(urls.get::<u32>("database").is_err());
    assert!(config.plugin_settings("stocks").is_empty());
    assert!(config.validate().is_ok());
}

#[test]
fn missing_plugin_list_means_all_plugins() {
    let config = Config::parse("server: {host: h}\nidentity: {nick: n, user: u, realname: r}\n").unwrap();
    assert!(config.plugins.is_none());
}

#[test]
fn validate_requires_server_and_identity() {
    let mut config = Config::default();
    config.server.host = " ".into();
    assert!(matches!(config.validate(), Err(ConfigError::MissingField(f)) if f == "server.host"));

    let mut config = Config::default();
    config.identity.user.clear();
    assert!(matches!(config.validate(), Err(ConfigError::MissingField(f)) if f == "identity.user"));
}

#[test]
fn sample_config_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    Config::write_sample(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.identity.nick, "voidbot");
    assert_eq!(loaded.plugin_settings("urls").get_str("database"), Some("./history.db"));
}

#[test]
fn load_reports_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        Config::load(dir.path().join("absent.yaml")),
        Err(ConfigError::NotFound(_))
    ));
}
