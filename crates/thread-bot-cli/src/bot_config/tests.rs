use std::fs;
use std::time::Duration;

use tempfile::tempdir;
use thread_bot_engine::{ChannelId, GuildId, RoleId};
use toml::Table;

use super::{check_required_keys, merge_tables, BotConfig, DEFAULT_CONFIG_FILE, USER_CONFIG_FILE};

const DEFAULTS: &str = r#"
[bot]
name = "Thread Bot"

[stats]
statsd_host = "graphite.default.svc.cluster.local"

[guild]
id = 267624335836053506

[guild.channels]
nomination_voting = 822853512709931008
dev_log = 622895325144940554

[guild.roles]
mod_team = 267629731250176001
admins = 267628507062992896

[engine]
nomination_archive_minutes = 1440
"#;

fn table(raw: &str) -> Table {
    toml::from_str::<Table>(raw).expect("toml")
}

#[test]
fn unit_merge_tables_recurses_into_nested_tables_and_replaces_scalars() {
    let mut base = table(
        r#"
        [guild]
        id = 1
        [guild.channels]
        nomination_voting = 10
        dev_log = 11
        "#,
    );
    merge_tables(
        &mut base,
        table(
            r#"
            [guild.channels]
            dev_log = 99
            appeals = 12
            "#,
        ),
    );

    let channels = base["guild"]["channels"].as_table().expect("channels");
    assert_eq!(channels["nomination_voting"].as_integer(), Some(10));
    assert_eq!(channels["dev_log"].as_integer(), Some(99));
    assert_eq!(channels["appeals"].as_integer(), Some(12));
    assert_eq!(base["guild"]["id"].as_integer(), Some(1));
}

#[test]
fn unit_merge_tables_lets_scalar_override_replace_a_table() {
    let mut base = table("[stats]\nstatsd_host = \"a\"\n");
    merge_tables(&mut base, table("stats = \"off\"\n"));
    assert_eq!(base["stats"].as_str(), Some("off"));
}

#[test]
fn regression_missing_required_key_names_the_dotted_path() {
    let config = table("[guild]\nid = 1\n[guild.channels]\ndev_log = 2\n");
    let error = check_required_keys(&config, &["guild.id", "guild.channels.nomination_voting"])
        .expect_err("missing key");
    assert!(error
        .to_string()
        .contains("`guild.channels.nomination_voting`"));
}

#[test]
fn functional_load_applies_user_overrides_on_top_of_defaults() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join(DEFAULT_CONFIG_FILE), DEFAULTS).expect("write defaults");
    fs::write(
        dir.path().join(USER_CONFIG_FILE),
        r#"
        [guild.channels]
        appeals = 890331800025563216

        [engine]
        recent_message_capacity = 250
        authoritative_fetch_timeout_ms = 2500
        "#,
    )
    .expect("write user config");

    let config = BotConfig::load(dir.path(), false).expect("config");
    assert_eq!(config.guild.id, GuildId(267624335836053506));
    assert_eq!(
        config.guild.channels.appeals,
        Some(ChannelId(890331800025563216))
    );
    assert_eq!(
        config.guild.channels.dev_log,
        Some(ChannelId(622895325144940554))
    );
    assert_eq!(config.stats.statsd_host, "graphite.default.svc.cluster.local");
    assert_eq!(config.stats.statsd_port, 8125);
    assert!(!config.debug_mode);

    let engine = config.engine_config();
    assert_eq!(engine.roles.mod_team, RoleId(267629731250176001));
    assert_eq!(engine.recent_message_capacity, 250);
    assert_eq!(engine.authoritative_fetch_timeout, Duration::from_millis(2500));
    assert_eq!(engine.chunked_find_chunk_size, 100);
    assert_eq!(engine.appeal_archive_minutes, 10_080);
    assert_eq!(
        config.expected_channels(),
        vec![
            ("nomination_voting".to_string(), ChannelId(822853512709931008)),
            ("appeals".to_string(), ChannelId(890331800025563216)),
            ("dev_log".to_string(), ChannelId(622895325144940554)),
        ]
    );
}

#[test]
fn functional_debug_mode_shortens_appeal_archive_and_targets_local_statsd() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join(DEFAULT_CONFIG_FILE), DEFAULTS).expect("write defaults");

    let config = BotConfig::load(dir.path(), true).expect("config");
    assert!(config.debug_mode);
    assert_eq!(config.stats.statsd_host, "127.0.0.1");
    assert_eq!(config.engine_config().appeal_archive_minutes, 1_440);
}

#[test]
fn regression_missing_defaults_file_is_a_startup_error() {
    let dir = tempdir().expect("tempdir");
    let error = BotConfig::load(dir.path(), false).expect_err("missing defaults");
    assert!(error.to_string().contains(DEFAULT_CONFIG_FILE));
}

#[test]
fn regression_zero_recent_message_capacity_is_rejected() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join(DEFAULT_CONFIG_FILE), DEFAULTS).expect("write defaults");
    fs::write(
        dir.path().join(USER_CONFIG_FILE),
        "[engine]\nrecent_message_capacity = 0\n",
    )
    .expect("write user config");

    let error = BotConfig::load(dir.path(), false).expect_err("zero capacity");
    assert!(error.to_string().contains("recent_message_capacity"));
}
