use std::path::PathBuf;

use clap::Parser;

fn parse_debug_flag(value: &str) -> Result<bool, String> {
    Ok(value.trim().eq_ignore_ascii_case("true"))
}

#[derive(Debug, Parser)]
#[command(
    name = "thread-bot",
    about = "Discord moderation bot that opens and archives nomination and ban appeal threads",
    version
)]
pub struct Cli {
    #[arg(
        long = "config-dir",
        env = "THREAD_BOT_CONFIG_DIR",
        default_value = ".",
        help = "Directory holding config-default.toml and the optional config.toml override"
    )]
    pub config_dir: PathBuf,

    #[arg(
        long = "bot-token",
        env = "BOT_TOKEN",
        hide_env_values = true,
        help = "Discord bot token used for the gateway session and REST calls"
    )]
    pub bot_token: Option<String>,

    #[arg(
        long = "forms-token",
        env = "FORMS_TOKEN",
        hide_env_values = true,
        help = "Forms API token; the ban appeal flow is disabled when absent"
    )]
    pub forms_token: Option<String>,

    #[arg(
        long,
        env = "DEBUG",
        default_value = "false",
        value_parser = parse_debug_flag,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Debug mode: one-day appeal archives, local statsd, no channel existence check"
    )]
    pub debug: bool,

    #[arg(
        long = "log-filter",
        env = "THREAD_BOT_LOG",
        help = "Tracing filter directives; overrides RUST_LOG when set"
    )]
    pub log_filter: Option<String>,

    #[arg(
        long = "appeal-responses",
        env = "THREAD_BOT_APPEAL_RESPONSES",
        default_value = "appeal-responses.json",
        help = "JSON file mapping appeal response names to their snippets"
    )]
    pub appeal_responses: PathBuf,

    #[arg(
        long = "render-appeal-response",
        value_name = "NAME",
        requires = "appealer",
        help = "Render the named appeal response to stdout and exit without connecting"
    )]
    pub render_appeal_response: Option<String>,

    #[arg(
        long,
        help = "Appealer name used by --render-appeal-response"
    )]
    pub appealer: Option<String>,

    #[arg(
        long = "appeal-extras",
        help = "Extra paragraph appended to the rendered appeal response"
    )]
    pub appeal_extras: Option<String>,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{parse_debug_flag, Cli};

    #[test]
    fn unit_debug_flag_accepts_only_true_case_insensitively() {
        assert_eq!(parse_debug_flag("true"), Ok(true));
        assert_eq!(parse_debug_flag("TRUE"), Ok(true));
        assert_eq!(parse_debug_flag("false"), Ok(false));
        assert_eq!(parse_debug_flag("1"), Ok(false));
        assert_eq!(parse_debug_flag(""), Ok(false));
    }

    #[test]
    fn functional_cli_parses_explicit_flags() {
        let cli = Cli::try_parse_from([
            "thread-bot",
            "--config-dir",
            "/etc/thread-bot",
            "--bot-token",
            "secret",
            "--debug",
            "--log-filter",
            "thread_bot_engine=debug",
        ])
        .expect("parse");
        assert_eq!(cli.config_dir.to_string_lossy(), "/etc/thread-bot");
        assert_eq!(cli.bot_token.as_deref(), Some("secret"));
        assert!(cli.debug);
        assert_eq!(cli.log_filter.as_deref(), Some("thread_bot_engine=debug"));
        assert!(cli.render_appeal_response.is_none());
    }

    #[test]
    fn regression_render_response_requires_appealer() {
        let error = Cli::try_parse_from(["thread-bot", "--render-appeal-response", "spam"])
            .expect_err("missing appealer");
        assert!(error.to_string().contains("--appealer"));
    }
}
