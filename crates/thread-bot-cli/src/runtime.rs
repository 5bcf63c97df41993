use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use thread_bot_discord::{
    run_gateway, DeferredStatsdSink, DiscordApiClient, DiscordApiClientConfig,
    DiscordEventHandler, FormsApiClient, GatewayBridge, StartupTasks, STATSD_CONNECT_ATTEMPTS,
    STATSD_CONNECT_BASE_DELAY,
};
use thread_bot_engine::{AppealResponseCatalog, AppealSource, ChannelDispatcher, Engine, StatsSink};

use crate::bot_config::BotConfig;
use crate::cli_args::Cli;

pub(crate) async fn run_cli(cli: Cli) -> Result<()> {
    if let Some(response) = cli.render_appeal_response.as_deref() {
        let appealer = cli
            .appealer
            .as_deref()
            .ok_or_else(|| anyhow!("--appealer is required with --render-appeal-response"))?;
        let rendered = render_appeal_response(
            &cli.appeal_responses,
            response,
            appealer,
            cli.appeal_extras.as_deref(),
        )?;
        println!("{rendered}");
        return Ok(());
    }

    let config = BotConfig::load(&cli.config_dir, cli.debug).with_context(|| {
        format!(
            "failed to load configuration from {}",
            cli.config_dir.display()
        )
    })?;
    let token = cli
        .bot_token
        .as_deref()
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| anyhow!("BOT_TOKEN is required to connect to discord"))?;
    run_bot(config, token, cli.forms_token.as_deref()).await
}

pub(crate) fn render_appeal_response(
    catalog_path: &Path,
    response: &str,
    appealer: &str,
    extras: Option<&str>,
) -> Result<String> {
    let raw = std::fs::read_to_string(catalog_path).with_context(|| {
        format!(
            "failed to read appeal responses {}",
            catalog_path.display()
        )
    })?;
    let catalog = AppealResponseCatalog::from_json_str(&raw).with_context(|| {
        format!(
            "failed to parse appeal responses {}",
            catalog_path.display()
        )
    })?;
    Ok(catalog.render(response, appealer, extras)?)
}

/// Counters are dropped until the background connect succeeds.
fn build_stats(config: &BotConfig) -> Arc<dyn StatsSink> {
    let sink = Arc::new(DeferredStatsdSink::new());
    let stats = config.stats.clone();
    let connecting = sink.clone();
    tokio::spawn(async move {
        match connecting
            .connect_with_retry(
                &stats.statsd_host,
                stats.statsd_port,
                &stats.prefix,
                STATSD_CONNECT_ATTEMPTS,
                STATSD_CONNECT_BASE_DELAY,
            )
            .await
        {
            Ok(target) => {
                tracing::info!(target_addr = %target, prefix = %stats.prefix, "statsd sink ready");
            }
            Err(error) => {
                tracing::warn!(error = %error, "statsd unavailable, counters disabled");
            }
        }
    });
    sink
}

fn build_appeal_source(
    config: &BotConfig,
    forms_token: Option<&str>,
) -> Result<Option<Arc<dyn AppealSource>>> {
    let Some(token) = forms_token.map(str::trim).filter(|token| !token.is_empty()) else {
        tracing::warn!("FORMS_TOKEN not set, ban appeal threads are disabled");
        return Ok(None);
    };
    if config.guild.channels.appeals.is_none() {
        tracing::warn!("guild.channels.appeals not configured, ban appeal threads are disabled");
        return Ok(None);
    }
    let client = FormsApiClient::new(&config.urls.forms_api, token, config.engine.request_timeout_ms)?
        .with_retry(
            config.engine.retry_max_attempts,
            config.engine.retry_base_delay_ms,
        );
    Ok(Some(Arc::new(client) as Arc<dyn AppealSource>))
}

async fn run_bot(config: BotConfig, token: &str, forms_token: Option<&str>) -> Result<()> {
    let mut rest_config = DiscordApiClientConfig::new(token, config.guild.id);
    rest_config.api_base = config.urls.discord_api.clone();
    rest_config.request_timeout_ms = config.engine.request_timeout_ms;
    rest_config.retry_max_attempts = config.engine.retry_max_attempts;
    rest_config.retry_base_delay_ms = config.engine.retry_base_delay_ms;
    let rest = Arc::new(DiscordApiClient::new(rest_config)?);

    let engine = Engine::new(
        config.engine_config(),
        rest.clone(),
        build_stats(&config),
        build_appeal_source(&config, forms_token)?,
    );
    let dispatcher = Arc::new(ChannelDispatcher::new(Arc::new(engine)));
    let startup = StartupTasks::new(
        rest,
        config.expected_channels(),
        config.guild.channels.dev_log,
        config.debug_mode,
    );
    let handler = DiscordEventHandler::new(GatewayBridge::new(dispatcher.clone()), startup);

    tracing::info!(
        bot = %config.bot.name,
        guild_id = %config.guild.id,
        debug_mode = config.debug_mode,
        "starting gateway session"
    );
    let result = run_gateway(token, handler).await;
    dispatcher.shutdown().await;
    tracing::info!("thread bot stopped");
    result
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::render_appeal_response;

    #[test]
    fn functional_render_appeal_response_uses_catalog_file() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("appeal-responses.json");
        fs::write(
            &path,
            r#"{"Spam": "\n\nYour appeal was reviewed and the ban stands."}"#,
        )
        .expect("write catalog");

        let rendered = render_appeal_response(&path, "spam", "Alice", Some("Please wait 6 months."))
            .expect("render");
        assert_eq!(
            rendered,
            "Hi Alice,\n\nYour appeal was reviewed and the ban stands.\n\nPlease wait 6 months.\n\nKind regards,\nPython Discord Appeals Team."
        );
    }

    #[test]
    fn regression_unknown_response_name_is_reported() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("appeal-responses.json");
        fs::write(&path, "{}").expect("write catalog");

        let error = render_appeal_response(&path, "missing", "Alice", None).expect_err("unknown");
        assert!(error
            .to_string()
            .contains("Could not find the response `missing`"));
    }
}
