//! Discord adapters for the thread engine: REST transport, forms API appeal
//! source, statsd sink and serenity gateway ingress.

mod discord_helpers;

pub mod discord_api_client;
pub mod forms_client;
pub mod gateway;
pub mod statsd;

pub use discord_api_client::{
    DiscordApiClient, DiscordApiClientConfig, GuildChannelSummary, DEFAULT_DISCORD_API_BASE,
};
pub use forms_client::{FormsApiClient, DEFAULT_FORMS_API_BASE};
pub use gateway::{run_gateway, DiscordEventHandler, GatewayBridge, StartupTasks};
pub use statsd::{
    DeferredStatsdSink, StatsdSink, DEFAULT_STATSD_PORT, DEFAULT_STATSD_PREFIX,
    STATSD_CONNECT_ATTEMPTS, STATSD_CONNECT_BASE_DELAY,
};
