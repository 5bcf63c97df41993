//! Fire-and-forget statsd counter sink.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use thread_bot_engine::StatsSink;

pub const DEFAULT_STATSD_PREFIX: &str = "bot";
pub const DEFAULT_STATSD_PORT: u16 = 8125;
pub const STATSD_CONNECT_ATTEMPTS: usize = 8;
pub const STATSD_CONNECT_BASE_DELAY: Duration = Duration::from_secs(1);

pub fn format_counter(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_matches('.');
    if prefix.is_empty() {
        format!("{name}:1|c")
    } else {
        format!("{prefix}.{name}:1|c")
    }
}

#[derive(Debug)]
pub struct StatsdSink {
    socket: UdpSocket,
    target: SocketAddr,
    prefix: String,
}

impl StatsdSink {
    pub fn connect(host: &str, port: u16, prefix: &str) -> Result<Self> {
        let target = (host, port)
            .to_socket_addrs()
            .with_context(|| format!("failed to resolve statsd host {host}:{port}"))?
            .next()
            .ok_or_else(|| anyhow!("statsd host {host}:{port} resolved to no addresses"))?;
        let bind = if target.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
        let socket = UdpSocket::bind(bind).context("failed to bind statsd socket")?;
        socket
            .set_nonblocking(true)
            .context("failed to make statsd socket non-blocking")?;
        Ok(Self {
            socket,
            target,
            prefix: prefix.to_string(),
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl StatsSink for StatsdSink {
    fn increment(&self, name: &str) {
        let payload = format_counter(&self.prefix, name);
        if let Err(error) = self.socket.send_to(payload.as_bytes(), self.target) {
            tracing::debug!(counter = name, error = %error, "statsd send failed");
        }
    }
}

/// Counter sink that drops increments until a background connect succeeds.
#[derive(Debug, Default)]
pub struct DeferredStatsdSink {
    sink: OnceLock<StatsdSink>,
}

impl DeferredStatsdSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.sink.get().is_some()
    }

    /// Retries `connect` with doubling delays between attempts.
    pub async fn connect_with_retry(
        &self,
        host: &str,
        port: u16,
        prefix: &str,
        attempts: usize,
        base_delay: Duration,
    ) -> Result<SocketAddr> {
        let attempts = attempts.max(1);
        let mut delay = base_delay;
        let mut attempt = 1;
        loop {
            match StatsdSink::connect(host, port, prefix) {
                Ok(sink) => {
                    let target = sink.target();
                    let _ = self.sink.set(sink);
                    return Ok(target);
                }
                Err(error) if attempt < attempts => {
                    tracing::warn!(
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %error,
                        "statsd connect failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                Err(error) => {
                    return Err(error.context(format!(
                        "statsd unreachable after {attempts} attempts"
                    )));
                }
            }
        }
    }
}

impl StatsSink for DeferredStatsdSink {
    fn increment(&self, name: &str) {
        match self.sink.get() {
            Some(sink) => sink.increment(name),
            None => tracing::trace!(counter = name, "statsd not connected, counter dropped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::UdpSocket;
    use std::time::Duration;

    use thread_bot_engine::StatsSink;

    use super::{format_counter, DeferredStatsdSink, StatsdSink};

    #[test]
    fn unit_format_counter_applies_prefix() {
        assert_eq!(
            format_counter("bot", "thread.nomination.open"),
            "bot.thread.nomination.open:1|c"
        );
        assert_eq!(format_counter("", "x"), "x:1|c");
    }

    #[test]
    fn functional_statsd_sink_emits_counter_datagram() {
        let receiver = UdpSocket::bind("127.0.0.1:0").expect("bind receiver");
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .expect("read timeout");
        let port = receiver.local_addr().expect("local addr").port();

        let sink = StatsdSink::connect("127.0.0.1", port, "bot").expect("sink");
        sink.increment("thread.ban_appeal.open");

        let mut buffer = [0_u8; 128];
        let (len, _) = receiver.recv_from(&mut buffer).expect("datagram");
        assert_eq!(
            std::str::from_utf8(&buffer[..len]).expect("utf8"),
            "bot.thread.ban_appeal.open:1|c"
        );
    }

    #[tokio::test]
    async fn functional_deferred_sink_drops_counters_until_connected() {
        let receiver = UdpSocket::bind("127.0.0.1:0").expect("bind receiver");
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .expect("read timeout");
        let port = receiver.local_addr().expect("local addr").port();

        let sink = DeferredStatsdSink::new();
        sink.increment("thread.nomination.open");
        assert!(!sink.is_connected());

        let target = sink
            .connect_with_retry("127.0.0.1", port, "bot", 3, Duration::from_millis(1))
            .await
            .expect("connect");
        assert_eq!(target.port(), port);
        assert!(sink.is_connected());
        sink.increment("thread.nomination.archive");

        let mut buffer = [0_u8; 128];
        let (len, _) = receiver.recv_from(&mut buffer).expect("datagram");
        assert_eq!(
            std::str::from_utf8(&buffer[..len]).expect("utf8"),
            "bot.thread.nomination.archive:1|c"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn regression_deferred_sink_gives_up_after_bounded_attempts() {
        let sink = DeferredStatsdSink::new();
        let error = sink
            .connect_with_retry(
                "statsd.invalid",
                8125,
                "bot",
                3,
                Duration::from_millis(10),
            )
            .await
            .expect_err("unresolvable host");
        assert!(error.to_string().contains("after 3 attempts"));
        assert!(!sink.is_connected());
        sink.increment("thread.nomination.open");
    }
}
