use std::time::Duration;

use super::codec::WireEncoding;

/// Endpoint and tuning parameters for one client.
#[derive(Clone, Debug)]
pub struct RtmConfig {
    pub host: String,
    pub port: u16,
    pub appkey: String,
    /// Wire encoding; also selects the upgrade sub-protocol and frame kind.
    pub encoding: WireEncoding,
    /// Interval between application pings. Pings share the outbound lane
    /// with data writes so the measured round-trip stays representative.
    pub ping_interval: Duration,
    /// Maximum accepted inbound message size in bytes.
    pub read_message_limit: usize,
}

impl RtmConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        appkey: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            appkey: appkey.into(),
            encoding: WireEncoding::default(),
            ping_interval: Duration::from_secs(1),
            read_message_limit: 100_000,
        }
    }

    pub fn with_encoding(mut self, encoding: WireEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Upgrade URL: `wss://<host>:<port>/v2?appkey=<APPKEY>`.
    pub fn endpoint_url(&self) -> String {
        format!(
            "wss://{}:{}/v2?appkey={}",
            self.host, self.port, self.appkey
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_url_carries_appkey() {
        let config = RtmConfig::new("rtm.example.com", 443, "k3y");
        assert_eq!(
            config.endpoint_url(),
            "wss://rtm.example.com:443/v2?appkey=k3y"
        );
    }

    #[test]
    fn defaults_match_the_wire_contract() {
        let config = RtmConfig::new("h", 443, "a");
        assert_eq!(config.encoding, WireEncoding::Json);
        assert_eq!(config.ping_interval, Duration::from_secs(1));
        assert_eq!(config.read_message_limit, 100_000);
    }
}
