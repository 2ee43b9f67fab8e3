use anyhow::bail;
use rustc_hash::FxHashMap;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    Client,
    Server,
}
impl FromStr for ConnectionMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<ConnectionMode> {
        match s {
            "client" => Ok(ConnectionMode::Client),
            "server" => Ok(ConnectionMode::Server),
            _ => bail!("unknown connection mode: {}", s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Active,
    Passive,
}
impl FromStr for ChannelMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<ChannelMode> {
        match s {
            "active" => Ok(ChannelMode::Active),
            "passive" => Ok(ChannelMode::Passive),
            _ => bail!("unknown channel mode: {}", s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Send,
    Receive,
}
impl FromStr for Operation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Operation> {
        match s {
            "send" => Ok(Operation::Send),
            "receive" => Ok(Operation::Receive),
            _ => bail!("unknown operation: {}", s),
        }
    }
}

/// Full configuration of one arrow process, parsed from `key=value` argument
/// pairs as passed by the benchmark harness.
#[derive(Debug, Clone)]
pub struct ArrowConfig {
    pub connection_mode: ConnectionMode,
    pub channel_mode: ChannelMode,
    pub operation: Operation,

    /// container id, also used as the link name
    pub id: String,
    pub scheme: String,
    pub host: String,
    pub port: String,
    pub path: String,

    /// TLS / SASL material - opaque to the arrow, handed to the engine as-is
    pub username: Option<String>,
    pub password: Option<String>,
    pub cert: Option<String>,
    pub key: Option<String>,

    /// wall-clock bound, zero = unbounded by time
    pub desired_duration: Duration,
    /// message-count bound, zero = unbounded by count
    pub desired_count: u64,
    pub body_size: usize,
    pub credit_window: u32,
    pub transaction_size: u64,
    pub durable: bool,
    pub settlement: bool,
}

impl ArrowConfig {
    pub fn parse(args: &[String]) -> anyhow::Result<ArrowConfig> {
        let mut kwargs = FxHashMap::default();
        for arg in args {
            match arg.split_once('=') {
                Some((key, value)) => {
                    kwargs.insert(key, value);
                }
                None => bail!("malformed argument (expected key=value): {}", arg),
            }
        }

        let required = |key: &str| -> anyhow::Result<String> {
            match kwargs.get(key) {
                Some(&value) => Ok(value.to_string()),
                None => bail!("missing required argument: {}", key),
            }
        };
        let optional = |key: &str| kwargs.get(key).map(|&value| value.to_string());
        let numeric = |key: &str| -> anyhow::Result<u64> {
            match kwargs.get(key) {
                Some(&value) => match value.parse() {
                    Ok(n) => Ok(n),
                    Err(_) => bail!("argument {} is not a number: {}", key, value),
                },
                None => Ok(0),
            }
        };

        Ok(ArrowConfig {
            connection_mode: required("connection-mode")?.parse()?,
            channel_mode: required("channel-mode")?.parse()?,
            operation: required("operation")?.parse()?,
            id: required("id")?,
            scheme: optional("scheme").unwrap_or_else(|| "amqp".to_string()),
            host: required("host")?,
            port: required("port")?,
            path: required("path")?,
            username: optional("username"),
            password: optional("password"),
            cert: optional("cert"),
            key: optional("key"),
            desired_duration: Duration::from_secs(numeric("duration")?),
            desired_count: numeric("count")?,
            body_size: numeric("body-size")? as usize,
            credit_window: numeric("credit-window")? as u32,
            transaction_size: numeric("transaction-size")?,
            durable: numeric("durable")? == 1,
            settlement: numeric("settlement")? == 1,
        })
    }

    pub fn tls(&self) -> bool {
        self.scheme == "amqps"
    }

    /// Rejects unsupported configurations before any connection attempt.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.transaction_size > 0 {
            bail!("this implementation doesn't support transactions");
        }
        if self.connection_mode == ConnectionMode::Server && self.tls() {
            bail!("this implementation can't be a server and support TLS");
        }
        if self.credit_window == 0 {
            bail!("credit-window must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    fn args(pairs: &[&str]) -> Vec<String> {
        pairs.iter().map(|s| s.to_string()).collect()
    }

    fn base_args() -> Vec<String> {
        args(&[
            "connection-mode=client",
            "channel-mode=active",
            "operation=send",
            "id=arrow-0",
            "host=localhost",
            "port=5672",
            "path=q0",
            "duration=0",
            "count=1000",
            "body-size=100",
            "credit-window=10",
            "transaction-size=0",
            "durable=0",
        ])
    }

    #[rstest]
    fn test_parse_full() {
        let config = ArrowConfig::parse(&base_args()).unwrap();

        assert_eq!(config.connection_mode, ConnectionMode::Client);
        assert_eq!(config.channel_mode, ChannelMode::Active);
        assert_eq!(config.operation, Operation::Send);
        assert_eq!(config.id, "arrow-0");
        assert_eq!(config.scheme, "amqp");
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, "5672");
        assert_eq!(config.path, "q0");
        assert_eq!(config.username, None);
        assert_eq!(config.desired_duration, Duration::ZERO);
        assert_eq!(config.desired_count, 1000);
        assert_eq!(config.body_size, 100);
        assert_eq!(config.credit_window, 10);
        assert!(!config.durable);
        assert!(!config.settlement);
        assert!(!config.tls());

        config.validate().unwrap();
    }

    #[rstest]
    #[case::connection_mode("connection-mode=broker", "unknown connection mode: broker")]
    #[case::channel_mode("channel-mode=lazy", "unknown channel mode: lazy")]
    #[case::operation("operation=browse", "unknown operation: browse")]
    fn test_parse_unknown_token(#[case] override_arg: &str, #[case] expected: &str) {
        let mut a = base_args();
        let key = override_arg.split_once('=').unwrap().0;
        a.retain(|arg| !arg.starts_with(&format!("{}=", key)));
        a.push(override_arg.to_string());

        let err = ArrowConfig::parse(&a).unwrap_err();
        assert_eq!(err.to_string(), expected);
    }

    #[rstest]
    fn test_parse_malformed_pair() {
        let mut a = base_args();
        a.push("no-equals-sign".to_string());

        let err = ArrowConfig::parse(&a).unwrap_err();
        assert!(err.to_string().contains("no-equals-sign"));
    }

    #[rstest]
    fn test_parse_missing_required() {
        let mut a = base_args();
        a.retain(|arg| !arg.starts_with("host="));

        let err = ArrowConfig::parse(&a).unwrap_err();
        assert_eq!(err.to_string(), "missing required argument: host");
    }

    #[rstest]
    fn test_parse_non_numeric() {
        let mut a = base_args();
        a.retain(|arg| !arg.starts_with("count="));
        a.push("count=many".to_string());

        let err = ArrowConfig::parse(&a).unwrap_err();
        assert!(err.to_string().contains("count"));
    }

    #[rstest]
    fn test_validate_transactions_rejected() {
        let mut a = base_args();
        a.retain(|arg| !arg.starts_with("transaction-size="));
        a.push("transaction-size=100".to_string());

        let config = ArrowConfig::parse(&a).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("transactions"));
    }

    #[rstest]
    fn test_validate_server_tls_rejected() {
        let mut a = base_args();
        a.retain(|arg| !arg.starts_with("connection-mode="));
        a.push("connection-mode=server".to_string());
        a.push("scheme=amqps".to_string());

        let config = ArrowConfig::parse(&a).unwrap();
        assert!(config.tls());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("TLS"));
    }

    #[rstest]
    fn test_validate_zero_credit_window_rejected() {
        let mut a = base_args();
        a.retain(|arg| !arg.starts_with("credit-window="));

        let config = ArrowConfig::parse(&a).unwrap();
        assert!(config.validate().is_err());
    }

    #[rstest]
    fn test_parse_duration_and_settlement() {
        let mut a = base_args();
        a.retain(|arg| !arg.starts_with("duration=") && !arg.starts_with("count="));
        a.push("duration=30".to_string());
        a.push("settlement=1".to_string());

        let config = ArrowConfig::parse(&a).unwrap();
        assert_eq!(config.desired_duration, Duration::from_secs(30));
        assert_eq!(config.desired_count, 0);
        assert!(config.settlement);
    }
}
