//! Configuration types.
//!
//! Everything is read once from the environment at startup and is immutable
//! afterwards.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::identity::DEFAULT_MAX_MINT_ATTEMPTS;

const DEFAULT_GREETING: &str =
    "Hello, and welcome to the Anonymous GEC Advisor. What's on your mind?";
const DEFAULT_THANK_YOU: &str = "Thank you for your message, please provide as much information as you're comfortable sharing and we'll get back to you as soon as we can.";
const DEFAULT_DISCLAIMER: &str = "DISCLAIMER: This is not an incident reporting service. If you believe you're being subjected to bullying, harassment, or misconduct then we cannot escalate on your behalf but we can advise you on your next steps.";

/// Reply texts for the auto-response categories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phrases {
    pub greeting: String,
    pub thank_you: String,
    pub disclaimer: String,
}

impl Default for Phrases {
    fn default() -> Self {
        Self {
            greeting: DEFAULT_GREETING.to_string(),
            thank_you: DEFAULT_THANK_YOU.to_string(),
            disclaimer: DEFAULT_DISCLAIMER.to_string(),
        }
    }
}

impl Phrases {
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            greeting: lookup("GREETING").unwrap_or(defaults.greeting),
            thank_you: lookup("THANK_YOU").unwrap_or(defaults.thank_you),
            disclaimer: lookup("DISCLAIMER").unwrap_or(defaults.disclaimer),
        }
    }
}

/// Which transport the relay runs on.
#[derive(Debug, Clone)]
pub enum ChannelConfig {
    Telegram { bot_token: SecretString },
    Console,
}

impl ChannelConfig {
    pub fn name(&self) -> &'static str {
        match self {
            ChannelConfig::Telegram { .. } => "telegram",
            ChannelConfig::Console => "console",
        }
    }
}

/// Stream and consumer-group settings.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Operator commands are read from here.
    pub inbound: String,
    /// Conversation entries are appended here.
    pub outbound: String,
    pub group: String,
    /// Must stay the same across restarts so pending commands are recovered.
    pub consumer: String,
    pub poll_interval: Duration,
    /// Unacknowledged commands idle this long are claimed and retried.
    pub claim_idle: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            inbound: "gec-responses".to_string(),
            outbound: "gec".to_string(),
            group: "gec-bot".to_string(),
            consumer: "relay".to_string(),
            poll_interval: Duration::from_millis(250),
            claim_idle: Duration::from_secs(60),
        }
    }
}

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub db_path: PathBuf,
    pub streams: StreamConfig,
    /// Events older than boot minus this are ignored.
    pub startup_grace: Duration,
    pub mint_max_attempts: u32,
    pub phrases: Phrases,
    pub channel: ChannelConfig,
    /// Directory for the daily rolling log file, if any.
    pub log_dir: Option<PathBuf>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/anon-relay.db"),
            streams: StreamConfig::default(),
            startup_grace: Duration::from_secs(15 * 60),
            mint_max_attempts: DEFAULT_MAX_MINT_ATTEMPTS,
            phrases: Phrases::default(),
            channel: ChannelConfig::Console,
            log_dir: None,
        }
    }
}

impl RelayConfig {
    /// Load from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
    }

    /// Load from an arbitrary key lookup. Missing keys fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let streams = StreamConfig {
            inbound: lookup("RELAY_INBOUND_STREAM").unwrap_or(defaults.streams.inbound),
            outbound: lookup("RELAY_OUTBOUND_STREAM").unwrap_or(defaults.streams.outbound),
            group: lookup("RELAY_CONSUMER_GROUP").unwrap_or(defaults.streams.group),
            consumer: lookup("RELAY_CONSUMER_NAME").unwrap_or(defaults.streams.consumer),
            poll_interval: match parse_var::<u64>(&lookup, "RELAY_POLL_INTERVAL_MS")? {
                Some(ms) => Duration::from_millis(ms.max(1)),
                None => defaults.streams.poll_interval,
            },
            claim_idle: match parse_var::<u64>(&lookup, "RELAY_CLAIM_IDLE_SECS")? {
                Some(0) => {
                    return Err(ConfigError::InvalidValue {
                        key: "RELAY_CLAIM_IDLE_SECS".into(),
                        message: "must be at least 1".into(),
                    });
                }
                Some(secs) => Duration::from_secs(secs),
                None => defaults.streams.claim_idle,
            },
        };

        let bot_token = lookup("TELEGRAM_BOT_TOKEN");
        let channel = match lookup("RELAY_CHANNEL").as_deref() {
            Some("telegram") => ChannelConfig::Telegram {
                bot_token: SecretString::from(
                    bot_token.ok_or_else(|| ConfigError::MissingEnvVar("TELEGRAM_BOT_TOKEN".into()))?,
                ),
            },
            Some("console") => ChannelConfig::Console,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "RELAY_CHANNEL".into(),
                    message: format!("unknown channel {other:?} (expected telegram or console)"),
                });
            }
            None => match bot_token {
                Some(token) => ChannelConfig::Telegram {
                    bot_token: SecretString::from(token),
                },
                None => ChannelConfig::Console,
            },
        };

        Ok(Self {
            db_path: lookup("RELAY_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            streams,
            startup_grace: parse_var::<u64>(&lookup, "RELAY_STARTUP_GRACE_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.startup_grace),
            mint_max_attempts: match parse_var::<u32>(&lookup, "RELAY_MINT_MAX_ATTEMPTS")? {
                Some(0) => {
                    return Err(ConfigError::InvalidValue {
                        key: "RELAY_MINT_MAX_ATTEMPTS".into(),
                        message: "must be at least 1".into(),
                    });
                }
                Some(n) => n,
                None => defaults.mint_max_attempts,
            },
            phrases: Phrases::from_lookup(&lookup),
            channel,
            log_dir: lookup("RELAY_LOG_DIR").map(PathBuf::from),
        })
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{raw:?}: {e}"),
            })
        })
        .transpose()
}
