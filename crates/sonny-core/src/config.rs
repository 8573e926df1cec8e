use ini::Ini;

use crate::error::{Result, SonnyError};

fn default_heartbeat_period() -> u64 {
    40
}
fn default_cooldown_period() -> u64 {
    86_400
}
fn default_monitor_period() -> u64 {
    60
}
fn default_suspicious_backoff() -> u32 {
    5
}
fn default_dead_backoff() -> u32 {
    1
}
fn default_provider_net() -> Vec<String> {
    vec!["ext-net".to_string()]
}

/// `DEFAULT` section: the control loop's timing constants.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultConfig {
    pub heartbeat_period: u64,
    pub cooldown_period: u64,
    pub monitor_period: u64,
    pub suspicious_backoff: u32,
    pub dead_backoff: u32,
}

impl Default for DefaultConfig {
    fn default() -> Self {
        Self {
            heartbeat_period: default_heartbeat_period(),
            cooldown_period: default_cooldown_period(),
            monitor_period: default_monitor_period(),
            suspicious_backoff: default_suspicious_backoff(),
            dead_backoff: default_dead_backoff(),
        }
    }
}

/// `OPENSTACK` section.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenstackConfig {
    pub cloud: String,
    pub provider_net: Vec<String>,
}

/// `REDIS` section.
#[derive(Debug, Clone, PartialEq)]
pub struct RedisConfig {
    pub host: String,
    pub pass: Option<String>,
}

/// `MYSQL` section. Only required by binaries that perform resurrection
/// (`ns4`, and the single-shot `--dead-hypervisor`/`--spare-hypervisor`
/// path); `monitor` and `sonny` never touch it.
#[derive(Debug, Clone, PartialEq)]
pub struct MysqlConfig {
    pub host: String,
    pub user: String,
    pub pass: Option<String>,
}

fn default_slack_channel() -> String {
    String::new()
}

/// `SLACK` section.
#[derive(Debug, Clone, PartialEq)]
pub struct SlackConfig {
    pub token: String,
    pub channel: String,
    pub clouds: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub default: DefaultConfig,
    pub openstack: OpenstackConfig,
    pub redis: RedisConfig,
    pub mysql: Option<MysqlConfig>,
    pub slack: Option<SlackConfig>,
}

impl Config {
    /// Parse and validate a configuration from a path. `require_mysql`
    /// should be `true` for the `ns4` worker, `false` for `monitor`/`sonny`.
    pub fn from_file(path: &std::path::Path, require_mysql: bool) -> Result<Self> {
        let ini = Ini::load_from_file(path)
            .map_err(|e| SonnyError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::parse(&ini, require_mysql)
    }

    pub fn parse(ini: &Ini, require_mysql: bool) -> Result<Self> {
        let default = parse_default(ini);
        let openstack = parse_openstack(ini)?;
        let redis = parse_redis(ini)?;
        let mysql = parse_mysql(ini)?;
        let slack = parse_slack(ini);

        if require_mysql && mysql.is_none() {
            return Err(SonnyError::Config(
                "MYSQL section is required for this binary".into(),
            ));
        }

        Ok(Config {
            default,
            openstack,
            redis,
            mysql,
            slack,
        })
    }
}

fn get(ini: &Ini, section: &str, key: &str) -> Option<String> {
    ini.get_from(Some(section), key).map(str::to_string)
}

fn get_u64(ini: &Ini, section: &str, key: &str, default: u64) -> u64 {
    get(ini, section, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn get_u32(ini: &Ini, section: &str, key: &str, default: u32) -> u32 {
    get(ini, section, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_comma_list(v: &str) -> Vec<String> {
    v.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_default(ini: &Ini) -> DefaultConfig {
    DefaultConfig {
        heartbeat_period: get_u64(
            ini,
            "DEFAULT",
            "heartbeat_period",
            default_heartbeat_period(),
        ),
        cooldown_period: get_u64(ini, "DEFAULT", "cooldown_period", default_cooldown_period()),
        monitor_period: get_u64(ini, "DEFAULT", "monitor_period", default_monitor_period()),
        suspicious_backoff: get_u32(
            ini,
            "DEFAULT",
            "suspicious_backoff",
            default_suspicious_backoff(),
        ),
        dead_backoff: get_u32(ini, "DEFAULT", "dead_backoff", default_dead_backoff()),
    }
}

fn parse_openstack(ini: &Ini) -> Result<OpenstackConfig> {
    let cloud = get(ini, "OPENSTACK", "cloud")
        .ok_or_else(|| SonnyError::Config("OPENSTACK.cloud is required".into()))?;
    let provider_net = get(ini, "OPENSTACK", "provider_net")
        .map(|v| parse_comma_list(&v))
        .filter(|v| !v.is_empty())
        .unwrap_or_else(default_provider_net);
    Ok(OpenstackConfig {
        cloud,
        provider_net,
    })
}

fn parse_redis(ini: &Ini) -> Result<RedisConfig> {
    let host = get(ini, "REDIS", "host")
        .ok_or_else(|| SonnyError::Config("REDIS.host is required".into()))?;
    Ok(RedisConfig {
        host,
        pass: get(ini, "REDIS", "pass"),
    })
}

fn parse_mysql(ini: &Ini) -> Result<Option<MysqlConfig>> {
    let host = get(ini, "MYSQL", "host");
    let user = get(ini, "MYSQL", "user");
    match (host, user) {
        (Some(host), Some(user)) => Ok(Some(MysqlConfig {
            host,
            user,
            pass: get(ini, "MYSQL", "pass"),
        })),
        (None, None) => Ok(None),
        _ => Err(SonnyError::Config(
            "MYSQL section requires both host and user when present".into(),
        )),
    }
}

fn parse_slack(ini: &Ini) -> Option<SlackConfig> {
    let token = get(ini, "SLACK", "token")?;
    let channel = get(ini, "SLACK", "channel").unwrap_or_else(default_slack_channel);
    let clouds = get(ini, "SLACK", "clouds")
        .map(|v| parse_comma_list(&v))
        .unwrap_or_default();
    Some(SlackConfig {
        token,
        channel,
        clouds,
    })
}
