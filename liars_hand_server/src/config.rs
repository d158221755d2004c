use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use liars_hand_core::GameConfig;
use tracing::warn;

const DEFAULT_PORT: u16 = 25917;

/// 服务器配置，从环境变量读取
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// 每个新房间使用的规则参数
    pub game: GameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            game: GameConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 无法解析的值只打一条警告，保留默认值
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = ServerConfig::default();

        override_with(&lookup, "LIARS_HAND_ADDR", &mut config.host);
        override_with(&lookup, "PORT", &mut config.port);
        override_with(&lookup, "LIARS_HAND_MAX_QUOTA", &mut config.game.max_quota);
        override_with(&lookup, "LIARS_HAND_TURN_TIMEOUT_MS", &mut config.game.turn_timeout_ms);
        override_with(&lookup, "LIARS_HAND_SHOWDOWN_DELAY_MS", &mut config.game.showdown_delay_ms);
        override_with(&lookup, "LIARS_HAND_TIMEOUT_DELAY_MS", &mut config.game.timeout_delay_ms);

        config
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn override_with<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T)
where
    T: FromStr + std::fmt::Debug,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => *target = value,
        Err(_) => warn!(key, value = %raw, default = ?target, "配置值无效，使用默认值"),
    }
}
