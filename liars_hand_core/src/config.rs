use serde::{Deserialize, Serialize};

/// 游戏规则参数。
///
/// 回合模式由一次 [0, 1) 的均匀随机数 `r` 决定:
/// - 盲牌: `r < blind_chance`
/// - 双倍惩罚: 非盲牌且 `blind_chance < r < double_penalty_ceiling`
/// - 计时: 前两者都不成立且 `r < timer_ceiling`
///
/// 革命 (手牌轮转) 使用另一次独立的随机数。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// quota 超过这个值的玩家被淘汰
    pub max_quota: u32,
    pub blind_chance: f64,
    pub double_penalty_ceiling: f64,
    pub timer_ceiling: f64,
    pub revolution_chance: f64,
    /// 计时模式下每回合的时限
    pub turn_timeout_ms: u64,
    /// 开牌后到下一回合开始的停顿
    pub showdown_delay_ms: u64,
    /// 超时判负后到下一回合开始的停顿
    pub timeout_delay_ms: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        GameConfig {
            max_quota: 6,
            blind_chance: 0.05,
            double_penalty_ceiling: 0.15,
            timer_ceiling: 0.25,
            revolution_chance: 0.15,
            turn_timeout_ms: 10_500,
            showdown_delay_ms: 6_000,
            timeout_delay_ms: 4_000,
        }
    }
}

impl GameConfig {
    /// 展示给玩家的整秒数
    pub fn turn_timeout_secs(&self) -> u64 {
        self.turn_timeout_ms / 1000
    }
}
