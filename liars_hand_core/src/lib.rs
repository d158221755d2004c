//! # 吹牛扑克核心逻辑库
//!
//! 这个 `core` crate 包含了游戏的状态管理、回合引擎、叫牌的比较与验证，
//! 以及客户端-服务器通信消息的定义。
//! 它与网络服务器、客户端UI解耦，可以被任何上层应用复用。

mod card;
mod claim;
mod config;
mod error;
mod logic;
mod message;
mod pool;
mod state;

pub use card::*;

pub use claim::*;

pub use config::GameConfig;

pub use error::EngineError;

pub use message::*;

pub use pool::{CardSequence, claim_stats, match_shape, verify_claim};

pub use state::*;
