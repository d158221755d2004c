use crate::claim::ClaimFields;
use crate::state::{GameOver, GameSnapshot, PlayerId, RoundEffect, ShowdownResult};
use crate::RoomId;
use serde::{Deserialize, Serialize};

// --- 客户端 -> 服务器 的消息 ---
// 这些是客户端可以发送给服务器的指令或动作。

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum ClientMessage {
    // --- 房间管理消息 ---
    /// 客户端请求创建一个新房间
    CreateRoom { nickname: String },
    /// 客户端请求加入一个已存在的房间
    JoinRoom { room_id: RoomId, nickname: String },
    /// 玩家设置自己的昵称
    SetNickname(String),
    /// 房主开始游戏 (大厅或上一局结束后)
    StartGame,

    // --- 游戏内消息 ---
    /// 叫牌。字段原样传给引擎，解析失败的标记不会在这里被拒绝。
    Bid(ClaimFields),
    /// 质疑上一个叫牌
    Challenge,
}

// --- 服务器 -> 客户端 的消息 ---

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum ServerMessage {
    /// 成功加入或创建房间后，服务器私密地发给该玩家
    RoomJoined {
        your_id: PlayerId,
        room_id: RoomId,
        host_id: PlayerId,
    },

    /// 大厅人数变化
    LobbyUpdate { count: usize, ready: bool },
    PlayerJoined { player_id: PlayerId, nickname: String },
    PlayerLeft { player_id: PlayerId },

    /// 游戏状态快照。发送前调用 `for_client` 隐藏他人的手牌。
    GameStateSnapshot {
        state: GameSnapshot,
        /// 本次更新的说明 (谁叫了什么、回合效果等)
        log: Option<String>,
        /// 这是一个新回合的第一次快照
        new_round: bool,
        effect: Option<RoundEffect>,
    },

    /// 开牌或超时的结果
    Showdown(ShowdownResult),
    GameOver { winner: GameOver },

    /// 服务器向特定客户端发送的提示或错误信息
    Info { message: String },
    Error { message: String },
}

impl From<ClaimFields> for ClientMessage {
    fn from(fields: ClaimFields) -> Self {
        ClientMessage::Bid(fields)
    }
}
