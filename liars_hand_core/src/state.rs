use crate::card::Card;
use crate::claim::Claim;
use crate::config::GameConfig;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type RoomId = Uuid;
pub type PlayerId = Uuid;

/// 还没登录 (没起名) 的占位玩家使用的名字。开局时会被清理掉。
pub const PLACEHOLDER_NAME: &str = "无名氏";

/// 游戏结束时没有幸存者的称呼
pub const NOBODY: &str = "无人";

/// 一局游戏的权威状态，也就是回合引擎本身。
///
/// 所有操作 (开局、叫牌、质疑、离开) 都通过 `&mut GameState` 进行，
/// 引擎内部没有并发，调用方必须把同一房间的所有动作串行化。
#[derive(Debug, Clone)]
pub struct GameState {
    pub room_id: RoomId,
    // 座位顺序即出牌顺序
    pub players: Vec<Player>,
    pub phase: GamePhase,
    pub round: u32,

    pub current_claim: Option<Claim>,
    pub last_declarer_idx: Option<usize>,
    pub cur_player_idx: usize,
    // 每次轮到新的人 (叫牌成功、离开、开牌) 都会加一，用于让过期的计时器失效
    pub turn_seq: u32,

    pub is_blind: bool,
    pub is_double_penalty: bool,
    pub is_timer_mode: bool,

    // 本回合的牌堆，只存在于服务端
    pub deck: Vec<Card>,

    pub config: GameConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub nickname: String,
    pub hand: Vec<Card>,
    pub quota: u32, // 惩罚计数，也是下回合发牌的张数
    pub eliminated: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum GamePhase {
    Lobby,
    Dealing,
    Bidding,
    Showdown,
    GameOver,
}

/// 开局时需要向所有人宣布的回合效果
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RoundEffect {
    Revolution,
    DoublePenalty,
    Timer,
    Blind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundStart {
    GameOver(GameOver),
    Started {
        effect: Option<RoundEffect>,
        announcement: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameOver {
    pub winner_id: Option<PlayerId>,
    pub winner_name: Option<String>,
}

impl GameOver {
    pub fn winner_label(&self) -> &str {
        self.winner_name.as_deref().unwrap_or(NOBODY)
    }
}

/// 开牌 (或超时) 的结果，广播给所有人
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShowdownResult {
    pub title: String,
    pub is_truth: bool,
    pub outcome_text: String,
    /// 牌池里的所有牌
    pub revealed_cards: Vec<Card>,
    pub stats: Vec<String>,
    pub loser_id: PlayerId,
    pub loser_eliminated: bool,
    pub timed_out: bool,
}

/// 计时器的身份。计时器触发时与当前状态比较，不一致就丢弃。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TurnKey {
    pub round: u32,
    pub turn_idx: usize,
    pub turn_seq: u32,
}

/// 只读快照。服务端用 `for_client` 为每个玩家生成隐藏了他人手牌的版本。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub room_id: RoomId,
    pub round: u32,
    pub phase: GamePhase,
    pub is_blind: bool,
    pub is_double_penalty: bool,
    pub is_timer_mode: bool,
    pub claim: Option<Claim>,
    pub cur_player_idx: usize,
    pub last_declarer_idx: Option<usize>,
    pub players: Vec<SeatView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatView {
    pub id: PlayerId,
    pub nickname: String,
    // 客户端只能看到自己的手牌，其他人的为空
    pub hand: Vec<Card>,
    pub hand_size: usize,
    pub quota: u32,
    pub eliminated: bool,
}

// --- Player 的实现方法 ---

impl Player {
    pub fn new(id: PlayerId, nickname: impl Into<String>) -> Player {
        Player {
            id,
            nickname: nickname.into(),
            hand: Vec::new(),
            quota: 1,
            eliminated: false,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        let name = self.nickname.trim();
        name.is_empty() || name == PLACEHOLDER_NAME
    }
}

// --- GameState 的实现方法 ---

impl GameState {
    pub fn new(room_id: RoomId, config: GameConfig) -> GameState {
        GameState {
            room_id,
            players: Vec::new(),
            phase: GamePhase::Lobby,
            round: 0,
            current_claim: None,
            last_declarer_idx: None,
            cur_player_idx: 0,
            turn_seq: 0,
            is_blind: false,
            is_double_penalty: false,
            is_timer_mode: false,
            deck: Vec::new(),
            config,
        }
    }

    /// 获取当前行动的玩家ID (如果存在)
    pub fn current_player_id(&self) -> Option<PlayerId> {
        self.players.get(self.cur_player_idx).map(|p| p.id)
    }

    pub fn player_index(&self, id: PlayerId) -> Option<usize> {
        self.players.iter().position(|p| p.id == id)
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    /// 未被淘汰的玩家 (按座位顺序)
    pub fn active_players(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| !p.eliminated)
    }

    pub fn active_count(&self) -> usize {
        self.active_players().count()
    }

    /// 一局游戏是否正在进行 (包括开牌后的停顿)
    pub fn game_in_progress(&self) -> bool {
        matches!(self.phase, GamePhase::Dealing | GamePhase::Bidding | GamePhase::Showdown)
    }

    /// 只有计时回合的叫牌阶段才有计时器
    pub fn turn_key(&self) -> Option<TurnKey> {
        if self.phase != GamePhase::Bidding || !self.is_timer_mode {
            return None;
        }
        Some(TurnKey {
            round: self.round,
            turn_idx: self.cur_player_idx,
            turn_seq: self.turn_seq,
        })
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            room_id: self.room_id,
            round: self.round,
            phase: self.phase,
            is_blind: self.is_blind,
            is_double_penalty: self.is_double_penalty,
            is_timer_mode: self.is_timer_mode,
            claim: self.current_claim.clone(),
            cur_player_idx: self.cur_player_idx,
            last_declarer_idx: self.last_declarer_idx,
            players: self
                .players
                .iter()
                .map(|p| SeatView {
                    id: p.id,
                    nickname: p.nickname.clone(),
                    hand: p.hand.clone(),
                    hand_size: p.hand.len(),
                    quota: p.quota,
                    eliminated: p.eliminated,
                })
                .collect(),
        }
    }
}

impl GameSnapshot {
    /// 为某个客户端生成快照: 只保留他自己的手牌。
    /// 盲牌回合的叫牌阶段连自己的手牌也看不到。
    pub fn for_client(&self, client_id: &PlayerId) -> Self {
        let mut client_state = self.clone();
        let hide_own = self.is_blind && self.phase == GamePhase::Bidding;

        for seat in client_state.players.iter_mut() {
            if seat.id != *client_id || hide_own {
                seat.hand.clear();
            }
        }

        client_state
    }

    /// 客户端自己的座位号
    pub fn seat_of(&self, client_id: &PlayerId) -> Option<usize> {
        self.players.iter().position(|p| p.id == *client_id)
    }
}
