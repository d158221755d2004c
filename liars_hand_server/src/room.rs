use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use liars_hand_core::{
    GamePhase, GameSnapshot, GameState, PlayerId, RoundEffect, RoundStart, ServerMessage,
    ShowdownResult,
};
use parking_lot::{Mutex as P_Mutex, RwLock as P_RwLock};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// 单个房间的状态
// 重要‼️：严格规定使用锁的顺序，避免死锁：
// players -> host_id -> game_state -> timer
// game_state 和 host_id 是同步锁，持有期间不能 await。
pub struct Room {
    pub game_state: P_Mutex<GameState>,
    pub host_id: P_RwLock<PlayerId>,
    // 将 PlayerId 映射到具体的网络连接
    pub players: RwLock<HashMap<PlayerId, PlayerConnection>>,
    // 计时回合的计时器任务
    timer: P_Mutex<Option<JoinHandle<()>>>,
}

// 玩家的网络连接信息
pub struct PlayerConnection {
    // 用于向该玩家的 WebSocket 任务发送消息的通道
    pub sender: mpsc::Sender<ServerMessage>,
}

/// 在锁内收集、在锁外发送的消息
pub enum Outbound {
    /// 原样发给所有人
    All(ServerMessage),
    /// 为每个连接单独生成的快照
    Snapshot {
        state: GameSnapshot,
        log: Option<String>,
        new_round: bool,
        effect: Option<RoundEffect>,
    },
}

impl Outbound {
    pub fn snapshot(game_state: &GameState, log: Option<String>) -> Outbound {
        Outbound::Snapshot { state: game_state.snapshot(), log, new_round: false, effect: None }
    }

    /// 开牌结果: 先是进入 Showdown 阶段的快照，然后是结果本身
    pub fn showdown(game_state: &GameState, result: ShowdownResult) -> Vec<Outbound> {
        vec![
            Outbound::snapshot(game_state, Some(result.outcome_text.clone())),
            Outbound::All(ServerMessage::Showdown(result)),
        ]
    }
}

impl Room {
    pub fn new(game_state: GameState, host_id: PlayerId) -> Room {
        Room {
            game_state: P_Mutex::new(game_state),
            host_id: P_RwLock::new(host_id),
            players: RwLock::new(HashMap::new()),
            timer: P_Mutex::new(None),
        }
    }

    pub fn cancel_timer(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
    }

    /// 把消息发给房间里的所有连接
    pub async fn dispatch(&self, outbound: Vec<Outbound>) {
        let players = self.players.read().await;
        for item in outbound {
            match item {
                Outbound::All(msg) => broadcast(players.iter(), &msg, None).await,
                Outbound::Snapshot { state, log, new_round, effect } => {
                    // 快照需要为每个玩家单独生成
                    for (pid, conn) in players.iter() {
                        let msg = ServerMessage::GameStateSnapshot {
                            state: state.for_client(pid),
                            log: log.clone(),
                            new_round,
                            effect,
                        };
                        if conn.sender.send(msg).await.is_err() {
                            warn!("向玩家 {} 发送快照失败（可能已断开）", pid);
                        }
                    }
                }
            }
        }
    }

    pub async fn lobby_update(&self) {
        let msg = lobby_update(&self.game_state.lock());
        self.dispatch(vec![Outbound::All(msg)]).await;
    }
}

pub fn lobby_update(game_state: &GameState) -> ServerMessage {
    let count = game_state.players.iter().filter(|p| !p.is_placeholder()).count();
    ServerMessage::LobbyUpdate {
        count,
        ready: count >= 2 && !game_state.game_in_progress(),
    }
}

// --- 回合调度 ---

/// 开始新的一回合，广播结果，计时回合则启动计时器
pub async fn begin_round(room: Arc<Room>) {
    let outbound = {
        let mut game_state = room.game_state.lock();
        match game_state.start_round() {
            RoundStart::GameOver(winner) => vec![Outbound::All(ServerMessage::GameOver { winner })],
            RoundStart::Started { effect, announcement } => vec![Outbound::Snapshot {
                state: game_state.snapshot(),
                log: announcement,
                new_round: true,
                effect,
            }],
        }
    };
    room.dispatch(outbound).await;
    arm_timer(room);
}

/// 为当前行动者重新启动计时器。旧的计时器总是先被取消。
/// 非计时回合 (或不在叫牌阶段) 时只取消，不启动。
pub fn arm_timer(room: Arc<Room>) {
    let (key, timeout, delay) = {
        let game_state = room.game_state.lock();
        (
            game_state.turn_key(),
            Duration::from_millis(game_state.config.turn_timeout_ms),
            Duration::from_millis(game_state.config.timeout_delay_ms),
        )
    };
    room.cancel_timer();
    let Some(key) = key else {
        return;
    };

    debug!(?key, "启动计时器");
    let task_room = room.clone();
    let handle = tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        let outbound = {
            let mut game_state = task_room.game_state.lock();
            game_state.apply_timeout(key).map(|result| Outbound::showdown(&game_state, result))
        };
        if let Some(outbound) = outbound {
            task_room.dispatch(outbound).await;
            schedule_next_round(task_room, delay);
        }
    });
    *room.timer.lock() = Some(handle);
}

/// 开牌后的停顿结束时开始下一回合。
/// 停顿期间如果游戏已经结束或被重新开始，就什么也不做。
pub fn schedule_next_round(room: Arc<Room>, delay: Duration) {
    let round = room.game_state.lock().round;
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let still_waiting = {
            let game_state = room.game_state.lock();
            game_state.round == round && game_state.phase == GamePhase::Showdown
        };
        if still_waiting {
            begin_round(room).await;
        } else {
            info!(round, "回合已变化，取消自动开始下一回合");
        }
    });
}

/// 向房间内所有玩家广播消息
pub async fn broadcast(
    players: impl Iterator<Item = (&PlayerId, &PlayerConnection)>,
    message: &ServerMessage,
    exclude: Option<PlayerId>,
) {
    for (player_id, conn) in players {
        if Some(*player_id) == exclude {
            continue;
        }
        if conn.sender.send(message.clone()).await.is_err() {
            // 发送失败，说明该玩家也断开了，后续由其自己的 handle_socket 任务处理
            warn!("向玩家 {} 发送消息失败（可能已断开）", player_id);
        }
    }
}
