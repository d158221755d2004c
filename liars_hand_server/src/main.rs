mod config;
mod room;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use dashmap::DashMap;
use futures_util::{stream::StreamExt, SinkExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use liars_hand_core::{ClientMessage, GameConfig, GameState, PlayerId, RoomId, ServerMessage};

use crate::config::ServerConfig;
use crate::room::{arm_timer, begin_round, broadcast, schedule_next_round, Outbound, PlayerConnection, Room};

// 服务器全局状态
struct AppState {
    rooms: DashMap<RoomId, Arc<Room>>,
    game_config: GameConfig,
}

type SharedState = Arc<AppState>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = ServerConfig::from_env();
    let state = SharedState::new(AppState {
        rooms: DashMap::new(),
        game_config: config.game.clone(),
    });

    let app = Router::new()
        .route("/ws", get(websocket_handler))
        .with_state(state);

    let addr = config.addr();
    info!("服务器正在监听 {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,liars_hand_server=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false))
        .init();
}

/// 处理 WebSocket 连接请求
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// 处理单个 WebSocket 连接的生命周期
async fn handle_socket(socket: WebSocket, state: SharedState) {
    let (mut sender, mut receiver) = socket.split();

    // 创建一个 MPSC 通道，用于从其他任务接收要发送的消息
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(32);

    // 启动一个新任务，专门负责将 MPSC 通道中的消息发送到 WebSocket
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let payload = match serde_json::to_string(&msg) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("序列化消息失败: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(payload.into())).await.is_err() {
                // 发送失败，说明客户端已断开，退出任务
                break;
            }
        }
    });

    // 当前连接的上下文信息，加入房间后填充
    let mut player_context: Option<(RoomId, PlayerId)> = None;

    // 主循环，处理从客户端接收到的消息
    while let Some(Ok(msg)) = receiver.next().await {
        if let Message::Text(text) = msg {
            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => {
                    handle_client_message(client_msg, state.clone(), &tx, &mut player_context).await;
                }
                Err(e) => {
                    warn!("解析消息失败: {}", e);
                    let _ = tx.send(ServerMessage::Error { message: "无法识别的消息".to_string() }).await;
                }
            }
        }
    }

    // 客户端断开连接，执行清理工作
    if let Some((room_id, player_id)) = player_context {
        handle_disconnect(state, room_id, player_id).await;
    }
    info!("客户端连接关闭");
}

// DashMap 的读锁不能跨 await 持有，先克隆出 Arc
fn find_room(state: &AppState, room_id: &RoomId) -> Option<Arc<Room>> {
    state.rooms.get(room_id).map(|r| r.clone())
}

fn error(message: impl Into<String>) -> ServerMessage {
    ServerMessage::Error { message: message.into() }
}

/// 核心消息处理逻辑
async fn handle_client_message(
    msg: ClientMessage,
    state: SharedState,
    tx: &mpsc::Sender<ServerMessage>,
    context: &mut Option<(RoomId, PlayerId)>,
) {
    match msg {
        ClientMessage::CreateRoom { nickname } => {
            if context.is_some() {
                let _ = tx.send(error("你已经在一个房间里了")).await;
                return;
            }

            let room_id = Uuid::new_v4();
            let player_id = Uuid::new_v4();

            let mut game_state = GameState::new(room_id, state.game_config.clone());
            game_state.add_player(player_id, nickname);

            let mut room = Room::new(game_state, player_id);
            room.players.get_mut().insert(player_id, PlayerConnection { sender: tx.clone() });
            let room = Arc::new(room);
            state.rooms.insert(room_id, room.clone());

            info!("玩家 {} 创建了新房间 {}", player_id, room_id);
            *context = Some((room_id, player_id));
            let _ = tx.send(ServerMessage::RoomJoined { your_id: player_id, room_id, host_id: player_id }).await;
            room.lobby_update().await;
        }
        ClientMessage::JoinRoom { room_id, nickname } => {
            if context.is_some() {
                let _ = tx.send(error("你已经在一个房间里了")).await;
                return;
            }

            let Some(room) = find_room(&state, &room_id) else {
                let _ = tx.send(error("房间不存在")).await;
                return;
            };

            let player_id = Uuid::new_v4();
            {  // r_players write lock
                let mut r_players = room.players.write().await;

                let joined = room.game_state.lock().add_player(player_id, nickname.clone());
                if !joined {
                    let _ = tx.send(error("游戏正在进行中，请等这局结束后再加入")).await;
                    return;
                }

                r_players.insert(player_id, PlayerConnection { sender: tx.clone() });
            }

            info!("玩家 {} 加入了房间 {}", player_id, room_id);
            *context = Some((room_id, player_id));
            {  // r_players read lock
                // 广播给房间内其他玩家
                let join_msg = ServerMessage::PlayerJoined { player_id, nickname };
                broadcast(room.players.read().await.iter(), &join_msg, Some(player_id)).await;
            }
            let host_id = *room.host_id.read();
            let _ = tx.send(ServerMessage::RoomJoined { your_id: player_id, room_id, host_id }).await;
            room.lobby_update().await;
        }
        // ... 其他需要先进入房间才能执行的消息
        _ => {
            let Some((room_id, player_id)) = *context else {
                let _ = tx.send(error("请先加入或创建房间")).await;
                return;
            };
            let Some(room) = find_room(&state, &room_id) else {
                let _ = tx.send(error("房间不存在")).await;
                return;
            };
            handle_game_message(msg, room, player_id, tx).await;
        }
    }
}

/// 房间内的消息: 改名、开始游戏、叫牌、质疑
async fn handle_game_message(msg: ClientMessage, room: Arc<Room>, player_id: PlayerId, tx: &mpsc::Sender<ServerMessage>) {
    match msg {
        ClientMessage::SetNickname(nickname) => {
            let outbound = {
                let mut game_state = room.game_state.lock();
                rename_or_rejoin(&mut game_state, player_id, &nickname)
                    .map(|log| Outbound::snapshot(&game_state, Some(log)))
            };
            match outbound {
                Ok(outbound) => {
                    room.dispatch(vec![outbound]).await;
                    room.lobby_update().await;
                }
                Err(message) => {
                    let _ = tx.send(error(message)).await;
                }
            }
        }
        ClientMessage::StartGame => {
            let host_id = *room.host_id.read();
            if player_id != host_id {
                let _ = tx.send(error("只有房主可以开始游戏")).await;
                return;
            }
            let refused = {
                let mut game_state = room.game_state.lock();
                if !game_state.reset_for_new_game() {
                    Some("游戏已经开始了")
                } else if game_state.players.iter().filter(|p| !p.is_placeholder()).count() < 2 {
                    Some("至少需要两名玩家才能开始")
                } else {
                    None
                }
            };
            if let Some(message) = refused {
                let _ = tx.send(error(message)).await;
                return;
            }
            info!(room = %room.game_state.lock().room_id, "房主开始了新游戏");
            begin_round(room).await;
        }
        ClientMessage::Bid(fields) => {
            let result = {
                let mut game_state = room.game_state.lock();
                game_state.submit_bid(player_id, &fields).map(|()| {
                    let name = game_state.player(player_id).map(|p| p.nickname.clone()).unwrap_or_default();
                    let claim = game_state.current_claim.as_ref().map(|c| c.to_string()).unwrap_or_default();
                    Outbound::snapshot(&game_state, Some(format!("{} 叫牌: {}", name, claim)))
                })
            };
            match result {
                Ok(outbound) => {
                    room.dispatch(vec![outbound]).await;
                    arm_timer(room);
                }
                Err(e) => {
                    debug!(%player_id, "叫牌被拒绝: {}", e);
                    let _ = tx.send(error(e.to_string())).await;
                }
            }
        }
        ClientMessage::Challenge => {
            let result = {
                let mut game_state = room.game_state.lock();
                let delay = Duration::from_millis(game_state.config.showdown_delay_ms);
                game_state
                    .submit_challenge(player_id)
                    .map(|result| (Outbound::showdown(&game_state, result), delay))
            };
            match result {
                Ok((outbound, delay)) => {
                    room.cancel_timer();
                    room.dispatch(outbound).await;
                    schedule_next_round(room, delay);
                }
                Err(e) => {
                    let _ = tx.send(error(e.to_string())).await;
                }
            }
        }
        ClientMessage::CreateRoom { .. } | ClientMessage::JoinRoom { .. } => {
            let _ = tx.send(error("你已经在一个房间里了")).await;
        }
    }
}

/// 改名。开局时被清理掉的占位玩家在游戏不在进行时重新入座。
fn rename_or_rejoin(game_state: &mut GameState, player_id: PlayerId, nickname: &str) -> Result<String, &'static str> {
    if let Some(old) = game_state.player(player_id).map(|p| p.nickname.clone()) {
        game_state.set_nickname(player_id, nickname);
        return Ok(format!("{} 改名为 {}", old, nickname));
    }
    if game_state.add_player(player_id, nickname) {
        return Ok(format!("{} 入座", nickname));
    }
    Err("游戏正在进行中，请等这局结束后再设置昵称")
}

/// 玩家断开连接后的处理
async fn handle_disconnect(state: SharedState, room_id: RoomId, player_id: PlayerId) {
    info!("玩家 {} 从房间 {} 断开连接", player_id, room_id);
    let Some(room) = find_room(&state, &room_id) else {
        return;
    };

    let mut outbound = vec![Outbound::All(ServerMessage::PlayerLeft { player_id })];
    {  // r_players write lock
        let mut r_players = room.players.write().await;
        // 从连接映射中移除
        r_players.remove(&player_id);

        // 如果房主断开，转移房主权限
        let host_id = *room.host_id.read();
        if player_id == host_id {
            if let Some(new_host_id) = r_players.keys().next().cloned() {
                *room.host_id.write() = new_host_id;
                let new_host_name = room
                    .game_state
                    .lock()
                    .player(new_host_id)
                    .map_or("未知玩家".to_string(), |p| p.nickname.clone());
                outbound.push(Outbound::All(ServerMessage::Info {
                    message: format!("房主已断开，新房主是 {}", new_host_name),
                }));
                info!("房间 {} 的房主已转移给 {}", room_id, new_host_id);
            }
        }

        {  // r_game_state lock
            let mut game_state = room.game_state.lock();
            if let Some(player) = game_state.remove_player(player_id) {
                outbound.push(Outbound::snapshot(&game_state, Some(format!("{} 离开了房间", player.nickname))));
            }
            if let Some(winner) = game_state.check_game_over() {
                outbound.push(Outbound::All(ServerMessage::GameOver { winner }));
            }
            outbound.push(Outbound::All(room::lobby_update(&game_state)));
        }

        // 判断是否清空房间
        if r_players.is_empty() {
            room.cancel_timer();
            state.rooms.remove(&room_id);
            info!("房间 {} 已空，已被移除", room_id);
            return;
        }
    }

    room.dispatch(outbound).await;
    // 轮到的人可能变了，旧计时器已经失效
    arm_timer(room);
}
