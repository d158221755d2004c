mod command;

use futures_util::{SinkExt, StreamExt};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

use liars_hand_core::{GamePhase, GameSnapshot, ServerMessage};

use crate::command::{parse_line, Command, HELP};

const DEFAULT_URL: &str = "ws://127.0.0.1:25917/ws";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let raw_url = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_URL.to_string());
    let url = Url::parse(&raw_url)?;

    println!("正在连接到: {}", url);
    let (ws_stream, _) = connect_async(url.as_str()).await?;
    println!("连接成功!");

    let (mut write, mut read) = ws_stream.split();

    // 启动一个任务来处理从服务器接收的消息
    tokio::spawn(async move {
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(server_msg) => {
                        println!("\n{}", render(&server_msg));
                        prompt();
                    }
                    Err(e) => eprintln!("解析服务器消息失败: {}", e),
                },
                Ok(_) => {}
                Err(e) => {
                    eprintln!("接收消息时出错: {}", e);
                    break;
                }
            }
        }
    });

    // 主任务处理用户输入
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    println!("--- 吹牛扑克客户端 ---");
    println!("{}", HELP);

    loop {
        prompt();

        let Some(line) = stdin.next_line().await? else {
            break;
        };
        let msg = match parse_line(&line) {
            Ok(Command::Send(msg)) => msg,
            Ok(Command::Help) => {
                println!("{}", HELP);
                continue;
            }
            Ok(Command::Exit) => {
                println!("正在断开连接...");
                break;
            }
            Err(hint) => {
                if !hint.is_empty() {
                    println!("{}", hint);
                }
                continue;
            }
        };

        let payload = serde_json::to_string(&msg)?;
        write.send(Message::Text(payload.into())).await?;
    }

    Ok(())
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

/// 把服务器消息转成给人看的文字
fn render(msg: &ServerMessage) -> String {
    match msg {
        ServerMessage::RoomJoined { your_id, room_id, host_id } => {
            let role = if your_id == host_id { " (你是房主)" } else { "" };
            format!("已进入房间 {}{}", room_id, role)
        }
        ServerMessage::LobbyUpdate { count, ready } => {
            format!("大厅: {} 名玩家{}", count, if *ready { "，可以开始了" } else { "" })
        }
        ServerMessage::PlayerJoined { nickname, .. } => format!("{} 加入了房间", nickname),
        ServerMessage::PlayerLeft { player_id } => format!("玩家 {} 离开了", player_id),
        ServerMessage::GameStateSnapshot { state, log, new_round, .. } => {
            let mut out = String::new();
            if *new_round {
                out.push_str(&format!("===== 第 {} 回合 =====\n", state.round));
            }
            if let Some(log) = log {
                out.push_str(&format!("{}\n", log));
            }
            out.push_str(&render_table(state));
            out
        }
        ServerMessage::Showdown(result) => {
            let cards: Vec<String> = result.revealed_cards.iter().map(|c| c.to_string()).collect();
            let mut out = format!("*** {} *** {}\n", result.title, result.outcome_text);
            if !cards.is_empty() {
                out.push_str(&format!("牌池: {}\n", cards.join(" ")));
            }
            out.push_str(&result.stats.join("\n"));
            out
        }
        ServerMessage::GameOver { winner } => format!("游戏结束！胜者: {}", winner.winner_label()),
        ServerMessage::Info { message } => format!("[提示] {}", message),
        ServerMessage::Error { message } => format!("[错误] {}", message),
    }
}

fn render_table(state: &GameSnapshot) -> String {
    let mut lines = Vec::new();
    let mut flags = Vec::new();
    if state.is_blind {
        flags.push("盲牌");
    }
    if state.is_double_penalty {
        flags.push("双倍惩罚");
    }
    if state.is_timer_mode {
        flags.push("计时");
    }
    if !flags.is_empty() {
        lines.push(format!("模式: {}", flags.join(" / ")));
    }
    match &state.claim {
        Some(claim) => lines.push(format!("当前叫牌: {}", claim)),
        None => lines.push("当前叫牌: 无".to_string()),
    }
    for (idx, seat) in state.players.iter().enumerate() {
        let marker = if idx == state.cur_player_idx && state.phase == GamePhase::Bidding { "->" } else { "  " };
        let hand = if seat.hand.is_empty() {
            format!("[{} 张]", seat.hand_size)
        } else {
            seat.hand.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(" ")
        };
        let status = if seat.eliminated { " (已淘汰)".to_string() } else { format!(" 额度 {}", seat.quota) };
        lines.push(format!("{} {}{} {}", marker, seat.nickname, status, hand));
    }
    lines.join("\n")
}
