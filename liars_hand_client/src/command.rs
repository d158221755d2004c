use liars_hand_core::{ClaimFields, ClientMessage, ComboKind, RoomId};

/// 终端输入解析后的结果
#[derive(Debug)]
pub enum Command {
    Send(ClientMessage),
    Help,
    Exit,
}

/// 解析一行输入。出错时返回给用户看的提示。
pub fn parse_line(line: &str) -> Result<Command, String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some((&command, args)) = parts.split_first() else {
        return Err(String::new());
    };

    let msg = match command {
        "create" => {
            let nickname = args.first().copied().unwrap_or("新玩家").to_string();
            ClientMessage::CreateRoom { nickname }
        }
        "join" => {
            let [room_id, nickname] = args else {
                return Err("用法: join <房间ID> <昵称>".to_string());
            };
            let room_id: RoomId = room_id.parse().map_err(|_| "无效的房间ID格式".to_string())?;
            ClientMessage::JoinRoom { room_id, nickname: nickname.to_string() }
        }
        "name" => {
            let Some(nickname) = args.first() else {
                return Err("用法: name <昵称>".to_string());
            };
            ClientMessage::SetNickname(nickname.to_string())
        }
        "start" => ClientMessage::StartGame,
        "bid" => ClientMessage::Bid(parse_bid(args)?),
        "call" | "liar" => ClientMessage::Challenge,
        "help" => return Ok(Command::Help),
        "exit" | "quit" => return Ok(Command::Exit),
        _ => return Err(format!("未知命令: {}", line.trim())),
    };
    Ok(Command::Send(msg))
}

/// `bid <牌型> [点数1] [点数2] [花色] [+ <牌型> [点数1] [点数2] [花色]]`
///
/// `-` 表示跳过某个字段。牌型名会被规范化，无法识别的原样发给服务器。
fn parse_bid(args: &[&str]) -> Result<ClaimFields, String> {
    let mut shapes = args.split(|&a| a == "+");
    let primary = shapes.next().unwrap_or_default();
    let secondary = shapes.next();
    if shapes.next().is_some() {
        return Err("最多只能叫两个牌型".to_string());
    }

    let (combo, rank1, rank2, suit) = parse_shape(primary)?;
    let mut fields = ClaimFields { combo, rank1, rank2, suit, ..ClaimFields::default() };

    if let Some(secondary) = secondary {
        let (combo, rank1, rank2, suit) = parse_shape(secondary)?;
        let kind = combo.as_deref().and_then(ComboKind::from_token);
        if kind.is_some_and(|k| !k.allowed_as_secondary()) {
            return Err("副牌型不能是高牌".to_string());
        }
        fields.sec_combo = combo;
        fields.sec_rank1 = rank1;
        fields.sec_rank2 = rank2;
        fields.sec_suit = suit;
    }
    Ok(fields)
}

type ShapeFields = (Option<String>, Option<String>, Option<String>, Option<String>);

fn parse_shape(args: &[&str]) -> Result<ShapeFields, String> {
    let Some((&combo, rest)) = args.split_first() else {
        return Err("用法: bid <牌型> [点数1] [点数2] [花色] [+ 副牌型 ...]".to_string());
    };
    if rest.len() > 3 {
        return Err("每个牌型最多三个参数".to_string());
    }
    let combo = ComboKind::from_token(combo).map_or(combo.to_string(), |k| k.token().to_string());
    let field = |i: usize| rest.get(i).filter(|&&v| v != "-").map(|v| v.to_string());
    Ok((Some(combo), field(0), field(1), field(2)))
}

pub const HELP: &str = "\
可用命令:
  create <昵称>             - 创建一个新房间
  join <房间ID> <昵称>      - 加入一个房间
  name <昵称>               - 修改昵称
  start                     - 开始游戏 (仅房主)
  bid <牌型> [点数1] [点数2] [花色] [+ <牌型> ...]
                            - 叫牌, '-' 跳过字段, 例如: bid Full K 3 / bid Pair 5 + Pair 9
  call                      - 质疑上一个叫牌
  exit                      - 退出
牌型: HighCard Pair TwoPair ThreeOfAKind Flush Straight FullHouse FourOfAKind StraightFlush RoyalStraightFlush";

#[cfg(test)]
mod tests {
    use super::*;

    fn bid_fields(line: &str) -> ClaimFields {
        match parse_line(line) {
            Ok(Command::Send(ClientMessage::Bid(fields))) => fields,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_simple_bid() {
        let fields = bid_fields("bid Pair K");
        assert_eq!(fields.combo.as_deref(), Some("Paire"));
        assert_eq!(fields.rank1.as_deref(), Some("K"));
        assert!(fields.rank2.is_none());
        assert!(fields.sec_combo.is_none());
    }

    #[test]
    fn test_placeholder_fields() {
        let fields = bid_fields("bid Flush - - ♥");
        assert_eq!(fields.combo.as_deref(), Some("Couleur"));
        assert!(fields.rank1.is_none());
        assert_eq!(fields.suit.as_deref(), Some("♥"));
    }

    #[test]
    fn test_compound_bid() {
        let fields = bid_fields("bid FullHouse K 3 + Pair 5");
        assert_eq!(fields.rank2.as_deref(), Some("3"));
        assert_eq!(fields.sec_combo.as_deref(), Some("Paire"));
        assert_eq!(fields.sec_rank1.as_deref(), Some("5"));
    }

    #[test]
    fn test_unknown_combo_is_passed_through() {
        let fields = bid_fields("bid Whatever 7");
        assert_eq!(fields.combo.as_deref(), Some("Whatever"));
    }

    #[test]
    fn test_high_card_secondary_is_refused() {
        assert!(parse_line("bid Pair K + HighCard A").is_err());
        assert!(parse_line("bid Pair K + Pair 2 + Pair 3").is_err());
        assert!(parse_line("bid").is_err());
    }

    #[test]
    fn test_other_commands() {
        assert!(matches!(parse_line("call"), Ok(Command::Send(ClientMessage::Challenge))));
        assert!(matches!(parse_line("start"), Ok(Command::Send(ClientMessage::StartGame))));
        assert!(matches!(parse_line("exit"), Ok(Command::Exit)));
        assert!(parse_line("join not-a-uuid bob").is_err());
        assert!(parse_line("dance").is_err());
    }
}
