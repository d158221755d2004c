//! 叫牌 (Claim)
//!
//! 玩家声明"所有人手牌合在一起至少能凑出某个牌型"。一个叫牌由主牌型和可选的
//! 副牌型组成，两者从同一个牌池中互不重叠地取牌。
//!
//! 叫牌之间只能通过 [`ClaimKey`] 比较大小，字段本身从不直接比较相等。

use crate::card::{Rank, Suit};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 十种牌型，按强度从小到大排列。
/// 注意这里同花 (Flush) 排在顺子 (Straight) 之前，这是本游戏的规则。
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum ComboKind {
    HighCard,
    Pair,
    TwoPair,
    ThreeOfAKind,
    Flush,
    Straight,
    FullHouse,
    FourOfAKind,
    StraightFlush,
    RoyalStraightFlush,
}

impl ComboKind {
    pub const ALL: [ComboKind; 10] = [
        ComboKind::HighCard,
        ComboKind::Pair,
        ComboKind::TwoPair,
        ComboKind::ThreeOfAKind,
        ComboKind::Flush,
        ComboKind::Straight,
        ComboKind::FullHouse,
        ComboKind::FourOfAKind,
        ComboKind::StraightFlush,
        ComboKind::RoyalStraightFlush,
    ];

    /// 在强度序列中的位置
    pub fn index(self) -> usize {
        self as usize
    }

    /// 解析牌型标记。兼容客户端历史上使用的法语名称。
    pub fn from_token(token: &str) -> Option<ComboKind> {
        let kind = match token.trim() {
            "Carte" | "HighCard" | "High Card" => ComboKind::HighCard,
            "Paire" | "Pair" => ComboKind::Pair,
            "Double Paire" | "TwoPair" | "Two Pair" => ComboKind::TwoPair,
            "Brelan" | "ThreeOfAKind" | "Three of a Kind" => ComboKind::ThreeOfAKind,
            "Couleur" | "Flush" => ComboKind::Flush,
            "Suite" | "Straight" => ComboKind::Straight,
            "Full" | "FullHouse" | "Full House" => ComboKind::FullHouse,
            "Carré" | "FourOfAKind" | "Four of a Kind" => ComboKind::FourOfAKind,
            "QuinteFlush" | "StraightFlush" | "Straight Flush" => ComboKind::StraightFlush,
            "QuinteFlushRoyale" | "RoyalStraightFlush" | "Royal Straight Flush" => {
                ComboKind::RoyalStraightFlush
            }
            _ => return None,
        };
        Some(kind)
    }

    /// 线上传输用的标记
    pub fn token(self) -> &'static str {
        match self {
            ComboKind::HighCard => "Carte",
            ComboKind::Pair => "Paire",
            ComboKind::TwoPair => "Double Paire",
            ComboKind::ThreeOfAKind => "Brelan",
            ComboKind::Flush => "Couleur",
            ComboKind::Straight => "Suite",
            ComboKind::FullHouse => "Full",
            ComboKind::FourOfAKind => "Carré",
            ComboKind::StraightFlush => "QuinteFlush",
            ComboKind::RoyalStraightFlush => "QuinteFlushRoyale",
        }
    }

    /// 客户端只应为副牌型提供高牌以外的九种牌型。服务端不做校验。
    pub fn allowed_as_secondary(self) -> bool {
        self != ComboKind::HighCard
    }
}

impl fmt::Display for ComboKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            ComboKind::HighCard => "高牌",
            ComboKind::Pair => "一对",
            ComboKind::TwoPair => "两对",
            ComboKind::ThreeOfAKind => "三条",
            ComboKind::Flush => "同花",
            ComboKind::Straight => "顺子",
            ComboKind::FullHouse => "葫芦",
            ComboKind::FourOfAKind => "四条",
            ComboKind::StraightFlush => "同花顺",
            ComboKind::RoyalStraightFlush => "皇家同花顺",
        })
    }
}

/// 能从字符串标记解析出来、也能写回标记的字段类型
pub trait TokenValue: Sized + Copy {
    fn parse_token(token: &str) -> Option<Self>;
    fn to_token(self) -> &'static str;
}

impl TokenValue for ComboKind {
    fn parse_token(token: &str) -> Option<Self> {
        ComboKind::from_token(token)
    }
    fn to_token(self) -> &'static str {
        self.token()
    }
}

impl TokenValue for Rank {
    fn parse_token(token: &str) -> Option<Self> {
        Rank::from_token(token)
    }
    fn to_token(self) -> &'static str {
        self.token()
    }
}

impl TokenValue for Suit {
    fn parse_token(token: &str) -> Option<Self> {
        Suit::from_token(token)
    }
    fn to_token(self) -> &'static str {
        self.symbol()
    }
}

/// 声明的字段值。
/// 无法解析的标记不会在叫牌时被拒绝，而是保留下来，到开牌验证时才视为"不存在"。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declared<T> {
    Known(T),
    Malformed(String),
}

impl<T: TokenValue> Declared<T> {
    /// 空串视为未声明
    fn parse(raw: Option<&str>) -> Option<Declared<T>> {
        let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
        Some(match T::parse_token(raw) {
            Some(value) => Declared::Known(value),
            None => Declared::Malformed(raw.to_string()),
        })
    }

    pub fn known(&self) -> Option<T> {
        match self {
            Declared::Known(value) => Some(*value),
            Declared::Malformed(_) => None,
        }
    }

    pub fn token(&self) -> String {
        match self {
            Declared::Known(value) => value.to_token().to_string(),
            Declared::Malformed(raw) => raw.clone(),
        }
    }
}

impl<T: fmt::Display> fmt::Display for Declared<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Declared::Known(value) => write!(f, "{}", value),
            Declared::Malformed(raw) => write!(f, "{}", raw),
        }
    }
}

/// 单个牌型的比较分值: (牌型序号, 主点数, 次点数, 花色加成)
pub type ScoreTuple = (i8, i8, i8, i8);

/// 未声明牌型时的分值，低于任何真实牌型
pub const SENTINEL_SCORE: ScoreTuple = (-1, -1, -1, -1);

/// 一个牌型形状。所有字段都可省略，省略表示"任意"，由开牌时搜索决定。
#[derive(Debug, Clone, Default)]
pub struct Shape {
    pub combo: Option<Declared<ComboKind>>,
    pub rank1: Option<Declared<Rank>>,
    pub rank2: Option<Declared<Rank>>,
    pub suit: Option<Declared<Suit>>,
}

impl Shape {
    pub fn new(combo: ComboKind) -> Shape {
        Shape { combo: Some(Declared::Known(combo)), ..Shape::default() }
    }

    pub fn rank(mut self, rank: Rank) -> Shape {
        self.rank1 = Some(Declared::Known(rank));
        self
    }

    pub fn ranks(mut self, rank1: Rank, rank2: Rank) -> Shape {
        self.rank1 = Some(Declared::Known(rank1));
        self.rank2 = Some(Declared::Known(rank2));
        self
    }

    pub fn suit(mut self, suit: Suit) -> Shape {
        self.suit = Some(Declared::Known(suit));
        self
    }

    pub fn combo_kind(&self) -> Option<ComboKind> {
        self.combo.as_ref().and_then(Declared::known)
    }

    pub fn known_rank1(&self) -> Option<Rank> {
        self.rank1.as_ref().and_then(Declared::known)
    }

    pub fn known_rank2(&self) -> Option<Rank> {
        self.rank2.as_ref().and_then(Declared::known)
    }

    pub fn known_suit(&self) -> Option<Suit> {
        self.suit.as_ref().and_then(Declared::known)
    }

    /// 计算比较分值。
    /// 葫芦按声明顺序取 (三条点数, 对子点数)，其他牌型取两个点数的 (max, min)。
    pub fn score(&self) -> ScoreTuple {
        let Some(combo) = &self.combo else {
            return SENTINEL_SCORE;
        };
        let combo_idx = combo.known().map_or(-1, |c| c.index() as i8);
        let r1 = self.known_rank1().map_or(-1, |r| r.value() as i8);
        let r2 = self.known_rank2().map_or(-1, |r| r.value() as i8);

        let (primary, secondary) = if combo.known() == Some(ComboKind::FullHouse) {
            (r1, r2)
        } else {
            (r1.max(r2), r1.min(r2))
        };
        let suit_bonus = if self.suit.is_some() { 1 } else { 0 };

        (combo_idx, primary, secondary, suit_bonus)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let Some(combo) = &self.combo else {
            return Ok(());
        };
        write!(f, "{}", combo)?;
        match (&self.rank1, &self.rank2, &self.suit) {
            (Some(r1), Some(r2), _) if combo.known() == Some(ComboKind::FullHouse) => {
                write!(f, " {} 带 {}", r1, r2)
            }
            (Some(r1), Some(r2), _) => write!(f, " {} & {}", r1, r2),
            (Some(r1), None, _) => write!(f, " ({})", r1),
            (None, _, Some(suit)) => write!(f, " {}", suit),
            _ => Ok(()),
        }
    }
}

/// 叫牌的线上格式: 八个可选字符串字段。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimFields {
    #[serde(default)]
    pub combo: Option<String>,
    #[serde(default)]
    pub rank1: Option<String>,
    #[serde(default)]
    pub rank2: Option<String>,
    #[serde(default)]
    pub suit: Option<String>,
    #[serde(default)]
    pub sec_combo: Option<String>,
    #[serde(default)]
    pub sec_rank1: Option<String>,
    #[serde(default)]
    pub sec_rank2: Option<String>,
    #[serde(default)]
    pub sec_suit: Option<String>,
}

/// 叫牌的比较键: (主牌型分值, 副牌型分值)。没有副牌型时副分值为哨兵值。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimKey {
    pub primary: ScoreTuple,
    pub secondary: ScoreTuple,
}

/// 一次叫牌。构造后不再修改。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "ClaimFields", into = "ClaimFields")]
pub struct Claim {
    pub primary: Shape,
    pub secondary: Option<Shape>,
}

impl Claim {
    pub fn new(primary: Shape) -> Claim {
        Claim { primary, secondary: None }
    }

    pub fn compound(primary: Shape, secondary: Shape) -> Claim {
        Claim { primary, secondary: Some(secondary) }
    }

    /// 从客户端字段构造。只做结构解析，不做合法性检查。
    pub fn from_fields(fields: &ClaimFields) -> Claim {
        let primary = Shape {
            combo: Declared::parse(fields.combo.as_deref()),
            rank1: Declared::parse(fields.rank1.as_deref()),
            rank2: Declared::parse(fields.rank2.as_deref()),
            suit: Declared::parse(fields.suit.as_deref()),
        };
        // 副牌型只有在声明了牌型时才存在
        let secondary = Declared::<ComboKind>::parse(fields.sec_combo.as_deref()).map(|combo| Shape {
            combo: Some(combo),
            rank1: Declared::parse(fields.sec_rank1.as_deref()),
            rank2: Declared::parse(fields.sec_rank2.as_deref()),
            suit: Declared::parse(fields.sec_suit.as_deref()),
        });
        Claim { primary, secondary }
    }

    pub fn to_fields(&self) -> ClaimFields {
        let sec = self.secondary.as_ref();
        ClaimFields {
            combo: self.primary.combo.as_ref().map(Declared::token),
            rank1: self.primary.rank1.as_ref().map(Declared::token),
            rank2: self.primary.rank2.as_ref().map(Declared::token),
            suit: self.primary.suit.as_ref().map(Declared::token),
            sec_combo: sec.and_then(|s| s.combo.as_ref()).map(Declared::token),
            sec_rank1: sec.and_then(|s| s.rank1.as_ref()).map(Declared::token),
            sec_rank2: sec.and_then(|s| s.rank2.as_ref()).map(Declared::token),
            sec_suit: sec.and_then(|s| s.suit.as_ref()).map(Declared::token),
        }
    }

    pub fn key(&self) -> ClaimKey {
        ClaimKey {
            primary: self.primary.score(),
            secondary: self.secondary.as_ref().map_or(SENTINEL_SCORE, Shape::score),
        }
    }

    /// 当前叫牌是否严格大于 `other`。
    ///
    /// 先比较主牌型分值；只有主分值完全相同时才比较副分值，且副分值必须严格更大。
    /// 副牌型只能打破平局，不能挽回主牌型上的失利。`other` 为空时总是更大。
    pub fn is_greater_than(&self, other: Option<&Claim>) -> bool {
        let Some(other) = other else {
            return true;
        };
        let mine = self.key();
        let theirs = other.key();

        if mine.primary > theirs.primary {
            return true;
        }
        if mine.primary < theirs.primary {
            return false;
        }
        mine.secondary > theirs.secondary
    }
}

impl From<ClaimFields> for Claim {
    fn from(fields: ClaimFields) -> Self {
        Claim::from_fields(&fields)
    }
}

impl From<Claim> for ClaimFields {
    fn from(claim: Claim) -> Self {
        claim.to_fields()
    }
}

impl fmt::Display for Claim {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.primary)?;
        if let Some(secondary) = &self.secondary {
            write!(f, " + {}", secondary)?;
        }
        Ok(())
    }
}

// --- 单元测试 ---
