//! 开牌验证: 在所有存活玩家手牌组成的牌池中查找叫牌声明的牌型。
//!
//! 主牌型先从牌池中取走所需的牌，副牌型只能在剩下的牌里找。
//! 搜索是贪心的: 未指定点数/花色时，按牌池中第一次出现的顺序取第一个满足条件的，
//! 并不寻找"最好"的那一个。这会影响胜负，所以必须保持这个顺序。

use crate::card::{Card, Rank, Suit};
use crate::claim::{Claim, ComboKind, Declared, Shape};

/// 牌池的具体序列。按位置删除，所以顺序有意义。
pub type CardSequence = Vec<Card>;

/// 对某个字段的要求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Want<T> {
    Any,
    Exactly(T),
    /// 声明了无法解析的标记，什么牌都不满足
    Impossible,
}

impl<T: Copy + PartialEq> Want<T> {
    fn from_declared(declared: &Option<Declared<T>>) -> Want<T> {
        match declared {
            None => Want::Any,
            Some(Declared::Known(value)) => Want::Exactly(*value),
            Some(Declared::Malformed(_)) => Want::Impossible,
        }
    }

    fn accepts(self, value: T) -> bool {
        match self {
            Want::Any => true,
            Want::Exactly(expected) => expected == value,
            Want::Impossible => false,
        }
    }
}

/// 验证过程中的可变工作副本
struct Pool {
    cards: CardSequence,
}

impl Pool {
    /// 按下标从大到小删除，避免前面的删除让后面的下标失效
    fn remove_indices(&mut self, mut indices: Vec<usize>) {
        indices.sort_unstable_by(|a, b| b.cmp(a));
        for idx in indices {
            self.cards.remove(idx);
        }
    }

    /// 取走前 `count` 张满足条件的牌。数量不够时什么也不删。
    fn take(&mut self, rank: Want<Rank>, suit: Want<Suit>, count: usize) -> bool {
        let found: Vec<usize> = self
            .cards
            .iter()
            .enumerate()
            .filter(|(_, c)| rank.accepts(c.rank) && suit.accepts(c.suit))
            .map(|(i, _)| i)
            .take(count)
            .collect();

        if found.len() == count {
            self.remove_indices(found);
            true
        } else {
            false
        }
    }

    /// 按首次出现顺序统计
    fn counts_by<K: PartialEq + Copy>(&self, key: impl Fn(&Card) -> K) -> Vec<(K, usize)> {
        let mut counts: Vec<(K, usize)> = Vec::new();
        for card in &self.cards {
            let k = key(card);
            match counts.iter_mut().find(|(existing, _)| *existing == k) {
                Some((_, n)) => *n += 1,
                None => counts.push((k, 1)),
            }
        }
        counts
    }

    fn first_rank_with(&self, at_least: usize) -> Option<Rank> {
        self.counts_by(|c| c.rank).into_iter().find(|(_, n)| *n >= at_least).map(|(r, _)| r)
    }

    fn ranks_with(&self, at_least: usize) -> Vec<Rank> {
        self.counts_by(|c| c.rank)
            .into_iter()
            .filter(|(_, n)| *n >= at_least)
            .map(|(r, _)| r)
            .collect()
    }

    /// 声明了点数就按声明取，否则取第一个数量足够的点数
    fn take_of_a_kind(&mut self, rank: Want<Rank>, count: usize) -> bool {
        match rank {
            Want::Any => match self.first_rank_with(count) {
                Some(r) => self.take(Want::Exactly(r), Want::Any, count),
                None => false,
            },
            declared => self.take(declared, Want::Any, count),
        }
    }
}

/// 在一组牌中找 5 张点数连续的牌，返回它们在 `cards` 中的下标。
///
/// 从小到大扫描去重后的点数窗口，取第一个满足的窗口；找不到时再尝试 A-2-3-4-5。
/// `royal` 要求窗口以 A 结尾，且不接受 A-2-3-4-5。
fn find_sequence(cards: &[Card], royal: bool) -> Option<Vec<usize>> {
    const LENGTH: usize = 5;
    const ACE: u8 = 12;

    let mut mapped: Vec<(u8, usize)> = cards.iter().enumerate().map(|(i, c)| (c.rank.value(), i)).collect();
    // 稳定排序: 同点数的牌保持原顺序
    mapped.sort_by_key(|(val, _)| *val);

    let mut unique_vals: Vec<u8> = mapped.iter().map(|(val, _)| *val).collect();
    unique_vals.dedup();

    let mut found_vals: Option<Vec<u8>> = unique_vals
        .windows(LENGTH)
        .filter(|w| w[LENGTH - 1] - w[0] == (LENGTH as u8 - 1))
        .find(|w| !royal || w[LENGTH - 1] == ACE)
        .map(|w| w.to_vec());

    if found_vals.is_none() && !royal {
        let wheel = [0, 1, 2, 3, ACE];
        if wheel.iter().all(|v| unique_vals.contains(v)) {
            found_vals = Some(wheel.to_vec());
        }
    }

    found_vals.map(|vals| {
        vals.iter()
            .filter_map(|v| mapped.iter().find(|(val, _)| val == v).map(|(_, i)| *i))
            .collect()
    })
}

// --- 各牌型的匹配函数 ---

type Matcher = fn(&Shape, &mut Pool) -> bool;

/// 按 `ComboKind::index()` 排列的分发表
const MATCHERS: [Matcher; 10] = [
    match_high_card,
    match_pair,
    match_two_pair,
    match_three_of_a_kind,
    match_flush,
    match_straight,
    match_full_house,
    match_four_of_a_kind,
    match_straight_flush,
    match_royal_straight_flush,
];

fn match_high_card(shape: &Shape, pool: &mut Pool) -> bool {
    pool.take_of_a_kind(Want::from_declared(&shape.rank1), 1)
}

fn match_pair(shape: &Shape, pool: &mut Pool) -> bool {
    pool.take_of_a_kind(Want::from_declared(&shape.rank1), 2)
}

fn match_three_of_a_kind(shape: &Shape, pool: &mut Pool) -> bool {
    pool.take_of_a_kind(Want::from_declared(&shape.rank1), 3)
}

fn match_four_of_a_kind(shape: &Shape, pool: &mut Pool) -> bool {
    pool.take_of_a_kind(Want::from_declared(&shape.rank1), 4)
}

fn match_two_pair(shape: &Shape, pool: &mut Pool) -> bool {
    if shape.rank1.is_some() && shape.rank2.is_some() {
        let first = Want::from_declared(&shape.rank1);
        let second = Want::from_declared(&shape.rank2);
        return pool.take(first, Want::Any, 2) && pool.take(second, Want::Any, 2);
    }

    let pairs = pool.ranks_with(2);
    if pairs.len() < 2 {
        return false;
    }
    pool.take(Want::Exactly(pairs[0]), Want::Any, 2);
    pool.take(Want::Exactly(pairs[1]), Want::Any, 2);
    true
}

fn match_full_house(shape: &Shape, pool: &mut Pool) -> bool {
    // 先定三条，再在剩下的牌里找对子
    if !pool.take_of_a_kind(Want::from_declared(&shape.rank1), 3) {
        return false;
    }
    pool.take_of_a_kind(Want::from_declared(&shape.rank2), 2)
}

fn match_flush(shape: &Shape, pool: &mut Pool) -> bool {
    match Want::from_declared(&shape.suit) {
        Want::Any => {
            let suit = pool.counts_by(|c| c.suit).into_iter().find(|(_, n)| *n >= 5).map(|(s, _)| s);
            match suit {
                Some(s) => pool.take(Want::Any, Want::Exactly(s), 5),
                None => false,
            }
        }
        declared => pool.take(Want::Any, declared, 5),
    }
}

/// 顺子不看声明的点数，直接在整个牌池里搜索
fn match_straight(_shape: &Shape, pool: &mut Pool) -> bool {
    match find_sequence(&pool.cards, false) {
        Some(indices) => {
            pool.remove_indices(indices);
            true
        }
        None => false,
    }
}

fn match_suited_run(shape: &Shape, pool: &mut Pool, royal: bool) -> bool {
    let suits: Vec<Suit> = match Want::from_declared(&shape.suit) {
        Want::Exactly(s) => vec![s],
        Want::Impossible => vec![],
        Want::Any => pool.counts_by(|c| c.suit).into_iter().map(|(s, _)| s).collect(),
    };

    for suit in suits {
        let (real_indices, subset): (Vec<usize>, Vec<Card>) = pool
            .cards
            .iter()
            .enumerate()
            .filter(|(_, c)| c.suit == suit)
            .map(|(i, c)| (i, *c))
            .unzip();

        if let Some(found) = find_sequence(&subset, royal) {
            let indices = found.into_iter().map(|k| real_indices[k]).collect();
            pool.remove_indices(indices);
            return true;
        }
    }
    false
}

fn match_straight_flush(shape: &Shape, pool: &mut Pool) -> bool {
    match_suited_run(shape, pool, false)
}

fn match_royal_straight_flush(shape: &Shape, pool: &mut Pool) -> bool {
    match_suited_run(shape, pool, true)
}

// --- 对外接口 ---

/// 在牌池中匹配一个牌型，返回 (是否匹配, 剩余牌池)。
/// 没有声明牌型或牌型标记无法识别时视为不匹配，牌池原样返回。
pub fn match_shape(shape: &Shape, pool: CardSequence) -> (bool, CardSequence) {
    let mut pool = Pool { cards: pool };
    let matched = match shape.combo_kind() {
        Some(kind) => MATCHERS[kind.index()](shape, &mut pool),
        None => false,
    };
    (matched, pool.cards)
}

/// 验证整个叫牌: 主牌型成功后，副牌型在剩余牌中继续匹配。
pub fn verify_claim(claim: &Claim, pool: &[Card]) -> bool {
    let (matched, remaining) = match_shape(&claim.primary, pool.to_vec());
    if !matched {
        return false;
    }
    match &claim.secondary {
        Some(secondary) => match_shape(secondary, remaining).0,
        None => true,
    }
}

/// 开牌后展示给所有人的统计信息: 声明的点数或花色在场上一共有几张。
pub fn claim_stats(claim: &Claim, pool: &[Card]) -> Vec<String> {
    let shape = &claim.primary;
    if shape.combo.is_none() {
        return vec![];
    }

    let target_rank = shape.rank1.as_ref().or(shape.rank2.as_ref());
    if let Some(rank) = target_rank {
        let wanted = Want::from_declared(&Some(rank.clone()));
        let count = pool.iter().filter(|c| wanted.accepts(c.rank)).count();
        return vec![format!("场上恰好有 {} 张点数为 {} 的牌。", count, rank)];
    }
    if let Some(suit) = &shape.suit {
        let wanted = Want::from_declared(&Some(suit.clone()));
        let count = pool.iter().filter(|c| wanted.accepts(c.suit)).count();
        return vec![format!("场上恰好有 {} 张花色为 {} 的牌。", count, suit)];
    }
    vec![]
}

// 分发表必须覆盖全部牌型
const _: () = assert!(MATCHERS.len() == ComboKind::ALL.len());

// --- 单元测试 ---
