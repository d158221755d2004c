use crate::card::*;
use crate::claim::{Claim, ClaimFields};
use crate::error::EngineError;
use crate::pool::{claim_stats, verify_claim};
use crate::state::*;
use rand::Rng;
use tracing::{debug, info};

/// 一次判负的结果
struct Penalty {
    loser_id: PlayerId,
    loser_name: String,
    eliminated: bool,
}

// --- 核心游戏流程 ---

impl GameState {
    /// 新玩家入座。一局进行中不允许加入。
    pub fn add_player(&mut self, id: PlayerId, nickname: impl Into<String>) -> bool {
        if self.game_in_progress() || self.player_index(id).is_some() {
            return false;
        }
        self.players.push(Player::new(id, nickname));
        true
    }

    /// 玩家登录后设置名字，从占位玩家变成真正的玩家
    pub fn set_nickname(&mut self, id: PlayerId, nickname: impl Into<String>) -> bool {
        match self.players.iter_mut().find(|p| p.id == id) {
            Some(player) => {
                player.nickname = nickname.into();
                true
            }
            None => false,
        }
    }

    /// 玩家离开 (任何阶段都可以)。
    ///
    /// - 离开的人坐在当前行动者之前: 行动者下标减一。
    /// - 离开的人就是当前行动者: 下标不变，指向原来的下一位。
    /// - 游戏进行中，最后把下标移到未被淘汰的玩家上。
    /// - 离开的人就是最后叫牌的人: 当前叫牌无法再验证，一并清除。
    pub fn remove_player(&mut self, id: PlayerId) -> Option<Player> {
        let idx = self.player_index(id)?;

        if self.game_in_progress() {
            if idx < self.cur_player_idx {
                self.cur_player_idx -= 1;
            } else if idx == self.cur_player_idx && self.cur_player_idx >= self.players.len() - 1 {
                self.cur_player_idx = 0;
            }

            match self.last_declarer_idx {
                Some(declarer) if idx < declarer => self.last_declarer_idx = Some(declarer - 1),
                Some(declarer) if idx == declarer => {
                    self.last_declarer_idx = None;
                    self.current_claim = None;
                }
                _ => {}
            }
            self.turn_seq += 1;
        }

        let player = self.players.remove(idx);
        if self.cur_player_idx >= self.players.len() {
            self.cur_player_idx = 0;
        }
        if self.game_in_progress() {
            self.ensure_valid_player_index();
        }

        debug!(room = %self.room_id, player = %player.nickname, seat = idx, "玩家离开");
        Some(player)
    }

    /// 有人离开后检查游戏是否因人数不足而结束
    pub fn check_game_over(&mut self) -> Option<GameOver> {
        if !self.game_in_progress() || self.active_count() >= 2 {
            return None;
        }
        self.phase = GamePhase::GameOver;
        let result = self.game_over_result();
        info!(room = %self.room_id, winner = result.winner_label(), "游戏结束 (玩家不足)");
        Some(result)
    }

    /// 开始新的一局游戏前重置所有人的惩罚计数。只能在大厅或游戏结束后调用。
    pub fn reset_for_new_game(&mut self) -> bool {
        if self.game_in_progress() {
            return false;
        }
        for player in self.players.iter_mut() {
            player.quota = 1;
            player.eliminated = false;
            player.hand.clear();
        }
        self.phase = GamePhase::Lobby;
        self.round = 0;
        self.current_claim = None;
        self.last_declarer_idx = None;
        self.cur_player_idx = 0;
        self.turn_seq = 0;
        self.is_blind = false;
        self.is_double_penalty = false;
        self.is_timer_mode = false;
        self.deck.clear();
        true
    }

    /// 开始新的一回合 (使用线程随机数)
    pub fn start_round(&mut self) -> RoundStart {
        self.start_round_with(&mut rand::rng())
    }

    /// 开始新的一回合
    ///
    /// - 清理占位玩家。
    /// - 用一次随机数决定盲牌 / 双倍惩罚 / 计时模式。
    /// - 重置叫牌状态，洗一副新牌。
    /// - 存活玩家不足 2 人时游戏结束，不发牌。
    /// - 按每人的 quota 从牌堆末尾发牌，牌发完就停。
    /// - 非盲牌回合有一定概率发生革命: 每个人拿到上一个座位的手牌。
    pub fn start_round_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> RoundStart {
        self.players.retain(|p| !p.is_placeholder());
        if self.cur_player_idx >= self.players.len() {
            self.cur_player_idx = 0;
        }

        // 1. 回合模式
        let roll: f64 = rng.random();
        let config = &self.config;
        self.is_blind = roll < config.blind_chance;
        self.is_double_penalty =
            !self.is_blind && roll > config.blind_chance && roll < config.double_penalty_ceiling;
        self.is_timer_mode = !self.is_blind && !self.is_double_penalty && roll < config.timer_ceiling;

        // 2. 重置回合状态
        self.round += 1;
        self.current_claim = None;
        self.last_declarer_idx = None;
        self.turn_seq = 0;
        self.phase = GamePhase::Dealing;
        self.deck = shuffled_deck(rng);

        let active: Vec<usize> = (0..self.players.len()).filter(|&i| !self.players[i].eliminated).collect();
        if active.len() < 2 {
            self.phase = GamePhase::GameOver;
            let result = self.game_over_result();
            info!(room = %self.room_id, round = self.round, winner = result.winner_label(), "游戏结束");
            return RoundStart::GameOver(result);
        }

        // 3. 发牌
        for player in self.players.iter_mut() {
            player.hand.clear();
        }
        for &idx in &active {
            for _ in 0..self.players[idx].quota {
                match self.deck.pop() {
                    Some(card) => self.players[idx].hand.push(card),
                    None => break,
                }
            }
        }

        // 4. 革命
        let revolution =
            !self.is_blind && rng.random::<f64>() < self.config.revolution_chance;
        if revolution {
            self.rotate_hands(&active);
        }

        let effect = if revolution {
            Some(RoundEffect::Revolution)
        } else if self.is_double_penalty {
            Some(RoundEffect::DoublePenalty)
        } else if self.is_timer_mode {
            Some(RoundEffect::Timer)
        } else if self.is_blind {
            Some(RoundEffect::Blind)
        } else {
            None
        };
        let announcement = effect.map(|e| match e {
            RoundEffect::Revolution => "🌪️ 革命！所有人的手牌轮转了！".to_string(),
            RoundEffect::DoublePenalty => "💥 双倍惩罚！输的人扣两条命！".to_string(),
            RoundEffect::Timer => format!("⏳ 闪电战！每回合只有 {} 秒！", self.config.turn_timeout_secs()),
            RoundEffect::Blind => "🙈 盲牌回合！这回合看不到自己的手牌！".to_string(),
        });

        self.phase = GamePhase::Bidding;
        self.ensure_valid_player_index();

        debug!(
            room = %self.room_id,
            round = self.round,
            blind = self.is_blind,
            double_penalty = self.is_double_penalty,
            timer = self.is_timer_mode,
            revolution,
            "新回合开始"
        );
        RoundStart::Started { effect, announcement }
    }

    /// 把下标移到下一个未被淘汰的玩家 (包括当前位置)，最多绕一圈。
    pub fn ensure_valid_player_index(&mut self) {
        let len = self.players.len();
        if len == 0 {
            return;
        }
        for _ in 0..len {
            if self.cur_player_idx >= len {
                self.cur_player_idx = 0;
            }
            if !self.players[self.cur_player_idx].eliminated {
                return;
            }
            self.cur_player_idx = (self.cur_player_idx + 1) % len;
        }
    }

    /// 处理叫牌。新叫牌必须严格大于当前叫牌，字段本身的合法性要到开牌时才检查。
    pub fn submit_bid(&mut self, player_id: PlayerId, fields: &ClaimFields) -> Result<(), EngineError> {
        self.check_turn(player_id)?;

        let claim = Claim::from_fields(fields);
        if !claim.is_greater_than(self.current_claim.as_ref()) {
            return Err(EngineError::InsufficientClaim);
        }

        debug!(room = %self.room_id, round = self.round, seat = self.cur_player_idx, claim = %claim, "叫牌");
        self.current_claim = Some(claim);
        self.last_declarer_idx = Some(self.cur_player_idx);
        self.cur_player_idx = (self.cur_player_idx + 1) % self.players.len();
        self.turn_seq += 1;
        self.ensure_valid_player_index();
        Ok(())
    }

    /// 质疑上一个叫牌 (开牌)。
    ///
    /// 叫牌在牌池中成立则质疑者输，否则叫牌者输。输家扣命，
    /// 下一回合从输家 (或他之后的第一个存活玩家) 开始。
    pub fn submit_challenge(&mut self, player_id: PlayerId) -> Result<ShowdownResult, EngineError> {
        self.check_turn(player_id)?;

        let (Some(declarer_idx), Some(claim)) = (self.last_declarer_idx, self.current_claim.as_ref()) else {
            return Err(EngineError::NoClaimToChallenge);
        };

        let pool = self.collect_pool();
        let stats = claim_stats(claim, &pool);
        let is_truth = verify_claim(claim, &pool);
        let claim_text = claim.to_string();

        let loser_idx = if is_truth { self.cur_player_idx } else { declarer_idx };
        let penalty = self.apply_penalty(loser_idx);

        self.cur_player_idx = loser_idx;
        self.ensure_valid_player_index();
        self.phase = GamePhase::Showdown;
        self.turn_seq += 1;

        info!(
            room = %self.room_id,
            round = self.round,
            claim = %claim_text,
            is_truth,
            loser = %penalty.loser_name,
            eliminated = penalty.eliminated,
            "开牌"
        );

        let mut outcome_text = format!("{} 输掉一条命！", penalty.loser_name);
        if penalty.eliminated {
            outcome_text.push_str(" 被淘汰！");
        }
        Ok(ShowdownResult {
            title: if is_truth { "真话！" } else { "谎言！" }.to_string(),
            is_truth,
            outcome_text,
            revealed_cards: pool,
            stats,
            loser_id: penalty.loser_id,
            loser_eliminated: penalty.eliminated,
            timed_out: false,
        })
    }

    /// 计时器到期。`key` 与当前回合不一致 (已经有人行动过、有人离开、回合已换) 时忽略。
    pub fn apply_timeout(&mut self, key: TurnKey) -> Option<ShowdownResult> {
        if self.turn_key() != Some(key) {
            debug!(room = %self.room_id, ?key, "过期的计时器，忽略");
            return None;
        }
        if self.cur_player_idx >= self.players.len() {
            return None;
        }

        let penalty = self.apply_penalty(self.cur_player_idx);
        self.ensure_valid_player_index();
        self.phase = GamePhase::Showdown;
        self.turn_seq += 1;

        info!(room = %self.room_id, round = self.round, loser = %penalty.loser_name, "超时判负");

        let mut outcome_text = format!("⏳ {} 太慢了！", penalty.loser_name);
        if penalty.eliminated {
            outcome_text.push_str(" 被淘汰！");
        }
        Some(ShowdownResult {
            title: "时间到！".to_string(),
            is_truth: false,
            outcome_text,
            revealed_cards: Vec::new(),
            stats: vec!["沙漏从不留情。".to_string()],
            loser_id: penalty.loser_id,
            loser_eliminated: penalty.eliminated,
            timed_out: true,
        })
    }
}

// --- 辅助逻辑函数 ---

impl GameState {
    fn check_turn(&self, player_id: PlayerId) -> Result<(), EngineError> {
        if self.phase != GamePhase::Bidding {
            return Err(EngineError::NoActiveRound);
        }
        if self.current_player_id() != Some(player_id) {
            return Err(EngineError::NotYourTurn);
        }
        Ok(())
    }

    /// 所有存活玩家的手牌，按座位顺序拼接
    fn collect_pool(&self) -> Vec<Card> {
        self.active_players().flat_map(|p| p.hand.iter().copied()).collect()
    }

    fn apply_penalty(&mut self, loser_idx: usize) -> Penalty {
        let damage = if self.is_double_penalty { 2 } else { 1 };
        let max_quota = self.config.max_quota;
        let loser = &mut self.players[loser_idx];
        loser.quota += damage;
        if loser.quota > max_quota {
            loser.eliminated = true;
        }
        Penalty {
            loser_id: loser.id,
            loser_name: loser.nickname.clone(),
            eliminated: loser.eliminated,
        }
    }

    /// 革命: 第 i 个存活玩家拿到第 i-1 个存活玩家的手牌 (首尾相接)
    fn rotate_hands(&mut self, active: &[usize]) {
        let mut hands: Vec<Vec<Card>> =
            active.iter().map(|&i| std::mem::take(&mut self.players[i].hand)).collect();
        hands.rotate_right(1);
        for (&idx, hand) in active.iter().zip(hands) {
            self.players[idx].hand = hand;
        }
    }

    fn game_over_result(&self) -> GameOver {
        let mut survivors = self.active_players();
        match (survivors.next(), survivors.next()) {
            (Some(winner), None) => GameOver {
                winner_id: Some(winner.id),
                winner_name: Some(winner.nickname.clone()),
            },
            _ => GameOver { winner_id: None, winner_name: None },
        }
    }
}

// --- 单元测试 ---

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::{ComboKind, Shape};
    use crate::config::GameConfig;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;
    use uuid::Uuid;

    // 辅助函数：创建用于测试的GameState
    fn setup_test_game(names: &[&str]) -> (GameState, Vec<PlayerId>) {
        let mut state = GameState::new(RoomId::new_v4(), GameConfig::default());
        let mut player_ids = Vec::new();
        for name in names {
            let id = Uuid::new_v4();
            assert!(state.add_player(id, *name));
            player_ids.push(id);
        }
        (state, player_ids)
    }

    // 开一局，关掉所有随机的回合模式和革命，方便断言
    fn start_plain_round(state: &mut GameState, seed: u64) {
        state.config = no_modifiers();
        let mut rng = StdRng::seed_from_u64(seed);
        let start = state.start_round_with(&mut rng);
        assert_eq!(start, RoundStart::Started { effect: None, announcement: None });
    }

    fn card(rank: Rank, suit: Suit) -> Card {
        Card { rank, suit }
    }

    fn bid(combo: &str, rank1: &str) -> ClaimFields {
        ClaimFields {
            combo: Some(combo.to_string()),
            rank1: Some(rank1.to_string()),
            ..ClaimFields::default()
        }
    }

    fn no_modifiers() -> GameConfig {
        GameConfig {
            blind_chance: 0.0,
            double_penalty_ceiling: 0.0,
            timer_ceiling: 0.0,
            revolution_chance: 0.0,
            ..GameConfig::default()
        }
    }

    #[test]
    fn test_start_round_deals_quota_sized_hands() {
        let (mut state, _) = setup_test_game(&["A", "B", "C"]);
        state.players[1].quota = 4;
        start_plain_round(&mut state, 1);

        assert_eq!(state.phase, GamePhase::Bidding);
        assert_eq!(state.round, 1);
        assert_eq!(state.players[0].hand.len(), 1);
        assert_eq!(state.players[1].hand.len(), 4);
        assert_eq!(state.players[2].hand.len(), 1);
        assert_eq!(state.deck.len(), 52 - 6);
        assert!(state.current_claim.is_none());
        assert!(state.last_declarer_idx.is_none());
    }

    #[test]
    fn test_dealing_stops_when_deck_runs_out() {
        let names: Vec<String> = (0..10).map(|i| format!("P{}", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let (mut state, _) = setup_test_game(&refs);
        for p in state.players.iter_mut() {
            p.quota = 6;
        }
        start_plain_round(&mut state, 3);

        let dealt: usize = state.players.iter().map(|p| p.hand.len()).sum();
        assert_eq!(dealt, 52);
        assert!(state.deck.is_empty());
        // 前面的人拿满，后面的人拿到残缺的手牌
        assert_eq!(state.players[0].hand.len(), 6);
        assert_eq!(state.players[8].hand.len(), 4);
        assert_eq!(state.players[9].hand.len(), 0);
    }

    #[test]
    fn test_start_round_game_over_with_one_survivor() {
        let (mut state, ids) = setup_test_game(&["A", "B"]);
        state.players[0].eliminated = true;
        let start = state.start_round();
        assert_eq!(
            start,
            RoundStart::GameOver(GameOver { winner_id: Some(ids[1]), winner_name: Some("B".to_string()) })
        );
        assert_eq!(state.phase, GamePhase::GameOver);
        assert!(state.players[1].hand.is_empty());
    }

    #[test]
    fn test_start_round_game_over_with_nobody() {
        let mut state = GameState::new(RoomId::new_v4(), GameConfig::default());
        match state.start_round() {
            RoundStart::GameOver(result) => assert_eq!(result.winner_label(), NOBODY),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_placeholders_are_removed_at_round_start() {
        let (mut state, ids) = setup_test_game(&["A", PLACEHOLDER_NAME, "", "B"]);
        start_plain_round(&mut state, 5);
        let remaining: Vec<PlayerId> = state.players.iter().map(|p| p.id).collect();
        assert_eq!(remaining, vec![ids[0], ids[3]]);
    }

    #[test]
    fn test_named_stub_takes_part() {
        let (mut state, ids) = setup_test_game(&["A", ""]);
        assert!(state.set_nickname(ids[1], "B"));
        start_plain_round(&mut state, 5);
        assert_eq!(state.players.len(), 2);
    }

    #[test]
    fn test_round_modifiers_are_exclusive() {
        let (mut state, _) = setup_test_game(&["A", "B"]);
        let mut seen = HashSet::new();
        for seed in 0..400 {
            state.phase = GamePhase::Lobby;
            state.start_round_with(&mut StdRng::seed_from_u64(seed));
            let flags = (state.is_blind, state.is_double_penalty, state.is_timer_mode);
            assert!(
                [flags.0, flags.1, flags.2].iter().filter(|&&f| f).count() <= 1,
                "seed {} gave {:?}",
                seed,
                flags
            );
            seen.insert(flags);
        }
        // 四种情况在 400 次里都会出现
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn test_revolution_rotates_hands_forward() {
        let (mut state, _) = setup_test_game(&["A", "B", "C"]);
        let h0 = vec![card(Rank::Two, Suit::Spade)];
        let h1 = vec![card(Rank::Three, Suit::Heart)];
        let h2 = vec![card(Rank::Four, Suit::Club)];
        state.players[0].hand = h0.clone();
        state.players[1].hand = h1.clone();
        state.players[2].hand = h2.clone();

        state.rotate_hands(&[0, 1, 2]);

        assert_eq!(state.players[0].hand, h2);
        assert_eq!(state.players[1].hand, h0);
        assert_eq!(state.players[2].hand, h1);
    }

    #[test]
    fn test_revolution_during_round_start() {
        let config = GameConfig { revolution_chance: 1.0, ..no_modifiers() };
        let (mut rotated, _) = setup_test_game(&["A", "B", "C"]);
        rotated.config = config;
        let mut plain = rotated.clone();
        plain.config.revolution_chance = 0.0;

        let start = rotated.start_round_with(&mut StdRng::seed_from_u64(11));
        plain.start_round_with(&mut StdRng::seed_from_u64(11));

        assert_eq!(
            start,
            RoundStart::Started {
                effect: Some(RoundEffect::Revolution),
                announcement: Some("🌪️ 革命！所有人的手牌轮转了！".to_string()),
            }
        );
        assert_eq!(rotated.players[0].hand, plain.players[2].hand);
        assert_eq!(rotated.players[1].hand, plain.players[0].hand);
        assert_eq!(rotated.players[2].hand, plain.players[1].hand);
    }

    #[test]
    fn test_blind_round_has_no_revolution() {
        let config = GameConfig { blind_chance: 1.0, revolution_chance: 1.0, ..no_modifiers() };
        let (mut state, _) = setup_test_game(&["A", "B"]);
        state.config = config;
        let start = state.start_round_with(&mut StdRng::seed_from_u64(2));
        assert!(state.is_blind);
        assert!(matches!(start, RoundStart::Started { effect: Some(RoundEffect::Blind), .. }));
    }

    #[test]
    fn test_ensure_valid_player_index_skips_eliminated() {
        let (mut state, _) = setup_test_game(&["A", "B", "C"]);
        state.players[1].eliminated = true;
        state.players[2].eliminated = true;
        state.cur_player_idx = 1;
        state.ensure_valid_player_index();
        assert_eq!(state.cur_player_idx, 0);

        state.cur_player_idx = 7;
        state.ensure_valid_player_index();
        assert_eq!(state.cur_player_idx, 0);
    }

    #[test]
    fn test_ensure_valid_player_index_terminates_when_all_eliminated() {
        let (mut state, _) = setup_test_game(&["A", "B"]);
        state.players.iter_mut().for_each(|p| p.eliminated = true);
        state.ensure_valid_player_index();
        assert!(state.cur_player_idx < 2);

        let mut empty = GameState::new(RoomId::new_v4(), GameConfig::default());
        empty.ensure_valid_player_index();
    }

    #[test]
    fn test_bid_out_of_turn_is_rejected() {
        let (mut state, ids) = setup_test_game(&["A", "B"]);
        start_plain_round(&mut state, 1);
        state.cur_player_idx = 0;
        assert_eq!(state.submit_bid(ids[1], &bid("Paire", "K")), Err(EngineError::NotYourTurn));
        assert!(state.current_claim.is_none());
    }

    #[test]
    fn test_bid_before_round_is_rejected() {
        let (mut state, ids) = setup_test_game(&["A", "B"]);
        assert_eq!(state.submit_bid(ids[0], &bid("Paire", "K")), Err(EngineError::NoActiveRound));
        assert_eq!(state.submit_challenge(ids[0]).unwrap_err(), EngineError::NoActiveRound);
    }

    #[test]
    fn test_bid_must_increase() {
        let (mut state, ids) = setup_test_game(&["A", "B", "C"]);
        start_plain_round(&mut state, 1);
        state.cur_player_idx = 0;

        state.submit_bid(ids[0], &bid("Paire", "K")).unwrap();
        assert_eq!(state.last_declarer_idx, Some(0));
        assert_eq!(state.cur_player_idx, 1);
        let seq = state.turn_seq;

        assert_eq!(state.submit_bid(ids[1], &bid("Paire", "K")), Err(EngineError::InsufficientClaim));
        assert_eq!(state.submit_bid(ids[1], &bid("Paire", "Q")), Err(EngineError::InsufficientClaim));
        // 拒绝后状态不变
        assert_eq!(state.cur_player_idx, 1);
        assert_eq!(state.last_declarer_idx, Some(0));
        assert_eq!(state.turn_seq, seq);

        state.submit_bid(ids[1], &bid("Brelan", "2")).unwrap();
        assert_eq!(state.last_declarer_idx, Some(1));
        assert_eq!(state.cur_player_idx, 2);
    }

    #[test]
    fn test_malformed_bid_is_accepted_if_stronger() {
        let (mut state, ids) = setup_test_game(&["A", "B"]);
        start_plain_round(&mut state, 1);
        state.cur_player_idx = 0;
        // 叫牌时不检查字段合法性，只比较大小
        state.submit_bid(ids[0], &bid("Paire", "Z")).unwrap();
        assert!(state.current_claim.is_some());
    }

    #[test]
    fn test_bid_skips_eliminated_players() {
        let (mut state, ids) = setup_test_game(&["A", "B", "C"]);
        start_plain_round(&mut state, 1);
        state.players[1].eliminated = true;
        state.cur_player_idx = 0;
        state.submit_bid(ids[0], &bid("Carte", "5")).unwrap();
        assert_eq!(state.cur_player_idx, 2);
        state.submit_bid(ids[2], &bid("Carte", "6")).unwrap();
        assert_eq!(state.cur_player_idx, 0);
    }

    #[test]
    fn test_challenge_without_claim() {
        let (mut state, ids) = setup_test_game(&["A", "B"]);
        start_plain_round(&mut state, 1);
        state.cur_player_idx = 0;
        assert_eq!(state.submit_challenge(ids[0]).unwrap_err(), EngineError::NoClaimToChallenge);
        assert_eq!(state.phase, GamePhase::Bidding);
    }

    #[test]
    fn test_challenge_out_of_turn() {
        let (mut state, ids) = setup_test_game(&["A", "B"]);
        start_plain_round(&mut state, 1);
        state.cur_player_idx = 0;
        state.submit_bid(ids[0], &bid("Carte", "")).unwrap();
        assert_eq!(state.submit_challenge(ids[0]).unwrap_err(), EngineError::NotYourTurn);
    }

    #[test]
    fn test_end_to_end_lie_is_caught() {
        let (mut state, ids) = setup_test_game(&["A", "B"]);
        start_plain_round(&mut state, 9);
        state.cur_player_idx = 0;
        state.players[0].hand = vec![card(Rank::Two, Suit::Heart)];
        state.players[1].hand = vec![card(Rank::Nine, Suit::Club)];

        state.submit_bid(ids[0], &bid("Carte", "A")).unwrap();
        let result = state.submit_challenge(ids[1]).unwrap();

        assert!(!result.is_truth);
        assert_eq!(result.loser_id, ids[0]);
        assert!(!result.loser_eliminated);
        assert_eq!(result.revealed_cards, vec![card(Rank::Two, Suit::Heart), card(Rank::Nine, Suit::Club)]);
        assert_eq!(result.stats, vec!["场上恰好有 0 张点数为 A 的牌。".to_string()]);
        assert_eq!(result.outcome_text, "A 输掉一条命！");
        assert_eq!(state.players[0].quota, 2);
        assert!(!state.players[0].eliminated);
        assert_eq!(state.players[1].quota, 1);
        assert_eq!(state.cur_player_idx, 0);
        assert_eq!(state.phase, GamePhase::Showdown);
    }

    #[test]
    fn test_true_claim_costs_the_challenger() {
        let (mut state, ids) = setup_test_game(&["A", "B", "C"]);
        start_plain_round(&mut state, 9);
        state.is_double_penalty = true;
        state.cur_player_idx = 1;
        state.players[0].hand = vec![card(Rank::King, Suit::Heart)];
        state.players[1].hand = vec![card(Rank::Four, Suit::Club)];
        state.players[2].hand = vec![card(Rank::King, Suit::Spade)];

        state.submit_bid(ids[1], &bid("Paire", "K")).unwrap();
        let result = state.submit_challenge(ids[2]).unwrap();

        assert!(result.is_truth);
        assert_eq!(result.loser_id, ids[2]);
        assert_eq!(state.players[2].quota, 3);
        assert_eq!(state.cur_player_idx, 2);
    }

    #[test]
    fn test_eliminated_hands_stay_out_of_the_pool() {
        let (mut state, ids) = setup_test_game(&["A", "B", "C"]);
        start_plain_round(&mut state, 9);
        state.cur_player_idx = 0;
        state.players[0].hand = vec![card(Rank::King, Suit::Heart)];
        state.players[1].hand = vec![card(Rank::Four, Suit::Club)];
        state.players[2].hand = vec![card(Rank::King, Suit::Spade)];
        state.players[2].eliminated = true;

        state.submit_bid(ids[0], &bid("Paire", "K")).unwrap();
        let result = state.submit_challenge(ids[1]).unwrap();
        assert!(!result.is_truth);
        assert_eq!(result.revealed_cards.len(), 2);
    }

    #[test]
    fn test_loser_is_eliminated_past_max_quota() {
        let (mut state, ids) = setup_test_game(&["A", "B", "C"]);
        start_plain_round(&mut state, 4);
        state.cur_player_idx = 0;
        state.players[0].quota = 6;
        state.players[0].hand = vec![card(Rank::Two, Suit::Heart)];
        state.players[1].hand = vec![card(Rank::Nine, Suit::Club)];
        state.players[2].hand = vec![card(Rank::Ten, Suit::Club)];

        state.submit_bid(ids[0], &bid("Carré", "A")).unwrap();
        let result = state.submit_challenge(ids[1]).unwrap();

        assert!(result.loser_eliminated);
        assert!(state.players[0].eliminated);
        assert_eq!(result.outcome_text, "A 输掉一条命！ 被淘汰！");
        // 输家被淘汰，下一回合由他之后的玩家开始
        assert_eq!(state.cur_player_idx, 1);
    }

    #[test]
    fn test_add_player_refused_mid_game() {
        let (mut state, ids) = setup_test_game(&["A", "B"]);
        assert!(!state.add_player(ids[0], "dup"));
        start_plain_round(&mut state, 1);
        assert!(!state.add_player(Uuid::new_v4(), "late"));
        state.phase = GamePhase::GameOver;
        assert!(state.add_player(Uuid::new_v4(), "next game"));
    }

    #[test]
    fn test_remove_player_before_turn_shifts_index() {
        let (mut state, ids) = setup_test_game(&["A", "B", "C"]);
        start_plain_round(&mut state, 1);
        state.cur_player_idx = 1;
        state.submit_bid(ids[1], &bid("Carte", "5")).unwrap();
        assert_eq!((state.cur_player_idx, state.last_declarer_idx), (2, Some(1)));

        let removed = state.remove_player(ids[0]).unwrap();
        assert_eq!(removed.nickname, "A");
        assert_eq!(state.cur_player_idx, 1);
        assert_eq!(state.last_declarer_idx, Some(0));
        assert!(state.current_claim.is_some());
        assert_eq!(state.current_player_id(), Some(ids[2]));
    }

    #[test]
    fn test_remove_current_player_keeps_seat_pointer() {
        let (mut state, ids) = setup_test_game(&["A", "B", "C"]);
        start_plain_round(&mut state, 1);
        state.cur_player_idx = 1;
        state.remove_player(ids[1]);
        // 下标不变，现在指向原来的下一位
        assert_eq!(state.current_player_id(), Some(ids[2]));

        state.remove_player(ids[2]);
        assert_eq!(state.cur_player_idx, 0);
    }

    #[test]
    fn test_departure_skips_eliminated_successor() {
        let (mut state, ids) = setup_test_game(&["A", "B", "C", "D"]);
        start_plain_round(&mut state, 1);
        state.players[1].eliminated = true;
        state.cur_player_idx = 0;

        state.remove_player(ids[0]);
        // B 已被淘汰，轮到 C
        assert_eq!(state.current_player_id(), Some(ids[2]));
        assert_eq!(state.submit_bid(ids[1], &bid("Carte", "2")), Err(EngineError::NotYourTurn));
        assert_eq!(state.submit_challenge(ids[1]).unwrap_err(), EngineError::NotYourTurn);
        state.submit_bid(ids[2], &bid("Carte", "2")).unwrap();
        assert_eq!(state.current_player_id(), Some(ids[3]));
    }

    #[test]
    fn test_remove_last_declarer_clears_claim() {
        let (mut state, ids) = setup_test_game(&["A", "B", "C"]);
        start_plain_round(&mut state, 1);
        state.cur_player_idx = 0;
        state.submit_bid(ids[0], &bid("Paire", "K")).unwrap();

        state.remove_player(ids[0]);
        assert!(state.current_claim.is_none());
        assert!(state.last_declarer_idx.is_none());
        assert_eq!(state.current_player_id(), Some(ids[1]));
        assert_eq!(state.submit_challenge(ids[1]).unwrap_err(), EngineError::NoClaimToChallenge);
        // 没有叫牌时任何叫牌都成立
        state.submit_bid(ids[1], &bid("Carte", "2")).unwrap();
    }

    #[test]
    fn test_remove_unknown_player() {
        let (mut state, _) = setup_test_game(&["A", "B"]);
        assert!(state.remove_player(Uuid::new_v4()).is_none());
        assert_eq!(state.players.len(), 2);
    }

    #[test]
    fn test_departure_can_end_the_game() {
        let (mut state, ids) = setup_test_game(&["A", "B"]);
        start_plain_round(&mut state, 1);
        assert!(state.check_game_over().is_none());
        state.remove_player(ids[0]);
        let result = state.check_game_over().unwrap();
        assert_eq!(result.winner_id, Some(ids[1]));
        assert_eq!(state.phase, GamePhase::GameOver);
    }

    #[test]
    fn test_reset_for_new_game() {
        let (mut state, _) = setup_test_game(&["A", "B"]);
        start_plain_round(&mut state, 1);
        assert!(!state.reset_for_new_game());

        state.phase = GamePhase::GameOver;
        state.players[0].quota = 7;
        state.players[0].eliminated = true;
        assert!(state.reset_for_new_game());
        assert_eq!(state.phase, GamePhase::Lobby);
        assert_eq!(state.round, 0);
        assert!(state.players.iter().all(|p| p.quota == 1 && !p.eliminated && p.hand.is_empty()));
    }

    #[test]
    fn test_turn_key_only_in_timer_rounds() {
        let (mut state, _) = setup_test_game(&["A", "B"]);
        start_plain_round(&mut state, 1);
        assert!(state.turn_key().is_none());
        state.is_timer_mode = true;
        let key = state.turn_key().unwrap();
        assert_eq!(key.round, state.round);
        assert_eq!(key.turn_idx, state.cur_player_idx);
    }

    #[test]
    fn test_timeout_penalizes_seated_player() {
        let (mut state, ids) = setup_test_game(&["A", "B"]);
        start_plain_round(&mut state, 1);
        state.is_timer_mode = true;
        state.cur_player_idx = 1;
        let key = state.turn_key().unwrap();

        let result = state.apply_timeout(key).unwrap();
        assert!(result.timed_out);
        assert!(!result.is_truth);
        assert!(result.revealed_cards.is_empty());
        assert_eq!(result.loser_id, ids[1]);
        assert_eq!(state.players[1].quota, 2);
        assert_eq!(state.phase, GamePhase::Showdown);

        // 同一个计时器不会触发两次
        assert!(state.apply_timeout(key).is_none());
        assert_eq!(state.players[1].quota, 2);
    }

    #[test]
    fn test_stale_timer_is_ignored() {
        let (mut state, ids) = setup_test_game(&["A", "B"]);
        start_plain_round(&mut state, 1);
        state.is_timer_mode = true;
        state.cur_player_idx = 0;
        let armed_for_a = state.turn_key().unwrap();

        // A 叫牌，B 叫牌，又轮到 A: 座位相同，但已经不是同一个回合了
        state.submit_bid(ids[0], &bid("Carte", "2")).unwrap();
        state.submit_bid(ids[1], &bid("Carte", "3")).unwrap();
        assert_eq!(state.cur_player_idx, 0);

        assert!(state.apply_timeout(armed_for_a).is_none());
        assert_eq!(state.players[0].quota, 1);
        assert_eq!(state.phase, GamePhase::Bidding);
    }

    #[test]
    fn test_timer_invalidated_by_departure() {
        let (mut state, ids) = setup_test_game(&["A", "B", "C"]);
        start_plain_round(&mut state, 1);
        state.is_timer_mode = true;
        state.cur_player_idx = 1;
        let key = state.turn_key().unwrap();

        state.remove_player(ids[1]);
        assert!(state.apply_timeout(key).is_none());
        assert_eq!(state.players[1].quota, 1);
    }

    #[test]
    fn test_timeout_after_departure_hits_next_survivor() {
        let (mut state, ids) = setup_test_game(&["A", "B", "C", "D"]);
        start_plain_round(&mut state, 1);
        state.is_timer_mode = true;
        state.players[1].eliminated = true;
        state.players[1].quota = 7;
        state.cur_player_idx = 0;
        let armed_for_a = state.turn_key().unwrap();

        state.remove_player(ids[0]);
        assert!(state.apply_timeout(armed_for_a).is_none());

        let key = state.turn_key().unwrap();
        assert_eq!(state.players[key.turn_idx].id, ids[2]);
        let result = state.apply_timeout(key).unwrap();
        assert_eq!(result.loser_id, ids[2]);
        assert_eq!(state.player(ids[1]).unwrap().quota, 7);
        assert_eq!(state.player(ids[2]).unwrap().quota, 2);
    }

    #[test]
    fn test_snapshot_redacts_other_hands() {
        let (mut state, ids) = setup_test_game(&["A", "B"]);
        start_plain_round(&mut state, 1);
        let view = state.snapshot().for_client(&ids[0]);
        assert_eq!(view.players[0].hand.len(), 1);
        assert!(view.players[1].hand.is_empty());
        assert_eq!(view.players[1].hand_size, 1);
        assert_eq!(view.seat_of(&ids[1]), Some(1));
    }

    #[test]
    fn test_blind_round_hides_own_hand() {
        let (mut state, ids) = setup_test_game(&["A", "B"]);
        start_plain_round(&mut state, 1);
        state.is_blind = true;
        let view = state.snapshot().for_client(&ids[0]);
        assert!(view.players[0].hand.is_empty());
        assert_eq!(view.players[0].hand_size, 1);

        state.phase = GamePhase::Showdown;
        let view = state.snapshot().for_client(&ids[0]);
        assert_eq!(view.players[0].hand.len(), 1);
    }

    #[test]
    fn test_snapshot_carries_claim() {
        let (mut state, ids) = setup_test_game(&["A", "B"]);
        start_plain_round(&mut state, 1);
        state.cur_player_idx = 0;
        state.submit_bid(ids[0], &bid("Paire", "K")).unwrap();
        let view = state.snapshot();
        let claim = view.claim.unwrap();
        assert_eq!(claim.primary.combo_kind(), Some(ComboKind::Pair));
        assert_eq!(claim.key(), Claim::new(Shape::new(ComboKind::Pair).rank(Rank::King)).key());
        assert_eq!(view.last_declarer_idx, Some(0));
    }

    proptest! {
        #[test]
        fn prop_dealing_never_duplicates(
            quotas in prop::collection::vec(1u32..=7, 2..12),
            seed in any::<u64>(),
        ) {
            let mut state = GameState::new(RoomId::new_v4(), GameConfig::default());
            for (i, quota) in quotas.iter().enumerate() {
                let id = Uuid::new_v4();
                state.add_player(id, format!("P{}", i));
                state.players[i].quota = *quota;
            }
            state.start_round_with(&mut StdRng::seed_from_u64(seed));

            let dealt: Vec<Card> = state.players.iter().flat_map(|p| p.hand.iter().copied()).collect();
            let unique: HashSet<Card> = dealt.iter().copied().collect();
            prop_assert!(dealt.len() <= 52);
            prop_assert_eq!(unique.len(), dealt.len());
            prop_assert!(dealt.iter().all(|c| !state.deck.contains(c)));
        }

        #[test]
        fn prop_ensure_valid_index_lands_on_survivor(
            eliminated in prop::collection::vec(any::<bool>(), 1..10),
            start in 0usize..12,
        ) {
            prop_assume!(eliminated.iter().any(|e| !e));
            let mut state = GameState::new(RoomId::new_v4(), GameConfig::default());
            for (i, &out) in eliminated.iter().enumerate() {
                state.add_player(Uuid::new_v4(), format!("P{}", i));
                state.players[i].eliminated = out;
            }
            state.cur_player_idx = start;
            state.ensure_valid_player_index();
            prop_assert!(state.cur_player_idx < state.players.len());
            prop_assert!(!state.players[state.cur_player_idx].eliminated);
        }
    }
}
