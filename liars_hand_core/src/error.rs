use thiserror::Error;

/// 被拒绝的玩家动作。
/// 这些错误只发回给做出动作的玩家，引擎状态保持不变。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("还没轮到你")]
    NotYourTurn,

    #[error("叫牌不够大！必须比当前叫牌更高。")]
    InsufficientClaim,

    #[error("没有可以质疑的叫牌，请先叫牌。")]
    NoClaimToChallenge,

    #[error("当前没有进行中的回合")]
    NoActiveRound,
}
