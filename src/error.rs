use num_bigint::BigInt;
use thiserror::Error;

/// Failures of the fixed-point primitives. All of them are caller bugs or
/// defects; none are retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MathError {
    #[error("tick {0} out of range")]
    TickOutOfRange(i32),
    #[error("sqrt price {0} out of range")]
    SqrtPriceOutOfRange(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("result does not fit in 256 bits: {0}")]
    Overflow(String),
    #[error("amount must be {expected}, got {got}")]
    InvalidAmount { expected: &'static str, got: String },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Math(#[from] MathError),

    #[error("tier arrays have mismatched lengths")]
    MismatchedTiers,

    #[error("no tick data for tier {tier} at tick {tick}")]
    MissingTick { tier: usize, tick: i32 },

    #[error("tick fetch failed for tier {tier} at tick {tick}: {reason}")]
    TickFetch { tier: usize, tick: i32, reason: String },

    #[error("too many steps ({steps}): last step amount {last_step_amount}, remaining fraction {remaining_fraction}")]
    TooManySteps {
        steps: usize,
        last_step_amount: f64,
        remaining_fraction: f64,
    },

    #[error("requested output {requested} exceeds reserve {reserve}")]
    InsufficientReserves { requested: String, reserve: String },

    #[error("token {0} is not traded by this market")]
    UnknownToken(String),
}

/// Expected, recoverable outcomes of an evaluation. The caller skips the pair
/// and moves on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationFailure {
    #[error("Not profitable ({amt_net})")]
    NotProfitable { amt_net: BigInt },

    #[error("Negative profit: {profit} ({amt_net} - {gas_cost})")]
    NegativeProfit {
        profit: BigInt,
        amt_net: BigInt,
        gas_cost: BigInt,
    },

    #[error("no gas price conversion for input token {0}")]
    UnpricedGasToken(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Evaluation(#[from] EvaluationFailure),

    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

impl From<MathError> for Error {
    fn from(err: MathError) -> Self {
        Error::Simulation(SimulationError::Math(err))
    }
}

impl Error {
    /// True when the error is an ordinary "no opportunity" outcome rather
    /// than a defect.
    pub fn is_evaluation_failure(&self) -> bool {
        matches!(self, Error::Evaluation(_))
    }
}

/// Outcome of handing an opportunity to the submitter.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Rejected, try the next candidate.
    #[error("skipped: {0}")]
    Skip(String),

    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}
