use std::ops::Add;

/// Token accounting for a single request/response pair.
///
/// All fields are non-negative. `total_tokens` is not derived automatically
/// because the exact conservation equation differs slightly by provider
/// (some double-count cached tokens into the total, some don't) — each
/// transformer is responsible for setting it explicitly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct IrUsage {
    /// Total tokens the user sent, cache-inclusive.
    pub input_tokens: u64,
    /// Substantive reply tokens only, excluding reasoning.
    pub output_tokens: u64,
    /// Sum of everything involved in the turn.
    pub total_tokens: u64,
    /// Chain-of-thought tokens, counted separately from `output_tokens`.
    pub reasoning_tokens: u64,
    /// Subset of `input_tokens` served from the provider's prompt cache.
    pub cached_tokens: u64,
    /// Tokens written to the provider's prompt cache this turn.
    pub cache_creation_tokens: u64,
}

impl IrUsage {
    /// An all-zero usage record, for streams that never observed usage.
    pub fn zero() -> Self {
        Self::default()
    }
}

impl Add for IrUsage {
    type Output = IrUsage;

    fn add(self, rhs: Self) -> Self::Output {
        IrUsage {
            input_tokens: self.input_tokens + rhs.input_tokens,
            output_tokens: self.output_tokens + rhs.output_tokens,
            total_tokens: self.total_tokens + rhs.total_tokens,
            reasoning_tokens: self.reasoning_tokens + rhs.reasoning_tokens,
            cached_tokens: self.cached_tokens + rhs.cached_tokens,
            cache_creation_tokens: self.cache_creation_tokens + rhs.cache_creation_tokens,
        }
    }
}
