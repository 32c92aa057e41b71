//! Per-token pricing for known models (USD).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Look up (input, output) cost per token for a model.
///
/// Unknown models cost zero; callers only use this for reporting.
pub fn model_cost(model: &str) -> (Decimal, Decimal) {
    let per_million = match model {
        m if m.starts_with("gpt-4o-mini") => (dec!(0.15), dec!(0.60)),
        m if m.starts_with("gpt-4o") => (dec!(2.50), dec!(10.00)),
        m if m.starts_with("gpt-4.1-mini") => (dec!(0.40), dec!(1.60)),
        m if m.starts_with("gpt-4.1") => (dec!(2.00), dec!(8.00)),
        m if m.contains("haiku") => (dec!(0.80), dec!(4.00)),
        m if m.contains("sonnet") => (dec!(3.00), dec!(15.00)),
        _ => (Decimal::ZERO, Decimal::ZERO),
    };
    let million = dec!(1000000);
    (per_million.0 / million, per_million.1 / million)
}

/// Total cost of a request given token counts.
pub fn cost_of(rates: (Decimal, Decimal), input_tokens: u64, output_tokens: u64) -> Decimal {
    rates.0 * Decimal::from(input_tokens) + rates.1 * Decimal::from(output_tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mini_is_cheaper_than_full() {
        let (mini_in, _) = model_cost("gpt-4o-mini");
        let (full_in, _) = model_cost("gpt-4o");
        assert!(mini_in < full_in);
    }

    #[test]
    fn unknown_model_is_free() {
        assert_eq!(model_cost("local-llama"), (Decimal::ZERO, Decimal::ZERO));
    }

    #[test]
    fn cost_of_million_tokens() {
        let rates = model_cost("gpt-4o-mini");
        assert_eq!(cost_of(rates, 1_000_000, 0), dec!(0.15));
    }
}
