/// Render a base-unit `amount` as a decimal string with `decimals` fractional digits.
pub fn format_token_amount(amount: u128, decimals: u32) -> String {
    format!(
        "{:.*}",
        decimals as usize,
        amount as f64 / 10f64.powi(decimals as i32)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_native_token_amounts() {
        assert_eq!(format_token_amount(1_500_000, 6), "1.500000");
        assert_eq!(format_token_amount(0, 6), "0.000000");
        assert_eq!(format_token_amount(42, 0), "42");
    }
}
