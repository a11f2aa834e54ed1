/// Format an integer amount in base units as a decimal string with `decimals` places,
/// trimming trailing zeros but keeping at least one fractional digit (`10^16`, 18 → `0.01`).
///
/// Amounts that are not plain decimal integers are returned unchanged.
pub fn format_token_amount(amount: &str, decimals: u32) -> String {
	let amount = amount.trim();
	if amount.is_empty() || !amount.bytes().all(|b| b.is_ascii_digit()) {
		return amount.to_string();
	}

	let decimals = decimals as usize;
	let digits = amount.trim_start_matches('0');
	let padded = format!("{:0>width$}", digits, width = decimals + 1);
	let (whole, fraction) = padded.split_at(padded.len() - decimals);

	let fraction = fraction.trim_end_matches('0');
	let fraction = if fraction.is_empty() { "0" } else { fraction };
	format!("{}.{}", whole, fraction)
}
