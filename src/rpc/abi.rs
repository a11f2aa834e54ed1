//! Minimal ABI helpers for the raffle contract: selectors, event topics and 32-byte word decoding.

use sha3::{Digest, Keccak256};

fn keccak(input: &str) -> [u8; 32] {
	let mut hash = [0u8; 32];
	hash.copy_from_slice(&Keccak256::digest(input.as_bytes()));
	hash
}

/// 4-byte function selector as `0x`-prefixed hex, e.g. `transfer(address,uint256)` → `0xa9059cbb`.
pub fn selector(signature: &str) -> String {
	format!("0x{}", hex::encode(&keccak(signature)[..4]))
}

/// Topic hash identifying an event signature.
pub fn event_topic(signature: &str) -> String {
	format!("0x{}", hex::encode(keccak(signature)))
}

/// Event name without the parameter list.
pub fn event_name(signature: &str) -> &str {
	signature
		.split_once('(')
		.map(|(name, _)| name)
		.unwrap_or(signature)
		.trim()
}

fn first_word(data: &str) -> Result<Vec<u8>, String> {
	let digits = data.strip_prefix("0x").unwrap_or(data);
	let bytes = hex::decode(digits).map_err(|e| format!("invalid hex return data: {}", e))?;
	if bytes.len() < 32 {
		return Err(format!(
			"return data too short: expected 32 bytes, got {}",
			bytes.len()
		));
	}
	Ok(bytes[..32].to_vec())
}

/// Decode the first return word as an unsigned integer in decimal.
pub fn decode_uint(data: &str) -> Result<String, String> {
	let word = first_word(data)?;
	Ok(big_endian_to_decimal(&word))
}

/// Decode the first return word as an address.
pub fn decode_address(data: &str) -> Result<String, String> {
	let word = first_word(data)?;
	if word[..12].iter().any(|b| *b != 0) {
		return Err("address word has non-zero padding".to_string());
	}
	Ok(format!("0x{}", hex::encode(&word[12..])))
}

/// Arbitrary-width big-endian unsigned integer to decimal, by repeated division by 10.
fn big_endian_to_decimal(bytes: &[u8]) -> String {
	let mut number: Vec<u8> = bytes.iter().copied().skip_while(|b| *b == 0).collect();
	if number.is_empty() {
		return "0".to_string();
	}

	let mut digits = Vec::new();
	while !number.is_empty() {
		let mut remainder = 0u32;
		let mut quotient = Vec::with_capacity(number.len());
		for byte in &number {
			let acc = (remainder << 8) | u32::from(*byte);
			let q = (acc / 10) as u8;
			remainder = acc % 10;
			if !(quotient.is_empty() && q == 0) {
				quotient.push(q);
			}
		}
		digits.push(b'0' + remainder as u8);
		number = quotient;
	}
	digits.reverse();
	String::from_utf8(digits).unwrap_or_default()
}
