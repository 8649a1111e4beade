use std::sync::LazyLock;

use rand::Rng;
use regex::Regex;
use serde_json::Value;

pub const CODE_LENGTH: usize = 6;

const CODE_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

static NON_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\D").unwrap());

/// Digits only, and exactly 10 of them.
pub fn normalize_phone(input: &str) -> Option<String> {
    let digits = NON_DIGITS.replace_all(input, "");

    (digits.len() == 10).then(|| digits.into_owned())
}

/// 6 uppercase base-36 characters.
pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Voucher amounts arrive as a JSON number or a numeric string.
pub fn parse_amount(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
