//! Amount extraction from free-form user text.

use rust_decimal::Decimal;

/// Extract the first well-formed decimal number from arbitrary text.
///
/// Accepts comma as a decimal separator and a leading minus sign so that
/// negative input reaches the positivity check instead of being silently
/// flipped. Returns `None` when no number is present.
pub fn parse_amount(text: &str) -> Option<Decimal> {
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let is_separator_led = (bytes[i] == b'.' || bytes[i] == b',')
            && i + 1 < bytes.len()
            && bytes[i + 1].is_ascii_digit();

        if !bytes[i].is_ascii_digit() && !is_separator_led {
            i += 1;
            continue;
        }

        let mut number = String::new();

        if i > 0 && bytes[i - 1] == b'-' {
            number.push('-');
        }

        if is_separator_led {
            number.push('0');
        } else {
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                number.push(bytes[i] as char);
                i += 1;
            }
        }

        if i < bytes.len() && (bytes[i] == b'.' || bytes[i] == b',') {
            let frac_start = i + 1;
            let mut j = frac_start;
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            if j > frac_start {
                number.push('.');
                number.push_str(&text[frac_start..j]);
                i = j;
            }
        }

        if let Ok(value) = number.parse::<Decimal>() {
            return Some(value);
        }
    }

    None
}
