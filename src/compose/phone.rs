/// Normalize a North American number to its 10 significant digits
///
/// Every non-digit is dropped. An 11-digit result with a leading `1` loses
/// the country code. Anything that is not then exactly 10 digits is rejected.
pub fn format_phone_number(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    let national = match digits.len() {
        11 if digits.starts_with('1') => &digits[1..],
        _ => digits.as_str(),
    };

    is_valid(national).then(|| national.to_string())
}

/// Exactly ten ASCII digits
pub fn is_valid(number: &str) -> bool {
    number.len() == 10 && number.bytes().all(|b| b.is_ascii_digit())
}
