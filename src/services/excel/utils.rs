use std::collections::HashSet;

use crate::models::CellValue;

/// Header used for blank header cells, suffixed on repeats.
const EMPTY_HEADER: &str = "__EMPTY";

/// Makes a header name unique within `existing_names`, appending `_1`,
/// `_2`, ... to repeats. Blank headers become `__EMPTY`.
pub fn unique_header(name: &str, existing_names: &mut HashSet<String>) -> String {
    let base_name = if name.is_empty() { EMPTY_HEADER } else { name };

    let mut cleaned = base_name.to_string();
    let mut counter = 1;
    while !existing_names.insert(cleaned.clone()) {
        cleaned = format!("{}_{}", base_name, counter);
        counter += 1;
    }

    cleaned
}

/// Missing cells and empty strings carry no value.
pub fn is_missing(value: &CellValue) -> bool {
    matches!(value, CellValue::Missing) || matches!(value, CellValue::Text(s) if s.is_empty())
}

/// Numeric coercion of a cell. Missing is 0, booleans are 0/1 and text
/// goes through [`parse_number`]; `NaN` means "not a number".
pub fn to_number(value: &CellValue) -> f64 {
    match value {
        CellValue::Missing => 0.0,
        CellValue::Bool(b) => bool_to_number(*b),
        CellValue::Number(n) => *n,
        CellValue::Text(s) => parse_number(s),
    }
}

fn bool_to_number(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

fn trim_blank(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}')
}

/// Parses text the way spreadsheet input is coerced to numbers: surrounding
/// whitespace is ignored, blank text is 0, `Infinity` and `0x`/`0o`/`0b`
/// literals are accepted, anything else that is not a plain decimal is NaN.
pub fn parse_number(raw: &str) -> f64 {
    let s = trim_blank(raw);
    if s.is_empty() {
        return 0.0;
    }

    match s {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }

    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = s.strip_prefix(prefix) {
            if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
                return f64::NAN;
            }
            return u128::from_str_radix(digits, radix)
                .map(|v| v as f64)
                .unwrap_or(f64::NAN);
        }
    }

    // Rust accepts "inf"/"nan" spellings that must not count as numbers here
    if !s.bytes().all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-')) {
        return f64::NAN;
    }

    s.parse::<f64>().unwrap_or(f64::NAN)
}

/// Loose equality between a cell and a filter value. Numbers compare
/// numerically against numeric text, booleans compare as 0/1, text compares
/// exactly (case-sensitive) and missing only equals missing.
pub fn loose_eq(left: &CellValue, right: &CellValue) -> bool {
    use CellValue::*;

    match (left, right) {
        (Missing, Missing) => true,
        (Missing, _) | (_, Missing) => false,
        (Number(a), Number(b)) => a == b,
        (Text(a), Text(b)) => a == b,
        (Bool(a), Bool(b)) => a == b,
        (Bool(b), other) | (other, Bool(b)) => loose_eq(&Number(bool_to_number(*b)), other),
        (Number(n), Text(s)) | (Text(s), Number(n)) => *n == parse_number(s),
    }
}

/// Shortest round-trip rendering of a number, with integral values printed
/// without a fraction (`5`, not `5.0`).
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        n.to_string()
    }
}

/// Uppercases only the first character.
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn group_thousands(digits: &str) -> String {
    let (sign, digits) = match digits.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", digits),
    };

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, c) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    format!("{}{}", sign, grouped)
}

/// German-style number formatting: `1.000.000` for integers,
/// `1.234,57` for everything else. Non-numeric values pass through.
pub fn format_number(value: &CellValue) -> String {
    if is_missing(value) {
        return String::new();
    }
    let num = to_number(value);
    if num.is_nan() {
        return value.to_string();
    }
    format_float(num)
}

fn format_float(num: f64) -> String {
    if num.is_infinite() {
        return number_to_string(num);
    }
    if num.fract() == 0.0 {
        return group_thousands(&number_to_string(num));
    }

    let fixed = format!("{:.2}", num);
    match fixed.split_once('.') {
        Some((int_part, frac)) => format!("{},{}", group_thousands(int_part), frac),
        None => group_thousands(&fixed),
    }
}

/// Axis label formatting with `Tsd.`, `Mio.` and `Mrd.` abbreviations.
pub fn format_number_short(value: &CellValue) -> String {
    if is_missing(value) {
        return String::new();
    }
    let num = to_number(value);
    if num.is_nan() {
        return value.to_string();
    }

    let abs = num.abs();
    let scaled = |divisor: f64, suffix: &str| {
        format!("{:.1} {}", num / divisor, suffix).replacen('.', ",", 1)
    };

    if abs >= 1_000_000_000.0 {
        scaled(1_000_000_000.0, "Mrd.")
    } else if abs >= 1_000_000.0 {
        scaled(1_000_000.0, "Mio.")
    } else if abs >= 1_000.0 {
        scaled(1_000.0, "Tsd.")
    } else {
        format_float(num)
    }
}
