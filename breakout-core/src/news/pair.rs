//! Currency extraction from instrument names.

/// Currencies whose news affects `pair`.
///
/// Separators (`_`, `/`, `-`) are ignored. Precious metals map to USD; a
/// standard six-letter pair yields base and quote. Anything else yields an
/// empty list, which callers treat as "every currency".
pub fn relevant_currencies(pair: &str) -> Vec<String> {
    let symbol: String = pair
        .chars()
        .filter(|c| !matches!(c, '_' | '/' | '-'))
        .flat_map(char::to_uppercase)
        .collect();

    if symbol.starts_with("XAU") || symbol.starts_with("XAG") {
        return vec!["USD".to_string()];
    }
    if symbol.len() >= 6 && symbol.is_char_boundary(3) && symbol.is_char_boundary(6) {
        return vec![symbol[..3].to_string(), symbol[3..6].to_string()];
    }
    Vec::new()
}

/// True if an event in `currency` is relevant to `currencies`.
pub fn affects(currencies: &[String], currency: &str) -> bool {
    currencies.is_empty() || currencies.iter().any(|c| c.eq_ignore_ascii_case(currency))
}
