//! Human-readable formatting for prices and percentage changes.
//!
//! Precision scales with magnitude so sub-cent tokens (BONK, WEN) stay
//! readable next to SOL:
//!
//! ```rust
//! use pricewatch_rust_core::utils::format::humanize_price;
//!
//! assert_eq!(humanize_price(1234.5), "$1,234.50");
//! assert_eq!(humanize_price(151.2), "$151.2000");
//! assert_eq!(humanize_price(0.0123), "$0.012300");
//! assert_eq!(humanize_price(0.00002345), "$0.00002345");
//! ```

/// Format a USD price with magnitude-dependent precision
pub fn humanize_price(price: f64) -> String {
    if price >= 1000.0 {
        format!("${}", with_thousands(price, 2))
    } else if price >= 1.0 {
        format!("${:.4}", price)
    } else if price >= 0.01 {
        format!("${:.6}", price)
    } else {
        format!("${:.8}", price)
    }
}

/// Signed percentage with a direction marker
pub fn format_change(change_pct: f64) -> String {
    if change_pct > 0.0 {
        format!("▲ +{:.2}%", change_pct)
    } else if change_pct < 0.0 {
        format!("▼ {:.2}%", change_pct)
    } else {
        format!("= {:.2}%", change_pct)
    }
}

/// Fixed-precision number with comma thousands separators
pub fn with_thousands(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 { "-" } else { "" };
    match frac_part {
        Some(frac) => format!("{}{}.{}", sign, grouped, frac),
        None => format!("{}{}", sign, grouped),
    }
}
