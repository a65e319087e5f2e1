use rust_decimal::Decimal;

/// Format an amount with thousands separators: 1,234,567.89.
/// No currency glyph; statements mix currencies and the ledger is agnostic.
pub fn money(val: Decimal) -> String {
    let negative = val.is_sign_negative();
    let text = val.abs().to_string();
    let (int_part, dec_part) = match text.split_once('.') {
        Some((i, d)) => (i.to_string(), Some(d.to_string())),
        None => (text, None),
    };

    let mut with_commas = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            with_commas.push(',');
        }
        with_commas.push(c);
    }
    let with_commas: String = with_commas.chars().rev().collect();

    let body = match dec_part {
        Some(d) => format!("{with_commas}.{d}"),
        None => with_commas,
    };
    if negative {
        format!("-{body}")
    } else {
        body
    }
}
