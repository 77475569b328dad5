//! pii.rs
//! Limpieza de texto libre antes de guardarlo (notas de tickets).
//! Quita secuencias con forma de teléfono y fragmentos de dirección.

use std::sync::OnceLock;

use regex::{Captures, Regex};

const PHONE_MASK: &str = "[redacted-phone]";
const ADDRESS_MASK: &str = "[redacted-address]";
/// Largo de un teléfono una vez quitados los separadores
const PHONE_DIGITS: std::ops::RangeInclusive<usize> = 7..=13;

fn phone_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Tramos de dígitos con separadores comunes y prefijo internacional
        Regex::new(r"\+?\(?\d[\d\s().-]{5,}\d").expect("regex de teléfono válida")
    })
}

fn date_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}").expect("regex de fecha válida"))
}

fn address_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(calle|cll|carrera|cra|kr|avenida|av|diagonal|dg|transversal|tv)\.?\s*\d+[^\n,;]*",
        )
        .expect("regex de dirección válida")
    })
}

/// Devuelve `text` sin teléfonos ni direcciones. Fechas ISO y números de
/// guía largos se conservan.
pub fn scrub(text: &str) -> String {
    let without_address = address_pattern().replace_all(text, ADDRESS_MASK);
    phone_pattern()
        .replace_all(&without_address, |caps: &Captures| mask_candidate(&caps[0]))
        .into_owned()
}

fn mask_candidate(candidate: &str) -> String {
    if looks_like_phone(candidate) {
        return PHONE_MASK.to_string();
    }
    if digit_count(candidate) <= *PHONE_DIGITS.end() {
        return candidate.to_string();
    }
    // Tramo largo: puede ser un teléfono pegado a una fecha o a un número de guía
    candidate
        .split_inclusive(char::is_whitespace)
        .map(|piece| {
            let token = piece.trim_end();
            if looks_like_phone(token) {
                format!("{}{}", PHONE_MASK, &piece[token.len()..])
            } else {
                piece.to_string()
            }
        })
        .collect()
}

fn looks_like_phone(token: &str) -> bool {
    PHONE_DIGITS.contains(&digit_count(token)) && !date_prefix().is_match(token.trim_start())
}

fn digit_count(token: &str) -> usize {
    token.chars().filter(char::is_ascii_digit).count()
}
