// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyword classification of inbound text.
//!
//! Matching is deliberately simple: lowercase the trimmed text and compare
//! against small keyword sets (Spanish first, English alongside). Anything
//! unmatched is free text and each conversation state decides what to do
//! with it.

use comanda_core::types::PaymentMethod;

/// What an inbound text most likely means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputClass {
    Greeting,
    Affirmative,
    Negative,
    /// A 4-digit order status code.
    StatusCode(String),
    PaymentChoice(PaymentMethod),
    Complaint,
    FreeText,
}

const GREETINGS: &[&str] = &[
    "hola", "buenas", "buenos dias", "buenos días", "buenas tardes", "buenas noches", "menu",
    "menú", "hello", "hi",
];

const AFFIRMATIVES: &[&str] = &[
    "si", "sí", "ok", "dale", "confirmo", "confirmar", "claro", "yes", "y",
];

const NEGATIVES: &[&str] = &["no", "cancelar", "cancela", "cancel"];

const COMPLAINTS: &[&str] = &["queja", "reclamo", "problema", "complaint"];

/// Classify one inbound text.
pub fn classify_text(text: &str) -> InputClass {
    let normalized = text.trim().to_lowercase();
    if normalized.is_empty() {
        return InputClass::FreeText;
    }

    if normalized.len() == 4 && normalized.chars().all(|c| c.is_ascii_digit()) {
        return InputClass::StatusCode(normalized);
    }

    if GREETINGS.contains(&normalized.as_str()) {
        return InputClass::Greeting;
    }
    if AFFIRMATIVES.contains(&normalized.as_str()) {
        return InputClass::Affirmative;
    }
    if NEGATIVES.contains(&normalized.as_str()) {
        return InputClass::Negative;
    }
    if COMPLAINTS.contains(&normalized.as_str()) {
        return InputClass::Complaint;
    }

    match normalized.as_str() {
        "efectivo" | "cash" | "1" => InputClass::PaymentChoice(PaymentMethod::Cash),
        "transferencia" | "transfer" | "2" => InputClass::PaymentChoice(PaymentMethod::Transfer),
        _ => InputClass::FreeText,
    }
}
