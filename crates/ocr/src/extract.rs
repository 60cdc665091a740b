use std::str::FromStr;
use std::sync::OnceLock;

use docsift_core::{DocumentType, ExtractedFields, FieldValue};
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_invoice_number, r"(?i)invoice\s*#?\s*:?\s*([A-Z0-9\-]+)");
re!(re_inv_number, r"(?i)inv\s*#?\s*:?\s*([A-Z0-9\-]+)");
re!(re_hash_number, r"(?i)#\s*([A-Z0-9\-]+)");

re!(re_date_labeled, r"(?i)date\s*:?\s*(\d{1,2}[/-]\d{1,2}[/-]\d{2,4})");
re!(re_date_bare, r"(\d{1,2}[/-]\d{1,2}[/-]\d{2,4})");

re!(re_amount_total, r"(?i)total\s*:?\s*\$?(\d+[,.]?\d*\.?\d{2})");
re!(re_amount_amount, r"(?i)amount\s*:?\s*\$?(\d+[,.]?\d*\.?\d{2})");
re!(re_amount_dollar, r"\$(\d+[,.]?\d*\.?\d{2})");

re!(re_party_between, r"(?i)between\s+([^,\n]+)\s+and\s+([^,\n]+)");
re!(re_party_first, r"(?i)party\s+of\s+the\s+first\s+part[:\s]+([^,\n]+)");
re!(re_party_second, r"(?i)party\s+of\s+the\s+second\s+part[:\s]+([^,\n]+)");

re!(re_contract_agreement, r"(?i)(employment|service|lease|purchase|sales?)\s+agreement");
re!(re_contract_contract, r"(?i)(employment|service|lease|purchase|sales?)\s+contract");

re!(re_email, r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Z|a-z]{2,}\b");
re!(re_phone, r"(?:\+?\d{1,3}[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}");
re!(re_general_date, r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b");
re!(re_general_amount, r"\$\d+[,.]?\d*\.?\d{2}");

/// How many leading non-empty lines may hold the vendor letterhead.
const VENDOR_SCAN_LINES: usize = 5;

type ExtractFn = fn(&str) -> ExtractedFields;

/// Dispatch table; any type without an entry falls through to `general`.
const EXTRACTORS: &[(DocumentType, ExtractFn)] = &[
    (DocumentType::Invoice, Extractor::invoice),
    (DocumentType::Receipt, Extractor::receipt),
    (DocumentType::Contract, Extractor::contract),
    (DocumentType::General, Extractor::general),
];

// ── Public extraction API ─────────────────────────────────────────────────────

/// Mine structured fields from recognized text. Never fails; fields that
/// don't match are simply absent.
pub fn extract(text: &str, kind: DocumentType) -> ExtractedFields {
    Extractor::extract(text, kind)
}

pub struct Extractor;

impl Extractor {
    pub fn extract(text: &str, kind: DocumentType) -> ExtractedFields {
        let rule = EXTRACTORS
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, f)| *f)
            .unwrap_or(Extractor::general as ExtractFn);
        rule(text)
    }

    /// Same as [`Extractor::extract`] but takes the raw caller tag.
    pub fn extract_tagged(text: &str, tag: &str) -> ExtractedFields {
        Self::extract(text, DocumentType::parse_lenient(tag))
    }

    // ── Invoice ───────────────────────────────────────────────────────────────

    fn invoice(text: &str) -> ExtractedFields {
        let mut data = ExtractedFields::new();
        put(&mut data, "invoice_number", invoice_number(text));
        put(&mut data, "date", invoice_date(text));
        put(&mut data, "total_amount", total_amount(text));
        put(&mut data, "vendor", vendor(text));
        data
    }

    /// Receipts share the invoice layout conventions.
    fn receipt(text: &str) -> ExtractedFields {
        Self::invoice(text)
    }

    // ── Contract ──────────────────────────────────────────────────────────────

    fn contract(text: &str) -> ExtractedFields {
        let mut data = ExtractedFields::new();

        // Every party rule runs; a later match overwrites an earlier one.
        if let Some(c) = re_party_between().captures(text) {
            data.insert("party_1".into(), c[1].trim().into());
            data.insert("party_2".into(), c[2].trim().into());
        }
        if let Some(c) = re_party_first().captures(text) {
            data.insert("party_1".into(), c[1].trim().into());
        }
        if let Some(c) = re_party_second().captures(text) {
            data.insert("party_2".into(), c[1].trim().into());
        }

        put(&mut data, "contract_type", contract_type(text));
        data
    }

    // ── General ───────────────────────────────────────────────────────────────

    fn general(text: &str) -> ExtractedFields {
        let mut data = ExtractedFields::new();
        put(&mut data, "emails", find_all(re_email(), text));
        put(&mut data, "phone_numbers", find_all(re_phone(), text));
        put(&mut data, "dates", find_all(re_general_date(), text));
        put(&mut data, "amounts", find_all(re_general_amount(), text));
        data
    }
}

fn put(data: &mut ExtractedFields, key: &str, value: Option<FieldValue>) {
    if let Some(value) = value {
        data.insert(key.to_string(), value);
    }
}

/// First capture group of the first pattern that matches.
fn first_capture(patterns: &[&Regex], text: &str) -> Option<String> {
    patterns
        .iter()
        .find_map(|re| re.captures(text))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn find_all(re: &Regex, text: &str) -> Option<FieldValue> {
    let found: Vec<String> = re.find_iter(text).map(|m| m.as_str().to_string()).collect();
    if found.is_empty() {
        None
    } else {
        Some(FieldValue::List(found))
    }
}

fn invoice_number(text: &str) -> Option<FieldValue> {
    let patterns = [re_invoice_number(), re_inv_number(), re_hash_number()];
    first_capture(&patterns, text).map(FieldValue::Text)
}

/// A labelled date beats a bare one.
fn invoice_date(text: &str) -> Option<FieldValue> {
    first_capture(&[re_date_labeled(), re_date_bare()], text).map(FieldValue::Text)
}

/// The largest monetary figure on the page is taken as the grand total.
fn total_amount(text: &str) -> Option<FieldValue> {
    [re_amount_total(), re_amount_amount(), re_amount_dollar()]
        .iter()
        .flat_map(|re| re.captures_iter(text))
        .filter_map(|c| parse_amount_str(c.get(1)?.as_str()))
        .reduce(f64::max)
        .map(FieldValue::Number)
}

/// First letterhead-looking line near the top: longer than three characters
/// and not starting with a digit (addresses, invoice numbers).
fn vendor(text: &str) -> Option<FieldValue> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(VENDOR_SCAN_LINES)
        .find(|l| l.chars().count() > 3 && !l.starts_with(|c: char| c.is_ascii_digit()))
        .map(FieldValue::from)
}

fn contract_type(text: &str) -> Option<FieldValue> {
    first_capture(&[re_contract_agreement(), re_contract_contract()], text)
        .map(|kind| FieldValue::Text(kind.to_lowercase()))
}

// ── Amount parsing ────────────────────────────────────────────────────────────

/// Thousands separators are dropped before parsing; malformed figures yield `None`.
fn parse_amount_str(s: &str) -> Option<f64> {
    let clean = s.replace(',', "");
    Decimal::from_str(&clean).ok()?.to_f64()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
