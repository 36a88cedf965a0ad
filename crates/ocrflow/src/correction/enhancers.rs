//! Type-specific second pass over corrected text.

use regex::{Captures, Regex};

use super::document_type::DocumentType;
use super::rules::compile;

/// Result of an enhancement pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Enhancement {
    pub text: String,
    pub changes: u32,
}

pub trait DocumentEnhancer: Send + Sync {
    fn document_type(&self) -> DocumentType;

    fn enhance(&self, text: &str) -> Enhancement;
}

/// Rewrites `label:` prefixes at line starts to a canonical spelling.
struct LabelNormalizer {
    pattern: Option<Regex>,
    labels: &'static [(&'static str, &'static str)],
}

impl LabelNormalizer {
    fn new(labels: &'static [(&'static str, &'static str)]) -> Self {
        // longest first, so "invoice number" is not cut short by "invoice no"
        let mut raw: Vec<&str> = labels.iter().map(|(raw, _)| *raw).collect();
        raw.sort_by_key(|r| std::cmp::Reverse(r.len()));
        let alternatives = raw
            .iter()
            .map(|r| regex::escape(r))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = compile(&format!(r"(?im)^[ \t]*({})\b[ \t]*[:;.]?[ \t]*", alternatives));
        Self { pattern, labels }
    }

    fn canonical(&self, raw: &str) -> Option<&'static str> {
        let lower = raw.to_lowercase();
        self.labels
            .iter()
            .find(|(label, _)| *label == lower)
            .map(|(_, canonical)| *canonical)
    }

    fn apply(&self, text: &str) -> (String, u32) {
        let Some(pattern) = &self.pattern else {
            return (text.to_string(), 0);
        };

        let mut changes = 0;
        let rewritten = pattern.replace_all(text, |caps: &Captures| {
            let whole = caps.get(0).map_or("", |m| m.as_str());
            let raw = caps.get(1).map_or("", |m| m.as_str());
            let replacement = match self.canonical(raw) {
                Some(canonical) => format!("{}: ", canonical),
                None => whole.to_string(),
            };
            if replacement != whole {
                changes += 1;
            }
            replacement
        });

        (rewritten.into_owned(), changes)
    }
}

/// Applies `pattern` with a per-match rewrite, counting matches that changed.
fn rewrite_matches(pattern: Option<&Regex>, text: &str, f: impl Fn(&Captures) -> String) -> (String, u32) {
    let Some(pattern) = pattern else {
        return (text.to_string(), 0);
    };
    let mut changes = 0;
    let rewritten = pattern.replace_all(text, |caps: &Captures| {
        let replacement = f(caps);
        if caps.get(0).map_or("", |m| m.as_str()) != replacement {
            changes += 1;
        }
        replacement
    });
    (rewritten.into_owned(), changes)
}

pub struct InvoiceEnhancer {
    labels: LabelNormalizer,
    currency_gap: Option<Regex>,
    decimal_comma_gap: Option<Regex>,
}

impl InvoiceEnhancer {
    pub fn new() -> Self {
        Self {
            labels: LabelNormalizer::new(&[
                ("invoice no", "Invoice No"),
                ("invoice number", "Invoice No"),
                ("subtotal", "Subtotal"),
                ("sub total", "Subtotal"),
                ("tax", "Tax"),
                ("vat", "VAT"),
                ("total", "Total"),
                ("amount due", "Amount Due"),
                ("date", "Date"),
            ]),
            currency_gap: compile(r"([$€£])[ \t]+(\d)"),
            decimal_comma_gap: compile(r"(\d)[ \t]*([.,])[ \t]+(\d{2})\b"),
        }
    }
}

impl Default for InvoiceEnhancer {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentEnhancer for InvoiceEnhancer {
    fn document_type(&self) -> DocumentType {
        DocumentType::Invoice
    }

    fn enhance(&self, text: &str) -> Enhancement {
        let (text, labels) = self.labels.apply(text);
        let (text, currency) = rewrite_matches(self.currency_gap.as_ref(), &text, |caps| {
            format!("{}{}", &caps[1], &caps[2])
        });
        let (text, decimals) = rewrite_matches(self.decimal_comma_gap.as_ref(), &text, |caps| {
            format!("{}{}{}", &caps[1], &caps[2], &caps[3])
        });
        Enhancement {
            text,
            changes: labels + currency + decimals,
        }
    }
}

pub struct IdCardEnhancer {
    labels: LabelNormalizer,
}

impl IdCardEnhancer {
    pub fn new() -> Self {
        Self {
            labels: LabelNormalizer::new(&[
                ("name", "Name"),
                ("surname", "Surname"),
                ("given names", "Given Names"),
                ("address", "Address"),
                ("id", "ID"),
                ("id no", "ID"),
                ("date of birth", "Date of Birth"),
                ("dob", "Date of Birth"),
                ("nationality", "Nationality"),
                ("expiry", "Expiry"),
            ]),
        }
    }
}

impl Default for IdCardEnhancer {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentEnhancer for IdCardEnhancer {
    fn document_type(&self) -> DocumentType {
        DocumentType::IdCard
    }

    fn enhance(&self, text: &str) -> Enhancement {
        let (text, changes) = self.labels.apply(text);
        Enhancement { text, changes }
    }
}

pub struct BusinessCardEnhancer {
    labels: LabelNormalizer,
    email: Option<Regex>,
}

impl BusinessCardEnhancer {
    pub fn new() -> Self {
        Self {
            labels: LabelNormalizer::new(&[
                ("tel", "Phone"),
                ("phone", "Phone"),
                ("mobile", "Mobile"),
                ("cell", "Mobile"),
                ("fax", "Fax"),
                ("email", "Email"),
                ("e-mail", "Email"),
                ("web", "Web"),
            ]),
            email: compile(r"([A-Za-z0-9._%+-]+)[ \t]*@[ \t]*([A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,})"),
        }
    }
}

impl Default for BusinessCardEnhancer {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentEnhancer for BusinessCardEnhancer {
    fn document_type(&self) -> DocumentType {
        DocumentType::BusinessCard
    }

    fn enhance(&self, text: &str) -> Enhancement {
        let (text, labels) = self.labels.apply(text);
        let (text, emails) = rewrite_matches(self.email.as_ref(), &text, |caps| {
            format!("{}@{}", &caps[1], &caps[2]).to_lowercase()
        });
        Enhancement {
            text,
            changes: labels + emails,
        }
    }
}

/// One enhancer per document type that has one.
pub fn standard_enhancers() -> Vec<Box<dyn DocumentEnhancer>> {
    vec![
        Box::new(InvoiceEnhancer::new()),
        Box::new(IdCardEnhancer::new()),
        Box::new(BusinessCardEnhancer::new()),
    ]
}
