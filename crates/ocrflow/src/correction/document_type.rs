use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DocumentType {
    Invoice,
    IdCard,
    BusinessCard,
    #[default]
    General,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "invoice",
            DocumentType::IdCard => "idCard",
            DocumentType::BusinessCard => "businessCard",
            DocumentType::General => "general",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invoice" => Ok(DocumentType::Invoice),
            "idCard" => Ok(DocumentType::IdCard),
            "businessCard" => Ok(DocumentType::BusinessCard),
            "general" => Ok(DocumentType::General),
            other => Err(format!("unknown document type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Filename,
    Content,
}

/// Keyword cues, checked in order. Filename cues come first.
const CUES: &[(Source, &[&str], DocumentType)] = &[
    (Source::Filename, &["invoice", "receipt"], DocumentType::Invoice),
    (Source::Filename, &["card", "id"], DocumentType::IdCard),
    (Source::Filename, &["business", "contact"], DocumentType::BusinessCard),
    (Source::Content, &["invoice", "total", "amount"], DocumentType::Invoice),
    (Source::Content, &["name:", "address:", "id:"], DocumentType::IdCard),
    (Source::Content, &["email", "phone", "mobile"], DocumentType::BusinessCard),
];

/// Classifies a document by case-insensitive keyword match. The first cue
/// that matches wins; with no match the document is `General`.
pub fn detect_document_type(filename: Option<&str>, text: &str) -> DocumentType {
    let filename = filename.unwrap_or_default().to_lowercase();
    let content = text.to_lowercase();

    CUES.iter()
        .find(|(source, keywords, _)| {
            let haystack = match source {
                Source::Filename => &filename,
                Source::Content => &content,
            };
            keywords.iter().any(|k| haystack.contains(k))
        })
        .map(|(_, _, doc_type)| *doc_type)
        .unwrap_or_default()
}
