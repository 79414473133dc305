//! Canonical document schema shared by every stage.
//!
//! Store adapters translate their own field names into [`Document`]; nothing
//! downstream of the store boundary sees store-specific shapes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier issued by the content store.
pub type DocumentId = String;

/// Content item flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Blog post with a rich-text body.
    Post,
    /// Affiliate product.
    Product,
}

impl DocumentKind {
    /// Lowercase label used in logs and CLI values.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Product => "product",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detected or declared content language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    /// Japanese.
    Ja,
    /// English.
    En,
    /// Bilingual (products only).
    Both,
}

impl Language {
    /// `Both` pairs with anything; otherwise languages must match exactly.
    pub fn is_compatible(self, other: Language) -> bool {
        self == Language::Both || other == Language::Both || self == other
    }

    /// Lowercase code.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ja => "ja",
            Self::En => "en",
            Self::Both => "both",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Publication state as reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    /// Live content (published posts, active products).
    Published,
    /// Anything not live.
    Draft,
}

/// Where a link to a document points and how it behaves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkTarget {
    /// Destination URL.
    pub url: String,
    /// Marks the link as a paid placement (`rel="nofollow sponsored"`).
    pub sponsored: bool,
    /// Open in a new tab.
    pub new_tab: bool,
}

/// A content item as seen by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Store identifier.
    pub id: DocumentId,
    /// Post or product.
    pub kind: DocumentKind,
    /// Title (product name for products).
    pub title: String,
    /// URL slug.
    #[serde(default)]
    pub slug: String,
    /// Excerpt or product description.
    #[serde(default)]
    pub summary: String,
    /// Raw rich-text tree (`{"root": ...}`), absent for most products.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
    /// Language declared by the store, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    /// Publication state.
    pub status: PublishStatus,
    /// Ordered keywords; the first one is the primary keyword.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Category or tag titles.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Explicit destination URL (affiliate URL for products).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Document {
    /// Link target other documents use when linking here.
    pub fn link_target(&self) -> LinkTarget {
        let explicit = self
            .url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty());
        match self.kind {
            DocumentKind::Product => LinkTarget {
                url: explicit
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("/products/{}", self.id)),
                sponsored: true,
                new_tab: true,
            },
            DocumentKind::Post => {
                let url = match explicit {
                    Some(url) => url.to_string(),
                    None if !self.slug.trim().is_empty() => format!("/posts/{}", self.slug.trim()),
                    None => format!("/posts/{}", self.id),
                };
                LinkTarget {
                    url,
                    sponsored: false,
                    new_tab: false,
                }
            }
        }
    }
}
