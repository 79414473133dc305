//! Payload CMS REST adapter.
//!
//! Posts and affiliate products live in two collections with their own field
//! names; both are mapped into [`Document`] here and nowhere else. Ids handed
//! out by this store are namespaced by collection (`posts:12`,
//! `affiliate-products:7`) so the two id spaces never collide.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ContentStore, DocumentPatch, Query, StoreError};
use crate::document::{Document, DocumentKind, Language, PublishStatus};

/// Collection holding blog posts.
pub const POSTS_COLLECTION: &str = "posts";
/// Collection holding affiliate products.
pub const PRODUCTS_COLLECTION: &str = "affiliate-products";

const PAGE_SIZE: usize = 100;

/// Blocking client for a Payload REST API (`<base>/api/<collection>`).
pub struct PayloadStore {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct PageResponse {
    #[serde(default)]
    docs: Vec<Value>,
    #[serde(default, rename = "hasNextPage")]
    has_next_page: bool,
}

impl PayloadStore {
    /// Builds a client; `token` is sent verbatim as the `Authorization` header
    /// (e.g. `JWT <token>` or `users API-Key <key>`).
    pub fn new(
        base_url: impl Into<String>,
        token: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = token.map(str::trim).filter(|token| !token.is_empty()) {
            let value = HeaderValue::from_str(token)
                .map_err(|err| StoreError::Invalid(format!("invalid payload token: {err}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/api/{}", self.base_url, collection)
    }

    fn fetch_collection(
        &self,
        kind: DocumentKind,
        query: &Query,
        remaining: usize,
    ) -> Result<Vec<Document>, StoreError> {
        let collection = collection_for(kind);
        let mut out = Vec::new();
        let mut page = 1usize;
        loop {
            let mut params: Vec<(String, String)> = vec![
                ("limit".into(), PAGE_SIZE.to_string()),
                ("page".into(), page.to_string()),
                ("depth".into(), "1".into()),
            ];
            if query.status == Some(PublishStatus::Published) {
                params.push(published_filter(kind));
            }
            let response = self
                .client
                .get(self.collection_url(collection))
                .query(&params)
                .send()?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().unwrap_or_default();
                return Err(StoreError::Invalid(format!(
                    "listing {collection} failed ({status}): {body}"
                )));
            }
            let parsed: PageResponse = response.json()?;
            for raw in &parsed.docs {
                let doc = from_payload(kind, raw)?;
                if query.matches(&doc) {
                    out.push(doc);
                    if out.len() >= remaining {
                        return Ok(out);
                    }
                }
            }
            if !parsed.has_next_page || parsed.docs.is_empty() {
                return Ok(out);
            }
            page += 1;
        }
    }
}

impl ContentStore for PayloadStore {
    fn find(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let kinds: Vec<DocumentKind> = match query.kind {
            Some(kind) => vec![kind],
            None => vec![DocumentKind::Post, DocumentKind::Product],
        };
        let mut out = Vec::new();
        for kind in kinds {
            let remaining = query.limit.unwrap_or(usize::MAX).saturating_sub(out.len());
            if remaining == 0 {
                break;
            }
            out.extend(self.fetch_collection(kind, query, remaining)?);
        }
        Ok(out)
    }

    fn find_by_id(&self, id: &str) -> Result<Document, StoreError> {
        let (kind, raw_id) = split_id(id)?;
        let url = format!("{}/{}", self.collection_url(collection_for(kind)), raw_id);
        let response = self.client.get(url).query(&[("depth", "1")]).send()?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(StoreError::Invalid(format!(
                "fetching {id} failed ({status}): {body}"
            )));
        }
        let raw: Value = response.json()?;
        from_payload(kind, &raw)
    }

    fn update(&self, id: &str, patch: &DocumentPatch) -> Result<Document, StoreError> {
        let (kind, raw_id) = split_id(id)?;
        let url = format!("{}/{}", self.collection_url(collection_for(kind)), raw_id);
        let response = self.client.patch(url).json(&patch_body(patch)).send()?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(id.to_string()));
        }
        if !status.is_success() {
            let reason = response.text().unwrap_or_default();
            return Err(StoreError::Rejected {
                id: id.to_string(),
                reason: format!("{status}: {reason}"),
            });
        }
        let raw: Value = response.json()?;
        from_payload(kind, raw.get("doc").unwrap_or(&raw))
    }
}

fn collection_for(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Post => POSTS_COLLECTION,
        DocumentKind::Product => PRODUCTS_COLLECTION,
    }
}

fn published_filter(kind: DocumentKind) -> (String, String) {
    match kind {
        DocumentKind::Post => ("where[_status][equals]".into(), "published".into()),
        DocumentKind::Product => ("where[status][equals]".into(), "active".into()),
    }
}

fn split_id(id: &str) -> Result<(DocumentKind, &str), StoreError> {
    let (collection, raw) = id
        .split_once(':')
        .ok_or_else(|| StoreError::Invalid(format!("id {id} lacks a collection prefix")))?;
    let kind = match collection {
        POSTS_COLLECTION => DocumentKind::Post,
        PRODUCTS_COLLECTION => DocumentKind::Product,
        other => {
            return Err(StoreError::Invalid(format!(
                "unknown collection {other} in id {id}"
            )))
        }
    };
    Ok((kind, raw))
}

fn from_payload(kind: DocumentKind, raw: &Value) -> Result<Document, StoreError> {
    match kind {
        DocumentKind::Post => post_from_payload(raw),
        DocumentKind::Product => product_from_payload(raw),
    }
}

fn raw_id(raw: &Value) -> Result<String, StoreError> {
    match raw.get("id") {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(StoreError::Invalid("document without an id".into())),
    }
}

fn str_field<'a>(raw: &'a Value, key: &str) -> &'a str {
    raw.get(key).and_then(Value::as_str).unwrap_or("").trim()
}

fn language_field(raw: &Value) -> Option<Language> {
    match str_field(raw, "language") {
        "ja" => Some(Language::Ja),
        "en" => Some(Language::En),
        "both" => Some(Language::Both),
        _ => None,
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    let value = value.trim();
    if value.is_empty() || list.iter().any(|existing| existing == value) {
        return;
    }
    list.push(value.to_string());
}

/// Maps a `posts` document into the canonical schema.
pub fn post_from_payload(raw: &Value) -> Result<Document, StoreError> {
    let id = raw_id(raw)?;
    let status = match raw.get("_status").and_then(Value::as_str) {
        Some("published") | None => PublishStatus::Published,
        Some(_) => PublishStatus::Draft,
    };

    let mut keywords = Vec::new();
    if let Some(meta_keywords) = raw.pointer("/meta/keywords").and_then(Value::as_str) {
        for keyword in meta_keywords.split([',', '、']) {
            push_unique(&mut keywords, keyword);
        }
    }

    let mut categories = Vec::new();
    if let Some(items) = raw.get("categories").and_then(Value::as_array) {
        for item in items {
            if let Some(title) = item.get("title").and_then(Value::as_str) {
                push_unique(&mut categories, title);
            }
        }
    }

    Ok(Document {
        id: format!("{POSTS_COLLECTION}:{id}"),
        kind: DocumentKind::Post,
        title: str_field(raw, "title").to_string(),
        slug: str_field(raw, "slug").to_string(),
        summary: str_field(raw, "excerpt").to_string(),
        content: raw.get("content").filter(|value| value.is_object()).cloned(),
        language: language_field(raw),
        status,
        keywords,
        categories,
        url: None,
    })
}

/// Maps an `affiliate-products` document into the canonical schema.
///
/// The researched keyword becomes the primary keyword, followed by the
/// keyword list and any curated anchor phrases.
pub fn product_from_payload(raw: &Value) -> Result<Document, StoreError> {
    let id = raw_id(raw)?;
    let status = match str_field(raw, "status") {
        "active" | "" => PublishStatus::Published,
        _ => PublishStatus::Draft,
    };

    let mut keywords = Vec::new();
    push_unique(&mut keywords, str_field(raw, "keyword_research"));
    for (list, field) in [("keywords", "keyword"), ("anchorPhrases", "phrase")] {
        if let Some(items) = raw.get(list).and_then(Value::as_array) {
            for item in items {
                if let Some(value) = item.get(field).and_then(Value::as_str) {
                    push_unique(&mut keywords, value);
                }
            }
        }
    }

    let mut categories = Vec::new();
    push_unique(&mut categories, str_field(raw, "category"));

    let url = [str_field(raw, "affiliate_url"), str_field(raw, "clean_url")]
        .into_iter()
        .find(|url| !url.is_empty())
        .map(str::to_string);

    Ok(Document {
        id: format!("{PRODUCTS_COLLECTION}:{id}"),
        kind: DocumentKind::Product,
        title: str_field(raw, "product_name").to_string(),
        slug: String::new(),
        summary: str_field(raw, "description").to_string(),
        content: raw.get("content").filter(|value| value.is_object()).cloned(),
        language: language_field(raw),
        status,
        keywords,
        categories,
        url,
    })
}

fn patch_body(patch: &DocumentPatch) -> Value {
    match &patch.content {
        Some(content) => json!({ "content": content }),
        None => json!({}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn maps_posts() {
        let raw = json!({
            "id": 12,
            "title": " スコアカードの書き方 ",
            "slug": "scorecard",
            "excerpt": "基本",
            "_status": "published",
            "meta": {"keywords": "スコア, スコアカード、記録"},
            "categories": [{"id": 1, "title": "ルール"}, 4],
            "content": {"root": {"type": "root", "children": []}}
        });
        let doc = post_from_payload(&raw).expect("map");
        assert_eq!(doc.id, "posts:12");
        assert_eq!(doc.title, "スコアカードの書き方");
        assert_eq!(doc.keywords, vec!["スコア", "スコアカード", "記録"]);
        assert_eq!(doc.categories, vec!["ルール"]);
        assert_eq!(doc.status, PublishStatus::Published);
        assert!(doc.content.is_some());
        assert_eq!(doc.link_target().url, "/posts/scorecard");
    }

    #[test]
    fn maps_products() {
        let raw = json!({
            "id": "7",
            "product_name": "スコアカードホルダー",
            "keyword_research": "スコアカード",
            "keywords": [{"keyword": "スコア"}, {"keyword": "スコアカード"}],
            "anchorPhrases": [{"phrase": "スコア管理"}],
            "category": "アクセサリー",
            "affiliate_url": "",
            "clean_url": "https://shop.example/item/7",
            "description": "革製",
            "language": "ja",
            "status": "inactive"
        });
        let doc = product_from_payload(&raw).expect("map");
        assert_eq!(doc.id, "affiliate-products:7");
        assert_eq!(doc.keywords, vec!["スコアカード", "スコア", "スコア管理"]);
        assert_eq!(doc.url.as_deref(), Some("https://shop.example/item/7"));
        assert_eq!(doc.language, Some(Language::Ja));
        assert_eq!(doc.status, PublishStatus::Draft);
    }

    #[test]
    fn ids_are_namespaced() {
        assert_eq!(split_id("posts:3").unwrap(), (DocumentKind::Post, "3"));
        assert_eq!(
            split_id("affiliate-products:9").unwrap(),
            (DocumentKind::Product, "9")
        );
        assert!(split_id("pages:1").is_err());
        assert!(split_id("12").is_err());
    }

    #[test]
    fn patch_body_only_carries_content() {
        let body = patch_body(&DocumentPatch::content(json!({"root": {}})));
        assert_eq!(body, json!({"content": {"root": {}}}));
        assert_eq!(patch_body(&DocumentPatch::default()), json!({}));
    }

    #[test]
    fn rejects_documents_without_id() {
        assert!(post_from_payload(&json!({"title": "x"})).is_err());
    }
}
