//! Product facts from a single page: JSON-LD first, DOM fallbacks second.

use crate::jsonld;
use crate::normalize::NormalizedUrl;
use crate::text::{element_text, squash_whitespace};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

/// Upper bound on gallery entries kept per product.
pub const GALLERY_CAP: usize = 40;

macro_rules! selector {
    ($css:expr) => {
        LazyLock::new(|| Selector::parse($css).expect("static selector"))
    };
}

static H1: LazyLock<Selector> = selector!("h1");
static TITLE: LazyLock<Selector> = selector!("title");
static META_DESCRIPTION: LazyLock<Selector> = selector!(r#"meta[name="description"]"#);
static OG_TITLE: LazyLock<Selector> = selector!(r#"meta[property="og:title"]"#);
static OG_DESCRIPTION: LazyLock<Selector> = selector!(r#"meta[property="og:description"]"#);
static BODY: LazyLock<Selector> = selector!("body");
static PRICE_BLOCK: LazyLock<Selector> =
    selector!(r#"[class*="price"]:not([class*="old"]):not([class*="was"])"#);
static OLD_PRICE_BLOCK: LazyLock<Selector> =
    selector!(r#"[class*="old-price"], [class*="price-old"], [class*="old_price"], del, s"#);
static DL: LazyLock<Selector> = selector!("dl");
static TABLE_ROW: LazyLock<Selector> = selector!("table tr");
static ROW_CELL: LazyLock<Selector> = selector!("th, td");
static IMAGE: LazyLock<Selector> = selector!("img");
static LINK: LazyLock<Selector> = selector!("a[href]");

/// A currency-marked number. Thousands groups are exactly three digits
/// apart, split by one space, NBSP or narrow NBSP.
static PRICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(\d{1,3}(?:[ \x{A0}\x{202F}]\d{3})+|\d+)((?:[.,]\d{1,2})?)\s*(₽|руб\.?|р\.|€|\$|rub\b|eur\b|usd\b)",
    )
    .expect("static regex")
});
static IMAGE_EXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(jpe?g|png|webp|gif|avif)$").expect("static regex"));
static GALLERY_DENY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(icon|sprite|logo|favicon|placeholder|blank|spacer|loader|pixel)")
        .expect("static regex")
});
static OUT_OF_STOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(нет в наличии|out of stock|sold out|распродано)").expect("static regex")
});
static PRE_ORDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(под заказ|pre-?order)").expect("static regex"));
static IN_STOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(в наличии|in stock)").expect("static regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    OutOfStock,
    PreOrder,
    #[default]
    Unknown,
}

impl StockStatus {
    fn from_availability(s: &str) -> Option<Self> {
        let s = s.to_ascii_lowercase();
        if s.contains("outofstock") || s.contains("soldout") || s.contains("discontinued") {
            Some(StockStatus::OutOfStock)
        } else if s.contains("preorder") || s.contains("backorder") {
            Some(StockStatus::PreOrder)
        } else if s.contains("instock") || s.contains("limitedavailability") || s.contains("instoreonly") {
            Some(StockStatus::InStock)
        } else {
            None
        }
    }

    fn from_text(text: &str) -> Self {
        if OUT_OF_STOCK_RE.is_match(text) {
            StockStatus::OutOfStock
        } else if PRE_ORDER_RE.is_match(text) {
            StockStatus::PreOrder
        } else if IN_STOCK_RE.is_match(text) {
            StockStatus::InStock
        } else {
            StockStatus::Unknown
        }
    }
}

/// The flat record handed to the upsert collaborator, keyed by `slug`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub source_url: NormalizedUrl,
    pub name: String,
    pub slug: String,
    pub sku: Option<String>,
    pub brand: Option<String>,
    pub country: Option<String>,
    pub price: Option<f64>,
    pub old_price: Option<f64>,
    /// Whole percent off `old_price`.
    pub discount: Option<u8>,
    pub currency: Option<String>,
    pub stock: StockStatus,
    pub specs: Vec<(String, String)>,
    pub gallery: Vec<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
}

/// The shapes a gallery field turns up in: a real list, a delimited string,
/// or a JSON array serialized into a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GalleryField {
    Inline(Vec<String>),
    Delimited(String),
    Json(String),
}

impl GalleryField {
    /// Read a JSON-LD `image` value.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(GalleryField::from(s.as_str())),
            Value::Array(items) => Some(GalleryField::Inline(
                items.iter().filter_map(image_url_of).collect(),
            )),
            Value::Object(_) => image_url_of(value).map(|url| GalleryField::Inline(vec![url])),
            _ => None,
        }
    }

    /// Raw URL strings, in order, unfiltered.
    pub fn into_urls(self) -> Vec<String> {
        match self {
            GalleryField::Inline(urls) => urls,
            GalleryField::Delimited(s) => split_delimited(&s),
            GalleryField::Json(s) => match serde_json::from_str::<Vec<Value>>(&s) {
                Ok(items) => items.iter().filter_map(image_url_of).collect(),
                Err(_) => split_delimited(&s),
            },
        }
    }
}

impl From<&str> for GalleryField {
    fn from(s: &str) -> Self {
        if s.trim_start().starts_with('[') {
            GalleryField::Json(s.to_string())
        } else {
            GalleryField::Delimited(s.to_string())
        }
    }
}

fn split_delimited(s: &str) -> Vec<String> {
    s.split(['|', '\n'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn image_url_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map
            .get("url")
            .or_else(|| map.get("contentUrl"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// Extract a product record. `None` when the page has no product name from
/// any source.
pub fn extract_product(html: &str, page_url: &NormalizedUrl) -> Option<ProductRecord> {
    let document = Html::parse_document(html);
    extract_product_from(&document, page_url)
}

pub fn extract_product_from(document: &Html, page_url: &NormalizedUrl) -> Option<ProductRecord> {
    let structured = jsonld::find_product(document).unwrap_or_default();
    let offers = first_offer(&structured);

    let name = text_field(&structured, "name")
        .or_else(|| first_text(document, &H1))
        .or_else(|| meta_content(document, &OG_TITLE))?;

    let slug = page_url
        .last_segment()
        .map(|segment| slugify(&segment))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| slugify(&name));

    let specs = merge_specs(structured_specs(&structured), dom_specs(document));

    let (dom_price, dom_currency) = dom_price(document);
    let price = offers
        .as_ref()
        .and_then(|o| o.get("price").or_else(|| o.get("lowPrice")))
        .and_then(number_of)
        .or(dom_price);
    let currency = offers
        .as_ref()
        .and_then(|o| text_field(o, "priceCurrency"))
        .or(dom_currency);
    let old_price = dom_old_price(document).filter(|old| price.is_some_and(|p| *old > p));
    let discount = match (price, old_price) {
        (Some(p), Some(old)) if old > 0.0 => Some(((old - p) / old * 100.0).round() as u8),
        _ => None,
    };

    let stock = offers
        .as_ref()
        .and_then(|o| o.get("availability"))
        .and_then(Value::as_str)
        .and_then(StockStatus::from_availability)
        .unwrap_or_else(|| StockStatus::from_text(&body_text(document)));

    let country = named_field(&structured, "countryOfOrigin").or_else(|| {
        specs
            .iter()
            .find(|(k, _)| {
                let k = k.to_lowercase();
                k.contains("страна") || k.contains("country")
            })
            .map(|(_, v)| v.clone())
    });

    let structured_gallery: Vec<String> = structured
        .get("image")
        .and_then(GalleryField::from_value)
        .map(GalleryField::into_urls)
        .unwrap_or_default();
    let gallery = {
        let from_structured = clean_gallery(structured_gallery, page_url);
        if from_structured.is_empty() {
            clean_gallery(dom_gallery(document), page_url)
        } else {
            from_structured
        }
    };

    Some(ProductRecord {
        source_url: page_url.clone(),
        name,
        slug,
        sku: text_field(&structured, "sku")
            .or_else(|| text_field(&structured, "mpn"))
            .or_else(|| text_field(&structured, "productID")),
        brand: named_field(&structured, "brand"),
        country,
        price,
        old_price,
        discount,
        currency,
        stock,
        specs,
        gallery,
        meta_title: first_text(document, &TITLE).or_else(|| meta_content(document, &OG_TITLE)),
        meta_description: meta_content(document, &META_DESCRIPTION)
            .or_else(|| meta_content(document, &OG_DESCRIPTION)),
    })
}

/// `offers` may be one object or a list; the first object wins.
fn first_offer(product: &Map<String, Value>) -> Option<Map<String, Value>> {
    match product.get("offers")? {
        Value::Object(offer) => Some(offer.clone()),
        Value::Array(offers) => offers.iter().find_map(|o| o.as_object().cloned()),
        _ => None,
    }
}

/// A scalar field as normalized text.
fn text_field(entity: &Map<String, Value>, key: &str) -> Option<String> {
    let text = match entity.get(key)? {
        Value::String(s) => squash_whitespace(s),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// A field that is either a string or an object with a `name`.
fn named_field(entity: &Map<String, Value>, key: &str) -> Option<String> {
    match entity.get(key)? {
        Value::Object(inner) => text_field(inner, "name"),
        Value::Array(items) => items.iter().find_map(|item| match item {
            Value::String(s) => Some(squash_whitespace(s)).filter(|s| !s.is_empty()),
            Value::Object(inner) => text_field(inner, "name"),
            _ => None,
        }),
        _ => text_field(entity, key),
    }
}

fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_amount(s),
        _ => None,
    }
}

/// `"12 990,50"` → `12990.5`.
fn parse_amount(s: &str) -> Option<f64> {
    let compact: String = s
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    compact.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)
}

fn currency_code(glyph: &str) -> &'static str {
    let glyph = glyph.to_lowercase();
    match glyph.as_str() {
        "€" | "eur" => "EUR",
        "$" | "usd" => "USD",
        _ => "RUB",
    }
}

/// First currency-marked amount with at least three integer digits.
fn find_price(text: &str) -> Option<(f64, &'static str)> {
    PRICE_RE.captures_iter(text).find_map(|caps| {
        let integer_part = caps.get(1)?.as_str();
        let digits = integer_part.chars().filter(char::is_ascii_digit).count();
        if digits < 3 {
            return None;
        }
        let amount = format!("{}{}", integer_part, caps.get(2).map_or("", |m| m.as_str()));
        Some((parse_amount(&amount)?, currency_code(caps.get(3)?.as_str())))
    })
}

fn is_old_price(element: &ElementRef<'_>) -> bool {
    OLD_PRICE_BLOCK.matches(element)
        || element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|ancestor| OLD_PRICE_BLOCK.matches(&ancestor))
}

/// Text of `element` with anything inside an old-price element left out.
fn current_price_text(element: &ElementRef<'_>) -> String {
    let parts: Vec<&str> = element
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let struck = node
                .ancestors()
                .take_while(|ancestor| ancestor.id() != element.id())
                .filter_map(ElementRef::wrap)
                .any(|ancestor| OLD_PRICE_BLOCK.matches(&ancestor));
            (!struck).then_some(&**text)
        })
        .collect();
    squash_whitespace(&parts.join(" "))
}

/// Innermost price elements first, then their wrappers, then the whole body.
fn dom_price(document: &Html) -> (Option<f64>, Option<String>) {
    let (innermost, wrappers): (Vec<ElementRef<'_>>, Vec<ElementRef<'_>>) = document
        .select(&PRICE_BLOCK)
        .filter(|block| !is_old_price(block))
        .partition(|block| block.select(&PRICE_BLOCK).next().is_none());
    let from_blocks = innermost
        .iter()
        .chain(&wrappers)
        .find_map(|block| find_price(&current_price_text(block)));
    let from_body = || {
        document
            .select(&BODY)
            .next()
            .and_then(|body| find_price(&current_price_text(&body)))
    };
    match from_blocks.or_else(from_body) {
        Some((price, currency)) => (Some(price), Some(currency.to_string())),
        None => (None, None),
    }
}

fn dom_old_price(document: &Html) -> Option<f64> {
    document
        .select(&OLD_PRICE_BLOCK)
        .find_map(|block| find_price(&element_text(&block)))
        .map(|(price, _)| price)
}

fn structured_specs(product: &Map<String, Value>) -> Vec<(String, String)> {
    let Some(Value::Array(properties)) = product.get("additionalProperty") else {
        return Vec::new();
    };
    properties
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|property| {
            let name = text_field(property, "name")?;
            let value = match property.get("value")? {
                Value::Bool(b) => b.to_string(),
                _ => text_field(property, "value")?,
            };
            Some((name, value))
        })
        .collect()
}

/// Definition-list pairs and two-cell table rows.
fn dom_specs(document: &Html) -> Vec<(String, String)> {
    let mut specs = Vec::new();

    for list in document.select(&DL) {
        let mut pending: Option<String> = None;
        for child in list.children().filter_map(ElementRef::wrap) {
            match child.value().name() {
                "dt" => pending = Some(element_text(&child)),
                "dd" => {
                    if let Some(name) = pending.take() {
                        specs.push((name, element_text(&child)));
                    }
                }
                _ => {}
            }
        }
    }

    for row in document.select(&TABLE_ROW) {
        let cells: Vec<String> = row.select(&ROW_CELL).map(|c| element_text(&c)).collect();
        if let [name, value] = cells.as_slice() {
            specs.push((name.clone(), value.clone()));
        }
    }

    specs
}

/// Structured entries first; later duplicates (case-insensitive on
/// name+value) and entries with an empty side are dropped.
fn merge_specs(
    structured: Vec<(String, String)>,
    dom: Vec<(String, String)>,
) -> Vec<(String, String)> {
    let mut seen = HashSet::new();
    structured
        .into_iter()
        .chain(dom)
        .map(|(k, v)| (squash_whitespace(k.trim_end_matches(':')), squash_whitespace(&v)))
        .filter(|(k, v)| !k.is_empty() && !v.is_empty())
        .filter(|(k, v)| seen.insert((k.to_lowercase(), v.to_lowercase())))
        .collect()
}

fn dom_gallery(document: &Html) -> Vec<String> {
    let from_images = document.select(&IMAGE).flat_map(|img| {
        ["data-zoom-image", "data-large", "data-src", "src"]
            .into_iter()
            .filter_map(move |attr| img.value().attr(attr))
            .map(str::to_string)
            .collect::<Vec<_>>()
    });
    let from_links = document
        .select(&LINK)
        .filter_map(|a| a.value().attr("href"))
        .map(str::to_string);
    from_links.chain(from_images).collect()
}

/// Resolve, keep image-like URLs, drop icons and sprites, dedupe, cap.
fn clean_gallery(candidates: Vec<String>, page_url: &NormalizedUrl) -> Vec<String> {
    let Ok(base) = Url::parse(page_url.as_str()) else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    candidates
        .iter()
        .filter_map(|raw| base.join(raw.trim()).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .filter(|url| IMAGE_EXT_RE.is_match(url.path()))
        .filter(|url| {
            let file = url.path().rsplit('/').next().unwrap_or_default();
            !GALLERY_DENY_RE.is_match(file)
        })
        .map(|mut url| {
            url.set_fragment(None);
            url.to_string()
        })
        .filter(|url| seen.insert(url.clone()))
        .take(GALLERY_CAP)
        .collect()
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .map(|e| element_text(&e))
        .find(|s| !s.is_empty())
}

fn meta_content(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .filter_map(|e| e.value().attr("content"))
        .map(squash_whitespace)
        .find(|s| !s.is_empty())
}

fn body_text(document: &Html) -> String {
    document
        .select(&BODY)
        .next()
        .map(|body| element_text(&body))
        .unwrap_or_default()
}

/// Lower-case, keep letters and digits (any script), hyphenate the rest.
pub fn slugify(s: &str) -> String {
    let mut slug = String::with_capacity(s.len());
    for c in s.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}
