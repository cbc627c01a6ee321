//! Wire shape of a catalog product document.

use std::collections::BTreeSet;

use gleaner_model::{
    Attribute, ItemRecord, LABEL_LENGTH_LIMIT, ReplacementMap, label_len,
};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ProductDocument {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub characteristics: Vec<Characteristic>,
    #[serde(default)]
    pub documents: Vec<Link>,
    #[serde(default)]
    pub certificates: Vec<Link>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Characteristic {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Link {
    pub href: String,
}

impl ProductDocument {
    /// Converts into a record, renaming attributes through `replacements`
    /// and collecting every resulting label at or over the length limit.
    pub fn into_record(
        self,
        item: &str,
        base: &Url,
        replacements: &ReplacementMap,
        long_labels: &mut BTreeSet<String>,
    ) -> ItemRecord {
        let title = join_title(self.title, self.subtitle);

        let mut attributes = Vec::with_capacity(self.characteristics.len());
        for characteristic in self.characteristics {
            let name = clean(&characteristic.name);
            if name.is_empty() {
                continue;
            }
            let label = replacements.apply(&name).to_string();
            if label_len(&label) >= LABEL_LENGTH_LIMIT {
                long_labels.insert(label.clone());
            }
            attributes.push(Attribute::new(label, clean(&characteristic.value)));
        }

        ItemRecord {
            item: item.to_string(),
            title,
            manufacturer: non_empty(self.manufacturer),
            price: self.price.as_ref().and_then(parse_price),
            description: non_empty(self.description),
            image: self.image.and_then(|href| resolve(base, &href)),
            attributes,
            documents: resolve_all(base, self.documents),
            certificates: resolve_all(base, self.certificates),
        }
    }
}

fn join_title(
    title: Option<String>,
    subtitle: Option<String>,
) -> Option<String> {
    let parts: Vec<String> = [title, subtitle]
        .into_iter()
        .flatten()
        .map(|part| clean(&part))
        .filter(|part| !part.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

/// Collapses runs of whitespace and trims.
fn clean(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| clean(&v)).filter(|v| !v.is_empty())
}

/// Accepts a JSON number or a display string such as `"12 990 ₽"`.
/// Fractions are rounded to whole units.
fn parse_price(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().map(|f| f.round() as u64)),
        Value::String(raw) => parse_price_text(raw),
        _ => None,
    }
}

/// A trailing `.` or `,` followed by one or two digits is the decimal
/// separator; any other separator groups thousands.
fn parse_price_text(raw: &str) -> Option<u64> {
    let numeric: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ','))
        .collect();
    let numeric = numeric.trim_matches(['.', ',']);

    let (whole, fraction) = match numeric.rfind(['.', ',']) {
        Some(at) if matches!(numeric.len() - at - 1, 1 | 2) => {
            (&numeric[..at], &numeric[at + 1..])
        }
        _ => (numeric, ""),
    };

    let digits: String = whole.chars().filter(char::is_ascii_digit).collect();
    let units: u64 = digits.parse().ok()?;
    let round_up = fraction.starts_with(['5', '6', '7', '8', '9']);
    Some(if round_up { units.saturating_add(1) } else { units })
}

fn resolve(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    base.join(href).ok().map(String::from)
}

fn resolve_all(base: &Url, links: Vec<Link>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    links
        .into_iter()
        .filter_map(|link| resolve(base, &link.href))
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://catalog.example/products/").unwrap()
    }

    #[test]
    fn builds_record_and_flags_long_labels() {
        let doc: ProductDocument = serde_json::from_value(serde_json::json!({
            "title": "  Drill ",
            "subtitle": "X200",
            "price": "12 990 ₽",
            "image": "/img/x200.png",
            "characteristics": [
                {"name": "Weight", "value": " 2 kg "},
                {"name": "Very Long Attribute Label Example", "value": "yes"},
                {"name": "Maximum Drilling Diameter In Steel", "value": "13"}
            ],
            "documents": [{"href": "docs/manual.pdf"}, {"href": "docs/manual.pdf"}],
            "certificates": [{"href": "https://certs.example/c1.pdf"}]
        }))
        .unwrap();

        let mut replacements = ReplacementMap::new();
        replacements
            .insert("Maximum Drilling Diameter In Steel", "Max steel bore")
            .unwrap();

        let mut long = BTreeSet::new();
        let record = doc.into_record("A1", &base(), &replacements, &mut long);

        assert_eq!(record.title.as_deref(), Some("Drill X200"));
        assert_eq!(record.price, Some(12990));
        assert_eq!(
            record.image.as_deref(),
            Some("https://catalog.example/img/x200.png")
        );
        assert_eq!(record.attributes[0], Attribute::new("Weight", "2 kg"));
        assert_eq!(record.attributes[2].name, "Max steel bore");
        assert_eq!(
            record.documents,
            ["https://catalog.example/products/docs/manual.pdf"]
        );
        assert_eq!(record.certificates.len(), 1);
        assert_eq!(
            long.into_iter().collect::<Vec<_>>(),
            ["Very Long Attribute Label Example"]
        );
    }

    #[test]
    fn price_accepts_numbers() {
        assert_eq!(parse_price(&serde_json::json!(1500)), Some(1500));
        assert_eq!(parse_price(&serde_json::json!(99.6)), Some(100));
        assert_eq!(parse_price(&serde_json::json!("n/a")), None);
    }

    #[test]
    fn price_text_stops_at_the_decimal_separator() {
        let cases = [
            ("12 990 ₽", Some(12_990)),
            ("12 990.50 ₽", Some(12_991)),
            ("12 990.20 ₽", Some(12_990)),
            ("1 299,9 руб.", Some(1_300)),
            ("12,990", Some(12_990)),
            ("1.234.567", Some(1_234_567)),
            ("$1,234.49", Some(1_234)),
            ("—", None),
        ];
        for (raw, expected) in cases {
            assert_eq!(parse_price_text(raw), expected, "{raw}");
        }
    }
}
