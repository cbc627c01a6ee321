//! CSV rendering of extracted records.

use gleaner_model::Record;

const BOM: &str = "\u{feff}";

/// One flattened row: ordered `(column, value)` pairs.
type Row = Vec<(String, String)>;

fn set(row: &mut Row, column: &str, value: impl Into<String>) {
    let value = value.into();
    match row.iter_mut().find(|(name, _)| name == column) {
        Some(existing) => existing.1 = value,
        None => row.push((column.to_string(), value)),
    }
}

fn flatten(record: &Record) -> Row {
    let mut row = Row::new();
    match record {
        Record::Extracted(item) => {
            set(&mut row, "item", item.item.as_str());
            set(&mut row, "title", item.title.clone().unwrap_or_default());
            set(
                &mut row,
                "manufacturer",
                item.manufacturer.clone().unwrap_or_default(),
            );
            set(
                &mut row,
                "price",
                item.price.map(|price| price.to_string()).unwrap_or_default(),
            );
            set(
                &mut row,
                "description",
                item.description.clone().unwrap_or_default(),
            );
            set(&mut row, "image", item.image.clone().unwrap_or_default());
            for attribute in &item.attributes {
                set(&mut row, &attribute.name, attribute.value.as_str());
            }
        }
        Record::Degraded(degraded) => {
            set(&mut row, "item", degraded.item.as_str());
            set(&mut row, "url", degraded.url.as_str());
            set(&mut row, "error", degraded.error.as_str());
        }
    }
    row
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Renders `records` with a UTF-8 byte order mark. Columns are the union of
/// every record's fields in first-seen order. Attachment URLs are left out.
pub(crate) fn render(records: &[Record]) -> String {
    let rows: Vec<Row> = records.iter().map(flatten).collect();

    let mut columns: Vec<&str> = Vec::new();
    for row in &rows {
        for (name, _) in row {
            if !columns.contains(&name.as_str()) {
                columns.push(name);
            }
        }
    }

    let mut out = String::from(BOM);
    let header: Vec<String> = columns.iter().map(|c| quote(c)).collect();
    out.push_str(&header.join(","));
    out.push('\n');

    for row in &rows {
        let cells: Vec<String> = columns
            .iter()
            .map(|column| {
                row.iter()
                    .find(|(name, _)| name == column)
                    .map(|(_, value)| quote(value))
                    .unwrap_or_else(|| quote(""))
            })
            .collect();
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    out
}
