use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

/// Nested sections deeper than this are shown inline as JSON.
const MAX_DEPTH: usize = 3;

/// Format output as tables: scalars as a Field/Value table, arrays of
/// records as their own tables, nested objects (e.g. per-currency results)
/// as titled sections.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(result) = map.get("result") {
                print_section("result", result, 0);
                print_envelope(map);
            } else {
                print_section("", value, 0);
            }
        }
        Value::Array(arr) => print_records(arr),
        _ => println!("{}", value),
    }
}

fn print_envelope(envelope: &Map<String, Value>) {
    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings {
                if let Value::String(s) = w {
                    println!("  - {}", s);
                }
            }
        }
    }
    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

fn print_section(title: &str, value: &Value, depth: usize) {
    match value {
        Value::Object(map) => {
            let mut rows = Vec::new();
            let mut nested = Vec::new();
            for (key, val) in map {
                if depth < MAX_DEPTH && is_section(val) {
                    nested.push((key, val));
                } else {
                    rows.push([key.clone(), format_value(val)]);
                }
            }
            if !rows.is_empty() {
                print_title(title);
                let mut builder = Builder::default();
                builder.push_record(["Field", "Value"]);
                for row in rows {
                    builder.push_record(row);
                }
                println!("{}", Table::from(builder));
            }
            for (key, val) in nested {
                print_section(&join_title(title, key), val, depth + 1);
            }
        }
        Value::Array(arr) => {
            print_title(title);
            print_records(arr);
        }
        _ => {
            print_title(title);
            println!("{}", format_value(value));
        }
    }
}

fn is_section(value: &Value) -> bool {
    match value {
        Value::Object(map) => !map.is_empty(),
        Value::Array(arr) => arr.first().is_some_and(Value::is_object),
        _ => false,
    }
}

fn print_records(arr: &[Value]) {
    if arr.is_empty() {
        println!("(empty)");
        return;
    }

    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<String> = first.keys().cloned().collect();
        let mut builder = Builder::default();
        builder.push_record(&headers);
        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(h.as_str()).map(format_value).unwrap_or_default())
                    .collect();
                builder.push_record(row);
            }
        }
        println!("{}", Table::from(builder));
    } else {
        for item in arr {
            println!("{}", format_value(item));
        }
    }
}

fn print_title(title: &str) {
    if !title.is_empty() {
        println!("\n[{}]", title);
    }
}

fn join_title(parent: &str, key: &str) -> String {
    if parent.is_empty() || parent == "result" {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "-".to_string(),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(format_value).collect();
            items.join(", ")
        }
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
