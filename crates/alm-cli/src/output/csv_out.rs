use serde_json::Value;
use std::collections::HashMap;
use std::io;

/// Write output as CSV to stdout.
///
/// Object results become `field,value` rows with dotted paths
/// (`by_currency.RUB.horizon_days`); array results become one row per
/// record with flattened columns.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    let body = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    match body {
        Value::Array(arr) => write_records(&mut wtr, arr),
        Value::Object(_) => {
            let _ = wtr.write_record(["field", "value"]);
            let mut rows = Vec::new();
            flatten("", body, &mut rows);
            for (key, val) in rows {
                let _ = wtr.write_record([key, val]);
            }
        }
        _ => {
            let _ = wtr.write_record([format_csv_value(body)]);
        }
    }

    let _ = wtr.flush();
}

fn write_records(wtr: &mut csv::Writer<io::StdoutLock<'_>>, arr: &[Value]) {
    let rows: Vec<Vec<(String, String)>> = arr
        .iter()
        .map(|item| {
            let mut row = Vec::new();
            flatten("", item, &mut row);
            row
        })
        .collect();
    let Some(first) = rows.first() else {
        return;
    };

    let headers: Vec<&str> = first.iter().map(|(k, _)| k.as_str()).collect();
    let _ = wtr.write_record(&headers);
    for row in &rows {
        let lookup: HashMap<&str, &str> = row.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let record: Vec<&str> = headers
            .iter()
            .map(|h| lookup.get(h).copied().unwrap_or_default())
            .collect();
        let _ = wtr.write_record(&record);
    }
}

fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    let key = |k: &str| {
        if prefix.is_empty() {
            k.to_string()
        } else {
            format!("{}.{}", prefix, k)
        }
    };
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                flatten(&key(k), v, out);
            }
        }
        Value::Array(arr) if arr.iter().any(|v| v.is_object()) => {
            for (i, v) in arr.iter().enumerate() {
                flatten(&key(&i.to_string()), v, out);
            }
        }
        _ => out.push((prefix.to_string(), format_csv_value(value))),
    }
}

fn format_csv_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(arr) => arr.iter().map(format_csv_value).collect::<Vec<_>>().join(";"),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
