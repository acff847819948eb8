use serde_json::Value;

/// Headline figures, looked up in this order.
const PRIORITY_KEYS: [&str; 8] = [
    "overall_horizon_days",
    "min_survival_horizon_days",
    "total_nii_impact",
    "total_change",
    "net_position",
    "unassigned",
    "instruments",
    "comparison",
];

/// Print just the headline value of a calculation.
pub fn print_minimal(value: &Value) {
    let result = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    match result {
        // Scenario comparison: one line per scenario
        Value::Array(rows) => {
            for row in rows {
                let name = row.get("name").map(format_minimal).unwrap_or_default();
                let horizon = row
                    .get("min_survival_horizon_days")
                    .map(format_minimal)
                    .unwrap_or_default();
                println!("{}: {}", name, horizon);
            }
        }
        Value::Object(map) => {
            for key in PRIORITY_KEYS {
                if let Some(val) = map.get(key).filter(|v| !v.is_null()) {
                    println!("{}", format_minimal(val));
                    return;
                }
            }
            if let Some((key, val)) = map.iter().next() {
                println!("{}: {}", key, format_minimal(val));
            }
        }
        _ => println!("{}", format_minimal(result)),
    }
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(arr) => arr.len().to_string(),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
