//! JSON canónico: claves ordenadas, sin espacios. Base de los `params_hash`
//! de las políticas.

use serde_json::Value;

pub fn to_canonical_json(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(to_canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let items: Vec<String> = keys.into_iter()
                                         .map(|k| format!("{}:{}", quote(k), to_canonical_json(&map[k])))
                                         .collect();
            format!("{{{}}}", items.join(","))
        }
    }
}

// Serializar un &str a JSON no puede fallar.
fn quote(s: &str) -> String { Value::String(s.to_owned()).to_string() }

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_are_sorted_recursively() {
        let v = json!({"b": 1, "a": {"z": [1, 2], "y": "q\"uote"}});
        assert_eq!(to_canonical_json(&v), r#"{"a":{"y":"q\"uote","z":[1,2]},"b":1}"#);
    }
}
