use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<FieldValue>),
    Object(BTreeMap<String, FieldValue>),
}

pub type FieldMap = BTreeMap<String, FieldValue>;

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Display text for scalar values; `None` for null, empty strings, lists and objects.
    pub fn scalar_text(&self) -> Option<String> {
        match self {
            FieldValue::String(s) if !s.trim().is_empty() => Some(s.clone()),
            FieldValue::Number(n) if n.fract() == 0.0 => Some(format!("{}", *n as i64)),
            FieldValue::Number(n) => Some(n.to_string()),
            FieldValue::Bool(true) => Some("true".into()),
            _ => None,
        }
    }
}

pub fn normalize_field_key(key: &str) -> Option<String> {
    let k = key.trim();
    if k.is_empty() {
        return None;
    }
    Some(k.to_string())
}

pub fn yaml_to_field_value(v: &serde_yaml::Value) -> FieldValue {
    match v {
        serde_yaml::Value::Null => FieldValue::Null,
        serde_yaml::Value::Bool(b) => FieldValue::Bool(*b),
        serde_yaml::Value::Number(n) => FieldValue::Number(n.as_f64().unwrap_or(0.0)),
        serde_yaml::Value::String(s) => FieldValue::String(s.clone()),
        serde_yaml::Value::Sequence(seq) => {
            FieldValue::List(seq.iter().map(yaml_to_field_value).collect())
        }
        serde_yaml::Value::Mapping(map) => {
            let mut out = BTreeMap::new();
            for (k, v) in map {
                let Some(k) = k.as_str().and_then(normalize_field_key) else {
                    continue;
                };
                out.insert(k, yaml_to_field_value(v));
            }
            FieldValue::Object(out)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_field_value(&tagged.value),
    }
}

pub fn extract_top_level_frontmatter_fields(fm: &serde_yaml::Mapping) -> FieldMap {
    let mut out = FieldMap::new();
    for (k, v) in fm {
        let Some(key) = k.as_str().and_then(normalize_field_key) else {
            continue;
        };
        out.insert(key, yaml_to_field_value(v));
    }
    out
}
