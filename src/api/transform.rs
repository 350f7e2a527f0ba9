use serde_json::{Map, Value};

/// One output field: its name and how to read it from a record.
pub struct Field<T> {
    pub name: &'static str,
    pub extract: fn(&T) -> Value,
}

impl<T> Field<T> {
    pub const fn new(name: &'static str, extract: fn(&T) -> Value) -> Self {
        Self { name, extract }
    }
}

/// One JSON object per record, holding exactly `fields` in the given order.
pub fn project<T>(records: &[T], fields: &[Field<T>]) -> Vec<Value> {
    records.iter().map(|record| project_one(record, fields)).collect()
}

pub fn project_one<T>(record: &T, fields: &[Field<T>]) -> Value {
    let mut object = Map::with_capacity(fields.len());
    for field in fields {
        object.insert(field.name.to_string(), (field.extract)(record));
    }
    Value::Object(object)
}

/// Option lists for selects: `{id, title}`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Choice {
    pub id: i64,
    pub title: String,
}

pub fn choices<T>(records: &[T], id: fn(&T) -> i64, title: fn(&T) -> String) -> Vec<Choice> {
    records.iter().map(|r| Choice { id: id(r), title: title(r) }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Row {
        id: i64,
        first: &'static str,
        last: &'static str,
    }

    #[test]
    fn projection_keeps_field_order_and_count() {
        let rows = [Row { id: 2, first: "Ada", last: "Lovelace" }, Row { id: 3, first: "Alan", last: "Turing" }];
        let fields = [
            Field::new("title", |r: &Row| json!(format!("{} {}", r.first, r.last))),
            Field::new("id", |r: &Row| json!(r.id)),
        ];
        let projected = project(&rows, &fields);
        assert_eq!(projected.len(), 2);
        assert_eq!(projected[0], json!({ "title": "Ada Lovelace", "id": 2 }));
        let keys: Vec<_> = projected[1].as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["title", "id"]);
    }

    #[test]
    fn choices_pair_id_with_title() {
        let rows = [Row { id: 7, first: "Kenya", last: "" }];
        assert_eq!(choices(&rows, |r| r.id, |r| r.first.to_string()), vec![Choice { id: 7, title: "Kenya".into() }]);
    }
}
