use serde::{Deserialize, Deserializer, Serialize};

/// Uploaded media reference stored with a loan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub secure_url: Option<String>,
    pub public_id: Option<String>,
}

/// Image list that also accepts a single object (or null) on the wire and in storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ImageList(pub Vec<ImageRef>);

impl<'de> Deserialize<'de> for ImageList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum OneOrMany {
            Many(Vec<ImageRef>),
            One(ImageRef),
            Nothing(()),
        }

        Ok(match OneOrMany::deserialize(deserializer)? {
            OneOrMany::Many(images) => ImageList(images),
            OneOrMany::One(image) => ImageList(vec![image]),
            OneOrMany::Nothing(()) => ImageList::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_array() {
        let list: ImageList = serde_json::from_value(json!([
            { "secure_url": "https://cdn/a.jpg", "public_id": "a" },
            { "secure_url": "https://cdn/b.jpg", "public_id": "b" }
        ]))
        .unwrap();
        assert_eq!(list.0.len(), 2);
        assert_eq!(list.0[1].public_id.as_deref(), Some("b"));
    }

    #[test]
    fn wraps_single_object() {
        let list: ImageList =
            serde_json::from_value(json!({ "secure_url": "https://cdn/a.jpg", "public_id": "a" })).unwrap();
        assert_eq!(list.0, vec![ImageRef { secure_url: Some("https://cdn/a.jpg".into()), public_id: Some("a".into()) }]);
    }

    #[test]
    fn null_is_empty() {
        let list: ImageList = serde_json::from_value(json!(null)).unwrap();
        assert!(list.0.is_empty());
    }

    #[test]
    fn serializes_as_plain_array() {
        let list = ImageList(vec![ImageRef { secure_url: None, public_id: Some("x".into()) }]);
        assert_eq!(serde_json::to_value(&list).unwrap(), json!([{ "secure_url": null, "public_id": "x" }]));
    }
}
