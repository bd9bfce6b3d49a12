use serde::{Deserialize, Serialize};

/// `{ success, data?, error?, count? }`, returned by every route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None, count: None }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(error.into()), count: None }
    }
}

impl<T> Envelope<Vec<T>> {
    pub fn list(items: Vec<T>) -> Self {
        let count = items.len();
        Self { success: true, data: Some(items), error: None, count: Some(count) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_fields_are_omitted() {
        assert_eq!(serde_json::to_value(Envelope::ok(1)).unwrap(), json!({"success": true, "data": 1}));
        assert_eq!(
            serde_json::to_value(Envelope::<()>::failure("nope")).unwrap(),
            json!({"success": false, "error": "nope"})
        );
    }

    #[test]
    fn lists_carry_a_count() {
        let value = serde_json::to_value(Envelope::list(vec!["a", "b"])).unwrap();
        assert_eq!(value, json!({"success": true, "data": ["a", "b"], "count": 2}));
    }
}
