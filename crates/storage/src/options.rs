use elgg_core::OrderBy;
use serde_json::Value;

use crate::error::StorageError;
use crate::query::{JoinKind, Predicate};

/// One entry of an order_by list.
#[derive(Debug, Clone)]
pub enum OrderItem {
    Spec(OrderBy),
    /// `"expr"` or `"expr DIR"`.
    Text(String),
}

/// The `order_by` option as callers supply it.
#[derive(Debug, Clone)]
pub enum OrderOption {
    /// Comma-separated list, e.g. `"e.guid, foo DESC"`.
    Text(String),
    List(Vec<OrderItem>),
}

impl OrderOption {
    pub fn resolve(&self) -> Result<Vec<OrderBy>, StorageError> {
        match self {
            Self::Text(text) => split_top_level(text)
                .into_iter()
                .map(|part| Ok(OrderBy::from_string(part)?))
                .collect(),
            Self::List(items) => items
                .iter()
                .map(|item| match item {
                    OrderItem::Spec(spec) => Ok(spec.clone()),
                    OrderItem::Text(text) => Ok(OrderBy::from_string(text)?),
                })
                .collect(),
        }
    }
}

impl TryFrom<&Value> for OrderOption {
    type Error = StorageError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(s) => Ok(Self::Text(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(order_item_from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(Self::List),
            other => Err(StorageError::InvalidArgument(format!(
                "order_by must be a string or a list, got {other}"
            ))),
        }
    }
}

fn order_item_from_json(value: &Value) -> Result<OrderItem, StorageError> {
    match value {
        Value::String(s) => Ok(OrderItem::Text(s.clone())),
        Value::Object(map) => {
            let expression = map
                .get("expression")
                .and_then(Value::as_str)
                .ok_or_else(|| StorageError::InvalidArgument("order_by item needs an expression".into()))?;
            let direction = map.get("direction").and_then(Value::as_str).unwrap_or("ASC");
            Ok(OrderItem::Spec(OrderBy::new(expression, direction)?))
        }
        other => Err(StorageError::InvalidArgument(format!(
            "unsupported order_by item: {other}"
        ))),
    }
}

/// Split on commas outside parentheses and quotes.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (idx, ch) in text.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(ch),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(&text[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

#[derive(Debug, Clone)]
pub struct JoinSpec {
    pub kind: JoinKind,
    /// Table name, `"{name}"` to prefix.
    pub table: String,
    pub alias: String,
    pub on: Predicate,
}

/// Listing options accepted by entity queries. Modifiers append to these
/// before the query is built.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub joins: Vec<JoinSpec>,
    pub wheres: Vec<Predicate>,
    pub order_by: Option<OrderOption>,
    pub limit: Option<u64>,
    pub offset: u64,
}

impl QueryOptions {
    /// Put `order` in front of whatever ordering is already present.
    pub fn prepend_order(&mut self, order: OrderBy, default: &str) -> Result<(), StorageError> {
        let mut resolved = match &self.order_by {
            Some(existing) => existing.resolve()?,
            None => Vec::new(),
        };
        if resolved.is_empty() {
            resolved = OrderOption::Text(default.to_string()).resolve()?;
        }
        let mut items = Vec::with_capacity(resolved.len() + 1);
        items.push(OrderItem::Spec(order));
        items.extend(resolved.into_iter().map(OrderItem::Spec));
        self.order_by = Some(OrderOption::List(items));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elgg_core::Direction;
    use serde_json::json;

    fn rendered(option: &OrderOption) -> Vec<String> {
        option.resolve().unwrap().iter().map(|o| o.to_string()).collect()
    }

    #[test]
    fn text_option_splits_on_top_level_commas() {
        let option = OrderOption::Text("COALESCE(a, b) desc, e.guid".into());
        assert_eq!(rendered(&option), vec!["COALESCE(a, b) DESC", "e.guid ASC"]);
    }

    #[test]
    fn json_option_accepts_strings_and_objects() {
        let value = json!(["e.time_created desc", {"expression": "e.guid", "direction": "DESC"}]);
        let option = OrderOption::try_from(&value).unwrap();
        assert_eq!(rendered(&option), vec!["e.time_created DESC", "e.guid DESC"]);

        let option = OrderOption::try_from(&json!("e.guid")).unwrap();
        assert_eq!(option.resolve().unwrap()[0].direction(), Direction::Asc);
    }

    #[test]
    fn json_option_rejects_other_shapes() {
        assert!(OrderOption::try_from(&json!(42)).is_err());
        assert!(OrderOption::try_from(&json!([{"direction": "ASC"}])).is_err());
        assert!(OrderOption::try_from(&json!([{"expression": "a", "direction": "sideways"}])).is_err());
    }

    #[test]
    fn prepend_falls_back_to_default_order() {
        let mut options = QueryOptions::default();
        options
            .prepend_order(OrderBy::desc("-ci1.id").unwrap(), "e.time_created DESC, e.guid DESC")
            .unwrap();
        let order = options.order_by.as_ref().unwrap();
        assert_eq!(
            rendered(order),
            vec!["-ci1.id DESC", "e.time_created DESC", "e.guid DESC"]
        );
    }
}
