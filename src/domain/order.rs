use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File name of the seed order shipped with a fresh install.
pub const SEED_ORDER_FILE: &str = "blank.png";
const SEED_ORDER_REASON: &str = "First orders";
const SEED_ORDER_DATE_MS: i64 = 1_648_890_843_309;

/// A committed painting target. Never mutated after commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Name of the stored image under the maps directory
    #[serde(rename = "file")]
    pub file_ref: String,
    pub reason: String,
    /// Commit time in unix milliseconds
    #[serde(rename = "date")]
    pub submitted_at: i64,
}

impl Order {
    pub fn new(file_ref: impl Into<String>, reason: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            file_ref: file_ref.into(),
            reason: reason.into(),
            submitted_at: at.timestamp_millis(),
        }
    }

    pub fn seed() -> Self {
        Self {
            file_ref: SEED_ORDER_FILE.to_string(),
            reason: SEED_ORDER_REASON.to_string(),
            submitted_at: SEED_ORDER_DATE_MS,
        }
    }

    /// Stored file name for an order accepted at `at`.
    pub fn file_name_for(at: DateTime<Utc>) -> String {
        format!("{}.png", at.timestamp_millis())
    }
}

/// On-disk form of the order history (`data.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderHistory {
    pub current_map: String,
    pub map_history: Vec<Order>,
}

impl OrderHistory {
    pub fn seeded() -> Self {
        let seed = Order::seed();
        Self {
            current_map: seed.file_ref.clone(),
            map_history: vec![seed],
        }
    }

    /// The entry `current_map` points at, or the newest one when the pointer
    /// is dangling.
    pub fn current(&self) -> Option<&Order> {
        self.map_history
            .iter()
            .rev()
            .find(|o| o.file_ref == self.current_map)
            .or_else(|| self.map_history.last())
    }

    /// New history with `order` appended and the pointer moved to it.
    pub fn with_appended(&self, order: Order) -> Self {
        let mut next = self.clone();
        next.current_map = order.file_ref.clone();
        next.map_history.push(order);
        next
    }

    pub fn len(&self) -> usize {
        self.map_history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map_history.is_empty()
    }
}

impl Default for OrderHistory {
    fn default() -> Self {
        Self::seeded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_persisted_schema_field_names() {
        let history = OrderHistory::seeded();
        let json = serde_json::to_value(&history).unwrap();
        assert_eq!(json["currentMap"], "blank.png");
        assert_eq!(json["mapHistory"][0]["file"], "blank.png");
        assert_eq!(json["mapHistory"][0]["reason"], "First orders");
        assert_eq!(json["mapHistory"][0]["date"], 1_648_890_843_309_i64);
    }

    #[test]
    fn test_reads_legacy_data_file() {
        let raw = r#"{"currentMap":"1.png","mapHistory":[
            {"file":"blank.png","reason":"First orders","date":1648890843309},
            {"file":"1.png","reason":"heart","date":1648890900000}]}"#;
        let history: OrderHistory = serde_json::from_str(raw).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.current().unwrap().reason, "heart");
    }

    #[test]
    fn test_with_appended_moves_pointer() {
        let history = OrderHistory::seeded();
        let at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let order = Order::new(Order::file_name_for(at), "test", at);
        let next = history.with_appended(order.clone());

        assert_eq!(next.current(), Some(&order));
        assert_eq!(next.map_history.last(), Some(&order));
        assert_eq!(next.len(), history.len() + 1);
        assert_eq!(order.file_ref, "1700000000000.png");
    }
}
