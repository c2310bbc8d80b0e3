//! Serde helpers for configuration deserialization

use chain_types::ChainId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;

/// Deserializes a `HashMap<ChainId, T>` from a table keyed by decimal strings.
///
/// TOML and JSON only allow string keys, so `[chains.1]` arrives as `"1"`.
pub fn deserialize_chain_id_map<'de, D, T>(
	deserializer: D,
) -> Result<HashMap<ChainId, T>, D::Error>
where
	D: Deserializer<'de>,
	T: Deserialize<'de>,
{
	let map = HashMap::<String, T>::deserialize(deserializer)?;

	map.into_iter()
		.map(|(k, v)| {
			k.parse::<ChainId>()
				.map(|id| (id, v))
				.map_err(|_| serde::de::Error::custom(format!("Invalid chain ID: {}", k)))
		})
		.collect()
}

/// Serializes a `HashMap<ChainId, T>` with decimal string keys.
pub fn serialize_chain_id_map<S, T>(
	map: &HashMap<ChainId, T>,
	serializer: S,
) -> Result<S::Ok, S::Error>
where
	S: Serializer,
	T: Serialize,
{
	let string_map: HashMap<String, &T> = map.iter().map(|(k, v)| (k.to_string(), v)).collect();

	string_map.serialize(serializer)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Debug, Serialize, Deserialize)]
	struct Wrapper {
		#[serde(
			serialize_with = "serialize_chain_id_map",
			deserialize_with = "deserialize_chain_id_map"
		)]
		map: HashMap<ChainId, String>,
	}

	#[test]
	fn test_chain_id_keys_from_json() {
		let wrapper: Wrapper =
			serde_json::from_str(r#"{"map": {"1": "mainnet", "10": "optimism"}}"#).unwrap();
		assert_eq!(wrapper.map.get(&ChainId(1)).unwrap(), "mainnet");
		assert_eq!(wrapper.map.get(&ChainId(10)).unwrap(), "optimism");

		let json = serde_json::to_value(&wrapper).unwrap();
		assert_eq!(json["map"]["10"], "optimism");
	}

	#[test]
	fn test_invalid_chain_id_key() {
		let result = serde_json::from_str::<Wrapper>(r#"{"map": {"mainnet": "x"}}"#);
		let err = result.unwrap_err().to_string();
		assert!(err.contains("Invalid chain ID: mainnet"));
	}
}
