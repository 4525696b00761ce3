//! Serde helpers storing commit IDs as hex strings.

use serde::{Deserialize, Deserializer, Serializer};
use spire_git::Oid;

pub fn serialize<S: Serializer>(oid: &Oid, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&oid.to_string())
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Oid, D::Error> {
    let hex = String::deserialize(deserializer)?;
    Oid::from_str(&hex).map_err(serde::de::Error::custom)
}

/// Same, for optional IDs (`null` when absent).
pub mod option {
    use super::{Deserialize, Deserializer, Oid, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(oid: &Option<Oid>, serializer: S) -> Result<S::Ok, S::Error> {
        match oid {
            Some(oid) => serializer.serialize_some(&oid.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Oid>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|hex| Oid::from_str(&hex).map_err(serde::de::Error::custom))
            .transpose()
    }
}
