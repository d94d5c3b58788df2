use serde::{Deserialize, Deserializer};

/// Keeps an explicit `null` apart from an absent key.
///
/// Paired with `#[serde(default)]`: a missing key stays `None`, `null` becomes
/// `Some(None)` and any other value becomes `Some(Some(value))`.
pub(crate) fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
