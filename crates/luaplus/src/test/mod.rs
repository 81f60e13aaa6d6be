#[cfg(feature = "serde")]
pub mod test_json;
pub mod test_object;
