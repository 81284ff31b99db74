//! Payload classification and canonical comparison forms.
//!
//! Persisted values are usually serialized state envelopes:
//!
//! ```json
//! { "state": { ..., "lastUpdateTime": 1700000000000, "_hasHydrated": true }, "version": 3 }
//! ```
//!
//! The timestamp and hydration flag change on every snapshot without the
//! meaningful state changing. The [`Normalizer`] strips them from a copy of
//! the parsed value so two snapshots can be compared for equivalence.

use serde_json::{Map, Value};

/// Monotonic timestamp attached to every snapshot.
pub const LAST_UPDATE_TIME: &str = "lastUpdateTime";

/// One-shot flag set once a snapshot has been loaded back.
pub const HAS_HYDRATED: &str = "_hasHydrated";

/// A value handed to `set_item`, classified once before deduplication.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload<'a> {
    /// The value parsed as JSON.
    Json(Envelope),
    /// The value is not JSON and is written through untouched.
    Opaque(&'a str),
}

impl<'a> Payload<'a> {
    pub fn parse(raw: &'a str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Payload::Json(Envelope::new(value)),
            Err(_) => Payload::Opaque(raw),
        }
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self, Payload::Opaque(_))
    }
}

/// Parsed JSON payload with typed access to the envelope fields.
///
/// Any JSON document is accepted; accessors return `None` when the document
/// does not have the envelope shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    root: Value,
}

impl Envelope {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    /// The top-level `state` object.
    pub fn state(&self) -> Option<&Map<String, Value>> {
        self.root.get("state").and_then(Value::as_object)
    }

    /// The top-level `version` number.
    pub fn version(&self) -> Option<u64> {
        self.root.get("version").and_then(Value::as_u64)
    }

    /// `state.lastUpdateTime`.
    pub fn last_update_time(&self) -> Option<f64> {
        self.state()
            .and_then(|s| s.get(LAST_UPDATE_TIME))
            .and_then(Value::as_f64)
    }

    /// `state._hasHydrated`.
    pub fn has_hydrated(&self) -> Option<bool> {
        self.state()
            .and_then(|s| s.get(HAS_HYDRATED))
            .and_then(Value::as_bool)
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }
}

/// Serialized normalized value. Two payloads are equivalent iff their
/// canonical forms are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalForm(String);

impl CanonicalForm {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Strips volatile `state.*` fields for comparison.
#[derive(Debug, Clone)]
pub struct Normalizer {
    volatile_fields: Vec<String>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new([LAST_UPDATE_TIME, HAS_HYDRATED])
    }
}

impl Normalizer {
    pub fn new<I, S>(volatile_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            volatile_fields: volatile_fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn volatile_fields(&self) -> &[String] {
        &self.volatile_fields
    }

    /// Deep copy of `value` with the volatile fields removed from its
    /// top-level `state` object. The input is never modified.
    ///
    /// Integral floats are rewritten as integers (`1.0` becomes `1`), so
    /// numbers compare the way they serialize in JavaScript.
    pub fn normalize(&self, value: &Value) -> Value {
        let mut copy = value.clone();
        if let Some(state) = copy.get_mut("state").and_then(Value::as_object_mut) {
            for field in &self.volatile_fields {
                state.remove(field);
            }
        }
        unify_numbers(&mut copy);
        copy
    }

    pub fn canonical(&self, envelope: &Envelope) -> CanonicalForm {
        // Serializing a Value cannot fail: keys are always strings.
        CanonicalForm(self.normalize(envelope.as_value()).to_string())
    }

    pub fn equivalent(&self, a: &Envelope, b: &Envelope) -> bool {
        self.canonical(a) == self.canonical(b)
    }
}

/// Largest integer an f64 represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

fn unify_numbers(value: &mut Value) {
    match value {
        Value::Number(n) if !n.is_i64() && !n.is_u64() => {
            if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER {
                    *value = Value::from(f as i64);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(unify_numbers),
        Value::Object(map) => map.values_mut().for_each(unify_numbers),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(value: Value) -> Envelope {
        Envelope::new(value)
    }

    #[test]
    fn test_parse_json_and_opaque() {
        assert!(matches!(Payload::parse(r#"{"state":{}}"#), Payload::Json(_)));
        assert!(matches!(Payload::parse("42"), Payload::Json(_)));
        assert!(matches!(Payload::parse("\"text\""), Payload::Json(_)));

        let opaque = Payload::parse("not-json");
        assert!(opaque.is_opaque());
        assert_eq!(opaque, Payload::Opaque("not-json"));
        assert!(Payload::parse("").is_opaque());
    }

    #[test]
    fn test_envelope_accessors() {
        let env = envelope(json!({
            "state": { "theme": "dark", "lastUpdateTime": 1700.5, "_hasHydrated": true },
            "version": 3
        }));
        assert_eq!(env.version(), Some(3));
        assert_eq!(env.last_update_time(), Some(1700.5));
        assert_eq!(env.has_hydrated(), Some(true));
        assert_eq!(env.state().unwrap().get("theme"), Some(&json!("dark")));

        let bare = envelope(json!([1, 2, 3]));
        assert!(bare.state().is_none());
        assert!(bare.version().is_none());
        assert!(bare.last_update_time().is_none());
        assert!(bare.has_hydrated().is_none());
    }

    #[test]
    fn test_normalize_strips_volatile_fields() {
        let normalizer = Normalizer::default();
        let value = json!({
            "state": { "a": 1, "lastUpdateTime": 100, "_hasHydrated": false },
            "version": 1
        });

        let normalized = normalizer.normalize(&value);
        assert_eq!(normalized, json!({ "state": { "a": 1 }, "version": 1 }));

        // Source untouched
        assert_eq!(value["state"]["lastUpdateTime"], json!(100));
        assert_eq!(value["state"]["_hasHydrated"], json!(false));
    }

    #[test]
    fn test_normalize_only_touches_state() {
        let normalizer = Normalizer::default();
        let value = json!({ "lastUpdateTime": 5, "other": { "lastUpdateTime": 6 } });
        assert_eq!(normalizer.normalize(&value), value);

        let non_object_state = json!({ "state": [1, 2] });
        assert_eq!(normalizer.normalize(&non_object_state), non_object_state);

        let scalar = json!(7);
        assert_eq!(normalizer.normalize(&scalar), scalar);
    }

    #[test]
    fn test_equivalent_ignores_volatile_fields() {
        let normalizer = Normalizer::default();
        let first = envelope(json!({ "state": { "a": 1, "lastUpdateTime": 100 } }));
        let second = envelope(json!({
            "state": { "a": 1, "lastUpdateTime": 200, "_hasHydrated": true }
        }));
        assert!(normalizer.equivalent(&first, &second));

        let changed = envelope(json!({ "state": { "a": 2, "lastUpdateTime": 100 } }));
        assert!(!normalizer.equivalent(&first, &changed));
    }

    #[test]
    fn test_equivalent_ignores_key_order() {
        let normalizer = Normalizer::default();
        let a = match Payload::parse(r#"{"state":{"a":1,"b":2}}"#) {
            Payload::Json(env) => env,
            Payload::Opaque(_) => panic!("expected JSON"),
        };
        let b = match Payload::parse(r#"{"state":{"b":2,"a":1}}"#) {
            Payload::Json(env) => env,
            Payload::Opaque(_) => panic!("expected JSON"),
        };
        assert_eq!(normalizer.canonical(&a), normalizer.canonical(&b));
    }

    #[test]
    fn test_integral_floats_compare_as_integers() {
        let normalizer = Normalizer::default();
        let ints = match Payload::parse(r#"{"state":{"a":1,"b":[2,{"c":-3}]},"version":1}"#) {
            Payload::Json(env) => env,
            Payload::Opaque(_) => panic!("expected JSON"),
        };
        let floats =
            match Payload::parse(r#"{"state":{"a":1.0,"b":[2.0,{"c":-3.0}]},"version":1.0}"#) {
                Payload::Json(env) => env,
                Payload::Opaque(_) => panic!("expected JSON"),
            };
        assert!(normalizer.equivalent(&ints, &floats));

        let fractional = envelope(json!({ "state": { "a": 1.5 } }));
        assert_eq!(
            normalizer.canonical(&fractional).as_str(),
            r#"{"state":{"a":1.5}}"#
        );
        assert!(!normalizer.equivalent(&ints, &fractional));
    }

    #[test]
    fn test_custom_volatile_fields() {
        let normalizer = Normalizer::new(["syncedAt"]);
        assert_eq!(normalizer.volatile_fields(), ["syncedAt".to_string()]);

        let a = envelope(json!({ "state": { "a": 1, "syncedAt": 1, "lastUpdateTime": 1 } }));
        let b = envelope(json!({ "state": { "a": 1, "syncedAt": 2, "lastUpdateTime": 1 } }));
        let c = envelope(json!({ "state": { "a": 1, "syncedAt": 2, "lastUpdateTime": 2 } }));
        assert!(normalizer.equivalent(&a, &b));
        assert!(!normalizer.equivalent(&b, &c));
    }

    #[test]
    fn test_canonical_form_text() {
        let normalizer = Normalizer::default();
        let env = envelope(json!({ "state": { "a": 1, "_hasHydrated": true } }));
        assert_eq!(normalizer.canonical(&env).as_str(), r#"{"state":{"a":1}}"#);
    }
}
