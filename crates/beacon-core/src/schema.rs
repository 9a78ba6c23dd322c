//! Announce payload schema — validation, legacy repair, and typed extraction.
//!
//! An announce arrives as a JSON object. Validation walks a fixed field
//! table in declaration order, so the first error reported for a given
//! payload is the same on every run. Legacy payloads get exactly one repair
//! per field kind (numbers-as-strings, booleans-as-strings) before a type
//! mismatch becomes fatal. On success the object has been normalized in
//! place and can be lifted into the typed [`Announce`] struct.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

/// Default port assumed when an announce does not name one.
pub const DEFAULT_PORT: u16 = 30000;

/// Characters that must never reach the published list or the ban table.
/// They would break the line-oriented client protocol downstream.
pub const FORBIDDEN_CHARS: &[char] = &[' ', '\t', '\x0b', '\r', '\n', '\0', '\''];

/// Canonical textual form of a world identifier.
static WORLD_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$").unwrap()
});

// ── Field table ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Str,
    Int,
    Float,
    Bool,
    StrList,
}

impl FieldKind {
    fn name(self) -> &'static str {
        match self {
            FieldKind::Str => "str",
            FieldKind::Int => "int",
            FieldKind::Float => "float",
            FieldKind::Bool => "bool",
            FieldKind::StrList => "list[str]",
        }
    }
}

struct FieldSpec {
    name: &'static str,
    required: bool,
    kind: FieldKind,
}

const fn field(name: &'static str, required: bool, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        required,
        kind,
    }
}

/// The announce schema. Order is part of the contract: error messages are
/// produced by the first violating field in this order.
static FIELDS: &[FieldSpec] = &[
    field("action", true, FieldKind::Str),
    field("world_uuid", false, FieldKind::Str),
    field("address", false, FieldKind::Str),
    field("port", false, FieldKind::Int),
    field("clients", true, FieldKind::Int),
    field("clients_max", true, FieldKind::Int),
    field("uptime", true, FieldKind::Int),
    field("game_time", true, FieldKind::Int),
    field("lag", false, FieldKind::Float),
    field("clients_list", false, FieldKind::StrList),
    field("mods", false, FieldKind::StrList),
    field("version", true, FieldKind::Str),
    field("proto_min", true, FieldKind::Int),
    field("proto_max", true, FieldKind::Int),
    field("gameid", true, FieldKind::Str),
    field("mapgen", false, FieldKind::Str),
    field("url", false, FieldKind::Str),
    field("privs", false, FieldKind::Str),
    field("name", true, FieldKind::Str),
    field("description", true, FieldKind::Str),
    field("server_id", false, FieldKind::Str),
    field("creative", false, FieldKind::Bool),
    field("dedicated", false, FieldKind::Bool),
    field("damage", false, FieldKind::Bool),
    field("pvp", false, FieldKind::Bool),
    field("password", false, FieldKind::Bool),
    field("rollback", false, FieldKind::Bool),
    field("can_see_far_names", false, FieldKind::Bool),
];

/// Numeric fields that must not be negative.
static NON_NEGATIVE: &[&str] = &[
    "clients",
    "clients_max",
    "uptime",
    "game_time",
    "lag",
    "proto_min",
    "proto_max",
];

/// String fields that are stripped of forbidden characters instead of
/// rejected outright.
static SANITIZED: &[&str] = &["gameid", "mapgen", "version", "privs"];

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("Required field '{0}' is missing.")]
    MissingField(&'static str),

    #[error("Field '{field}' has incorrect type (expected {expected} found {found}).")]
    WrongType {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Entry in field '{field}' has incorrect type (expected {expected}).")]
    WrongElementType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("Field '{0}' must not be negative.")]
    Negative(&'static str),

    #[error("Field 'proto_min' is greater than 'proto_max'.")]
    ProtoRangeInverted,

    #[error("Field 'port' is out of range.")]
    PortOutOfRange,

    #[error("Field 'world_uuid' does not match expected format.")]
    BadWorldId,

    #[error("Entry in field '{0}' is empty or contains forbidden characters.")]
    BadListEntry(&'static str),

    #[error("Field 'action' is invalid or missing.")]
    BadAction,
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

// ── Action ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Update,
    Delete,
}

impl Action {
    /// Read the action field out of a raw announce object.
    pub fn from_object(obj: &Map<String, Value>) -> Result<Action, SchemaError> {
        match obj.get("action").and_then(Value::as_str) {
            Some("start") => Ok(Action::Start),
            Some("update") => Ok(Action::Update),
            Some("delete") => Ok(Action::Delete),
            _ => Err(SchemaError::BadAction),
        }
    }
}

// ── Validation ────────────────────────────────────────────────────────────────

/// Validate an announce object against the schema and normalize it in place.
///
/// Coercions applied: string-typed integers are parsed, string-typed
/// booleans accept "true"/"1", integers are accepted in float fields,
/// optional string fields sent as "" are removed, a missing port becomes
/// [`DEFAULT_PORT`], and `clients` is recomputed from `clients_list` when
/// the list is present. Fails on the first violation.
pub fn validate_and_normalize(obj: &mut Map<String, Value>) -> Result<(), SchemaError> {
    for spec in FIELDS {
        // Optional string fields sent as empty strings count as absent.
        if !spec.required
            && spec.kind == FieldKind::Str
            && obj.get(spec.name).and_then(Value::as_str) == Some("")
        {
            obj.remove(spec.name);
        }

        let Some(value) = obj.get(spec.name) else {
            if spec.required {
                return Err(SchemaError::MissingField(spec.name));
            }
            continue;
        };

        // Legacy repair: old servers sent some integers and booleans as
        // strings. One coercion per kind, then the type check is strict.
        if let Value::String(s) = value {
            match spec.kind {
                FieldKind::Int => {
                    let parsed: i64 = s.trim().parse().map_err(|_| SchemaError::WrongType {
                        field: spec.name,
                        expected: spec.kind.name(),
                        found: "str",
                    })?;
                    obj.insert(spec.name.to_string(), Value::from(parsed));
                    continue;
                }
                FieldKind::Bool => {
                    let truthy = matches!(s.to_lowercase().as_str(), "true" | "1");
                    obj.insert(spec.name.to_string(), Value::from(truthy));
                    continue;
                }
                _ => {}
            }
        }

        let ok = match spec.kind {
            FieldKind::Str => value.is_string(),
            FieldKind::Int => value.is_i64() || value.is_u64(),
            // Integers are accepted where a float is expected.
            FieldKind::Float => value.is_number(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::StrList => match value.as_array() {
                Some(items) => {
                    if items.iter().any(|i| !i.is_string()) {
                        return Err(SchemaError::WrongElementType {
                            field: spec.name,
                            expected: "str",
                        });
                    }
                    true
                }
                None => false,
            },
        };
        if !ok {
            return Err(SchemaError::WrongType {
                field: spec.name,
                expected: spec.kind.name(),
                found: json_type_name(value),
            });
        }
    }

    for &name in NON_NEGATIVE {
        if let Some(n) = obj.get(name).and_then(Value::as_f64) {
            if n < 0.0 {
                return Err(SchemaError::Negative(name));
            }
        }
    }

    let proto_min = obj.get("proto_min").and_then(Value::as_u64).unwrap_or(0);
    let proto_max = obj.get("proto_max").and_then(Value::as_u64).unwrap_or(0);
    if proto_min > proto_max {
        return Err(SchemaError::ProtoRangeInverted);
    }

    if let Some(port) = obj.get("port").and_then(Value::as_u64) {
        if port == 0 || port > u16::MAX as u64 {
            return Err(SchemaError::PortOutOfRange);
        }
    } else {
        obj.insert("port".into(), Value::from(DEFAULT_PORT));
    }

    if let Some(id) = obj.get("world_uuid").and_then(Value::as_str) {
        if !WORLD_ID_RE.is_match(id) {
            return Err(SchemaError::BadWorldId);
        }
    }

    // A URL that is not absolute http(s) (or scheme-relative) is dropped,
    // not fatal: a broken landing page should not unlist the server.
    if let Some(url) = obj.get("url").and_then(Value::as_str) {
        let well_formed = ["http://", "https://", "//"]
            .iter()
            .any(|p| url.starts_with(p))
            && !url.contains(FORBIDDEN_CHARS);
        if !well_formed {
            obj.remove("url");
        }
    }

    // Player and mod names feed straight into the published list. Reject
    // anything that could smuggle in separators.
    for list_field in ["clients_list", "mods"] {
        let Some(items) = obj.get(list_field).and_then(Value::as_array) else {
            continue;
        };
        for item in items {
            let s = item.as_str().unwrap_or_default();
            if s.is_empty() || s.contains(FORBIDDEN_CHARS) {
                return Err(SchemaError::BadListEntry(list_field));
            }
        }
    }

    if let Some(items) = obj.get("clients_list").and_then(Value::as_array) {
        let count = items.len();
        obj.insert("clients".into(), Value::from(count));
    }

    for &name in SANITIZED {
        if let Some(s) = obj.get(name).and_then(Value::as_str) {
            let cleaned: String = s.chars().filter(|c| !FORBIDDEN_CHARS.contains(c)).collect();
            obj.insert(name.to_string(), Value::from(cleaned));
        }
    }

    Ok(())
}

// ── Typed announce ────────────────────────────────────────────────────────────

/// A validated, normalized announce.
#[derive(Debug, Clone)]
pub struct Announce {
    pub action: Action,
    pub world_id: Option<String>,
    /// Claimed reachable address; the pipeline defaults it to the
    /// announcing IP before validation when the server sent none.
    pub address: String,
    pub port: u16,
    pub clients: u32,
    pub clients_max: u32,
    pub uptime: u64,
    pub game_time: u64,
    pub lag: Option<f64>,
    pub clients_list: Option<Vec<String>>,
    pub mods: Option<Vec<String>>,
    pub version: String,
    pub proto_min: u32,
    pub proto_max: u32,
    pub game_id: String,
    pub mapgen: Option<String>,
    pub url: Option<String>,
    pub default_privs: Option<String>,
    pub name: String,
    pub description: String,
    pub server_id: Option<String>,
    pub creative: bool,
    pub dedicated: bool,
    pub damage: bool,
    pub pvp: bool,
    pub password: bool,
    pub rollback: bool,
    pub can_see_far_names: bool,
}

fn get_str(obj: &Map<String, Value>, name: &str) -> Option<String> {
    obj.get(name).and_then(Value::as_str).map(str::to_owned)
}

fn get_str_list(obj: &Map<String, Value>, name: &str) -> Option<Vec<String>> {
    obj.get(name).and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect()
    })
}

fn get_bool(obj: &Map<String, Value>, name: &str) -> bool {
    obj.get(name).and_then(Value::as_bool).unwrap_or(false)
}

impl Announce {
    /// Validate and lift a raw announce object.
    ///
    /// The caller is expected to have filled in `address` (defaulting to
    /// the announcing IP) beforehand; everything else is checked here.
    pub fn parse(mut obj: Map<String, Value>) -> Result<Announce, SchemaError> {
        let action = Action::from_object(&obj)?;
        validate_and_normalize(&mut obj)?;

        Ok(Announce {
            action,
            world_id: get_str(&obj, "world_uuid"),
            address: get_str(&obj, "address").unwrap_or_default(),
            port: obj
                .get("port")
                .and_then(Value::as_u64)
                .unwrap_or(DEFAULT_PORT as u64) as u16,
            clients: obj.get("clients").and_then(Value::as_u64).unwrap_or(0) as u32,
            clients_max: obj.get("clients_max").and_then(Value::as_u64).unwrap_or(0) as u32,
            uptime: obj.get("uptime").and_then(Value::as_u64).unwrap_or(0),
            game_time: obj.get("game_time").and_then(Value::as_u64).unwrap_or(0),
            lag: obj.get("lag").and_then(Value::as_f64),
            clients_list: get_str_list(&obj, "clients_list"),
            mods: get_str_list(&obj, "mods"),
            version: get_str(&obj, "version").unwrap_or_default(),
            proto_min: obj.get("proto_min").and_then(Value::as_u64).unwrap_or(0) as u32,
            proto_max: obj.get("proto_max").and_then(Value::as_u64).unwrap_or(0) as u32,
            game_id: get_str(&obj, "gameid").unwrap_or_default(),
            mapgen: get_str(&obj, "mapgen"),
            url: get_str(&obj, "url"),
            default_privs: get_str(&obj, "privs"),
            name: get_str(&obj, "name").unwrap_or_default(),
            description: get_str(&obj, "description").unwrap_or_default(),
            server_id: get_str(&obj, "server_id"),
            creative: get_bool(&obj, "creative"),
            dedicated: get_bool(&obj, "dedicated"),
            damage: get_bool(&obj, "damage"),
            pvp: get_bool(&obj, "pvp"),
            password: get_bool(&obj, "password"),
            rollback: get_bool(&obj, "rollback"),
            can_see_far_names: get_bool(&obj, "can_see_far_names"),
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> Map<String, Value> {
        serde_json::from_str(
            r#"{
                "action": "start",
                "address": "203.0.113.5",
                "clients": 3,
                "clients_max": 10,
                "uptime": 0,
                "game_time": 0,
                "version": "5.9.0",
                "proto_min": 37,
                "proto_max": 42,
                "gameid": "minetest",
                "name": "Test Server",
                "description": "A test server."
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn minimal_start_parses() {
        let ann = Announce::parse(minimal()).unwrap();
        assert_eq!(ann.action, Action::Start);
        assert_eq!(ann.port, DEFAULT_PORT);
        assert_eq!(ann.clients, 3);
        assert!(ann.world_id.is_none());
    }

    #[test]
    fn missing_required_field_is_named() {
        let mut obj = minimal();
        obj.remove("clients_max");
        let err = validate_and_normalize(&mut obj).unwrap_err();
        assert_eq!(err, SchemaError::MissingField("clients_max"));
        assert_eq!(
            err.to_string(),
            "Required field 'clients_max' is missing."
        );
    }

    #[test]
    fn error_order_is_deterministic() {
        // Two violations: the earlier field in the table wins, every time.
        let mut obj = minimal();
        obj.remove("clients");
        obj.remove("version");
        for _ in 0..10 {
            let err = validate_and_normalize(&mut obj.clone()).unwrap_err();
            assert_eq!(err, SchemaError::MissingField("clients"));
        }
    }

    #[test]
    fn legacy_port_string_is_coerced() {
        let mut obj = minimal();
        obj.insert("port".into(), Value::from("30001"));
        validate_and_normalize(&mut obj).unwrap();
        assert_eq!(obj.get("port").unwrap(), &Value::from(30001));
    }

    #[test]
    fn legacy_bool_string_is_coerced() {
        let mut obj = minimal();
        obj.insert("creative".into(), Value::from("true"));
        obj.insert("damage".into(), Value::from("0"));
        validate_and_normalize(&mut obj).unwrap();
        assert_eq!(obj.get("creative").unwrap(), &Value::Bool(true));
        assert_eq!(obj.get("damage").unwrap(), &Value::Bool(false));
    }

    #[test]
    fn unparseable_int_string_fails_with_type_error() {
        let mut obj = minimal();
        obj.insert("clients".into(), Value::from("lots"));
        let err = validate_and_normalize(&mut obj).unwrap_err();
        assert!(matches!(err, SchemaError::WrongType { field: "clients", .. }));
    }

    #[test]
    fn inverted_proto_range_is_rejected() {
        let mut obj = minimal();
        obj.insert("proto_min".into(), Value::from(43));
        let err = validate_and_normalize(&mut obj).unwrap_err();
        assert_eq!(err, SchemaError::ProtoRangeInverted);
    }

    #[test]
    fn negative_number_is_rejected() {
        let mut obj = minimal();
        obj.insert("game_time".into(), Value::from(-1));
        let err = validate_and_normalize(&mut obj).unwrap_err();
        assert_eq!(err, SchemaError::Negative("game_time"));
    }

    #[test]
    fn integer_lag_is_accepted() {
        let mut obj = minimal();
        obj.insert("lag".into(), Value::from(2));
        validate_and_normalize(&mut obj).unwrap();
    }

    #[test]
    fn bad_url_is_dropped_not_fatal() {
        let mut obj = minimal();
        obj.insert("url".into(), Value::from("ftp://example.net/world"));
        validate_and_normalize(&mut obj).unwrap();
        assert!(!obj.contains_key("url"));
    }

    #[test]
    fn good_url_is_kept() {
        let mut obj = minimal();
        obj.insert("url".into(), Value::from("https://example.net/world"));
        validate_and_normalize(&mut obj).unwrap();
        assert!(obj.contains_key("url"));
    }

    #[test]
    fn empty_optional_string_is_removed() {
        let mut obj = minimal();
        obj.insert("mapgen".into(), Value::from(""));
        validate_and_normalize(&mut obj).unwrap();
        assert!(!obj.contains_key("mapgen"));
    }

    #[test]
    fn clients_recomputed_from_list() {
        let mut obj = minimal();
        obj.insert(
            "clients_list".into(),
            serde_json::json!(["alice", "bob"]),
        );
        validate_and_normalize(&mut obj).unwrap();
        assert_eq!(obj.get("clients").unwrap(), &Value::from(2));
    }

    #[test]
    fn client_name_with_forbidden_chars_is_fatal() {
        let mut obj = minimal();
        obj.insert(
            "clients_list".into(),
            serde_json::json!(["alice", "bad name"]),
        );
        let err = validate_and_normalize(&mut obj).unwrap_err();
        assert_eq!(err, SchemaError::BadListEntry("clients_list"));
    }

    #[test]
    fn gameid_is_sanitized_in_place() {
        let mut obj = minimal();
        obj.insert("gameid".into(), Value::from("mine\ttest'"));
        validate_and_normalize(&mut obj).unwrap();
        assert_eq!(obj.get("gameid").unwrap(), &Value::from("minetest"));
    }

    #[test]
    fn world_id_format_is_enforced() {
        let mut obj = minimal();
        obj.insert("world_uuid".into(), Value::from("not-a-uuid"));
        let err = validate_and_normalize(&mut obj).unwrap_err();
        assert_eq!(err, SchemaError::BadWorldId);

        let mut obj = minimal();
        obj.insert(
            "world_uuid".into(),
            Value::from("01234567-89ab-cdef-0123-456789abcdef"),
        );
        validate_and_normalize(&mut obj).unwrap();
    }

    #[test]
    fn list_element_type_is_checked() {
        let mut obj = minimal();
        obj.insert("mods".into(), serde_json::json!(["tnt", 7]));
        let err = validate_and_normalize(&mut obj).unwrap_err();
        assert_eq!(
            err,
            SchemaError::WrongElementType {
                field: "mods",
                expected: "str"
            }
        );
    }
}
