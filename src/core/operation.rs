use serde_json::Value as Json;
use std::collections::HashMap;

use crate::core::value::{Container, Value};
use crate::error::KvError;

/// The fixed set of base operations every adapter understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Set,
    Get,
    Append,
    Remove,
    Pull,
    Replace,
    Fetch,
    FetchAll,
    Increment,
    Decrement,
    Drop,
}

/// Verb table in match priority order. `fetchAll` sits before `fetch` so the
/// longer verb name wins when both prefix the method string.
const VERB_TABLE: &[(&str, Verb)] = &[
    ("set", Verb::Set),
    ("get", Verb::Get),
    ("append", Verb::Append),
    ("remove", Verb::Remove),
    ("pull", Verb::Pull),
    ("replace", Verb::Replace),
    ("fetchAll", Verb::FetchAll),
    ("fetch", Verb::Fetch),
    ("increment", Verb::Increment),
    ("decrement", Verb::Decrement),
    ("drop", Verb::Drop),
];

impl Verb {
    pub fn name(&self) -> &'static str {
        match self {
            Verb::Set => "set",
            Verb::Get => "get",
            Verb::Append => "append",
            Verb::Remove => "remove",
            Verb::Pull => "pull",
            Verb::Replace => "replace",
            Verb::Fetch => "fetch",
            Verb::FetchAll => "fetchAll",
            Verb::Increment => "increment",
            Verb::Decrement => "decrement",
            Verb::Drop => "drop",
        }
    }

    /// Named parameters each verb maps its positional arguments onto.
    pub fn schema(&self) -> &'static [&'static str] {
        match self {
            Verb::Set | Verb::Append | Verb::Replace => &["value", "expiration"],
            Verb::Get | Verb::Remove | Verb::Pull => &["index"],
            Verb::Fetch => &["count", "offset"],
            Verb::Increment | Verb::Decrement => &["offset"],
            Verb::FetchAll | Verb::Drop => &[],
        }
    }

    /// Split `<verb><KeyName>` into the verb and the remaining key name.
    pub fn split_method(method: &str) -> Result<(Verb, &str), KvError> {
        for (name, verb) in VERB_TABLE {
            if let Some(key_name) = method.strip_prefix(name) {
                return Ok((*verb, key_name));
            }
        }
        Err(KvError::UnknownOperation(method.to_string()))
    }
}

/// Positional arguments resolved against a verb's parameter schema. Unmapped
/// trailing positions are retained in order after the named ones.
#[derive(Debug, Clone, Default)]
pub struct ResolvedArgs {
    named: HashMap<&'static str, Json>,
    extra: Vec<Json>,
}

impl ResolvedArgs {
    pub fn convert(verb: Verb, args: Vec<Json>) -> Self {
        let schema = verb.schema();
        let mut iter = args.into_iter();
        let named = schema
            .iter()
            .map(|name| (*name, iter.next().unwrap_or(Json::Null)))
            .collect();
        Self {
            named,
            extra: iter.collect(),
        }
    }

    /// Named argument, absent when unset or explicitly null.
    pub fn named(&self, name: &str) -> Option<&Json> {
        self.named.get(name).filter(|v| !v.is_null())
    }

    pub fn extra(&self) -> &[Json] {
        &self.extra
    }

    pub fn value(&self, verb: Verb) -> Result<Json, KvError> {
        self.named("value")
            .cloned()
            .ok_or(KvError::MissingArgument {
                verb: verb.name(),
                name: "value",
            })
    }

    pub fn expiration(&self) -> u32 {
        self.named("expiration")
            .and_then(json_index)
            .unwrap_or(0) as u32
    }

    pub fn index(&self, verb: Verb) -> Result<u64, KvError> {
        self.named("index")
            .and_then(json_index)
            .ok_or(KvError::MissingArgument {
                verb: verb.name(),
                name: "index",
            })
    }

    pub fn optional_index(&self) -> Option<u64> {
        self.named("index").and_then(json_index)
    }

    pub fn count(&self, verb: Verb) -> Result<i64, KvError> {
        self.named("count")
            .and_then(json_int)
            .ok_or(KvError::MissingArgument {
                verb: verb.name(),
                name: "count",
            })
    }

    pub fn offset_or(&self, default: i64) -> i64 {
        self.named("offset").and_then(json_int).unwrap_or(default)
    }
}

/// Indices arrive as JSON numbers or numeric strings.
fn json_index(json: &Json) -> Option<u64> {
    match json {
        Json::Number(n) => n.as_u64(),
        Json::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn json_int(json: &Json) -> Option<i64> {
    match json {
        Json::Number(n) => n.as_i64(),
        Json::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// What a dispatched operation hands back. Each verb produces exactly one
/// shape; [`Response::into_json`] flattens it for dynamic callers.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// set / append / remove / replace
    Stored(bool),
    /// get without index, fetchAll
    Value(Value),
    /// get with index, pull
    Element(Json),
    /// fetch
    Slice(Container),
    /// increment / decrement
    Counter(i64),
    /// drop
    Dropped(bool),
}

impl Response {
    pub fn into_json(self) -> Json {
        match self {
            Response::Stored(ok) | Response::Dropped(ok) => Json::Bool(ok),
            Response::Value(value) => value.into_json(),
            Response::Element(json) => json,
            Response::Slice(container) => Value::Container(container).into_json(),
            Response::Counter(n) => Json::from(n),
        }
    }

    pub fn stored(&self) -> Option<bool> {
        match self {
            Response::Stored(ok) => Some(*ok),
            _ => None,
        }
    }

    pub fn counter(&self) -> Option<i64> {
        match self {
            Response::Counter(n) => Some(*n),
            _ => None,
        }
    }
}
