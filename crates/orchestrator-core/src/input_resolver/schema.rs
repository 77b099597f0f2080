//! Conditional sub-block filtering: drop parameters whose UI schema
//! declares a condition that doesn't hold against the block's other
//! (already-resolved) parameters.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamCondition {
    pub field: String,
    pub value: Value,
    #[serde(default)]
    pub not: bool,
    #[serde(default)]
    pub and: Option<Box<ParamCondition>>,
}

impl ParamCondition {
    pub fn evaluate(&self, params: &Map<String, Value>) -> bool {
        let field_value = params.get(&self.field);
        let matches = match &self.value {
            Value::Array(candidates) => field_value.is_some_and(|fv| candidates.contains(fv)),
            expected => field_value == Some(expected),
        };
        let result = if self.not { !matches } else { matches };
        match &self.and {
            Some(next) => result && next.evaluate(params),
            None => result,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSchemaEntry {
    pub id: String,
    #[serde(default)]
    pub condition: Option<ParamCondition>,
}

/// Drops entries from `params` whose every matching schema entry has a
/// condition that evaluates false. Parameters with no schema entry, or whose
/// schema entry has no condition, are always retained. When multiple schema
/// entries share an id, the parameter is retained if at least one of them
/// evaluates true (or has no condition).
pub fn filter_conditional_params(
    schema: &[ParamSchemaEntry],
    params: &Map<String, Value>,
) -> Map<String, Value> {
    let mut retained = Map::new();
    for (key, value) in params {
        let matching: Vec<&ParamSchemaEntry> = schema.iter().filter(|e| &e.id == key).collect();
        let keep = matching.is_empty()
            || matching.iter().any(|entry| match &entry.condition {
                None => true,
                Some(cond) => cond.evaluate(params),
            });
        if keep {
            retained.insert(key.clone(), value.clone());
        }
    }
    retained
}
