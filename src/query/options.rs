//! Structured query description: filters, projection, relations, sort and pagination.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Predicate applied to one field.
#[derive(Clone, Debug, PartialEq)]
pub enum FindOperator {
    Equal(Value),
    /// Negates the wrapped predicate.
    Not(Box<FindOperator>),
    LessThan(Value),
    LessThanOrEqual(Value),
    MoreThan(Value),
    MoreThanOrEqual(Value),
    /// Case-sensitive `LIKE` pattern.
    Like(String),
    /// Case-insensitive `ILIKE` pattern.
    ILike(String),
    /// Inclusive range.
    Between(Value, Value),
    In(Vec<Value>),
    IsNull,
}

impl FindOperator {
    pub fn not(op: FindOperator) -> Self {
        FindOperator::Not(Box::new(op))
    }

    /// JSON form: a bare scalar means equals, otherwise `{ "<op>": <arg> }`.
    pub fn from_json(v: Value) -> Result<Self, String> {
        match v {
            Value::Object(obj) => {
                if obj.len() != 1 {
                    return Err(format!(
                        "operator object must have exactly one key, got {:?}",
                        obj.keys().collect::<Vec<_>>()
                    ));
                }
                let Some((key, arg)) = obj.into_iter().next() else {
                    return Err("empty operator object".into());
                };
                operator_from_key(&key, arg)
            }
            Value::Array(_) => Err("use { \"in\": [...] } for set membership".into()),
            Value::Null => Ok(FindOperator::IsNull),
            scalar => Ok(FindOperator::Equal(scalar)),
        }
    }
}

fn operator_from_key(key: &str, arg: Value) -> Result<FindOperator, String> {
    Ok(match key {
        "eq" => FindOperator::Equal(scalar(key, arg)?),
        "not" => FindOperator::not(FindOperator::from_json(arg)?),
        "lt" => FindOperator::LessThan(scalar(key, arg)?),
        "lte" => FindOperator::LessThanOrEqual(scalar(key, arg)?),
        "gt" => FindOperator::MoreThan(scalar(key, arg)?),
        "gte" => FindOperator::MoreThanOrEqual(scalar(key, arg)?),
        "like" => FindOperator::Like(pattern(key, arg)?),
        "ilike" => FindOperator::ILike(pattern(key, arg)?),
        "between" => match arg {
            Value::Array(mut bounds) if bounds.len() == 2 => {
                let hi = bounds.pop().unwrap_or(Value::Null);
                let lo = bounds.pop().unwrap_or(Value::Null);
                FindOperator::Between(scalar(key, lo)?, scalar(key, hi)?)
            }
            _ => return Err("between takes a two-element array".into()),
        },
        "in" => match arg {
            Value::Array(items) => FindOperator::In(
                items
                    .into_iter()
                    .map(|i| scalar(key, i))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            _ => return Err("in takes an array".into()),
        },
        "isNull" => match arg {
            Value::Bool(true) => FindOperator::IsNull,
            Value::Bool(false) => FindOperator::not(FindOperator::IsNull),
            _ => return Err("isNull takes true or false".into()),
        },
        other => return Err(format!("unknown operator: {}", other)),
    })
}

fn scalar(op: &str, v: Value) -> Result<Value, String> {
    match v {
        Value::Null => Err(format!("{}: null is not comparable, use isNull", op)),
        Value::Array(_) | Value::Object(_) => Err(format!("{} takes a scalar", op)),
        s => Ok(s),
    }
}

fn pattern(op: &str, v: Value) -> Result<String, String> {
    match v {
        Value::String(s) => Ok(s),
        _ => Err(format!("{} takes a string pattern", op)),
    }
}

impl<'de> Deserialize<'de> for FindOperator {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v = Value::deserialize(deserializer)?;
        FindOperator::from_json(v).map_err(serde::de::Error::custom)
    }
}

/// Conditions on several fields, all of which must hold.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct WhereGroup(pub BTreeMap<String, FindOperator>);

impl WhereGroup {
    pub fn new() -> Self {
        WhereGroup::default()
    }

    pub fn and(mut self, field: &str, op: FindOperator) -> Self {
        self.0.insert(field.to_string(), op);
        self
    }
}

/// Groups combined with OR. Empty means no filter.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Where(pub Vec<WhereGroup>);

impl Where {
    pub fn all() -> Self {
        Where::default()
    }

    /// Object → one AND group, array of objects → OR of groups.
    pub fn from_json(v: Value) -> Result<Self, String> {
        match v {
            Value::Object(obj) => Ok(Where(vec![group_from_map(obj)?])),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(obj) => group_from_map(obj),
                    _ => Err("where array entries must be objects".to_string()),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Where),
            Value::Null => Ok(Where::all()),
            _ => Err("where must be an object or an array of objects".into()),
        }
    }
}

impl From<WhereGroup> for Where {
    fn from(g: WhereGroup) -> Self {
        Where(vec![g])
    }
}

fn group_from_map(obj: Map<String, Value>) -> Result<WhereGroup, String> {
    obj.into_iter()
        .map(|(k, v)| FindOperator::from_json(v).map(|op| (k, op)))
        .collect::<Result<BTreeMap<_, _>, _>>()
        .map(WhereGroup)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Direction::Asc),
            "desc" => Ok(Direction::Desc),
            _ => Err(format!("unknown sort direction: {}", s)),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FindOptions {
    /// Property paths to return (`email`, `profile.id`). None returns every selectable column.
    pub select: Option<Vec<String>>,
    pub filter: Where,
    pub relations: Vec<String>,
    pub order: Vec<(String, Direction)>,
    pub skip: u64,
    /// Zero means no limit.
    pub take: u64,
}

impl FindOptions {
    pub fn new() -> Self {
        FindOptions::default()
    }

    pub fn select<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    pub fn filter(mut self, w: impl Into<Where>) -> Self {
        self.filter = w.into();
        self
    }

    pub fn relation(mut self, name: &str) -> Self {
        if !self.relations.iter().any(|r| r == name) {
            self.relations.push(name.to_string());
        }
        self
    }

    pub fn order_by(mut self, field: &str, dir: Direction) -> Self {
        self.order.push((field.to_string(), dir));
        self
    }

    pub fn skip(mut self, n: u64) -> Self {
        self.skip = n;
        self
    }

    pub fn take(mut self, n: u64) -> Self {
        self.take = n;
        self
    }
}

/// Raw list parameters as they arrive in a query string.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub select: Option<String>,
    #[serde(rename = "where")]
    pub filter: Option<String>,
    pub relations: Option<String>,
    pub order: Option<String>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
    #[serde(default)]
    pub with_count: bool,
}

impl ListParams {
    /// Overlay the supplied parameters on `defaults`; absent parameters keep the default.
    pub fn apply(&self, mut defaults: FindOptions) -> Result<FindOptions, String> {
        if let Some(s) = &self.select {
            defaults.select = Some(split_list(s));
        }
        if let Some(w) = &self.filter {
            let v: Value = serde_json::from_str(w).map_err(|e| format!("where is not valid JSON: {}", e))?;
            defaults.filter = Where::from_json(v)?;
        }
        if let Some(r) = &self.relations {
            defaults.relations = split_list(r);
            if self.select.is_none() {
                // Default nested paths only make sense while their relation is still loaded.
                let loaded = &defaults.relations;
                if let Some(paths) = defaults.select.as_mut() {
                    paths.retain(|p| p.split_once('.').map_or(true, |(rel, _)| loaded.iter().any(|l| l == rel)));
                }
            }
        }
        if let Some(o) = &self.order {
            defaults.order = split_list(o)
                .into_iter()
                .map(|item| match item.split_once(':') {
                    Some((field, dir)) => Ok((field.to_string(), dir.parse::<Direction>()?)),
                    None => Ok((item, Direction::Asc)),
                })
                .collect::<Result<Vec<_>, String>>()?;
        }
        if let Some(n) = self.skip {
            defaults.skip = row_count("skip", n)?;
        }
        if let Some(n) = self.take {
            defaults.take = row_count("take", n)?;
        }
        Ok(defaults)
    }
}

/// LIMIT and OFFSET are bigints.
fn row_count(name: &str, n: u64) -> Result<u64, String> {
    if i64::try_from(n).is_ok() {
        Ok(n)
    } else {
        Err(format!("{} must be at most {}", name, i64::MAX))
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}
