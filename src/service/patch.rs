//! Explicit write payloads: field values and nested relation patches, validated against the schema.

use crate::error::AppError;
use crate::schema::{EntityDef, Generated, Model};
use serde_json::Value;
use std::collections::BTreeMap;

/// Value given for one relation of a patch.
#[derive(Clone, Debug, PartialEq)]
pub enum RelationValue {
    /// To-one side. `None` clears the link.
    One(Option<Patch>),
    Many(Vec<Patch>),
}

/// Fields to write on one row plus the relations to link.
///
/// Without `id` the patch inserts a new row; with `id` it updates that row,
/// or only references it when nothing else is set.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Patch {
    pub id: Option<Value>,
    /// Version the row must still carry for the update to apply.
    pub expected_version: Option<i64>,
    pub fields: BTreeMap<String, Value>,
    pub relations: BTreeMap<String, RelationValue>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteMode {
    Insert,
    Update,
}

impl Patch {
    pub fn new() -> Self {
        Patch::default()
    }

    /// Patch that only points at an existing row.
    pub fn reference(id: impl Into<Value>) -> Self {
        Patch::new().with_id(id)
    }

    pub fn with_id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn expect_version(mut self, version: i64) -> Self {
        self.expected_version = Some(version);
        self
    }

    pub fn set(mut self, property: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(property.to_string(), value.into());
        self
    }

    pub fn relate_one(mut self, name: &str, target: Option<Patch>) -> Self {
        self.relations.insert(name.to_string(), RelationValue::One(target));
        self
    }

    pub fn relate_many(mut self, name: &str, targets: Vec<Patch>) -> Self {
        self.relations.insert(name.to_string(), RelationValue::Many(targets));
        self
    }

    pub fn is_reference(&self) -> bool {
        self.id.is_some() && self.fields.is_empty() && self.relations.is_empty() && self.expected_version.is_none()
    }

    pub fn mode(&self) -> WriteMode {
        if self.id.is_some() {
            WriteMode::Update
        } else {
            WriteMode::Insert
        }
    }

    /// Structural parse of a JSON payload. A `version` key becomes the expected version.
    pub fn from_json(model: &Model, entity: &EntityDef, v: Value) -> Result<Self, AppError> {
        let Value::Object(obj) = v else {
            return Err(AppError::Validation(format!("{} payload must be an object", entity.name)));
        };
        let pk = entity.primary();
        let mut patch = Patch::new();
        for (key, value) in obj {
            if key == pk.property {
                if value.is_null() {
                    return Err(AppError::Validation(format!("{}.{} must be an id", entity.name, key)));
                }
                pk.check_operand(&value)?;
                patch.id = Some(value);
            } else if let Some(c) = entity.find_column(&key) {
                if c.generated == Some(Generated::Version) {
                    let n = value.as_i64().ok_or_else(|| {
                        AppError::Validation(format!("{}.{} must be an integer", entity.name, key))
                    })?;
                    patch.expected_version = Some(n);
                } else {
                    patch.fields.insert(key, value);
                }
            } else if let Some(rel) = entity.find_relation(&key) {
                let target = model.target(rel)?;
                let rv = match value {
                    Value::Null if !rel.is_to_many() => RelationValue::One(None),
                    Value::Array(items) if rel.is_to_many() => RelationValue::Many(
                        items
                            .into_iter()
                            .map(|item| Patch::from_json(model, target, item))
                            .collect::<Result<Vec<_>, _>>()?,
                    ),
                    obj @ Value::Object(_) if !rel.is_to_many() => {
                        RelationValue::One(Some(Patch::from_json(model, target, obj)?))
                    }
                    _ => {
                        let expected = if rel.is_to_many() { "an array" } else { "an object or null" };
                        return Err(AppError::Validation(format!(
                            "{}.{} must be {}",
                            entity.name, key, expected
                        )));
                    }
                };
                patch.relations.insert(key, rv);
            } else {
                return Err(AppError::Validation(format!("{} has no field '{}'", entity.name, key)));
            }
        }
        Ok(patch)
    }

    /// Check this level's fields for the given write. Nested patches are checked when persisted.
    pub fn validate(&self, entity: &EntityDef, mode: WriteMode) -> Result<(), AppError> {
        for (prop, v) in &self.fields {
            let c = entity
                .find_column(prop)
                .ok_or_else(|| AppError::Validation(format!("{} has no field '{}'", entity.name, prop)))?;
            if !c.is_writable() {
                return Err(AppError::Validation(format!("{} is generated and cannot be set", prop)));
            }
            if mode == WriteMode::Update && !c.update {
                return Err(AppError::Validation(format!("{} cannot be changed after insert", prop)));
            }
            c.check_value(v)?;
        }
        if mode == WriteMode::Insert {
            let missing = entity.columns.iter().find(|c| {
                c.is_writable()
                    && !c.nullable
                    && c.db_default.is_none()
                    && c.default.is_none()
                    && !self.fields.contains_key(c.property)
            });
            if let Some(c) = missing {
                return Err(AppError::Validation(format!("{}.{} is required", entity.name, c.property)));
            }
        }
        for name in self.relations.keys() {
            if entity.find_relation(name).is_none() {
                return Err(AppError::Validation(format!("{} has no relation '{}'", entity.name, name)));
            }
        }
        Ok(())
    }
}
