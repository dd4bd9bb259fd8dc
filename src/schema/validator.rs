//! Schema validation: primary keys, unique names and relation consistency.

use crate::error::SchemaError;
use crate::schema::types::{EntityDef, JoinSide, RelationKind};
use std::collections::{HashMap, HashSet};

pub fn validate(entities: &[EntityDef]) -> Result<(), SchemaError> {
    let mut names = HashSet::new();
    for e in entities {
        if !names.insert(e.name) {
            return Err(SchemaError::Validation(format!("duplicate entity: {}", e.name)));
        }
    }
    let by_name: HashMap<&str, &EntityDef> = entities.iter().map(|e| (e.name, e)).collect();

    for e in entities {
        let primaries: Vec<_> = e.columns.iter().filter(|c| c.primary).collect();
        if primaries.len() != 1 {
            return Err(SchemaError::InvalidPrimaryKey {
                entity: e.name.to_string(),
            });
        }

        let mut props = HashSet::new();
        for c in &e.columns {
            if !props.insert(c.property) {
                return Err(SchemaError::Validation(format!(
                    "{}: duplicate property {}",
                    e.name, c.property
                )));
            }
        }
        for r in &e.relations {
            if !props.insert(r.name) {
                return Err(SchemaError::Validation(format!(
                    "{}: relation {} collides with another property",
                    e.name, r.name
                )));
            }
        }

        for r in &e.relations {
            let target = by_name.get(r.target).ok_or_else(|| SchemaError::MissingReference {
                kind: "entity",
                id: r.target.to_string(),
            })?;
            match (&r.kind, &r.join) {
                (RelationKind::OneToOne | RelationKind::ManyToOne, JoinSide::Owner { .. }) => {}
                (RelationKind::OneToOne | RelationKind::OneToMany, JoinSide::Inverse { column }) => {
                    let owned = target.relations.iter().any(|tr| {
                        tr.target == e.name && tr.join == JoinSide::Owner { column: *column }
                    });
                    if !owned {
                        return Err(SchemaError::Validation(format!(
                            "{}.{}: no owning relation on {} with column {}",
                            e.name, r.name, target.name, column
                        )));
                    }
                }
                (
                    RelationKind::ManyToMany,
                    JoinSide::Table {
                        table,
                        own_column,
                        target_column,
                    },
                ) => {
                    // A mirror relation is optional, but when present it must use the same table.
                    for tr in target.relations.iter().filter(|tr| tr.target == e.name) {
                        if let JoinSide::Table {
                            table: t,
                            own_column: o,
                            target_column: tc,
                        } = &tr.join
                        {
                            if t == table && (o != target_column || tc != own_column) {
                                return Err(SchemaError::Validation(format!(
                                    "{}.{}: join table {} columns do not mirror {}.{}",
                                    e.name, r.name, table, target.name, tr.name
                                )));
                            }
                        }
                    }
                }
                _ => {
                    return Err(SchemaError::Validation(format!(
                        "{}.{}: {:?} cannot be stored as {:?}",
                        e.name, r.name, r.kind, r.join
                    )))
                }
            }
        }
    }
    Ok(())
}
