//! Entity declarations: columns, relations and the options they carry at runtime.

use crate::error::AppError;
use serde_json::Value;
use std::collections::HashMap;

/// Column type as understood by the SQL builder and the DDL generator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
    Serial,
    Integer,
    Text,
    Varchar(u32),
    Timestamp,
    Uuid,
    /// Named PostgreSQL enum type with its labels.
    Enum {
        type_name: &'static str,
        labels: &'static [&'static str],
    },
}

impl ColumnType {
    /// Type used in CREATE TABLE.
    pub fn ddl(&self) -> String {
        match self {
            ColumnType::Serial => "SERIAL".into(),
            ColumnType::Integer => "INTEGER".into(),
            ColumnType::Text => "TEXT".into(),
            ColumnType::Varchar(n) => format!("VARCHAR({})", n),
            ColumnType::Timestamp => "TIMESTAMPTZ".into(),
            ColumnType::Uuid => "UUID".into(),
            ColumnType::Enum { type_name, .. } => quoted(type_name),
        }
    }

    /// Target of the `$n::<cast>` applied to text-bound parameters.
    pub fn cast(&self) -> String {
        match self {
            ColumnType::Serial | ColumnType::Integer => "integer".into(),
            ColumnType::Text => "text".into(),
            ColumnType::Varchar(_) => "varchar".into(),
            ColumnType::Timestamp => "timestamptz".into(),
            ColumnType::Uuid => "uuid".into(),
            ColumnType::Enum { type_name, .. } => quoted(type_name),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Serial | ColumnType::Integer)
    }
}

/// Values the database or the row constructor fills in without caller input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Generated {
    /// Auto-increment primary key.
    Increment,
    /// Random UUID token assigned when the row is constructed.
    Uuid,
    CreateDate,
    UpdateDate,
    /// Optimistic concurrency counter: 1 on insert, +1 per update.
    Version,
}

#[derive(Clone, Debug)]
pub struct ColumnDef {
    /// Name used in payloads, filters and responses.
    pub property: &'static str,
    /// Name of the database column.
    pub column: &'static str,
    pub ty: ColumnType,
    pub primary: bool,
    pub nullable: bool,
    pub unique: bool,
    pub generated: Option<Generated>,
    /// SQL default expression written into the DDL.
    pub db_default: Option<&'static str>,
    /// Value applied when an insert row is constructed without this field.
    pub default: Option<Value>,
    /// Part of the projection when the caller does not choose one.
    pub select: bool,
    /// Writable after the row was inserted.
    pub update: bool,
}

impl ColumnDef {
    pub fn new(property: &'static str, column: &'static str, ty: ColumnType) -> Self {
        ColumnDef {
            property,
            column,
            ty,
            primary: false,
            nullable: false,
            unique: false,
            generated: None,
            db_default: None,
            default: None,
            select: true,
            update: true,
        }
    }

    /// Auto-increment primary key named `id`.
    pub fn primary_id() -> Self {
        let mut c = ColumnDef::new("id", "id", ColumnType::Serial);
        c.primary = true;
        c.generated = Some(Generated::Increment);
        c.update = false;
        c
    }

    pub fn generated(mut self, kind: Generated) -> Self {
        self.generated = Some(kind);
        self.db_default = match kind {
            Generated::CreateDate | Generated::UpdateDate => Some("NOW()"),
            Generated::Version => Some("1"),
            Generated::Uuid => Some("gen_random_uuid()"),
            Generated::Increment => None,
        };
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn db_default(mut self, expr: &'static str) -> Self {
        self.db_default = Some(expr);
        self
    }

    pub fn default_value(mut self, v: Value) -> Self {
        self.default = Some(v);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.select = false;
        self
    }

    pub fn insert_only(mut self) -> Self {
        self.update = false;
        self
    }

    /// Caller-writable: not generated by the database or the row constructor.
    pub fn is_writable(&self) -> bool {
        self.generated.is_none()
    }

    /// Type, nullability, length and label checks for a value written to this column.
    pub fn check_value(&self, v: &Value) -> Result<(), AppError> {
        let invalid = |what: &str| AppError::Validation(format!("{} must be {}", self.property, what));
        if v.is_null() {
            return if self.nullable { Ok(()) } else { Err(invalid("non-null")) };
        }
        match self.ty {
            ColumnType::Serial | ColumnType::Integer => {
                let in_range = v.as_i64().is_some_and(|n| i32::try_from(n).is_ok());
                if !in_range {
                    return Err(invalid("a 32-bit integer"));
                }
            }
            ColumnType::Text => {
                if !v.is_string() {
                    return Err(invalid("a string"));
                }
            }
            ColumnType::Varchar(max) => {
                let s = v.as_str().ok_or_else(|| invalid("a string"))?;
                if s.chars().count() > max as usize {
                    return Err(invalid(&format!("at most {} characters", max)));
                }
            }
            ColumnType::Timestamp => {
                let s = v.as_str().ok_or_else(|| invalid("an RFC 3339 timestamp"))?;
                chrono::DateTime::parse_from_rfc3339(s).map_err(|_| invalid("an RFC 3339 timestamp"))?;
            }
            ColumnType::Uuid => {
                let s = v.as_str().ok_or_else(|| invalid("a UUID"))?;
                uuid::Uuid::parse_str(s).map_err(|_| invalid("a UUID"))?;
            }
            ColumnType::Enum { labels, .. } => {
                let ok = v.as_str().is_some_and(|s| labels.contains(&s));
                if !ok {
                    return Err(invalid(&format!("one of {}", labels.join(", "))));
                }
            }
        }
        Ok(())
    }

    /// Check a filter operand: it must cast to the column type. Length limits do not apply.
    pub fn check_operand(&self, v: &Value) -> Result<(), AppError> {
        match self.ty {
            ColumnType::Varchar(_) if v.is_string() => Ok(()),
            _ => self.check_value(v),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelationKind {
    OneToOne,
    ManyToOne,
    OneToMany,
    ManyToMany,
}

/// Referential action when the referenced row is deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnDelete {
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl OnDelete {
    pub fn as_sql(&self) -> &'static str {
        match self {
            OnDelete::NoAction => "NO ACTION",
            OnDelete::Restrict => "RESTRICT",
            OnDelete::Cascade => "CASCADE",
            OnDelete::SetNull => "SET NULL",
            OnDelete::SetDefault => "SET DEFAULT",
        }
    }
}

/// Where the link between two rows is stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JoinSide {
    /// This entity holds the foreign key column.
    Owner { column: &'static str },
    /// The target holds a foreign key column pointing at this entity.
    Inverse { column: &'static str },
    /// Both sides are linked through a join table.
    Table {
        table: &'static str,
        own_column: &'static str,
        target_column: &'static str,
    },
}

#[derive(Clone, Debug)]
pub struct RelationDef {
    pub name: &'static str,
    /// Entity name of the other side.
    pub target: &'static str,
    pub kind: RelationKind,
    pub join: JoinSide,
    /// Nested payloads without an id are inserted along with the parent.
    pub cascade: bool,
    /// Always loaded by find, whatever the requested relations.
    pub eager: bool,
    pub nullable: bool,
    pub on_delete: OnDelete,
}

impl RelationDef {
    pub fn new(name: &'static str, kind: RelationKind, target: &'static str, join: JoinSide) -> Self {
        RelationDef {
            name,
            target,
            kind,
            join,
            cascade: false,
            eager: false,
            nullable: true,
            on_delete: OnDelete::NoAction,
        }
    }

    pub fn cascade(mut self) -> Self {
        self.cascade = true;
        self
    }

    pub fn eager(mut self) -> Self {
        self.eager = true;
        self
    }

    pub fn on_delete(mut self, action: OnDelete) -> Self {
        self.on_delete = action;
        self
    }

    pub fn is_to_many(&self) -> bool {
        matches!(self.kind, RelationKind::OneToMany | RelationKind::ManyToMany)
    }
}

#[derive(Clone, Debug)]
pub struct EntityDef {
    pub name: &'static str,
    pub table: &'static str,
    pub columns: Vec<ColumnDef>,
    pub relations: Vec<RelationDef>,
}

impl EntityDef {
    pub fn new(name: &'static str, table: &'static str) -> Self {
        EntityDef {
            name,
            table,
            columns: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn column(mut self, c: ColumnDef) -> Self {
        self.columns.push(c);
        self
    }

    pub fn columns(mut self, cs: impl IntoIterator<Item = ColumnDef>) -> Self {
        self.columns.extend(cs);
        self
    }

    pub fn relation(mut self, r: RelationDef) -> Self {
        self.relations.push(r);
        self
    }

    /// Primary key column. The validator guarantees exactly one exists.
    pub fn primary(&self) -> &ColumnDef {
        self.columns
            .iter()
            .find(|c| c.primary)
            .unwrap_or(&self.columns[0])
    }

    pub fn find_column(&self, property: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.property == property)
    }

    pub fn find_relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn find_column_by_generated(&self, kind: Generated) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.generated == Some(kind))
    }

    /// Columns returned when no projection is requested.
    pub fn default_projection(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| c.select)
    }
}

/// All entities of the application, validated and indexed by name.
#[derive(Clone, Debug)]
pub struct Model {
    pub entities: Vec<EntityDef>,
    by_name: HashMap<&'static str, usize>,
}

impl Model {
    pub fn new(entities: Vec<EntityDef>) -> Result<Self, crate::error::SchemaError> {
        crate::schema::validate(&entities)?;
        let by_name = entities.iter().enumerate().map(|(i, e)| (e.name, i)).collect();
        Ok(Model { entities, by_name })
    }

    pub fn entity(&self, name: &str) -> Option<&EntityDef> {
        self.by_name.get(name).map(|&i| &self.entities[i])
    }

    /// Target entity of a relation. Validated at construction, so a miss is a schema bug.
    pub fn target(&self, rel: &RelationDef) -> Result<&EntityDef, crate::error::SchemaError> {
        self.entity(rel.target)
            .ok_or(crate::error::SchemaError::MissingReference {
                kind: "entity",
                id: rel.target.to_string(),
            })
    }
}

/// Quote identifier for PostgreSQL. Identifiers come from entity declarations only.
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}
