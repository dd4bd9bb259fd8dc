//! The application's entities: users with profiles and posts, tags, and the
//! student/teacher pair sharing base and embedded name columns.

use crate::error::SchemaError;
use crate::schema::types::*;
use serde_json::Value;

pub const USER: &str = "User";
pub const PROFILE: &str = "Profile";
pub const POST: &str = "Post";
pub const TAG: &str = "Tag";
pub const STUDENT: &str = "Student";
pub const TEACHER: &str = "Teacher";

/// Join table shared by `Post.tags` and `Tag.posts`.
pub const POST_TAGS: &str = "post_tags";

/// Role of a user account. New users are `User` unless told otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub const LABELS: &'static [&'static str] = &["user", "admin"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

fn user() -> EntityDef {
    EntityDef::new(USER, "user")
        .column(ColumnDef::primary_id())
        .column(ColumnDef::new("email", "email", ColumnType::Text).db_default("''"))
        .column(
            ColumnDef::new(
                "role",
                "role",
                ColumnType::Enum {
                    type_name: "user_role_enum",
                    labels: Role::LABELS,
                },
            )
            .db_default("'user'")
            .default_value(Value::String(Role::default().as_str().into())),
        )
        .column(ColumnDef::new("createdAt", "created_at", ColumnType::Timestamp).generated(Generated::CreateDate))
        .column(ColumnDef::new("updatedAt", "updated_at", ColumnType::Timestamp).generated(Generated::UpdateDate))
        .column(ColumnDef::new("version", "version", ColumnType::Integer).generated(Generated::Version))
        .column(
            ColumnDef::new("additionalId", "additional_id", ColumnType::Uuid)
                .generated(Generated::Uuid)
                .unique(),
        )
        .column(ColumnDef::new("count", "count", ColumnType::Integer).db_default("0"))
        .relation(
            RelationDef::new(
                "profile",
                RelationKind::OneToOne,
                PROFILE,
                JoinSide::Owner { column: "profile_id" },
            )
            .cascade()
            .on_delete(OnDelete::Restrict),
        )
        .relation(RelationDef::new(
            "posts",
            RelationKind::OneToMany,
            POST,
            JoinSide::Inverse { column: "author_id" },
        ))
}

fn profile() -> EntityDef {
    EntityDef::new(PROFILE, "profile")
        .column(ColumnDef::primary_id())
        .column(ColumnDef::new("profileImg", "profile_img", ColumnType::Text))
        .relation(RelationDef::new(
            "user",
            RelationKind::OneToOne,
            USER,
            JoinSide::Inverse { column: "profile_id" },
        ))
}

fn post() -> EntityDef {
    EntityDef::new(POST, "post")
        .column(ColumnDef::primary_id())
        .column(ColumnDef::new("title", "title", ColumnType::Varchar(300)))
        .relation(RelationDef::new(
            "author",
            RelationKind::ManyToOne,
            USER,
            JoinSide::Owner { column: "author_id" },
        ))
        .relation(
            RelationDef::new(
                "tags",
                RelationKind::ManyToMany,
                TAG,
                JoinSide::Table {
                    table: POST_TAGS,
                    own_column: "post_id",
                    target_column: "tag_id",
                },
            )
            .eager(),
        )
}

fn tag() -> EntityDef {
    EntityDef::new(TAG, "tag")
        .column(ColumnDef::primary_id())
        .column(ColumnDef::new("name", "name", ColumnType::Text))
        .relation(RelationDef::new(
            "posts",
            RelationKind::ManyToMany,
            POST,
            JoinSide::Table {
                table: POST_TAGS,
                own_column: "tag_id",
                target_column: "post_id",
            },
        ))
}

/// Columns every person-like table inherits.
fn base_columns() -> Vec<ColumnDef> {
    vec![
        ColumnDef::primary_id(),
        ColumnDef::new("createdAt", "created_at", ColumnType::Timestamp).generated(Generated::CreateDate),
        ColumnDef::new("updatedAt", "updated_at", ColumnType::Timestamp).generated(Generated::UpdateDate),
    ]
}

/// Embedded name group, flattened with a `name` prefix.
fn name_columns() -> Vec<ColumnDef> {
    vec![
        ColumnDef::new("nameFirst", "name_first", ColumnType::Varchar(100)),
        ColumnDef::new("nameLast", "name_last", ColumnType::Varchar(100)),
    ]
}

fn student() -> EntityDef {
    EntityDef::new(STUDENT, "student")
        .columns(base_columns())
        .columns(name_columns())
        .column(ColumnDef::new("class", "class", ColumnType::Text).insert_only())
}

fn teacher() -> EntityDef {
    EntityDef::new(TEACHER, "teacher")
        .columns(base_columns())
        .columns(name_columns())
        .column(ColumnDef::new("salary", "salary", ColumnType::Integer).hidden())
}

/// The validated model served by the API.
pub fn standard_model() -> Result<Model, SchemaError> {
    Model::new(vec![user(), profile(), post(), tag(), student(), teacher()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_model_is_valid() {
        let model = standard_model().unwrap();
        assert_eq!(model.entities.len(), 6);
        assert!(model.entity(USER).is_some());
        assert!(model.entity("Nope").is_none());
    }

    #[test]
    fn role_defaults_to_user() {
        assert_eq!(Role::default(), Role::User);
        let model = standard_model().unwrap();
        let role = model.entity(USER).unwrap().find_column("role").unwrap();
        assert_eq!(role.default, Some(Value::String("user".into())));
    }

    #[test]
    fn profile_relation_restricts_delete_and_cascades_save() {
        let model = standard_model().unwrap();
        let rel = model.entity(USER).unwrap().find_relation("profile").unwrap();
        assert!(rel.cascade);
        assert!(!rel.eager);
        assert!(rel.nullable);
        assert_eq!(rel.on_delete, OnDelete::Restrict);
    }

    #[test]
    fn post_tags_is_the_only_eager_relation() {
        let model = standard_model().unwrap();
        let eager: Vec<_> = model
            .entities
            .iter()
            .flat_map(|e| e.relations.iter().filter(|r| r.eager).map(move |r| (e.name, r.name)))
            .collect();
        assert_eq!(eager, vec![(POST, "tags")]);
    }

    #[test]
    fn inherited_columns_are_shared() {
        let model = standard_model().unwrap();
        for name in [STUDENT, TEACHER] {
            let e = model.entity(name).unwrap();
            for prop in ["id", "createdAt", "updatedAt", "nameFirst", "nameLast"] {
                assert!(e.find_column(prop).is_some(), "{} missing {}", name, prop);
            }
        }
        let salary = model.entity(TEACHER).unwrap().find_column("salary").unwrap();
        assert!(!salary.select);
    }
}
