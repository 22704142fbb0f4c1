//! Schema declaration: record shapes, keyed containers, and the
//! sibling-target paths used by subsets and constrained sets.

use crate::error::ArborError;
use crate::value::{KeyType, ScalarType};
use std::collections::BTreeSet;
use std::sync::Arc;

/// How a container derives its keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpec {
    /// Name of the scalar field inside the element schema holding the key.
    pub field: String,
    pub ty: KeyType,
}

/// One step of a design-time path from a set node to its target container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetStep {
    Parent,
    Field(String),
}

/// Path from a Subset/ConstrainedSet to the container it references.
/// Applied from the set node at every access; never cached.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TargetPath(pub Vec<TargetStep>);

impl TargetPath {
    pub fn parent() -> Self {
        TargetPath(vec![TargetStep::Parent])
    }

    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.0.push(TargetStep::Field(name.into()));
        self
    }
}

#[derive(Debug, Clone)]
pub enum FieldKind {
    Scalar {
        ty: ScalarType,
        skip_serialize: bool,
    },
    Record(Arc<RecordSchema>),
    Container {
        value: Arc<RecordSchema>,
        key: KeySpec,
    },
    Subset {
        key_type: KeyType,
        target: TargetPath,
    },
    Constrained {
        value: Arc<RecordSchema>,
        key: KeySpec,
        target: TargetPath,
    },
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
}

#[derive(Debug, Clone)]
pub struct RecordSchema {
    pub name: String,
    pub fields: Vec<FieldDef>,
}

impl RecordSchema {
    pub fn build(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<(usize, &FieldDef)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, f)| f.name == name)
    }
}

pub struct SchemaBuilder {
    name: String,
    fields: Vec<FieldDef>,
}

impl SchemaBuilder {
    pub fn scalar(self, name: impl Into<String>, ty: ScalarType) -> Self {
        self.push(name, FieldKind::Scalar {
            ty,
            skip_serialize: false,
        })
    }

    /// Scalar omitted from the on-disk projection; default-initialized on
    /// load.
    pub fn scalar_skip(self, name: impl Into<String>, ty: ScalarType) -> Self {
        self.push(name, FieldKind::Scalar {
            ty,
            skip_serialize: true,
        })
    }

    pub fn record(self, name: impl Into<String>, schema: Arc<RecordSchema>) -> Self {
        self.push(name, FieldKind::Record(schema))
    }

    pub fn container(
        self,
        name: impl Into<String>,
        value: Arc<RecordSchema>,
        key_field: impl Into<String>,
    ) -> Self {
        let key_field = key_field.into();
        let ty = key_type_of(&value, &key_field);
        self.push(name, FieldKind::Container {
            value,
            key: KeySpec {
                field: key_field,
                ty: ty.unwrap_or(KeyType::Text),
            },
        })
    }

    pub fn subset(self, name: impl Into<String>, key_type: KeyType, target: TargetPath) -> Self {
        self.push(name, FieldKind::Subset { key_type, target })
    }

    pub fn constrained(
        self,
        name: impl Into<String>,
        value: Arc<RecordSchema>,
        key_field: impl Into<String>,
        target: TargetPath,
    ) -> Self {
        let key_field = key_field.into();
        let ty = key_type_of(&value, &key_field);
        self.push(name, FieldKind::Constrained {
            value,
            key: KeySpec {
                field: key_field,
                ty: ty.unwrap_or(KeyType::Text),
            },
            target,
        })
    }

    pub fn finish(self) -> Result<Arc<RecordSchema>, ArborError> {
        let mut seen = BTreeSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(ArborError::InvalidSchema {
                    message: format!("duplicate field '{}' in record '{}'", field.name, self.name),
                });
            }
            if field.name.is_empty() || field.name.starts_with(':') {
                return Err(ArborError::InvalidSchema {
                    message: format!("invalid field name '{}'", field.name),
                });
            }
            match &field.kind {
                FieldKind::Container { value, key } | FieldKind::Constrained { value, key, .. } => {
                    validate_key_field(value, key, &field.name)?;
                }
                _ => {}
            }
        }
        Ok(Arc::new(RecordSchema {
            name: self.name,
            fields: self.fields,
        }))
    }

    fn push(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            kind,
        });
        self
    }
}

fn key_type_of(schema: &RecordSchema, key_field: &str) -> Option<KeyType> {
    match schema.field(key_field)?.1.kind {
        FieldKind::Scalar { ref ty, .. } => match ty {
            ScalarType::Integer => Some(KeyType::Int),
            ScalarType::Unsigned => Some(KeyType::Uint),
            ScalarType::Text => Some(KeyType::Text),
            _ => None,
        },
        _ => None,
    }
}

fn validate_key_field(
    value: &RecordSchema,
    key: &KeySpec,
    container: &str,
) -> Result<(), ArborError> {
    let Some((_, def)) = value.field(&key.field) else {
        return Err(ArborError::InvalidSchema {
            message: format!(
                "container '{container}' key field '{}' not in record '{}'",
                key.field, value.name
            ),
        });
    };
    match &def.kind {
        FieldKind::Scalar {
            ty,
            skip_serialize: false,
        } if matches!(
            ty,
            ScalarType::Integer | ScalarType::Unsigned | ScalarType::Text
        ) =>
        {
            Ok(())
        }
        _ => Err(ArborError::InvalidSchema {
            message: format!(
                "container '{container}' key field '{}' must be a persisted int, uint or text scalar",
                key.field
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{RecordSchema, TargetPath};
    use crate::value::{KeyType, ScalarType};

    fn element() -> std::sync::Arc<RecordSchema> {
        RecordSchema::build("foo")
            .scalar("test", ScalarType::Integer)
            .scalar("test2", ScalarType::Integer)
            .finish()
            .expect("element schema")
    }

    #[test]
    fn builder_assembles_fields_in_order() {
        let schema = RecordSchema::build("root")
            .scalar("prova", ScalarType::Text)
            .scalar("num", ScalarType::Integer)
            .container("cont", element(), "test")
            .finish()
            .expect("schema");
        let names: Vec<_> = schema.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["prova", "num", "cont"]);
        assert_eq!(schema.field("num").expect("num").0, 1);
    }

    #[test]
    fn duplicate_field_rejected() {
        let err = RecordSchema::build("root")
            .scalar("a", ScalarType::Integer)
            .scalar("a", ScalarType::Text)
            .finish()
            .expect_err("duplicate");
        assert_eq!(err.code_str(), "invalid_schema");
    }

    #[test]
    fn container_key_field_must_exist_and_be_keyable() {
        let err = RecordSchema::build("root")
            .container("cont", element(), "missing")
            .finish()
            .expect_err("missing key field");
        assert_eq!(err.code_str(), "invalid_schema");

        let float_elem = RecordSchema::build("foo")
            .scalar("k", ScalarType::Float)
            .finish()
            .expect("schema");
        let err = RecordSchema::build("root")
            .container("cont", float_elem, "k")
            .finish()
            .expect_err("float key");
        assert_eq!(err.code_str(), "invalid_schema");
    }

    #[test]
    fn subset_declares_target_path() {
        let schema = RecordSchema::build("root")
            .container("cont", element(), "test")
            .subset("sub", KeyType::Int, TargetPath::parent().field("cont"))
            .finish()
            .expect("schema");
        assert_eq!(schema.fields.len(), 2);
    }
}
