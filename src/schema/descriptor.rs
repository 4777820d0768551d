use std::collections::HashMap;

use thiserror::Error;

use super::model::{snake_case, FieldDef, FieldKind, ModelSchema};

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("{0} has no identity key")]
    NoIdentityKey(String),

    #[error("{0} has a view with an empty path")]
    ViewWithoutPath(String),

    #[error("{0} has no database provider")]
    MissingDatabase(String),
}

/// The three names of a field (payload-visible, source-visible,
/// storage-visible) plus its kind.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub internal_name: String,
    /// `None` when the json tag is `"-"`: the field never appears in
    /// payloads, but key detection still sees it.
    pub external_name: Option<String>,
    /// Declared kind with one level of `Optional` unwrapped.
    pub kind: FieldKind,
    /// Kind exactly as declared (admin metadata reports the raw kind).
    pub declared_kind: FieldKind,
    pub column_name: String,
    pub rust_type: &'static str,
}

impl FieldDescriptor {
    /// External name, falling back to the internal name for excluded fields.
    pub fn external_or_internal(&self) -> &str {
        self.external_name.as_deref().unwrap_or(&self.internal_name)
    }
}

#[derive(Debug, Clone)]
pub struct KeyDescriptor {
    pub field: FieldDescriptor,
    pub is_primary: bool,
    pub is_unique: bool,
}

/// Immutable schema metadata derived from a [`ModelSchema`] at registration.
///
/// Shared freely across request tasks; never mutated after construction.
#[derive(Debug, Clone)]
pub struct Descriptor {
    pub model_name: String,
    pub table_name: String,
    /// All leaf fields in declaration order, embeds flattened.
    pub fields: Vec<FieldDescriptor>,
    /// Identity tuple, in declaration order: all primary keys if any exist,
    /// otherwise all unique keys.
    pub identity_keys: Vec<KeyDescriptor>,
    /// Internal names of relation fields worth preloading, deduplicated.
    pub preload_relations: Vec<String>,

    external_to_internal: HashMap<String, String>,
    external_to_kind: HashMap<String, FieldKind>,
    internal_to_column: HashMap<String, String>,
    internal_to_external: HashMap<String, String>,
}

impl Descriptor {
    pub fn build(schema: &ModelSchema) -> Result<Self, SchemaError> {
        let mut d = Descriptor {
            model_name: schema.name.to_string(),
            table_name: schema.table_name(),
            fields: Vec::new(),
            identity_keys: Vec::new(),
            preload_relations: Vec::new(),
            external_to_internal: HashMap::new(),
            external_to_kind: HashMap::new(),
            internal_to_column: HashMap::new(),
            internal_to_external: HashMap::new(),
        };

        let mut primary = Vec::new();
        let mut unique = Vec::new();
        d.walk(&schema.fields, &mut primary, &mut unique);

        // Primary keys win the identity tuple outright; unique keys only
        // identify rows when no primary key is declared.
        d.identity_keys = if !primary.is_empty() { primary } else { unique };
        if d.identity_keys.is_empty() {
            return Err(SchemaError::NoIdentityKey(d.model_name));
        }

        Ok(d)
    }

    fn walk(
        &mut self,
        fields: &[FieldDef],
        primary: &mut Vec<KeyDescriptor>,
        unique: &mut Vec<KeyDescriptor>,
    ) {
        for f in fields {
            if let Some(embedded) = &f.embedded {
                // Anonymous embed: flatten, do not namespace.
                self.walk(&embedded.fields, primary, unique);
                continue;
            }

            let tag = StorageTag::parse(f.storage);
            let external = external_name(f);
            let kind = f.kind.unwrapped().clone();
            let column = tag
                .column
                .clone()
                .unwrap_or_else(|| snake_case(f.name));

            let fd = FieldDescriptor {
                internal_name: f.name.to_string(),
                external_name: external.clone(),
                kind: kind.clone(),
                declared_kind: f.kind.clone(),
                column_name: column.clone(),
                rust_type: f.rust_type,
            };

            if let Some(ext) = &external {
                self.external_to_internal
                    .insert(ext.clone(), f.name.to_string());
                self.external_to_kind.insert(ext.clone(), kind);
                self.internal_to_external
                    .insert(f.name.to_string(), ext.clone());
            }
            self.internal_to_column
                .insert(f.name.to_string(), column);

            if tag.present {
                if tag.primary_key {
                    primary.push(KeyDescriptor {
                        field: fd.clone(),
                        is_primary: true,
                        is_unique: true,
                    });
                } else if tag.unique {
                    unique.push(KeyDescriptor {
                        field: fd.clone(),
                        is_primary: false,
                        is_unique: true,
                    });
                }
                if tag.relation && !self.preload_relations.iter().any(|p| p == f.name) {
                    self.preload_relations.push(f.name.to_string());
                }
            }

            self.fields.push(fd);
        }
    }

    /// Resolve an external (payload) name to its internal name and kind.
    pub fn resolve_external(&self, external: &str) -> Option<(&str, &FieldKind)> {
        let internal = self.external_to_internal.get(external)?;
        let kind = self.external_to_kind.get(external)?;
        Some((internal.as_str(), kind))
    }

    pub fn kind_of_external(&self, external: &str) -> Option<&FieldKind> {
        self.external_to_kind.get(external)
    }

    pub fn column_for_internal(&self, internal: &str) -> Option<&str> {
        self.internal_to_column.get(internal).map(String::as_str)
    }

    pub fn external_for_internal(&self, internal: &str) -> Option<&str> {
        self.internal_to_external.get(internal).map(String::as_str)
    }

    pub fn has_external(&self, external: &str) -> bool {
        self.external_to_internal.contains_key(external)
    }

    /// Whether an external name addresses one of the identity keys.
    pub fn is_identity_external(&self, external: &str) -> bool {
        self.identity_keys
            .iter()
            .any(|k| k.field.external_or_internal() == external)
    }
}

/// Parsed storage tag: `;`-separated tokens, matched case-insensitively.
#[derive(Debug, Default)]
struct StorageTag {
    present: bool,
    primary_key: bool,
    unique: bool,
    relation: bool,
    column: Option<String>,
}

impl StorageTag {
    fn parse(raw: &str) -> Self {
        let mut tag = StorageTag::default();
        if raw.is_empty() || raw == "-" {
            return tag;
        }
        tag.present = true;
        for token in raw.split(';') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let (key, value) = match token.split_once(':') {
                Some((k, v)) => (k.trim().to_ascii_lowercase(), Some(v.trim())),
                None => (token.to_ascii_lowercase(), None),
            };
            match key.as_str() {
                "primarykey" | "primary_key" => tag.primary_key = true,
                k if k.starts_with("unique") => tag.unique = true,
                "foreignkey" | "references" | "many2many" => tag.relation = true,
                "column" => {
                    if let Some(v) = value {
                        if !v.is_empty() {
                            tag.column = Some(v.to_string());
                        }
                    }
                }
                _ => {}
            }
        }
        tag
    }
}

/// First comma-segment of the json tag; empty falls back to the internal
/// name, `"-"` excludes the field from payloads.
fn external_name(f: &FieldDef) -> Option<String> {
    let first = f.json.split(',').next().unwrap_or("").trim();
    match first {
        "-" => None,
        "" => Some(f.name.to_string()),
        other => Some(other.to_string()),
    }
}
