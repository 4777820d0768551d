use serde_json::Value;

/// Type kind of a declared field.
///
/// Rust has no runtime struct reflection, so models declare their shape as a
/// [`ModelSchema`] (typically written once per model, or emitted by a build
/// step). The kind drives JSON type checking on writes, time coercion on
/// filters, and the admin metadata type mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Bool,
    Int,
    Uint,
    Float,
    Time,
    Uuid,
    Struct,
    Slice,
    Map,
    Any,
    Optional(Box<FieldKind>),
}

impl FieldKind {
    /// Unwrap one level of `Optional`, the way a pointer is dereferenced
    /// before its pointee kind is recorded.
    pub fn unwrapped(&self) -> &FieldKind {
        match self {
            FieldKind::Optional(inner) => inner,
            other => other,
        }
    }

    pub fn is_time(&self) -> bool {
        matches!(self.unwrapped(), FieldKind::Time)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self.unwrapped(),
            FieldKind::Int | FieldKind::Uint | FieldKind::Float
        )
    }

    /// Whether a JSON value is acceptable for this kind on a write path.
    ///
    /// Composite kinds (struct, slice, time, optional, any) accept any value
    /// and leave the final word to the storage layer; scalars must match the
    /// JSON value kind, with all numeric kinds matching any JSON number.
    pub fn accepts(&self, value: &Value) -> bool {
        match self.unwrapped() {
            FieldKind::Int | FieldKind::Uint | FieldKind::Float => value.is_number(),
            FieldKind::String | FieldKind::Uuid => value.is_string(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::Map => value.is_object(),
            _ => true,
        }
    }

    /// Admin metadata type mapping: the JavaScript-side type of this kind.
    pub fn js_type(&self) -> &'static str {
        match self {
            FieldKind::String | FieldKind::Uuid => "string",
            FieldKind::Int | FieldKind::Uint | FieldKind::Float => "number",
            FieldKind::Bool => "boolean",
            FieldKind::Time | FieldKind::Struct | FieldKind::Map | FieldKind::Slice => "object",
            FieldKind::Optional(_) | FieldKind::Any => "any",
        }
    }
}

/// One declared field of a model.
///
/// `json` and `storage` are tag strings with the same grammar a tagged record
/// definition would carry: the json tag's first comma-segment is the external
/// name (`"-"` excludes the field from payloads), and the storage tag is a
/// `;`-separated, case-insensitive token list (`primaryKey`, `unique`,
/// `column:<name>`, `foreignKey`, `references`, `many2many`).
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: &'static str,
    pub json: &'static str,
    pub storage: &'static str,
    pub kind: FieldKind,
    pub rust_type: &'static str,
    pub embedded: Option<ModelSchema>,
}

impl FieldDef {
    pub fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            json: "",
            storage: "",
            kind,
            rust_type: "",
            embedded: None,
        }
    }

    /// Set the external-naming tag, verbatim (e.g. `"id,omitempty"` or `"-"`).
    pub fn json(mut self, tag: &'static str) -> Self {
        self.json = tag;
        self
    }

    /// Set the storage tag, verbatim (e.g. `"primaryKey;column:uuid"`).
    pub fn storage(mut self, tag: &'static str) -> Self {
        self.storage = tag;
        self
    }

    /// Source type string shown in admin metadata (e.g. `"DateTime<Utc>"`).
    pub fn rust_type(mut self, ty: &'static str) -> Self {
        self.rust_type = ty;
        self
    }
}

/// Declared shape of a record type: ordered fields plus naming.
#[derive(Debug, Clone)]
pub struct ModelSchema {
    pub name: &'static str,
    pub table: Option<&'static str>,
    pub fields: Vec<FieldDef>,
}

impl ModelSchema {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            table: None,
            fields: Vec::new(),
        }
    }

    /// Override the derived table name.
    pub fn table(mut self, table: &'static str) -> Self {
        self.table = Some(table);
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Embed another schema anonymously; its fields are flattened into this
    /// model by the descriptor builder, as if declared inline.
    pub fn embed(mut self, schema: ModelSchema) -> Self {
        let mut field = FieldDef::new(schema.name, FieldKind::Struct);
        field.embedded = Some(schema);
        self.fields.push(field);
        self
    }

    /// Table name: explicit override, or snake_case of the model name.
    pub fn table_name(&self) -> String {
        self.table
            .map(str::to_string)
            .unwrap_or_else(|| snake_case(self.name))
    }
}

/// Naming strategy: lower-case with underscores at camel boundaries.
/// Acronym runs collapse (`TenantID` => `tenant_id`, `HTTPStatus` => `http_status`).
pub fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev_lower = i > 0 && (chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit());
            let next_lower = chars.get(i + 1).map_or(false, |n| n.is_lowercase());
            let prev_upper = i > 0 && chars[i - 1].is_uppercase();
            if prev_lower || (prev_upper && next_lower) {
                out.push('_');
            }
            for lc in c.to_lowercase() {
                out.push(lc);
            }
        } else {
            out.push(c);
        }
    }
    out
}
