use bson::{Bson, Document};
use cascade_core::{DbError, Value};

/// Bridges `cascade_core::Value` to `bson::Bson`. Both directions are total:
/// every `Value` variant has a native BSON counterpart, and every BSON type
/// the driver can return decodes back into exactly one `Value` variant.
pub fn value_to_bson(value: &Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(*b),
        Value::Int(i) => Bson::Int64(*i),
        Value::Float(f) => Bson::Double(*f),
        Value::Text(s) => Bson::String(s.clone()),
        Value::Bytes(b) => Bson::Binary(bson::Binary {
            subtype: bson::spec::BinarySubtype::Generic,
            bytes: b.clone(),
        }),
        Value::Json(s) => serde_json::from_str::<serde_json::Value>(s)
            .ok()
            .and_then(|j| bson::to_bson(&j).ok())
            .unwrap_or(Bson::Null),
        Value::Decimal(s) => s
            .parse::<bson::Decimal128>()
            .map(Bson::Decimal128)
            .unwrap_or_else(|_| Bson::String(s.clone())),
        Value::DateTime(dt) => Bson::DateTime(bson::DateTime::from_chrono(*dt)),
        Value::Date(d) => Bson::String(d.to_string()),
        Value::Time(t) => Bson::String(t.to_string()),
        Value::Array(items) => Bson::Array(items.iter().map(value_to_bson).collect()),
        Value::Document(map) => {
            let mut doc = Document::new();
            for (k, v) in map {
                doc.insert(k.clone(), json_to_bson(v));
            }
            Bson::Document(doc)
        }
        Value::ObjectId(id) => bson::oid::ObjectId::parse_str(id)
            .map(Bson::ObjectId)
            .unwrap_or_else(|_| Bson::String(id.clone())),
    }
}

fn json_to_bson(value: &serde_json::Value) -> Bson {
    bson::to_bson(value).unwrap_or(Bson::Null)
}

/// Decodes one returned BSON value into the engine-neutral `Value`.
pub fn bson_to_value(bson: &Bson) -> Value {
    match bson {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::Int32(i) => Value::Int(*i as i64),
        Bson::Int64(i) => Value::Int(*i),
        Bson::Double(f) => Value::Float(*f),
        Bson::String(s) => Value::Text(s.clone()),
        Bson::Binary(bin) => Value::Bytes(bin.bytes.clone()),
        Bson::Decimal128(d) => Value::Decimal(d.to_string()),
        Bson::DateTime(dt) => Value::DateTime(dt.to_chrono()),
        Bson::Array(items) => Value::Array(items.iter().map(bson_to_value).collect()),
        Bson::Document(doc) => {
            let json = bson::Bson::Document(doc.clone())
                .into_relaxed_extjson();
            match json {
                serde_json::Value::Object(map) => Value::Document(map),
                _ => Value::Document(serde_json::Map::new()),
            }
        }
        Bson::ObjectId(id) => Value::ObjectId(id.to_hex()),
        other => Value::Text(other.to_string()),
    }
}

/// Converts one returned document into the engine-neutral `(name, Value)`
/// row shape `Driver::Row` expects, in field-insertion order.
pub fn document_to_row(doc: &Document) -> Vec<(String, Value)> {
    doc.iter().map(|(k, v)| (k.clone(), bson_to_value(v))).collect()
}

/// Builds a BSON document from the engine-neutral `(column, value)` pairs an
/// `insert` call carries, used directly as one `insertMany` document.
pub fn row_to_document(row: &[(String, Value)]) -> Document {
    let mut doc = Document::new();
    for (key, value) in row {
        doc.insert(key.clone(), value_to_bson(value));
    }
    doc
}

/// Renders a `Value` as a pipeline-stage JSON fragment, using MongoDB
/// Extended JSON (relaxed mode) for the types plain JSON can't carry
/// natively. The pipeline crosses the `cascade_core` boundary as
/// `serde_json::Value`, so this is the only way a `$match`/`$project` stage
/// can reference an `ObjectId`, a `DateTime`, or a `Decimal`.
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::json!(i),
        Value::Float(f) => serde_json::json!(f),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(b) => serde_json::json!({ "$binary": { "base64": base64_encode(b), "subType": "00" } }),
        Value::Json(s) => serde_json::from_str(s).unwrap_or(serde_json::Value::Null),
        Value::Decimal(s) => serde_json::json!({ "$numberDecimal": s }),
        Value::DateTime(dt) => serde_json::json!({ "$date": dt.to_rfc3339() }),
        Value::Date(d) => serde_json::Value::String(d.to_string()),
        Value::Time(t) => serde_json::Value::String(t.to_string()),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Document(map) => serde_json::Value::Object(map.clone()),
        Value::ObjectId(id) => serde_json::json!({ "$oid": id }),
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Converts one pipeline stage — carried as `serde_json::Value` in
/// `CompiledQuery::Pipeline` so `cascade_core` never depends on `bson` — into
/// the `bson::Document` the Mongo wire protocol needs.
pub fn json_stage_to_document(stage: &serde_json::Value) -> Result<Document, DbError> {
    bson::to_document(stage)
        .map_err(|e| DbError::InvalidOperationPayload(format!("invalid pipeline stage: {}", e)))
}
