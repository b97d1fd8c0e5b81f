//! Merging a new frame into existing dataset contents.
//!
//! With no merge keys the new rows are appended after the existing ones.
//! With merge keys the sides are full-outer-joined on the key tuple and new
//! values override existing values column by column. Either way the merged
//! frame carries the union schema, and shared columns must agree on a type
//! (int and float reconcile to float; everything else is an error).

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use datafusion::arrow::array::{new_null_array, ArrayRef, RecordBatch, RecordBatchOptions};
use datafusion::arrow::compute::{cast, concat_batches};
use datafusion::arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use datafusion::prelude::SessionContext;
use serde_json::{Map, Value};
use tracing::debug;

use uploader_core::UploadError;

use crate::infer::frame_from_rows;

/// The merged frame plus the columns that were not present in the existing
/// dataset (empty when there was no existing dataset).
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub frame: RecordBatch,
    pub new_columns: BTreeSet<String>,
}

/// Merge a batch of JSON rows into the existing frame, if any.
///
/// `merge_on` columns must be present and non-null in every row of both
/// sides. Non-unique key tuples are permitted on either side; the result may
/// then contain duplicated rows. Row order of the result is undefined.
pub async fn merge_frames(
    existing: Option<RecordBatch>,
    rows: &[Map<String, Value>],
    merge_on: &[String],
) -> Result<MergeOutcome, UploadError> {
    let incoming = frame_from_rows(rows)?;

    let (existing, incoming) = match (existing, incoming) {
        (None, None) => {
            return Ok(MergeOutcome {
                frame: RecordBatch::new_empty(Arc::new(Schema::empty())),
                new_columns: BTreeSet::new(),
            })
        }
        (None, Some(incoming)) => {
            // No existing dataset: the new frame is the result.
            return Ok(MergeOutcome {
                frame: incoming,
                new_columns: BTreeSet::new(),
            });
        }
        (Some(existing), None) => {
            // Nothing to add: the existing dataset is returned unchanged.
            return Ok(MergeOutcome {
                frame: existing,
                new_columns: BTreeSet::new(),
            });
        }
        (Some(existing), Some(incoming)) => (existing, incoming),
    };

    let new_columns: BTreeSet<String> = incoming
        .schema()
        .fields()
        .iter()
        .filter(|f| existing.schema().field_with_name(f.name()).is_err())
        .map(|f| f.name().clone())
        .collect();

    let frame = if merge_on.is_empty() {
        append(existing, incoming)?
    } else {
        full_outer_join(existing, incoming, merge_on).await?
    };

    Ok(MergeOutcome { frame, new_columns })
}

/// Reconcile the types of one column present on both sides. Int and float
/// widen to float; anything else is a mixed-type conflict.
fn reconcile(a: &DataType, b: &DataType) -> Option<DataType> {
    if a == b {
        return Some(a.clone());
    }
    match (a, b) {
        (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => {
            Some(DataType::Float64)
        }
        // Equal up to the timezone spelling.
        (DataType::Timestamp(unit_a, Some(_)), DataType::Timestamp(unit_b, Some(_)))
            if unit_a == unit_b =>
        {
            Some(a.clone())
        }
        _ => None,
    }
}

fn reconcile_shared_columns(
    existing: &Schema,
    incoming: &Schema,
) -> Result<HashMap<String, DataType>, UploadError> {
    let mut resolved = HashMap::new();
    let mut mixed = Vec::new();
    for field in existing.fields() {
        if let Ok(other) = incoming.field_with_name(field.name()) {
            match reconcile(field.data_type(), other.data_type()) {
                Some(data_type) => {
                    resolved.insert(field.name().clone(), data_type);
                }
                None => mixed.push(field.name().clone()),
            }
        }
    }
    if mixed.is_empty() {
        Ok(resolved)
    } else {
        Err(UploadError::InvalidType { columns: mixed })
    }
}

/// Rebuild a batch with reconciled column types and uniformly nullable
/// fields.
fn align_types(
    batch: &RecordBatch,
    resolved: &HashMap<String, DataType>,
) -> Result<RecordBatch, UploadError> {
    let mut fields = Vec::new();
    let mut arrays: Vec<ArrayRef> = Vec::new();
    for (i, field) in batch.schema().fields().iter().enumerate() {
        let array = batch.column(i);
        let target = resolved
            .get(field.name())
            .cloned()
            .unwrap_or_else(|| field.data_type().clone());
        if &target != field.data_type() {
            arrays.push(cast(array, &target).map_err(UploadError::internal)?);
        } else {
            arrays.push(array.clone());
        }
        fields.push(Field::new(field.name(), target, true));
    }
    let options = RecordBatchOptions::new().with_row_count(Some(batch.num_rows()));
    RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), arrays, &options)
        .map_err(UploadError::internal)
}

/// Project a batch onto the union schema, null-filling absent columns.
fn project_onto(batch: &RecordBatch, schema: &SchemaRef) -> Result<RecordBatch, UploadError> {
    let mut arrays: Vec<ArrayRef> = Vec::new();
    for field in schema.fields() {
        match batch.schema().index_of(field.name()) {
            Ok(i) => arrays.push(batch.column(i).clone()),
            Err(_) => arrays.push(new_null_array(field.data_type(), batch.num_rows())),
        }
    }
    let options = RecordBatchOptions::new().with_row_count(Some(batch.num_rows()));
    RecordBatch::try_new_with_options(schema.clone(), arrays, &options)
        .map_err(UploadError::internal)
}

/// Concatenate existing and new rows, in that order, under the union schema.
fn append(existing: RecordBatch, incoming: RecordBatch) -> Result<RecordBatch, UploadError> {
    let resolved = reconcile_shared_columns(&existing.schema(), &incoming.schema())?;
    let existing = align_types(&existing, &resolved)?;
    let incoming = align_types(&incoming, &resolved)?;

    let mut fields: Vec<Field> = existing
        .schema()
        .fields()
        .iter()
        .map(|f| f.as_ref().clone())
        .collect();
    for field in incoming.schema().fields() {
        if existing.schema().field_with_name(field.name()).is_err() {
            fields.push(field.as_ref().clone());
        }
    }
    let schema = Arc::new(Schema::new(fields));

    let aligned = [
        project_onto(&existing, &schema)?,
        project_onto(&incoming, &schema)?,
    ];
    concat_batches(&schema, &aligned).map_err(UploadError::internal)
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Full outer join of incoming against existing on the key tuple, with
/// incoming values overriding existing values cell by cell.
async fn full_outer_join(
    existing: RecordBatch,
    incoming: RecordBatch,
    merge_on: &[String],
) -> Result<RecordBatch, UploadError> {
    let missing: Vec<String> = merge_on
        .iter()
        .filter(|key| {
            existing.schema().field_with_name(key).is_err()
                || incoming.schema().field_with_name(key).is_err()
        })
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(UploadError::MissingMergeColumns(format!(
            "Missing merge column(s): {}",
            missing.join(", ")
        )));
    }

    let mut null_keys = Vec::new();
    for key in merge_on {
        for batch in [&existing, &incoming] {
            let index = batch
                .schema()
                .index_of(key)
                .map_err(UploadError::internal)?;
            if batch.column(index).null_count() > 0 {
                null_keys.push(key.clone());
                break;
            }
        }
    }
    if !null_keys.is_empty() {
        return Err(UploadError::MissingMergeColumns(format!(
            "Merge column(s) contain null values: {}",
            null_keys.join(", ")
        )));
    }

    let resolved = reconcile_shared_columns(&existing.schema(), &incoming.schema())?;
    let existing = align_types(&existing, &resolved)?;
    let incoming = align_types(&incoming, &resolved)?;

    // Output plan: keys in mergeOn order, then the remaining existing
    // columns, then the columns only the new data has.
    let is_key = |name: &str| merge_on.iter().any(|k| k == name);
    let mut select = Vec::new();
    let mut output_fields = Vec::new();
    for key in merge_on {
        let q = quote(key);
        select.push(format!("COALESCE(i.{q}, e.{q}) AS {q}"));
        let field = existing
            .schema()
            .field_with_name(key)
            .map_err(UploadError::internal)?
            .clone();
        output_fields.push(Field::new(key, field.data_type().clone(), true));
    }
    for field in existing.schema().fields() {
        let name = field.name();
        if is_key(name) {
            continue;
        }
        let q = quote(name);
        if incoming.schema().field_with_name(name).is_ok() {
            select.push(format!("COALESCE(i.{q}, e.{q}) AS {q}"));
        } else {
            select.push(format!("e.{q} AS {q}"));
        }
        output_fields.push(Field::new(name, field.data_type().clone(), true));
    }
    for field in incoming.schema().fields() {
        let name = field.name();
        if is_key(name) || existing.schema().field_with_name(name).is_ok() {
            continue;
        }
        let q = quote(name);
        select.push(format!("i.{q} AS {q}"));
        output_fields.push(Field::new(name, field.data_type().clone(), true));
    }

    let on: Vec<String> = merge_on
        .iter()
        .map(|key| {
            let q = quote(key);
            format!("i.{q} = e.{q}")
        })
        .collect();
    let sql = format!(
        "SELECT {} FROM incoming AS i FULL OUTER JOIN existing AS e ON {}",
        select.join(", "),
        on.join(" AND ")
    );
    debug!(%sql, "merging with a full outer join");

    let ctx = SessionContext::new();
    ctx.register_batch("existing", existing)
        .map_err(UploadError::internal)?;
    ctx.register_batch("incoming", incoming)
        .map_err(UploadError::internal)?;
    let batches = ctx
        .sql(&sql)
        .await
        .map_err(UploadError::internal)?
        .collect()
        .await
        .map_err(UploadError::internal)?;

    match batches.first() {
        None => Ok(RecordBatch::new_empty(Arc::new(Schema::new(output_fields)))),
        Some(first) => concat_batches(&first.schema(), &batches).map_err(UploadError::internal),
    }
}
