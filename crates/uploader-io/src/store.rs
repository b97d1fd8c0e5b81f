//! The columnar table at a storage path.
//!
//! Tables are directories of parquet part files under an object-store
//! prefix. Writes are overwrite-only: the whole table is rewritten on every
//! publication, so a table has a single schema at rest and schema evolution
//! is resolved upstream in the merge.

use std::sync::Arc;

use datafusion::arrow::array::RecordBatch;
use datafusion::arrow::compute::concat_batches;
use datafusion::parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use datafusion::parquet::arrow::arrow_writer::ArrowWriter;
use datafusion::parquet::file::properties::WriterProperties;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use tracing::info;
use uuid::Uuid;

use uploader_core::{Config, UploadError};

pub struct TableStore {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl TableStore {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        TableStore {
            store,
            bucket: bucket.into(),
        }
    }

    /// S3-backed store; credentials come from the standard AWS environment.
    pub fn from_env(config: &Config) -> Result<Self, UploadError> {
        let store = AmazonS3Builder::from_env()
            .with_region(&config.region)
            .with_bucket_name(&config.bucket)
            .build()
            .map_err(UploadError::internal)?;
        Ok(TableStore::new(Arc::new(store), &config.bucket))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectPath>, UploadError> {
        let prefix = ObjectPath::from(prefix);
        let objects: Vec<_> = self
            .store
            .list(Some(&prefix))
            .try_collect()
            .await
            .map_err(UploadError::internal)?;
        Ok(objects.into_iter().map(|meta| meta.location).collect())
    }

    /// Read the table at `prefix` into a single frame. `None` when no table
    /// exists there.
    pub async fn read_table(&self, prefix: &str) -> Result<Option<RecordBatch>, UploadError> {
        let part_files: Vec<ObjectPath> = self
            .list_objects(prefix)
            .await?
            .into_iter()
            .filter(|location| location.as_ref().ends_with(".parquet"))
            .collect();
        if part_files.is_empty() {
            return Ok(None);
        }

        let mut schema = None;
        let mut batches = Vec::new();
        for location in part_files {
            let data = self
                .store
                .get(&location)
                .await
                .map_err(UploadError::internal)?
                .bytes()
                .await
                .map_err(UploadError::internal)?;
            let builder =
                ParquetRecordBatchReaderBuilder::try_new(data).map_err(UploadError::internal)?;
            if schema.is_none() {
                schema = Some(builder.schema().clone());
            }
            let reader = builder.build().map_err(UploadError::internal)?;
            for batch in reader {
                batches.push(batch.map_err(UploadError::internal)?);
            }
        }

        let schema = match schema {
            Some(schema) => schema,
            None => return Ok(None),
        };
        if batches.is_empty() {
            return Ok(Some(RecordBatch::new_empty(schema)));
        }
        concat_batches(&schema, &batches)
            .map(Some)
            .map_err(UploadError::internal)
    }

    /// Overwrite the table at `prefix` with the given frame.
    pub async fn write_table(&self, prefix: &str, frame: &RecordBatch) -> Result<(), UploadError> {
        self.delete_prefix(prefix).await?;

        let mut buffer = Vec::new();
        let props = WriterProperties::builder().build();
        let mut writer = ArrowWriter::try_new(&mut buffer, frame.schema(), Some(props))
            .map_err(UploadError::internal)?;
        writer.write(frame).map_err(UploadError::internal)?;
        writer.close().map_err(UploadError::internal)?;

        let location = ObjectPath::from(format!("{prefix}/data-{}.parquet", Uuid::new_v4()));
        self.store
            .put(&location, buffer.into())
            .await
            .map_err(UploadError::internal)?;
        info!("wrote {} rows to {}", frame.num_rows(), location);
        Ok(())
    }

    pub async fn delete_prefix(&self, prefix: &str) -> Result<(), UploadError> {
        for location in self.list_objects(prefix).await? {
            self.store
                .delete(&location)
                .await
                .map_err(UploadError::internal)?;
        }
        Ok(())
    }

    /// File names under `prefix`, relative to it.
    pub async fn list_filenames(&self, prefix: &str) -> Result<Vec<String>, UploadError> {
        let full_prefix = format!("{prefix}/");
        Ok(self
            .list_objects(prefix)
            .await?
            .into_iter()
            .map(|location| {
                let raw = location.as_ref();
                raw.strip_prefix(&full_prefix).unwrap_or(raw).to_string()
            })
            .collect())
    }

    pub async fn put_json(&self, key: &str, body: Vec<u8>) -> Result<(), UploadError> {
        self.store
            .put(&ObjectPath::from(key), body.into())
            .await
            .map_err(UploadError::internal)?;
        Ok(())
    }

    pub async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, UploadError> {
        let data = self
            .store
            .get(&ObjectPath::from(key))
            .await
            .map_err(UploadError::internal)?
            .bytes()
            .await
            .map_err(UploadError::internal)?;
        Ok(data.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datafusion::arrow::array::Int64Array;
    use datafusion::arrow::datatypes::{DataType, Field, Schema};
    use object_store::memory::InMemory;

    fn store() -> TableStore {
        TableStore::new(Arc::new(InMemory::new()), "testbucket")
    }

    fn frame(values: &[i64]) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("a", DataType::Int64, true)]));
        RecordBatch::try_new(
            schema,
            vec![Arc::new(Int64Array::from(values.to_vec()))],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn missing_table_reads_as_none() {
        assert!(store()
            .read_table("processed/green/ds1/version=1/latest")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn write_then_read_preserves_content() {
        let store = store();
        let prefix = "processed/green/ds1/version=1/latest";
        store.write_table(prefix, &frame(&[1, 2, 3])).await.unwrap();

        let read = store.read_table(prefix).await.unwrap().unwrap();
        assert_eq!(read.num_rows(), 3);

        let filenames = store.list_filenames(prefix).await.unwrap();
        assert_eq!(filenames.len(), 1);
        assert!(filenames[0].starts_with("data-"));
        assert!(filenames[0].ends_with(".parquet"));
    }

    #[tokio::test]
    async fn rewrite_replaces_the_previous_part_files() {
        let store = store();
        let prefix = "processed/green/ds1/version=1/latest";
        store.write_table(prefix, &frame(&[1, 2, 3])).await.unwrap();
        store.write_table(prefix, &frame(&[4])).await.unwrap();

        let read = store.read_table(prefix).await.unwrap().unwrap();
        assert_eq!(read.num_rows(), 1);
        assert_eq!(store.list_filenames(prefix).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_prefix_leaves_siblings_alone() {
        let store = store();
        store
            .write_table("processed/green/ds1/version=1/latest", &frame(&[1]))
            .await
            .unwrap();
        store
            .write_table("processed/green/ds1/version=1/edition=e1", &frame(&[1]))
            .await
            .unwrap();
        store
            .delete_prefix("processed/green/ds1/version=1/latest")
            .await
            .unwrap();

        assert!(store
            .read_table("processed/green/ds1/version=1/latest")
            .await
            .unwrap()
            .is_none());
        assert!(store
            .read_table("processed/green/ds1/version=1/edition=e1")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn raw_json_round_trips_verbatim() {
        let store = store();
        let key = "raw/green/ds1/version=1/edition=e1/data.json";
        store
            .put_json(key, br#"[{"id": 1}]"#.to_vec())
            .await
            .unwrap();
        assert_eq!(store.get_bytes(key).await.unwrap(), br#"[{"id": 1}]"#);
    }
}
