//! Parquet files of encoded key-value pairs, used when map output is
//! spilled to disk between the map and reduce phases.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BinaryArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::errors::{Error, Result};
use crate::KeyValue;

fn schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("key", DataType::Binary, false),
        Field::new("value", DataType::Binary, false),
    ]))
}

fn writer_props() -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build()
}

/// Writes `pairs` as a single row group of `(key, value)` binary columns.
pub fn write_parquet(path: &Path, pairs: &[KeyValue]) -> Result<()> {
    let file = File::create(path)?;
    let keys: Vec<&[u8]> = pairs.iter().map(|kv| kv.key.as_ref()).collect();
    let values: Vec<&[u8]> = pairs.iter().map(|kv| kv.value.as_ref()).collect();

    let batch = RecordBatch::try_new(
        schema(),
        vec![
            Arc::new(BinaryArray::from(keys)) as ArrayRef,
            Arc::new(BinaryArray::from(values)) as ArrayRef,
        ],
    )
    .map_err(Error::serialization)?;

    let mut writer =
        ArrowWriter::try_new(file, batch.schema(), Some(writer_props())).map_err(Error::serialization)?;
    writer.write(&batch).map_err(Error::serialization)?;
    // the footer is only written on close
    writer.close().map_err(Error::serialization)?;
    Ok(())
}

fn binary_column<'a>(batch: &'a RecordBatch, idx: usize) -> Result<&'a BinaryArray> {
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<BinaryArray>()
        .ok_or_else(|| Error::serialization(format!("column {idx} is not binary")))
}

/// Reads back every pair written by [`write_parquet`], across all batches.
pub fn read_parquet(path: &Path) -> Result<Vec<KeyValue>> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(Error::serialization)?
        .build()
        .map_err(Error::serialization)?;

    let mut pairs = Vec::new();
    for batch in reader {
        let batch = batch.map_err(Error::serialization)?;
        if batch.num_columns() != 2 {
            return Err(Error::serialization(format!(
                "expected 2 columns, found {}",
                batch.num_columns()
            )));
        }
        let keys = binary_column(&batch, 0)?;
        let values = binary_column(&batch, 1)?;
        for i in 0..batch.num_rows() {
            pairs.push(KeyValue {
                key: Bytes::copy_from_slice(keys.value(i)),
                value: Bytes::copy_from_slice(values.value(i)),
            });
        }
    }
    Ok(pairs)
}
