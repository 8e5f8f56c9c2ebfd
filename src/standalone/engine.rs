//! Single-machine MapReduce engine.
//!
//! Input files are cut into line-aligned splits, one map task per split.
//! Map tasks run on the blocking pool and partition their output with
//! [`ihash`]; when the workload has a combiner each partition is sorted and
//! combined before it leaves the task. Partitions then reach the reduce
//! tasks either through a shared in-memory map or as parquet spill files.

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use dashmap::DashMap;
use glob::glob;
use itertools::Itertools;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::encode::encode_decode::{read_parquet, write_parquet};
use crate::standalone::{Job, ShuffleMode};
use crate::*;

// types related to this engine
type BucketIndex = u32;
type Buckets = DashMap<BucketIndex, Vec<KeyValue>>;

/// Directory (under the output) holding spill files while the job runs.
pub const TEMPORARY_DIR: &str = "_temporary";
/// Empty marker written once every output file is complete.
pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// A line-aligned slice of one input file.
#[derive(Debug, Clone)]
pub struct InputSplit {
    pub path: PathBuf,
    /// Byte offset of `data` within the file.
    pub start: u64,
    pub data: Bytes,
}

/// Job-wide record counts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub map_splits: u64,
    pub map_output_records: u64,
    pub combine_output_records: u64,
    pub reduce_groups: u64,
}

impl Counters {
    fn add(&mut self, other: Counters) {
        self.map_splits += other.map_splits;
        self.map_output_records += other.map_output_records;
        self.combine_output_records += other.combine_output_records;
        self.reduce_groups += other.reduce_groups;
    }
}

/// Where the map phase left its output.
pub enum Shuffled {
    Memory(Arc<Buckets>),
    Spill(PathBuf),
}

/// Expands the job input into files. A directory means every file directly
/// inside it; anything else is treated as a glob spec. Files whose names
/// start with `_` or `.` are skipped.
pub fn input_files(input: &str) -> Result<Vec<PathBuf>> {
    let pattern = if Path::new(input).is_dir() {
        format!("{}/*", input.trim_end_matches('/'))
    } else {
        input.to_string()
    };
    let mut files = Vec::new();
    for path in glob(&pattern)? {
        let path = path?;
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| n.starts_with('_') || n.starts_with('.'));
        if path.is_file() && !hidden {
            files.push(path);
        }
    }
    if files.is_empty() {
        bail!("input `{}` matched no files", input);
    }
    files.sort();
    Ok(files)
}

/// Cuts `data` into splits of at least `split_size` bytes that end just
/// after a newline (or at end of file), so no line straddles two splits.
pub fn compute_splits(path: &Path, data: Bytes, split_size: u64) -> Vec<InputSplit> {
    let len = data.len();
    let split_size = split_size.max(1) as usize;
    let mut splits = Vec::new();
    let mut start = 0;
    while start < len {
        let target = start.saturating_add(split_size - 1);
        let end = if target >= len {
            len
        } else {
            data[target..]
                .iter()
                .position(|b| *b == b'\n')
                .map_or(len, |pos| target + pos + 1)
        };
        splits.push(InputSplit {
            path: path.to_path_buf(),
            start: start as u64,
            data: data.slice(start..end),
        });
        start = end;
    }
    splits
}

/// Reads every input file and splits it.
pub fn read_splits(job: &Job) -> Result<Vec<InputSplit>> {
    let mut splits = Vec::new();
    for path in input_files(&job.input)? {
        let data = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        let file_splits = compute_splits(&path, Bytes::from(data), job.split_size);
        debug!(file = %path.display(), splits = file_splits.len(), "split input file");
        splits.extend(file_splits);
    }
    Ok(splits)
}

/// Sorts one partition with the workload's comparator and runs the combiner
/// over each key group.
pub fn combine_partition(
    engine: &Workload,
    combine_fn: CombineFn,
    mut bkt: Vec<KeyValue>,
    serialized_args: &Bytes,
) -> Result<Vec<KeyValue>> {
    let compare = engine.compare_fn;
    bkt.sort_by(|a, b| compare(&a.key, &b.key));
    let mut combined = Vec::new();
    for (key, value_group) in &bkt.into_iter().chunk_by(KeyValue::key) {
        let iter = value_group.map(KeyValue::into_value);
        let value = combine_fn(key.clone(), Box::new(iter), serialized_args.clone())?;
        combined.push(KeyValue { key, value });
    }
    Ok(combined)
}

/// Runs one map task and returns its output grouped by partition.
fn run_map_task(
    engine: &Workload,
    split: InputSplit,
    serialized_args: &Bytes,
    num_reduce_worker: u32,
    combine: bool,
) -> Result<(HashMap<BucketIndex, Vec<KeyValue>>, Counters)> {
    let mut counters = Counters {
        map_splits: 1,
        ..Counters::default()
    };
    let input_kv = KeyValue {
        key: utils::offset_to_bytes(split.start),
        value: split.data,
    };
    let map_func = engine.map_fn;
    let mut partitions: HashMap<BucketIndex, Vec<KeyValue>> = HashMap::new();
    for item in map_func(input_kv, serialized_args.clone())? {
        let KeyValue { key, value } = item?;
        let bucket_no = ihash(&key) % num_reduce_worker;
        counters.map_output_records += 1;
        partitions
            .entry(bucket_no)
            .or_default()
            .push(KeyValue { key, value });
    }

    if let (true, Some(combine_fn)) = (combine, engine.combine_fn) {
        for bkt in partitions.values_mut() {
            *bkt = combine_partition(engine, combine_fn, std::mem::take(bkt), serialized_args)?;
        }
    }
    counters.combine_output_records = partitions.values().map(|b| b.len() as u64).sum();
    Ok((partitions, counters))
}

fn spill_partition_dir(spill_dir: &Path, bucket_no: BucketIndex) -> PathBuf {
    spill_dir.join(format!("part-{bucket_no}"))
}

/// Runs every map task concurrently and shuffles their output by partition.
pub async fn perform_map(
    job: &Job,
    engine: &Workload,
    serialized_args: &Bytes,
    splits: Vec<InputSplit>,
    spill_dir: Option<&Path>,
) -> Result<(Shuffled, Counters)> {
    let buckets: Arc<Buckets> = Arc::new(Buckets::new());
    let num_reduce_worker = job.n_reduce;
    let combine = job.combine;

    let mut tasks = JoinSet::new();
    for (task_id, split) in splits.into_iter().enumerate() {
        let engine = *engine;
        let args = serialized_args.clone();
        let buckets = buckets.clone();
        let spill_dir = spill_dir.map(Path::to_path_buf);
        tasks.spawn_blocking(move || -> Result<Counters> {
            let origin = format!("{}@{}", split.path.display(), split.start);
            let (partitions, counters) =
                run_map_task(&engine, split, &args, num_reduce_worker, combine)
                    .with_context(|| format!("map task {task_id} ({origin})"))?;
            for (bucket_no, key_values) in partitions {
                match &spill_dir {
                    Some(dir) => {
                        let part_dir = spill_partition_dir(dir, bucket_no);
                        fs::create_dir_all(&part_dir)?;
                        write_parquet(&part_dir.join(format!("map-{task_id}.parquet")), &key_values)?;
                    }
                    None => buckets
                        .entry(bucket_no)
                        .or_insert_with(Vec::new)
                        .extend(key_values),
                }
            }
            debug!(task_id, origin = %origin, ?counters, "map task finished");
            Ok(counters)
        });
    }

    let mut counters = Counters::default();
    while let Some(joined) = tasks.join_next().await {
        counters.add(joined.context("map task panicked")??);
    }
    info!(
        splits = counters.map_splits,
        records = counters.map_output_records,
        combined = counters.combine_output_records,
        "map phase complete"
    );

    let shuffled = match spill_dir {
        Some(dir) => Shuffled::Spill(dir.to_path_buf()),
        None => Shuffled::Memory(buckets),
    };
    Ok((shuffled, counters))
}

/// Sorts one partition with the workload's comparator, reduces each key
/// group and writes the results to `out_pathspec`. Returns the group count.
pub fn reduce_partition(
    engine: &Workload,
    mut bkt: Vec<KeyValue>,
    serialized_args: &Bytes,
    out_pathspec: &Path,
) -> Result<u64> {
    let reduce_func = engine.reduce_fn;
    let compare = engine.compare_fn;
    let mut out_file = BufWriter::new(File::create(out_pathspec)?);
    bkt.sort_by(|a, b| compare(&a.key, &b.key));
    let mut groups = 0;
    // Iterate through the values associated with each key and apply reduce function and write to file.
    for (key, value_group) in &bkt.into_iter().chunk_by(KeyValue::key) {
        let iter = value_group.map(KeyValue::into_value);
        let out = reduce_func(key.clone(), Box::new(iter), serialized_args.clone())?;
        out_file.write_all(&out)?;
        groups += 1;
    }
    out_file.flush()?;
    Ok(groups)
}

fn gather_spilled(spill_dir: &Path, bucket_no: BucketIndex) -> Result<Vec<KeyValue>> {
    let part_dir = spill_partition_dir(spill_dir, bucket_no);
    if !part_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = fs::read_dir(&part_dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    files.sort();
    let mut key_values = Vec::new();
    for file in files {
        key_values.extend(read_parquet(&file).with_context(|| format!("reading spill {}", file.display()))?);
    }
    Ok(key_values)
}

/// Runs one reduce task per partition; every partition gets an output file
/// `mr-out-<n>`, empty if no key hashed to it.
pub async fn perform_reduce(
    job: &Job,
    engine: &Workload,
    serialized_args: &Bytes,
    shuffled: Shuffled,
) -> Result<Counters> {
    let output_dir = PathBuf::from(&job.output);
    let shuffled = Arc::new(shuffled);

    let mut tasks = JoinSet::new();
    for reduce_id in 0..job.n_reduce {
        let engine = *engine;
        let args = serialized_args.clone();
        let shuffled = shuffled.clone();
        let out_pathspec = output_dir.join(format!("mr-out-{reduce_id}"));
        tasks.spawn_blocking(move || -> Result<u64> {
            let bkt = match shuffled.as_ref() {
                Shuffled::Memory(buckets) => buckets
                    .remove(&reduce_id)
                    .map(|(_, key_values)| key_values)
                    .unwrap_or_default(),
                Shuffled::Spill(dir) => gather_spilled(dir, reduce_id)?,
            };
            let groups = reduce_partition(&engine, bkt, &args, &out_pathspec)
                .with_context(|| format!("reduce task {reduce_id}"))?;
            debug!(reduce_id, groups, "reduce task finished");
            Ok(groups)
        });
    }

    let mut counters = Counters::default();
    while let Some(joined) = tasks.join_next().await {
        counters.reduce_groups += joined.context("reduce task panicked")??;
    }
    info!(groups = counters.reduce_groups, "reduce phase complete");
    Ok(counters)
}

/// Creates the output directory. Refuses to reuse an existing one so a
/// previous run's results are never mixed with this one's.
fn prepare_output(output_dir: &Path) -> Result<()> {
    if output_dir.exists() {
        bail!("output directory `{}` already exists", output_dir.display());
    }
    fs::create_dir_all(output_dir)
        .with_context(|| format!("creating output directory {}", output_dir.display()))?;
    Ok(())
}

fn remove_temporary(output_dir: &Path, spill_dir: &Path) {
    if let Err(e) = fs::remove_dir_all(spill_dir) {
        warn!("could not remove {}: {}", spill_dir.display(), e);
    }
    // only succeeds once no other attempt is using it
    let _ = fs::remove_dir(output_dir.join(TEMPORARY_DIR));
}

/// Runs `job` end to end: split, map (+ combine), shuffle, reduce.
pub async fn run_job(job: &Job) -> Result<Counters> {
    job.validate()?;
    let engine = workload::named(&job.workload)?;
    let serialized_args = Bytes::from(serde_json::to_vec(&job.args)?);
    let output_dir = PathBuf::from(&job.output);

    let splits = read_splits(job)?;
    prepare_output(&output_dir)?;

    let spill_dir = match job.shuffle {
        ShuffleMode::Spill => Some(
            output_dir
                .join(TEMPORARY_DIR)
                .join(Uuid::new_v4().to_string()),
        ),
        ShuffleMode::Memory => None,
    };
    info!(
        input = %job.input,
        output = %job.output,
        workload = %job.workload,
        splits = splits.len(),
        reducers = job.n_reduce,
        "starting job"
    );

    let result = async {
        let (shuffled, mut counters) =
            perform_map(job, &engine, &serialized_args, splits, spill_dir.as_deref()).await?;
        counters.add(perform_reduce(job, &engine, &serialized_args, shuffled).await?);
        Ok::<_, anyhow::Error>(counters)
    }
    .await;

    if let Some(dir) = &spill_dir {
        remove_temporary(&output_dir, dir);
    }
    let counters = result?;
    File::create(output_dir.join(SUCCESS_MARKER))?;
    Ok(counters)
}
