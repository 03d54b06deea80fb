//! Model checkpoints.
//!
//! A checkpoint is one JSON document, gzip-compressed when the path ends in
//! `.gz`:
//!
//! ```text
//! {
//!   "format":  "srn-checkpoint",
//!   "version": 1,
//!   "config":  { ...StereoRestorerConfig... },
//!   "params":  { ...full-precision burn record, keyed by module field... }
//! }
//! ```
//!
//! Parameters are addressed by their dotted field path in the module tree
//! (`encoders.0.fusion.scam.beta`). Loading compares these names and shapes
//! against the target network before anything is applied, so a checkpoint
//! from a different architecture is either rejected ([`LoadMode::Strict`])
//! or applied where it fits ([`LoadMode::Permissive`]).

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use burn::module::Module;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, Record};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use srn_model::{StereoRestorer, StereoRestorerConfig};
use tracing::{debug, info, warn};

use crate::error::CheckpointError;

pub const FORMAT_TAG: &str = "srn-checkpoint";
pub const FORMAT_VERSION: u32 = 1;

type Result<T> = std::result::Result<T, CheckpointError>;

type RecordItem<B, M> =
    <<M as Module<B>>::Record as Record<B>>::Item<FullPrecisionSettings>;

/// How parameter name or shape disagreements are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    /// Any disagreement is an error and nothing is loaded.
    #[default]
    Strict,
    /// Load what matches, keep fresh values elsewhere.
    Permissive,
}

/// Outcome of matching a checkpoint against a network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Parameters taken from the checkpoint
    pub loaded: Vec<String>,
    /// Network parameters absent from the checkpoint
    pub missing: Vec<String>,
    /// Checkpoint parameters the network does not have
    pub unexpected: Vec<String>,
    /// Parameters present on both sides with different shapes
    pub mismatched: Vec<String>,
}

impl LoadReport {
    /// True when every parameter matched by name and shape.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty() && self.mismatched.is_empty()
    }

    fn into_error(self) -> CheckpointError {
        CheckpointError::ParameterMismatch {
            missing: self.missing,
            unexpected: self.unexpected,
            mismatched: self.mismatched,
        }
    }

    fn log(&self) {
        if self.is_complete() {
            debug!("Loaded all {} parameters", self.loaded.len());
            return;
        }
        warn!(
            "Partial load: {} loaded, {} missing, {} unexpected, {} mismatched",
            self.loaded.len(),
            self.missing.len(),
            self.unexpected.len(),
            self.mismatched.len()
        );
        for name in &self.missing {
            warn!("  missing: {}", name);
        }
        for name in &self.unexpected {
            warn!("  unexpected: {}", name);
        }
        for name in &self.mismatched {
            warn!("  shape mismatch: {}", name);
        }
    }
}

/// In-memory checkpoint document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub format: String,
    pub version: u32,
    pub config: StereoRestorerConfig,
    pub params: Value,
}

impl Checkpoint {
    /// Snapshot a model together with the configuration that built it.
    pub fn new<B: Backend>(model: &StereoRestorer<B>) -> Result<Self> {
        Ok(Self {
            format: FORMAT_TAG.to_string(),
            version: FORMAT_VERSION,
            config: model.config().clone(),
            params: record_value::<B, _>(model)?,
        })
    }

    fn check_header(&self) -> Result<()> {
        if self.format != FORMAT_TAG {
            return Err(CheckpointError::format(format!(
                "expected format tag '{}', found '{}'",
                FORMAT_TAG, self.format
            )));
        }
        if self.version != FORMAT_VERSION {
            return Err(CheckpointError::format(format!(
                "unsupported checkpoint version {} (this build reads version {})",
                self.version, FORMAT_VERSION
            )));
        }
        Ok(())
    }

    /// Shape of every stored parameter, keyed by dotted path.
    pub fn parameter_shapes(&self) -> Result<BTreeMap<String, Vec<usize>>> {
        Ok(param_leaves(&self.params)?
            .into_iter()
            .map(|(name, leaf)| (name, leaf.shape))
            .collect())
    }

    /// Total number of stored scalars.
    pub fn num_parameters(&self) -> Result<usize> {
        Ok(self
            .parameter_shapes()?
            .values()
            .map(|shape| shape.iter().product::<usize>())
            .sum())
    }

    /// Build the network described by the embedded config and load the parameters.
    pub fn into_model<B: Backend>(
        self,
        device: &B::Device,
        mode: LoadMode,
    ) -> Result<(StereoRestorer<B>, StereoRestorerConfig, LoadReport)> {
        let model = self.config.init::<B>(device)?;
        let (model, report) = apply_params(model, &self.params, device, mode)?;
        Ok((model, self.config, report))
    }

    /// Load the parameters into an existing network.
    pub fn load_into<B: Backend>(
        &self,
        model: StereoRestorer<B>,
        device: &B::Device,
        mode: LoadMode,
    ) -> Result<(StereoRestorer<B>, LoadReport)> {
        apply_params(model, &self.params, device, mode)
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

/// Serialise a checkpoint to any writer as plain JSON.
pub fn write_checkpoint<B: Backend, W: Write>(writer: W, model: &StereoRestorer<B>) -> Result<()> {
    let checkpoint = Checkpoint::new(model)?;
    serde_json::to_writer(writer, &checkpoint)?;
    Ok(())
}

/// Save a checkpoint to `path`, gzip-compressed if it ends in `.gz`.
pub fn save_checkpoint<B: Backend, P: AsRef<Path>>(model: &StereoRestorer<B>, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = BufWriter::new(File::create(path)?);

    if is_gzip(path) {
        let mut encoder = GzEncoder::new(file, Compression::default());
        write_checkpoint(&mut encoder, model)?;
        encoder.finish()?.flush()?;
    } else {
        let mut file = file;
        write_checkpoint(&mut file, model)?;
        file.flush()?;
    }

    info!("Saved checkpoint to {}", path.display());
    Ok(())
}

/// Parse and validate the header of a plain JSON checkpoint.
pub fn read_checkpoint<R: Read>(reader: R) -> Result<Checkpoint> {
    let checkpoint: Checkpoint = serde_json::from_reader(reader)?;
    checkpoint.check_header()?;
    Ok(checkpoint)
}

/// Read a checkpoint file, decompressing `.gz` paths.
pub fn open_checkpoint<P: AsRef<Path>>(path: P) -> Result<Checkpoint> {
    let path = path.as_ref();
    let file = BufReader::new(File::open(path)?);
    if is_gzip(path) {
        read_checkpoint(GzDecoder::new(file))
    } else {
        read_checkpoint(file)
    }
}

/// Rebuild a network from a checkpoint file.
pub fn load_checkpoint<B: Backend, P: AsRef<Path>>(
    path: P,
    device: &B::Device,
    mode: LoadMode,
) -> Result<(StereoRestorer<B>, StereoRestorerConfig, LoadReport)> {
    let path = path.as_ref();
    let result = open_checkpoint(path)?.into_model(device, mode)?;
    info!("Loaded checkpoint from {}", path.display());
    Ok(result)
}

/// Load checkpoint parameters into an existing network.
pub fn load_weights<B: Backend, P: AsRef<Path>>(
    model: StereoRestorer<B>,
    path: P,
    device: &B::Device,
    mode: LoadMode,
) -> Result<(StereoRestorer<B>, LoadReport)> {
    open_checkpoint(path)?.load_into(model, device, mode)
}

/// Full-precision record of `module` as a JSON tree.
fn record_value<B: Backend, M: Module<B>>(module: &M) -> Result<Value> {
    let item: RecordItem<B, M> = module
        .clone()
        .into_record()
        .into_item::<FullPrecisionSettings>();
    Ok(serde_json::to_value(item)?)
}

/// Match `params` against `module` and load whatever `mode` allows.
fn apply_params<B: Backend, M: Module<B>>(
    module: M,
    params: &Value,
    device: &B::Device,
    mode: LoadMode,
) -> Result<(M, LoadReport)> {
    let mut tree = record_value::<B, M>(&module)?;
    let expected = param_leaves(&tree)?
        .into_iter()
        .map(|(name, leaf)| (name, leaf.shape))
        .collect::<BTreeMap<_, _>>();
    let provided = param_leaves(params)?;

    let mut report = LoadReport::default();
    for (name, shape) in &expected {
        match provided.get(name) {
            Some(leaf) if leaf.shape == *shape => report.loaded.push(name.clone()),
            Some(_) => report.mismatched.push(name.clone()),
            None => report.missing.push(name.clone()),
        }
    }
    report.unexpected = provided
        .keys()
        .filter(|name| !expected.contains_key(*name))
        .cloned()
        .collect();

    if mode == LoadMode::Strict && !report.is_complete() {
        return Err(report.into_error());
    }

    let loaded: BTreeSet<&str> = report.loaded.iter().map(String::as_str).collect();
    merge_params(&mut tree, &provided, &loaded, &mut Vec::new());

    let item: RecordItem<B, M> = serde_json::from_value(tree)?;
    let record = <M::Record as Record<B>>::from_item::<FullPrecisionSettings>(item, device);
    report.log();
    Ok((module.load_record(record), report))
}

struct ParamLeaf<'a> {
    shape: Vec<usize>,
    value: &'a Value,
}

/// A serialised `Param` is an object carrying both an `id` and a `param`.
fn is_param(map: &Map<String, Value>) -> bool {
    map.contains_key("id") && map.contains_key("param")
}

fn find_shape(value: &Value) -> Option<Vec<usize>> {
    let Value::Object(map) = value else {
        return None;
    };
    if let Some(Value::Array(dims)) = map.get("shape") {
        return dims.iter().map(|d| d.as_u64().map(|d| d as usize)).collect();
    }
    map.values().find_map(find_shape)
}

fn param_leaves(value: &Value) -> Result<BTreeMap<String, ParamLeaf<'_>>> {
    let mut out = BTreeMap::new();
    collect_leaves(value, &mut Vec::new(), &mut out)?;
    Ok(out)
}

fn collect_leaves<'a>(
    value: &'a Value,
    path: &mut Vec<String>,
    out: &mut BTreeMap<String, ParamLeaf<'a>>,
) -> Result<()> {
    match value {
        Value::Object(map) if is_param(map) => {
            let name = path.join(".");
            let shape = map
                .get("param")
                .and_then(find_shape)
                .ok_or_else(|| CheckpointError::format(format!("parameter '{}' has no shape", name)))?;
            out.insert(name, ParamLeaf { shape, value });
        }
        Value::Object(map) => {
            for (key, child) in map {
                path.push(key.clone());
                collect_leaves(child, path, out)?;
                path.pop();
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                path.push(index.to_string());
                collect_leaves(child, path, out)?;
                path.pop();
            }
        }
        _ => {}
    }
    Ok(())
}

/// Overwrite the parameter leaves of `target` named in `loaded`.
fn merge_params(
    target: &mut Value,
    provided: &BTreeMap<String, ParamLeaf<'_>>,
    loaded: &BTreeSet<&str>,
    path: &mut Vec<String>,
) {
    let leaf_here = matches!(target, Value::Object(map) if is_param(map));
    if leaf_here {
        let name = path.join(".");
        if loaded.contains(name.as_str()) {
            if let Some(leaf) = provided.get(&name) {
                *target = leaf.value.clone();
            }
        }
        return;
    }

    match target {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                path.push(key.clone());
                merge_params(child, provided, loaded, path);
                path.pop();
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter_mut().enumerate() {
                path.push(index.to_string());
                merge_params(child, provided, loaded, path);
                path.pop();
            }
        }
        _ => {}
    }
}
