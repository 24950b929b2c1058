//! Content-addressable store of extracted band matrices.
//!
//! Entries are keyed by the SHA-256 of a canonical JSON rendering of the
//! extraction inputs and stored as uncompressed `.npy` files, so they can be
//! loaded back with a plain `numpy.load` as well.

use crate::config::PipelineConfig;
use crate::types::{BandMatrix, Bounds, CbersError, CbersResult, SceneDescriptor};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const NPY_MAGIC: &[u8] = b"\x93NUMPY";
const NPY_EXTENSION: &str = "npy";

/// Inputs that fully determine one extracted band matrix
#[derive(Debug, Clone, Serialize)]
pub struct CacheKey {
    pub source_key: String,
    pub band: String,
    pub scene: SceneDescriptor,
    pub aoi_bounds: Bounds,
    pub width: usize,
    pub height: usize,
}

impl CacheKey {
    /// Hex digest of the canonicalized key fields
    pub fn digest(&self) -> CbersResult<String> {
        let value = serde_json::to_value(self)?;
        Ok(canonical_digest(&value))
    }
}

/// Rebuild a JSON value with every object's keys inserted in sorted order
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k.clone(), canonicalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// SHA-256 (hex) of the canonical serialization of `value`
pub fn canonical_digest(value: &Value) -> String {
    let canonical = canonicalize(value).to_string();
    let digest = Sha256::digest(canonical.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Digest an arbitrary field mapping; field order does not matter
pub fn hash_fields<K, I>(fields: I) -> String
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    let map: Map<String, Value> = fields.into_iter().map(|(k, v)| (k.into(), v)).collect();
    canonical_digest(&Value::Object(map))
}

/// Serialize a u8 matrix in NumPy `.npy` v1.0 layout
pub fn encode_npy(matrix: &BandMatrix) -> Vec<u8> {
    let (height, width) = matrix.dim();
    let mut header = format!(
        "{{'descr': '|u1', 'fortran_order': False, 'shape': ({}, {}), }}",
        height, width
    );
    // magic(6) + version(2) + header_len(2) + header + '\n' must be a multiple of 64
    let unpadded = NPY_MAGIC.len() + 4 + header.len() + 1;
    let padding = (64 - unpadded % 64) % 64;
    header.push_str(&" ".repeat(padding));
    header.push('\n');

    let mut bytes = Vec::with_capacity(NPY_MAGIC.len() + 4 + header.len() + height * width);
    bytes.extend_from_slice(NPY_MAGIC);
    bytes.extend_from_slice(&[1, 0]);
    bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
    bytes.extend_from_slice(header.as_bytes());
    // Standard layout iteration is row-major
    bytes.extend(matrix.iter().copied());
    bytes
}

fn shape_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"'shape':\s*\(\s*([0-9]+)\s*,\s*([0-9]+)\s*,?\s*\)").expect("shape pattern is valid")
    })
}

/// Parse a `.npy` buffer produced by [`encode_npy`] (or by NumPy for a
/// C-ordered 2-D uint8 array)
pub fn decode_npy(bytes: &[u8]) -> CbersResult<BandMatrix> {
    let invalid = |msg: &str| CbersError::Cache(format!("Invalid npy data: {}", msg));

    if bytes.len() < 10 || &bytes[..6] != NPY_MAGIC {
        return Err(invalid("missing magic"));
    }
    let (header_start, header_len) = match bytes[6] {
        1 => (10, u16::from_le_bytes([bytes[8], bytes[9]]) as usize),
        2 | 3 if bytes.len() >= 12 => (
            12,
            u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
        ),
        _ => return Err(invalid("unsupported version")),
    };
    let data_start = header_start + header_len;
    if bytes.len() < data_start {
        return Err(invalid("truncated header"));
    }

    let header = std::str::from_utf8(&bytes[header_start..data_start])
        .map_err(|_| invalid("header is not UTF-8"))?;
    if !header.contains("'|u1'") && !header.contains("'u1'") {
        return Err(invalid("dtype is not uint8"));
    }
    if header.contains("'fortran_order': True") {
        return Err(invalid("fortran order is not supported"));
    }
    let caps = shape_regex()
        .captures(header)
        .ok_or_else(|| invalid("missing 2-D shape"))?;
    let height: usize = caps[1].parse().map_err(|_| invalid("bad shape"))?;
    let width: usize = caps[2].parse().map_err(|_| invalid("bad shape"))?;

    let data = &bytes[data_start..];
    if data.len() != height * width {
        return Err(invalid("data size does not match shape"));
    }

    BandMatrix::from_shape_vec((height, width), data.to_vec())
        .map_err(|e| CbersError::Cache(format!("Failed to reshape cached matrix: {}", e)))
}

/// On-disk frame cache. A disabled cache never touches the filesystem.
pub struct FrameCache {
    dir: Option<PathBuf>,
}

impl FrameCache {
    /// Cache rooted at `dir`; the directory is created on first write
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    /// Cache that always recomputes
    pub fn disabled() -> Self {
        Self { dir: None }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        if config.cache_enabled {
            Self::new(config.cache_dir.clone())
        } else {
            Self::disabled()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    /// File an entry with this digest lives in
    pub fn entry_path(&self, digest: &str) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.{}", digest, NPY_EXTENSION)))
    }

    /// Return the cached matrix for `key`, or run `compute` and store its result
    pub fn get_or_compute<F>(&self, key: &CacheKey, compute: F) -> CbersResult<BandMatrix>
    where
        F: FnOnce() -> CbersResult<BandMatrix>,
    {
        let Some(dir) = &self.dir else {
            return compute();
        };

        let digest = key.digest()?;
        let path = dir.join(format!("{}.{}", digest, NPY_EXTENSION));

        if path.exists() {
            match std::fs::read(&path).map_err(CbersError::from).and_then(|b| decode_npy(&b)) {
                Ok(matrix) => {
                    log::debug!("Cache hit for band {} of {}: {}", key.band, key.scene.scene_id, digest);
                    return Ok(matrix);
                }
                Err(e) => {
                    log::warn!("Ignoring unreadable cache entry {}: {}", path.display(), e);
                }
            }
        }

        log::debug!("Cache miss for band {} of {}: {}", key.band, key.scene.scene_id, digest);
        let matrix = compute()?;
        Self::write_entry(dir, &path, &matrix)?;
        Ok(matrix)
    }

    /// Whole-file write: the entry appears under its final name only once complete
    fn write_entry(dir: &Path, path: &Path, matrix: &BandMatrix) -> CbersResult<()> {
        std::fs::create_dir_all(dir).map_err(|e| {
            CbersError::Cache(format!("Failed to create cache directory {}: {}", dir.display(), e))
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&encode_npy(matrix))?;
        tmp.persist(path).map_err(|e| {
            CbersError::Cache(format!("Failed to persist cache entry {}: {}", path.display(), e))
        })?;
        Ok(())
    }
}
