use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::chunk::{Chunk, Metadata};
use crate::index::VectorIndex;

const CHUNKS_FILE: &str = "chunks.jsonl";
const META_FILE: &str = "chunks_meta.json";
const INDEX_FILE: &str = "index.bin";

/// The persisted corpus is three co-versioned artifacts joined purely by
/// ordinal position: the chunk text store, the metadata store, and the
/// vector index. They are always rebuilt together, never independently.
pub struct CorpusStore {
    chunks_path: PathBuf,
    meta_path: PathBuf,
    index_path: PathBuf,
}

/// A loaded, read-only dataset. Safe for concurrent readers since nothing
/// mutates it after load.
#[derive(Debug)]
pub struct Corpus {
    pub chunks: Vec<Chunk>,
    pub index: VectorIndex,
}

impl Corpus {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunk(&self, ordinal: usize) -> Option<&Chunk> {
        self.chunks.get(ordinal)
    }
}

impl CorpusStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            chunks_path: data_dir.join(CHUNKS_FILE),
            meta_path: data_dir.join(META_FILE),
            index_path: data_dir.join(INDEX_FILE),
        }
    }

    pub fn exists(&self) -> bool {
        self.chunks_path.exists() && self.meta_path.exists() && self.index_path.exists()
    }

    /// Persist the dataset. Each artifact is written to a temporary sibling
    /// and renamed into place, so readers never observe a partial rebuild.
    /// Refuses to persist a misaligned chunk/index pair.
    pub fn save(&self, chunks: &[Chunk], index: &VectorIndex) -> Result<()> {
        if chunks.len() != index.len() {
            anyhow::bail!(
                "Integrity error: {} chunks but {} index vectors; refusing to save.",
                chunks.len(),
                index.len()
            );
        }

        let data_dir = self
            .chunks_path
            .parent()
            .context("Chunk store path has no parent directory")?;
        fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory '{}'", data_dir.display()))?;

        let chunks_tmp = tmp_path(&self.chunks_path);
        let meta_tmp = tmp_path(&self.meta_path);
        let index_tmp = tmp_path(&self.index_path);

        write_chunks(&chunks_tmp, chunks)?;
        write_meta(&meta_tmp, chunks)?;
        index.save(&index_tmp)?;

        fs::rename(&chunks_tmp, &self.chunks_path)
            .with_context(|| format!("Failed to replace '{}'", self.chunks_path.display()))?;
        fs::rename(&meta_tmp, &self.meta_path)
            .with_context(|| format!("Failed to replace '{}'", self.meta_path.display()))?;
        fs::rename(&index_tmp, &self.index_path)
            .with_context(|| format!("Failed to replace '{}'", self.index_path.display()))?;
        Ok(())
    }

    /// Load all three artifacts and enforce the ordinal-alignment
    /// invariant; a count mismatch means the store is corrupt and every
    /// downstream ordinal join would silently return wrong chunks.
    pub fn load(&self) -> Result<Corpus> {
        let chunks = read_chunks(&self.chunks_path)?;
        let meta = read_meta(&self.meta_path)?;
        let index = VectorIndex::load(&self.index_path)?;

        if chunks.len() != meta.len() || chunks.len() != index.len() {
            anyhow::bail!(
                "Integrity error: {} chunks, {} metadata entries, {} index vectors; \
                 the corpus store is corrupt, rebuild it.",
                chunks.len(),
                meta.len(),
                index.len()
            );
        }

        Ok(Corpus { chunks, index })
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".tmp");
    PathBuf::from(os)
}

fn write_chunks(path: &Path, chunks: &[Chunk]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create chunk store '{}'", path.display()))?;
    let mut writer = BufWriter::new(file);
    for chunk in chunks {
        serde_json::to_writer(&mut writer, chunk)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

fn write_meta(path: &Path, chunks: &[Chunk]) -> Result<()> {
    let meta: Vec<&Metadata> = chunks.iter().map(|chunk| &chunk.metadata).collect();
    let file = File::create(path)
        .with_context(|| format!("Failed to create metadata store '{}'", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &meta)?;
    writer.flush()?;
    Ok(())
}

fn read_chunks(path: &Path) -> Result<Vec<Chunk>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open chunk store '{}'", path.display()))?;
    let reader = BufReader::new(file);
    let mut chunks = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read chunk line {}", line_no + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let chunk: Chunk = serde_json::from_str(&line)
            .with_context(|| format!("Invalid chunk record at line {}", line_no + 1))?;
        chunks.push(chunk);
    }
    Ok(chunks)
}

fn read_meta(path: &Path) -> Result<Vec<Metadata>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open metadata store '{}'", path.display()))?;
    let meta: Vec<Metadata> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Invalid metadata store '{}'", path.display()))?;
    Ok(meta)
}
