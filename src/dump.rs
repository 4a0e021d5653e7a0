use std::{
    fs,
    io::{BufWriter, Write},
    path::Path,
};

use serde::Serialize;

use crate::chunking::{Chunk, ChunkId, ChunkMetadata};
use crate::error::Result;

#[derive(Serialize)]
struct ChunkRecord<'a> {
    chunk_id: Option<&'a ChunkId>,
    page_content: &'a str,
    metadata: &'a ChunkMetadata,
}

/// Pretty JSON with four-space indentation; non-ASCII text is written as-is.
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    // serde_json only emits valid UTF-8
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

pub fn write_pretty_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = to_pretty_json(value)?;
    let mut writer = BufWriter::new(fs::File::create(path)?);
    writer.write_all(json.as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Writes every chunk with its content, metadata and id for inspection.
pub fn save_chunks_to_json(chunks: &[Chunk], path: &Path) -> Result<()> {
    let records: Vec<ChunkRecord<'_>> = chunks
        .iter()
        .map(|c| ChunkRecord {
            chunk_id: c.id(),
            page_content: &c.content,
            metadata: &c.metadata,
        })
        .collect();
    write_pretty_json(path, &records)?;
    log::info!("wrote {} chunks to {}", chunks.len(), path.display());
    Ok(())
}
