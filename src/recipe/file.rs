//! Recipe file format reading and writing
//!
//! Layout: 6 magic bytes, 1 version byte, little-endian u64 body length, JSON body.

use super::{Recipe, RECIPE_MAGIC, RECIPE_VERSION};
use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const HEADER_LEN: usize = 6 + 1 + 8;

/// Write a recipe to a file
pub fn write_recipe(recipe: &Recipe, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| Error::io("creating recipe file", e))?;
    let mut writer = BufWriter::new(file);

    writer
        .write_all(&write_recipe_to_bytes(recipe)?)
        .map_err(|e| Error::io("writing recipe", e))?;
    writer.flush().map_err(|e| Error::io("flushing", e))?;

    Ok(())
}

/// Read a recipe from a file
pub fn read_recipe(path: &Path) -> Result<Recipe> {
    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            Error::io("opening recipe file", e)
        }
    })?;
    let mut reader = BufReader::new(file);
    let mut data = Vec::new();
    reader
        .read_to_end(&mut data)
        .map_err(|e| Error::io("reading recipe file", e))?;

    read_recipe_from_bytes(&data)
}

/// Read a recipe from bytes
pub fn read_recipe_from_bytes(data: &[u8]) -> Result<Recipe> {
    if data.len() < HEADER_LEN {
        return Err(Error::recipe("recipe data too short"));
    }

    if &data[0..6] != RECIPE_MAGIC {
        return Err(Error::recipe("invalid recipe (bad magic)"));
    }

    if data[6] != RECIPE_VERSION {
        return Err(Error::recipe(format!(
            "unsupported recipe version {} (expected {})",
            data[6], RECIPE_VERSION
        )));
    }

    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&data[7..HEADER_LEN]);
    let len = u64::from_le_bytes(len_bytes) as usize;

    let body = data
        .get(HEADER_LEN..HEADER_LEN.saturating_add(len))
        .ok_or_else(|| Error::recipe("recipe data truncated"))?;

    let recipe: Recipe = serde_json::from_slice(body)
        .map_err(|e| Error::recipe(format!("deserializing recipe: {}", e)))?;

    Ok(recipe)
}

/// Write a recipe to bytes
pub fn write_recipe_to_bytes(recipe: &Recipe) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(recipe)
        .map_err(|e| Error::recipe(format!("serializing recipe: {}", e)))?;

    let len = json.len() as u64;
    let mut data = Vec::with_capacity(HEADER_LEN + json.len());
    data.extend_from_slice(RECIPE_MAGIC);
    data.push(RECIPE_VERSION);
    data.extend_from_slice(&len.to_le_bytes());
    data.extend_from_slice(&json);

    Ok(data)
}
