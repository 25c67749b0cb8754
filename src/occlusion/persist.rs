//! Occlusion cache files
//!
//! Layout, all little-endian:
//!
//! | bytes  | field                                   |
//! |--------|-----------------------------------------|
//! | 0-3    | magic `GMVO`                            |
//! | 4-7    | format version                          |
//! | 8-35   | hm_size, occ_patch_size, sectors, sub_sectors, max_occ_pts, max_ray_length, z_ratio bits |
//! | 36-43  | height map checksum                     |
//! | 44-47  | zero padding                            |
//! | 48-    | LZ4 (size-prepended) of the `[s, z]` i32 pairs |

use std::path::{Path, PathBuf};

use crate::core::{Error, Result};
use crate::terrain::{HeightMap, OcclusionConfig};

use super::map::{OcclusionMap, OcclusionParams};

const MAGIC: [u8; 4] = *b"GMVO";
const VERSION: u32 = 1;
const HEADER_SIZE: usize = 48;

/// Cache file for a height map of `hm_size` cells
pub fn cache_path(dir: &Path, hm_size: u32) -> PathBuf {
    dir.join(format!("Height{}.vis", hm_size))
}

fn header(params: &OcclusionParams, checksum: u64) -> [u8; HEADER_SIZE] {
    let mut out = [0u8; HEADER_SIZE];
    out[0..4].copy_from_slice(&MAGIC);
    let fields = [
        VERSION,
        params.hm_size,
        params.occ_patch_size,
        params.sectors,
        params.sub_sectors,
        params.max_occ_pts,
        params.max_ray_length,
        params.z_ratio.to_bits(),
    ];
    for (i, field) in fields.iter().enumerate() {
        out[4 + i * 4..8 + i * 4].copy_from_slice(&field.to_le_bytes());
    }
    out[36..44].copy_from_slice(&checksum.to_le_bytes());
    out
}

/// Serialize a map keyed by the checksum of the height map it was built from
pub fn encode(map: &OcclusionMap, checksum: u64) -> Vec<u8> {
    let mut payload = Vec::with_capacity(map.points().len() * 8);
    for [s, z] in map.points() {
        payload.extend_from_slice(&s.to_le_bytes());
        payload.extend_from_slice(&z.to_le_bytes());
    }

    let mut out = header(map.params(), checksum).to_vec();
    out.extend_from_slice(&lz4_flex::compress_prepend_size(&payload));
    out
}

/// Parse a cache file, rejecting it unless every header field matches
pub fn decode(bytes: &[u8], params: OcclusionParams, checksum: u64) -> Result<OcclusionMap> {
    if bytes.len() < HEADER_SIZE || bytes[0..4] != MAGIC {
        return Err(Error::OcclusionCache("not an occlusion cache file".to_string()));
    }
    let expected = header(&params, checksum);
    if bytes[4..8] != expected[4..8] {
        return Err(Error::OcclusionCache("unsupported occlusion cache version".to_string()));
    }
    if bytes[..HEADER_SIZE] != expected[..] {
        return Err(Error::OcclusionCache(
            "occlusion cache was built with different parameters".to_string(),
        ));
    }

    let payload = lz4_flex::decompress_size_prepended(&bytes[HEADER_SIZE..])
        .map_err(|e| Error::OcclusionCache(format!("LZ4 decompression failed: {}", e)))?;
    if payload.len() % 8 != 0 {
        return Err(Error::OcclusionCache("truncated occlusion payload".to_string()));
    }

    let points = payload
        .chunks_exact(8)
        .map(|c| {
            [
                i32::from_le_bytes([c[0], c[1], c[2], c[3]]),
                i32::from_le_bytes([c[4], c[5], c[6], c[7]]),
            ]
        })
        .collect();
    OcclusionMap::from_points(params, points)
}

pub fn save(path: &Path, map: &OcclusionMap, checksum: u64) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, encode(map, checksum))?;
    Ok(())
}

pub fn load(path: &Path, params: OcclusionParams, checksum: u64) -> Result<OcclusionMap> {
    let bytes = std::fs::read(path)?;
    decode(&bytes, params, checksum)
}

/// Load the cached map for `hm` if one matches, otherwise compute it and
/// try to write the cache. A failed write only costs recomputation next run.
pub fn load_or_compute(hm: &HeightMap, config: &OcclusionConfig, z_ratio: f32) -> Result<OcclusionMap> {
    let params = OcclusionParams::new(hm.size(), config, z_ratio);
    let checksum = hm.checksum();

    let Some(dir) = config.cache_dir.as_deref() else {
        return OcclusionMap::compute(hm, params);
    };
    let path = cache_path(dir, hm.size());

    if path.exists() {
        match load(&path, params, checksum) {
            Ok(map) => {
                log::info!("Loaded occlusion cache {}", path.display());
                return Ok(map);
            }
            Err(e) => log::warn!("Ignoring occlusion cache {}: {}", path.display(), e),
        }
    }

    let map = OcclusionMap::compute(hm, params)?;
    if let Err(e) = save(&path, &map, checksum) {
        log::error!("Failed to write occlusion cache {}: {}", path.display(), e);
    }
    Ok(map)
}
