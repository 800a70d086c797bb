use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::array::Mask;

// ---------------------------------------------------------------------------
// Minimal FITS image I/O for mask export
// ---------------------------------------------------------------------------
//
// Masks are written as 16-bit integer FITS images: one 2880-byte header
// block of 80-character cards, then big-endian i16 data padded to a block
// boundary. FITS axis order puts the fastest-varying axis first (NAXIS1),
// which for row-major data is the *last* array axis, so the flat data can
// be written as-is.

const BLOCK: usize = 2880;
const CARD: usize = 80;

fn card(key: &str, value: &str) -> String {
    format!("{key:<8}= {value:>20}")
}

/// Write a boolean mask as an i16 FITS image (1 where selected).
pub fn write_mask(path: &Path, mask: &Mask) -> Result<()> {
    let shape = mask.shape();
    let mut cards = vec![
        card("SIMPLE", "T"),
        card("BITPIX", "16"),
        card("NAXIS", &shape.len().to_string()),
    ];
    for (i, dim) in shape.iter().rev().enumerate() {
        cards.push(card(&format!("NAXIS{}", i + 1), &dim.to_string()));
    }
    cards.push("END".to_string());

    let mut bytes = Vec::with_capacity(BLOCK + mask.len() * 2);
    for c in &cards {
        let mut line = c.clone();
        line.truncate(CARD);
        bytes.extend_from_slice(line.as_bytes());
        bytes.resize(bytes.len() + (CARD - line.len()), b' ');
    }
    while bytes.len() % BLOCK != 0 {
        bytes.push(b' ');
    }
    for &selected in mask.iter() {
        let v: i16 = if selected { 1 } else { 0 };
        bytes.extend_from_slice(&v.to_be_bytes());
    }
    while bytes.len() % BLOCK != 0 {
        bytes.push(0);
    }
    fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))
}

/// Read a mask written by [`write_mask`]. Nonzero pixels are selected.
pub fn read_mask(path: &Path) -> Result<Mask> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;

    // Walk header cards block by block until END.
    let mut naxis: Option<usize> = None;
    let mut dims: Vec<(usize, usize)> = Vec::new();
    let mut bitpix: Option<i64> = None;
    let mut simple = false;
    let mut data_start = None;
    'blocks: for block_no in 0..bytes.len() / BLOCK {
        let block = &bytes[block_no * BLOCK..(block_no + 1) * BLOCK];
        for card_no in 0..BLOCK / CARD {
            let raw = &block[card_no * CARD..(card_no + 1) * CARD];
            let text = std::str::from_utf8(raw).context("non-ascii header card")?;
            let key = text.get(..8).context("malformed header card")?.trim_end();
            if key == "END" {
                data_start = Some((block_no + 1) * BLOCK);
                break 'blocks;
            }
            let value = text.get(10..).map(str::trim).unwrap_or("");
            match key {
                "SIMPLE" => simple = value == "T",
                "BITPIX" => bitpix = value.parse().ok(),
                "NAXIS" => naxis = value.parse().ok(),
                k if k.starts_with("NAXIS") => {
                    let axis: usize = k[5..].parse().context("bad NAXISn keyword")?;
                    let dim: usize = value.parse().context("bad NAXISn value")?;
                    dims.push((axis, dim));
                }
                _ => {}
            }
        }
    }

    if !simple {
        bail!("missing SIMPLE card");
    }
    if bitpix != Some(16) {
        bail!("unsupported BITPIX {bitpix:?}");
    }
    let naxis = naxis.context("missing NAXIS card")?;
    if dims.len() != naxis {
        bail!("expected {naxis} NAXISn cards, found {}", dims.len());
    }
    // NAXIS1 is the fastest axis; reverse into row-major shape.
    dims.sort_by_key(|&(axis, _)| axis);
    let shape: Vec<usize> = dims.iter().rev().map(|&(_, dim)| dim).collect();
    let count: usize = shape.iter().product();

    let start = data_start.context("missing END card")?;
    let data = bytes
        .get(start..start + count * 2)
        .context("truncated data section")?;
    let flags = data
        .chunks_exact(2)
        .map(|pair| i16::from_be_bytes([pair[0], pair[1]]) != 0)
        .collect();
    Ok(Mask::from_shape_vec(shape, flags))
}
