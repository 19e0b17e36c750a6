use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::process::Command;

use crate::error::EngineFault;

use super::geom::union_bbox;
use super::text::{join_inline, merge_conf};
use super::{BBoxPx, EngineFuture, PipelineImage, RecognitionEngine, TextSpan};

/// Tesseract CLI run with a fixed page segmentation mode. Different modes
/// behave like independent engines over the same image.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    id: String,
    psm: u32,
    languages: String,
}

impl TesseractEngine {
    pub fn new(psm: u32, languages: &str) -> Self {
        let languages = languages.trim();
        Self {
            id: format!("tesseract-psm{}", psm),
            psm,
            languages: if languages.is_empty() {
                "eng".to_string()
            } else {
                languages.to_string()
            },
        }
    }
}

impl RecognitionEngine for TesseractEngine {
    fn id(&self) -> &str {
        &self.id
    }

    fn extract_text<'a>(&'a self, image: &'a PipelineImage) -> EngineFuture<'a> {
        let bytes = image.bytes().to_vec();
        let languages = self.languages.clone();
        let psm = self.psm;
        let id = self.id.clone();
        Box::pin(async move {
            let joined = tokio::task::spawn_blocking(move || recognize(&bytes, &languages, psm))
                .await
                .map_err(|err| EngineFault::Failed(format!("{} worker stopped: {}", id, err)))?;
            let tsv = joined.map_err(|err| EngineFault::Failed(format!("{:#}", err)))?;
            Ok(parse_tsv_spans(&tsv, &id))
        })
    }
}

fn recognize(bytes: &[u8], languages: &str, psm: u32) -> Result<String> {
    let image = image::load_from_memory(bytes).with_context(|| "failed to decode image for OCR")?;
    let mut tmp = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .with_context(|| "failed to create temp file for OCR")?;
    image
        .write_to(&mut tmp, image::ImageFormat::Png)
        .with_context(|| "failed to write temp image for OCR")?;
    tmp.flush().ok();
    run_tesseract_tsv(tmp.path(), languages, psm)
}

fn run_tesseract_tsv(path: &Path, languages: &str, psm: u32) -> Result<String> {
    let output = Command::new("tesseract")
        .arg(path)
        .arg("stdout")
        .arg("-l")
        .arg(languages)
        .arg("--psm")
        .arg(psm.to_string())
        .arg("tsv")
        .output()
        .with_context(|| "failed to run tesseract (is it installed?)")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract failed: {}", stderr.trim()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

struct LineAccumulator {
    text: String,
    bbox: BBoxPx,
    conf: f32,
    len: usize,
}

/// Groups word rows (level 5) into lines keyed by page, block, paragraph
/// and line number. Tesseract confidences are 0..100.
pub(crate) fn parse_tsv_spans(tsv: &str, engine_id: &str) -> Vec<TextSpan> {
    let mut lines: BTreeMap<(u32, u32, u32, u32), LineAccumulator> = BTreeMap::new();

    for row in tsv.lines().skip(1) {
        let cols = row.split('\t').collect::<Vec<_>>();
        if cols.len() < 12 {
            continue;
        }
        if cols[0].parse::<u32>().unwrap_or(0) != 5 {
            continue;
        }
        let key = (
            cols[1].parse().unwrap_or(0),
            cols[2].parse().unwrap_or(0),
            cols[3].parse().unwrap_or(0),
            cols[4].parse().unwrap_or(0),
        );
        let bbox = BBoxPx {
            x: cols[6].parse().unwrap_or(0),
            y: cols[7].parse().unwrap_or(0),
            w: cols[8].parse().unwrap_or(0),
            h: cols[9].parse().unwrap_or(0),
        };
        let conf: f32 = cols[10].trim().parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if text.is_empty() || conf < 0.0 || bbox.w == 0 || bbox.h == 0 {
            continue;
        }
        let conf = (conf / 100.0).clamp(0.0, 1.0);
        let len = text.chars().count();

        match lines.get_mut(&key) {
            Some(line) => {
                line.text = join_inline(&line.text, text);
                line.bbox = union_bbox(&line.bbox, &bbox);
                line.conf = merge_conf(line.conf, line.len, conf, len);
                line.len += len;
            }
            None => {
                lines.insert(
                    key,
                    LineAccumulator {
                        text: text.to_string(),
                        bbox,
                        conf,
                        len,
                    },
                );
            }
        }
    }

    lines
        .into_values()
        .map(|line| TextSpan {
            engine_id: engine_id.to_string(),
            text: line.text,
            bbox: line.bbox,
            confidence: line.conf,
        })
        .collect()
}
