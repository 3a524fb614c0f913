// PDF script import: extract the text and break it into speaker paragraphs

use anyhow::{Context, Result, bail};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

pub const RAW_DIR: &str = "raw_extracts";

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Upper-case run, optional parenthetical, then a period
static SPEAKER_CUE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-ZÀ-ÖØ-Þ\-\s'’]{2,}(?:\s*\(.*?\))?)\.").unwrap());

/// Extract the text of a PDF with `pdftotext`
pub fn extract_pdf_text(pdf: &Path) -> Result<String> {
    if !pdf.exists() {
        bail!("File not found: {}", pdf.display());
    }

    let output = Command::new("pdftotext")
        .args(["-enc", "UTF-8"])
        .arg(pdf)
        .arg("-")
        .output()
        .context("Failed to run pdftotext. Is poppler installed?")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("pdftotext failed: {}", stderr.trim());
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Re-flow extracted text and start a paragraph at each speaker cue.
///
/// Lines holding only a page number are dropped. Page and column breaks are
/// arbitrary in extracted text, so everything else is joined before the cues
/// are located.
pub fn clean_text(text: &str) -> String {
    let kept: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !is_page_number(line))
        .collect();
    let joined = kept.join(" ");
    let flowed = WHITESPACE_RE.replace_all(&joined, " ");

    let broken = SPEAKER_CUE_RE.replace_all(&flowed, |caps: &Captures| {
        let cue = caps[1].trim();
        // A lone capital ("A.") or stray punctuation is not a cue
        if cue.chars().filter(|c| c.is_alphabetic()).count() < 2 {
            return caps[0].to_string();
        }
        format!("\n\n{}.", cue)
    });

    broken
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn is_page_number(line: &str) -> bool {
    !line.is_empty() && line.chars().all(|c| c.is_ascii_digit())
}

/// Default output path for an imported PDF
pub fn output_path(pdf: &Path) -> PathBuf {
    let stem = pdf
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "script".to_string());
    PathBuf::from(RAW_DIR).join(format!("{}.txt", stem))
}

/// Extract, clean and write a PDF script. Returns the written path.
pub fn import_pdf(pdf: &Path, output: Option<&Path>) -> Result<PathBuf> {
    log::info!("Reading PDF: {}", pdf.display());
    let raw = extract_pdf_text(pdf)?;

    log::info!("Cleaning text...");
    let cleaned = clean_text(&raw);

    let path = output.map(Path::to_path_buf).unwrap_or_else(|| output_path(pdf));
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(&path, cleaned).with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_drops_page_numbers() {
        let text = "JEAN. Bonjour\n12\nmadame.\n 13 \n";
        assert_eq!(clean_text(text), "JEAN. Bonjour madame.");
    }

    #[test]
    fn test_clean_text_breaks_before_cues() {
        let text = "Scène 1\nJEAN. Bonjour.\nMARIE (entrant). Qui est là ?\nJEAN. Moi.";
        let cleaned = clean_text(text);
        let paragraphs: Vec<&str> = cleaned.split("\n\n").collect();
        assert_eq!(
            paragraphs,
            vec![
                "Scène 1",
                "JEAN. Bonjour.",
                "MARIE (entrant). Qui est là ?",
                "JEAN. Moi."
            ]
        );
    }

    #[test]
    fn test_clean_text_keeps_accented_and_hyphenated_cues() {
        let cleaned = clean_text("Fin. JEAN-PIERRE. Oui. HÉLÈNE. Non.");
        assert!(cleaned.contains("\n\nJEAN-PIERRE. Oui."));
        assert!(cleaned.contains("\n\nHÉLÈNE. Non."));
    }

    #[test]
    fn test_single_capital_is_not_a_cue() {
        assert_eq!(clean_text("Le plan A. Puis rien."), "Le plan A. Puis rien.");
    }

    #[test]
    fn test_output_path() {
        assert_eq!(
            output_path(Path::new("/tmp/scripts/Le Cid.pdf")),
            PathBuf::from("raw_extracts/Le Cid.txt")
        );
    }

    #[test]
    fn test_import_missing_pdf() {
        let err = import_pdf(Path::new("/nonexistent/script.pdf"), None).unwrap_err();
        assert!(err.to_string().contains("File not found"));
    }
}
