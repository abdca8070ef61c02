//! Collision-safe output filename generation
//!
//! Fills a configurable template from item metadata, sanitizes the result for
//! the filesystem, and guarantees uniqueness across both the names handed out
//! in this process and files already present in the output directory.

use crate::config::DownloadConfig;
use crate::types::ItemMetadata;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

/// Maximum filename length most filesystems accept
const MAX_NAME_LEN: usize = 255;

const OUTPUT_EXT: &str = ".mp4";

/// Template-driven filename generator with process-wide uniqueness
///
/// Supported placeholders: `{id}`, `{creator}`, `{date}`, `{number}`,
/// `{letter}`. Each generated name is remembered so two items from the same
/// batch can never claim the same output path, even when their metadata
/// renders identically.
pub struct FilenameGenerator {
    template: String,
    sequence_number: String,
    sequence_letter: String,
    used: Mutex<HashSet<String>>,
}

impl FilenameGenerator {
    /// Build a generator from the download configuration
    pub fn new(config: &DownloadConfig) -> Self {
        Self {
            template: config.filename_template.clone(),
            sequence_number: config.sequence_number.clone(),
            sequence_letter: config.sequence_letter.to_uppercase(),
            used: Mutex::new(HashSet::new()),
        }
    }

    /// Render the template for an item without reserving the name
    ///
    /// Used by the pre-flight check for an output left behind by a previous
    /// run; [`generate`](Self::generate) is what hands out unique names.
    pub fn base_name(&self, meta: &ItemMetadata) -> String {
        format!("{}{OUTPUT_EXT}", truncate_stem(&sanitize(&self.render(meta))))
    }

    /// Generate a unique `.mp4` filename for an item
    ///
    /// Collisions with previously handed-out names or with files already in
    /// `output_dir` get a `_N` suffix, with `N` counting up from 1. The
    /// returned name is reserved immediately.
    pub fn generate(&self, meta: &ItemMetadata, output_dir: &Path) -> String {
        let stem = truncate_stem(&sanitize(&self.render(meta)));

        let mut used = match self.used.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut candidate = format!("{stem}{OUTPUT_EXT}");
        let mut counter = 1;
        while used.contains(&candidate) || output_dir.join(&candidate).exists() {
            candidate = format!("{stem}_{counter}{OUTPUT_EXT}");
            counter += 1;
        }
        used.insert(candidate.clone());
        candidate
    }

    /// True if a name has already been handed out or reserved this run
    pub fn is_reserved(&self, name: &str) -> bool {
        let used = match self.used.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        used.contains(name)
    }

    /// Reserve a name that already exists and should keep being used
    pub fn reserve(&self, name: &str) {
        let mut used = match self.used.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        used.insert(name.to_string());
    }

    fn render(&self, meta: &ItemMetadata) -> String {
        let mut name = self.template.clone();

        if name.contains("{id}") {
            name = name.replace("{id}", meta.id.as_str());
        }
        if name.contains("{creator}") {
            let creator = meta.creator.as_deref().unwrap_or("unknown_creator");
            name = name.replace("{creator}", creator);
        }
        if name.contains("{date}") {
            // Dates may arrive as full timestamps; keep the date part only
            let date = meta
                .published_date
                .as_deref()
                .and_then(|d| d.split('T').next())
                .unwrap_or("unknown_date");
            name = name.replace("{date}", date);
        }
        if name.contains("{number}") {
            name = name.replace("{number}", &self.sequence_number);
        }
        if name.contains("{letter}") {
            name = name.replace("{letter}", &self.sequence_letter);
        }
        name
    }
}

/// Replace characters that are unsafe in filenames with underscores
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Cap the stem so that stem + suffix + extension stays within filesystem limits
fn truncate_stem(stem: &str) -> String {
    // Leave headroom for "_NNN" collision suffixes plus the extension
    let budget = MAX_NAME_LEN - OUTPUT_EXT.len() - 8;
    if stem.len() <= budget {
        return stem.to_string();
    }
    let mut end = budget;
    while end > 0 && !stem.is_char_boundary(end) {
        end -= 1;
    }
    stem[..end].to_string()
}
