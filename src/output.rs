//! CLI output formatting.
//!
//! Each command has a `format_*` function returning lines (pure, tested)
//! and a `print_*` wrapper that writes them to stdout.
//!
//! ## scale
//!
//! ```text
//! photo.jpg → thumb.jpg
//!     Size: 4000x3000 → 400x300
//!     Filter: Box
//!     Status: rendered
//! ```
//!
//! ## info
//!
//! ```text
//! anim.gif
//!     Format: GIF (image/gif)
//!     Size: 320x240
//!     Loop count: 5
//!     Delay: 10/100 s
//!     XMP: 1423 bytes
//! ```

use crate::cache::CacheStats;
use crate::imaging::{Derivative, Filter};
use crate::metadata::ImageInfo;
use std::path::Path;

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Truncate text to `max` characters, appending `...` if truncated.
fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

// ============================================================================
// scale
// ============================================================================

/// How a `scale` request was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleOutcome {
    Rendered(Derivative),
    Cached { size: (u32, u32) },
}

pub fn format_scale_output(input: &Path, output: &Path, outcome: &ScaleOutcome) -> Vec<String> {
    let mut lines = vec![format!("{} → {}", file_label(input), file_label(output))];
    match outcome {
        ScaleOutcome::Rendered(d) => {
            lines.push(format!(
                "{}Size: {}x{} → {}x{}",
                indent(1),
                d.source_size.0,
                d.source_size.1,
                d.size.0,
                d.size.1
            ));
            lines.push(format!("{}Filter: {}", indent(1), d.filter.display_name()));
            lines.push(format!("{}Status: rendered", indent(1)));
        }
        ScaleOutcome::Cached { size } => {
            lines.push(format!("{}Size: {}x{}", indent(1), size.0, size.1));
            lines.push(format!("{}Status: cached", indent(1)));
        }
    }
    lines
}

pub fn print_scale_output(input: &Path, output: &Path, outcome: &ScaleOutcome) {
    for line in format_scale_output(input, output, outcome) {
        println!("{}", line);
    }
}

pub fn format_cache_stats(stats: &CacheStats) -> String {
    format!("Cache: {}", stats)
}

// ============================================================================
// info
// ============================================================================

pub fn format_info_output(path: &Path, info: &ImageInfo) -> Vec<String> {
    let i = indent(1);
    let mut lines = vec![
        file_label(path),
        format!("{i}Format: {} ({})", info.format.name(), info.format.mime_type()),
        format!("{i}Size: {}x{}", info.width, info.height),
    ];
    if let Some((tw, th)) = info.tile_size {
        lines.push(format!("{i}Tiles: {}x{}", tw, th));
    }
    if let Some(levels) = info.decomposition_levels {
        lines.push(format!(
            "{i}Resolution levels: {} ({} decompositions)",
            u32::from(levels) + 1,
            levels
        ));
    }
    if let Some(count) = info.loop_count {
        lines.push(format!("{i}Loop count: {}", count));
    }
    if let Some(delay) = info.delay_time {
        lines.push(format!("{i}Delay: {}/100 s", delay));
    }
    if let Some(xmp) = &info.xmp {
        lines.push(format!("{i}XMP: {} bytes", xmp.len()));
    }
    if let Some(iptc) = &info.iptc {
        let ii = indent(2);
        lines.push(format!("{i}IPTC:"));
        if let Some(name) = &iptc.object_name {
            lines.push(format!("{ii}Title: {}", name));
        }
        if let Some(caption) = &iptc.caption {
            lines.push(format!("{ii}Caption: {}", truncate(caption, 60)));
        }
        if !iptc.keywords.is_empty() {
            lines.push(format!("{ii}Keywords: {}", iptc.keywords.join(", ")));
        }
    }
    lines
}

pub fn print_info_output(path: &Path, info: &ImageInfo) {
    for line in format_info_output(path, info) {
        println!("{}", line);
    }
}

// ============================================================================
// filters
// ============================================================================

/// One line per kernel: config name, radius, display name.
pub fn format_filters() -> Vec<String> {
    let mut lines = vec![format!("{:<18}{:<8}{}", "NAME", "RADIUS", "DISPLAY")];
    for filter in Filter::ALL {
        let mut line = format!(
            "{:<18}{:<8}{}",
            filter.name(),
            format!("{:.1}", filter.radius()),
            filter.display_name()
        );
        if filter == Filter::default() {
            line.push_str(" (default)");
        }
        lines.push(line);
    }
    lines
}

pub fn print_filters() {
    for line in format_filters() {
        println!("{}", line);
    }
}
