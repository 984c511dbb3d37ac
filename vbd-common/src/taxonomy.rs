//! Model taxonomy reference data and resolver
//!
//! Maps raw model identifiers (as they appear in training arguments) to a
//! taxonomy category, a canonical display name, a plot marker and a color.
//!
//! Classification is a linear, ordered prefix scan: categories are tested
//! in declaration order and so are the model prefixes inside a category.
//! The ordinal position of a model inside its category drives legend order
//! and color assignment, so the tables must never be reordered casually.

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

/// Category name returned for models that match no taxonomy entry
pub const UNCLASSIFIED: &str = "none";

/// Marker used for unclassified models
const DEFAULT_MARKER: &str = "o";

/// Color used for unclassified models
const UNCLASSIFIED_COLOR: &str = "black";

/// Edge color rotation, indexed by model ordinal modulo 4
const EDGE_ROTATION: [&str; 3] = ["white", "0.0", "0.5"];

/// Size tokens and their single-letter display suffixes
const SIZE_ABBREVIATIONS: [(&str, &str); 3] = [("tiny", "Ti"), ("small", "S"), ("base", "B")];

/// One taxonomy category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Category {
    pub name: String,
    /// Plot marker symbol
    pub marker: String,
    /// Known model-name prefixes, in priority order
    pub models: Vec<String>,
    /// Per-model colors, parallel to `models`
    pub colors: Vec<String>,
    /// Single representative color for the whole category
    pub color: String,
}

impl Category {
    pub fn new(name: &str, marker: &str, models: &[&str], colors: &[&str], color: &str) -> Self {
        Self {
            name: name.to_string(),
            marker: marker.to_string(),
            models: models.iter().map(|m| m.to_string()).collect(),
            colors: colors.iter().map(|c| c.to_string()).collect(),
            color: color.to_string(),
        }
    }
}

/// Immutable taxonomy table, loaded once at startup and shared
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Taxonomy {
    categories: Vec<Category>,
}

impl Taxonomy {
    pub fn new(categories: Vec<Category>) -> Self {
        Self { categories }
    }

    /// The compiled-in vision transformer taxonomy
    pub fn builtin() -> Self {
        Self::new(vec![
            Category::new("Baseline", "o", &["ViT", "DeiT"], &["#d62728", "#ff9896"], "#d62728"),
            Category::new("Baseline (Conv)", "D", &["ResNet50"], &["#393b79"], "#1f77b4"),
            Category::new(
                "Low-Rank Attention",
                "v",
                &["Nystrom", "Linformer", "XCiT"],
                &["#843c39", "#ad494a", "#d6616b"],
                "#8c564b",
            ),
            Category::new(
                "Sparse Attention",
                "8",
                &["SwinV2", "Swin", "Sinkhorn_Cait", "HaloNet", "Routing_ViT", "WaveViT"],
                &["#006529", "#157f3b", "#2f984f", "#4bb062", "#74c476", "#98d594"],
                "#2ca02c",
            ),
            Category::new(
                "Fixed Attention",
                "^",
                &["Synthesizer_FD", "Synthesizer_FR"],
                &["#637939", "#8ca252"],
                "#7f7f7f",
            ),
            Category::new(
                "Kernel Attention",
                "h",
                &["Performer", "Linear_ViT", "PolySA"],
                &["#6baed6", "#9ecae1", "#c6dbef"],
                "#ff7f0e",
            ),
            Category::new(
                "Hybrid Attention",
                "H",
                &["EfficientFormerV2", "CvT", "CoaT"],
                &["#8c6d31", "#bd9e39", "#e7ba52"],
                "#bcbd22",
            ),
            Category::new(
                "Non-Attention Shuffling",
                "p",
                &["FNet", "GFNet", "Mixer", "FocalNet"],
                &["#7b4173", "#a55194", "#ce6dbd", "#de9ed6"],
                "#9467bd",
            ),
            Category::new(
                "Sequence Reduction",
                "(5, 0, 36)",
                &["EViT", "Dynamic_ViT", "Token_Learner", "ToMe", "AViT", "STViT", "CaiT"],
                &["#e4d256", "#cebe64", "#b8ac70", "#a29a73", "#8d8976", "#777777", "#5e6573"],
                "#e377c2",
            ),
            Category::new("MLP Block", "s", &["Switch"], &["#377eb8"], "#17becf"),
        ])
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Position of a category in declaration order
    pub fn category_index(&self, name: &str) -> Option<usize> {
        self.categories.iter().position(|c| c.name == name)
    }

    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Sort key for legend entries
///
/// Unclassified names sort first, then categories in declaration order.
/// A category name sorts before its own models; models follow their
/// ordinal position, then size (tiny, small, everything else).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct LegendKey {
    pub category: Option<usize>,
    pub model: Option<usize>,
    pub size: u8,
}

/// Everything the presentation layer needs to draw a model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelDisplayInfo {
    pub canonical_name: String,
    pub category: String,
    pub marker: String,
    pub color: String,
    pub edge_color: String,
    pub legend_order: LegendKey,
}

/// Pure lookups over an injected [`Taxonomy`]
#[derive(Debug, Clone)]
pub struct TaxonomyResolver {
    taxonomy: Arc<Taxonomy>,
}

impl TaxonomyResolver {
    pub fn new(taxonomy: Arc<Taxonomy>) -> Self {
        Self { taxonomy }
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// Find the category a model belongs to
    ///
    /// Falls back to stripping a trailing `_vit` and to the canonical
    /// EfficientFormerV2 prefix before giving up.
    pub fn classify(&self, model_name: &str) -> Option<&Category> {
        let normalized = normalize(model_name);
        let found = self.classify_normalized(&normalized);
        if found.is_none() {
            warn!("Could not find class for model '{}'", normalized);
        }
        found
    }

    fn classify_normalized(&self, normalized: &str) -> Option<&Category> {
        let hit = self.taxonomy.categories.iter().find(|category| {
            category
                .models
                .iter()
                .any(|arch| normalized.starts_with(&arch.to_lowercase()))
        });
        if hit.is_some() {
            return hit;
        }
        if let Some(stripped) = normalized.strip_suffix("_vit") {
            return self.classify_normalized(stripped);
        }
        if normalized.starts_with("efficientform") {
            return self.classify_normalized("efficientformerv2");
        }
        None
    }

    /// Category name, or [`UNCLASSIFIED`]
    pub fn class_name(&self, model_name: &str) -> String {
        self.classify(model_name)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| UNCLASSIFIED.to_string())
    }

    /// Model family, e.g. `deit_small_patch16_224` → `DeiT`
    ///
    /// Unknown names are returned normalized with underscores as spaces.
    pub fn model_family(&self, model_name: &str) -> String {
        let normalized = normalize(model_name);
        let mut family = normalized.clone();
        for category in &self.taxonomy.categories {
            if let Some(arch) = category
                .models
                .iter()
                .find(|arch| normalized.starts_with(&arch.to_lowercase()))
            {
                family = arch.clone();
            }
        }
        match family.to_lowercase().as_str() {
            "nystrom" => family = "Nystrom_ViT".to_string(),
            "switch" => family = "Switch_ViT".to_string(),
            _ => {}
        }
        family.replace('_', " ")
    }

    /// Human-readable model identifier, e.g. `vit_tiny_patch16` → `ViT-Ti/16`
    pub fn canonical_name(&self, model_name: &str) -> String {
        let family = self.model_family(model_name);
        let family_lower = family.to_lowercase();
        let mut name = family.clone();
        let mut patch_size: u64 = 0;

        let blocks = tokenize(model_name);
        for block in &blocks {
            let lower = block.to_lowercase();
            if family_lower.contains(&lower) || lower == "vit" || lower == "ls" {
                continue;
            }
            if is_numeric(block) {
                name.push('-');
                name.push_str(&strip_leading_zeros(block));
                continue;
            }
            if let Some((_, abbr)) = SIZE_ABBREVIATIONS.iter().find(|(size, _)| *size == lower) {
                name.push('-');
                name.push_str(abbr);
                continue;
            }
            if let Some(size) = numeric_suffix(block, &lower, "p")
                .or_else(|| numeric_suffix(block, &lower, "patch"))
            {
                patch_size = size;
                continue;
            }
            if let Some(window) = numeric_suffix(block, &lower, "window") {
                name.push_str(&format!("-W{}", window));
                continue;
            }
            name.push('-');
            name.push_str(&capitalize(block));
        }

        // A trailing bare number on ViT and Mixer names is the patch size
        if let Some(last) = blocks.last() {
            if is_numeric(last) && (family.starts_with("ViT") || family.starts_with("Mixer")) {
                let suffix_len = strip_leading_zeros(last).chars().count() + 1;
                let keep = name.chars().count().saturating_sub(suffix_len);
                name = name.chars().take(keep).collect();
                patch_size = last.parse().unwrap_or(0);
            }
        }

        if patch_size > 0 {
            name.push_str(&format!("/{}", patch_size));
        }
        name
    }

    /// Ordinal of the model inside its category
    ///
    /// `None` for unclassified models; a model classified into a category
    /// but not listed in it gets the position just past the list.
    pub fn model_index(&self, model_name: &str) -> Option<usize> {
        let category = self.classify(model_name)?;
        let family = self.model_family(model_name).replace(' ', "_");
        let position = |name: &str| category.models.iter().position(|m| m == name);

        let stripped: String = {
            let count = family.chars().count();
            family.chars().take(count.saturating_sub(4)).collect()
        };
        Some(
            position(&family)
                .or_else(|| position(&stripped))
                .unwrap_or(category.models.len()),
        )
    }

    /// Plot marker for a model
    pub fn marker_for(&self, model_name: &str) -> String {
        self.classify(model_name)
            .map(|c| c.marker.clone())
            .unwrap_or_else(|| DEFAULT_MARKER.to_string())
    }

    /// Color for a model, or the representative color of a category name
    pub fn color_for(&self, name: &str) -> String {
        if let Some(category) = self.taxonomy.category(name) {
            return category.color.clone();
        }
        let Some(category) = self.classify(name) else {
            return UNCLASSIFIED_COLOR.to_string();
        };
        self.model_index(name)
            .and_then(|idx| category.colors.get(idx))
            .unwrap_or(&category.color)
            .clone()
    }

    /// Marker edge color, rotating by model ordinal
    pub fn edge_color_for(&self, model_name: &str, base_color: &str) -> String {
        // Unclassified models sit at ordinal -1, which lands on the last slot
        let slot = self.model_index(model_name).map(|idx| idx % 4).unwrap_or(3);
        match slot {
            0 => base_color.to_string(),
            n => EDGE_ROTATION[n - 1].to_string(),
        }
    }

    /// Sort key placing categories, then models, in declaration order
    pub fn legend_order(&self, name: &str) -> LegendKey {
        if let Some(idx) = self.taxonomy.category_index(name) {
            return LegendKey {
                category: Some(idx),
                model: None,
                size: 0,
            };
        }
        let Some(category) = self.classify(name) else {
            return LegendKey {
                category: None,
                model: None,
                size: 0,
            };
        };
        let lower = name.to_lowercase();
        let size = if lower.contains("-ti") {
            1
        } else if lower.contains("-s") {
            2
        } else {
            3
        };
        LegendKey {
            category: self.taxonomy.category_index(&category.name),
            model: self.model_index(name),
            size,
        }
    }

    /// Display name, category, marker and colors in one lookup
    pub fn display_info(&self, model_name: &str) -> ModelDisplayInfo {
        let canonical_name = self.canonical_name(model_name);
        let color = self.color_for(model_name);
        ModelDisplayInfo {
            category: self.class_name(model_name),
            marker: self.marker_for(model_name),
            edge_color: self.edge_color_for(model_name, &color),
            legend_order: self.legend_order(&canonical_name),
            color,
            canonical_name,
        }
    }
}

impl Default for TaxonomyResolver {
    fn default() -> Self {
        Self::new(Arc::new(Taxonomy::builtin()))
    }
}

/// Lower-case and turn spaces into underscores
pub fn normalize(model_name: &str) -> String {
    model_name.to_lowercase().replace(' ', "_")
}

/// Split a raw model name on `-`, `/` and `_`, separating trailing size
/// numbers from their text (`vit32` → `vit`, `32`) except for patch and
/// window tokens, which keep their number attached.
fn tokenize(model_name: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    for block in model_name.replace(['-', '/'], "_").split('_') {
        let digits = block.len() - block.trim_end_matches(|c: char| c.is_ascii_digit()).len();
        if digits > 0 {
            let number = strip_leading_zeros(&block[block.len() - digits..]);
            let text = &block[..block.len() - number.len()];
            let keeps_number = matches!(text.to_lowercase().as_str(), "window" | "patch" | "p");
            if number != "0" && !keeps_number {
                blocks.push(text.to_string());
                blocks.push(number);
                continue;
            }
        }
        blocks.push(block.to_string());
    }
    blocks
}

/// `prefix` followed by digits only, e.g. `patch16` → 16
fn numeric_suffix(block: &str, lower: &str, prefix: &str) -> Option<u64> {
    if !lower.starts_with(prefix) {
        return None;
    }
    let rest = block.get(prefix.len()..)?;
    if is_numeric(rest) {
        rest.parse().ok()
    } else {
        None
    }
}

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

fn strip_leading_zeros(digits: &str) -> String {
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> TaxonomyResolver {
        TaxonomyResolver::default()
    }

    #[test]
    fn test_classify_is_case_and_separator_insensitive() {
        let r = resolver();
        assert_eq!(r.class_name("vit_small_patch16_224"), "Baseline");
        assert_eq!(r.class_name("ViT Small Patch16 224"), "Baseline");
    }

    #[test]
    fn test_classify_first_matching_category_wins() {
        let r = resolver();
        assert_eq!(r.class_name("swinv2_tiny_window8"), "Sparse Attention");
        assert_eq!(r.class_name("nystrom_vit_tiny_patch16"), "Low-Rank Attention");
        assert_eq!(r.class_name("resnet50"), "Baseline (Conv)");
        assert_eq!(r.class_name("switch_vit_small"), "MLP Block");
    }

    #[test]
    fn test_classify_fallbacks() {
        let r = resolver();
        // Generic suffix stripped before retrying
        let custom = TaxonomyResolver::new(Arc::new(Taxonomy::new(vec![Category::new(
            "Custom",
            "x",
            &["Foo"],
            &["#000000"],
            "#111111",
        )])));
        assert_eq!(custom.class_name("foo_vit"), "Custom");
        assert_eq!(custom.class_name("foo"), "Custom");
        // Alias prefix mapped onto the canonical one
        assert_eq!(r.class_name("efficientformer_l1"), "Hybrid Attention");
        assert_eq!(r.class_name("totally_unknown"), UNCLASSIFIED);
    }

    #[test]
    fn test_model_family() {
        let r = resolver();
        assert_eq!(r.model_family("deit_small_patch16_224"), "DeiT");
        assert_eq!(r.model_family("nystrom_vit_tiny_patch16_224"), "Nystrom ViT");
        assert_eq!(r.model_family("switch_vit_base"), "Switch ViT");
        assert_eq!(r.model_family("sinkhorn_cait_tiny"), "Sinkhorn Cait");
        assert_eq!(r.model_family("mystery_net"), "mystery net");
    }

    #[test]
    fn test_canonical_names() {
        let r = resolver();
        assert_eq!(r.canonical_name("vit_tiny_patch16"), "ViT-Ti/16");
        assert_eq!(r.canonical_name("vit_small_patch16_224"), "ViT-S/224");
        assert_eq!(r.canonical_name("deit_small_patch16_224"), "DeiT-S-224/16");
        assert_eq!(r.canonical_name("swin_tiny_window7"), "Swin-Ti-W7");
        assert_eq!(r.canonical_name("nystrom64_vit_small_p16"), "Nystrom ViT-64-S/16");
        assert_eq!(r.canonical_name("resnet50"), "ResNet50");
        assert_eq!(r.canonical_name("mixer_b16"), "Mixer-B/16");
    }

    #[test]
    fn test_canonical_name_is_deterministic() {
        let r = resolver();
        let a = r.canonical_name("cvt_13_224");
        let b = r.canonical_name("cvt_13_224");
        assert_eq!(a, b);
        assert_eq!(a, "CvT-13-224");
    }

    #[test]
    fn test_markers_and_colors() {
        let r = resolver();
        assert_eq!(r.marker_for("vit_small_patch16_224"), "o");
        assert_eq!(r.marker_for("Nystrom ViT-32-S/16"), "v");
        assert_eq!(r.marker_for("unrecognized_model"), "o");

        assert_eq!(r.color_for("deit_tiny"), "#ff9896");
        assert_eq!(r.color_for("Baseline"), "#d62728");
        assert_eq!(r.color_for("unrecognized_model"), "black");
        // Classified but unlisted model falls back to the category color
        assert_eq!(r.color_for("efficientformer_l1"), "#bcbd22");
    }

    #[test]
    fn test_model_index_and_edge_colors() {
        let r = resolver();
        assert_eq!(r.model_index("vit_tiny"), Some(0));
        assert_eq!(r.model_index("deit_tiny"), Some(1));
        assert_eq!(r.model_index("Nystrom ViT-S/16"), Some(0));
        assert_eq!(r.model_index("unknown"), None);

        assert_eq!(r.edge_color_for("vit_tiny", "red"), "red");
        assert_eq!(r.edge_color_for("deit_tiny", "red"), "white");
        assert_eq!(r.edge_color_for("unknown", "red"), "0.5");
    }

    #[test]
    fn test_legend_order() {
        let r = resolver();
        let none = r.legend_order("mystery");
        let baseline = r.legend_order("Baseline");
        let vit_ti = r.legend_order("ViT-Ti/16");
        let vit_s = r.legend_order("ViT-S/16");
        let deit = r.legend_order("DeiT-B/16");
        let conv = r.legend_order("Baseline (Conv)");

        assert!(none < baseline);
        assert!(baseline < vit_ti);
        assert!(vit_ti < vit_s);
        assert!(vit_s < deit);
        assert!(deit < conv);
    }

    #[test]
    fn test_display_info() {
        let info = resolver().display_info("vit_tiny_patch16");
        assert_eq!(info.canonical_name, "ViT-Ti/16");
        assert_eq!(info.category, "Baseline");
        assert_eq!(info.marker, "o");
        assert_eq!(info.color, "#d62728");
        assert_eq!(info.edge_color, "#d62728");
    }
}
