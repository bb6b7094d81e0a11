//! KDL schema for codesnip settings files.
//!
//! This module provides:
//! - `SnipSettings`, the raw (all optional) settings as written by the user
//! - Serialization/deserialization to/from KDL format
//! - `InsertionPosition` parsing
//! - Layer merging

use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};

/// Where a bundled snippet lands in the target document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InsertionPosition {
    /// After the last character of the document (default)
    #[default]
    End,
    /// Replacing the current selection
    AtCursor,
}

impl InsertionPosition {
    /// Parse from a settings string.
    ///
    /// Unrecognized values fall back to `End`.
    pub fn parse(s: &str) -> Self {
        match s {
            "cursor" => InsertionPosition::AtCursor,
            _ => InsertionPosition::End,
        }
    }

    /// Settings string for this position.
    pub fn as_str(&self) -> &'static str {
        match self {
            InsertionPosition::End => "last",
            InsertionPosition::AtCursor => "cursor",
        }
    }
}

impl std::fmt::Display for InsertionPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// User settings stored in `codesnip.kdl` (project) or `config.kdl` (system).
///
/// Every field is optional so that layers can be merged; defaults are filled
/// in by the resolver.
///
/// # KDL Schema
///
/// ```kdl
/// cache-file "/home/me/lib/target/codesnip/codesnip-cache.bin"
/// source "src/lib.rs" "crates/graph/src/lib.rs"
/// cfg "nightly"
/// filter-item "test"
/// filter-attr "path"
/// minify #true
/// not-hide #false
/// insertion-position "cursor"  // or "last"
/// verify {
///     toolchain "nightly"
///     edition "2021"
///     verbose #true
/// }
/// auto-update-on-missing-cache #true
/// auto-verify-after-update #false
/// tool "cargo" "codesnip"
/// min-tool-version "0.4.0"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnipSettings {
    pub cache_file: Option<String>,
    pub source: Option<Vec<String>>,
    pub cfg: Option<Vec<String>>,
    pub filter_item: Option<Vec<String>>,
    pub filter_attr: Option<Vec<String>>,
    pub minify: Option<bool>,
    pub not_hide: Option<bool>,
    /// Raw insertion position string, parsed leniently at resolution time
    pub insertion_position: Option<String>,
    pub toolchain: Option<String>,
    pub edition: Option<String>,
    pub verbose: Option<bool>,
    pub auto_update_on_missing_cache: Option<bool>,
    pub auto_verify_after_update: Option<bool>,
    /// Program followed by its fixed leading arguments
    pub tool: Option<Vec<String>>,
    pub min_tool_version: Option<String>,
}

impl SnipSettings {
    /// Create empty settings with no values set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse settings from a KDL document.
    ///
    /// Unknown nodes are ignored for forward compatibility. List-valued nodes
    /// accumulate across repeated nodes, so both `source "a" "b"` and two
    /// `source` lines are accepted.
    pub fn from_kdl(doc: &KdlDocument) -> Self {
        let mut settings = Self::new();

        for node in doc.nodes() {
            match node.name().value() {
                "cache-file" => settings.cache_file = get_string_arg(node),
                "source" => extend_list(&mut settings.source, node),
                "cfg" => extend_list(&mut settings.cfg, node),
                "filter-item" => extend_list(&mut settings.filter_item, node),
                "filter-attr" => extend_list(&mut settings.filter_attr, node),
                "minify" => settings.minify = get_bool_arg(node),
                "not-hide" => settings.not_hide = get_bool_arg(node),
                "insertion-position" => settings.insertion_position = get_string_arg(node),
                "verify" => settings.parse_verify_block(node),
                "auto-update-on-missing-cache" => {
                    settings.auto_update_on_missing_cache = get_bool_arg(node)
                }
                "auto-verify-after-update" => settings.auto_verify_after_update = get_bool_arg(node),
                "tool" => {
                    let args = get_string_args(node);
                    if !args.is_empty() {
                        settings.tool = Some(args);
                    }
                }
                "min-tool-version" => settings.min_tool_version = get_string_arg(node),
                _ => {}
            }
        }

        settings
    }

    fn parse_verify_block(&mut self, node: &KdlNode) {
        if let Some(children) = node.children() {
            for child in children.nodes() {
                match child.name().value() {
                    "toolchain" => self.toolchain = get_string_arg(child),
                    "edition" => self.edition = get_string_arg(child),
                    "verbose" => self.verbose = get_bool_arg(child),
                    _ => {}
                }
            }
        }
    }

    /// Convert settings to a KDL document.
    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();

        if let Some(ref path) = self.cache_file {
            push_strings(&mut doc, "cache-file", std::slice::from_ref(path));
        }
        for (name, list) in [
            ("source", &self.source),
            ("cfg", &self.cfg),
            ("filter-item", &self.filter_item),
            ("filter-attr", &self.filter_attr),
        ] {
            if let Some(values) = list {
                if !values.is_empty() {
                    push_strings(&mut doc, name, values);
                }
            }
        }
        if let Some(minify) = self.minify {
            push_bool(&mut doc, "minify", minify);
        }
        if let Some(not_hide) = self.not_hide {
            push_bool(&mut doc, "not-hide", not_hide);
        }
        if let Some(ref position) = self.insertion_position {
            push_strings(&mut doc, "insertion-position", std::slice::from_ref(position));
        }

        let mut verify = KdlDocument::new();
        if let Some(ref toolchain) = self.toolchain {
            push_strings(&mut verify, "toolchain", std::slice::from_ref(toolchain));
        }
        if let Some(ref edition) = self.edition {
            push_strings(&mut verify, "edition", std::slice::from_ref(edition));
        }
        if let Some(verbose) = self.verbose {
            push_bool(&mut verify, "verbose", verbose);
        }
        if !verify.nodes().is_empty() {
            let mut node = KdlNode::new("verify");
            node.set_children(verify);
            doc.nodes_mut().push(node);
        }

        if let Some(auto_update) = self.auto_update_on_missing_cache {
            push_bool(&mut doc, "auto-update-on-missing-cache", auto_update);
        }
        if let Some(auto_verify) = self.auto_verify_after_update {
            push_bool(&mut doc, "auto-verify-after-update", auto_verify);
        }
        if let Some(ref tool) = self.tool {
            push_strings(&mut doc, "tool", tool);
        }
        if let Some(ref version) = self.min_tool_version {
            push_strings(&mut doc, "min-tool-version", std::slice::from_ref(version));
        }

        doc
    }

    /// Merge another layer into this one.
    /// Values from `other` override values in `self` if they are Some.
    /// An empty `cache-file` counts as unset.
    pub fn merge(&mut self, other: &SnipSettings) {
        fn take<T: Clone>(slot: &mut Option<T>, other: &Option<T>) {
            if other.is_some() {
                *slot = other.clone();
            }
        }

        if other.cache_file.as_deref().is_some_and(|s| !s.is_empty()) {
            self.cache_file = other.cache_file.clone();
        }
        take(&mut self.source, &other.source);
        take(&mut self.cfg, &other.cfg);
        take(&mut self.filter_item, &other.filter_item);
        take(&mut self.filter_attr, &other.filter_attr);
        take(&mut self.minify, &other.minify);
        take(&mut self.not_hide, &other.not_hide);
        take(&mut self.insertion_position, &other.insertion_position);
        take(&mut self.toolchain, &other.toolchain);
        take(&mut self.edition, &other.edition);
        take(&mut self.verbose, &other.verbose);
        take(
            &mut self.auto_update_on_missing_cache,
            &other.auto_update_on_missing_cache,
        );
        take(
            &mut self.auto_verify_after_update,
            &other.auto_verify_after_update,
        );
        take(&mut self.tool, &other.tool);
        take(&mut self.min_tool_version, &other.min_tool_version);
    }
}

/// Get a string argument from a node's first entry.
fn get_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .first()
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

/// Get every positional string argument of a node.
fn get_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

/// Get a boolean argument from a node's first entry.
fn get_bool_arg(node: &KdlNode) -> Option<bool> {
    node.entries().first().and_then(|e| e.value().as_bool())
}

fn extend_list(slot: &mut Option<Vec<String>>, node: &KdlNode) {
    slot.get_or_insert_with(Vec::new)
        .extend(get_string_args(node));
}

fn push_strings(doc: &mut KdlDocument, name: &str, values: &[String]) {
    let mut node = KdlNode::new(name);
    for value in values {
        node.push(KdlEntry::new(KdlValue::String(value.clone())));
    }
    doc.nodes_mut().push(node);
}

fn push_bool(doc: &mut KdlDocument, name: &str, value: bool) {
    let mut node = KdlNode::new(name);
    node.push(KdlEntry::new(KdlValue::Bool(value)));
    doc.nodes_mut().push(node);
}
