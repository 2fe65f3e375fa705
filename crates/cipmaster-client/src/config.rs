//! Assembly XML configuration: discovery, loading and the validation report.

use crate::ConfigError;
use cipmaster_core::connection::ConnectionParameters;
use cipmaster_core::layout::{AssemblyLayout, FieldSpec, FieldType};
use roxmltree::{Document, Node};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const SUBTYPE_OT: &str = "OT_EO";
pub const SUBTYPE_TO: &str = "TO";

/// One compiled `<assembly>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AssemblyConfig {
    pub id: Option<String>,
    pub subtype: String,
    pub size_bits: u32,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub layout: Arc<AssemblyLayout>,
}

impl AssemblyConfig {
    pub fn size_bytes(&self) -> usize {
        self.layout.size_bytes()
    }
}

/// Output and input assemblies of one configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipConfig {
    pub ot: AssemblyConfig,
    pub to: AssemblyConfig,
}

impl CipConfig {
    pub fn connection_parameters(&self) -> ConnectionParameters {
        ConnectionParameters::from_sizes(self.ot.size_bytes() as u32, self.to.size_bytes() as u32)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum CheckStatus {
    Ok,
    Failed(Option<String>),
    Skipped,
}

impl CheckStatus {
    fn from_result<T>(result: &Result<T, ConfigError>) -> Self {
        match result {
            Ok(_) => Self::Ok,
            Err(ConfigError::AssemblyCount { .. }) => Self::Failed(None),
            Err(err) => Self::Failed(Some(err.to_string())),
        }
    }

    fn flag(ok: bool) -> Self {
        if ok {
            Self::Ok
        } else {
            Self::Failed(None)
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("OK"),
            Self::Failed(None) => f.write_str("FAILED"),
            Self::Failed(Some(reason)) => write!(f, "FAILED: {reason}"),
            Self::Skipped => f.write_str("SKIPPED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CheckResult {
    pub name: &'static str,
    pub status: CheckStatus,
}

/// Ordered checks run by [`validate_config`], plus whatever compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ValidationReport {
    pub checks: Vec<CheckResult>,
    pub overall: bool,
    pub ot: Option<AssemblyConfig>,
    pub to: Option<AssemblyConfig>,
}

impl ValidationReport {
    /// Both assemblies, when the report is fully OK.
    pub fn into_config(self) -> Result<CipConfig, ConfigError> {
        let ot = self.ot.ok_or(ConfigError::MissingAssembly(SUBTYPE_OT))?;
        let to = self.to.ok_or(ConfigError::MissingAssembly(SUBTYPE_TO))?;
        Ok(CipConfig { ot, to })
    }
}

/// Maps `*.xml` file names to paths. Earlier directories win on name
/// clashes; missing directories are skipped.
pub fn available_config_files(dirs: &[PathBuf]) -> BTreeMap<String, PathBuf> {
    let mut available = BTreeMap::new();
    for dir in dirs {
        let Ok(entries) = std::fs::read_dir(dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || !has_xml_extension(&path) {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                available.entry(name.to_string()).or_insert(path);
            }
        }
    }
    available
}

pub fn resolve_config_path(
    name: &str,
    available: &BTreeMap<String, PathBuf>,
) -> Result<PathBuf, ConfigError> {
    available
        .get(name)
        .cloned()
        .ok_or_else(|| ConfigError::NotFound(name.to_string()))
}

fn has_xml_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
}

/// Reads and compiles a configuration file.
pub fn load_config(path: &Path) -> Result<CipConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&text)
}

pub fn parse_config(xml: &str) -> Result<CipConfig, ConfigError> {
    let doc = Document::parse(xml)?;
    let root = doc.root_element();
    Ok(CipConfig {
        ot: compile_assembly(find_assembly(root, SUBTYPE_OT)?)?,
        to: compile_assembly(find_assembly(root, SUBTYPE_TO)?)?,
    })
}

/// The only direct `<assembly>` child with the subtype and at least one
/// field element.
fn find_assembly<'a, 'input>(
    root: Node<'a, 'input>,
    subtype: &'static str,
) -> Result<Node<'a, 'input>, ConfigError> {
    let candidates: Vec<_> = root
        .children()
        .filter(|n| n.has_tag_name("assembly"))
        .filter(|n| n.attribute("subtype") == Some(subtype))
        .filter(|n| n.children().any(|c| c.is_element()))
        .collect();
    match candidates.as_slice() {
        [assembly] => Ok(*assembly),
        _ => Err(ConfigError::AssemblyCount {
            subtype,
            found: candidates.len(),
        }),
    }
}

pub fn compile_assembly(assembly: Node<'_, '_>) -> Result<AssemblyConfig, ConfigError> {
    let subtype = assembly.attribute("subtype").unwrap_or_default().to_string();
    let size_bits = numeric_attribute(assembly, "size", 0)?;

    let mut specs = Vec::new();
    for field in assembly.descendants().skip(1).filter(Node::is_element) {
        let tag = field.tag_name().name();
        let id = field.attribute("id").unwrap_or(tag).to_string();
        let field_type = FieldType::from_xml_tag(tag).ok_or_else(|| ConfigError::UnmappableType {
            id: id.clone(),
            tag: tag.to_string(),
        })?;
        let offset = numeric_attribute(field, "offset", 0)?;
        let length = numeric_attribute(field, "length", 1)?;
        specs.push(FieldSpec::new(id, offset, field_type, length));
    }

    let layout = AssemblyLayout::compile(specs, size_bits)?;
    log::debug!(
        "compiled {subtype} assembly: {} bytes, {} fields",
        layout.size_bytes(),
        layout.fields().len()
    );
    Ok(AssemblyConfig {
        id: assembly.attribute("id").map(str::to_string),
        subtype,
        size_bits,
        layout: Arc::new(layout),
    })
}

fn numeric_attribute(
    node: Node<'_, '_>,
    attribute: &'static str,
    default: u32,
) -> Result<u32, ConfigError> {
    match node.attribute(attribute) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidAttribute {
            element: node.tag_name().name().to_string(),
            attribute,
            value: raw.to_string(),
        }),
    }
}

/// Runs the configuration checks in order. Never fails: every problem ends
/// up in the report.
pub fn validate_config(path: &Path) -> ValidationReport {
    let mut checks = Vec::with_capacity(7);
    let mut push = |name: &'static str, status: CheckStatus| {
        checks.push(CheckResult { name, status });
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let has_xml = std::fs::read_dir(dir)
        .map(|entries| entries.flatten().any(|e| has_xml_extension(&e.path())))
        .unwrap_or(false);
    push("Detect XML in Config Folder", CheckStatus::flag(has_xml));

    let exists = path.exists();
    push("CIP Conf File Exists", CheckStatus::flag(exists));

    let is_xml = has_xml_extension(path);
    push("File is XML", CheckStatus::flag(is_xml));

    let text = if exists && is_xml {
        match std::fs::read_to_string(path) {
            Ok(text) => Some(Ok(text)),
            Err(err) => Some(Err(err.to_string())),
        }
    } else {
        None
    };

    let mut ot = None;
    let mut to = None;
    match text {
        None => {
            push("Parse XML", CheckStatus::Skipped);
            push("One Assembly with Subtype 'OT_EO'", CheckStatus::Skipped);
            push("One Assembly with Subtype 'TO'", CheckStatus::Skipped);
        }
        Some(Err(reason)) => {
            push("Parse XML", CheckStatus::Failed(Some(reason)));
            push("One Assembly with Subtype 'OT_EO'", CheckStatus::Skipped);
            push("One Assembly with Subtype 'TO'", CheckStatus::Skipped);
        }
        Some(Ok(text)) => match Document::parse(&text) {
            Err(err) => {
                push("Parse XML", CheckStatus::Failed(Some(err.to_string())));
                push("One Assembly with Subtype 'OT_EO'", CheckStatus::Skipped);
                push("One Assembly with Subtype 'TO'", CheckStatus::Skipped);
            }
            Ok(doc) => {
                push("Parse XML", CheckStatus::Ok);
                let root = doc.root_element();
                let ot_result = find_assembly(root, SUBTYPE_OT).and_then(compile_assembly);
                push(
                    "One Assembly with Subtype 'OT_EO'",
                    CheckStatus::from_result(&ot_result),
                );
                let to_result = find_assembly(root, SUBTYPE_TO).and_then(compile_assembly);
                push(
                    "One Assembly with Subtype 'TO'",
                    CheckStatus::from_result(&to_result),
                );
                ot = ot_result.ok();
                to = to_result.ok();
            }
        },
    }

    let overall = checks
        .iter()
        .all(|check| matches!(check.status, CheckStatus::Ok | CheckStatus::Skipped));
    checks.push(CheckResult {
        name: "Overall Status",
        status: CheckStatus::flag(overall),
    });
    ValidationReport {
        checks,
        overall,
        ot,
        to,
    }
}
