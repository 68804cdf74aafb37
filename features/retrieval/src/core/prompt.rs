//! Prompt-side parsing: reference notation, regulatory-standard detection,
//! and the system/task envelope split.

use std::sync::LazyLock;

use regex::Regex;

use super::retrieval::service::TASK_DELIMITER;

// ── Reference notation ──────────────────────────────────────────────

static PROCEDURE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[Procedure\|([^\]|]+)\]").unwrap());
static MASTER_RECORD_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[Master Record\|([^\]|]+)\]").unwrap());
static CONTEXT_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[Context\|([^\]|]+)\|([^\]|]+)\]").unwrap());

/// References a prompt names explicitly via bracket notation. These are
/// hints: they widen retrieval rather than constrain it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptReferences {
    /// Categories named by `[Procedure|{category}]`.
    pub procedures: Vec<String>,
    /// Fields named by `[Master Record|{field}]`.
    pub master_record_fields: Vec<String>,
    /// `(folder, filename)` pairs named by `[Context|{folder}|{filename}]`.
    pub context_files: Vec<(String, String)>,
}

impl PromptReferences {
    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty()
            && self.master_record_fields.is_empty()
            && self.context_files.is_empty()
    }
}

/// Scan `text` for reference notation.
pub fn parse_references(text: &str) -> PromptReferences {
    let mut refs = PromptReferences::default();
    for cap in PROCEDURE_REF.captures_iter(text) {
        refs.procedures.push(cap[1].trim().to_string());
    }
    for cap in MASTER_RECORD_REF.captures_iter(text) {
        refs.master_record_fields.push(cap[1].trim().to_string());
    }
    for cap in CONTEXT_REF.captures_iter(text) {
        refs.context_files.push((cap[1].trim().to_string(), cap[2].trim().to_string()));
    }
    refs
}

// ── Regulatory standards ────────────────────────────────────────────

/// A recognized regulatory standard, matched case-insensitively in prompts.
#[derive(Debug)]
pub struct RegulatoryStandard {
    pub name: &'static str,
    pub description: &'static str,
    pattern: &'static str,
}

/// Standards the footnote tracker knows how to cite.
pub static STANDARDS: &[RegulatoryStandard] = &[
    RegulatoryStandard {
        name: "ISO 13485",
        description: "Medical devices — Quality management systems",
        pattern: r"(?i)\bISO\s*13485\b",
    },
    RegulatoryStandard {
        name: "ISO 14971",
        description: "Application of risk management to medical devices",
        pattern: r"(?i)\bISO\s*14971\b",
    },
    RegulatoryStandard {
        name: "IEC 62304",
        description: "Medical device software — Software life cycle processes",
        pattern: r"(?i)\bIEC\s*62304\b",
    },
    RegulatoryStandard {
        name: "IEC 62366-1",
        description: "Application of usability engineering to medical devices",
        pattern: r"(?i)\bIEC\s*62366(-1)?\b",
    },
    RegulatoryStandard {
        name: "21 CFR Part 820",
        description: "FDA Quality System Regulation",
        pattern: r"(?i)\b21\s*CFR\s*(Part\s*)?820\b",
    },
    RegulatoryStandard {
        name: "21 CFR Part 11",
        description: "FDA Electronic Records and Electronic Signatures",
        pattern: r"(?i)\b21\s*CFR\s*(Part\s*)?11\b",
    },
    RegulatoryStandard {
        name: "EU MDR 2017/745",
        description: "EU Medical Device Regulation",
        pattern: r"(?i)\b(EU\s*)?MDR(\s*2017/745)?\b",
    },
    RegulatoryStandard {
        name: "EU IVDR 2017/746",
        description: "EU In Vitro Diagnostic Regulation",
        pattern: r"(?i)\b(EU\s*)?IVDR(\s*2017/746)?\b",
    },
    RegulatoryStandard {
        name: "ISO 10993-1",
        description: "Biological evaluation of medical devices",
        pattern: r"(?i)\bISO\s*10993(-1)?\b",
    },
];

static STANDARD_MATCHERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    STANDARDS.iter().map(|s| Regex::new(s.pattern).unwrap()).collect()
});

/// Standards mentioned in `text`, in table order.
pub fn detect_standards(text: &str) -> Vec<&'static RegulatoryStandard> {
    STANDARDS
        .iter()
        .zip(STANDARD_MATCHERS.iter())
        .filter(|(_, re)| re.is_match(text))
        .map(|(standard, _)| standard)
        .collect()
}

// ── Envelope split ──────────────────────────────────────────────────

/// Split an assembled context at the task delimiter: everything before it
/// is the system message, everything after it is the user task. A context
/// without the delimiter becomes all-system with an empty task.
pub fn split_envelope(assembled: &str) -> (&str, &str) {
    match assembled.find(TASK_DELIMITER) {
        Some(pos) => {
            let system = assembled[..pos].trim_end();
            let task = assembled[pos + TASK_DELIMITER.len()..].trim_start();
            (system, task)
        }
        None => (assembled, ""),
    }
}
