//! Classification of raw compiler output into a closed diagnostic taxonomy.
//!
//! The compiler's textual diagnostics are the only contract available, so
//! classification is ordered pattern matching over a handful of known
//! phrasings. `Unknown` is a legitimate terminal state, not an error.

use std::fmt;
use std::path::{Path, PathBuf};

use regex::Regex;

/// Result of classifying one batch of compiler output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Compilation succeeded: the output was empty or absent.
    Clean,
    /// One classified compiler failure.
    Found(Diagnostic),
    /// Output present but carrying no `file.res:line` anchor. Not success:
    /// the caller should retry once the compiler has said more.
    Indeterminate,
}

/// One classified compiler failure. `file` is relative to the build root;
/// `line` is 1-based. Produced fresh on every classification call and never
/// mutated; identity is value-equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A module the source refers to does not exist.
    MissingModule {
        /// Offending source file.
        file: PathBuf,
        /// 1-based line of the failure.
        line: u32,
        /// The module the compiler could not find.
        module_name: String,
    },

    /// A value is missing from a module that does exist.
    MissingValue {
        /// Offending source file.
        file: PathBuf,
        /// 1-based line of the failure.
        line: u32,
        /// The module searched.
        module_name: String,
        /// The value the compiler could not find.
        value_name: String,
    },

    /// The file does not parse at all.
    SyntaxError {
        /// Offending source file.
        file: PathBuf,
        /// 1-based line of the failure.
        line: u32,
    },

    /// Anchored output matching none of the known phrasings.
    Unknown {
        /// Offending source file.
        file: PathBuf,
        /// 1-based line of the failure.
        line: u32,
    },

    /// A mismatch between the type an expression has and the type wanted.
    WrongType {
        /// Offending source file.
        file: PathBuf,
        /// The type the expression has, as printed by the compiler.
        given_type: String,
        /// 1-based line of the failure.
        line: u32,
        /// The type the context wanted, as printed by the compiler.
        wanted_type: String,
    },
}

impl Diagnostic {
    /// The source file the diagnostic points into, relative to the build root.
    pub fn file(&self) -> &Path {
        return match self {
            Diagnostic::MissingModule { file, .. }
            | Diagnostic::MissingValue { file, .. }
            | Diagnostic::SyntaxError { file, .. }
            | Diagnostic::Unknown { file, .. }
            | Diagnostic::WrongType { file, .. } => file,
        };
    }

    /// Short label used in log lines.
    pub fn kind(&self) -> &'static str {
        return match self {
            Diagnostic::MissingModule { .. } => "missing-module",
            Diagnostic::MissingValue { .. } => "missing-value",
            Diagnostic::SyntaxError { .. } => "syntax-error",
            Diagnostic::Unknown { .. } => "unknown",
            Diagnostic::WrongType { .. } => "wrong-type",
        };
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return match self {
            Diagnostic::MissingModule { file, line, module_name } => {
                write!(f, "{}:{line} module `{module_name}` not found", file.display())
            },
            Diagnostic::MissingValue { file, line, module_name, value_name } => {
                write!(
                    f,
                    "{}:{line} value `{value_name}` not found in `{module_name}`",
                    file.display()
                )
            },
            Diagnostic::SyntaxError { file, line } => {
                write!(f, "{}:{line} syntax error", file.display())
            },
            Diagnostic::Unknown { file, line } => {
                write!(f, "{}:{line} unrecognized failure", file.display())
            },
            Diagnostic::WrongType { file, given_type, line, wanted_type } => {
                write!(
                    f,
                    "{}:{line} type mismatch: has `{given_type}`, wanted `{wanted_type}`",
                    file.display()
                )
            },
        };
    }
}

/// Normalize an anchor path to be relative to the build root.
fn anchored_file(root: &Path, raw: &str) -> PathBuf {
    let path = Path::new(raw);
    return path.strip_prefix(root).unwrap_or(path).to_path_buf();
}

/// Extract a capture group as an owned string; empty when absent.
fn capture_text(cap: &regex::Captures<'_>, index: usize) -> String {
    return cap.get(index).map_or("", |m| return m.as_str()).trim().to_string();
}

/// Classify raw compiler output. First match wins, in a fixed priority:
/// missing module, missing value, type mismatch, syntax failure, unknown.
///
/// Empty or absent output is `Clean`. Output with no `file.res:line` anchor
/// is `Indeterminate`; there is nothing to attach a diagnostic to yet.
///
/// # Panics
///
/// Panics if any hardcoded pattern is invalid (compile-time invariant).
pub fn classify(raw: Option<&str>, root: &Path) -> Classification {
    let Some(text) = raw else {
        return Classification::Clean;
    };
    if text.trim().is_empty() {
        return Classification::Clean;
    }

    let anchor = Regex::new(r" *(.+\.res):(\d+)").expect("valid regex");
    let Some(location) = anchor.captures(text) else {
        return Classification::Indeterminate;
    };
    let file = anchored_file(root, &capture_text(&location, 1));
    let line = capture_text(&location, 2).parse::<u32>().unwrap_or(u32::MAX);

    let missing_module = Regex::new(r"The module or file (.+) can't be found\.").expect("valid regex");
    if let Some(cap) = missing_module.captures(text) {
        return Classification::Found(Diagnostic::MissingModule {
            file,
            line,
            module_name: capture_text(&cap, 1),
        });
    }

    let missing_value = Regex::new(r"The value (.+) can't be found in (.+)").expect("valid regex");
    if let Some(cap) = missing_value.captures(text) {
        return Classification::Found(Diagnostic::MissingValue {
            file,
            line,
            module_name: capture_text(&cap, 2),
            value_name: capture_text(&cap, 1),
        });
    }

    let wrong_type = Regex::new(r"This has type: (.+)\n *Somewhere wanted: (.+)").expect("valid regex");
    if let Some(cap) = wrong_type.captures(text) {
        return Classification::Found(Diagnostic::WrongType {
            file,
            given_type: capture_text(&cap, 1),
            line,
            wanted_type: capture_text(&cap, 2),
        });
    }

    if text.contains("Syntax error!") {
        return Classification::Found(Diagnostic::SyntaxError { file, line });
    }

    return Classification::Found(Diagnostic::Unknown { file, line });
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use super::*;

    #[test]
    fn empty_output_means_clean() {
        assert_eq!(classify(None, Path::new(".")), Classification::Clean);
        assert_eq!(classify(Some(""), Path::new(".")), Classification::Clean);
        assert_eq!(classify(Some("  \n"), Path::new(".")), Classification::Clean);
    }

    #[test]
    fn output_without_anchor_is_indeterminate() {
        let raw = "Dependencies finished\nCleaning in progress\n";
        assert_eq!(classify(Some(raw), Path::new(".")), Classification::Indeterminate);
    }

    #[test]
    fn missing_module_is_extracted() {
        let raw = "  file.res:12\n  The module or file Lodash can't be found.\n";
        let expected = Diagnostic::MissingModule {
            file: PathBuf::from("file.res"),
            line: 12,
            module_name: "Lodash".to_string(),
        };
        assert_eq!(classify(Some(raw), Path::new(".")), Classification::Found(expected));
    }

    #[test]
    fn missing_value_names_both_sides() {
        let raw = "  src/App.res:4\n  The value flatten can't be found in Lodash\n";
        let expected = Diagnostic::MissingValue {
            file: PathBuf::from("src/App.res"),
            line: 4,
            module_name: "Lodash".to_string(),
            value_name: "flatten".to_string(),
        };
        assert_eq!(classify(Some(raw), Path::new(".")), Classification::Found(expected));
    }

    #[test]
    fn wrong_type_pairs_the_two_lines() {
        let raw = "  src/App.res:9\n  This has type: Lodash.t\n  Somewhere wanted: string\n";
        let expected = Diagnostic::WrongType {
            file: PathBuf::from("src/App.res"),
            given_type: "Lodash.t".to_string(),
            line: 9,
            wanted_type: "string".to_string(),
        };
        assert_eq!(classify(Some(raw), Path::new(".")), Classification::Found(expected));
    }

    #[test]
    fn syntax_banner_is_classified() {
        let raw = "  Syntax error!\n  src/autobindings/Lodash.res:2\n  I'm not sure what to parse here.\n";
        let expected = Diagnostic::SyntaxError {
            file: PathBuf::from("src/autobindings/Lodash.res"),
            line: 2,
        };
        assert_eq!(classify(Some(raw), Path::new(".")), Classification::Found(expected));
    }

    #[test]
    fn anchored_but_unrecognized_is_unknown() {
        let raw = "  src/App.res:30\n  Somewhere in here a wild error appeared.\n";
        assert_eq!(
            classify(Some(raw), Path::new(".")),
            Classification::Found(Diagnostic::Unknown {
                file: PathBuf::from("src/App.res"),
                line: 30,
            })
        );
    }

    #[test]
    fn anchor_path_is_relativized_to_the_root() {
        let raw = "  /work/app/src/App.res:2\n  The module or file Dayjs can't be found.\n";
        let classification = classify(Some(raw), Path::new("/work/app"));
        let Classification::Found(Diagnostic::MissingModule { file, .. }) = classification else {
            panic!("expected a missing-module diagnostic");
        };
        assert_eq!(file, PathBuf::from("src/App.res"));
    }
}
